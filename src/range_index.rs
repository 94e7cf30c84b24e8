//! Build-once, sorted, bgzip-compressed and tabix-indexed annotation store.
//!
//! The archive is written next to the source as `<source>.gz` and its index as
//! `<source>.gz.tbi`. Artifacts are reused while they are at least as new as
//! the file they were derived from, so an unchanged source costs no writes.

use crate::errors::{AppError, Result};
use crate::external_tools::ExternalTools;
use crate::table::open_text_reader;
use std::cmp::Ordering;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tempfile::Builder;
use tracing::{debug, info};

pub const ARCHIVE_SUFFIX: &str = ".gz";
pub const INDEX_SUFFIX: &str = ".tbi";
const LOCK_SUFFIX: &str = ".lock";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(600);
const COMMENT_PREFIX: char = '#';
const SEQNAME_COLUMN: usize = 0;
const START_COLUMN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationIndex {
    pub source: PathBuf,
    pub archive: PathBuf,
    pub index: PathBuf,
    /// Column names from the first line of the source.
    pub header: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Fresh,
    Missing,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildReport {
    pub archive_written: bool,
    pub index_written: bool,
}

impl BuildReport {
    pub fn wrote_anything(&self) -> bool {
        self.archive_written || self.index_written
    }
}

pub fn archive_path(source: &Path) -> PathBuf {
    append_suffix(source, ARCHIVE_SUFFIX)
}

pub fn index_path(archive: &Path) -> PathBuf {
    append_suffix(archive, INDEX_SUFFIX)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn modified(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata.modified()?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Compares a derived artifact against the file it was built from.
pub fn artifact_state(derived: &Path, origin: &Path) -> Result<ArtifactState> {
    let Some(derived_time) = modified(derived)? else {
        return Ok(ArtifactState::Missing);
    };
    let origin_time = modified(origin)?;
    if origin_time.is_some_and(|origin_time| origin_time > derived_time) {
        return Ok(ArtifactState::Stale);
    }
    Ok(ArtifactState::Fresh)
}

/// Reads only the first line of the source and splits it into column names.
pub fn read_header(source: &Path) -> Result<Vec<String>> {
    let mut reader = open_text_reader(&source.to_string_lossy())?;
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line
        .trim_end_matches(['\n', '\r'])
        .split('\t')
        .map(str::to_string)
        .collect())
}

#[derive(Debug, Clone)]
pub struct RangeIndexBuilder {
    tools: ExternalTools,
    lock_timeout: Duration,
}

impl RangeIndexBuilder {
    pub fn new(tools: ExternalTools) -> Self {
        Self {
            tools,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Makes sure the archive and index exist and are current for `source`.
    pub fn ensure(&self, source: &Path) -> Result<(AnnotationIndex, BuildReport)> {
        if !source.is_file() {
            return Err(AppError::MissingIndexSource {
                path: source.display().to_string(),
            });
        }

        let header = read_header(source)?;
        let archive = archive_path(source);
        let index = index_path(&archive);
        let annotation_index = AnnotationIndex {
            source: source.to_path_buf(),
            archive: archive.clone(),
            index: index.clone(),
            header,
        };

        if self.is_current(source, &archive, &index)? {
            info!(archive = %archive.display(), "reusing cached annotation archive and index");
            return Ok((annotation_index, BuildReport::default()));
        }

        let _lock = BuildLock::acquire(&append_suffix(source, LOCK_SUFFIX), self.lock_timeout)?;
        let mut report = BuildReport::default();

        let archive_state = artifact_state(&archive, source)?;
        if archive_state == ArtifactState::Fresh {
            info!(archive = %archive.display(), "caching existing bgzip archive");
        } else {
            info!(
                source = %source.display(),
                archive = %archive.display(),
                state = ?archive_state,
                "sorting and compressing annotation source"
            );
            self.write_archive(source, &archive)?;
            report.archive_written = true;
        }

        let index_state = artifact_state(&index, &archive)?;
        if index_state == ArtifactState::Fresh {
            info!(index = %index.display(), "caching existing tabix index");
        } else {
            info!(index = %index.display(), state = ?index_state, "creating tabix index");
            self.tools.tabix_index_gff(&archive)?;
            report.index_written = true;
        }

        Ok((annotation_index, report))
    }

    fn is_current(&self, source: &Path, archive: &Path, index: &Path) -> Result<bool> {
        Ok(artifact_state(archive, source)? == ArtifactState::Fresh
            && artifact_state(index, archive)? == ArtifactState::Fresh)
    }

    fn write_archive(&self, source: &Path, archive: &Path) -> Result<()> {
        let parent_dir = archive
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut sorted = Builder::new()
            .prefix("annotation_sorted_")
            .suffix(".tsv")
            .tempfile_in(parent_dir)?;
        {
            let reader = open_text_reader(&source.to_string_lossy())?;
            let mut writer = BufWriter::new(sorted.as_file_mut());
            let rows = sort_annotation_lines(reader, &mut writer)?;
            writer.flush()?;
            debug!(rows, "sorted annotation rows");
        }

        let compressed = Builder::new()
            .prefix("annotation_archive_")
            .suffix(ARCHIVE_SUFFIX)
            .tempfile_in(parent_dir)?;
        self.tools.bgzip_compress_to(sorted.path(), compressed.path())?;
        compressed.persist(archive).map_err(|err| AppError::Io(err.error))?;
        Ok(())
    }
}

/// Writes comment lines first, in their original order, then data lines
/// sorted by sequence name and numeric start. The first line always becomes a
/// comment so the index skips it. Returns the number of data rows.
pub fn sort_annotation_lines<R: BufRead, W: Write + ?Sized>(
    mut reader: R,
    writer: &mut W,
) -> Result<usize> {
    let mut comments = Vec::new();
    let mut rows = Vec::new();
    let mut buf = String::new();
    let mut first = true;
    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            break;
        }
        let line = buf.trim_end_matches(['\n', '\r']);
        if first {
            first = false;
            if line.starts_with(COMMENT_PREFIX) {
                comments.push(line.to_string());
            } else {
                comments.push(format!("{COMMENT_PREFIX}{line}"));
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }
        if line.starts_with(COMMENT_PREFIX) {
            comments.push(line.to_string());
        } else {
            rows.push(line.to_string());
        }
    }

    rows.sort_by(|left, right| compare_rows(left, right));

    for line in comments.iter().chain(rows.iter()) {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(rows.len())
}

fn compare_rows(left: &str, right: &str) -> Ordering {
    let left_name = left.split('\t').nth(SEQNAME_COLUMN).unwrap_or_default();
    let right_name = right.split('\t').nth(SEQNAME_COLUMN).unwrap_or_default();
    left_name
        .cmp(right_name)
        .then_with(|| start_of(left).cmp(&start_of(right)))
}

fn start_of(line: &str) -> i64 {
    line.split('\t')
        .nth(START_COLUMN)
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

/// Advisory lock on `<source>.lock` serializing index builds for one
/// source. The OS releases it when the holder exits, however it exits, so a
/// leftover lock file never blocks a later build.
#[derive(Debug)]
struct BuildLock {
    file: File,
}

impl BuildLock {
    fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= timeout {
                        return Err(AppError::Io(std::io::Error::other(format!(
                            "timed out waiting for index build lock {}",
                            path.display()
                        ))));
                    }
                    debug!(lock = %path.display(), "waiting for concurrent index build");
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Self { file })
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!(error = %err, "failed to release index build lock");
        }
    }
}
