#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const FAKE_BGZIP: &str = "#!/bin/sh\ncat \"$2\"\n";

// Index mode touches the .tbi; query mode returns every row of the entity.
const FAKE_TABIX: &str = r#"#!/bin/sh
dir=$(dirname "$0")
if [ "$1" = "-f" ]; then
    echo "$4" >> "$dir/index.log"
    touch "$4.tbi"
    exit 0
fi
echo "$2" >> "$dir/calls.log"
entity=${2%%:*}
awk -F '\t' -v e="$entity" '$1 == e' "$1" || true
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("expected tempdir");
        let root = dir.path().to_path_buf();
        let bin = root.join("bin");
        fs::create_dir(&bin).expect("expected bin dir");
        write_script(&bin.join("tabix"), FAKE_TABIX);
        write_script(&bin.join("bgzip"), FAKE_BGZIP);

        fs::write(
            root.join("appris.tsv"),
            concat!(
                "seqname\tsource\tfeature\tstart\tend\tname\n",
                "P2\tappris\tcds\t1\t40\tB1\n",
                "P1\tappris\tcds\t5\t30\tA1\n",
                "P3\tappris\tcds\t2\t9\tC1\n",
            ),
        )
        .expect("expected database fixture");
        fs::write(
            root.join("queries.tsv"),
            concat!("q\tb\te\n", "P1;P2\t10;20\t15;25\n", "P1\t10\t15\n", "NA\t1\t2\n"),
        )
        .expect("expected query fixture");

        Self { _dir: dir, root }
    }

    fn path(&self, name: &str) -> String {
        self.root.join(name).to_string_lossy().to_string()
    }

    fn log_lines(&self, name: &str) -> Vec<String> {
        fs::read_to_string(self.root.join("bin").join(name))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn run(&self, extra: &[&str]) -> Output {
        let tabix = self.path("bin/tabix");
        let input = self.path("queries.tsv");
        let database = self.path("appris.tsv");
        let output = self.path("annots.tsv");
        let mut args = vec![
            "-w",
            "3",
            "-T",
            tabix.as_str(),
            "-i",
            input.as_str(),
            "-c",
            "q,b,e",
            "-d",
            database.as_str(),
            "-o",
            output.as_str(),
        ];
        args.extend_from_slice(extra);
        Command::new(env!("CARGO_BIN_EXE_get_annotations"))
            .args(&args)
            .output()
            .expect("expected get_annotations binary to run")
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("expected script write");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("expected chmod");
}

#[test]
fn looks_up_each_distinct_region_once_and_merges_by_key() {
    let fixture = Fixture::new();
    let output = fixture.run(&[]);
    assert!(
        output.status.success(),
        "get_annotations failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let mut calls = fixture.log_lines("calls.log");
    calls.sort();
    assert_eq!(calls, ["P1:10-15", "P1:20-25", "P2:10-15", "P2:20-25"]);

    let content = fs::read_to_string(fixture.path("annots.tsv")).expect("expected output");
    let lines = content.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "query\tseqname\tsource\tfeature\tstart\tend\tname");
    assert_eq!(
        &lines[1..],
        [
            "P1:10-15\tP1\tappris\tcds\t5\t30\tA1",
            "P1;P2:10;20-15;25\tP1\tappris\tcds\t5\t30\tA1",
            "P1;P2:10;20-15;25\tP2\tappris\tcds\t1\t40\tB1",
        ]
    );

    let archive = fs::read_to_string(fixture.path("appris.tsv.gz")).expect("expected archive");
    assert!(archive.starts_with("#seqname\t"));
    assert!(archive.find("\nP1\t") < archive.find("\nP2\t"));
}

#[test]
fn second_run_reuses_cached_index() {
    let fixture = Fixture::new();
    let first = fixture.run(&[]);
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    let archive_time = fs::metadata(fixture.path("appris.tsv.gz"))
        .and_then(|metadata| metadata.modified())
        .expect("expected archive mtime");

    let second = fixture.run(&[]);
    assert!(second.status.success(), "{}", String::from_utf8_lossy(&second.stderr));

    assert_eq!(fixture.log_lines("index.log").len(), 1);
    let reused_time = fs::metadata(fixture.path("appris.tsv.gz"))
        .and_then(|metadata| metadata.modified())
        .expect("expected archive mtime");
    assert_eq!(archive_time, reused_time);
}

#[test]
fn lock_file_left_by_killed_run_does_not_block_build() {
    let fixture = Fixture::new();
    fs::write(fixture.path("appris.tsv.lock"), "999999\n").expect("expected leftover lock");

    let output = fixture.run(&[]);
    assert!(
        output.status.success(),
        "get_annotations failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(fixture.log_lines("index.log").len(), 1);
    assert!(Path::new(&fixture.path("appris.tsv.gz")).exists());
}

#[test]
fn failed_lookups_follow_the_error_policy() {
    let fixture = Fixture::new();
    write_script(&fixture.root.join("bin/tabix"), &FAKE_TABIX.replace("|| true", "; exit 3"));

    let dropped = fixture.run(&[]);
    assert!(dropped.status.success(), "{}", String::from_utf8_lossy(&dropped.stderr));
    let content = fs::read_to_string(fixture.path("annots.tsv")).expect("expected output");
    assert_eq!(content.lines().count(), 1);

    let failed = fixture.run(&["--on-error", "fail-fast"]);
    assert_eq!(failed.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&failed.stderr).contains("get_annotations: query"));
}

#[test]
fn missing_database_is_fatal() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.root.join("appris.tsv")).expect("expected fixture removal");

    let output = fixture.run(&[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("annotation source file does not exist"), "stderr: {stderr}");
    assert!(fixture.log_lines("calls.log").is_empty());
}
