use crate::errors::{AppError, Result};
use crate::federator::RangeLookup;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTools {
    pub tabix: String,
}

impl ExternalTools {
    pub fn new(tabix: impl Into<String>) -> Self {
        Self {
            tabix: tabix.into(),
        }
    }

    /// bgzip is expected next to the configured tabix binary.
    pub fn bgzip(&self) -> String {
        if self.tabix.ends_with("tabix") {
            self.tabix.trim_end_matches("tabix").to_string() + "bgzip"
        } else {
            "bgzip".to_string()
        }
    }

    pub fn tabix_query_command(&self, archive: &str, region: &str) -> Vec<String> {
        vec![self.tabix.clone(), archive.to_string(), region.to_string()]
    }

    /// Rows of `archive` overlapping `region`, as raw tab-delimited lines.
    pub fn run_tabix_query(&self, archive: &str, region: &str) -> Result<Vec<String>> {
        let mut command = Command::new(&self.tabix);
        command.arg(archive).arg(region);
        let output = self.run_captured(command, &self.tabix)?;
        if !output.status.success() {
            return Err(AppError::CommandFailed {
                command: self.tabix_query_command(archive, region).join(" "),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        let stdout = String::from_utf8(output.stdout).map_err(|err| AppError::MalformedOutput {
            query: region.to_string(),
            reason: format!("output is not valid UTF-8: {err}"),
        })?;
        Ok(stdout
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn bgzip_compress_to(&self, input_path: &Path, output_path: &Path) -> Result<()> {
        let output_file = File::create(output_path)?;
        let mut command = Command::new(self.bgzip());
        command
            .arg("-c")
            .arg(input_path)
            .stdout(Stdio::from(output_file));
        let status = command.status().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AppError::CommandNotFound {
                    command: self.bgzip(),
                }
            } else {
                AppError::Io(err)
            }
        })?;

        if !status.success() {
            return Err(AppError::CommandFailed {
                command: format!("{} -c {}", self.bgzip(), input_path.display()),
                code: status.code(),
                stderr: String::new(),
            });
        }
        Ok(())
    }

    /// Builds a `.tbi` index with the GFF column preset (name 1, start 4, end 5).
    pub fn tabix_index_gff(&self, archive: &Path) -> Result<()> {
        let mut command = Command::new(&self.tabix);
        command.arg("-f").arg("-p").arg("gff").arg(archive);
        let output = self.run_captured(command, &self.tabix)?;
        if !output.status.success() {
            return Err(AppError::CommandFailed {
                command: format!("{} -f -p gff {}", self.tabix, archive.display()),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }

    fn run_captured(&self, mut command: Command, command_name: &str) -> Result<Output> {
        debug!(command = ?command, "running external command");
        command.stdin(Stdio::null()).output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AppError::CommandNotFound {
                    command: command_name.to_string(),
                }
            } else {
                AppError::Io(err)
            }
        })
    }

    pub fn exists_command(&self, cmd: &str) -> bool {
        if Path::new(cmd).exists() {
            return true;
        }
        std::env::var_os("PATH").is_some_and(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(cmd))
                .any(|full| full.exists())
        })
    }
}

/// Range lookups answered by `tabix` against a bgzip archive.
#[derive(Debug, Clone)]
pub struct TabixLookup {
    tools: ExternalTools,
    archive: String,
}

impl TabixLookup {
    pub fn new(tools: ExternalTools, archive: &Path) -> Self {
        Self {
            tools,
            archive: archive.to_string_lossy().into_owned(),
        }
    }
}

impl RangeLookup for TabixLookup {
    fn lookup(&self, region: &str) -> Result<Vec<String>> {
        self.tools.run_tabix_query(&self.archive, region)
    }
}
