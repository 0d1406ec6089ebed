use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::RetrievalError;

/// Prefix marking a commit header in numstat output, so headers can't be
/// confused with `added\tremoved\tpath` lines.
pub const NUMSTAT_SENTINEL: &str = "__COMMIT__";

const HEADER_FORMAT: &str = "%H|%an|%at|%s";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One aggregate summary line per commit.
    #[default]
    Shortstat,
    /// One line per touched file.
    Numstat,
}

impl LogFormat {
    pub fn log_args(self) -> Vec<String> {
        match self {
            LogFormat::Shortstat => vec![
                "log".into(),
                "--shortstat".into(),
                format!("--format={HEADER_FORMAT}"),
                "--diff-algorithm=histogram".into(),
            ],
            LogFormat::Numstat => vec![
                "log".into(),
                "--numstat".into(),
                format!("--format={NUMSTAT_SENTINEL}{HEADER_FORMAT}"),
            ],
        }
    }
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_log(&self, url: &str, format: LogFormat) -> Result<Vec<u8>, RetrievalError>;
}

/// Retrieves history by shelling out to `git`: a bare single-branch clone
/// into a scratch directory, then `git log` against it.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    scratch_root: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: "git".into(),
            scratch_root: None,
            timeout: None,
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, RetrievalError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("repo-analysis-");

        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(RetrievalError::Workspace)
    }

    async fn clone_bare(&self, url: &str, dest: &Path) -> Result<(), RetrievalError> {
        let mut command = Command::new(&self.program);
        command
            .args(["clone", "--bare", "--single-branch", "--quiet", url])
            .arg(dest);

        let output = self.run(command, "git clone").await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(url, status = %output.status, %stderr, "git clone failed");
            return Err(RetrievalError::Clone {
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(())
    }

    async fn log(&self, git_dir: &Path, format: LogFormat) -> Result<Vec<u8>, RetrievalError> {
        let mut command = Command::new(&self.program);
        command.arg("--git-dir").arg(git_dir).args(format.log_args());

        let output = self.run(command, "git log").await?;
        if !output.status.success() {
            return Err(RetrievalError::Log {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    async fn run(&self, mut command: Command, stage: &'static str) -> Result<Output, RetrievalError> {
        command.kill_on_drop(true);

        let output = command.output();
        let result = match self.timeout {
            Some(after) => tokio::time::timeout(after, output)
                .await
                .map_err(|_| RetrievalError::Timeout { stage, after })?,
            None => output.await,
        };

        result.map_err(|source| RetrievalError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

#[async_trait]
impl HistorySource for GitCli {
    async fn fetch_log(&self, url: &str, format: LogFormat) -> Result<Vec<u8>, RetrievalError> {
        // Removed when dropped, whichever way this function returns.
        let scratch = self.scratch_dir()?;
        debug!(url, dir = %scratch.path().display(), "created scratch directory");

        let clone_start = Instant::now();
        self.clone_bare(url, scratch.path()).await?;
        let clone_ms = clone_start.elapsed().as_millis() as u64;
        info!(url, elapsed_ms = clone_ms, "git clone completed");

        let log_start = Instant::now();
        let stdout = self.log(scratch.path(), format).await?;
        info!(
            url,
            elapsed_ms = log_start.elapsed().as_millis() as u64,
            bytes = stdout.len(),
            ?format,
            "git log completed"
        );

        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortstat_args_use_pipe_header() {
        let args = LogFormat::Shortstat.log_args();
        assert_eq!(args[0], "log");
        assert!(args.contains(&"--shortstat".to_string()));
        assert!(args.contains(&"--format=%H|%an|%at|%s".to_string()));
    }

    #[test]
    fn numstat_args_prefix_sentinel() {
        let args = LogFormat::Numstat.log_args();
        assert!(args.contains(&"--numstat".to_string()));
        assert!(args.contains(&format!("--format={NUMSTAT_SENTINEL}%H|%an|%at|%s")));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let scratch = tempfile::tempdir().unwrap();
        let git = GitCli::new()
            .with_program("gitback-definitely-not-installed")
            .with_scratch_root(scratch.path());

        let err = git
            .fetch_log("https://example.invalid/a/b.git", LogFormat::Shortstat)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Spawn { .. }));

        let leftovers = std::fs::read_dir(scratch.path()).unwrap().count();
        assert_eq!(leftovers, 0, "scratch directory must be removed on failure");
    }
}
