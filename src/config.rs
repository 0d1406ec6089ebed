//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The binary applies its command-line flags last.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::git::LogFormat;
use crate::github::DEFAULT_API_URL;
use crate::model::RepoKey;
use crate::pipeline::AnalyzerSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote_base: String,
    /// Holds cache objects and the repository store file.
    pub data_dir: PathBuf,
    pub format: LogFormat,
    pub histogram_points: usize,
    pub top_files: usize,
    /// Commit subjects are cut to this many characters. 0 keeps them whole.
    pub message_limit: usize,
    /// 0 lets git run as long as it needs.
    pub git_timeout_secs: u64,
    pub write_workers: usize,
    pub write_queue: usize,
    pub skip_cache: bool,
    pub github: GitHubConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub discussion_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub api_url: String,
    pub workers: usize,
    /// `owner/repo` entries always included in a batch run.
    pub repos: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_base: "https://github.com".into(),
            data_dir: PathBuf::from(".gitback"),
            format: LogFormat::Shortstat,
            histogram_points: 10,
            top_files: 100,
            message_limit: 100,
            git_timeout_secs: 600,
            write_workers: 2,
            write_queue: 256,
            skip_cache: false,
            github: GitHubConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            token: None,
            discussion_count: 5,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".into(),
            workers: 8,
            repos: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("GITHUB_TOKEN").filter(|t| !t.is_empty()) {
            self.github.token = Some(token);
        }
        if let Some(url) = lookup("API_URL").filter(|u| !u.is_empty()) {
            self.batch.api_url = url;
        }
        if let Some(dir) = lookup("GITBACK_DATA_DIR").filter(|d| !d.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.histogram_points == 0 {
            bail!("histogram_points must be at least 1");
        }
        if self.batch.workers == 0 {
            bail!("batch.workers must be at least 1");
        }
        if self.write_workers == 0 {
            bail!("write_workers must be at least 1");
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("repos.json")
    }

    pub fn git_timeout(&self) -> Option<Duration> {
        (self.git_timeout_secs > 0).then(|| Duration::from_secs(self.git_timeout_secs))
    }

    pub fn batch_repos(&self) -> Result<Vec<RepoKey>> {
        self.batch
            .repos
            .iter()
            .map(|entry| {
                entry
                    .parse::<RepoKey>()
                    .with_context(|| format!("Invalid batch repo entry: {entry}"))
            })
            .collect()
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            remote_base: self.remote_base.trim_end_matches('/').to_string(),
            format: self.format,
            histogram_points: self.histogram_points,
            top_files: self.top_files,
            message_limit: (self.message_limit > 0).then_some(self.message_limit),
            discussion_count: self.github.discussion_count,
            skip_cache: self.skip_cache,
            write_workers: self.write_workers,
            write_queue: self.write_queue,
        }
    }
}
