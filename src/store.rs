use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::model::{RepoAnalysis, RepoKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoRecord {
    pub username: String,
    pub repo_name: String,
    pub total_additions: u64,
    pub total_lines: i64,
    pub total_removals: u64,
    #[serde(default)]
    pub views: u64,
    pub lines_histogram: Vec<i64>,
    #[serde(default)]
    pub total_stars: u64,
    pub total_commits: usize,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cached_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RepoRecord {
    pub fn from_analysis(key: &RepoKey, analysis: &RepoAnalysis, now: DateTime<Utc>) -> Self {
        let metadata = analysis.metadata.clone().unwrap_or_default();

        Self {
            username: key.owner.clone(),
            repo_name: key.repo.clone(),
            total_additions: analysis.total_added,
            total_lines: analysis.net_lines(),
            total_removals: analysis.total_removed,
            views: 0,
            lines_histogram: analysis.lines_histogram.clone(),
            total_stars: metadata.stargazers_count,
            total_commits: analysis.total_commits,
            language: metadata.language,
            size: metadata.size,
            last_cached_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn key(&self) -> RepoKey {
        RepoKey::new(self.username.clone(), self.repo_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopRepoFilter {
    pub limit: usize,
    pub exclude_repo: Option<String>,
    /// Rows must have strictly more net lines than this.
    pub min_lines: i64,
    /// Rows must have strictly more commits than this.
    pub min_commits: usize,
}

impl Default for TopRepoFilter {
    fn default() -> Self {
        Self {
            limit: 100,
            exclude_repo: Some("linux".into()),
            min_lines: 0,
            min_commits: 1,
        }
    }
}

impl TopRepoFilter {
    fn admits(&self, record: &RepoRecord) -> bool {
        self.exclude_repo.as_deref() != Some(record.repo_name.as_str())
            && record.total_lines > self.min_lines
            && record.total_commits > self.min_commits
    }
}

#[async_trait]
pub trait RepoStore: Send + Sync {
    async fn upsert(&self, record: RepoRecord) -> Result<()>;

    async fn increment_view_count(&self, key: &RepoKey) -> Result<bool>;

    async fn fetch_top_by_lines(&self, filter: &TopRepoFilter) -> Result<Vec<RepoRecord>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    repos: BTreeMap<String, RepoRecord>,
}

// Rows are keyed case-insensitively, like cache entries.
fn row_id(owner: &str, repo: &str) -> String {
    RepoKey::new(owner, repo).normalized()
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoreFile> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(StoreFile::default());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    async fn save(&self, file: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl RepoStore for JsonFileStore {
    async fn upsert(&self, mut record: RepoRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;

        let id = row_id(&record.username, &record.repo_name);
        if let Some(existing) = file.repos.get(&id) {
            record.views = existing.views;
        }
        info!(repo = %id, total_lines = record.total_lines, "saved repo data");
        file.repos.insert(id, record);

        self.save(&file).await
    }

    async fn increment_view_count(&self, key: &RepoKey) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;

        let Some(record) = file.repos.get_mut(&row_id(&key.owner, &key.repo)) else {
            debug!(repo = %key, "no repo found to increment views");
            return Ok(false);
        };
        record.views += 1;

        self.save(&file).await?;
        Ok(true)
    }

    async fn fetch_top_by_lines(&self, filter: &TopRepoFilter) -> Result<Vec<RepoRecord>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;

        let mut rows: Vec<RepoRecord> = file
            .repos
            .into_values()
            .filter(|r| filter.admits(r))
            .collect();
        rows.sort_by(|a, b| b.total_lines.cmp(&a.total_lines));
        rows.truncate(filter.limit);

        Ok(rows)
    }
}
