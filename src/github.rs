use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::model::{DiscussionList, RepoKey, RepoMetadata};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const ACCEPT_V3: &str = "application/vnd.github.v3+json";

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn fetch_metadata(&self, key: &RepoKey) -> Result<RepoMetadata>;

    async fn fetch_top_discussions(&self, key: &RepoKey, count: usize) -> Result<DiscussionList>;
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: Option<String>,
    created_range: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build GitHub HTTP client")?;

        let year = Utc::now().year();
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            created_range: format!("{year}-01-01..{year}-12-31"),
        })
    }

    /// Restricts discussion search to items created in this range
    /// (GitHub search syntax, e.g. `2024-01-01..2024-12-31`).
    pub fn with_created_range(mut self, range: impl Into<String>) -> Self {
        self.created_range = range.into();
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, ACCEPT_V3)
            .header(USER_AGENT, concat!("gitback/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GitHub API returned status {}", status.as_u16());
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode GitHub response: {url}"))
    }
}

#[async_trait]
impl Enricher for GitHubClient {
    async fn fetch_metadata(&self, key: &RepoKey) -> Result<RepoMetadata> {
        let url = format!("{}/repos/{}/{}", self.api_url, key.owner, key.repo);
        self.get_json(&url).await
    }

    async fn fetch_top_discussions(&self, key: &RepoKey, count: usize) -> Result<DiscussionList> {
        let url = format!(
            "{}/search/issues?q=repo:{}/{}+type:pr+created:{}&sort=reactions&order=desc&per_page={}",
            self.api_url, key.owner, key.repo, self.created_range, count
        );

        let list: DiscussionList = self.get_json(&url).await?;
        debug!(repo = %key, items = list.items.len(), "fetched top pull requests");
        Ok(list)
    }
}
