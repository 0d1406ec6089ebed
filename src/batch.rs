use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::model::RepoKey;

pub const DEFAULT_WORKERS: usize = 8;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Explicit targets first, then discovered ones whose `owner/repo` (compared
/// case-insensitively) was not already listed.
pub fn merge_targets(explicit: &[RepoKey], discovered: &[RepoKey]) -> Vec<RepoKey> {
    let mut merged: IndexMap<String, RepoKey> = IndexMap::new();

    for key in explicit {
        merged.insert(key.normalized(), key.clone());
    }
    for key in discovered {
        merged
            .entry(key.normalized())
            .or_insert_with(|| key.clone());
    }

    merged.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub index: usize,
    pub key: RepoKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplySummary {
    pub net_lines: i64,
    pub contributors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkResult {
    pub repo: String,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
    pub summary: Option<ReplySummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointReply {
    Success(Option<ReplySummary>),
    NotFound,
    Status(u16),
}

#[async_trait]
pub trait AnalyzeEndpoint: Send + Sync {
    async fn analyze(&self, key: &RepoKey) -> Result<EndpointReply>;
}

#[derive(Serialize)]
struct RequestBody<'a> {
    owner: &'a str,
    repo: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyBody {
    total_added: u64,
    total_removed: u64,
    total_contributors: usize,
}

#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    http: Client,
    url: String,
}

impl HttpEndpoint {
    pub fn new(api_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            url: format!("{}/api/analyze", api_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AnalyzeEndpoint for HttpEndpoint {
    async fn analyze(&self, key: &RepoKey) -> Result<EndpointReply> {
        let response = self
            .http
            .post(&self.url)
            .json(&RequestBody {
                owner: &key.owner,
                repo: &key.repo,
            })
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.url))?;

        match response.status() {
            StatusCode::OK => {
                let summary = response
                    .json::<ReplyBody>()
                    .await
                    .ok()
                    .map(|body| ReplySummary {
                        net_lines: body.total_added as i64 - body.total_removed as i64,
                        contributors: body.total_contributors,
                    });
                Ok(EndpointReply::Success(summary))
            }
            StatusCode::NOT_FOUND => Ok(EndpointReply::NotFound),
            status => Ok(EndpointReply::Status(status.as_u16())),
        }
    }
}

#[derive(Default)]
struct Tally {
    results: Vec<WorkResult>,
    succeeded: usize,
    failed: usize,
}

pub struct BatchDriver {
    endpoint: Arc<dyn AnalyzeEndpoint>,
    workers: usize,
    progress: bool,
}

impl BatchDriver {
    pub fn new(endpoint: Arc<dyn AnalyzeEndpoint>) -> Self {
        Self {
            endpoint,
            workers: DEFAULT_WORKERS,
            progress: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, targets: Vec<RepoKey>) -> BatchReport {
        let total = targets.len();
        info!(total, workers = self.workers, "starting batch run");

        // Every item is queued before any worker starts, then the queue is
        // closed so workers exit once it is empty.
        let (sender, receiver) = mpsc::channel(total.max(1));
        for (index, key) in targets.into_iter().enumerate() {
            if sender.send(WorkItem { index, key }).await.is_err() {
                break;
            }
        }
        drop(sender);

        let pb = if self.progress {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .expect("valid template")
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let receiver = Arc::new(Mutex::new(receiver));
        let tally = Arc::new(Mutex::new(Tally::default()));
        let mut join_set = JoinSet::new();

        for worker in 1..=self.workers {
            let receiver = Arc::clone(&receiver);
            let tally = Arc::clone(&tally);
            let endpoint = Arc::clone(&self.endpoint);
            let pb = pb.clone();

            join_set.spawn(async move {
                loop {
                    let item = receiver.lock().await.recv().await;
                    let Some(item) = item else { break };

                    info!(worker, item = item.index + 1, total, repo = %item.key, "analyzing");
                    pb.set_message(item.key.to_string());

                    let result = dispatch(endpoint.as_ref(), &item.key).await;

                    let mut tally = tally.lock().await;
                    if result.success {
                        tally.succeeded += 1;
                    } else {
                        tally.failed += 1;
                    }
                    tally.results.push(result);
                    drop(tally);

                    pb.inc(1);
                }
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "batch worker panicked");
            }
        }
        pb.finish_and_clear();

        let tally = std::mem::take(&mut *tally.lock().await);
        BatchReport::new(tally.results, tally.succeeded, tally.failed, total)
    }
}

async fn dispatch(endpoint: &dyn AnalyzeEndpoint, key: &RepoKey) -> WorkResult {
    let start = Instant::now();
    let reply = endpoint.analyze(key).await;
    let duration = start.elapsed();
    let repo = key.to_string();

    let failed = |error: String| {
        warn!(repo = %key, elapsed_ms = duration.as_millis() as u64, %error, "analysis request failed");
        WorkResult {
            repo: repo.clone(),
            duration,
            success: false,
            error: Some(error),
            summary: None,
        }
    };

    match reply {
        Ok(EndpointReply::Success(summary)) => {
            match summary {
                Some(s) => info!(repo = %key, net_lines = s.net_lines, contributors = s.contributors, elapsed_ms = duration.as_millis() as u64, "analysis succeeded"),
                None => info!(repo = %key, elapsed_ms = duration.as_millis() as u64, "analysis succeeded (cached or processing)"),
            }
            WorkResult {
                repo: repo.clone(),
                duration,
                success: true,
                error: None,
                summary,
            }
        }
        Ok(EndpointReply::NotFound) => failed("Repository not found (404)".into()),
        Ok(EndpointReply::Status(code)) => failed(format!("HTTP status {code}")),
        Err(e) => failed(format!("{e:#}")),
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<WorkResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchReport {
    pub fn new(mut results: Vec<WorkResult>, succeeded: usize, failed: usize, total: usize) -> Self {
        results.sort_by(|a, b| b.duration.cmp(&a.duration));
        Self {
            results,
            succeeded,
            failed,
            total,
        }
    }

    pub fn mean_duration(&self) -> Duration {
        if self.results.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.results.iter().map(|r| r.duration).sum();
        sum / self.results.len() as u32
    }

    pub fn successes(&self) -> impl Iterator<Item = &WorkResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "=== Request times (longest first) ===");
        for result in &self.results {
            let mark = if result.success { "✓" } else { "✗" };
            let _ = write!(out, "{mark} {} - {:?}", result.repo, result.duration);
            if let Some(summary) = result.summary {
                let _ = write!(
                    out,
                    " ({} lines, {} contributors)",
                    summary.net_lines, summary.contributors
                );
            }
            out.push('\n');
        }

        let _ = writeln!(out, "\n=== Average request time ===");
        let _ = writeln!(out, "Average: {:?}", self.mean_duration());

        let _ = writeln!(out, "\n=== Failed requests ===");
        let mut any_failed = false;
        for result in self.failures() {
            any_failed = true;
            let _ = writeln!(
                out,
                "✗ {} - {}",
                result.repo,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        if !any_failed {
            let _ = writeln!(out, "No failed requests");
        }

        let _ = writeln!(out, "\n=== Summary ===");
        let _ = writeln!(out, "Success: {}", self.succeeded);
        let _ = writeln!(out, "Failed:  {}", self.failed);
        let _ = writeln!(out, "Total:   {}", self.total);

        out
    }
}
