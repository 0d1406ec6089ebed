mod writeback;

pub use writeback::{WriteBehind, WriteJob};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::AnalysisCache;
use crate::clock::Clock;
use crate::error::{AnalysisError, classify_retrieval_failure};
use crate::git::{HistorySource, LogFormat};
use crate::github::Enricher;
use crate::model::{AnalysisResponse, AnalyzeRequest, RepoAnalysis, RepoKey};
use crate::parse::{self, ParseOptions, ParsedLog};
use crate::stats;
use crate::store::{RepoRecord, RepoStore};

#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub remote_base: String,
    pub format: LogFormat,
    pub histogram_points: usize,
    pub top_files: usize,
    pub message_limit: Option<usize>,
    pub discussion_count: usize,
    pub skip_cache: bool,
    pub write_workers: usize,
    pub write_queue: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            remote_base: "https://github.com".into(),
            format: LogFormat::Shortstat,
            histogram_points: 10,
            top_files: 100,
            message_limit: Some(100),
            discussion_count: 5,
            skip_cache: false,
            write_workers: 2,
            write_queue: 256,
        }
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub history: Arc<dyn HistorySource>,
    pub enricher: Arc<dyn Enricher>,
    pub cache: AnalysisCache,
    pub store: Arc<dyn RepoStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub response: AnalysisResponse,
    pub from_cache: bool,
}

pub struct Analyzer {
    history: Arc<dyn HistorySource>,
    enricher: Arc<dyn Enricher>,
    cache: AnalysisCache,
    clock: Arc<dyn Clock>,
    writes: WriteBehind,
    settings: AnalyzerSettings,
}

impl Analyzer {
    pub fn new(collaborators: Collaborators, settings: AnalyzerSettings) -> Self {
        let writes = WriteBehind::spawn(
            settings.write_workers,
            settings.write_queue,
            collaborators.cache.clone(),
            collaborators.store,
        );

        Self {
            history: collaborators.history,
            enricher: collaborators.enricher,
            cache: collaborators.cache,
            clock: collaborators.clock,
            writes,
            settings,
        }
    }

    pub async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisOutcome, AnalysisError> {
        let key = request.validate()?;
        let started = Instant::now();

        if !self.settings.skip_cache {
            if let Some(response) = self.cache.get(&key).await {
                self.writes.submit(WriteJob::RecordView { key: key.clone() });
                info!(repo = %key, elapsed_ms = started.elapsed().as_millis() as u64, "served from cache");
                return Ok(AnalysisOutcome {
                    response,
                    from_cache: true,
                });
            }
        }

        let parsed = self.retrieve_and_parse(&key).await?;
        let response = self.build_response(&key, parsed).await;

        self.schedule_writes(&key, &response);

        info!(
            repo = %key,
            commits = response.analysis.total_commits,
            contributors = response.analysis.total_contributors,
            added = response.analysis.total_added,
            removed = response.analysis.total_removed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis completed"
        );

        Ok(AnalysisOutcome {
            response,
            from_cache: false,
        })
    }

    pub async fn shutdown(self) {
        self.writes.drain().await;
    }

    async fn retrieve_and_parse(&self, key: &RepoKey) -> Result<ParsedLog, AnalysisError> {
        let url = key.remote_url(&self.settings.remote_base);
        let format = self.settings.format;

        let retrieve_start = Instant::now();
        let raw = self.history.fetch_log(&url, format).await.map_err(|e| {
            let err = classify_retrieval_failure(key, &e.to_string());
            warn!(repo = %key, error = %e, not_found = err.is_not_found(), "retrieval failed");
            err
        })?;
        debug!(
            repo = %key,
            bytes = raw.len(),
            estimated_commits = parse::estimate_commits(&raw, format),
            elapsed_ms = retrieve_start.elapsed().as_millis() as u64,
            "retrieved history"
        );

        let options = ParseOptions {
            message_limit: self.settings.message_limit,
            fallback_timestamp: self.clock.now().timestamp(),
        };

        let parse_start = Instant::now();
        let parsed = tokio::task::spawn_blocking(move || parse::parse_log(&raw, format, &options))
            .await
            .map_err(|e| AnalysisError::Task(e.to_string()))??;

        if !parsed.warnings.is_empty() {
            debug!(
                repo = %key,
                skipped_lines = parsed.warnings.len(),
                first = %parsed.warnings[0].reason,
                "skipped unparseable log lines"
            );
        }
        debug!(
            repo = %key,
            commits = parsed.commits.len(),
            elapsed_ms = parse_start.elapsed().as_millis() as u64,
            "parsed history"
        );

        Ok(parsed)
    }

    async fn build_response(&self, key: &RepoKey, parsed: ParsedLog) -> AnalysisResponse {
        let totals = stats::summarize(&parsed.commits);
        let lines_histogram = stats::lines_histogram(&parsed.commits, self.settings.histogram_points);
        let most_touched_files = stats::top_touched(&parsed.touches, self.settings.top_files);

        let (metadata, discussions) = tokio::join!(
            self.enricher.fetch_metadata(key),
            self.enricher
                .fetch_top_discussions(key, self.settings.discussion_count)
        );

        let metadata = metadata
            .inspect_err(|e| warn!(repo = %key, error = %format!("{e:#}"), "failed to fetch repo metadata"))
            .ok();
        let pull_requests = discussions
            .inspect_err(|e| warn!(repo = %key, error = %format!("{e:#}"), "failed to fetch top pull requests"))
            .ok();

        AnalysisResponse {
            analysis: RepoAnalysis {
                total_added: totals.total_added,
                total_removed: totals.total_removed,
                total_contributors: totals.total_contributors,
                total_commits: totals.total_commits,
                lines_histogram,
                most_touched_files,
                metadata,
                pull_requests,
            },
            commits: parsed.commits,
        }
    }

    fn schedule_writes(&self, key: &RepoKey, response: &AnalysisResponse) {
        let record = RepoRecord::from_analysis(key, &response.analysis, self.clock.now());

        self.writes.submit(WriteJob::Fresh {
            key: key.clone(),
            record: Box::new(record),
            response: Box::new(response.clone()),
        });
    }
}
