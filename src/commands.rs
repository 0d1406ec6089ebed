use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use gitback::batch::{self, BatchDriver, HttpEndpoint};
use gitback::cache::{AnalysisCache, FsObjectStore};
use gitback::clock::SystemClock;
use gitback::config::Config;
use gitback::git::GitCli;
use gitback::github::GitHubClient;
use gitback::model::{AnalyzeRequest, RepoKey};
use gitback::pipeline::{Analyzer, Collaborators};
use gitback::store::{JsonFileStore, RepoStore, TopRepoFilter};

fn cache(config: &Config) -> AnalysisCache {
    AnalysisCache::new(
        Arc::new(FsObjectStore::new(config.cache_dir())),
        Arc::new(SystemClock),
    )
}

pub async fn analyze(config: &Config, owner: String, repo: String) -> Result<()> {
    let history = GitCli::new().with_timeout(config.git_timeout());
    let enricher = GitHubClient::new(&config.github.api_url, config.github.token.clone())?;

    let analyzer = Analyzer::new(
        Collaborators {
            history: Arc::new(history),
            enricher: Arc::new(enricher),
            cache: cache(config),
            store: Arc::new(JsonFileStore::new(config.store_path())),
            clock: Arc::new(SystemClock),
        },
        config.analyzer_settings(),
    );

    let result = analyzer.analyze(&AnalyzeRequest { owner, repo }).await;
    analyzer.shutdown().await;
    let outcome = result?;

    println!("{}", serde_json::to_string_pretty(&outcome.response)?);
    if outcome.from_cache {
        info!("result came from cache");
    }

    Ok(())
}

pub async fn fill_cache(config: &Config, discover: bool, progress: bool) -> Result<()> {
    let explicit = config.batch_repos()?;

    let discovered = if discover {
        let store = JsonFileStore::new(config.store_path());
        match store.fetch_top_by_lines(&TopRepoFilter::default()).await {
            Ok(rows) => {
                info!(count = rows.len(), "found repositories in store");
                rows.iter().map(|r| r.key()).collect()
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to fetch repositories from store, continuing with explicit list");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let targets = batch::merge_targets(&explicit, &discovered);
    println!(
        "Filling cache with {} repositories ({} discovered + {} explicit, deduplicated)",
        targets.len(),
        discovered.len(),
        explicit.len()
    );
    println!("API URL: {}", config.batch.api_url);
    println!("Workers: {}\n", config.batch.workers);

    let endpoint = HttpEndpoint::new(&config.batch.api_url)?;
    let report = BatchDriver::new(Arc::new(endpoint))
        .with_workers(config.batch.workers)
        .with_progress(progress)
        .run(targets)
        .await;

    print!("{}", report.render());
    Ok(())
}

pub async fn top(config: &Config, limit: usize) -> Result<()> {
    let store = JsonFileStore::new(config.store_path());
    let rows = store
        .fetch_top_by_lines(&TopRepoFilter {
            limit,
            ..TopRepoFilter::default()
        })
        .await?;

    if rows.is_empty() {
        println!("No repositories stored in {}", store.path().display());
        return Ok(());
    }

    for (rank, row) in rows.iter().enumerate() {
        println!(
            "{:>4}. {}/{}  {} lines  {} commits  {} stars  {} views",
            rank + 1,
            row.username,
            row.repo_name,
            row.total_lines,
            row.total_commits,
            row.total_stars,
            row.views
        );
    }

    Ok(())
}

pub async fn cache_clear(config: &Config, owner: String, repo: String) -> Result<()> {
    let key = RepoKey::new(owner, repo);
    if cache(config).delete(&key).await {
        println!("Cleared cache for {key}");
    } else {
        println!("No cache entry for {key}");
    }
    Ok(())
}
