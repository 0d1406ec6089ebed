mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use gitback::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(base) = cli.remote_base {
        config.remote_base = base;
    }
    if let Some(url) = cli.github_api_url {
        config.github.api_url = url;
    }

    match cli.command {
        Commands::Analyze {
            owner,
            repo,
            format,
            no_cache,
        } => {
            if let Some(format) = format {
                config.format = format;
            }
            config.skip_cache |= no_cache;
            config.validate()?;
            commands::analyze(&config, owner, repo).await?;
        }
        Commands::FillCache {
            api_url,
            workers,
            repos,
            no_discover,
            quiet,
        } => {
            if let Some(url) = api_url {
                config.batch.api_url = url;
            }
            if let Some(workers) = workers {
                config.batch.workers = workers;
            }
            config.batch.repos.extend(repos);
            config.validate()?;
            commands::fill_cache(&config, !no_discover, !quiet).await?;
        }
        Commands::Top { limit } => {
            config.validate()?;
            commands::top(&config, limit).await?;
        }
        Commands::CacheClear { owner, repo } => {
            config.validate()?;
            commands::cache_clear(&config, owner, repo).await?;
        }
    }

    Ok(())
}
