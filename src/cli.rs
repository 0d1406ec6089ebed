use clap::{Parser, Subcommand};
use gitback::git::LogFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gitback",
    version,
    about = "Commit-history analysis: line growth, contributors and hot files for a repository"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, env = "GITBACK_CONFIG", help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory for cached analyses and the repo store")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Base URL repositories are cloned from (default: https://github.com)")]
    pub remote_base: Option<String>,

    #[arg(long, global = true, env = "GITHUB_API_URL", help = "GitHub REST API base URL")]
    pub github_api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Analyze one repository and print the result as JSON")]
    Analyze {
        #[arg(help = "Repository owner")]
        owner: String,
        #[arg(help = "Repository name")]
        repo: String,
        #[arg(long, value_enum, help = "Log shape to request from git")]
        format: Option<LogFormat>,
        #[arg(long, help = "Ignore cached results")]
        no_cache: bool,
    },
    #[command(about = "Warm the cache by sending many repositories to a running analyze endpoint")]
    FillCache {
        #[arg(long, help = "Analyze endpoint base URL (default: http://localhost:8080)")]
        api_url: Option<String>,
        #[arg(long, short, help = "Concurrent requests")]
        workers: Option<usize>,
        #[arg(long = "repo", help = "Extra owner/repo to include (repeatable)")]
        repos: Vec<String>,
        #[arg(long, help = "Only analyze configured and --repo entries; do not add repositories from the store")]
        no_discover: bool,
        #[arg(long, help = "Hide the progress bar")]
        quiet: bool,
    },
    #[command(about = "List stored repositories with the most net lines")]
    Top {
        #[arg(long, short, default_value = "100", help = "Maximum number of rows")]
        limit: usize,
    },
    #[command(about = "Drop the cached analysis for a repository")]
    CacheClear {
        #[arg(help = "Repository owner")]
        owner: String,
        #[arg(help = "Repository name")]
        repo: String,
    },
}
