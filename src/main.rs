//! rivals-crawl main entry point
//!
//! This is the command-line interface for one scheduled crawl run.

use anyhow::{Context, Result};
use clap::Parser;
use rivals_crawl::config::{load_config_with_hash, Config};
use rivals_crawl::crawler::{run_crawl, user_agent_string};
use rivals_crawl::output::{load_statistics, print_statistics, print_summary};
use rivals_crawl::storage::open_history;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// rivals-crawl: incremental crawler for a game-statistics API
///
/// Each invocation fetches the leaderboard, crawls the listed players, their
/// teammates and their matches, and appends what is new to the history
/// database.
#[derive(Parser, Debug)]
#[command(name = "rivals-crawl")]
#[command(version)]
#[command(about = "Incremental leaderboard, player and match crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Re-fetch matches already recorded in the history
    #[arg(long)]
    fresh: bool,

    /// Validate config and show the crawl plan without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the history database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, &config_hash, cli.fresh, cli.quiet).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("rivals_crawl=info,warn"),
            1 => EnvFilter::new("rivals_crawl=debug,info"),
            2 => EnvFilter::new("rivals_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the crawl plan
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("=== rivals-crawl Dry Run ===\n");

    println!("Endpoints:");
    println!("  Leaderboard: {}", config.api.leaderboard_url()?);
    println!("  Player: {}{}", config.api.base_url, config.api.player_path);
    println!("  Match: {}{}", config.api.base_url, config.api.match_path);
    println!("  Request timeout: {}s", config.api.request_timeout_secs);

    println!("\nCrawler Configuration:");
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!(
        "  Requests per minute: {}",
        config.crawler.requests_per_minute
    );
    println!(
        "  Attempts per entity: {} ({}ms apart)",
        config.crawler.max_attempts, config.crawler.retry_delay_ms
    );
    println!(
        "  Default Retry-After: {}ms",
        config.crawler.default_retry_after_ms
    );
    println!("  Run timeout: {}s", config.crawler.run_timeout_secs);
    println!(
        "  Expand teammate matches: {}",
        config.crawler.expand_teammate_matches
    );

    println!("\nUser Agent:");
    println!("  {}", user_agent_string(&config.user_agent));

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the history database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let history = open_history(Path::new(&config.output.database_path))
        .context("Failed to open history database")?;
    let stats = load_statistics(&history)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool, quiet: bool) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (recorded matches will be fetched again)");
    } else {
        tracing::info!("Starting incremental crawl");
    }

    match run_crawl(config, config_hash, fresh).await {
        Ok(summary) => {
            if summary.counts.entities_abandoned > 0 {
                tracing::warn!(
                    "Run deadline reached, {} entities abandoned",
                    summary.counts.entities_abandoned
                );
            }
            if !quiet {
                print_summary(&summary);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
