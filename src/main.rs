//! Skein main entry point
//!
//! This is the command-line interface for the Skein crawl engine.

use clap::Parser;
use skein::config::{load_config_with_fingerprint, validate_seeds, Config};
use skein::crawler::Coordinator;
use skein::output::{load_statistics, print_statistics, print_summary};
use skein::storage::open_storage;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Skein: a breadth-first web crawl engine
///
/// Skein crawls outward from seed URLs, stores the text of every page it
/// fetches and records the link graph between them. Interrupted crawls
/// resume where they left off.
#[derive(Parser, Debug)]
#[command(name = "skein")]
#[command(version)]
#[command(about = "A breadth-first web crawl engine", long_about = None)]
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

    /// Resume pending targets of an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Forget previously visited URLs and pending targets before crawling
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Additional seed URL (may be repeated)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Override the page budget from the configuration
    #[arg(long, value_name = "N")]
    max_pages: Option<u64>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, fingerprint) = match load_config_with_fingerprint(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::debug!("Configuration fingerprint: {}", fingerprint);

    if let Some(max_pages) = cli.max_pages {
        if max_pages == 0 {
            return Err("--max-pages must be at least 1".into());
        }
        config.crawler.max_pages = max_pages;
    }

    validate_seeds(&cli.seeds)?;
    let seeds: Vec<String> = config
        .seeds
        .iter()
        .chain(cli.seeds.iter())
        .cloned()
        .collect();

    if cli.dry_run {
        handle_dry_run(&config, &seeds, cli.fresh);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &seeds, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("skein=info,warn"),
            1 => EnvFilter::new("skein=debug,info"),
            2 => EnvFilter::new("skein=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, seeds: &[String], fresh: bool) {
    println!("=== Skein Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max pages: {}", config.crawler.max_pages);
    match config.crawler.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unbounded"),
    }
    println!(
        "  Politeness delay: {}ms",
        config.crawler.politeness_delay_ms
    );
    println!("  Fetch timeout: {}s", config.crawler.fetch_timeout_secs);
    println!("  Max redirects: {}", config.crawler.max_redirects);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!(
        "  Mode: {}",
        if fresh { "fresh" } else { "resume pending targets" }
    );

    println!("\nSeeds ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", seeds.len());
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    seeds: &[String],
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume pending targets)");
    }
    tracing::info!(
        "{} workers, budget {} pages, {} seed URLs",
        config.crawler.workers,
        config.crawler.max_pages,
        seeds.len()
    );

    let coordinator = Coordinator::new(config, fresh)?;

    let shutdown = coordinator.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.shutdown(),
            Err(e) => tracing::warn!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    match coordinator.run(seeds).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
