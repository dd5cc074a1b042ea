//! Moebius main entry point
//!
//! This is the command-line interface for the Moebius crawler.

use anyhow::{bail, Context};
use clap::Parser;
use moebius::config::{load_config_with_hash, Config};
use moebius::crawler::{
    run_crawl, seed, FetchPolicy, HtmlLinkExtractor, Pipeline, RecordingDispatcher,
    ReqwestFetcher, Task,
};
use moebius::storage::{Repository, SqliteStorage};
use moebius::CrawlStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Moebius: a URL-frontier web crawler
///
/// Moebius keeps a deduplicated frontier of every URL it has discovered,
/// fetches each eligible one exactly once, stores the content and feeds the
/// extracted links back into the frontier.
#[derive(Parser, Debug)]
#[command(name = "moebius")]
#[command(version)]
#[command(about = "A URL-frontier web crawler", long_about = None)]
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

    /// Submit a URL to the frontier before starting (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["init", "stats", "task"])]
    dry_run: bool,

    /// Create the database schema and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "task"])]
    init: bool,

    /// Show frontier and page statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "init", "task"])]
    stats: bool,

    /// Run a single pipeline task (NAME or NAME=PAYLOAD) and exit
    #[arg(long, value_name = "TASK", conflicts_with_all = ["dry_run", "init", "stats"])]
    task: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &cli.seeds)
    } else if cli.init {
        handle_init(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(spec) = &cli.task {
        handle_task(&config, &cli.seeds, spec).await
    } else {
        handle_crawl(config, &cli.seeds).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("moebius=info,warn"),
            1 => EnvFilter::new("moebius=debug,info"),
            2 => EnvFilter::new("moebius=trace,debug"),
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

fn open_storage(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.store.database_path);
    SqliteStorage::open(path, Duration::from_millis(config.store.busy_timeout_ms))
        .with_context(|| format!("failed to open database {}", path.display()))
}

/// Submits config seeds followed by command-line seeds
fn submit_seeds(
    storage: &mut SqliteStorage,
    config: &Config,
    cli_seeds: &[String],
) -> anyhow::Result<usize> {
    let urls = config
        .seed
        .iter()
        .map(|s| s.url.as_str())
        .chain(cli_seeds.iter().map(String::as_str));

    let mut count = 0;
    for url in urls {
        seed(storage, url).with_context(|| format!("invalid seed URL {}", url))?;
        count += 1;
    }
    Ok(count)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, cli_seeds: &[String]) -> anyhow::Result<()> {
    println!("=== Moebius Dry Run ===\n");

    println!("Store:");
    println!("  Database: {}", config.store.database_path);
    println!("  Busy timeout: {}ms", config.store.busy_timeout_ms);

    println!("\nFetcher:");
    println!("  User agent: {}", config.fetcher.user_agent);
    println!("  Timeout: {}s", config.fetcher.timeout_secs);

    println!("\nDispatch:");
    println!("  Workers: {}", config.dispatch.workers);
    println!("  Select interval: {}s", config.dispatch.select_interval_secs);
    println!("  Max attempts: {}", config.dispatch.max_attempts);

    println!("\nPolicy:");
    println!(
        "  Fetchable schemes: {}",
        config.policy.fetchable_schemes.join(", ")
    );
    println!("  Excluded hosts ({}):", config.policy.excluded_hosts.len());
    for pattern in &config.policy.excluded_hosts {
        println!("  - {}", pattern);
    }

    let seeds: Vec<&str> = config
        .seed
        .iter()
        .map(|s| s.url.as_str())
        .chain(cli_seeds.iter().map(String::as_str))
        .collect();

    println!("\nSeeds ({}):", seeds.len());
    for url in &seeds {
        match moebius::url::parse(url) {
            Ok(components) => println!("  - {}", components),
            Err(e) => bail!("invalid seed URL {}: {}", url, e),
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --init mode: creates the schema
fn handle_init(config: &Config) -> anyhow::Result<()> {
    open_storage(config)?;
    println!("✓ Initialized {}", config.store.database_path);
    Ok(())
}

/// Handles the --stats mode: shows counts from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let conn = storage.connection();

    let counts = conn.count_by_status()?;
    let total: u64 = counts.values().sum();

    println!("Database: {}\n", config.store.database_path);
    println!("Frontier ({} entries):", total);
    for status in CrawlStatus::all() {
        println!(
            "  {:<10} {}",
            status.name(),
            counts.get(&status).copied().unwrap_or(0)
        );
    }
    println!("\nPages: {}", conn.count_pages()?);

    Ok(())
}

/// Handles --task: runs one pipeline step and lists the work it dispatched
async fn handle_task(config: &Config, cli_seeds: &[String], spec: &str) -> anyhow::Result<()> {
    let task = Task::parse_spec(spec)?;
    let mut storage = open_storage(config)?;
    submit_seeds(&mut storage, config, cli_seeds)?;

    let dispatcher = Arc::new(RecordingDispatcher::new());
    let pipeline = Pipeline::new(
        Arc::new(ReqwestFetcher::new(&config.fetcher)?),
        Arc::new(HtmlLinkExtractor::new()),
        dispatcher.clone(),
        FetchPolicy::from_config(&config.policy),
    );

    pipeline
        .run_task(&mut storage, &task)
        .await
        .with_context(|| format!("task {} failed", task))?;

    println!("✓ {}", task);
    for follow_up in dispatcher.take() {
        println!("  dispatched {}", follow_up);
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, cli_seeds: &[String]) -> anyhow::Result<()> {
    {
        let mut storage = open_storage(&config)?;
        let seeded = submit_seeds(&mut storage, &config, cli_seeds)?;
        tracing::info!("Submitted {} seed URLs", seeded);
    }

    match run_crawl(config).await {
        Ok(()) => {
            tracing::info!("Crawl finished");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
