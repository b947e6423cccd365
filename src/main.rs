//! foodome CLI entry point

use clap::Parser;
use foodome::{
    cache::MemoCache,
    config::Config,
    crawl::{crawl_foodb, crawl_hmdb, import_food_catalog, Fetcher},
    error::Result,
    ingest::Pipeline,
    store::Store,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "foodome")]
#[command(version, about = "Crawl FooDB and HMDB into a cross-linked compound database", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Re-import the FooDB food listing before crawling
    #[arg(long)]
    repopulate_foods: bool,

    /// Crawl FooDB only, skipping HMDB reconciliation
    #[arg(long)]
    foodb_only: bool,

    /// Skip the FooDB crawl and reconcile HMDB against the existing store
    #[arg(long, conflicts_with = "foodb_only")]
    hmdb_only: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load_or_default(cli.config.as_deref())?;

    let store = Store::connect(&config.database.path).await?;
    let cache = MemoCache::new();
    cache.load(&store).await?;
    let fetcher = Fetcher::new(&config.crawl)?;
    let pipeline = Pipeline::new(config, fetcher, store, cache);

    if cli.repopulate_foods {
        import_food_catalog(&pipeline).await?;
    }

    if !cli.hmdb_only {
        crawl_foodb(&pipeline).await?;
        info!("FooDB catalog ingested");
    }

    if !cli.foodb_only {
        crawl_hmdb(&pipeline).await?;
        info!("HMDB catalog reconciled");
    }

    Ok(())
}
