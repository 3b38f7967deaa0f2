mod crawl;
mod discover;
mod error;
mod extract;
mod fetch;
mod normalize;
mod paginate;
mod state;
mod store;
#[cfg(test)]
mod testutil;
mod throttle;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::fetch::HttpFetcher;
use crate::state::ReconciliationStore;
use crate::store::{CsvStore, Destination};

#[derive(Parser)]
#[command(
    name = "appstore_scraper",
    about = "Incremental app marketplace crawler writing CSV flat files"
)]
struct Cli {
    /// Directory holding the CSV destinations
    #[arg(short, long, default_value = store::OUTPUT_DIR)]
    output: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect app detail URLs from a category listing into a seed file
    Discover {
        /// Category listing to walk
        #[arg(long, default_value = discover::DEFAULT_CATEGORY_URL)]
        category_url: String,
        /// Seed file to write, one URL per line
        #[arg(short = 'f', long, default_value = "app_urls.txt")]
        seeds: PathBuf,
    },
    /// Crawl seed detail pages, appending records to the output CSVs
    Crawl {
        /// Seed file, one absolute detail-page URL per line
        #[arg(short = 'f', long, default_value = "app_urls.txt")]
        seeds: PathBuf,
        /// Max seeds to crawl (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Concurrent app pipelines
        #[arg(short, long, default_value_t = crawl::DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Base politeness delay between requests, in milliseconds
        #[arg(long, default_value_t = throttle::DEFAULT_BASE_DELAY_MS)]
        delay_ms: u64,
        /// Leave duplicate rows in place instead of collapsing after the run
        #[arg(long)]
        no_normalize: bool,
    },
    /// Collapse the output to one current row per entity key
    Normalize,
    /// Show row counts per destination
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Discover { category_url, seeds } => {
            let fetcher =
                HttpFetcher::new(Duration::from_millis(throttle::DEFAULT_BASE_DELAY_MS))?;
            let urls = discover::collect_app_urls(&fetcher, &category_url).await;
            if urls.is_empty() {
                println!("No app links found under {}", category_url);
                return Ok(());
            }
            discover::write_seed_file(&seeds, &urls)
                .with_context(|| format!("writing seed file {}", seeds.display()))?;
            println!("Wrote {} app URLs to {}", urls.len(), seeds.display());
            Ok(())
        }
        Commands::Crawl {
            seeds,
            limit,
            concurrency,
            delay_ms,
            no_normalize,
        } => {
            let mut store = CsvStore::open(&cli.output)?;
            let mut urls = discover::read_seed_file(&seeds)
                .with_context(|| format!("reading seed file {}", seeds.display()))?;
            if urls.is_empty() {
                println!("No seeds to crawl. Run 'discover' first or provide a seed file.");
                return Ok(());
            }
            if let Some(limit) = limit {
                urls.truncate(limit);
            }

            let state = Arc::new(ReconciliationStore::from_store(&store)?);
            if state.known_apps() > 0 {
                println!(
                    "Resuming over prior output: {} known apps, {} known reviews.",
                    state.known_apps(),
                    state.known_reviews()
                );
            }
            let fetcher = Arc::new(HttpFetcher::new(Duration::from_millis(delay_ms))?);

            let cancel = CancellationToken::new();
            {
                // In-flight pages drain on Ctrl-C; interrupted apps are
                // re-fetched next run since identity is URL-keyed.
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("stop requested, letting in-flight pages drain");
                        cancel.cancel();
                    }
                });
            }

            println!(
                "Crawling {} apps (streaming to {})...",
                urls.len(),
                cli.output.display()
            );
            let stats = crawl::run(fetcher, state, &mut store, urls, concurrency, cancel).await?;
            println!(
                "Done: {} apps ({} ok, {} errors, {} cancelled), {} records, {} new reviews.",
                stats.total, stats.ok, stats.errors, stats.cancelled, stats.records, stats.reviews
            );
            if stats.new_apps > 0 || stats.changed_apps > 0 {
                println!(
                    "{} new apps, {} changed since last run.",
                    stats.new_apps, stats.changed_apps
                );
            }

            if !no_normalize {
                let n = normalize::run(&mut store)?;
                println!(
                    "Normalized: dropped {} duplicate categories, {} superseded apps, {} duplicate reviews.",
                    n.dropped_categories, n.dropped_apps, n.dropped_reviews
                );
            }
            Ok(())
        }
        Commands::Normalize => {
            let mut store = CsvStore::open(&cli.output)?;
            let n = normalize::run(&mut store)?;
            println!(
                "Dropped {} duplicate categories, {} superseded apps, {} duplicate reviews.",
                n.dropped_categories, n.dropped_apps, n.dropped_reviews
            );
            Ok(())
        }
        Commands::Stats => {
            let store = CsvStore::open(&cli.output)?;
            for dest in Destination::ALL {
                println!("{:<26} {:>8}", dest.file_name(), store.count_rows(dest)?);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
