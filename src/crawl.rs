use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::extract::{self, ExtractedApp};
use crate::fetch::PageFetcher;
use crate::paginate::{self, ReviewOutcome};
use crate::state::ReconciliationStore;
use crate::store::{CsvStore, Record};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Wire protocol between app workers and the single sink writer.
pub enum Message {
    Record(Record),
    AppFinished { url: String, outcome: AppOutcome },
}

/// Terminal state of one seed's pipeline.
pub enum AppOutcome {
    Crawled {
        is_new: bool,
        is_changed: bool,
        reviews: ReviewOutcome,
    },
    FetchFailed,
    ExtractionFailed,
    Cancelled,
}

/// Crawl stats returned after completion.
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
    pub cancelled: usize,
    pub new_apps: usize,
    pub changed_apps: usize,
    pub records: usize,
    pub reviews: usize,
}

/// Crawl seed detail pages concurrently, appending each record to the sink
/// as it arrives. Workers fan out under a semaphore; a single receiver owns
/// the sink, so writes never interleave. A failure on one seed never stops
/// the others; a sink write failure aborts the run.
pub async fn run(
    fetcher: Arc<dyn PageFetcher>,
    state: Arc<ReconciliationStore>,
    store: &mut CsvStore,
    seeds: Vec<String>,
    concurrency: usize,
    cancel: CancellationToken,
) -> Result<CrawlStats> {
    let total = seeds.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send records, main loop owns the sink
    let (tx, mut rx) = mpsc::channel::<Message>(concurrency.max(1) * 2);

    for url in seeds {
        let fetcher = Arc::clone(&fetcher);
        let state = Arc::clone(&state);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let outcome = if cancel.is_cancelled() {
                AppOutcome::Cancelled
            } else {
                crawl_app(fetcher.as_ref(), &state, &tx, &cancel, &url).await
            };
            let _ = tx.send(Message::AppFinished { url, outcome }).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut stats = CrawlStats {
        total,
        ..CrawlStats::default()
    };

    while let Some(msg) = rx.recv().await {
        match msg {
            Message::Record(record) => {
                store.append(&record)?;
                stats.records += 1;
            }
            Message::AppFinished { url: _, outcome } => {
                note_outcome(&mut stats, outcome);
                pb.inc(1);
            }
        }
    }

    pb.finish_and_clear();
    info!(
        "Crawled {} apps ({} ok, {} errors, {} cancelled), {} records written",
        stats.total, stats.ok, stats.errors, stats.cancelled, stats.records
    );

    Ok(stats)
}

fn note_outcome(stats: &mut CrawlStats, outcome: AppOutcome) {
    match outcome {
        AppOutcome::Crawled {
            is_new,
            is_changed,
            reviews,
        } => {
            stats.ok += 1;
            if is_new {
                stats.new_apps += 1;
            }
            if is_changed {
                stats.changed_apps += 1;
            }
            stats.reviews += reviews.emitted;
        }
        AppOutcome::FetchFailed | AppOutcome::ExtractionFailed => stats.errors += 1,
        AppOutcome::Cancelled => stats.cancelled += 1,
    }
}

/// One seed, start to finish: fetch the detail page, resolve identity,
/// extract and emit its records, then walk its review listing. Reviews are
/// keyed by the resolved identity, so they can only start once the primary
/// page is done.
async fn crawl_app(
    fetcher: &dyn PageFetcher,
    state: &ReconciliationStore,
    tx: &Sender<Message>,
    cancel: &CancellationToken,
    seed_url: &str,
) -> AppOutcome {
    let page = match fetcher.fetch(seed_url).await {
        Ok(page) => page,
        Err(e) => {
            warn!("skipping app, fetch failed: {}", e);
            return AppOutcome::FetchFailed;
        }
    };

    let lastmod = page.lastmod.clone().unwrap_or_default();
    let resolution = state.resolve_identity(&page.final_url, &lastmod);
    if resolution.is_new {
        info!("new app found: {}", page.final_url);
    } else if resolution.is_changed {
        info!(
            "page updated since {}, keeping id {} | {}",
            resolution.prior_lastmod.as_deref().unwrap_or_default(),
            resolution.id,
            page.final_url
        );
    }

    let extracted =
        match extract::extract_detail_page(&page.final_url, &resolution.id, &lastmod, &page.body) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("skipping app, {}", e);
                return AppOutcome::ExtractionFailed;
            }
        };

    if !send_all(tx, extracted).await {
        return AppOutcome::Cancelled;
    }

    let reviews_url = format!("{}/reviews", page.final_url.trim_end_matches('/'));
    let reviews = paginate::drive(fetcher, state, tx, cancel, &resolution.id, &reviews_url).await;

    AppOutcome::Crawled {
        is_new: resolution.is_new,
        is_changed: resolution.is_changed,
        reviews,
    }
}

/// Emit a detail page's records, the app row last. The channel preserves
/// per-sender order, so an app row in the sink implies its sub-records
/// landed before it.
async fn send_all(tx: &Sender<Message>, extracted: ExtractedApp) -> bool {
    let ExtractedApp {
        app,
        benefits,
        plans,
        plan_features,
        categories,
        memberships,
    } = extracted;

    let mut records: Vec<Record> = Vec::new();
    records.extend(benefits.into_iter().map(Record::KeyBenefit));
    records.extend(plans.into_iter().map(Record::PricingPlan));
    records.extend(plan_features.into_iter().map(Record::PricingPlanFeature));
    records.extend(categories.into_iter().map(Record::Category));
    records.extend(memberships.into_iter().map(Record::AppCategory));
    records.push(Record::App(app));

    for record in records {
        if tx.send(Message::Record(record)).await.is_err() {
            return false;
        }
    }
    true
}

// ── Tests ──
