use std::collections::HashSet;

use scraper::Html;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::crawl::Message;
use crate::extract::reviews;
use crate::fetch::PageFetcher;
use crate::state::{ReconciliationStore, ReviewKey};
use crate::store::Record;

/// Traversal position within one app's review listing. The incremental
/// short-circuit only ever applies on the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    FirstPage,
    SubsequentPage,
}

/// What one app's review traversal amounted to.
#[derive(Debug, Default)]
pub struct ReviewOutcome {
    pub pages_fetched: usize,
    pub emitted: usize,
    pub skipped_known: usize,
    pub short_circuited: bool,
    pub aborted: bool,
}

/// Walk an app's review pages from `reviews_url`, emitting unseen reviews in
/// listing order. Listings are newest-first, so if the first page's first
/// review is already recorded, every older review is too and the traversal
/// stops after a single fetch. Reviews already known elsewhere on a page are
/// skipped without halting. A fetch failure mid-way abandons the remaining
/// pages; reviews already emitted stand.
pub async fn drive(
    fetcher: &dyn PageFetcher,
    state: &ReconciliationStore,
    tx: &Sender<Message>,
    cancel: &CancellationToken,
    app_id: &str,
    reviews_url: &str,
) -> ReviewOutcome {
    let mut outcome = ReviewOutcome::default();
    let mut page_state = PageState::FirstPage;
    let mut visited = HashSet::new();
    let mut next_url = reviews_url.to_string();

    loop {
        if cancel.is_cancelled() {
            return outcome;
        }
        if !visited.insert(next_url.clone()) {
            // Pagination pointed back at an earlier page; stop rather than spin.
            warn!("review pagination for {} revisited {}, stopping", app_id, next_url);
            return outcome;
        }
        let page = match fetcher.fetch(&next_url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("review page fetch failed, keeping {} reviews already emitted for {}: {}",
                    outcome.emitted, app_id, e);
                outcome.aborted = true;
                return outcome;
            }
        };
        outcome.pages_fetched += 1;

        // Scoped so the parsed DOM is gone before the sends below; the future
        // must stay Send for the spawned per-seed tasks.
        let listing = {
            let doc = Html::parse_document(&page.body);
            reviews::extract(&doc, app_id, &page.final_url)
        };

        if listing.reviews.is_empty() {
            return outcome;
        }

        if page_state == PageState::FirstPage
            && state.has_review(&ReviewKey::of(&listing.reviews[0]))
        {
            info!("newest review of {} already recorded, skipping the rest", app_id);
            outcome.short_circuited = true;
            return outcome;
        }

        for row in listing.reviews {
            if state.has_review(&ReviewKey::of(&row)) {
                outcome.skipped_known += 1;
                continue;
            }
            if tx.send(Message::Record(Record::Review(row))).await.is_err() {
                // Sink side has shut down; nothing left to emit to.
                return outcome;
            }
            outcome.emitted += 1;
        }

        match listing.next_page {
            Some(url) => {
                page_state = PageState::SubsequentPage;
                next_url = url;
            }
            None => return outcome,
        }
    }
}

// ── Tests ──
