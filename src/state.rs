use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::debug;
use url::Url;

use crate::error::StoreError;
use crate::store::{AppRow, CsvStore, Destination, ReviewRow};

/// Composite natural key of a review. Every observable field participates, so
/// two reviews differing in any column count as distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReviewKey {
    app_id: String,
    shop_name: String,
    country: String,
    usage_time: String,
    rating: u32,
    posted_at: String,
    content: String,
}

impl ReviewKey {
    pub fn of(row: &ReviewRow) -> ReviewKey {
        ReviewKey {
            app_id: row.app_id.clone(),
            shop_name: row.shop_name.clone(),
            country: row.country.clone(),
            usage_time: row.usage_time.clone(),
            rating: row.rating,
            posted_at: row.posted_at.clone(),
            content: row.content.clone(),
        }
    }
}

/// Outcome of an identity lookup for one detail-page URL. `prior_lastmod`
/// holds the superseded marker when the page changed.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub id: String,
    pub is_new: bool,
    pub is_changed: bool,
    pub prior_lastmod: Option<String>,
}

struct AppSlot {
    id: String,
    lastmod: String,
}

/// In-memory index over prior output, built once per run. Identities are
/// keyed by URL so an app keeps its id across runs even if the page slug in
/// fresh markup would derive differently.
pub struct ReconciliationStore {
    by_url: Mutex<HashMap<String, AppSlot>>,
    review_keys: Mutex<HashSet<ReviewKey>>,
}

impl ReconciliationStore {
    pub fn load(prior_apps: &[AppRow], prior_reviews: &[ReviewRow]) -> ReconciliationStore {
        let mut by_url = HashMap::new();
        for row in prior_apps {
            // Later rows win, matching append order in the sink.
            by_url.insert(
                row.url.clone(),
                AppSlot {
                    id: row.id.clone(),
                    lastmod: row.lastmod.clone(),
                },
            );
        }
        let review_keys: HashSet<ReviewKey> = prior_reviews.iter().map(ReviewKey::of).collect();
        debug!(
            apps = by_url.len(),
            reviews = review_keys.len(),
            "reconciliation indexes loaded"
        );
        ReconciliationStore {
            by_url: Mutex::new(by_url),
            review_keys: Mutex::new(review_keys),
        }
    }

    pub fn empty() -> ReconciliationStore {
        ReconciliationStore::load(&[], &[])
    }

    /// Build the indexes from the sink's current contents.
    pub fn from_store(store: &CsvStore) -> Result<ReconciliationStore, StoreError> {
        let prior_apps: Vec<AppRow> = store.read_all(Destination::Apps)?;
        let prior_reviews: Vec<ReviewRow> = store.read_all(Destination::Reviews)?;
        Ok(ReconciliationStore::load(&prior_apps, &prior_reviews))
    }

    /// Resolve the identity for a detail-page URL against prior state. A known
    /// URL keeps its stored id; an unknown one derives a fresh id from the URL
    /// slug. The slot is updated with the fresh lastmod either way, so a URL
    /// recurring within one run resolves as unchanged the second time.
    pub fn resolve_identity(&self, url: &str, fresh_lastmod: &str) -> Resolution {
        let mut by_url = match self.by_url.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match by_url.get_mut(url) {
            Some(slot) => {
                let is_changed = slot.lastmod != fresh_lastmod;
                let prior_lastmod = if is_changed {
                    Some(std::mem::replace(&mut slot.lastmod, fresh_lastmod.to_string()))
                } else {
                    None
                };
                Resolution {
                    id: slot.id.clone(),
                    is_new: false,
                    is_changed,
                    prior_lastmod,
                }
            }
            None => {
                let id = derive_app_id(url);
                by_url.insert(
                    url.to_string(),
                    AppSlot {
                        id: id.clone(),
                        lastmod: fresh_lastmod.to_string(),
                    },
                );
                Resolution {
                    id,
                    is_new: true,
                    is_changed: false,
                    prior_lastmod: None,
                }
            }
        }
    }

    pub fn has_review(&self, key: &ReviewKey) -> bool {
        match self.review_keys.lock() {
            Ok(guard) => guard.contains(key),
            Err(poisoned) => poisoned.into_inner().contains(key),
        }
    }

    pub fn known_apps(&self) -> usize {
        match self.by_url.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn known_reviews(&self) -> usize {
        match self.review_keys.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Identity for a URL never seen before: the final non-empty path segment.
fn derive_app_id(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|segment| !segment.is_empty())
            .last()
            .unwrap_or("")
            .to_string(),
        Err(_) => url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(url)
            .to_string(),
    }
}

// ── Tests ──
