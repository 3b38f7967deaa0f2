use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::error::StoreError;
use crate::state::ReviewKey;
use crate::store::{AppRow, CategoryRow, CsvStore, Destination, ReviewRow};

/// Rows dropped per collapsed destination.
#[derive(Debug, Default)]
pub struct NormalizeStats {
    pub dropped_categories: usize,
    pub dropped_apps: usize,
    pub dropped_reviews: usize,
}

/// Collapse the accumulated output to one current row per entity key:
/// categories lose exact (id, title) duplicates, apps keep the last-written
/// row per id, reviews keep the last-written row per natural key. The other
/// destinations accumulate as written. Each pass rewrites its file whole; a
/// failed pass leaves the previous file contents in place.
pub fn run(store: &mut CsvStore) -> Result<NormalizeStats, StoreError> {
    let stats = NormalizeStats {
        dropped_categories: collapse_categories(store)?,
        dropped_apps: collapse_apps(store)?,
        dropped_reviews: collapse_reviews(store)?,
    };
    info!(
        "normalized output ({} categories, {} apps, {} reviews dropped)",
        stats.dropped_categories, stats.dropped_apps, stats.dropped_reviews
    );
    Ok(stats)
}

fn collapse_categories(store: &mut CsvStore) -> Result<usize, StoreError> {
    let rows: Vec<CategoryRow> = store.read_all(Destination::Categories)?;
    let mut seen = HashSet::new();
    let survivors: Vec<CategoryRow> = rows
        .iter()
        .filter(|row| seen.insert((row.id.clone(), row.title.clone())))
        .cloned()
        .collect();
    let dropped = rows.len() - survivors.len();
    store.replace_all(Destination::Categories, &survivors)?;
    Ok(dropped)
}

fn collapse_apps(store: &mut CsvStore) -> Result<usize, StoreError> {
    let rows: Vec<AppRow> = store.read_all(Destination::Apps)?;
    let mut last_by_id: HashMap<&str, usize> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        last_by_id.insert(row.id.as_str(), idx);
    }
    let survivors: Vec<AppRow> = rows
        .iter()
        .enumerate()
        .filter(|(idx, row)| last_by_id[row.id.as_str()] == *idx)
        .map(|(_, row)| row.clone())
        .collect();
    let dropped = rows.len() - survivors.len();
    store.replace_all(Destination::Apps, &survivors)?;
    Ok(dropped)
}

fn collapse_reviews(store: &mut CsvStore) -> Result<usize, StoreError> {
    let rows: Vec<ReviewRow> = store.read_all(Destination::Reviews)?;
    let mut last_by_key: HashMap<ReviewKey, usize> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        last_by_key.insert(ReviewKey::of(row), idx);
    }
    let survivors: Vec<ReviewRow> = rows
        .iter()
        .enumerate()
        .filter(|(idx, row)| last_by_key[&ReviewKey::of(row)] == *idx)
        .map(|(_, row)| row.clone())
        .collect();
    let dropped = rows.len() - survivors.len();
    store.replace_all(Destination::Reviews, &survivors)?;
    Ok(dropped)
}

// ── Tests ──
