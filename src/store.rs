use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

pub const OUTPUT_DIR: &str = "output";

/// One CSV file per record kind. Field order is fixed by the header arrays
/// below and must match the serde field order of the row structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Apps,
    KeyBenefits,
    PricingPlans,
    PricingPlanFeatures,
    Categories,
    AppCategories,
    Reviews,
}

impl Destination {
    pub const ALL: [Destination; 7] = [
        Destination::Apps,
        Destination::KeyBenefits,
        Destination::PricingPlans,
        Destination::PricingPlanFeatures,
        Destination::Categories,
        Destination::AppCategories,
        Destination::Reviews,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Destination::Apps => "apps.csv",
            Destination::KeyBenefits => "key_benefits.csv",
            Destination::PricingPlans => "pricing_plans.csv",
            Destination::PricingPlanFeatures => "pricing_plan_features.csv",
            Destination::Categories => "categories.csv",
            Destination::AppCategories => "apps_categories.csv",
            Destination::Reviews => "reviews.csv",
        }
    }

    pub fn header(self) -> &'static [&'static str] {
        match self {
            Destination::Apps => &[
                "id",
                "url",
                "title",
                "developer",
                "developer_link",
                "icon",
                "rating",
                "reviews_count",
                "description_raw",
                "description",
                "tagline",
                "pricing_hint",
                "lastmod",
            ],
            Destination::KeyBenefits => &["app_id", "title", "description"],
            Destination::PricingPlans => &["id", "app_id", "title", "price"],
            Destination::PricingPlanFeatures => &["pricing_plan_id", "app_id", "feature"],
            Destination::Categories => &["id", "title"],
            Destination::AppCategories => &["app_id", "category_id"],
            Destination::Reviews => &[
                "app_id",
                "shop_name",
                "country",
                "usage_time",
                "rating",
                "posted_at",
                "content",
            ],
        }
    }
}

// ── Row types ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRow {
    pub id: String,
    pub url: String,
    pub title: String,
    pub developer: String,
    pub developer_link: Option<String>,
    pub icon: Option<String>,
    pub rating: Option<String>,
    pub reviews_count: u32,
    pub description_raw: String,
    pub description: String,
    pub tagline: Option<String>,
    pub pricing_hint: Option<String>,
    pub lastmod: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBenefitRow {
    pub app_id: String,
    pub title: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPlanRow {
    pub id: String,
    pub app_id: String,
    pub title: String,
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPlanFeatureRow {
    pub pricing_plan_id: String,
    pub app_id: String,
    pub feature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppCategoryRow {
    pub app_id: String,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRow {
    pub app_id: String,
    pub shop_name: String,
    pub country: String,
    pub usage_time: String,
    pub rating: u32,
    pub posted_at: String,
    pub content: String,
}

/// Every record the crawl can emit, tagged by kind. The sink dispatches on
/// the tag alone.
#[derive(Debug, Clone)]
pub enum Record {
    App(AppRow),
    KeyBenefit(KeyBenefitRow),
    PricingPlan(PricingPlanRow),
    PricingPlanFeature(PricingPlanFeatureRow),
    Category(CategoryRow),
    AppCategory(AppCategoryRow),
    Review(ReviewRow),
}

impl Record {
    pub fn destination(&self) -> Destination {
        match self {
            Record::App(_) => Destination::Apps,
            Record::KeyBenefit(_) => Destination::KeyBenefits,
            Record::PricingPlan(_) => Destination::PricingPlans,
            Record::PricingPlanFeature(_) => Destination::PricingPlanFeatures,
            Record::Category(_) => Destination::Categories,
            Record::AppCategory(_) => Destination::AppCategories,
            Record::Review(_) => Destination::Reviews,
        }
    }
}

// ── Sink ──

/// Flat-file sink: one CSV per destination under a base directory. Appends
/// are flushed per record so a crash loses at most the row being written.
pub struct CsvStore {
    dir: PathBuf,
    writers: HashMap<Destination, csv::Writer<File>>,
}

impl CsvStore {
    /// Open the sink, creating the directory and writing the header row for
    /// any destination file that is missing or empty.
    pub fn open(dir: &Path) -> Result<CsvStore, StoreError> {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        for dest in Destination::ALL {
            let path = dir.join(dest.file_name());
            if is_empty(&path) {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| io_err(&path, e))?;
                let mut writer = csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_writer(file);
                writer
                    .write_record(dest.header())
                    .map_err(|e| csv_err(&path, e))?;
                writer.flush().map_err(|e| io_err(&path, e))?;
            }
        }
        Ok(CsvStore {
            dir: dir.to_path_buf(),
            writers: HashMap::new(),
        })
    }

    pub fn path(&self, dest: Destination) -> PathBuf {
        self.dir.join(dest.file_name())
    }

    /// Append one record to its destination.
    pub fn append(&mut self, record: &Record) -> Result<(), StoreError> {
        let dest = record.destination();
        let path = self.dir.join(dest.file_name());
        let writer = match self.writers.entry(dest) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| io_err(&path, e))?;
                entry.insert(
                    csv::WriterBuilder::new()
                        .has_headers(false)
                        .from_writer(file),
                )
            }
        };
        let result = match record {
            Record::App(row) => writer.serialize(row),
            Record::KeyBenefit(row) => writer.serialize(row),
            Record::PricingPlan(row) => writer.serialize(row),
            Record::PricingPlanFeature(row) => writer.serialize(row),
            Record::Category(row) => writer.serialize(row),
            Record::AppCategory(row) => writer.serialize(row),
            Record::Review(row) => writer.serialize(row),
        };
        result.map_err(|e| csv_err(&path, e))?;
        writer.flush().map_err(|e| io_err(&path, e))
    }

    /// Read every surviving row of a destination. Rows that fail to parse
    /// (prior runs, foreign edits) are skipped with a warning rather than
    /// failing the load. A missing file reads as empty.
    pub fn read_all<T: DeserializeOwned>(&self, dest: Destination) -> Result<Vec<T>, StoreError> {
        let path = self.dir.join(dest.file_name());
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(|e| csv_err(&path, e))?;
        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for result in reader.into_deserialize::<T>() {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => {
                    skipped += 1;
                    warn!("skipping unparseable row in {}: {}", dest.file_name(), e);
                }
            }
        }
        if skipped > 0 {
            warn!("{}: {} rows ignored during load", dest.file_name(), skipped);
        }
        Ok(rows)
    }

    /// Atomically rewrite a destination: header plus the given rows land in a
    /// temp file that is renamed over the original, so a failure part-way
    /// leaves the previous contents untouched.
    pub fn replace_all<T: Serialize>(
        &mut self,
        dest: Destination,
        rows: &[T],
    ) -> Result<(), StoreError> {
        // Drop any cached appender before the rename; it points at the old file.
        self.writers.remove(&dest);

        let path = self.dir.join(dest.file_name());
        let tmp = self.dir.join(format!("{}.tmp", dest.file_name()));
        {
            let file = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer
                .write_record(dest.header())
                .map_err(|e| csv_err(&tmp, e))?;
            for row in rows {
                writer.serialize(row).map_err(|e| csv_err(&tmp, e))?;
            }
            writer.flush().map_err(|e| io_err(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))
    }

    /// Data rows currently in a destination (header excluded).
    pub fn count_rows(&self, dest: Destination) -> Result<usize, StoreError> {
        let path = self.dir.join(dest.file_name());
        if !path.exists() {
            return Ok(0);
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(|e| csv_err(&path, e))?;
        let mut count = 0usize;
        let mut record = csv::StringRecord::new();
        while reader
            .read_record(&mut record)
            .map_err(|e| csv_err(&path, e))?
        {
            count += 1;
        }
        Ok(count)
    }
}

fn is_empty(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn csv_err(path: &Path, source: csv::Error) -> StoreError {
    StoreError::Csv {
        path: path.display().to_string(),
        source,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: &str, title: &str) -> Record {
        Record::Category(CategoryRow {
            id: id.to_string(),
            title: title.to_string(),
        })
    }

    #[test]
    fn open_writes_headers_once() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _store = CsvStore::open(dir.path()).unwrap();
        }
        // Reopening must not duplicate headers.
        let store = CsvStore::open(dir.path()).unwrap();
        for dest in Destination::ALL {
            let text = fs::read_to_string(store.path(dest)).unwrap();
            assert_eq!(text.lines().count(), 1, "{}", dest.file_name());
            assert!(text.starts_with(dest.header()[0]));
        }
    }

    #[test]
    fn append_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvStore::open(dir.path()).unwrap();
        store.append(&category("productivity", "Productivity")).unwrap();
        store.append(&category("marketing", "Marketing")).unwrap();

        let rows: Vec<CategoryRow> = store.read_all(Destination::Categories).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "productivity");
        assert_eq!(rows[1].title, "Marketing");
    }

    #[test]
    fn append_survives_reopen_without_new_header() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = CsvStore::open(dir.path()).unwrap();
            store.append(&category("a", "A")).unwrap();
        }
        let mut store = CsvStore::open(dir.path()).unwrap();
        store.append(&category("b", "B")).unwrap();

        let rows: Vec<CategoryRow> = store.read_all(Destination::Categories).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(store.count_rows(Destination::Categories).unwrap(), 2);
    }

    #[test]
    fn replace_all_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvStore::open(dir.path()).unwrap();
        store.append(&category("x", "X")).unwrap();
        store.append(&category("x", "X")).unwrap();

        let survivors = vec![CategoryRow {
            id: "x".to_string(),
            title: "X".to_string(),
        }];
        store.replace_all(Destination::Categories, &survivors).unwrap();

        let rows: Vec<CategoryRow> = store.read_all(Destination::Categories).unwrap();
        assert_eq!(rows.len(), 1);
        let text = fs::read_to_string(store.path(Destination::Categories)).unwrap();
        assert!(text.starts_with("id,title"));
        // Appends after a rewrite land in the new file.
        store.append(&category("y", "Y")).unwrap();
        assert_eq!(store.count_rows(Destination::Categories).unwrap(), 2);
    }

    #[test]
    fn unparseable_rows_skipped_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvStore::open(dir.path()).unwrap();
        store
            .append(&Record::Review(ReviewRow {
                app_id: "widget-app".to_string(),
                shop_name: "Acme Store".to_string(),
                country: "United States".to_string(),
                usage_time: "3 months using the app".to_string(),
                rating: 5,
                posted_at: "June 1, 2025".to_string(),
                content: "Great app".to_string(),
            }))
            .unwrap();
        // Simulate a truncated row from an interrupted prior run.
        let path = store.path(Destination::Reviews);
        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("widget-app,Other Shop\n");
        fs::write(&path, text).unwrap();

        let rows: Vec<ReviewRow> = store.read_all(Destination::Reviews).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].shop_name, "Acme Store");
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).unwrap();
        fs::remove_file(store.path(Destination::Apps)).unwrap();
        let rows: Vec<AppRow> = store.read_all(Destination::Apps).unwrap();
        assert!(rows.is_empty());
        assert_eq!(store.count_rows(Destination::Apps).unwrap(), 0);
    }

    #[test]
    fn quoted_fields_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvStore::open(dir.path()).unwrap();
        let content = "Line one,\nwith \"quotes\" and commas";
        store
            .append(&Record::Review(ReviewRow {
                app_id: "widget-app".to_string(),
                shop_name: "Shop, Inc".to_string(),
                country: "Canada".to_string(),
                usage_time: "About 1 year using the app".to_string(),
                rating: 4,
                posted_at: "May 7, 2025".to_string(),
                content: content.to_string(),
            }))
            .unwrap();
        let rows: Vec<ReviewRow> = store.read_all(Destination::Reviews).unwrap();
        assert_eq!(rows[0].content, content);
        assert_eq!(rows[0].shop_name, "Shop, Inc");
    }
}
