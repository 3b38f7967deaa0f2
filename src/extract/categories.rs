use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::store::{AppCategoryRow, CategoryRow};

use super::collapsed_text;

static CATEGORY_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"#adp-details-section a[href^="https://apps.shopify.com/categories"]"#)
        .unwrap()
});

/// Deterministic category identity: the case-folded title. Identical titles
/// always collapse to the same id regardless of which app referenced them.
pub fn category_id(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Category links from the details section, one membership row per link.
/// Duplicate categories across apps are expected; the post-run collapse
/// keeps one row per (id, title).
pub fn extract(doc: &Html, app_id: &str) -> (Vec<CategoryRow>, Vec<AppCategoryRow>) {
    let mut categories = Vec::new();
    let mut memberships = Vec::new();
    for anchor in doc.select(&CATEGORY_LINKS) {
        let title = collapsed_text(anchor);
        if title.is_empty() {
            continue;
        }
        let id = category_id(&title);
        categories.push(CategoryRow {
            id: id.clone(),
            title,
        });
        memberships.push(AppCategoryRow {
            app_id: app_id.to_string(),
            category_id: id,
        });
    }
    (categories, memberships)
}
