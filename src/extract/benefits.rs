use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::store::KeyBenefitRow;

use super::collapsed_text;

static BENEFITS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#app-details > ul > li").unwrap());

/// Key-benefit bullets from the description block. The source markup carries
/// no per-benefit title, so that column stays empty.
pub fn extract(doc: &Html, app_id: &str) -> Vec<KeyBenefitRow> {
    doc.select(&BENEFITS)
        .map(collapsed_text)
        .filter(|text| !text.is_empty())
        .map(|description| KeyBenefitRow {
            app_id: app_id.to_string(),
            title: None,
            description,
        })
        .collect()
}
