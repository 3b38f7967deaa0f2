use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::error::ExtractionError;
use crate::store::AppRow;

use super::{collapsed_text, digits_or_zero, resolve_href};

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#adp-hero h1").unwrap());
static DEVELOPER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"#adp-hero a[href^="/partners"]"#).unwrap());
static ICON: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#adp-hero img").unwrap());
static RATING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#adp-hero dd > span.tw-text-fg-secondary").unwrap());
static REVIEWS_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#reviews-link").unwrap());
static DETAILS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#app-details").unwrap());
static PRICING_HINT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("#adp-hero dl dd div.tw-hidden.sm\\:tw-block.tw-text-pretty").unwrap()
});

/// Hero and description fields of a detail page. Title and developer are
/// mandatory; everything else degrades to empty/absent.
pub fn extract(doc: &Html, url: &str, app_id: &str, lastmod: &str) -> Result<AppRow, ExtractionError> {
    let title = doc
        .select(&TITLE)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExtractionError {
            url: url.to_string(),
            field: "title",
        })?;

    let developer_el = doc.select(&DEVELOPER).next().ok_or_else(|| ExtractionError {
        url: url.to_string(),
        field: "developer",
    })?;
    let developer = Some(collapsed_text(developer_el))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExtractionError {
            url: url.to_string(),
            field: "developer",
        })?;
    let developer_link = developer_el
        .value()
        .attr("href")
        .and_then(|href| resolve_href(url, href));

    let icon = doc
        .select(&ICON)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(|src| src.to_string());
    let rating = doc
        .select(&RATING)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty());
    let reviews_count = doc
        .select(&REVIEWS_LINK)
        .next()
        .map(|el| digits_or_zero(&el.text().collect::<String>()))
        .unwrap_or(0);

    let (description_raw, description) = match doc.select(&DETAILS).next() {
        Some(el) => (el.html(), collapsed_text(el)),
        None => (String::new(), String::new()),
    };
    let pricing_hint = doc
        .select(&PRICING_HINT)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty());

    Ok(AppRow {
        id: app_id.to_string(),
        url: url.to_string(),
        title,
        developer,
        developer_link,
        icon,
        rating,
        reviews_count,
        description_raw,
        description,
        tagline: None,
        pricing_hint,
        lastmod: lastmod.to_string(),
    })
}
