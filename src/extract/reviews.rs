use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::store::ReviewRow;

use super::{collapsed_text, resolve_href};

static REVIEW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[data-merchant-review]").unwrap());
static SHOP: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "div.tw-text-heading-xs.tw-text-fg-primary.tw-overflow-hidden.tw-text-ellipsis.tw-whitespace-nowrap",
    )
    .unwrap()
});
static COUNTRY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".tw-order-2 > div:nth-child(2)").unwrap());
static USAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".tw-order-2 > div:nth-child(3)").unwrap());
static STARS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[aria-label]").unwrap());
static POSTED: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "div.tw-flex.tw-items-center.tw-justify-between.tw-mb-md > div.tw-text-body-xs.tw-text-fg-tertiary",
    )
    .unwrap()
});
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-truncate-review], [data-truncate-content-copy]").unwrap());
static BUTTON: LazyLock<Selector> = LazyLock::new(|| Selector::parse("button").unwrap());
static NEXT: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"[rel="next"]"#).unwrap());

/// One page of an app's review listing.
pub struct ReviewListing {
    pub reviews: Vec<ReviewRow>,
    pub next_page: Option<String>,
}

/// Reviews in listing order plus the resolved next-page link, if the page
/// declares one.
pub fn extract(doc: &Html, app_id: &str, page_url: &str) -> ReviewListing {
    let reviews = doc
        .select(&REVIEW)
        .map(|container| extract_one(container, app_id))
        .collect();
    let next_page = doc
        .select(&NEXT)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| resolve_href(page_url, href));
    ReviewListing { reviews, next_page }
}

fn extract_one(container: ElementRef, app_id: &str) -> ReviewRow {
    let shop_name = container
        .select(&SHOP)
        .next()
        .map(collapsed_text)
        .unwrap_or_default();
    let country = container
        .select(&COUNTRY)
        .next()
        .map(collapsed_text)
        .unwrap_or_default();
    let usage_time = container
        .select(&USAGE)
        .next()
        .map(collapsed_text)
        .unwrap_or_default();
    let rating = container
        .select(&STARS)
        .next()
        .and_then(|el| el.value().attr("aria-label"))
        .map(star_rating)
        .unwrap_or(0);
    let posted_at = container
        .select(&POSTED)
        .next()
        .map(|el| posted_date(&collapsed_text(el)))
        .unwrap_or_default();
    let content = container
        .select(&BODY)
        .next()
        .map(review_body)
        .unwrap_or_default();
    ReviewRow {
        app_id: app_id.to_string(),
        shop_name,
        country,
        usage_time,
        rating,
        posted_at,
        content,
    }
}

/// First token of a star label like "5 out of 5 stars"; zero when unreadable.
fn star_rating(label: &str) -> u32 {
    label
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .unwrap_or(0)
}

/// Posted dates of edited reviews carry an "Edited" marker that is not part
/// of the date.
fn posted_date(text: &str) -> String {
    text.replace("Edited", "").trim().to_string()
}

/// Review body text with interactive controls removed, so labels like
/// "Show more" never leak into the content.
fn review_body(el: ElementRef) -> String {
    let mut fragment = Html::parse_fragment(&el.html());
    let button_ids: Vec<_> = fragment.select(&BUTTON).map(|b| b.id()).collect();
    for id in button_ids {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            node.detach();
        }
    }
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}
