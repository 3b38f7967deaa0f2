use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::extract::resolve_href;
use crate::fetch::PageFetcher;

pub const DEFAULT_CATEGORY_URL: &str =
    "https://apps.shopify.com/categories/finding-products-sourcing-options-print-on-demand-pod/all";

static APP_CARDS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-controller="app-card"]"#).unwrap());
static NEXT: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"a[rel="next"]"#).unwrap());

/// Walk a category listing's pagination and collect detail-page URLs in
/// first-seen order. Tracking parameters after `?` are stripped, so an app
/// surfacing in several positions dedups to one seed.
pub async fn collect_app_urls(fetcher: &dyn PageFetcher, start_url: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    let mut visited_pages = HashSet::new();
    let mut next_url = start_url.to_string();

    loop {
        if !visited_pages.insert(next_url.clone()) {
            // Pagination pointed back at an earlier page; stop rather than spin.
            break;
        }
        let page = match fetcher.fetch(&next_url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("discovery stopped early, keeping {} urls: {}", urls.len(), e);
                break;
            }
        };
        let doc = Html::parse_document(&page.body);
        for card in doc.select(&APP_CARDS) {
            if let Some(link) = card.value().attr("data-app-card-app-link-value") {
                let url = link.split('?').next().unwrap_or(link).to_string();
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }
        match doc
            .select(&NEXT)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| resolve_href(&page.final_url, href))
        {
            Some(url) => next_url = url,
            None => break,
        }
    }

    info!("discovered {} app urls", urls.len());
    urls
}

/// One URL per line, the format the crawl reads back as its seed list.
pub fn write_seed_file(path: &Path, urls: &[String]) -> io::Result<()> {
    let mut text = urls.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    fs::write(path, text)
}

pub fn read_seed_file(path: &Path) -> io::Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

// ── Tests ──
