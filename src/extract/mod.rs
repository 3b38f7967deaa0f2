pub mod app;
pub mod benefits;
pub mod categories;
pub mod pricing;
pub mod reviews;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use crate::error::ExtractionError;
use crate::store::{
    AppCategoryRow, AppRow, CategoryRow, KeyBenefitRow, PricingPlanFeatureRow, PricingPlanRow,
};

/// Everything one detail page yields. Reviews live on their own pages and go
/// through [`reviews::extract`] instead.
#[derive(Debug)]
pub struct ExtractedApp {
    pub app: AppRow,
    pub benefits: Vec<KeyBenefitRow>,
    pub plans: Vec<PricingPlanRow>,
    pub plan_features: Vec<PricingPlanFeatureRow>,
    pub categories: Vec<CategoryRow>,
    pub memberships: Vec<AppCategoryRow>,
}

/// Extract every record a detail page carries. Fails only when a mandatory
/// hero field is missing; optional sections yield empty vectors.
pub fn extract_detail_page(
    url: &str,
    app_id: &str,
    lastmod: &str,
    body: &str,
) -> Result<ExtractedApp, ExtractionError> {
    let doc = Html::parse_document(body);
    let app = app::extract(&doc, url, app_id, lastmod)?;
    let benefits = benefits::extract(&doc, app_id);
    let (plans, plan_features) = pricing::extract(&doc, app_id);
    let (categories, memberships) = categories::extract(&doc, app_id);
    Ok(ExtractedApp {
        app,
        benefits,
        plans,
        plan_features,
        categories,
        memberships,
    })
}

/// All text under an element, whitespace-collapsed and trimmed.
pub(crate) fn collapsed_text(el: ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9]").unwrap());

/// Digits of a free-text counter ("1,234 Reviews" -> 1234), zero on absence.
pub(crate) fn digits_or_zero(raw: &str) -> u32 {
    NON_DIGITS.replace_all(raw, "").parse().unwrap_or(0)
}

/// Resolve a possibly-relative href against the page it appeared on.
pub(crate) fn resolve_href(page_url: &str, href: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let resolved = base.join(href).ok()?;
    Some(resolved.to_string())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const APP_URL: &str = "https://apps.shopify.com/widget-app";
    const REVIEWS_URL: &str = "https://apps.shopify.com/widget-app/reviews";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn widget_app() -> ExtractedApp {
        extract_detail_page(APP_URL, "widget-app", "Mon, 02 Jun 2025 09:00:00 GMT", &fixture("widget_app"))
            .unwrap()
    }

    #[test]
    fn widget_app_hero_fields() {
        let extracted = widget_app();
        let app = &extracted.app;
        assert_eq!(app.id, "widget-app");
        assert_eq!(app.url, APP_URL);
        assert_eq!(app.title, "Widget App");
        assert_eq!(app.developer, "Widget Co");
        assert_eq!(
            app.developer_link.as_deref(),
            Some("https://apps.shopify.com/partners/widget-co")
        );
        assert_eq!(
            app.icon.as_deref(),
            Some("https://cdn.example.com/icons/widget-app.png")
        );
        assert_eq!(app.rating.as_deref(), Some("4.8"));
        assert_eq!(app.reviews_count, 1234);
        assert_eq!(app.pricing_hint.as_deref(), Some("Free plan available"));
        assert_eq!(app.tagline, None);
        assert_eq!(app.lastmod, "Mon, 02 Jun 2025 09:00:00 GMT");
    }

    #[test]
    fn widget_app_description_both_forms() {
        let app = widget_app().app;
        assert!(app.description_raw.starts_with("<div id=\"app-details\""));
        assert!(app.description_raw.contains("<ul>"));
        assert!(app.description.contains("Widget App keeps product widgets in sync."));
        // Collapsed text never carries markup or doubled spaces.
        assert!(!app.description.contains('<'));
        assert!(!app.description.contains("  "));
    }

    #[test]
    fn widget_app_benefits() {
        let extracted = widget_app();
        let descriptions: Vec<&str> = extracted
            .benefits
            .iter()
            .map(|b| b.description.as_str())
            .collect();
        assert_eq!(
            descriptions,
            vec!["Syncs inventory in real time", "Works with any storefront theme"]
        );
        assert!(extracted.benefits.iter().all(|b| b.app_id == "widget-app"));
        assert!(extracted.benefits.iter().all(|b| b.title.is_none()));
    }

    #[test]
    fn widget_app_pricing_plans_and_features() {
        let extracted = widget_app();
        assert_eq!(extracted.plans.len(), 2);
        let basic = &extracted.plans[0];
        let pro = &extracted.plans[1];
        assert_eq!(basic.title, "Basic");
        assert_eq!(basic.price, "Free");
        assert_eq!(pro.title, "Pro");
        assert_eq!(pro.price, "$9/month");
        // Plan ids are fresh opaque tokens, unique per card.
        assert_ne!(basic.id, pro.id);

        let basic_features: Vec<&str> = extracted
            .plan_features
            .iter()
            .filter(|f| f.pricing_plan_id == basic.id)
            .map(|f| f.feature.as_str())
            .collect();
        assert_eq!(basic_features, vec!["Up to 10 widgets", "Email support"]);
        let pro_features: Vec<&str> = extracted
            .plan_features
            .iter()
            .filter(|f| f.pricing_plan_id == pro.id)
            .map(|f| f.feature.as_str())
            .collect();
        assert_eq!(pro_features, vec!["Unlimited widgets"]);
        assert!(extracted.plan_features.iter().all(|f| f.app_id == "widget-app"));
    }

    #[test]
    fn widget_app_categories_case_folded() {
        let extracted = widget_app();
        let ids: Vec<&str> = extracted.categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["productivity", "store design"]);
        assert_eq!(extracted.categories[0].title, "Productivity");
        assert_eq!(extracted.categories[1].title, "Store Design");
        assert_eq!(extracted.memberships.len(), 2);
        assert_eq!(extracted.memberships[0].category_id, "productivity");
        assert!(extracted.memberships.iter().all(|m| m.app_id == "widget-app"));
    }

    #[test]
    fn sparse_page_still_yields_app() {
        let extracted = extract_detail_page(APP_URL, "widget-app", "", &fixture("sparse_app")).unwrap();
        assert_eq!(extracted.app.title, "Bare App");
        assert_eq!(extracted.app.reviews_count, 0);
        assert_eq!(extracted.app.rating, None);
        assert_eq!(extracted.app.pricing_hint, None);
        assert_eq!(extracted.app.icon, None);
        assert!(extracted.benefits.is_empty());
        assert!(extracted.plans.is_empty());
        assert!(extracted.plan_features.is_empty());
        assert!(extracted.categories.is_empty());
        assert!(extracted.memberships.is_empty());
    }

    #[test]
    fn missing_title_is_an_extraction_error() {
        let body = r#"<div id="adp-hero"><a href="/partners/x">X</a></div>"#;
        let err = extract_detail_page(APP_URL, "widget-app", "", body).unwrap_err();
        assert_eq!(err.field, "title");
        assert_eq!(err.url, APP_URL);
    }

    #[test]
    fn missing_developer_is_an_extraction_error() {
        let body = r#"<div id="adp-hero"><h1>Widget App</h1></div>"#;
        let err = extract_detail_page(APP_URL, "widget-app", "", body).unwrap_err();
        assert_eq!(err.field, "developer");
    }

    #[test]
    fn review_page_first() {
        let listing = reviews::extract(
            &Html::parse_document(&fixture("widget_app_reviews")),
            "widget-app",
            REVIEWS_URL,
        );
        assert_eq!(listing.reviews.len(), 2);
        let first = &listing.reviews[0];
        assert_eq!(first.shop_name, "Acme Store");
        assert_eq!(first.country, "United States");
        assert_eq!(first.usage_time, "3 months using the app");
        assert_eq!(first.rating, 5);
        assert_eq!(first.posted_at, "June 1, 2025");
        assert_eq!(first.content, "Great app, boosted our conversion.");

        let second = &listing.reviews[1];
        assert_eq!(second.shop_name, "Birch & Vine");
        assert_eq!(second.country, "Canada");
        assert_eq!(second.usage_time, "About 1 year using the app");
        assert_eq!(second.rating, 4);
        // "Edited" marker is stripped from the posted date.
        assert_eq!(second.posted_at, "May 7, 2025");

        assert_eq!(
            listing.next_page.as_deref(),
            Some("https://apps.shopify.com/widget-app/reviews?page=2")
        );
    }

    #[test]
    fn review_body_drops_control_labels() {
        let listing = reviews::extract(
            &Html::parse_document(&fixture("widget_app_reviews")),
            "widget-app",
            REVIEWS_URL,
        );
        for review in &listing.reviews {
            assert!(!review.content.contains("Show more"));
        }
    }

    #[test]
    fn review_last_page_has_no_next() {
        let listing = reviews::extract(
            &Html::parse_document(&fixture("widget_app_reviews_2")),
            "widget-app",
            REVIEWS_URL,
        );
        assert_eq!(listing.reviews.len(), 1);
        assert_eq!(listing.reviews[0].shop_name, "Gadget Garage");
        assert_eq!(listing.next_page, None);
    }

    #[test]
    fn empty_review_listing() {
        let listing = reviews::extract(
            &Html::parse_document("<html><body><div id=\"arp-reviews\"></div></body></html>"),
            "widget-app",
            REVIEWS_URL,
        );
        assert!(listing.reviews.is_empty());
        assert_eq!(listing.next_page, None);
    }

    #[test]
    fn counter_digits() {
        assert_eq!(digits_or_zero("1,234 Reviews"), 1234);
        assert_eq!(digits_or_zero("Reviews (56)"), 56);
        assert_eq!(digits_or_zero("No reviews yet"), 0);
        assert_eq!(digits_or_zero(""), 0);
    }

    #[test]
    fn href_resolution() {
        assert_eq!(
            resolve_href(APP_URL, "/partners/widget-co").as_deref(),
            Some("https://apps.shopify.com/partners/widget-co")
        );
        assert_eq!(
            resolve_href(REVIEWS_URL, "https://example.com/x").as_deref(),
            Some("https://example.com/x")
        );
        assert_eq!(resolve_href("not a url", "/x"), None);
    }
}
