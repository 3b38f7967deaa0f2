use std::sync::LazyLock;

use scraper::{Html, Selector};
use uuid::Uuid;

use crate::store::{PricingPlanFeatureRow, PricingPlanRow};

use super::collapsed_text;

static PLAN_CARD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".app-details-pricing-plan-card").unwrap());
static PLAN_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-test-id="name"]"#).unwrap());
static PRICE_GROUP: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".app-details-pricing-format-group").unwrap());
static FEATURES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"ul[data-test-id="features"] li"#).unwrap());

/// Pricing plans and their feature lines. Each card gets a freshly generated
/// plan id; the same id tags that card's features so the join survives the
/// plan having no stable identity across runs.
pub fn extract(doc: &Html, app_id: &str) -> (Vec<PricingPlanRow>, Vec<PricingPlanFeatureRow>) {
    let mut plans = Vec::new();
    let mut features = Vec::new();
    for card in doc.select(&PLAN_CARD) {
        let plan_id = Uuid::new_v4().to_string();
        let title = card
            .select(&PLAN_NAME)
            .next()
            .map(collapsed_text)
            .unwrap_or_default();
        let price = card
            .select(&PRICE_GROUP)
            .next()
            .and_then(|el| el.value().attr("aria-label"))
            .map(|label| label.trim().to_string())
            .unwrap_or_default();
        for item in card.select(&FEATURES) {
            let feature = collapsed_text(item);
            if !feature.is_empty() {
                features.push(PricingPlanFeatureRow {
                    pricing_plan_id: plan_id.clone(),
                    app_id: app_id.to_string(),
                    feature,
                });
            }
        }
        plans.push(PricingPlanRow {
            id: plan_id,
            app_id: app_id.to_string(),
            title,
            price,
        });
    }
    (plans, features)
}
