//! Rule-based care advice derived from the metrics.
//!
//! One rule table, evaluated in fixed category order: moisture, oil,
//! sensitivity, overall. Each category contributes at most one message,
//! the first of its rules that fires.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::observer::{AnalysisObserver, Stage, TracingObserver};
use super::types::MetricResult;

/// Separator used wherever advice is rendered as a single string.
pub const ADVICE_SEPARATOR: &str = "\n";

/// Default rule thresholds, on the 0..100 metric scale.
pub mod thresholds {
    pub const MOISTURE_LOW: f64 = 30.0;
    pub const MOISTURE_HIGH: f64 = 70.0;
    pub const OIL_HIGH: f64 = 70.0;
    pub const OIL_LOW: f64 = 30.0;
    pub const SENSITIVITY_HIGH: f64 = 50.0;
    pub const SCORE_LOW: f64 = 60.0;
    pub const SCORE_HIGH: f64 = 80.0;
}

// ═══════════════════════════════════════════════════════════
// Rule table
// ═══════════════════════════════════════════════════════════

/// Advice category. Declaration order is evaluation and output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceCategory {
    Moisture,
    Oil,
    Sensitivity,
    Overall,
}

impl AdviceCategory {
    pub const ORDER: [AdviceCategory; 4] =
        [Self::Moisture, Self::Oil, Self::Sensitivity, Self::Overall];
}

impl fmt::Display for AdviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Moisture => write!(f, "moisture"),
            Self::Oil => write!(f, "oil"),
            Self::Sensitivity => write!(f, "sensitivity"),
            Self::Overall => write!(f, "overall"),
        }
    }
}

/// Metric a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Score,
    Moisture,
    Oil,
    Sensitivity,
}

impl MetricKind {
    pub fn value_of(self, metrics: &MetricResult) -> f64 {
        match self {
            Self::Score => metrics.score,
            Self::Moisture => metrics.moisture,
            Self::Oil => metrics.oil,
            Self::Sensitivity => metrics.sensitivity,
        }
    }
}

/// Strict comparison against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Below,
    Above,
}

impl Comparator {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Below => value < threshold,
            Self::Above => value > threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub category: AdviceCategory,
    pub metric: MetricKind,
    pub comparator: Comparator,
    pub threshold: f64,
    pub message: String,
}

impl Rule {
    pub fn fires(&self, metrics: &MetricResult) -> bool {
        self.comparator
            .holds(self.metric.value_of(metrics), self.threshold)
    }
}

/// Caller-tunable thresholds. Messages and rule shape stay fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    pub moisture_low: f64,
    pub moisture_high: f64,
    pub oil_high: f64,
    pub oil_low: f64,
    pub sensitivity_high: f64,
    pub score_low: f64,
    pub score_high: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            moisture_low: thresholds::MOISTURE_LOW,
            moisture_high: thresholds::MOISTURE_HIGH,
            oil_high: thresholds::OIL_HIGH,
            oil_low: thresholds::OIL_LOW,
            sensitivity_high: thresholds::SENSITIVITY_HIGH,
            score_low: thresholds::SCORE_LOW,
            score_high: thresholds::SCORE_HIGH,
        }
    }
}

/// Ordered rules, grouped by category in `AdviceCategory::ORDER`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleTable {
    pub fn standard() -> Self {
        Self::from_thresholds(&RuleThresholds::default())
    }

    pub fn from_thresholds(t: &RuleThresholds) -> Self {
        use AdviceCategory as C;
        use Comparator::{Above, Below};
        use MetricKind as M;

        let rule = |category, metric, comparator, threshold, message: &str| Rule {
            category,
            metric,
            comparator,
            threshold,
            message: message.to_string(),
        };

        Self::new(vec![
            rule(
                C::Moisture,
                M::Moisture,
                Below,
                t.moisture_low,
                "Skin is low on moisture; use a hydrating product to restore water content.",
            ),
            rule(
                C::Moisture,
                M::Moisture,
                Above,
                t.moisture_high,
                "Moisture level is healthy; maintain your current routine.",
            ),
            rule(
                C::Oil,
                M::Oil,
                Above,
                t.oil_high,
                "Oil production is high; use an oil-control product and cleanse regularly.",
            ),
            rule(
                C::Oil,
                M::Oil,
                Below,
                t.oil_low,
                "Skin is on the dry side; use a richer moisturizing product.",
            ),
            rule(
                C::Sensitivity,
                M::Sensitivity,
                Above,
                t.sensitivity_high,
                "Skin appears sensitive; use gentle, low-irritant products.",
            ),
            rule(
                C::Overall,
                M::Score,
                Below,
                t.score_low,
                "Keep a more regular care routine to improve overall skin condition.",
            ),
            rule(
                C::Overall,
                M::Score,
                Above,
                t.score_high,
                "Overall skin condition is good; maintain your current care habits.",
            ),
        ])
    }

    /// Rules are stably sorted into category order.
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|r| r.category);
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

// ═══════════════════════════════════════════════════════════
// Advice
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdviceItem {
    pub category: AdviceCategory,
    pub message: String,
}

/// Fired advice, in category order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Advice {
    pub items: Vec<AdviceItem>,
}

impl Advice {
    pub fn messages(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.message.as_str()).collect()
    }

    /// All messages joined with `ADVICE_SEPARATOR`.
    pub fn joined(&self) -> String {
        self.messages().join(ADVICE_SEPARATOR)
    }

    pub fn contains_category(&self, category: AdviceCategory) -> bool {
        self.items.iter().any(|i| i.category == category)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub struct RecommendationEngine {
    table: RuleTable,
    observer: Arc<dyn AnalysisObserver>,
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new(RuleTable::standard(), Arc::new(TracingObserver))
    }
}

impl RecommendationEngine {
    pub fn new(table: RuleTable, observer: Arc<dyn AnalysisObserver>) -> Self {
        Self { table, observer }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn recommend(&self, metrics: &MetricResult) -> Advice {
        let mut items = Vec::new();
        for category in AdviceCategory::ORDER {
            let fired = self
                .table
                .rules
                .iter()
                .filter(|r| r.category == category)
                .find(|r| r.fires(metrics));
            if let Some(rule) = fired {
                items.push(AdviceItem {
                    category,
                    message: rule.message.clone(),
                });
            }
        }

        self.observer
            .stage_completed(Stage::Recommend, &[("advice_count", items.len() as f64)]);
        Advice { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::observer::NoOpObserver;

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(RuleTable::standard(), Arc::new(NoOpObserver))
    }

    fn metrics(score: f64, moisture: f64, oil: f64, sensitivity: f64) -> MetricResult {
        MetricResult {
            score,
            moisture,
            oil,
            sensitivity,
        }
    }

    #[test]
    fn dry_oily_sensitive_skin_gets_ordered_advice() {
        let advice = engine().recommend(&metrics(50.0, 20.0, 80.0, 60.0));
        let messages = advice.messages();

        let hydrate = messages.iter().position(|m| m.contains("hydrating"));
        let oil = messages.iter().position(|m| m.contains("oil-control"));
        let gentle = messages.iter().position(|m| m.contains("gentle"));
        assert!(hydrate.is_some() && oil.is_some() && gentle.is_some());
        assert!(hydrate < oil && oil < gentle);
        assert!(!messages.iter().any(|m| m.contains("maintain")));
    }

    #[test]
    fn balanced_skin_gets_maintain_advice() {
        let advice = engine().recommend(&metrics(90.0, 75.0, 50.0, 10.0));
        assert_eq!(advice.items.len(), 2);
        assert_eq!(advice.items[0].category, AdviceCategory::Moisture);
        assert_eq!(advice.items[1].category, AdviceCategory::Overall);
        assert!(advice.messages().iter().all(|m| m.contains("maintain")));
    }

    #[test]
    fn standard_table_is_grouped_by_category() {
        let engine = engine();
        let rules = engine.table().rules();
        assert_eq!(rules.len(), 7);
        assert!(rules.windows(2).all(|w| w[0].category <= w[1].category));
        assert_eq!(rules[0].category, AdviceCategory::Moisture);
        assert_eq!(rules[6].category, AdviceCategory::Overall);
    }

    #[test]
    fn contains_category_reflects_fired_rules() {
        let advice = engine().recommend(&metrics(50.0, 20.0, 50.0, 60.0));
        assert!(advice.contains_category(AdviceCategory::Moisture));
        assert!(advice.contains_category(AdviceCategory::Sensitivity));
        assert!(!advice.contains_category(AdviceCategory::Oil));
    }

    #[test]
    fn thresholds_are_strict() {
        let advice = engine().recommend(&metrics(60.0, 30.0, 70.0, 50.0));
        assert!(advice.is_empty());
        assert_eq!(advice.joined(), "");
    }

    #[test]
    fn at_most_one_message_per_category() {
        // Overlapping custom thresholds: both moisture rules would fire
        let t = RuleThresholds {
            moisture_low: 60.0,
            moisture_high: 40.0,
            ..RuleThresholds::default()
        };
        let engine =
            RecommendationEngine::new(RuleTable::from_thresholds(&t), Arc::new(NoOpObserver));
        let advice = engine.recommend(&metrics(70.0, 50.0, 50.0, 0.0));
        assert_eq!(advice.items.len(), 1);
        assert!(advice.items[0].message.contains("hydrating"));
    }

    #[test]
    fn joined_uses_newline_separator() {
        let advice = engine().recommend(&metrics(50.0, 20.0, 50.0, 0.0));
        assert_eq!(advice.items.len(), 2);
        assert_eq!(advice.joined().lines().count(), 2);
        assert!(advice.joined().contains(ADVICE_SEPARATOR));
    }

    #[test]
    fn zero_metrics_advise_hydration_moisturizing_and_routine() {
        let advice = engine().recommend(&metrics(0.0, 0.0, 0.0, 0.0));
        let categories: Vec<_> = advice.items.iter().map(|i| i.category).collect();
        assert_eq!(
            categories,
            vec![AdviceCategory::Moisture, AdviceCategory::Oil, AdviceCategory::Overall]
        );
    }

    #[test]
    fn recommendation_is_deterministic() {
        let m = metrics(42.5, 12.0, 88.0, 51.0);
        assert_eq!(engine().recommend(&m), engine().recommend(&m));
    }

    #[test]
    fn custom_table_is_sorted_into_category_order() {
        let table = RuleTable::new(vec![
            Rule {
                category: AdviceCategory::Overall,
                metric: MetricKind::Score,
                comparator: Comparator::Below,
                threshold: 100.0,
                message: "overall".into(),
            },
            Rule {
                category: AdviceCategory::Moisture,
                metric: MetricKind::Moisture,
                comparator: Comparator::Below,
                threshold: 100.0,
                message: "moisture".into(),
            },
        ]);
        let engine = RecommendationEngine::new(table, Arc::new(NoOpObserver));
        let advice = engine.recommend(&metrics(0.0, 0.0, 0.0, 0.0));
        assert_eq!(advice.messages(), vec!["moisture", "overall"]);
    }

    #[test]
    fn thresholds_deserialize_with_defaults() {
        let t: RuleThresholds = serde_json::from_str(r#"{"sensitivity_high": 70.0}"#).unwrap();
        assert_eq!(t.sensitivity_high, 70.0);
        assert_eq!(t.moisture_low, thresholds::MOISTURE_LOW);
    }
}
