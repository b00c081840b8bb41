//! Projection of features onto the four bounded skin metrics.

use std::sync::Arc;

use super::observer::{AnalysisObserver, Stage, TracingObserver};
use super::types::{FeatureSet, IntensityStats, MetricResult};

/// Texture energy that maps to a full score of 100.
pub const TEXTURE_FULL_SCALE: f64 = 1000.0;

/// Divisor taking a 0..255 intensity onto 0..100.
pub const INTENSITY_SCALE: f64 = 2.55;

pub const METRIC_MIN: f64 = 0.0;
pub const METRIC_MAX: f64 = 100.0;

/// Linear projections, clamped and rounded to two decimals.
///
/// Clamping happens here and nowhere else: upstream statistics are
/// unbounded, every `MetricResult` field leaving this type is in [0,100].
pub struct MetricScorer {
    observer: Arc<dyn AnalysisObserver>,
}

impl Default for MetricScorer {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl MetricScorer {
    pub fn new(observer: Arc<dyn AnalysisObserver>) -> Self {
        Self { observer }
    }

    pub fn score(&self, features: &FeatureSet, stats: &IntensityStats) -> MetricResult {
        let result = MetricResult {
            score: clamp_and_round(features.texture_energy / TEXTURE_FULL_SCALE * 100.0),
            moisture: clamp_and_round(stats.mean_value_channel / INTENSITY_SCALE),
            oil: clamp_and_round(stats.gray_p75 / INTENSITY_SCALE),
            sensitivity: clamp_and_round(stats.chroma_a_stddev / INTENSITY_SCALE),
        };

        self.observer.stage_completed(
            Stage::Score,
            &[
                ("score", result.score),
                ("moisture", result.moisture),
                ("oil", result.oil),
                ("sensitivity", result.sensitivity),
            ],
        );
        result
    }
}

/// Clamp to [0,100], then round to two decimals. NaN collapses to 0.
pub fn clamp_and_round(value: f64) -> f64 {
    if value.is_nan() {
        return METRIC_MIN;
    }
    let clamped = value.clamp(METRIC_MIN, METRIC_MAX);
    (clamped * 100.0).round() / 100.0
}
