//! End-to-end analysis facade.
//!
//! Composes the stage services into one call: raw image in, metrics and
//! advice out. Services are trait objects so callers can swap any stage.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;

use super::features::{FeatureExtractor, StatisticalFeatureExtractor};
use super::observer::{AnalysisObserver, Stage, TracingObserver};
use super::preprocess::{CanonicalPreprocessor, ImagePreprocessor};
use super::recommend::{RecommendationEngine, RuleTable};
use super::scoring::MetricScorer;
use super::segment::{HsvSkinSegmenter, SkinSegmenter};
use super::spectral::{BandName, SpectralFilterBank};
use super::types::{CanonicalSize, FeatureSet, MetricResult, ModelInput, ProcessedImage, RawImage};
use super::AnalysisError;

/// Everything a caller needs from one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metrics: MetricResult,
    /// Fired advice, in category order.
    pub advice: Vec<String>,
    /// `advice` joined with the advice separator.
    pub recommendations: String,
    /// Fraction of the canonical image classified as skin.
    pub coverage: f64,
    /// Coverage fell below the configured minimum; metrics are unreliable.
    pub low_confidence: bool,
    pub features: FeatureSet,
    /// Imperfection ratio as a percentage.
    pub severity: f64,
    pub width: u32,
    pub height: u32,
}

pub struct SkinAnalyzer {
    preprocessor: Box<dyn ImagePreprocessor>,
    segmenter: Box<dyn SkinSegmenter>,
    extractor: Box<dyn FeatureExtractor>,
    scorer: MetricScorer,
    recommender: RecommendationEngine,
    spectral: SpectralFilterBank,
    observer: Arc<dyn AnalysisObserver>,
    size: CanonicalSize,
    min_coverage: f64,
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl SkinAnalyzer {
    pub fn new(
        preprocessor: Box<dyn ImagePreprocessor>,
        segmenter: Box<dyn SkinSegmenter>,
        extractor: Box<dyn FeatureExtractor>,
        recommender: RecommendationEngine,
        observer: Arc<dyn AnalysisObserver>,
    ) -> Self {
        let defaults = AnalysisConfig::default();
        Self {
            preprocessor,
            segmenter,
            extractor,
            scorer: MetricScorer::new(observer.clone()),
            recommender,
            spectral: SpectralFilterBank::new(observer.clone()),
            observer,
            size: defaults.canonical_size,
            min_coverage: defaults.min_skin_coverage,
            thread_pool: None,
        }
    }

    /// Production analyzer with default configuration, logging through `tracing`.
    pub fn standard() -> Self {
        Self::from_config(&AnalysisConfig::default(), Arc::new(TracingObserver))
    }

    pub fn from_config(config: &AnalysisConfig, observer: Arc<dyn AnalysisObserver>) -> Self {
        Self::new(
            Box::new(CanonicalPreprocessor::new(observer.clone())),
            Box::new(HsvSkinSegmenter::new(observer.clone())),
            Box::new(StatisticalFeatureExtractor::new(observer.clone())),
            RecommendationEngine::new(
                RuleTable::from_thresholds(&config.thresholds),
                observer.clone(),
            ),
            observer,
        )
        .with_canonical_size(config.canonical_size)
        .with_min_coverage(config.min_skin_coverage)
    }

    /// Canonical size images are resized to before segmentation.
    pub fn with_canonical_size(mut self, size: CanonicalSize) -> Self {
        self.size = size;
        self
    }

    /// Coverage below this marks a report low-confidence.
    pub fn with_min_coverage(mut self, min_coverage: f64) -> Self {
        self.min_coverage = min_coverage.clamp(0.0, 1.0);
        self
    }

    /// Use a custom rayon thread pool for batch analysis.
    pub fn with_thread_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.thread_pool = Some(pool);
        self
    }

    pub fn canonical_size(&self) -> CanonicalSize {
        self.size
    }

    /// Run the full chain on one image.
    pub fn analyze(&self, image: &RawImage) -> Result<AnalysisReport, AnalysisError> {
        let _span = tracing::info_span!(
            "skin_analysis",
            width = image.width(),
            height = image.height(),
            channels = image.channels(),
            size = %self.size,
        )
        .entered();

        let processed = self.preprocessor.preprocess(image, self.size)?;
        let segmentation = self.segmenter.segment(&processed);
        let features = self.extractor.extract(&segmentation.skin);
        let stats = self.extractor.intensity_stats(&segmentation.skin);
        let metrics = self.scorer.score(&features, &stats);
        let advice = self.recommender.recommend(&metrics);

        let low_confidence = segmentation.is_low_confidence(self.min_coverage);
        if low_confidence {
            self.observer.warning(
                Stage::Segment,
                &format!(
                    "Skin coverage {:.3} below minimum {:.3}; metrics are low-confidence",
                    segmentation.coverage, self.min_coverage
                ),
            );
        }

        Ok(AnalysisReport {
            recommendations: advice.joined(),
            advice: advice.messages().into_iter().map(String::from).collect(),
            metrics,
            coverage: segmentation.coverage,
            low_confidence,
            severity: features.imperfection_severity(),
            features,
            width: processed.width(),
            height: processed.height(),
        })
    }

    /// Analyze independent images in parallel. Results keep input order.
    pub fn analyze_batch(&self, images: &[RawImage]) -> Vec<Result<AnalysisReport, AnalysisError>> {
        let run = || -> Vec<_> { images.par_iter().map(|img| self.analyze(img)).collect() };
        match &self.thread_pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    /// Preprocess, then produce the requested synthetic band views.
    pub fn spectral_views(
        &self,
        image: &RawImage,
        bands: &[BandName],
    ) -> Result<BTreeMap<BandName, ProcessedImage>, AnalysisError> {
        let processed = self.preprocessor.preprocess(image, self.size)?;
        Ok(self.spectral.capture(&processed, bands))
    }

    /// Analysis-size, [0,1]-scaled input for a model collaborator.
    ///
    /// Goes through the configured preprocessor, so a swapped-in stage
    /// shapes model input the same way it shapes analysis.
    pub fn model_input(&self, image: &RawImage) -> Result<ModelInput, AnalysisError> {
        let processed = self
            .preprocessor
            .preprocess(image, CanonicalSize::Analysis)?;
        Ok(ModelInput::from(&processed))
    }
}

impl Default for SkinAnalyzer {
    fn default() -> Self {
        Self::standard()
    }
}
