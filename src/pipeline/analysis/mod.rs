//! Skin photo analysis pipeline.
//!
//! Raw image -> canonical preprocessing -> skin segmentation -> feature
//! extraction -> bounded metrics -> care advice. Every stage is a pure
//! function of its input; the only side channel is the injected observer.

pub mod analyzer;
pub mod color;
pub mod decode;
pub mod features;
pub mod observer;
pub mod preprocess;
pub mod recommend;
pub mod scoring;
pub mod segment;
pub mod spectral;
pub mod types;

pub use analyzer::{AnalysisReport, SkinAnalyzer};
pub use decode::{decode_photo, Orientation};
pub use features::{FeatureExtractor, StatisticalFeatureExtractor};
pub use observer::{AnalysisObserver, NoOpObserver, Stage, TracingObserver};
pub use preprocess::{CanonicalPreprocessor, ImagePreprocessor};
pub use recommend::{Advice, AdviceCategory, RecommendationEngine, RuleTable, RuleThresholds};
pub use scoring::MetricScorer;
pub use segment::{HsvSkinSegmenter, Segmentation, SkinSegmenter};
pub use spectral::{BandName, SpectralBand, SpectralFilterBank};
pub use types::*;

use thiserror::Error;

/// Errors surfaced by the analysis pipeline.
///
/// Only malformed input fails. Degenerate but valid images (no skin found,
/// uniform color) produce results, never errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Image could not be read: {0}")]
    UnreadableImage(String),

    #[error("Unsupported channel layout: {0} channels (expected 1, 3 or 4)")]
    UnsupportedChannelLayout(usize),
}
