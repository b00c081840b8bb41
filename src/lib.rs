//! Deterministic skin photo analysis.
//!
//! Entry point is [`SkinAnalyzer`]: hand it a decoded [`RawImage`] and get
//! back an [`AnalysisReport`] with the four bounded metrics, care advice and
//! the skin coverage the numbers are based on. Each stage is also usable on
//! its own through `pipeline::analysis`.

pub mod config;
pub mod pipeline;

pub use config::AnalysisConfig;
pub use pipeline::analysis::{
    AnalysisError, AnalysisReport, CanonicalSize, MetricResult, RawImage, SkinAnalyzer,
};
