//! Logging collaborator injected into every analysis component.
//!
//! Components never reach for a process-wide logger; they report to the
//! observer they were built with. `TracingObserver` forwards to `tracing`,
//! which is what production callers want.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

/// Pipeline stage an event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preprocess,
    Spectral,
    Segment,
    Extract,
    Score,
    Recommend,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preprocess => write!(f, "preprocess"),
            Self::Spectral => write!(f, "spectral"),
            Self::Segment => write!(f, "segment"),
            Self::Extract => write!(f, "extract"),
            Self::Score => write!(f, "score"),
            Self::Recommend => write!(f, "recommend"),
        }
    }
}

/// Receives structured stage events.
pub trait AnalysisObserver: Send + Sync {
    /// A stage finished; `fields` carries its headline numbers.
    fn stage_completed(&self, stage: Stage, fields: &[(&'static str, f64)]);

    /// A stage produced a degenerate but valid result worth surfacing.
    fn warning(&self, stage: Stage, message: &str);
}

/// Forwards events to `tracing` at debug/warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AnalysisObserver for TracingObserver {
    fn stage_completed(&self, stage: Stage, fields: &[(&'static str, f64)]) {
        debug!(stage = %stage, fields = %FieldList(fields), "Analysis stage completed");
    }

    fn warning(&self, stage: Stage, message: &str) {
        warn!(stage = %stage, "{message}");
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObserver;

impl AnalysisObserver for NoOpObserver {
    fn stage_completed(&self, _stage: Stage, _fields: &[(&'static str, f64)]) {}

    fn warning(&self, _stage: Stage, _message: &str) {}
}

struct FieldList<'a>(&'a [(&'static str, f64)]);

impl fmt::Display for FieldList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}={value:.4}")?;
        }
        Ok(())
    }
}
