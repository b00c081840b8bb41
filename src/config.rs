use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::analysis::recommend::RuleThresholds;
use crate::pipeline::analysis::types::CanonicalSize;

/// Application-level constants
pub const APP_NAME: &str = "Skinscope";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable consulted for the log filter before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "SKINSCOPE_LOG";

/// Fallback skin coverage below which a report is flagged low-confidence.
pub const DEFAULT_MIN_SKIN_COVERAGE: f64 = 0.05;

/// Log filter used when neither `SKINSCOPE_LOG` nor `RUST_LOG` is set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,skinscope=debug"
    } else {
        "warn,skinscope=info"
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Caller-tunable analysis settings. Pipeline constants (denoise strength,
/// CLAHE, HSV skin range, kernels) are fixed and not part of this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub canonical_size: CanonicalSize,
    pub min_skin_coverage: f64,
    pub thresholds: RuleThresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            canonical_size: CanonicalSize::default(),
            min_skin_coverage: DEFAULT_MIN_SKIN_COVERAGE,
            thresholds: RuleThresholds::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse JSON; missing fields fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_skin_coverage) {
            return Err(ConfigError::Invalid(format!(
                "min_skin_coverage must be in [0,1], got {}",
                self.min_skin_coverage
            )));
        }
        let t = &self.thresholds;
        let all = [
            ("moisture_low", t.moisture_low),
            ("moisture_high", t.moisture_high),
            ("oil_high", t.oil_high),
            ("oil_low", t.oil_low),
            ("sensitivity_high", t.sensitivity_high),
            ("score_low", t.score_low),
            ("score_high", t.score_high),
        ];
        for (name, value) in all {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "threshold {name} must be in [0,100], got {value}"
                )));
            }
        }
        Ok(())
    }
}
