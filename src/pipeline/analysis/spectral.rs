//! Synthetic spectral views of a processed image.
//!
//! A side branch: band views are for display and inspection, they never
//! feed segmentation or scoring.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use super::observer::{AnalysisObserver, Stage, TracingObserver};
use super::types::ProcessedImage;

/// Name of a spectral band, used as the map key for captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandName {
    Visible,
    Ultraviolet,
    Infrared,
}

impl BandName {
    pub const ALL: [BandName; 3] = [Self::Visible, Self::Ultraviolet, Self::Infrared];
}

impl fmt::Display for BandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visible => write!(f, "visible"),
            Self::Ultraviolet => write!(f, "ultraviolet"),
            Self::Infrared => write!(f, "infrared"),
        }
    }
}

impl FromStr for BandName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "visible" => Ok(Self::Visible),
            "ultraviolet" | "uv" => Ok(Self::Ultraviolet),
            "infrared" | "ir" => Ok(Self::Infrared),
            other => Err(format!("unknown spectral band '{other}'")),
        }
    }
}

/// Per-channel weights in RGB order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandKernel {
    pub weights: [f32; 3],
}

impl BandKernel {
    pub const ULTRAVIOLET: BandKernel = BandKernel {
        weights: [0.0, 0.0, 1.0],
    };
    pub const INFRARED: BandKernel = BandKernel {
        weights: [1.0, 0.0, 0.0],
    };

    fn apply(&self, img: &RgbImage) -> RgbImage {
        let mut out = RgbImage::new(img.width(), img.height());
        for (x, y, p) in img.enumerate_pixels() {
            let mut weighted = [0u8; 3];
            for c in 0..3 {
                weighted[c] = (p.0[c] as f32 * self.weights[c]).round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(x, y, Rgb(weighted));
        }
        out
    }
}

/// Closed set of bands the filter bank can produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpectralBand {
    Visible,
    UltravioletSynthetic(BandKernel),
    InfraredSynthetic(BandKernel),
}

impl SpectralBand {
    /// The standard band for a name.
    pub fn for_name(name: BandName) -> Self {
        match name {
            BandName::Visible => Self::Visible,
            BandName::Ultraviolet => Self::UltravioletSynthetic(BandKernel::ULTRAVIOLET),
            BandName::Infrared => Self::InfraredSynthetic(BandKernel::INFRARED),
        }
    }

    pub fn name(&self) -> BandName {
        match self {
            Self::Visible => BandName::Visible,
            Self::UltravioletSynthetic(_) => BandName::Ultraviolet,
            Self::InfraredSynthetic(_) => BandName::Infrared,
        }
    }

    pub fn apply(&self, image: &ProcessedImage) -> ProcessedImage {
        match self {
            Self::Visible => image.clone(),
            Self::UltravioletSynthetic(kernel) | Self::InfraredSynthetic(kernel) => {
                ProcessedImage::new(kernel.apply(image.as_rgb()))
            }
        }
    }
}

/// Produces band views of a processed image.
pub struct SpectralFilterBank {
    observer: Arc<dyn AnalysisObserver>,
}

impl Default for SpectralFilterBank {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl SpectralFilterBank {
    pub fn new(observer: Arc<dyn AnalysisObserver>) -> Self {
        Self { observer }
    }

    /// One view per requested band. Duplicate names collapse to one entry.
    pub fn capture(
        &self,
        image: &ProcessedImage,
        bands: &[BandName],
    ) -> BTreeMap<BandName, ProcessedImage> {
        let mut views = BTreeMap::new();
        for &name in bands {
            views
                .entry(name)
                .or_insert_with(|| SpectralBand::for_name(name).apply(image));
        }
        self.observer.stage_completed(
            Stage::Spectral,
            &[
                ("bands", views.len() as f64),
                ("width", image.width() as f64),
                ("height", image.height() as f64),
            ],
        );
        views
    }

    pub fn capture_all(&self, image: &ProcessedImage) -> BTreeMap<BandName, ProcessedImage> {
        self.capture(image, &BandName::ALL)
    }
}
