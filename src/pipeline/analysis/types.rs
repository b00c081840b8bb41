use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Input
// ═══════════════════════════════════════════════════════════

/// Decoded pixel grid as handed over by the caller.
///
/// Row-major, interleaved, 8-bit samples. Nothing is validated at
/// construction; the preprocessor rejects malformed buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, channels: usize, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Uniformly filled image, mostly useful for tests and calibration shots.
    pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * pixel.len());
        for _ in 0..count {
            data.extend_from_slice(pixel);
        }
        Self::new(width, height, pixel.len(), data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl From<&DynamicImage> for RawImage {
    /// Keeps 8-bit gray/RGB/RGBA layouts as-is; anything else is widened to RGBA.
    fn from(img: &DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(buf) => {
                Self::new(buf.width(), buf.height(), 1, buf.as_raw().clone())
            }
            DynamicImage::ImageRgb8(buf) => {
                Self::new(buf.width(), buf.height(), 3, buf.as_raw().clone())
            }
            DynamicImage::ImageRgba8(buf) => {
                Self::new(buf.width(), buf.height(), 4, buf.as_raw().clone())
            }
            other => {
                let rgba = other.to_rgba8();
                Self::new(rgba.width(), rgba.height(), 4, rgba.into_raw())
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Canonical images
// ═══════════════════════════════════════════════════════════

/// Target dimensions an image is resized to before a given consumer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalSize {
    /// 640x480, the capture/display path.
    Capture,
    /// 224x224, the feature/model-feeding path.
    Analysis,
}

impl CanonicalSize {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Capture => (640, 480),
            Self::Analysis => (224, 224),
        }
    }
}

impl Default for CanonicalSize {
    fn default() -> Self {
        Self::Capture
    }
}

impl std::fmt::Display for CanonicalSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capture => write!(f, "capture"),
            Self::Analysis => write!(f, "analysis"),
        }
    }
}

impl std::str::FromStr for CanonicalSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "capture" => Ok(Self::Capture),
            "analysis" => Ok(Self::Analysis),
            other => Err(format!("unknown canonical size '{other}'")),
        }
    }
}

/// Preprocessed image: interleaved RGB, samples in [0,255].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    image: RgbImage,
}

impl ProcessedImage {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_rgb(self) -> RgbImage {
        self.image
    }
}

/// Preprocessed image with every non-skin pixel zeroed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkinImage {
    image: RgbImage,
}

impl SkinImage {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// True when no pixel survived segmentation.
    pub fn is_blank(&self) -> bool {
        self.image.as_raw().iter().all(|&v| v == 0)
    }
}

/// Mask level for skin pixels.
pub const MASK_ON: u8 = 255;
/// Mask level for background pixels.
pub const MASK_OFF: u8 = 0;

/// Binary skin mask. Only `MASK_ON` and `MASK_OFF` ever appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkinMask {
    mask: GrayImage,
}

impl SkinMask {
    /// Any non-zero level is treated as skin.
    pub fn from_gray(mut mask: GrayImage) -> Self {
        for p in mask.pixels_mut() {
            p.0[0] = if p.0[0] > 0 { MASK_ON } else { MASK_OFF };
        }
        Self { mask }
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn is_skin(&self, x: u32, y: u32) -> bool {
        self.mask.get_pixel(x, y).0[0] == MASK_ON
    }

    pub fn skin_pixel_count(&self) -> usize {
        self.mask.pixels().filter(|p| p.0[0] == MASK_ON).count()
    }

    /// Fraction of pixels classified as skin, in [0,1].
    pub fn coverage(&self) -> f64 {
        let total = self.mask.width() as usize * self.mask.height() as usize;
        if total == 0 {
            return 0.0;
        }
        self.skin_pixel_count() as f64 / total as f64
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.mask
    }
}

/// Analysis-size image as `f32` HWC samples in [0,1], ready for a model collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    /// Interleaved RGB, `width * height * 3` values.
    pub data: Vec<f32>,
}

impl From<&ProcessedImage> for ModelInput {
    fn from(processed: &ProcessedImage) -> Self {
        Self {
            width: processed.width(),
            height: processed.height(),
            data: processed
                .as_rgb()
                .as_raw()
                .iter()
                .map(|&v| v as f32 / 255.0)
                .collect(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Statistics and metrics
// ═══════════════════════════════════════════════════════════

/// Texture, color and imperfection statistics of a skin image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Variance of the Laplacian response. Zero for a uniform image.
    pub texture_energy: f64,
    /// Mean of 8-bit Lab L.
    pub brightness: f64,
    /// Mean of 8-bit Lab a (128 = neutral).
    pub red_green_axis: f64,
    /// Mean of 8-bit Lab b (128 = neutral).
    pub blue_yellow_axis: f64,
    /// Standard deviation of 8-bit Lab L.
    pub color_variance: f64,
    /// Fraction of pixels darker than their neighborhood by the offset margin.
    pub imperfection_ratio: f64,
}

impl FeatureSet {
    /// Imperfection ratio as a percentage.
    pub fn imperfection_severity(&self) -> f64 {
        self.imperfection_ratio * 100.0
    }
}

/// Intensity projections the scorer consumes. All on the 0..255 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityStats {
    /// Mean of the HSV value channel.
    pub mean_value_channel: f64,
    /// 75th percentile of grayscale intensity.
    pub gray_p75: f64,
    /// Standard deviation of 8-bit Lab a.
    pub chroma_a_stddev: f64,
}

/// The four bounded skin metrics, each in [0,100] with two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub score: f64,
    pub moisture: f64,
    pub oil: f64,
    pub sensitivity: f64,
}
