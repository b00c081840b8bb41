//! Color-based skin segmentation.
//!
//! HSV range threshold, then morphological opening (drops specks) and
//! closing (fills pinholes) with a 5x5 rectangle. The result is a binary
//! mask plus the source image with non-skin pixels zeroed.

use std::sync::Arc;

use image::{GrayImage, Luma, Rgb, RgbImage};

use super::color::rgb_to_hsv;
use super::observer::{AnalysisObserver, Stage, TracingObserver};
use super::types::{ProcessedImage, SkinImage, SkinMask, MASK_OFF, MASK_ON};

/// Inclusive 8-bit HSV bounds of skin tones.
pub mod skin_range {
    pub const HUE_MIN: u8 = 0;
    pub const HUE_MAX: u8 = 20;
    pub const SATURATION_MIN: u8 = 20;
    pub const SATURATION_MAX: u8 = 255;
    pub const VALUE_MIN: u8 = 70;
    pub const VALUE_MAX: u8 = 255;
}

/// Side of the square structuring element.
pub const MORPH_KERNEL_SIZE: u32 = 5;

/// Output of segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub skin: SkinImage,
    pub mask: SkinMask,
    /// Fraction of pixels classified as skin, in [0,1].
    pub coverage: f64,
}

impl Segmentation {
    /// True when too little skin was found for the metrics to mean much.
    pub fn is_low_confidence(&self, min_coverage: f64) -> bool {
        self.coverage < min_coverage
    }
}

pub trait SkinSegmenter: Send + Sync {
    fn segment(&self, image: &ProcessedImage) -> Segmentation;
}

/// HSV threshold + open/close segmenter.
pub struct HsvSkinSegmenter {
    observer: Arc<dyn AnalysisObserver>,
}

impl Default for HsvSkinSegmenter {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl HsvSkinSegmenter {
    pub fn new(observer: Arc<dyn AnalysisObserver>) -> Self {
        Self { observer }
    }
}

impl SkinSegmenter for HsvSkinSegmenter {
    fn segment(&self, image: &ProcessedImage) -> Segmentation {
        let raw_mask = threshold_skin_tones(image.as_rgb());
        let cleaned = close(&open(&raw_mask, MORPH_KERNEL_SIZE), MORPH_KERNEL_SIZE);
        let mask = SkinMask::from_gray(cleaned);
        let skin = apply_mask(image.as_rgb(), &mask);
        let coverage = mask.coverage();

        self.observer.stage_completed(
            Stage::Segment,
            &[
                ("skin_pixels", mask.skin_pixel_count() as f64),
                ("coverage", coverage),
            ],
        );
        if coverage == 0.0 {
            self.observer
                .warning(Stage::Segment, "No skin-toned pixels found; metrics will be degenerate");
        }

        Segmentation {
            skin: SkinImage::new(skin),
            mask,
            coverage,
        }
    }
}

/// Initial mask: `MASK_ON` where the pixel's HSV falls inside `skin_range`.
pub fn threshold_skin_tones(img: &RgbImage) -> GrayImage {
    use self::skin_range::*;

    let mut mask = GrayImage::new(img.width(), img.height());
    for (x, y, p) in img.enumerate_pixels() {
        let [h, s, v] = rgb_to_hsv(p.0);
        let in_range = (HUE_MIN..=HUE_MAX).contains(&h)
            && (SATURATION_MIN..=SATURATION_MAX).contains(&s)
            && (VALUE_MIN..=VALUE_MAX).contains(&v);
        mask.put_pixel(x, y, Luma([if in_range { MASK_ON } else { MASK_OFF }]));
    }
    mask
}

/// Minimum filter over a `size` x `size` window. Out-of-image pixels are skipped.
pub fn erode(mask: &GrayImage, size: u32) -> GrayImage {
    rank_filter(mask, size, |a, b| a.min(b))
}

/// Maximum filter over a `size` x `size` window. Out-of-image pixels are skipped.
pub fn dilate(mask: &GrayImage, size: u32) -> GrayImage {
    rank_filter(mask, size, |a, b| a.max(b))
}

pub fn open(mask: &GrayImage, size: u32) -> GrayImage {
    dilate(&erode(mask, size), size)
}

pub fn close(mask: &GrayImage, size: u32) -> GrayImage {
    erode(&dilate(mask, size), size)
}

// Rectangular elements are separable: a horizontal pass then a vertical pass.
fn rank_filter(mask: &GrayImage, size: u32, pick: fn(u8, u8) -> u8) -> GrayImage {
    let (w, h) = mask.dimensions();
    let before = (size.saturating_sub(1) / 2) as i64;
    let after = (size / 2) as i64;

    let mut horizontal = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let lo = (x as i64 - before).max(0) as u32;
            let hi = (x as i64 + after).min(w as i64 - 1) as u32;
            let mut acc = mask.get_pixel(x, y).0[0];
            for nx in lo..=hi {
                acc = pick(acc, mask.get_pixel(nx, y).0[0]);
            }
            horizontal.put_pixel(x, y, Luma([acc]));
        }
    }

    let mut output = GrayImage::new(w, h);
    for y in 0..h {
        let lo = (y as i64 - before).max(0) as u32;
        let hi = (y as i64 + after).min(h as i64 - 1) as u32;
        for x in 0..w {
            let mut acc = horizontal.get_pixel(x, y).0[0];
            for ny in lo..=hi {
                acc = pick(acc, horizontal.get_pixel(x, ny).0[0]);
            }
            output.put_pixel(x, y, Luma([acc]));
        }
    }
    output
}

/// Zero every pixel outside the mask; pixels inside are copied untouched.
pub fn apply_mask(img: &RgbImage, mask: &SkinMask) -> RgbImage {
    let mut out = RgbImage::new(img.width(), img.height());
    for (x, y, p) in img.enumerate_pixels() {
        if mask.is_skin(x, y) {
            out.put_pixel(x, y, *p);
        } else {
            out.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    out
}
