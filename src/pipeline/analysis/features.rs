//! Texture, color and imperfection statistics of a segmented skin image.
//!
//! Statistics run over the whole skin image, masked-out (zeroed) pixels
//! included, so coverage directly shifts the numbers. Callers who care
//! check `Segmentation::coverage` first.

use std::sync::Arc;

use image::{GrayImage, Luma};

use super::color::{lab_planes, rgb_to_gray, rgb_to_hsv};
use super::observer::{AnalysisObserver, Stage, TracingObserver};
use super::preprocess::reflect_101;
use super::types::{FeatureSet, IntensityStats, SkinImage};

/// Adaptive-threshold block side for the imperfection detector.
const IMPERFECTION_BLOCK_SIZE: u32 = 11;

/// Gaussian sigma of the local-mean window.
const IMPERFECTION_SIGMA: f64 = 2.0;

/// A pixel counts as an imperfection when it sits this far below its local mean.
const IMPERFECTION_OFFSET: i32 = 2;

/// Percentile of gray intensity the oil metric is based on.
const OIL_PERCENTILE: f64 = 75.0;

pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, skin: &SkinImage) -> FeatureSet;

    fn intensity_stats(&self, skin: &SkinImage) -> IntensityStats;
}

/// Laplacian texture, Lab color moments and adaptive-threshold imperfections.
pub struct StatisticalFeatureExtractor {
    observer: Arc<dyn AnalysisObserver>,
}

impl Default for StatisticalFeatureExtractor {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl StatisticalFeatureExtractor {
    pub fn new(observer: Arc<dyn AnalysisObserver>) -> Self {
        Self { observer }
    }
}

impl FeatureExtractor for StatisticalFeatureExtractor {
    fn extract(&self, skin: &SkinImage) -> FeatureSet {
        let gray = rgb_to_gray(skin.as_rgb());
        let texture_energy = compute_texture_energy(&gray);
        let color = compute_color_statistics(skin);
        let imperfection_ratio = compute_imperfection_ratio(&gray);

        let features = FeatureSet {
            texture_energy,
            brightness: color.brightness,
            red_green_axis: color.red_green_axis,
            blue_yellow_axis: color.blue_yellow_axis,
            color_variance: color.color_variance,
            imperfection_ratio,
        };

        self.observer.stage_completed(
            Stage::Extract,
            &[
                ("texture_energy", features.texture_energy),
                ("brightness", features.brightness),
                ("color_variance", features.color_variance),
                ("imperfection_ratio", features.imperfection_ratio),
            ],
        );
        features
    }

    fn intensity_stats(&self, skin: &SkinImage) -> IntensityStats {
        let rgb = skin.as_rgb();

        let (mean_value_channel, _) = mean_and_std(rgb.pixels().map(|p| rgb_to_hsv(p.0)[2]));
        let gray_p75 = percentile(&rgb_to_gray(rgb), OIL_PERCENTILE);
        let [_, a, _] = lab_planes(rgb);
        let (_, chroma_a_stddev) = mean_and_std(a.pixels().map(|p| p.0[0]));

        IntensityStats {
            mean_value_channel,
            gray_p75,
            chroma_a_stddev,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Feature functions
// ═══════════════════════════════════════════════════════════

/// Lab color moments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStatistics {
    pub brightness: f64,
    pub red_green_axis: f64,
    pub blue_yellow_axis: f64,
    pub color_variance: f64,
}

/// Variance of the 4-neighbour Laplacian over every pixel (reflect-101 borders).
///
/// Higher = more fine detail. A uniform image scores exactly zero.
pub fn compute_texture_energy(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }

    let at = |x: i64, y: i64| gray.get_pixel(reflect_101(x, w), reflect_101(y, h)).0[0] as f64;

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let laplacian = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y)
                - 4.0 * at(x, y);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
        }
    }

    let count = (w as u64 * h as u64) as f64;
    let mean = sum / count;
    ((sum_sq / count) - mean * mean).max(0.0)
}

pub fn compute_color_statistics(skin: &SkinImage) -> ColorStatistics {
    let [l, a, b] = lab_planes(skin.as_rgb());
    let (brightness, color_variance) = mean_and_std(l.pixels().map(|p| p.0[0]));
    let (red_green_axis, _) = mean_and_std(a.pixels().map(|p| p.0[0]));
    let (blue_yellow_axis, _) = mean_and_std(b.pixels().map(|p| p.0[0]));
    ColorStatistics {
        brightness,
        red_green_axis,
        blue_yellow_axis,
        color_variance,
    }
}

/// Fraction of pixels at least `IMPERFECTION_OFFSET` darker than their
/// Gaussian-weighted neighborhood.
pub fn compute_imperfection_ratio(gray: &GrayImage) -> f64 {
    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 0.0;
    }

    let local_mean = gaussian_blur(gray, IMPERFECTION_BLOCK_SIZE, IMPERFECTION_SIGMA);
    let flagged = gray
        .pixels()
        .zip(local_mean.pixels())
        .filter(|(g, m)| g.0[0] as i32 - m.0[0] as i32 <= -IMPERFECTION_OFFSET)
        .count();

    flagged as f64 / total as f64
}

/// Separable Gaussian blur with replicated borders, rounded back to 8 bits.
pub fn gaussian_blur(gray: &GrayImage, size: u32, sigma: f64) -> GrayImage {
    let (w, h) = gray.dimensions();
    let kernel = gaussian_kernel(size, sigma);
    let radius = (size / 2) as i64;
    let clamp = |v: i64, n: u32| v.clamp(0, n as i64 - 1) as u32;

    let mut horizontal = vec![0.0f64; w as usize * h as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = clamp(x as i64 + k as i64 - radius, w);
                acc += weight * gray.get_pixel(sx, y).0[0] as f64;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    let mut output = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = clamp(y as i64 + k as i64 - radius, h);
                acc += weight * horizontal[(sy * w + x) as usize];
            }
            output.put_pixel(x, y, Luma([acc.round().clamp(0.0, 255.0) as u8]));
        }
    }
    output
}

fn gaussian_kernel(size: u32, sigma: f64) -> Vec<f64> {
    let center = (size / 2) as f64;
    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

/// Linear-interpolated percentile of an 8-bit plane, `pct` in [0,100].
pub fn percentile(gray: &GrayImage, pct: f64) -> f64 {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let n: u64 = hist.iter().sum();
    if n == 0 {
        return 0.0;
    }

    let rank = pct.clamp(0.0, 100.0) / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as u64;
    let hi = rank.ceil() as u64;
    let frac = rank - lo as f64;

    let lo_value = nth_smallest(&hist, lo) as f64;
    let hi_value = nth_smallest(&hist, hi) as f64;
    lo_value + (hi_value - lo_value) * frac
}

fn nth_smallest(hist: &[u64; 256], n: u64) -> u8 {
    let mut seen = 0u64;
    for (value, &count) in hist.iter().enumerate() {
        seen += count;
        if seen > n {
            return value as u8;
        }
    }
    255
}

/// Population mean and standard deviation.
fn mean_and_std(values: impl Iterator<Item = u8>) -> (f64, f64) {
    let mut count = 0u64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for v in values {
        let v = v as f64;
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}
