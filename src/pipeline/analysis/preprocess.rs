//! Canonicalization of raw decoded images.
//!
//! Pipeline flow (order-significant):
//! 1. Channel normalization (gray -> RGB, RGBA -> RGB)
//! 2. Resize to the canonical dimensions of the consumer
//! 3. Edge-preserving denoise (bilateral, fixed strength)
//! 4. Contrast enhancement: CLAHE on Lab lightness only
//!
//! Pure image-to-image transforms: no I/O, no randomness. Identical input
//! bytes always produce identical output bytes.

use std::borrow::Cow;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{GrayImage, Luma, Rgb, RgbImage};

use super::color::{lab_planes, merge_lab_planes};
use super::observer::{AnalysisObserver, Stage, TracingObserver};
use super::types::{CanonicalSize, ModelInput, ProcessedImage, RawImage};
use super::AnalysisError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Bilateral filter spatial radius (pixels).
const BILATERAL_RADIUS: u32 = 3;

/// Bilateral filter spatial sigma (pixels).
const BILATERAL_SPATIAL_SIGMA: f32 = 3.0;

/// Bilateral filter range sigma. Denoise strength; callers do not tune it.
const BILATERAL_RANGE_SIGMA: f32 = 10.0;

/// CLAHE tile grid, per axis.
const CLAHE_TILE_GRID: u32 = 8;

/// CLAHE clip limit, as a multiple of the mean histogram bin height.
const CLAHE_CLIP_LIMIT: f32 = 3.0;

/// Sharpening kernel for `enhance_quality`.
const SHARPEN_KERNEL: [[f32; 3]; 3] = [[-1.0, -1.0, -1.0], [-1.0, 9.0, -1.0], [-1.0, -1.0, -1.0]];

// ═══════════════════════════════════════════════════════════
// Service trait
// ═══════════════════════════════════════════════════════════

/// Turns a caller-supplied raw image into a canonical `ProcessedImage`.
pub trait ImagePreprocessor: Send + Sync {
    /// Fails with `UnreadableImage` on zero-sized or truncated buffers and
    /// `UnsupportedChannelLayout` when channels are not 1, 3 or 4.
    fn preprocess(
        &self,
        image: &RawImage,
        size: CanonicalSize,
    ) -> Result<ProcessedImage, AnalysisError>;
}

// ═══════════════════════════════════════════════════════════
// Production implementation
// ═══════════════════════════════════════════════════════════

/// Channel normalization, resize, bilateral denoise and Lab CLAHE.
pub struct CanonicalPreprocessor {
    observer: Arc<dyn AnalysisObserver>,
}

impl Default for CanonicalPreprocessor {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl CanonicalPreprocessor {
    pub fn new(observer: Arc<dyn AnalysisObserver>) -> Self {
        Self { observer }
    }

    /// Sharpen then re-equalize lightness. Dimensions are preserved.
    pub fn enhance_quality(&self, image: &ProcessedImage) -> ProcessedImage {
        let sharpened = apply_sharpen(image.as_rgb());
        let enhanced = enhance_lightness_contrast(&sharpened);
        self.observer.stage_completed(
            Stage::Preprocess,
            &[
                ("enhanced_width", enhanced.width() as f64),
                ("enhanced_height", enhanced.height() as f64),
            ],
        );
        ProcessedImage::new(enhanced)
    }

    /// Analysis-size preprocessing, rescaled to [0,1] floats.
    pub fn to_model_input(&self, image: &RawImage) -> Result<ModelInput, AnalysisError> {
        let processed = self.preprocess(image, CanonicalSize::Analysis)?;
        Ok(ModelInput::from(&processed))
    }
}

impl ImagePreprocessor for CanonicalPreprocessor {
    fn preprocess(
        &self,
        image: &RawImage,
        size: CanonicalSize,
    ) -> Result<ProcessedImage, AnalysisError> {
        // 1. Channel normalization
        let rgb = normalize_channels(image)?;

        // 2. Resize
        let resized = resize_to_canonical(&rgb, size);

        // 3. Denoise
        let denoised = apply_bilateral_filter(
            &resized,
            BILATERAL_RADIUS,
            BILATERAL_SPATIAL_SIGMA,
            BILATERAL_RANGE_SIGMA,
        );

        // 4. Contrast enhancement
        let enhanced = enhance_lightness_contrast(&denoised);

        self.observer.stage_completed(
            Stage::Preprocess,
            &[
                ("source_width", image.width() as f64),
                ("source_height", image.height() as f64),
                ("source_channels", image.channels() as f64),
                ("width", enhanced.width() as f64),
                ("height", enhanced.height() as f64),
            ],
        );

        Ok(ProcessedImage::new(enhanced))
    }
}

// ═══════════════════════════════════════════════════════════
// Transforms (reusable)
// ═══════════════════════════════════════════════════════════

/// Validate the raw buffer and expand or strip channels to RGB.
pub fn normalize_channels(image: &RawImage) -> Result<RgbImage, AnalysisError> {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
        return Err(AnalysisError::UnreadableImage(format!(
            "image has zero dimensions ({w}x{h})"
        )));
    }

    let channels = image.channels();
    if !matches!(channels, 1 | 3 | 4) {
        return Err(AnalysisError::UnsupportedChannelLayout(channels));
    }

    let expected = (w as usize)
        .checked_mul(h as usize)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| {
            AnalysisError::UnreadableImage(format!(
                "declared size {w}x{h}x{channels} does not fit in memory"
            ))
        })?;
    if image.data().len() != expected {
        return Err(AnalysisError::UnreadableImage(format!(
            "buffer holds {} bytes, expected {expected} for {w}x{h}x{channels}",
            image.data().len()
        )));
    }

    let data = image.data();
    let rgb = match channels {
        3 => data.to_vec(),
        1 => data.iter().flat_map(|&v| [v, v, v]).collect(),
        _ => data
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
    };

    RgbImage::from_raw(w, h, rgb).ok_or_else(|| {
        AnalysisError::UnreadableImage("pixel buffer does not match dimensions".into())
    })
}

/// Bilinear resize to the canonical dimensions. Borrowed when already there.
pub fn resize_to_canonical(img: &RgbImage, size: CanonicalSize) -> Cow<'_, RgbImage> {
    let (target_w, target_h) = size.dimensions();
    if img.dimensions() == (target_w, target_h) {
        return Cow::Borrowed(img);
    }
    Cow::Owned(image::imageops::resize(
        img,
        target_w,
        target_h,
        FilterType::Triangle,
    ))
}

/// Bilateral filter: Gaussian spatial falloff times Gaussian color similarity.
///
/// Smooths sensor noise while leaving sharp color boundaries intact, since
/// neighbors across an edge get a near-zero range weight.
pub fn apply_bilateral_filter(
    img: &RgbImage,
    radius: u32,
    spatial_sigma: f32,
    range_sigma: f32,
) -> RgbImage {
    let (w, h) = (img.width(), img.height());
    let mut output = RgbImage::new(w, h);
    let range_sigma_sq_2 = 2.0 * range_sigma * range_sigma;
    let spatial_sigma_sq_2 = 2.0 * spatial_sigma * spatial_sigma;

    let r = radius as i64;
    let side = (2 * radius + 1) as usize;
    let mut spatial = vec![0.0f32; side * side];
    for dy in -r..=r {
        for dx in -r..=r {
            let idx = ((dy + r) as usize) * side + (dx + r) as usize;
            spatial[idx] = (-((dx * dx + dy * dy) as f32) / spatial_sigma_sq_2).exp();
        }
    }

    for y in 0..h {
        for x in 0..w {
            let center = img.get_pixel(x, y);
            let [cr, cg, cb] = center.0.map(|v| v as f32);

            let mut sum = [0.0f32; 3];
            let mut weight_sum = 0.0f32;

            let y_start = y.saturating_sub(radius);
            let y_end = (y + radius + 1).min(h);
            let x_start = x.saturating_sub(radius);
            let x_end = (x + radius + 1).min(w);

            for ny in y_start..y_end {
                for nx in x_start..x_end {
                    let [nr, ng, nb] = img.get_pixel(nx, ny).0.map(|v| v as f32);
                    let color_dist_sq =
                        (nr - cr) * (nr - cr) + (ng - cg) * (ng - cg) + (nb - cb) * (nb - cb);
                    let sidx = ((ny as i64 - y as i64 + r) as usize) * side
                        + (nx as i64 - x as i64 + r) as usize;
                    let weight = spatial[sidx] * (-color_dist_sq / range_sigma_sq_2).exp();

                    sum[0] += nr * weight;
                    sum[1] += ng * weight;
                    sum[2] += nb * weight;
                    weight_sum += weight;
                }
            }

            let filtered = if weight_sum > 0.0 {
                Rgb(sum.map(|s| (s / weight_sum).round().clamp(0.0, 255.0) as u8))
            } else {
                *center
            };
            output.put_pixel(x, y, filtered);
        }
    }

    output
}

/// CLAHE on Lab L; a and b pass through untouched.
pub fn enhance_lightness_contrast(img: &RgbImage) -> RgbImage {
    let [l, a, b] = lab_planes(img);
    let equalized = apply_clahe(&l, CLAHE_TILE_GRID, CLAHE_CLIP_LIMIT);
    merge_lab_planes(&equalized, &a, &b)
}

/// Contrast-limited adaptive histogram equalization on one 8-bit plane.
///
/// The plane is split into a `grid` x `grid` tile layout. Each tile gets a
/// clipped, redistributed histogram and its own lookup table; output pixels
/// bilinearly blend the four nearest tile tables, so there are no seams.
pub fn apply_clahe(plane: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = (plane.width(), plane.height());
    if w == 0 || h == 0 || grid == 0 {
        return plane.clone();
    }

    let tile_w = (w + grid.min(w) - 1) / grid.min(w);
    let tile_h = (h + grid.min(h) - 1) / grid.min(h);
    let tiles_x = (w + tile_w - 1) / tile_w;
    let tiles_y = (h + tile_h - 1) / tile_h;

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(plane, x0, y0, x1, y1, clip_limit));
        }
    }

    let mut output = GrayImage::new(w, h);
    let max_tx = (tiles_x - 1) as i64;
    let max_ty = (tiles_y - 1) as i64;

    for y in 0..h {
        let tyf = y as f32 / tile_h as f32 - 0.5;
        let ty1 = tyf.floor() as i64;
        let ya = tyf - ty1 as f32;
        let ty0c = ty1.clamp(0, max_ty) as usize;
        let ty1c = (ty1 + 1).clamp(0, max_ty) as usize;

        for x in 0..w {
            let txf = x as f32 / tile_w as f32 - 0.5;
            let tx1 = txf.floor() as i64;
            let xa = txf - tx1 as f32;
            let tx0c = tx1.clamp(0, max_tx) as usize;
            let tx1c = (tx1 + 1).clamp(0, max_tx) as usize;

            let v = plane.get_pixel(x, y).0[0] as usize;
            let row = tiles_x as usize;
            let top = luts[ty0c * row + tx0c][v] as f32 * (1.0 - xa)
                + luts[ty0c * row + tx1c][v] as f32 * xa;
            let bottom = luts[ty1c * row + tx0c][v] as f32 * (1.0 - xa)
                + luts[ty1c * row + tx1c][v] as f32 * xa;
            let blended = top * (1.0 - ya) + bottom * ya;

            output.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }

    output
}

fn tile_lut(plane: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[plane.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);

    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }

        let redistribute = excess / 256;
        let mut residual = excess - redistribute * 256;
        for bin in hist.iter_mut() {
            *bin += redistribute;
        }
        if residual > 0 {
            let step = (256 / residual as usize).max(1);
            let mut i = 0usize;
            while i < 256 && residual > 0 {
                hist[i] += 1;
                residual -= 1;
                i += step;
            }
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (value, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[value] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// 3x3 sharpen with mirrored (reflect-101) borders.
pub fn apply_sharpen(img: &RgbImage) -> RgbImage {
    let (w, h) = (img.width(), img.height());
    let mut output = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
                let sy = reflect_101(y as i64 + ky as i64 - 1, h);
                for (kx, &k) in row.iter().enumerate() {
                    let sx = reflect_101(x as i64 + kx as i64 - 1, w);
                    let p = img.get_pixel(sx, sy).0;
                    for c in 0..3 {
                        acc[c] += k * p[c] as f32;
                    }
                }
            }
            output.put_pixel(x, y, Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8)));
        }
    }
    output
}

/// Mirror an out-of-range coordinate without repeating the edge pixel.
pub(crate) fn reflect_101(i: i64, n: u32) -> u32 {
    let n = n as i64;
    if n == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * (n - 1) - i;
        }
    }
    i as u32
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::observer::NoOpObserver;
    use crate::pipeline::analysis::observer::testing::RecordingObserver;

    fn preprocessor() -> CanonicalPreprocessor {
        CanonicalPreprocessor::new(Arc::new(NoOpObserver))
    }

    fn gray_std(img: &GrayImage) -> f64 {
        let n = (img.width() * img.height()) as f64;
        let mean = img.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
        let var = img
            .pixels()
            .map(|p| (p.0[0] as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        var.sqrt()
    }

    #[test]
    fn zero_dimensions_are_unreadable() {
        let raw = RawImage::new(0, 10, 3, vec![]);
        let err = preprocessor()
            .preprocess(&raw, CanonicalSize::Analysis)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnreadableImage(_)));
    }

    #[test]
    fn truncated_buffer_is_unreadable() {
        let raw = RawImage::new(4, 4, 3, vec![0; 10]);
        let err = preprocessor()
            .preprocess(&raw, CanonicalSize::Analysis)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnreadableImage(_)));
    }

    #[test]
    fn oversized_dimensions_are_unreadable() {
        let raw = RawImage::new(u32::MAX, u32::MAX, 4, vec![]);
        let err = preprocessor()
            .preprocess(&raw, CanonicalSize::Analysis)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnreadableImage(_)));
    }

    #[test]
    fn two_channel_layout_rejected() {
        let raw = RawImage::new(2, 2, 2, vec![0; 8]);
        let err = preprocessor()
            .preprocess(&raw, CanonicalSize::Analysis)
            .unwrap_err();
        assert_eq!(err, AnalysisError::UnsupportedChannelLayout(2));
    }

    #[test]
    fn gray_input_is_duplicated_to_rgb() {
        let raw = RawImage::new(2, 1, 1, vec![10, 200]);
        let rgb = normalize_channels(&raw).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 10, 10]);
        assert_eq!(rgb.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let raw = RawImage::new(1, 2, 4, vec![1, 2, 3, 0, 4, 5, 6, 255]);
        let rgb = normalize_channels(&raw).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(rgb.get_pixel(0, 1).0, [4, 5, 6]);
    }

    #[test]
    fn output_has_canonical_dimensions() {
        let raw = RawImage::filled(50, 30, &[120, 90, 80]);
        let pre = preprocessor();

        let analysis = pre.preprocess(&raw, CanonicalSize::Analysis).unwrap();
        assert_eq!((analysis.width(), analysis.height()), (224, 224));

        let capture = pre.preprocess(&raw, CanonicalSize::Capture).unwrap();
        assert_eq!((capture.width(), capture.height()), (640, 480));
    }

    #[test]
    fn resize_skipped_when_already_canonical() {
        let img = RgbImage::from_pixel(224, 224, Rgb([1, 2, 3]));
        assert!(matches!(
            resize_to_canonical(&img, CanonicalSize::Analysis),
            Cow::Borrowed(_)
        ));
        assert!(matches!(
            resize_to_canonical(&img, CanonicalSize::Capture),
            Cow::Owned(_)
        ));
    }

    #[test]
    fn preprocess_is_deterministic() {
        let mut data = Vec::new();
        for i in 0..(37 * 23) {
            let v = (i * 7 % 251) as u8;
            data.extend_from_slice(&[v, v.wrapping_mul(3), 255 - v]);
        }
        let raw = RawImage::new(37, 23, 3, data);
        let pre = preprocessor();
        let first = pre.preprocess(&raw, CanonicalSize::Analysis).unwrap();
        let second = pre.preprocess(&raw, CanonicalSize::Analysis).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn uniform_input_stays_uniform() {
        let raw = RawImage::filled(224, 224, &[220, 160, 130]);
        let out = preprocessor()
            .preprocess(&raw, CanonicalSize::Analysis)
            .unwrap();
        let first = *out.as_rgb().get_pixel(0, 0);
        assert!(out.as_rgb().pixels().all(|p| *p == first));
    }

    #[test]
    fn bilateral_keeps_hard_edges() {
        let mut img = RgbImage::new(20, 20);
        for (x, _, p) in img.enumerate_pixels_mut() {
            *p = if x < 10 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) };
        }
        let out = apply_bilateral_filter(&img, 3, 3.0, 10.0);
        assert_eq!(out.get_pixel(9, 10).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(10, 10).0, [255, 255, 255]);
    }

    #[test]
    fn bilateral_smooths_small_noise() {
        let mut img = RgbImage::new(20, 20);
        for (x, y, p) in img.enumerate_pixels_mut() {
            let v = if (x + y) % 2 == 0 { 100 } else { 106 };
            *p = Rgb([v, v, v]);
        }
        let out = apply_bilateral_filter(&img, 3, 3.0, 10.0);
        let before = gray_std(&crate::pipeline::analysis::color::rgb_to_gray(&img));
        let after = gray_std(&crate::pipeline::analysis::color::rgb_to_gray(&out));
        assert!(after < before / 2.0, "std {before} -> {after}");
    }

    #[test]
    fn clahe_uniform_plane_stays_uniform() {
        let plane = GrayImage::from_pixel(64, 48, Luma([90]));
        let out = apply_clahe(&plane, 8, 3.0);
        let first = out.get_pixel(0, 0).0[0];
        assert!(out.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn clahe_stretches_low_contrast_gradient() {
        let mut plane = GrayImage::new(224, 224);
        for (x, _, p) in plane.enumerate_pixels_mut() {
            *p = Luma([100 + (x / 7) as u8]);
        }
        let out = apply_clahe(&plane, 8, 3.0);
        assert_eq!(out.dimensions(), plane.dimensions());
        assert!(gray_std(&out) > gray_std(&plane));
    }

    #[test]
    fn clahe_tile_centers_use_their_own_table() {
        // Two 8x4 tiles per row: dark left half, bright right half
        let mut plane = GrayImage::new(16, 8);
        for (x, _, p) in plane.enumerate_pixels_mut() {
            *p = Luma([if x < 8 { 50 } else { 200 }]);
        }
        let out = apply_clahe(&plane, 2, 3.0);

        let dark = apply_clahe(&GrayImage::from_pixel(8, 4, Luma([50])), 1, 3.0);
        let bright = apply_clahe(&GrayImage::from_pixel(8, 4, Luma([200])), 1, 3.0);
        // Pixel (tile_w / 2, tile_h / 2) sits exactly on the tile's grid node
        assert_eq!(out.get_pixel(4, 2).0[0], dark.get_pixel(0, 0).0[0]);
        assert_eq!(out.get_pixel(12, 6).0[0], bright.get_pixel(0, 0).0[0]);
    }

    #[test]
    fn clahe_handles_planes_smaller_than_grid() {
        let plane = GrayImage::from_pixel(3, 5, Luma([40]));
        let out = apply_clahe(&plane, 8, 3.0);
        assert_eq!(out.dimensions(), (3, 5));
    }

    #[test]
    fn sharpen_leaves_flat_regions_alone() {
        let img = RgbImage::from_pixel(8, 8, Rgb([50, 60, 70]));
        assert_eq!(apply_sharpen(&img), img);
    }

    #[test]
    fn enhance_quality_preserves_dimensions() {
        let raw = RawImage::filled(30, 30, &[200, 150, 120]);
        let pre = preprocessor();
        let processed = pre.preprocess(&raw, CanonicalSize::Analysis).unwrap();
        let enhanced = pre.enhance_quality(&processed);
        assert_eq!(enhanced.width(), 224);
        assert_eq!(enhanced.height(), 224);
    }

    #[test]
    fn model_input_is_normalized() {
        let raw = RawImage::filled(10, 10, &[255]);
        let input = preprocessor().to_model_input(&raw).unwrap();
        assert_eq!(input.data.len(), 224 * 224 * 3);
        assert!(input.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn reflect_101_mirrors_without_edge_repeat() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(0, 1), 0);
    }

    #[test]
    fn preprocess_reports_to_observer() {
        let observer = Arc::new(RecordingObserver::default());
        let pre = CanonicalPreprocessor::new(observer.clone());
        pre.preprocess(&RawImage::filled(4, 4, &[1, 2, 3]), CanonicalSize::Analysis)
            .unwrap();
        assert_eq!(observer.stages(), vec![Stage::Preprocess]);
    }
}
