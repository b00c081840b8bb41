//! Color space conversions on 8-bit pixels.
//!
//! Encodings follow the usual 8-bit conventions so that thresholds stay
//! portable across tooling:
//! - HSV: H in [0,180) (degrees / 2), S and V in [0,255].
//! - Lab: L scaled by 255/100, a and b offset by 128.
//! - Gray: ITU-R BT.601 luma, rounded.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// D65 reference white, X and Z components (Y = 1).
const WHITE_X: f32 = 0.950_456;
const WHITE_Z: f32 = 1.088_754;

/// CIE threshold between the cube-root and linear branches.
const LAB_EPSILON: f32 = 0.008_856;
const LAB_KAPPA: f32 = 903.3;

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for (x, y, p) in rgb.enumerate_pixels() {
        gray.put_pixel(x, y, Luma([gray_value(p.0)]));
    }
    gray
}

pub fn gray_value([r, g, b]: [u8; 3]) -> u8 {
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    luma.round().clamp(0.0, 255.0) as u8
}

/// 8-bit HSV for one pixel.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = (v - min) as f32;

    let s = if v == 0 {
        0.0
    } else {
        diff * 255.0 / v as f32
    };

    let h = if diff == 0.0 {
        0.0
    } else {
        let deg = if v == r {
            60.0 * (gf - bf) / diff
        } else if v == g {
            120.0 + 60.0 * (bf - rf) / diff
        } else {
            240.0 + 60.0 * (rf - gf) / diff
        };
        if deg < 0.0 {
            deg + 360.0
        } else {
            deg
        }
    };

    let h8 = ((h / 2.0).round() as u32 % 180) as u8;
    [h8, s.round().clamp(0.0, 255.0) as u8, v]
}

/// 8-bit Lab for one sRGB pixel.
pub fn rgb_to_lab([r, g, b]: [u8; 3]) -> [u8; 3] {
    let rl = srgb_to_linear(r);
    let gl = srgb_to_linear(g);
    let bl = srgb_to_linear(b);

    let x = (0.412_453 * rl + 0.357_580 * gl + 0.180_423 * bl) / WHITE_X;
    let y = 0.212_671 * rl + 0.715_160 * gl + 0.072_169 * bl;
    let z = (0.019_334 * rl + 0.119_193 * gl + 0.950_227 * bl) / WHITE_Z;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    let l = if y > LAB_EPSILON {
        116.0 * y.cbrt() - 16.0
    } else {
        LAB_KAPPA * y
    };
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);

    [
        to_u8(l * 255.0 / 100.0),
        to_u8(a + 128.0),
        to_u8(b + 128.0),
    ]
}

/// Inverse of [`rgb_to_lab`]. Out-of-gamut colors are clipped.
pub fn lab_to_rgb([l8, a8, b8]: [u8; 3]) -> [u8; 3] {
    let l = l8 as f32 * 100.0 / 255.0;
    let a = a8 as f32 - 128.0;
    let b = b8 as f32 - 128.0;

    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let y = if l > LAB_KAPPA * LAB_EPSILON {
        fy * fy * fy
    } else {
        l / LAB_KAPPA
    };
    let x = lab_f_inv(fx) * WHITE_X;
    let z = lab_f_inv(fz) * WHITE_Z;

    let rl = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let gl = -0.969_256 * x + 1.875_991 * y + 0.041_556 * z;
    let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

    [linear_to_srgb(rl), linear_to_srgb(gl), linear_to_srgb(bl)]
}

/// Split an RGB image into 8-bit Lab planes.
pub fn lab_planes(rgb: &RgbImage) -> [GrayImage; 3] {
    let (w, h) = (rgb.width(), rgb.height());
    let mut planes = [GrayImage::new(w, h), GrayImage::new(w, h), GrayImage::new(w, h)];
    for (x, y, p) in rgb.enumerate_pixels() {
        let lab = rgb_to_lab(p.0);
        for (plane, value) in planes.iter_mut().zip(lab) {
            plane.put_pixel(x, y, Luma([value]));
        }
    }
    planes
}

/// Recombine 8-bit Lab planes into RGB. Planes must share dimensions.
pub fn merge_lab_planes(l: &GrayImage, a: &GrayImage, b: &GrayImage) -> RgbImage {
    let (w, h) = (l.width(), l.height());
    let mut rgb = RgbImage::new(w, h);
    for (x, y, p) in rgb.enumerate_pixels_mut() {
        let lab = [
            l.get_pixel(x, y).0[0],
            a.get_pixel(x, y).0[0],
            b.get_pixel(x, y).0[0],
        ];
        *p = Rgb(lab_to_rgb(lab));
    }
    rgb
}

fn srgb_to_linear(v: u8) -> f32 {
    let c = v as f32 / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let v = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    to_u8(v * 255.0)
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > LAB_EPSILON {
        cube
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
