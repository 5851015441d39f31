use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::edges::canny;
use imageproc::filter::separable_filter_equal;

use crate::config::Hsv;

/// Convert image to grayscale with BT.601 luma weights
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0.map(f32::from);
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Gaussian blur with an explicit odd `kernel_size` x `kernel_size` window
pub fn apply_blur(img: &GrayImage, kernel_size: u32, sigma: f32) -> GrayImage {
    let kernel = gaussian_kernel(kernel_size, sigma);
    separable_filter_equal(img, &kernel)
}

/// Normalised 1-D Gaussian taps; even sizes are bumped to the next odd size
pub fn gaussian_kernel(kernel_size: u32, sigma: f32) -> Vec<f32> {
    let size = kernel_size.max(1) | 1;
    let half = (size / 2) as i32;
    let sigma = if sigma > 0.0 { sigma } else { 1.0 };
    let mut taps: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = taps.iter().sum();
    for tap in &mut taps {
        *tap /= sum;
    }
    taps
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// RGB to 8-bit HSV: hue halved into [0, 180), saturation and value in [0, 255]
pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> Hsv {
    let [r, g, b] = pixel.0.map(f64::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
    let hue_deg = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let hue_deg = if hue_deg < 0.0 { hue_deg + 360.0 } else { hue_deg };

    Hsv::new((hue_deg / 2.0).round() % 180.0, s.round(), max)
}
