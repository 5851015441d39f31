//! Chip counting from the horizontal seams between stacked chips.
//!
//! A seam is a strong vertical intensity change, so the stack is run through
//! a vertical Sobel filter and the absolute response is summed per row. Rows
//! well above the background level are seam rows.

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::gradients::vertical_sobel;

use crate::config::SeamConfig;
use crate::detection::preprocessing;
use crate::models::Stack;

/// Estimate how many chips make up `stack`, always within
/// `[config.min_chips, config.max_chips]`
pub fn count_chips(stack: &Stack, image: &RgbImage, config: &SeamConfig) -> u32 {
    let bbox = stack.bounding_box();
    if bbox.area() == 0 {
        return stack.len() as u32;
    }

    let masked = masked_stack_gray(stack, image);
    let profile = edge_projection(&masked);
    let peak_rows = count_peak_rows(&profile, config.peak_threshold_ratio);
    estimate_from_peaks(peak_rows, bbox.height(), config)
}

/// Grayscale crop of the stack's union box with non-chip pixels zeroed
pub fn masked_stack_gray(stack: &Stack, image: &RgbImage) -> GrayImage {
    let bbox = stack.bounding_box();
    let crop = imageops::crop_imm(image, bbox.x1, bbox.y1, bbox.width(), bbox.height()).to_image();
    let mut gray = preprocessing::to_grayscale(&crop);
    let mask = stack.combined_mask();
    for (x, y, pixel) in gray.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] == 0 {
            *pixel = Luma([0]);
        }
    }
    gray
}

/// Sum of absolute vertical gradient per row
pub fn edge_projection(gray: &GrayImage) -> Vec<f64> {
    let gradient = vertical_sobel(gray);
    gradient
        .rows()
        .map(|row| row.map(|p| (p[0] as f64).abs()).sum())
        .collect()
}

/// Rows strictly above `ratio * max`; zero when the profile is flat zero
pub fn count_peak_rows(profile: &[f64], ratio: f64) -> u32 {
    let max = profile.iter().copied().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return 0;
    }
    let threshold = max * ratio;
    profile.iter().filter(|&&v| v > threshold).count() as u32
}

/// Chip estimate from seam rows, or from the stack height when no seams were seen
pub fn estimate_from_peaks(peak_rows: u32, stack_height_px: u32, config: &SeamConfig) -> u32 {
    let estimate = if peak_rows > 0 {
        ((peak_rows as f64 * config.peak_scale).floor() as u32 + config.peak_offset).max(1)
    } else {
        let thickness = config.chip_thickness_px.max(1.0);
        ((stack_height_px as f64 / thickness).floor() as u32).max(1)
    };
    estimate.clamp(config.min_chips, config.max_chips.max(config.min_chips))
}
