//! Circular Hough transform and the classical fallback backend built on it.
//!
//! Centers are found by gradient voting: every edge pixel votes along its
//! gradient direction (both ways) at each distance in the radius band, so
//! the edges of a disc converge on its center. Accepted centers then pick the
//! radius with the most edge support.

use image::{GrayImage, Luma, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use crate::config::FallbackConfig;
use crate::detection::{preprocessing, SegmentationBackend};
use crate::models::{BoundingBox, RawDetection, RawMask};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub votes: u32,
}

/// Parameters of [`hough_circles`].
#[derive(Debug, Clone)]
pub struct HoughParams {
    pub min_dist: f32,
    pub canny_high: f32,
    pub accumulator_threshold: u32,
    pub min_radius: u32,
    pub max_radius: u32,
}

impl From<&FallbackConfig> for HoughParams {
    fn from(config: &FallbackConfig) -> Self {
        Self {
            min_dist: config.min_dist,
            canny_high: config.canny_threshold,
            accumulator_threshold: config.accumulator_threshold,
            min_radius: config.min_radius,
            max_radius: config.max_radius,
        }
    }
}

/// Find circles in a (pre-blurred) grayscale image, strongest first
pub fn hough_circles(gray: &GrayImage, params: &HoughParams) -> Vec<Circle> {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 || params.max_radius < params.min_radius {
        return Vec::new();
    }

    let edges = preprocessing::detect_edges(gray, params.canny_high / 2.0, params.canny_high);
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);

    let stride = w as usize;
    let mut accum = vec![0u32; stride * h as usize];
    let mut edge_points = Vec::new();
    let min_r = params.min_radius.max(1) as f32;
    let max_r = params.max_radius as f32;

    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        let dx = gx.get_pixel(x, y)[0] as f32;
        let dy = gy.get_pixel(x, y)[0] as f32;
        let mag = (dx * dx + dy * dy).sqrt();
        if mag < 1e-3 {
            continue;
        }
        edge_points.push((x as f32, y as f32));

        let (ux, uy) = (dx / mag, dy / mag);
        for sign in [1.0f32, -1.0] {
            let mut r = min_r;
            while r <= max_r {
                let cx = (x as f32 + sign * ux * r).round();
                let cy = (y as f32 + sign * uy * r).round();
                if cx < 0.0 || cy < 0.0 || cx >= w as f32 || cy >= h as f32 {
                    break;
                }
                accum[cy as usize * stride + cx as usize] += 1;
                r += 1.0;
            }
        }
    }

    // Local maxima above the vote threshold
    let mut centers = Vec::new();
    for y in 1..h as usize - 1 {
        for x in 1..stride - 1 {
            let idx = y * stride + x;
            let votes = accum[idx];
            if votes > params.accumulator_threshold
                && votes > accum[idx - 1]
                && votes >= accum[idx + 1]
                && votes > accum[idx - stride]
                && votes >= accum[idx + stride]
            {
                centers.push((x, y, votes));
            }
        }
    }
    centers.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)).then(a.0.cmp(&b.0)));

    let min_dist_sq = params.min_dist * params.min_dist;
    let mut circles: Vec<Circle> = Vec::new();
    for (cx, cy, votes) in centers {
        let (cx, cy) = (cx as f32, cy as f32);
        let too_close = circles
            .iter()
            .any(|c| (c.x - cx).powi(2) + (c.y - cy).powi(2) < min_dist_sq);
        if too_close {
            continue;
        }
        if let Some(radius) = estimate_radius(&edge_points, cx, cy, min_r, max_r, params.accumulator_threshold) {
            circles.push(Circle {
                x: cx,
                y: cy,
                radius,
                votes,
            });
        }
    }

    circles
}

/// Radius with the most edge points at that distance from the center
fn estimate_radius(
    edge_points: &[(f32, f32)],
    cx: f32,
    cy: f32,
    min_r: f32,
    max_r: f32,
    min_support: u32,
) -> Option<f32> {
    let bins = (max_r - min_r).floor() as usize + 1;
    let mut histogram = vec![0u32; bins];
    for &(x, y) in edge_points {
        let dist = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
        if dist < min_r - 0.5 || dist > max_r + 0.5 {
            continue;
        }
        let bin = (dist - min_r).round().clamp(0.0, (bins - 1) as f32) as usize;
        histogram[bin] += 1;
    }

    // Accept a one-pixel blur of the ring: score each radius with its neighbours
    let (best_bin, best_support) = (0..bins)
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(bins - 1);
            (i, histogram[lo..=hi].iter().sum::<u32>())
        })
        .fold((0, 0), |best, cur| if cur.1 > best.1 { cur } else { best });

    (best_support >= min_support).then(|| min_r + best_bin as f32)
}

/// Fallback backend: blur, circular Hough transform, one filled-disc
/// instance per circle with a fixed confidence.
#[derive(Debug, Clone, Default)]
pub struct HoughCircleBackend {
    config: FallbackConfig,
}

impl HoughCircleBackend {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    pub fn detect_circles(&self, image: &RgbImage) -> Vec<Circle> {
        let gray = preprocessing::to_grayscale(image);
        let blurred = preprocessing::apply_blur(&gray, self.config.blur_kernel_size, self.config.blur_sigma);
        hough_circles(&blurred, &HoughParams::from(&self.config))
    }
}

impl SegmentationBackend for HoughCircleBackend {
    fn infer(&self, image: &RgbImage, _confidence_threshold: f32) -> anyhow::Result<Vec<RawDetection>> {
        let (w, h) = image.dimensions();
        let detections = self
            .detect_circles(image)
            .into_iter()
            .map(|circle| disc_detection(&circle, w, h, self.config.confidence))
            .collect();
        Ok(detections)
    }

    fn name(&self) -> &str {
        "Hough Circles"
    }
}

/// Filled-disc instance for `circle`, with a mask only as large as the
/// circle's box clipped to the image
pub fn disc_detection(circle: &Circle, width: u32, height: u32, confidence: f32) -> RawDetection {
    let (x, y, r) = (circle.x.round(), circle.y.round(), circle.radius.round());
    let corners = [x - r, y - r, x + r, y + r];
    let bbox = BoundingBox::from_corners_clipped(corners, width, height);

    let mut mask = RawMask::new(bbox.width(), bbox.height());
    if bbox.area() > 0 {
        let center = (x as i32 - bbox.x1 as i32, y as i32 - bbox.y1 as i32);
        draw_filled_circle_mut(&mut mask, center, r as i32, Luma([1.0f32]));
    }

    RawDetection {
        corners,
        mask,
        mask_origin: Some((bbox.x1, bbox.y1)),
        confidence,
    }
}
