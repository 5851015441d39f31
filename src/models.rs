use std::collections::BTreeMap;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};

/// Per-pixel mask probabilities at whatever resolution the backend produced
pub type RawMask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Axis-aligned box in image pixels, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncate float corners to pixels and clip them to a `width` x `height` image
    pub fn from_corners_clipped(corners: [f32; 4], width: u32, height: u32) -> Self {
        let clip = |value: f32, limit: u32| (value.max(0.0) as u32).min(limit);
        Self {
            x1: clip(corners[0], width),
            y1: clip(corners[1], height),
            x2: clip(corners[2], width),
            y2: clip(corners[3], height),
        }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }

    /// Separating-axis test; boxes that only touch count as overlapping
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        !(self.x2 < other.x1 || other.x2 < self.x1 || self.y2 < other.y1 || other.y2 < self.y1)
    }

    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }
}

/// One instance as reported by a segmentation backend.
#[derive(Debug, Clone)]
pub struct RawDetection {
    /// `[x1, y1, x2, y2]` in image pixels, not yet clipped
    pub corners: [f32; 4],

    /// Instance mask. Without `mask_origin` it covers the whole image, possibly
    /// at a different resolution.
    pub mask: RawMask,

    /// Image pixel of the mask's top-left corner for masks drawn at native
    /// resolution over part of the image only
    pub mask_origin: Option<(u32, u32)>,

    pub confidence: f32,
}

/// A detected chip instance cropped out of the image.
#[derive(Debug, Clone)]
pub struct DetectedRegion {
    pub bbox: BoundingBox,

    /// Binary mask cropped to `bbox` (255 = chip pixel)
    pub mask: GrayImage,

    /// Color pixels cropped to `bbox`
    pub region: RgbImage,

    pub confidence: f32,
}

impl DetectedRegion {
    pub fn foreground_pixels(&self) -> usize {
        self.mask.pixels().filter(|p| p[0] > 0).count()
    }
}

/// Regions judged to be one physical pile of chips. Never empty.
#[derive(Debug, Clone)]
pub struct Stack {
    regions: Vec<DetectedRegion>,
}

#[allow(clippy::len_without_is_empty)]
impl Stack {
    pub fn new(seed: DetectedRegion) -> Self {
        Self {
            regions: vec![seed],
        }
    }

    pub fn push(&mut self, region: DetectedRegion) {
        self.regions.push(region);
    }

    /// The seed region; the only one used for color classification
    pub fn first(&self) -> &DetectedRegion {
        &self.regions[0]
    }

    pub fn regions(&self) -> &[DetectedRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Union of all member boxes
    pub fn bounding_box(&self) -> BoundingBox {
        self.regions[1..]
            .iter()
            .fold(self.first().bbox, |acc, region| acc.union(&region.bbox))
    }

    /// Logical OR of the member masks over [`Stack::bounding_box`]
    pub fn combined_mask(&self) -> GrayImage {
        let union = self.bounding_box();
        let mut combined = GrayImage::new(union.width(), union.height());
        for region in &self.regions {
            let dx = region.bbox.x1 - union.x1;
            let dy = region.bbox.y1 - union.y1;
            for (x, y, pixel) in region.mask.enumerate_pixels() {
                if pixel[0] > 0 {
                    combined.put_pixel(x + dx, y + dy, Luma([255]));
                }
            }
        }
        combined
    }
}

/// Outcome of counting and classifying one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackReport {
    pub bounding_box: BoundingBox,
    pub regions: usize,
    pub count: u32,
    pub color: String,
    pub denomination: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMeta {
    pub model: String,
    pub confidence: f64,
    pub notes: String,
}

/// Monetary total for one image.
///
/// `total_cents` always equals the sum over `breakdown` of count times the
/// denomination encoded in the key (`denom_<cents>`; `color_<name>` is worth 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub total_cents: u64,
    pub breakdown: BTreeMap<String, u64>,
    pub meta: ResultMeta,
}

impl DetectionResult {
    /// The well-formed result for an image where neither backend found a chip
    pub fn no_detections(model: impl Into<String>) -> Self {
        Self {
            total_cents: 0,
            breakdown: BTreeMap::new(),
            meta: ResultMeta {
                model: model.into(),
                confidence: 0.0,
                notes: "no detections".to_string(),
            },
        }
    }

    pub fn chip_count(&self) -> u64 {
        self.breakdown.values().sum()
    }
}
