pub mod preprocessing;
pub mod circles;
pub mod regions;
#[cfg(feature = "model")]
pub mod segmentation;

use image::RgbImage;

use crate::models::RawDetection;

pub use circles::HoughCircleBackend;
pub use regions::extract_regions;
#[cfg(feature = "model")]
pub use segmentation::{YoloSegBackend, YoloSegConfig};

/// Produces `(box, mask, confidence)` instances for an image.
///
/// Returning an empty list is a normal outcome, not an error. Errors are
/// reserved for the backend itself being unusable and are passed to the
/// caller unchanged.
pub trait SegmentationBackend: Send + Sync {
    fn infer(&self, image: &RgbImage, confidence_threshold: f32) -> anyhow::Result<Vec<RawDetection>>;

    /// Human-readable name for this backend (used in log output)
    fn name(&self) -> &str;
}

/// Replays a fixed set of detections computed elsewhere.
///
/// With no detections this is the "no model configured" primary backend:
/// it always yields nothing, so the circle fallback takes over.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedBackend {
    detections: Vec<RawDetection>,
}

impl PrecomputedBackend {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl SegmentationBackend for PrecomputedBackend {
    fn infer(&self, _image: &RgbImage, confidence_threshold: f32) -> anyhow::Result<Vec<RawDetection>> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "Precomputed Detections"
    }
}
