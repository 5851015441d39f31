//! # chipcount
//!
//! Turns a photograph of poker-chip stacks into a monetary total.
//!
//! Per-instance segmentation output is grouped into physical stacks, each
//! stack's chip count is estimated from the seams between chips, its
//! denomination is read from its color, and everything is summed into a
//! [`DetectionResult`].
//!
//! ```rust,no_run
//! use chipcount::{ChipCounter, ChipCounterConfig};
//! use std::path::Path;
//!
//! let counter = ChipCounter::without_model(ChipCounterConfig::default());
//! let result = counter.detect_chips(Path::new("table.jpg"))?;
//! println!("{} cents: {:?}", result.total_cents, result.breakdown);
//! # Ok::<(), chipcount::ChipError>(())
//! ```

pub mod aggregate;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod stacks;

pub use config::{ChipCounterConfig, ColorProfile, DenominationConfig, Hsv, HsvRange};
pub use detection::{HoughCircleBackend, PrecomputedBackend, SegmentationBackend};
#[cfg(feature = "model")]
pub use detection::{YoloSegBackend, YoloSegConfig};
pub use error::{ChipError, Result};
pub use models::{BoundingBox, DetectedRegion, DetectionResult, RawDetection, RawMask, ResultMeta, Stack, StackReport};
pub use pipeline::{Analysis, ChipCounter, DetectionPath, FALLBACK_MODEL_LABEL, PRIMARY_MODEL_LABEL};
