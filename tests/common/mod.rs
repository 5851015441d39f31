#![allow(dead_code, unused_imports)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from chipcount for tests
pub use chipcount::{
    BoundingBox, ChipCounter, ChipCounterConfig, ChipError, DetectedRegion, DetectionResult,
    PrecomputedBackend, RawDetection, Stack,
};
