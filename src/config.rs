//! Configuration for the chip counting pipeline.
//!
//! Every tunable number the pipeline uses lives here, grouped by the stage
//! that reads it. The whole tree is `serde` (de)serialisable and every field
//! falls back to its default, so a JSON file only needs the values it wants
//! to change:
//!
//! ```no_run
//! use chipcount::ChipCounterConfig;
//! use std::path::Path;
//!
//! let config = ChipCounterConfig::from_json_file(Path::new("chips.json"))?;
//! assert!(config.seams.max_chips >= config.seams.min_chips);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipCounterConfig {
    /// Minimum detection confidence passed to the segmentation backend
    pub confidence_threshold: f32,

    /// Binarisation threshold applied to resized instance masks
    pub mask_threshold: f32,

    /// Cents per chip, keyed by color name
    pub denominations: DenominationConfig,

    /// Ordered HSV profiles; earlier profiles win ties
    pub color_profiles: Vec<ColorProfile>,

    pub stacking: StackingConfig,
    pub seams: SeamConfig,
    pub color_scoring: ColorScoring,
    pub fallback: FallbackConfig,
}

impl Default for ChipCounterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            mask_threshold: 0.5,
            denominations: DenominationConfig::default(),
            color_profiles: default_color_profiles(),
            stacking: StackingConfig::default(),
            seams: SeamConfig::default(),
            color_scoring: ColorScoring::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

impl ChipCounterConfig {
    /// Load a (possibly partial) configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

/// Mapping from color name to chip value in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DenominationConfig(BTreeMap<String, u64>);

impl DenominationConfig {
    pub fn new(values: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self(values.into_iter().collect())
    }

    /// Cents per chip for `color`, 0 when the color carries no value
    pub fn value_of(&self, color: &str) -> u64 {
        self.0.get(color).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(name, cents)| (name.as_str(), *cents))
    }
}

impl Default for DenominationConfig {
    fn default() -> Self {
        Self::new([
            ("red".to_string(), 500),
            ("blue".to_string(), 1000),
            ("green".to_string(), 2500),
            ("black".to_string(), 5000),
        ])
    }
}

/// One OpenCV-style HSV point: `h` in [0, 180), `s` and `v` in [0, 255].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsv {
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

impl Hsv {
    pub const fn new(h: f64, s: f64, v: f64) -> Self {
        Self { h, s, v }
    }
}

/// Inclusive HSV box. `lower.h > upper.h` wraps around the hue circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl HsvRange {
    pub const fn new(lower: Hsv, upper: Hsv) -> Self {
        Self { lower, upper }
    }

    pub fn wraps(&self) -> bool {
        self.lower.h > self.upper.h
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        let (lo, hi) = (self.lower, self.upper);
        let hue_in = (lo.h <= hsv.h && hsv.h <= hi.h) || (self.wraps() && (hsv.h >= lo.h || hsv.h <= hi.h));
        hue_in && lo.s <= hsv.s && hsv.s <= hi.s && lo.v <= hsv.v && hsv.v <= hi.v
    }
}

/// HSV ranges that identify one chip color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorProfile {
    pub name: String,
    pub ranges: Vec<HsvRange>,
}

impl ColorProfile {
    pub fn new(name: impl Into<String>, ranges: Vec<HsvRange>) -> Self {
        Self {
            name: name.into(),
            ranges,
        }
    }
}

/// Default profiles for red (both ends of the hue wheel), blue, green and black
pub fn default_color_profiles() -> Vec<ColorProfile> {
    vec![
        ColorProfile::new(
            "red",
            vec![
                HsvRange::new(Hsv::new(0.0, 50.0, 50.0), Hsv::new(10.0, 255.0, 255.0)),
                HsvRange::new(Hsv::new(170.0, 50.0, 50.0), Hsv::new(180.0, 255.0, 255.0)),
            ],
        ),
        ColorProfile::new(
            "blue",
            vec![HsvRange::new(Hsv::new(100.0, 50.0, 50.0), Hsv::new(130.0, 255.0, 255.0))],
        ),
        ColorProfile::new(
            "green",
            vec![HsvRange::new(Hsv::new(40.0, 50.0, 50.0), Hsv::new(80.0, 255.0, 255.0))],
        ),
        ColorProfile::new(
            "black",
            vec![HsvRange::new(Hsv::new(0.0, 0.0, 0.0), Hsv::new(180.0, 255.0, 50.0))],
        ),
    ]
}

/// Stack grouping parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackingConfig {
    /// Center distance below `multiplier * max(seed width, seed height)` joins the seed's stack
    pub proximity_multiplier: f64,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            proximity_multiplier: 1.5,
        }
    }
}

/// Seam counting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeamConfig {
    /// Rows whose edge projection exceeds `ratio * max` count as seam rows
    pub peak_threshold_ratio: f64,

    /// Chips per seam row
    pub peak_scale: f64,

    /// Added to the scaled seam-row count
    pub peak_offset: u32,

    /// Assumed chip thickness when no seams are visible
    pub chip_thickness_px: f64,

    pub min_chips: u32,
    pub max_chips: u32,
}

impl Default for SeamConfig {
    fn default() -> Self {
        Self {
            peak_threshold_ratio: 0.3,
            peak_scale: 0.5,
            peak_offset: 1,
            chip_thickness_px: 18.0,
            min_chips: 1,
            max_chips: 50,
        }
    }
}

/// Normalizers for the soft color score used when no range matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorScoring {
    pub hue_normalizer: f64,
    pub saturation_normalizer: f64,
    pub value_normalizer: f64,
}

impl Default for ColorScoring {
    fn default() -> Self {
        Self {
            hue_normalizer: 10.0,
            saturation_normalizer: 50.0,
            value_normalizer: 50.0,
        }
    }
}

/// Classical circle detector used when the primary backend finds nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Gaussian kernel side length (odd)
    pub blur_kernel_size: u32,
    pub blur_sigma: f32,

    /// Minimum distance between accepted circle centers
    pub min_dist: f32,

    /// Upper Canny threshold; the lower one is half of it
    pub canny_threshold: f32,

    /// Minimum center votes for a circle candidate
    pub accumulator_threshold: u32,

    pub min_radius: u32,
    pub max_radius: u32,

    /// Confidence assigned to every synthesized detection
    pub confidence: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 9,
            blur_sigma: 2.0,
            min_dist: 30.0,
            canny_threshold: 50.0,
            accumulator_threshold: 30,
            min_radius: 20,
            max_radius: 100,
            confidence: 0.5,
        }
    }
}
