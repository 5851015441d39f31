use std::path::{Path, PathBuf};

use anyhow::Result as AnyResult;
use image::{DynamicImage, GrayImage, ImageReader, RgbImage};
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::config::ChipCounterConfig;
use crate::detection::{extract_regions, HoughCircleBackend, PrecomputedBackend, SegmentationBackend};
use crate::error::{ChipError, Result};
use crate::models::{DetectedRegion, DetectionResult, Stack, StackReport};
use crate::stacks;

pub const PRIMARY_MODEL_LABEL: &str = "primary-model";
pub const FALLBACK_MODEL_LABEL: &str = "fallback-cv";

/// Which backend produced the regions of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionPath {
    Primary,
    Fallback,
}

impl DetectionPath {
    pub fn label(&self) -> &'static str {
        match self {
            DetectionPath::Primary => PRIMARY_MODEL_LABEL,
            DetectionPath::Fallback => FALLBACK_MODEL_LABEL,
        }
    }

    fn notes(&self, regions: usize, stacks: usize) -> String {
        match self {
            DetectionPath::Primary => format!("Detected {regions} chip regions, {stacks} stacks"),
            DetectionPath::Fallback => format!("Fallback detection: {regions} chip regions, {stacks} stacks"),
        }
    }
}

/// A result together with the per-stack details that produced it
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: DetectionResult,
    pub stacks: Vec<StackReport>,
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Image to money: segmentation, stacking, seam counting, color
/// classification and aggregation.
///
/// Construct one per service and share it by reference; it holds no
/// per-call state.
pub struct ChipCounter {
    config: ChipCounterConfig,
    primary: Box<dyn SegmentationBackend>,
    fallback: HoughCircleBackend,
    debug: Option<DebugConfig>,
}

impl ChipCounter {
    pub fn new(config: ChipCounterConfig, primary: Box<dyn SegmentationBackend>) -> Self {
        let fallback = HoughCircleBackend::new(config.fallback.clone());
        Self {
            config,
            primary,
            fallback,
            debug: None,
        }
    }

    /// A counter with no segmentation model; every image goes through the circle fallback
    pub fn without_model(config: ChipCounterConfig) -> Self {
        Self::new(config, Box::new(PrecomputedBackend::empty()))
    }

    /// Enable debug dumps. The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> AnyResult<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                anyhow::bail!("Debug directory is not empty: {}", output_dir.display());
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    pub fn config(&self) -> &ChipCounterConfig {
        &self.config
    }

    pub fn detect_chips(&self, image_path: &Path) -> Result<DetectionResult> {
        Ok(self.analyze_path(image_path)?.result)
    }

    pub fn detect_chips_from_bytes(&self, bytes: &[u8]) -> Result<DetectionResult> {
        Ok(self.analyze_bytes(bytes)?.result)
    }

    pub fn detect_chips_in_image(&self, image: &DynamicImage) -> Result<DetectionResult> {
        Ok(self.analyze_image(image, "image")?.result)
    }

    pub fn analyze_path(&self, image_path: &Path) -> Result<Analysis> {
        if !image_path.is_file() {
            return Err(ChipError::NotFound(image_path.to_path_buf()));
        }
        let name = image_path.display().to_string();
        let image = ImageReader::open(image_path)
            .map_err(|e| ChipError::invalid_input(&name, e.into()))?
            .with_guessed_format()
            .map_err(|e| ChipError::invalid_input(&name, e.into()))?
            .decode()
            .map_err(|e| ChipError::invalid_input(&name, e))?;

        let label = image_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.analyze_image(&image, &label)
    }

    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<Analysis> {
        let image = image::load_from_memory(bytes).map_err(|e| ChipError::invalid_input("<memory>", e))?;
        self.analyze_image(&image, "image")
    }

    /// Run the primary backend, and the fallback only if the primary yields
    /// no usable region. Regions from the two are never mixed.
    pub fn analyze_image(&self, image: &DynamicImage, label: &str) -> Result<Analysis> {
        let rgb = image.to_rgb8();
        let threshold = self.config.confidence_threshold;

        let raw = self.primary.infer(&rgb, threshold)?;
        debug!(backend = self.primary.name(), detections = raw.len(), "primary inference done");
        let regions = extract_regions(&rgb, raw, self.config.mask_threshold);
        if !regions.is_empty() {
            return Ok(self.run_stages(&rgb, regions, DetectionPath::Primary, label));
        }

        info!(backend = self.fallback.name(), "primary backend found no chips, falling back");
        let raw = self.fallback.infer(&rgb, threshold)?;
        let regions = extract_regions(&rgb, raw, self.config.mask_threshold);
        if regions.is_empty() {
            return Ok(Analysis {
                result: DetectionResult::no_detections(FALLBACK_MODEL_LABEL),
                stacks: Vec::new(),
            });
        }
        Ok(self.run_stages(&rgb, regions, DetectionPath::Fallback, label))
    }

    fn run_stages(&self, image: &RgbImage, regions: Vec<DetectedRegion>, path: DetectionPath, label: &str) -> Analysis {
        let region_count = regions.len();
        let confidence = aggregate::mean_confidence(&regions);
        let stacks = stacks::cluster_into_stacks(regions, &self.config.stacking);

        let reports: Vec<StackReport> = stacks
            .iter()
            .enumerate()
            .map(|(idx, stack)| {
                let report = self.measure_stack(stack, image);
                debug!(
                    stack = idx + 1,
                    regions = report.regions,
                    count = report.count,
                    color = %report.color,
                    denomination = report.denomination,
                    "stack measured"
                );
                self.dump_stack(label, idx, stack, image);
                report
            })
            .collect();

        let notes = path.notes(region_count, stacks.len());
        Analysis {
            result: aggregate::aggregate(&reports, path.label(), confidence, notes),
            stacks: reports,
        }
    }

    fn measure_stack(&self, stack: &Stack, image: &RgbImage) -> StackReport {
        let count = stacks::count_chips(stack, image, &self.config.seams);
        let color = stacks::classify_color(stack, &self.config.color_profiles, &self.config.color_scoring);
        let denomination = self.config.denominations.value_of(&color);
        StackReport {
            bounding_box: stack.bounding_box(),
            regions: stack.len(),
            count,
            color,
            denomination,
        }
    }

    /// Save the stack crop, combined mask and seam input; failures are only logged
    fn dump_stack(&self, label: &str, idx: usize, stack: &Stack, image: &RgbImage) {
        let Some(debug_config) = &self.debug else {
            return;
        };
        let dir = debug_config.output_dir.join(label);
        if let Err(e) = save_stack_images(&dir, idx, stack, image) {
            warn!(dir = %dir.display(), error = %e, "failed to save debug output");
        }
    }
}

fn save_stack_images(dir: &Path, idx: usize, stack: &Stack, image: &RgbImage) -> AnyResult<()> {
    std::fs::create_dir_all(dir)?;
    let bbox = stack.bounding_box();
    if bbox.area() == 0 {
        return Ok(());
    }

    let crop = image::imageops::crop_imm(image, bbox.x1, bbox.y1, bbox.width(), bbox.height()).to_image();
    let mask: GrayImage = stack.combined_mask();
    let seam_input = stacks::seams::masked_stack_gray(stack, image);

    let prefix = format!("stack_{:02}", idx + 1);
    crop.save(dir.join(format!("{prefix}_crop.png")))?;
    mask.save(dir.join(format!("{prefix}_mask.png")))?;
    seam_input.save(dir.join(format!("{prefix}_seams.png")))?;
    debug!(dir = %dir.display(), stack = idx + 1, "saved debug images");
    Ok(())
}
