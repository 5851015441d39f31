//! YOLOv8 instance segmentation on the `rten` runtime.
//!
//! The model is an exported YOLOv8-seg network converted to `.rten`. It has
//! one image input `[1, 3, S, S]` and two outputs:
//!
//! - `output0` `[1, 4 + classes + coeffs, anchors]`: box (cx, cy, w, h in
//!   input pixels), class scores, mask coefficients
//! - `output1` `[1, coeffs, mh, mw]`: mask prototypes

use std::path::Path;

use anyhow::Context;
use image::imageops::{self, FilterType};
use image::{Luma, RgbImage};
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::NdTensor;
use serde::{Deserialize, Serialize};

use crate::detection::SegmentationBackend;
use crate::models::{RawDetection, RawMask};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoloSegConfig {
    /// Square input side the model was exported with
    pub input_size: u32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloSegConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

/// Primary backend: a YOLOv8-seg model.
pub struct YoloSegBackend {
    model: Model,
    config: YoloSegConfig,
}

impl YoloSegBackend {
    /// Load a `.rten` model file
    pub fn load(model_path: &Path, config: YoloSegConfig) -> anyhow::Result<Self> {
        if !model_path.exists() {
            anyhow::bail!("Segmentation model not found: {}", model_path.display());
        }
        let model = Model::load_file(model_path)
            .with_context(|| format!("Failed to load segmentation model {}", model_path.display()))?;
        Ok(Self { model, config })
    }

    fn input_tensor(&self, image: &RgbImage) -> NdTensor<f32, 4> {
        let size = self.config.input_size;
        let resized = imageops::resize(image, size, size, FilterType::Triangle);
        let plane = (size * size) as usize;
        let mut data = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let idx = (y * size + x) as usize;
            for c in 0..3 {
                data[c * plane + idx] = pixel[c] as f32 / 255.0;
            }
        }
        NdTensor::from_data([1, 3, size as usize, size as usize], data)
    }
}

/// Decoded anchor before NMS, box in model input pixels
#[derive(Debug, Clone)]
struct Candidate {
    corners: [f32; 4],
    confidence: f32,
    coefficients: Vec<f32>,
}

impl SegmentationBackend for YoloSegBackend {
    fn infer(&self, image: &RgbImage, confidence_threshold: f32) -> anyhow::Result<Vec<RawDetection>> {
        let input_id = *self.model.input_ids().first().context("Model has no inputs")?;
        let output_ids = self.model.output_ids();
        if output_ids.len() < 2 {
            anyhow::bail!("Expected detection and prototype outputs, model has {}", output_ids.len());
        }

        let input = self.input_tensor(image);
        let mut outputs = self
            .model
            .run(vec![(input_id, input.view().into())], &output_ids[..2], None)?
            .into_iter();

        let preds: NdTensor<f32, 3> = outputs
            .next()
            .context("Missing detection output")?
            .try_into()
            .map_err(|_| anyhow::anyhow!("Detection output is not a rank-3 f32 tensor"))?;
        let protos: NdTensor<f32, 4> = outputs
            .next()
            .context("Missing prototype output")?
            .try_into()
            .map_err(|_| anyhow::anyhow!("Prototype output is not a rank-4 f32 tensor"))?;

        let candidates = decode_candidates(&preds, protos.size(1), confidence_threshold)?;
        let kept = non_max_suppression(candidates, self.config.iou_threshold, self.config.max_detections);

        let (w, h) = image.dimensions();
        let input_size = self.config.input_size as f32;
        let (sx, sy) = (w as f32 / input_size, h as f32 / input_size);

        Ok(kept
            .into_iter()
            .map(|candidate| {
                let mask = assemble_mask(&protos, &candidate, input_size);
                let [x1, y1, x2, y2] = candidate.corners;
                RawDetection {
                    corners: [x1 * sx, y1 * sy, x2 * sx, y2 * sy],
                    mask,
                    mask_origin: None,
                    confidence: candidate.confidence,
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "YOLOv8 Segmentation"
    }
}

fn decode_candidates(preds: &NdTensor<f32, 3>, coeff_count: usize, threshold: f32) -> anyhow::Result<Vec<Candidate>> {
    let [_, channels, anchors] = preds.shape();
    if channels < 4 + coeff_count + 1 {
        anyhow::bail!("Detection output has {channels} channels, too few for {coeff_count} mask coefficients");
    }
    let classes = channels - 4 - coeff_count;

    let mut candidates = Vec::new();
    for i in 0..anchors {
        let confidence = (0..classes)
            .map(|c| preds[[0, 4 + c, i]])
            .fold(0.0f32, f32::max);
        if confidence <= threshold {
            continue;
        }

        let (cx, cy, bw, bh) = (preds[[0, 0, i]], preds[[0, 1, i]], preds[[0, 2, i]], preds[[0, 3, i]]);
        candidates.push(Candidate {
            corners: [cx - bw / 2.0, cy - bh / 2.0, cx + bw / 2.0, cy + bh / 2.0],
            confidence,
            coefficients: (0..coeff_count).map(|k| preds[[0, 4 + classes + k, i]]).collect(),
        });
    }
    Ok(candidates)
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Greedy NMS, highest confidence first
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32, max_detections: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        if kept.iter().all(|k| iou(&k.corners, &candidate.corners) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// sigmoid(coefficients . prototypes), zeroed outside the candidate box
fn assemble_mask(protos: &NdTensor<f32, 4>, candidate: &Candidate, input_size: f32) -> RawMask {
    let [_, coeffs, mh, mw] = protos.shape();
    let (scale_x, scale_y) = (mw as f32 / input_size, mh as f32 / input_size);
    let [x1, y1, x2, y2] = candidate.corners;
    let (bx1, by1, bx2, by2) = (x1 * scale_x, y1 * scale_y, x2 * scale_x, y2 * scale_y);

    RawMask::from_fn(mw as u32, mh as u32, |x, y| {
        let (fx, fy) = (x as f32, y as f32);
        if fx < bx1 || fx >= bx2 || fy < by1 || fy >= by2 {
            return Luma([0.0]);
        }
        let logit: f32 = (0..coeffs)
            .map(|k| candidate.coefficients[k] * protos[[0, k, y as usize, x as usize]])
            .sum();
        Luma([1.0 / (1.0 + (-logit).exp())])
    })
}
