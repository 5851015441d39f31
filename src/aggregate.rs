//! Folding per-stack (count, color) pairs into a monetary total.

use std::collections::BTreeMap;

use crate::models::{DetectedRegion, DetectionResult, ResultMeta, StackReport};

const DENOM_PREFIX: &str = "denom_";
const COLOR_PREFIX: &str = "color_";

/// `denom_<cents>` for valued colors, `color_<name>` for everything else
pub fn breakdown_key(color: &str, denomination: u64) -> String {
    if denomination > 0 {
        format!("{DENOM_PREFIX}{denomination}")
    } else {
        format!("{COLOR_PREFIX}{color}")
    }
}

/// Cents per chip encoded in a breakdown key; unclassified keys are worth 0
pub fn denomination_of_key(key: &str) -> u64 {
    key.strip_prefix(DENOM_PREFIX)
        .and_then(|cents| cents.parse().ok())
        .unwrap_or(0)
}

/// Arithmetic mean of region confidences, 0.0 for no regions
pub fn mean_confidence(regions: &[DetectedRegion]) -> f64 {
    if regions.is_empty() {
        return 0.0;
    }
    regions.iter().map(|r| r.confidence as f64).sum::<f64>() / regions.len() as f64
}

pub fn aggregate(reports: &[StackReport], model: &str, confidence: f64, notes: String) -> DetectionResult {
    let mut breakdown: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_cents = 0u64;

    for report in reports {
        let key = breakdown_key(&report.color, report.denomination);
        *breakdown.entry(key).or_insert(0) += report.count as u64;
        total_cents += report.count as u64 * report.denomination;
    }

    DetectionResult {
        total_cents,
        breakdown,
        meta: ResultMeta {
            model: model.to_string(),
            confidence,
            notes,
        },
    }
}

/// Recompute the total from the breakdown keys
pub fn total_from_breakdown(breakdown: &BTreeMap<String, u64>) -> u64 {
    breakdown
        .iter()
        .map(|(key, count)| denomination_of_key(key) * count)
        .sum()
}
