//! Grouping detected chips into stacks, then counting and coloring each stack.

pub mod color;
pub mod seams;

use crate::config::StackingConfig;
use crate::models::{BoundingBox, DetectedRegion, Stack};

pub use color::{classify_color, classify_hsv, UNKNOWN_COLOR};
pub use seams::{count_chips, estimate_from_peaks};

/// Partition box indices into stacks in one greedy pass over input order.
///
/// Each unused box seeds a stack and pulls in every other unused box that
/// overlaps it or whose center lies closer than
/// `proximity_multiplier * max(seed width, seed height)`. Only the seed's
/// threshold is consulted, and a box claimed by an earlier stack is never
/// reconsidered, so the result depends on input order.
pub fn cluster_indices(boxes: &[BoundingBox], config: &StackingConfig) -> Vec<Vec<usize>> {
    let mut used = vec![false; boxes.len()];
    let mut stacks = Vec::new();

    for (i, seed) in boxes.iter().enumerate() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mut members = vec![i];
        let threshold = seed.width().max(seed.height()) as f64 * config.proximity_multiplier;

        for (j, other) in boxes.iter().enumerate() {
            if used[j] {
                continue;
            }
            if seed.overlaps(other) || seed.center_distance(other) < threshold {
                members.push(j);
                used[j] = true;
            }
        }

        stacks.push(members);
    }

    stacks
}

/// Group regions into stacks; see [`cluster_indices`] for the rule
pub fn cluster_into_stacks(regions: Vec<DetectedRegion>, config: &StackingConfig) -> Vec<Stack> {
    let boxes: Vec<BoundingBox> = regions.iter().map(|r| r.bbox).collect();
    let groups = cluster_indices(&boxes, config);

    let mut slots: Vec<Option<DetectedRegion>> = regions.into_iter().map(Some).collect();
    groups
        .into_iter()
        .filter_map(|group| {
            let mut members = group.into_iter().filter_map(|idx| slots[idx].take());
            let mut stack = Stack::new(members.next()?);
            for region in members {
                stack.push(region);
            }
            Some(stack)
        })
        .collect()
}
