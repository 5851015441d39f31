//! Denomination color of a stack from the mean HSV of its seed chip.

use crate::config::{ColorProfile, ColorScoring, Hsv, HsvRange};
use crate::detection::preprocessing::rgb_to_hsv;
use crate::models::Stack;

/// Returned when the seed chip's mask has no foreground pixels
pub const UNKNOWN_COLOR: &str = "unknown";

/// Classify a stack by its first region only.
///
/// Never fails: an empty mask gives [`UNKNOWN_COLOR`], otherwise the
/// best-scoring profile name is returned.
pub fn classify_color(stack: &Stack, profiles: &[ColorProfile], scoring: &ColorScoring) -> String {
    match mean_hsv(stack) {
        Some(mean) => classify_hsv(mean, profiles, scoring),
        None => UNKNOWN_COLOR.to_string(),
    }
}

/// Mean HSV over the seed region's mask, `None` if the mask is empty
pub fn mean_hsv(stack: &Stack) -> Option<Hsv> {
    let seed = stack.first();
    let (mut h, mut s, mut v) = (0.0f64, 0.0f64, 0.0f64);
    let mut count = 0usize;

    for (pixel, mask) in seed.region.pixels().zip(seed.mask.pixels()) {
        if mask[0] == 0 {
            continue;
        }
        let hsv = rgb_to_hsv(pixel);
        h += hsv.h;
        s += hsv.s;
        v += hsv.v;
        count += 1;
    }

    (count > 0).then(|| {
        let n = count as f64;
        Hsv::new(h / n, s / n, v / n)
    })
}

/// Best-scoring profile for a mean HSV value.
///
/// A range containing the value scores 1.0; otherwise the score decays with
/// the distance to the nearest range bound. Ties go to the earlier profile.
pub fn classify_hsv(mean: Hsv, profiles: &[ColorProfile], scoring: &ColorScoring) -> String {
    let mut best: &str = UNKNOWN_COLOR;
    let mut best_score = 0.0f64;

    for profile in profiles {
        let score = profile
            .ranges
            .iter()
            .map(|range| range_score(mean, range, scoring))
            .try_fold(0.0f64, |acc, score| {
                if score >= 1.0 { Err(1.0) } else { Ok(acc.max(score)) }
            })
            .unwrap_or_else(|hit| hit);

        if score > best_score {
            best_score = score;
            best = profile.name.as_str();
        }
    }

    best.to_string()
}

/// 1.0 inside the range, `1 / (1 + dh/nh + ds/ns + dv/nv)` outside it
pub fn range_score(mean: Hsv, range: &HsvRange, scoring: &ColorScoring) -> f64 {
    if range.contains(mean) {
        return 1.0;
    }

    let (lo, hi) = (range.lower, range.upper);
    let hue_dist = [lo.h, hi.h, (lo.h + 180.0) % 180.0, (hi.h + 180.0) % 180.0]
        .into_iter()
        .map(|bound| (mean.h - bound).abs())
        .fold(f64::INFINITY, f64::min);
    let sat_dist = (mean.s - lo.s).abs().min((mean.s - hi.s).abs());
    let val_dist = (mean.v - lo.v).abs().min((mean.v - hi.v).abs());

    1.0 / (1.0
        + hue_dist / scoring.hue_normalizer
        + sat_dist / scoring.saturation_normalizer
        + val_dist / scoring.value_normalizer)
}
