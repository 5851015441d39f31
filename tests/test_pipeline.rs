//! Integration tests for the end-to-end chip counter.
//!
//! Tests cover:
//! - Zero results when neither backend finds anything
//! - Primary-backend results, totals and breakdown keys
//! - Fallback to circle detection, never mixing the two backends
//! - Input errors and backend error passthrough
//! - Debug dumps and shared use across threads

mod common;

use std::path::Path;

use chipcount::aggregate::total_from_breakdown;
use chipcount::{HoughCircleBackend, SegmentationBackend, FALLBACK_MODEL_LABEL, PRIMARY_MODEL_LABEL};
use image::{DynamicImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;

use common::*;

fn counter_with(detections: Vec<RawDetection>) -> ChipCounter {
    ChipCounter::new(
        ChipCounterConfig::default(),
        Box::new(PrecomputedBackend::new(detections)),
    )
}

fn assert_consistent(result: &DetectionResult) {
    assert_eq!(result.total_cents, total_from_breakdown(&result.breakdown));
}

struct FailingBackend;

impl SegmentationBackend for FailingBackend {
    fn infer(&self, _image: &RgbImage, _threshold: f32) -> anyhow::Result<Vec<RawDetection>> {
        anyhow::bail!("model exploded")
    }

    fn name(&self) -> &str {
        "Failing"
    }
}

#[test]
fn test_nothing_detected_anywhere() -> anyhow::Result<()> {
    // 1. A featureless image on disk
    let file = save_temp_png(&uniform_image(200, 150, FELT_GRAY));

    // 2. No model, and no circles for the fallback to find
    let counter = ChipCounter::without_model(ChipCounterConfig::default());
    let result = counter.detect_chips(file.path())?;

    // 3. Exactly the zero result
    assert_eq!(result.total_cents, 0);
    assert!(result.breakdown.is_empty());
    assert_eq!(result.meta.model, "fallback-cv");
    assert_eq!(result.meta.confidence, 0.0);
    assert_eq!(result.meta.notes, "no detections");
    assert_eq!(result, DetectionResult::no_detections(FALLBACK_MODEL_LABEL));

    Ok(())
}

#[test]
fn test_red_stack_from_primary() -> anyhow::Result<()> {
    // 1. A red 40x90 block on felt, detected as one instance
    let bbox = BoundingBox::new(10, 10, 50, 100);
    let mut image = uniform_image(120, 120, FELT_GRAY);
    paint_box(&mut image, bbox, CHIP_RED);
    let counter = counter_with(vec![box_detection(120, 120, bbox, 0.75)]);

    // 2. Run through the bytes entry point
    let file = save_temp_png(&image);
    let bytes = std::fs::read(file.path())?;
    let result = counter.detect_chips_from_bytes(&bytes)?;

    // 3. No seams inside a flat block: 90px / 18px = 5 red chips
    assert_eq!(result.breakdown.len(), 1);
    assert_eq!(result.breakdown["denom_500"], 5);
    assert_eq!(result.total_cents, 2500);
    assert_eq!(result.meta.model, PRIMARY_MODEL_LABEL);
    assert!((result.meta.confidence - 0.75).abs() < 1e-6);
    assert_eq!(result.meta.notes, "Detected 1 chip regions, 1 stacks");
    assert_consistent(&result);

    Ok(())
}

#[test]
fn test_empty_masks_are_unknown_color() -> anyhow::Result<()> {
    let image = DynamicImage::ImageRgb8(uniform_image(100, 100, FELT_GRAY));
    let bbox = BoundingBox::new(20, 20, 60, 80);
    let counter = counter_with(vec![empty_mask_detection(100, 100, bbox, 0.9)]);

    let analysis = counter.analyze_image(&image, "empty-masks")?;
    let result = &analysis.result;

    // 60px tall stack with no seams: 3 chips, worth nothing
    assert_eq!(result.breakdown.len(), 1);
    assert_eq!(result.breakdown["color_unknown"], 3);
    assert_eq!(result.total_cents, 0);
    assert_eq!(result.meta.model, PRIMARY_MODEL_LABEL);
    assert_eq!(analysis.stacks.len(), 1);
    assert_eq!(analysis.stacks[0].color, "unknown");
    assert_eq!(analysis.stacks[0].denomination, 0);
    assert_consistent(result);

    Ok(())
}

#[test]
fn test_two_stacks_two_denominations() -> anyhow::Result<()> {
    // 1. Red stack on the left, blue stack far to the right
    let red = BoundingBox::new(10, 10, 40, 46);
    let blue_top = BoundingBox::new(200, 10, 230, 40);
    let blue_bottom = BoundingBox::new(200, 40, 230, 100);
    let mut image = uniform_image(300, 120, FELT_GRAY);
    paint_box(&mut image, red, CHIP_RED);
    paint_box(&mut image, blue_top, CHIP_BLUE);
    paint_box(&mut image, blue_bottom, CHIP_BLUE);

    let counter = counter_with(vec![
        box_detection(300, 120, red, 0.9),
        box_detection(300, 120, blue_top, 0.8),
        box_detection(300, 120, blue_bottom, 0.7),
    ]);

    // 2. Analyze
    let analysis = counter.analyze_image(&DynamicImage::ImageRgb8(image), "two-stacks")?;

    // 3. Two blue instances form one 90px stack; red is 36px
    assert_eq!(analysis.stacks.len(), 2);
    assert_eq!(analysis.stacks[0].color, "red");
    assert_eq!(analysis.stacks[0].count, 2);
    assert_eq!(analysis.stacks[1].color, "blue");
    assert_eq!(analysis.stacks[1].regions, 2);
    assert_eq!(analysis.stacks[1].count, 5);

    let result = analysis.result;
    assert_eq!(result.breakdown["denom_500"], 2);
    assert_eq!(result.breakdown["denom_1000"], 5);
    assert_eq!(result.total_cents, 2 * 500 + 5 * 1000);
    assert!((result.meta.confidence - 0.8).abs() < 1e-6);
    assert_eq!(result.meta.notes, "Detected 3 chip regions, 2 stacks");
    assert_consistent(&result);

    Ok(())
}

#[test]
fn test_unusable_primary_output_falls_back() -> anyhow::Result<()> {
    let image = DynamicImage::ImageRgb8(uniform_image(100, 100, FELT_GRAY));

    // Zero-area box and a low-confidence detection: nothing usable
    let counter = counter_with(vec![
        box_detection(100, 100, BoundingBox::new(30, 30, 30, 60), 0.9),
        box_detection(100, 100, BoundingBox::new(10, 10, 40, 40), 0.1),
    ]);

    let result = counter.detect_chips_in_image(&image)?;
    assert_eq!(result, DetectionResult::no_detections(FALLBACK_MODEL_LABEL));

    Ok(())
}

fn two_disc_table() -> RgbImage {
    let mut image = uniform_image(400, 200, Rgb([235, 235, 235]));
    draw_filled_circle_mut(&mut image, (100, 100), 40, Rgb([150, 10, 10]));
    draw_filled_circle_mut(&mut image, (300, 100), 40, Rgb([150, 10, 10]));
    image
}

#[test]
fn test_fallback_on_drawn_chips() -> anyhow::Result<()> {
    // 1. Two dark red discs on a light table
    let image = two_disc_table();

    // 2. No model: the circle detector does the work
    let counter = ChipCounter::without_model(ChipCounterConfig::default());
    let analysis = counter.analyze_image(&DynamicImage::ImageRgb8(image), "discs")?;
    let result = &analysis.result;

    // 3. One stack per disc, both red
    assert_eq!(result.meta.model, FALLBACK_MODEL_LABEL);
    assert_eq!(analysis.stacks.len(), 2);
    assert!((result.meta.confidence - 0.5).abs() < 1e-6);
    assert_eq!(result.meta.notes, "Fallback detection: 2 chip regions, 2 stacks");
    assert_eq!(result.breakdown.len(), 1);
    assert!(result.breakdown["denom_500"] >= 2);
    assert!(analysis.stacks.iter().all(|s| s.color == "red" && (1..=50).contains(&s.count)));
    assert!(result.total_cents > 0);
    assert_consistent(result);

    Ok(())
}

#[test]
fn test_fallback_masks_cover_only_their_boxes() -> anyhow::Result<()> {
    let image = two_disc_table();
    let backend = HoughCircleBackend::new(ChipCounterConfig::default().fallback);

    let detections = backend.infer(&image, 0.25)?;
    assert_eq!(detections.len(), 2);
    for detection in &detections {
        let bbox = BoundingBox::from_corners_clipped(detection.corners, 400, 200);
        assert_eq!(detection.mask.dimensions(), (bbox.width(), bbox.height()));
        assert_eq!(detection.mask_origin, Some((bbox.x1, bbox.y1)));
        assert!(bbox.width() < 120 && bbox.height() < 120);
    }

    Ok(())
}

#[test]
fn test_missing_file_is_not_found() {
    let counter = ChipCounter::without_model(ChipCounterConfig::default());
    let err = counter
        .detect_chips(Path::new("/definitely/not/here/chips.png"))
        .unwrap_err();
    assert!(matches!(err, ChipError::NotFound(_)));
    assert!(err.is_input_error());
}

#[test]
fn test_garbage_file_is_invalid_input() -> anyhow::Result<()> {
    let file = tempfile::Builder::new().suffix(".png").tempfile()?;
    std::fs::write(file.path(), b"these bytes are not a png")?;

    let counter = ChipCounter::without_model(ChipCounterConfig::default());
    let err = counter.detect_chips(file.path()).unwrap_err();
    assert!(matches!(err, ChipError::InvalidInput { .. }));

    let err = counter.detect_chips_from_bytes(b"nope").unwrap_err();
    assert!(matches!(err, ChipError::InvalidInput { .. }));

    Ok(())
}

#[test]
fn test_backend_errors_pass_through() {
    let counter = ChipCounter::new(ChipCounterConfig::default(), Box::new(FailingBackend));
    let image = DynamicImage::ImageRgb8(uniform_image(50, 50, FELT_GRAY));

    let err = counter.detect_chips_in_image(&image).unwrap_err();
    assert!(matches!(err, ChipError::Backend(_)));
    assert!(!err.is_input_error());
    assert_eq!(err.to_string(), "model exploded");
}

#[test]
fn test_custom_denominations() -> anyhow::Result<()> {
    // 1. Config file that revalues red and drops everything else
    let config_file = tempfile::Builder::new().suffix(".json").tempfile()?;
    std::fs::write(config_file.path(), r#"{ "denominations": { "red": 25 } }"#)?;
    let config = ChipCounterConfig::from_json_file(config_file.path())?;

    // 2. One red and one blue stack
    let red = BoundingBox::new(10, 10, 40, 100);
    let blue = BoundingBox::new(200, 10, 230, 100);
    let mut image = uniform_image(300, 120, FELT_GRAY);
    paint_box(&mut image, red, CHIP_RED);
    paint_box(&mut image, blue, CHIP_BLUE);
    let counter = ChipCounter::new(
        config,
        Box::new(PrecomputedBackend::new(vec![
            box_detection(300, 120, red, 0.9),
            box_detection(300, 120, blue, 0.9),
        ])),
    );

    // 3. Blue is now unvalued
    let result = counter.detect_chips_in_image(&DynamicImage::ImageRgb8(image))?;
    assert_eq!(result.breakdown["denom_25"], 5);
    assert_eq!(result.breakdown["color_blue"], 5);
    assert_eq!(result.total_cents, 125);
    assert_consistent(&result);

    Ok(())
}

#[test]
fn test_debug_dump_writes_stack_images() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let bbox = BoundingBox::new(10, 10, 50, 100);
    let mut image = uniform_image(120, 120, FELT_GRAY);
    paint_box(&mut image, bbox, CHIP_RED);
    let file = save_temp_png(&image);

    let counter = counter_with(vec![box_detection(120, 120, bbox, 0.9)]).with_debug(dir.path().to_path_buf())?;
    counter.detect_chips(file.path())?;

    let stem = file.path().file_stem().unwrap().to_string_lossy().into_owned();
    let stack_dir = dir.path().join(stem);
    assert!(stack_dir.join("stack_01_crop.png").exists());
    assert!(stack_dir.join("stack_01_mask.png").exists());
    assert!(stack_dir.join("stack_01_seams.png").exists());

    let mask = image::open(stack_dir.join("stack_01_mask.png"))?.to_luma8();
    assert_eq!(mask.dimensions(), (40, 90));
    assert!(mask.pixels().all(|p| *p == Luma([255])));

    Ok(())
}

#[test]
fn test_debug_dir_must_be_empty() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("leftover.txt"), "x")?;

    let result = ChipCounter::without_model(ChipCounterConfig::default()).with_debug(dir.path().to_path_buf());
    assert!(result.is_err());

    Ok(())
}

#[test]
fn test_counter_is_shareable_across_threads() -> anyhow::Result<()> {
    let bbox = BoundingBox::new(10, 10, 50, 100);
    let mut image = uniform_image(120, 120, FELT_GRAY);
    paint_box(&mut image, bbox, CHIP_RED);
    let image = DynamicImage::ImageRgb8(image);
    let counter = counter_with(vec![box_detection(120, 120, bbox, 0.9)]);

    let totals: Vec<u64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| counter.detect_chips_in_image(&image).map(|r| r.total_cents)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect::<Result<_, _>>()
    })?;

    assert_eq!(totals, vec![2500; 4]);

    Ok(())
}
