use chipcount::{BoundingBox, DetectedRegion, RawDetection, RawMask};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use tempfile::NamedTempFile;

/// Color constants for tests
pub const CHIP_RED: Rgb<u8> = Rgb([220, 20, 20]);
pub const CHIP_BLUE: Rgb<u8> = Rgb([20, 40, 220]);
pub const CHIP_BLACK: Rgb<u8> = Rgb([15, 15, 15]);
pub const FELT_GRAY: Rgb<u8> = Rgb([128, 128, 128]);

/// Creates a uniform image of the given color
pub fn uniform_image(width: u32, height: u32, color: Rgb<u8>) -> RgbImage {
    ImageBuffer::from_fn(width, height, |_, _| color)
}

/// Paints the half-open box `[x1, x2) x [y1, y2)` with `color`
pub fn paint_box(img: &mut RgbImage, bbox: BoundingBox, color: Rgb<u8>) {
    for y in bbox.y1..bbox.y2 {
        for x in bbox.x1..bbox.x2 {
            img.put_pixel(x, y, color);
        }
    }
}

/// Saves an image to a temp PNG file.
/// The file will be automatically cleaned up when dropped.
pub fn save_temp_png(img: &RgbImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Full-image mask that is `value` inside `bbox` and 0 elsewhere
pub fn box_mask(width: u32, height: u32, bbox: BoundingBox, value: f32) -> RawMask {
    RawMask::from_fn(width, height, |x, y| {
        let inside = x >= bbox.x1 && x < bbox.x2 && y >= bbox.y1 && y < bbox.y2;
        Luma([if inside { value } else { 0.0 }])
    })
}

/// Raw detection whose mask fills its own box
pub fn box_detection(width: u32, height: u32, bbox: BoundingBox, confidence: f32) -> RawDetection {
    RawDetection {
        corners: [bbox.x1 as f32, bbox.y1 as f32, bbox.x2 as f32, bbox.y2 as f32],
        mask: box_mask(width, height, bbox, 1.0),
        mask_origin: None,
        confidence,
    }
}

/// Raw detection with an all-zero mask
pub fn empty_mask_detection(width: u32, height: u32, bbox: BoundingBox, confidence: f32) -> RawDetection {
    RawDetection {
        corners: [bbox.x1 as f32, bbox.y1 as f32, bbox.x2 as f32, bbox.y2 as f32],
        mask: RawMask::new(width, height),
        mask_origin: None,
        confidence,
    }
}

/// Region with a fully set mask and uniform color, for clustering and counting tests
pub fn solid_region(bbox: BoundingBox, color: Rgb<u8>) -> DetectedRegion {
    DetectedRegion {
        bbox,
        mask: GrayImage::from_pixel(bbox.width(), bbox.height(), Luma([255])),
        region: uniform_image(bbox.width(), bbox.height(), color),
        confidence: 0.9,
    }
}

/// Region whose mask has no foreground at all
pub fn unmasked_region(bbox: BoundingBox, color: Rgb<u8>) -> DetectedRegion {
    DetectedRegion {
        mask: GrayImage::new(bbox.width(), bbox.height()),
        ..solid_region(bbox, color)
    }
}
