use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};

use crate::models::{BoundingBox, DetectedRegion, RawDetection, RawMask};

/// Turn raw backend instances into cropped regions, in backend order.
///
/// Instances whose clipped box has no area are dropped.
pub fn extract_regions(image: &RgbImage, detections: Vec<RawDetection>, mask_threshold: f32) -> Vec<DetectedRegion> {
    detections
        .into_iter()
        .filter_map(|detection| extract_region(image, detection, mask_threshold))
        .collect()
}

pub fn extract_region(image: &RgbImage, detection: RawDetection, mask_threshold: f32) -> Option<DetectedRegion> {
    let (w, h) = image.dimensions();
    let bbox = BoundingBox::from_corners_clipped(detection.corners, w, h);
    if bbox.area() == 0 {
        return None;
    }

    let mask = match detection.mask_origin {
        Some(origin) => crop_local_mask(&detection.mask, origin, bbox, mask_threshold),
        None => {
            let full_mask = binarize_mask(&detection.mask, w, h, mask_threshold);
            imageops::crop_imm(&full_mask, bbox.x1, bbox.y1, bbox.width(), bbox.height()).to_image()
        }
    };
    let region = imageops::crop_imm(image, bbox.x1, bbox.y1, bbox.width(), bbox.height()).to_image();

    Some(DetectedRegion {
        bbox,
        mask,
        region,
        confidence: detection.confidence,
    })
}

/// Threshold the part of a native-resolution mask anchored at `origin` that
/// falls inside `bbox`; pixels the mask does not cover are background
pub fn crop_local_mask(mask: &RawMask, origin: (u32, u32), bbox: BoundingBox, threshold: f32) -> GrayImage {
    let (ox, oy) = origin;
    GrayImage::from_fn(bbox.width(), bbox.height(), |x, y| {
        let (ix, iy) = (bbox.x1 + x, bbox.y1 + y);
        let covered = ix >= ox && iy >= oy && ix - ox < mask.width() && iy - oy < mask.height();
        let on = covered && mask.get_pixel(ix - ox, iy - oy)[0] > threshold;
        Luma([if on { 255u8 } else { 0 }])
    })
}

/// Resize a probability mask to `width` x `height` (bilinear) and threshold it
pub fn binarize_mask(mask: &RawMask, width: u32, height: u32, threshold: f32) -> GrayImage {
    let binarize = |value: f32| Luma([if value > threshold { 255u8 } else { 0 }]);

    if mask.width() == 0 || mask.height() == 0 {
        return GrayImage::new(width, height);
    }
    if mask.dimensions() == (width, height) {
        return GrayImage::from_fn(width, height, |x, y| binarize(mask.get_pixel(x, y)[0]));
    }

    let resized = imageops::resize(mask, width, height, FilterType::Triangle);
    GrayImage::from_fn(width, height, |x, y| binarize(resized.get_pixel(x, y)[0]))
}
