//! Turning detections into redaction rectangles and applying them.
//!
//! Detectors report tight boxes that underestimate the subject, worst for close
//! subjects, so every detection is grown about its centre by a multiplier picked
//! from its share of the image area. The grown rectangles are either mapped into
//! render space for a live overlay or blurred into a copy of the pixel buffer.

use image::{DynamicImage, GenericImageView, RgbaImage, imageops};
use log::debug;
use redact_utils::{
    PerCategory,
    config::{BlurSettings, BlurStyle, ExpansionTiers, Multiplier},
    timing_guard,
};
use serde::Serialize;

use crate::{
    detection::{BoundingBox, Category, Detection},
    render::RenderGeometry,
};

/// A rectangle to obscure, plus what it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlurRegion {
    pub rect: BoundingBox,
    pub category: Category,
    pub confidence: f32,
}

/// Multiplier tier for a detection covering `relative_area` of the image.
pub fn expansion_for(relative_area: f32, tiers: &ExpansionTiers) -> Multiplier {
    if relative_area > tiers.large_area {
        tiers.large
    } else if relative_area >= tiers.medium_area {
        tiers.medium
    } else {
        tiers.small
    }
}

/// Expanded base-space regions for `detections` on an image of `image_size`.
pub fn expand_detections(
    detections: &[Detection],
    image_size: (u32, u32),
    expansion: &PerCategory<ExpansionTiers>,
) -> Vec<BlurRegion> {
    let image_area = image_size.0 as f32 * image_size.1 as f32;
    if image_area <= 0.0 {
        return Vec::new();
    }
    detections
        .iter()
        .map(|detection| {
            let tiers = match detection.category {
                Category::Face => &expansion.face,
                Category::Person => &expansion.person,
                Category::Plate => &expansion.plate,
            };
            let m = expansion_for(detection.area() / image_area, tiers);
            BlurRegion {
                rect: detection.bbox.expanded_about_center(m.width, m.height),
                category: detection.category,
                confidence: detection.confidence,
            }
        })
        .collect()
}

/// Map base-space regions into the container, clamping to its bounds. Regions
/// that end up entirely outside the container are dropped.
pub fn overlay_regions(regions: &[BlurRegion], geometry: &RenderGeometry) -> Vec<BlurRegion> {
    regions
        .iter()
        .filter_map(|region| {
            let mapped = geometry.map_rect(&region.rect);
            let visible =
                mapped.clamped_to(geometry.container_width, geometry.container_height)?;
            Some(BlurRegion {
                rect: visible,
                ..*region
            })
        })
        .collect()
}

/// Blur `regions` (base-space) into a copy of `image`.
///
/// The input is left untouched; the result keeps the input's dimensions and
/// alpha-ness.
pub fn burn_in(image: &DynamicImage, regions: &[BlurRegion], blur: &BlurSettings) -> DynamicImage {
    let _guard = timing_guard("redact_core::burn_in", log::Level::Debug);
    let (width, height) = image.dimensions();
    let mut canvas = image.to_rgba8();

    let mut applied = 0usize;
    for region in regions {
        let Some((x, y, w, h)) = pixel_rect(&region.rect, width, height) else {
            continue;
        };
        let patch = imageops::crop_imm(&canvas, x, y, w, h).to_image();
        let obscured = match blur.style {
            BlurStyle::Gaussian => {
                let sigma = (blur.sigma_fraction * w.min(h) as f32).max(blur.min_sigma);
                imageops::blur(&patch, sigma)
            }
            BlurStyle::Pixelate => pixelate(&patch, blur.pixel_cells),
        };
        imageops::replace(&mut canvas, &obscured, i64::from(x), i64::from(y));
        applied += 1;
    }
    debug!("Burned {applied} of {} regions into {width}x{height} image", regions.len());

    if image.color().has_alpha() {
        DynamicImage::ImageRgba8(canvas)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
    }
}

/// Whole-pixel rectangle covering `rect` inside a `width` x `height` image.
fn pixel_rect(rect: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let clamped = rect.clamped_to(width as f32, height as f32)?;
    let x0 = clamped.x.floor() as u32;
    let y0 = clamped.y.floor() as u32;
    let x1 = (clamped.right().ceil() as u32).min(width);
    let y1 = (clamped.bottom().ceil() as u32).min(height);
    (x1 > x0 && y1 > y0).then(|| (x0, y0, x1 - x0, y1 - y0))
}

/// Replace the patch with a `cells` x `cells` grid of block averages (along the
/// shorter side; the longer side gets proportionally more blocks).
fn pixelate(patch: &RgbaImage, cells: u32) -> RgbaImage {
    let (w, h) = patch.dimensions();
    let block = (w.min(h) / cells.max(1)).max(1);
    let mut out = patch.clone();

    for by in (0..h).step_by(block as usize) {
        for bx in (0..w).step_by(block as usize) {
            let bw = block.min(w - bx);
            let bh = block.min(h - by);
            let mut sum = [0u64; 4];
            for y in by..by + bh {
                for x in bx..bx + bw {
                    for (acc, &c) in sum.iter_mut().zip(patch.get_pixel(x, y).0.iter()) {
                        *acc += u64::from(c);
                    }
                }
            }
            let n = u64::from(bw * bh);
            let mean = image::Rgba(sum.map(|s| (s / n) as u8));
            for y in by..by + bh {
                for x in bx..bx + bw {
                    out.put_pixel(x, y, mean);
                }
            }
        }
    }
    out
}
