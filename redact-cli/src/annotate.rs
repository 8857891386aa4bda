//! Outlined copies and cover-fitted previews of redacted images.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::{DynamicImage, Rgba, RgbaImage, imageops::FilterType};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use redact_core::{BlurRegion, BoundingBox, Category, cover_geometry, overlay_regions};

fn outline_color(category: Category) -> Rgba<u8> {
    match category {
        Category::Face => Rgba([255, 0, 0, 255]),
        Category::Person => Rgba([255, 160, 0, 255]),
        Category::Plate => Rgba([0, 120, 255, 255]),
    }
}

/// Outline `regions` on `image`, so the blurred areas can be reviewed.
pub fn outline_regions(image: &DynamicImage, regions: &[BlurRegion]) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return canvas;
    }
    for region in regions {
        let rect = rect_from_bbox(&region.rect, w, h);
        draw_hollow_rect_mut(&mut canvas, rect, outline_color(region.category));
    }
    canvas
}

/// Render `image` cover-fitted into a `container`-sized canvas with the
/// preview overlay of `regions` drawn on top.
pub fn render_preview(
    image: &DynamicImage,
    regions: &[BlurRegion],
    container: (u32, u32),
) -> Result<RgbaImage> {
    let geometry = cover_geometry((image.width(), image.height()), container)
        .context("cannot preview an image with zero dimensions")?;

    let rendered_w = geometry.rendered_width.round().max(1.0) as u32;
    let rendered_h = geometry.rendered_height.round().max(1.0) as u32;
    let scaled = image.resize_exact(rendered_w, rendered_h, FilterType::Triangle).to_rgba8();

    let mut canvas = RgbaImage::new(container.0, container.1);
    image::imageops::replace(
        &mut canvas,
        &scaled,
        geometry.offset_x.round() as i64,
        geometry.offset_y.round() as i64,
    );

    for region in overlay_regions(regions, &geometry) {
        let rect = rect_from_bbox(&region.rect, container.0, container.1);
        draw_hollow_rect_mut(&mut canvas, rect, outline_color(region.category));
    }
    Ok(canvas)
}

/// Save an RGBA render, creating parent directories as needed.
pub fn save_render(image: &RgbaImage, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Convert a floating-point `BoundingBox` to an integer `imageproc::rect::Rect`.
fn rect_from_bbox(bbox: &BoundingBox, img_w: u32, img_h: u32) -> Rect {
    let max_x = img_w.saturating_sub(1) as f32;
    let max_y = img_h.saturating_sub(1) as f32;

    let x1 = bbox.x.clamp(0.0, max_x);
    let y1 = bbox.y.clamp(0.0, max_y);
    let x2 = bbox.right().clamp(0.0, max_x);
    let y2 = bbox.bottom().clamp(0.0, max_y);

    let width = (x2 - x1).max(1.0).round() as u32;
    let height = (y2 - y1).max(1.0).round() as u32;

    Rect::at(x1.round() as i32, y1.round() as i32).of_size(width, height)
}
