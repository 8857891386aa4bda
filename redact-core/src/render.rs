//! Mapping between base-image pixels and a fill-and-crop ("cover") display.
//!
//! A preview shows the image scaled so it covers its container, centred, with
//! the overflowing axis clipped. Overlay rectangles must follow that mapping, and
//! the mapping changes whenever the image loads, the container resizes, or the
//! device rotates. [`PreviewMapper`] treats those as events and recomputes the
//! geometry from scratch on each one.

use serde::Serialize;

use crate::{
    compositor::{BlurRegion, overlay_regions},
    detection::BoundingBox,
};

/// How a natural-size image is laid out in its container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderGeometry {
    pub container_width: f32,
    pub container_height: f32,
    pub rendered_width: f32,
    pub rendered_height: f32,
    /// Left edge of the rendered image relative to the container (<= 0 when cropped).
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl RenderGeometry {
    /// Base-image rectangle to container coordinates: scale, then offset.
    pub fn map_rect(&self, rect: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            rect.x * self.scale_x + self.offset_x,
            rect.y * self.scale_y + self.offset_y,
            rect.width * self.scale_x,
            rect.height * self.scale_y,
        )
    }

    /// Container point back to base-image pixels.
    pub fn unmap_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.offset_x) / self.scale_x,
            (y - self.offset_y) / self.scale_y,
        )
    }
}

/// Cover-fit geometry for an image of `natural` size shown in `container`.
///
/// `None` when either size has a zero side; there is nothing to draw then.
pub fn cover_geometry(natural: (u32, u32), container: (u32, u32)) -> Option<RenderGeometry> {
    let (iw, ih) = (natural.0 as f32, natural.1 as f32);
    let (cw, ch) = (container.0 as f32, container.1 as f32);
    if iw <= 0.0 || ih <= 0.0 || cw <= 0.0 || ch <= 0.0 {
        return None;
    }

    // Wider image than container: height fills and width overflows, and vice versa.
    let scale = if iw / ih > cw / ch { ch / ih } else { cw / iw };
    let rendered_width = iw * scale;
    let rendered_height = ih * scale;

    Some(RenderGeometry {
        container_width: cw,
        container_height: ch,
        rendered_width,
        rendered_height,
        offset_x: (cw - rendered_width) * 0.5,
        offset_y: (ch - rendered_height) * 0.5,
        scale_x: scale,
        scale_y: scale,
    })
}

/// Something that changes how the preview is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    /// The image finished loading; its natural size is now known.
    ImageLoaded { width: u32, height: u32 },
    ContainerResized { width: u32, height: u32 },
    /// Rotation; carries the container size after the change.
    OrientationChanged { width: u32, height: u32 },
    /// The preview no longer shows an image.
    SourceCleared,
}

/// Keeps the inputs of the preview overlay and rebuilds it on every event.
#[derive(Debug, Default, Clone)]
pub struct PreviewMapper {
    natural: Option<(u32, u32)>,
    container: Option<(u32, u32)>,
    regions: Vec<BlurRegion>,
}

impl PreviewMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the base-space regions and return the fresh overlay.
    pub fn set_regions(&mut self, regions: Vec<BlurRegion>) -> Vec<BlurRegion> {
        self.regions = regions;
        self.overlay()
    }

    /// Apply `event` and return the overlay to draw now.
    pub fn handle(&mut self, event: RenderEvent) -> Vec<BlurRegion> {
        match event {
            RenderEvent::ImageLoaded { width, height } => {
                self.natural = Some((width, height));
            }
            RenderEvent::ContainerResized { width, height }
            | RenderEvent::OrientationChanged { width, height } => {
                self.container = Some((width, height));
            }
            RenderEvent::SourceCleared => {
                self.natural = None;
                self.regions.clear();
            }
        }
        self.overlay()
    }

    /// Geometry for the current inputs, derived on every call.
    pub fn geometry(&self) -> Option<RenderGeometry> {
        cover_geometry(self.natural?, self.container?)
    }

    pub fn overlay(&self) -> Vec<BlurRegion> {
        match self.geometry() {
            Some(geometry) => overlay_regions(&self.regions, &geometry),
            None => Vec::new(),
        }
    }
}
