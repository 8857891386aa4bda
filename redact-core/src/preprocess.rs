//! Preparing images for the ONNX detectors.
//!
//! The graphs take a fixed input. An image that fits is letterboxed into it at
//! native resolution. A larger image is fed twice over: once fitted into the
//! input as an overview, and once as a grid of overlapping input-sized tiles
//! cut at native resolution, so an upscaled pass really shows the model more
//! pixels per subject. Every view carries the [`Placement`] that maps its
//! model-space boxes back onto the image that was passed in.

use std::borrow::Cow;

use anyhow::Result;
use image::{DynamicImage, GenericImageView, RgbImage, imageops, imageops::FilterType};
use redact_utils::{
    compute_resize_scales, config::InputDimensions, resize_image, rgb_to_bgr_chw,
    rgb_to_unit_chw, scaled_dimensions, timing_guard,
};
use tract_onnx::prelude::Tensor;

use crate::detection::BoundingBox;

/// Fraction of a tile shared with its neighbour, so a subject cut by one tile
/// edge is whole in the next.
pub const TILE_OVERLAP: f32 = 0.2;

/// Model input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(640, 640)
    }
}

impl From<InputDimensions> for InputSize {
    fn from(dimensions: InputDimensions) -> Self {
        InputSize::new(dimensions.width, dimensions.height)
    }
}

/// Channel order and value range of the input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// BGR planes with raw 0..255 values (YuNet / OpenCV convention).
    BgrRaw,
    /// RGB planes scaled to 0..1 (common for exported object detectors).
    RgbUnit,
}

/// Maps model-space coordinates onto the adapter's image:
/// `image = model * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Placement {
    pub const fn scaled(scale_x: f32, scale_y: f32) -> Self {
        Self {
            scale_x,
            scale_y,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    pub fn offset(x: u32, y: u32) -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            offset_x: x as f32,
            offset_y: y as f32,
        }
    }

    /// Box given as `x, y, width, height` in model space.
    pub fn map_box(&self, x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
        BoundingBox::new(
            x * self.scale_x + self.offset_x,
            y * self.scale_y + self.offset_y,
            width * self.scale_x,
            height * self.scale_y,
        )
    }

    /// Box given as two corners in model space.
    pub fn map_corners(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox::from_corners(
            x1 * self.scale_x + self.offset_x,
            y1 * self.scale_y + self.offset_y,
            x2 * self.scale_x + self.offset_x,
            y2 * self.scale_y + self.offset_y,
        )
    }
}

/// Tensor plus metadata for rescaling detections.
#[derive(Debug)]
pub struct PreprocessOutput {
    /// `[1, 3, H, W]` input tensor.
    pub tensor: Tensor,
    pub placement: Placement,
    pub original_size: (u32, u32),
}

/// Fit `image` into `input` without upscaling, letterbox it, and build the
/// input tensor in `layout`.
pub fn preprocess(
    image: &DynamicImage,
    input: InputSize,
    layout: TensorLayout,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("redact_core::preprocess", log::Level::Trace);
    anyhow::ensure!(
        input.width > 0 && input.height > 0,
        "input dimensions must be greater than zero"
    );

    let (orig_w, orig_h) = image.dimensions();
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "source image dimensions must be greater than zero"
    );

    let ratio = (input.width as f32 / orig_w as f32)
        .min(input.height as f32 / orig_h as f32)
        .min(1.0);
    let (fit_w, fit_h) = if ratio < 1.0 {
        let (w, h) = scaled_dimensions((orig_w, orig_h), ratio);
        (w.min(input.width), h.min(input.height))
    } else {
        (orig_w, orig_h)
    };

    let fitted: Cow<'_, RgbImage> = if (fit_w, fit_h) == (orig_w, orig_h) {
        match image.as_rgb8() {
            Some(rgb) => Cow::Borrowed(rgb),
            None => Cow::Owned(image.to_rgb8()),
        }
    } else {
        Cow::Owned(resize_image(image, fit_w, fit_h, FilterType::Triangle))
    };

    let tensor = to_tensor(&fitted, input, layout)?;
    let (scale_x, scale_y) = compute_resize_scales((orig_w, orig_h), (fit_w, fit_h))?;

    Ok(PreprocessOutput {
        tensor,
        placement: Placement::scaled(scale_x, scale_y),
        original_size: (orig_w, orig_h),
    })
}

/// Start positions of `tile`-long windows covering `len`, evenly spread with at
/// least [`TILE_OVERLAP`] shared between neighbours. The last window ends at `len`.
pub fn tile_origins(len: u32, tile: u32) -> Vec<u32> {
    if tile == 0 || len <= tile {
        return vec![0];
    }
    let step = ((tile as f32 * (1.0 - TILE_OVERLAP)).floor() as u32).max(1);
    let span = len - tile;
    let count = span.div_ceil(step) + 1;
    (0..count)
        .map(|i| (u64::from(span) * u64::from(i) / u64::from(count - 1)) as u32)
        .collect()
}

/// Every view the model should see of `image`: the fitted overview first, then,
/// when `image` exceeds `input`, native-resolution tiles in row-major order.
pub fn model_views(
    image: &DynamicImage,
    input: InputSize,
    layout: TensorLayout,
) -> Result<Vec<PreprocessOutput>> {
    let overview = preprocess(image, input, layout)?;
    let (width, height) = overview.original_size;
    if width <= input.width && height <= input.height {
        return Ok(vec![overview]);
    }

    let _guard = timing_guard("redact_core::tile_views", log::Level::Trace);
    let rgb: Cow<'_, RgbImage> = match image.as_rgb8() {
        Some(rgb) => Cow::Borrowed(rgb),
        None => Cow::Owned(image.to_rgb8()),
    };
    let xs = tile_origins(width, input.width);
    let ys = tile_origins(height, input.height);
    let mut views = Vec::with_capacity(1 + xs.len() * ys.len());
    views.push(overview);
    for &y in &ys {
        for &x in &xs {
            let tile_w = input.width.min(width - x);
            let tile_h = input.height.min(height - y);
            let tile = imageops::crop_imm(&*rgb, x, y, tile_w, tile_h).to_image();
            views.push(PreprocessOutput {
                tensor: to_tensor(&tile, input, layout)?,
                placement: Placement::offset(x, y),
                original_size: (width, height),
            });
        }
    }
    log::trace!(
        "{width}x{height} split into {} tiles of {}x{}",
        views.len() - 1,
        input.width,
        input.height
    );
    Ok(views)
}

/// Pad `rgb` into the top-left of an `input`-sized black canvas and convert it.
fn to_tensor(rgb: &RgbImage, input: InputSize, layout: TensorLayout) -> Result<Tensor> {
    let canvas: Cow<'_, RgbImage> = if rgb.dimensions() == (input.width, input.height) {
        Cow::Borrowed(rgb)
    } else {
        let mut canvas = RgbImage::new(input.width, input.height);
        imageops::replace(&mut canvas, rgb, 0, 0);
        Cow::Owned(canvas)
    };

    let chw = match layout {
        TensorLayout::BgrRaw => rgb_to_bgr_chw(&canvas),
        TensorLayout::RgbUnit => rgb_to_unit_chw(&canvas),
    };
    let shape = [1usize, 3, input.height as usize, input.width as usize];
    let (data, offset) = chw.into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    Tensor::from_shape(&shape, &data).map_err(|e| anyhow::anyhow!("failed to build tensor: {e}"))
}
