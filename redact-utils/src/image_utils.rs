
use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, RgbImage, imageops::FilterType};
use ndarray::Array3;

/// Decode an in-memory encoded image (JPEG, PNG, WebP, ...), guessing the format
/// from its magic bytes.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("failed to decode image bytes")
}

/// Resize an image to exactly `width` x `height` using the provided filter.
pub fn resize_image(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    image.resize_exact(width, height, filter).to_rgb8()
}

/// Dimensions of `size` multiplied by `factor`, rounded to whole pixels (at least 1).
pub fn scaled_dimensions(size: (u32, u32), factor: f32) -> (u32, u32) {
    let scale = |v: u32| ((v as f32 * factor).round() as u32).max(1);
    (scale(size.0), scale(size.1))
}

/// Grayscale copy whose longest side is at most `max_dim`, plus the factor that
/// maps its coordinates back to the source (`source = reduced * factor`).
pub fn luma_with_max_dimension(image: &DynamicImage, max_dim: u32) -> (GrayImage, f32) {
    let (w, h) = (image.width(), image.height());
    let longest = w.max(h);
    if max_dim == 0 || longest <= max_dim {
        return (image.to_luma8(), 1.0);
    }
    let factor = longest as f32 / max_dim as f32;
    let (rw, rh) = scaled_dimensions((w, h), 1.0 / factor);
    let reduced = image.resize_exact(rw, rh, FilterType::Triangle).to_luma8();
    (reduced, w as f32 / rw as f32)
}

/// Convert an RGB image into a BGR CHW array with raw 0..255 values, the layout
/// OpenCV's `blobFromImage` produces for YuNet.
pub fn rgb_to_bgr_chw(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        array[(0, yi, xi)] = pixel[2] as f32;
        array[(1, yi, xi)] = pixel[1] as f32;
        array[(2, yi, xi)] = pixel[0] as f32;
    }
    array
}

/// Convert an RGB image into an RGB CHW array normalised to `0.0..=1.0`.
pub fn rgb_to_unit_chw(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for c in 0..3 {
            array[(c, yi, xi)] = pixel[c] as f32 / 255.0;
        }
    }
    array
}

/// Compute scale factors used to reproject detections from model space to original space.
pub fn compute_resize_scales(original: (u32, u32), target: (u32, u32)) -> Result<(f32, f32)> {
    let (orig_w, orig_h) = original;
    let (target_w, target_h) = target;
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "target dimensions must be non-zero"
    );
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "original dimensions must be non-zero"
    );
    Ok((
        orig_w as f32 / target_w as f32,
        orig_h as f32 / target_h as f32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    #[test]
    fn rgb_to_bgr_chw_swaps_channels() {
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(0, 0, Rgb([0, 128, 255]));
        image.put_pixel(1, 0, Rgb([255, 128, 0]));

        let array = rgb_to_bgr_chw(&image);
        assert_eq!(array.shape(), &[3, 2, 2]);
        assert_eq!(array[(0, 0, 0)], 255.0);
        assert_eq!(array[(2, 0, 0)], 0.0);
        assert_eq!(array[(1, 0, 1)], 128.0);
    }

    #[test]
    fn unit_chw_is_normalised() {
        let image = RgbImage::from_pixel(1, 1, Rgb([255, 0, 51]));
        let array = rgb_to_unit_chw(&image);
        assert_eq!(array[(0, 0, 0)], 1.0);
        assert_eq!(array[(1, 0, 0)], 0.0);
        assert!((array[(2, 0, 0)] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn scaled_dimensions_round_and_floor_at_one() {
        assert_eq!(scaled_dimensions((640, 480), 1.5), (960, 720));
        assert_eq!(scaled_dimensions((3, 3), 0.1), (1, 1));
    }

    #[test]
    fn luma_reduction_reports_back_mapping_factor() {
        let image = DynamicImage::new_rgb8(1280, 640);
        let (gray, factor) = luma_with_max_dimension(&image, 640);
        assert_eq!(gray.dimensions(), (640, 320));
        assert!((factor - 2.0).abs() < 1e-6);

        let (gray, factor) = luma_with_max_dimension(&image, 4096);
        assert_eq!(gray.dimensions(), (1280, 640));
        assert_eq!(factor, 1.0);
    }

    #[test]
    fn decode_rejects_garbage_and_accepts_png() {
        assert!(decode_image_bytes(b"definitely not an image").is_err());

        let mut bytes = Vec::new();
        DynamicImage::new_rgb8(4, 3)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        let decoded = decode_image_bytes(&bytes).expect("decode png");
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn compute_resize_scales_rejects_zero() {
        assert_eq!(compute_resize_scales((640, 480), (320, 240)).unwrap(), (2.0, 2.0));
        assert!(compute_resize_scales((0, 480), (320, 240)).is_err());
        assert!(compute_resize_scales((640, 480), (0, 240)).is_err());
    }
}
