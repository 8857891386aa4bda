//! Encoding of redacted images.
//!
//! Images are always re-encoded from decoded pixels, so EXIF/XMP blocks of the
//! source (GPS position, device serials) never reach the output file.

use anyhow::{Context, Result};
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
        webp::WebPEncoder,
    },
};
use log::debug;
use std::{fs, path::Path};

/// Image formats supported by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormatHint {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormatHint {
    /// Determine format from a filesystem extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormatHint::Png => "png",
            ImageFormatHint::Jpeg => "jpg",
            ImageFormatHint::Webp => "webp",
        }
    }
}

impl std::str::FromStr for ImageFormatHint {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(format!("unknown image format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    /// Explicit format; `None` picks one from the destination extension.
    pub format: Option<ImageFormatHint>,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format: None,
            jpeg_quality: 90,
        }
    }
}

/// Encode `image` into an in-memory buffer.
pub fn encode_image(
    image: &DynamicImage,
    format: ImageFormatHint,
    jpeg_quality: u8,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        ImageFormatHint::Png => {
            let rgba = image.to_rgba8();
            PngEncoder::new_with_quality(
                &mut buffer,
                CompressionType::Default,
                FilterType::Adaptive,
            )
            .write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ExtendedColorType::Rgba8,
            )
            .context("failed to encode PNG")?;
        }
        ImageFormatHint::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buffer, jpeg_quality.clamp(1, 100))
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
                .context("failed to encode JPEG")?;
        }
        ImageFormatHint::Webp => {
            let rgba = image.to_rgba8();
            WebPEncoder::new_lossless(&mut buffer)
                .write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    ExtendedColorType::Rgba8,
                )
                .context("failed to encode WebP")?;
        }
    }
    Ok(buffer)
}

/// Encode and write `image` to `path`, creating parent directories as needed.
pub fn save_dynamic_image(image: &DynamicImage, path: &Path, options: &OutputOptions) -> Result<()> {
    let format = options
        .format
        .or_else(|| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .and_then(ImageFormatHint::from_extension)
        })
        .unwrap_or_default();
    let bytes = encode_image(image, format, options.jpeg_quality)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
    debug!("Wrote {} ({:?}, {} bytes)", path.display(), format, bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn format_hint_from_extension() {
        assert_eq!(
            ImageFormatHint::from_extension("JPEG"),
            Some(ImageFormatHint::Jpeg)
        );
        assert_eq!(ImageFormatHint::from_extension("tiff"), None);
    }

    #[test]
    fn save_uses_extension_when_format_unset() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested/out.jpg");
        let image = DynamicImage::new_rgb8(8, 6);

        save_dynamic_image(&image, &path, &OutputOptions::default()).expect("save");
        let format = image::ImageFormat::from_path(&path).expect("format");
        assert_eq!(format, image::ImageFormat::Jpeg);
        let reloaded = image::open(&path).expect("reopen");
        assert_eq!((reloaded.width(), reloaded.height()), (8, 6));
    }
}
