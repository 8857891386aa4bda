//! Input collection.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use redact_utils::ImageFormatHint;
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Collect all image paths from a file or directory.
pub fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!(
            "input path is neither file nor directory: {}",
            path.display()
        );
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            let ext_lower = ext.to_ascii_lowercase();
            if IMAGE_EXTENSIONS.contains(&ext_lower.as_str()) {
                images.push(entry.path().to_path_buf());
            } else {
                debug!("Skipping non-image file {}", entry.path().display());
            }
        }
    }
    images.sort();
    Ok(images)
}

/// Raw bytes of one input. The error names the IO failure itself, so a missing or
/// locked file is never mistaken for one that does not decode.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Output location for `source`, mirroring its position below `input_root`.
/// Sources the exporter cannot re-encode (e.g. BMP) are written as PNG.
pub fn output_path_for(source: &Path, input_root: &Path, output_dir: &Path) -> PathBuf {
    let relative = if input_root.is_dir() {
        source.strip_prefix(input_root).unwrap_or(source)
    } else {
        Path::new(source.file_name().unwrap_or(source.as_os_str()))
    };
    let relative: PathBuf = relative
        .components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
        .collect();
    let mut target = output_dir.join(relative);
    let encodable = target
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageFormatHint::from_extension)
        .is_some();
    if !encodable {
        target.set_extension("png");
    }
    target
}

/// `base` with `suffix` appended to the file stem, e.g. `a.jpg` -> `a_preview.png`.
pub fn sibling_with_suffix(base: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    base.with_file_name(format!("{stem}_{suffix}.{ext}"))
}
