//! Common helpers shared across the redaction crates.

/// Pipeline settings and their JSON persistence.
pub mod config;
/// Image loading, decoding, resizing, and tensor conversion.
pub mod image_utils;
/// Re-encoding of redacted images.
pub mod output;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use config::{PerCategory, RedactSettings, RedactionPolicy, SelectionScope};
pub use image_utils::{
    compute_resize_scales, decode_image_bytes, luma_with_max_dimension,
    resize_image, rgb_to_bgr_chw, rgb_to_unit_chw, scaled_dimensions,
};
pub use output::{ImageFormatHint, OutputOptions, encode_image, save_dynamic_image};
pub use telemetry::{
    TELEMETRY_TARGET, TimingGuard, configure as configure_telemetry, telemetry_allows,
    telemetry_enabled, timing_guard, timing_guard_if,
};

/// Initialize logging once for the CLI or an embedding application.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Telemetry output is
/// always let through so `configure_telemetry` alone decides whether it appears.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
