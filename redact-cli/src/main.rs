mod annotate;
mod args;
mod config;
mod input;
mod types;

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use redact_core::{RedactError, RedactionPipeline, RedactionReport};
use redact_utils::{
    OutputOptions, configure_telemetry, init_logging, normalize_path, save_dynamic_image,
    timing_guard,
};

use crate::{
    annotate::{outline_regions, render_preview, save_render},
    args::RedactArgs,
    config::{apply_cli_overrides, load_settings},
    input::{IMAGE_EXTENSIONS, collect_images, output_path_for, read_input, sibling_with_suffix},
    types::ImageReport,
};

/// Message recorded for inputs that cannot be decoded.
const UNREADABLE_IMAGE: &str = "could not read image";

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = RedactArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    let input_path = normalize_path(&args.input)?;
    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            args.output_dir.display()
        )
    })?;
    let output_dir = normalize_path(&args.output_dir)?;
    let annotate_dir = if let Some(dir) = args.annotate.as_ref() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create annotation directory {}", dir.display()))?;
        Some(normalize_path(dir)?)
    } else {
        None
    };

    let images = collect_images(&input_path)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: {})",
            input_path.display(),
            IMAGE_EXTENSIONS.join(", ")
        );
    }

    let output_options = OutputOptions {
        jpeg_quality: args.jpeg_quality,
        ..OutputOptions::default()
    };
    let pipeline = RedactionPipeline::from_settings(settings);
    let context = RunContext {
        pipeline: &pipeline,
        input_root: &input_path,
        output_dir: &output_dir,
        annotate_dir: annotate_dir.as_deref(),
        preview: args.preview,
        output_options,
    };

    info!("Redacting {} image(s)...", images.len());
    let _run_guard = timing_guard(format!("redact {} image(s)", images.len()), log::Level::Info);
    let results: Vec<ImageReport> = images
        .iter()
        .map(|image_path| context.process(image_path))
        .collect();

    let failures = results.iter().filter(|r| r.error.is_some()).count();
    if failures > 0 {
        warn!("{failures} of {} image(s) could not be redacted", results.len());
    }

    if let Some(json_path) = args.json.as_ref() {
        if let Some(dir) = json_path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, &results).with_context(|| {
            format!("failed to write redaction report to {}", json_path.display())
        })?;
        info!("Wrote redaction report to {}", json_path.display());
    } else {
        let json =
            serde_json::to_string_pretty(&results).context("failed to serialize redaction report")?;
        println!("{json}");
    }

    Ok(())
}

struct RunContext<'a> {
    pipeline: &'a RedactionPipeline,
    input_root: &'a Path,
    output_dir: &'a Path,
    annotate_dir: Option<&'a Path>,
    preview: Option<(u32, u32)>,
    output_options: OutputOptions,
}

impl RunContext<'_> {
    /// Redact one image. Per-image failures end up in the report, never abort the run.
    fn process(&self, image_path: &Path) -> ImageReport {
        let label = image_path.display().to_string();
        let bytes = match read_input(image_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Skipping {label}: {err:#}");
                return ImageReport::failed(label, format!("{err:#}"));
            }
        };

        let (redacted, report) = match self.pipeline.redact_bytes(&bytes) {
            Ok(result) => result,
            Err(err @ (RedactError::ImageDecode(_) | RedactError::ZeroDimensions)) => {
                warn!("Skipping {label}: {err}");
                return ImageReport::failed(label, UNREADABLE_IMAGE);
            }
            Err(err) => {
                warn!("Failed to redact {label}: {err}");
                return ImageReport::failed(label, err.to_string());
            }
        };
        for warning in &report.warnings {
            warn!("{label}: {warning}");
        }
        info!(
            "{label} -> {} face(s), {} person(s), {} plate(s) redacted",
            report.counts.faces_detected, report.counts.people_detected, report.counts.plates_detected
        );

        let mut record = ImageReport::from_report(label.clone(), &report);
        let output_path = output_path_for(image_path, self.input_root, self.output_dir);
        match save_dynamic_image(&redacted, &output_path, &self.output_options) {
            Ok(()) => record.output = Some(output_path.display().to_string()),
            Err(err) => {
                warn!("Failed to save redacted copy of {label}: {err:#}");
                record.error = Some(format!("{err:#}"));
                return record;
            }
        }

        if let Some(dir) = self.annotate_dir {
            let target = output_path_for(image_path, self.input_root, dir).with_extension("png");
            match save_render(&outline_regions(&redacted, &report.regions), &target) {
                Ok(path) => {
                    info!("Annotated image saved to {}", path.display());
                    record.annotated = Some(path.display().to_string());
                }
                Err(err) => warn!("Failed to annotate {label}: {err:#}"),
            }
        }

        if let Some(container) = self.preview {
            match self.write_preview(&redacted, &report, container, &output_path) {
                Ok(path) => record.preview = Some(path.display().to_string()),
                Err(err) => warn!("Failed to render preview for {label}: {err:#}"),
            }
        }
        record
    }

    fn write_preview(
        &self,
        redacted: &image::DynamicImage,
        report: &RedactionReport,
        container: (u32, u32),
        output_path: &Path,
    ) -> Result<PathBuf> {
        let preview = render_preview(redacted, &report.regions, container)?;
        save_render(&preview, &sibling_with_suffix(output_path, "preview", "png"))
    }
}
