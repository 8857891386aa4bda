//! Command-line argument definitions for redact-cli.

use clap::{ArgAction, Parser};
use redact_utils::{RedactionPolicy, SelectionScope};
use std::path::PathBuf;

/// Blur faces, people, and license plates in images before they are shared.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct RedactArgs {
    /// Path to an image file or a directory containing images.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory that receives the redacted copies.
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Optional settings JSON. Defaults to `config/redact_settings.json` when present, otherwise built-in parameters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the YuNet face ONNX model (overrides the settings file).
    #[arg(long)]
    pub face_model: Option<PathBuf>,

    /// Path to a person detection ONNX model emitting `[N, 6]` rows.
    #[arg(long)]
    pub person_model: Option<PathBuf>,

    /// Which faces to blur: `all` or `largest-only`.
    #[arg(long, value_name = "POLICY")]
    pub policy_face: Option<RedactionPolicy>,

    /// Which people to blur: `all` or `largest-only`.
    #[arg(long, value_name = "POLICY")]
    pub policy_person: Option<RedactionPolicy>,

    /// Which plates to blur: `all` or `largest-only`.
    #[arg(long, value_name = "POLICY")]
    pub policy_plate: Option<RedactionPolicy>,

    /// Whether `largest-only` keeps one region per category or one per image.
    #[arg(long, value_name = "SCOPE")]
    pub selection_scope: Option<SelectionScope>,

    /// Skip the heuristic license plate search.
    #[arg(long = "no-plates", action = ArgAction::SetTrue)]
    pub no_plates: bool,

    /// Scale factors for the multi-scale detector passes, e.g. `1.0,1.5,2.0`.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub scales: Option<Vec<f32>>,

    /// Override the IoU threshold used when merging overlapping detections.
    #[arg(long)]
    pub nms_threshold: Option<f32>,

    /// Write the redaction report to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Directory to write copies with the redacted regions outlined.
    #[arg(long)]
    pub annotate: Option<PathBuf>,

    /// Also render a cover-fitted preview of this size (e.g. `390x844`) next to each output.
    #[arg(long, value_name = "WxH", value_parser = parse_dimensions)]
    pub preview: Option<(u32, u32)>,

    /// JPEG quality for redacted JPEG outputs (1-100).
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}

/// Parse a `WIDTHxHEIGHT` pair.
pub fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: u32 = w.parse().map_err(|_| format!("invalid width '{w}'"))?;
    let height: u32 = h.parse().map_err(|_| format!("invalid height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("preview dimensions must be non-zero".to_string());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_preview_dimensions() {
        assert_eq!(parse_dimensions("390x844"), Ok((390, 844)));
        assert_eq!(parse_dimensions(" 640 X 480 "), Ok((640, 480)));
        assert!(parse_dimensions("640").is_err());
        assert!(parse_dimensions("0x10").is_err());
    }

    #[test]
    fn parses_policy_and_scale_lists() {
        let args = RedactArgs::try_parse_from([
            "redact-cli",
            "--input",
            "in.png",
            "--output-dir",
            "out",
            "--policy-face",
            "largest-only",
            "--scales",
            "1.0,1.5,2.0",
            "--selection-scope",
            "overall",
        ])
        .expect("parse");
        assert_eq!(args.selection_scope, Some(SelectionScope::Overall));
        assert_eq!(args.policy_face, Some(RedactionPolicy::LargestOnly));
        assert_eq!(args.scales, Some(vec![1.0, 1.5, 2.0]));
        assert_eq!(args.jpeg_quality, 90);
        assert!(!args.no_plates);
    }
}
