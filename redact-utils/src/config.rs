//! Shared configuration types consumed across the redaction workspace.
//!
//! Every tunable of the pipeline lives here so the CLI (and any embedding
//! application) can persist it as JSON and feed the same values into
//! `redact-core`. All sections use `#[serde(default)]`, so a partial settings
//! file only overrides what it names.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// One value per detection category.
///
/// Categories missing from a settings file take their value from the table's
/// `Default`, so `{"face": "largest_only"}` leaves person and plate untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerCategory<T> {
    pub face: T,
    pub person: T,
    pub plate: T,
}

impl<T: Copy> PerCategory<T> {
    /// Same value for every category.
    pub const fn uniform(value: T) -> Self {
        Self {
            face: value,
            person: value,
            plate: value,
        }
    }
}

/// Paths and input geometry of the pretrained detectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    /// YuNet face detection graph. `None` disables the face detector.
    pub face_model: Option<String>,
    /// Square input resolution the face graph was exported with.
    pub face_input: InputDimensions,
    /// Object detection graph emitting `[N, 6]` rows (`x1, y1, x2, y2, score, class`).
    pub person_model: Option<String>,
    /// Input resolution of the object detection graph.
    pub person_input: InputDimensions,
    /// Class index that denotes a person in the object graph's label map.
    pub person_class_id: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            face_model: Some("models/face_detection_yunet_2023mar_640.onnx".into()),
            face_input: InputDimensions::default(),
            person_model: None,
            person_input: InputDimensions::default(),
            person_class_id: 0,
        }
    }
}

/// Model input resolution in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
        }
    }
}

/// Multi-scale inference parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MultiScaleSettings {
    /// Ascending resample factors applied to the base image.
    pub scales: Vec<f32>,
    /// Longest side any resampled copy may have. Larger bases are fitted under it
    /// before the factors apply; factors that still exceed it are skipped.
    pub max_scaled_dimension: u32,
    /// Confidence multiplier gained per unit of scale above 1.0.
    pub scale_boost: f32,
    /// Upper bound for any calibrated confidence.
    pub confidence_cap: f32,
    /// Run scale passes on a bounded worker pool instead of sequentially.
    pub parallel: bool,
    /// Worker count when `parallel` is set.
    pub max_workers: usize,
}

impl Default for MultiScaleSettings {
    fn default() -> Self {
        Self {
            scales: vec![1.0, 1.5, 2.0, 2.5, 3.0],
            max_scaled_dimension: 2000,
            scale_boost: 0.1,
            confidence_cap: 0.99,
            parallel: false,
            max_workers: 2,
        }
    }
}

/// Non-maximum suppression thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NmsSettings {
    /// IoU above which a lower-confidence candidate is suppressed.
    pub iou_threshold: f32,
    /// Optional per-category replacement for `iou_threshold`.
    pub overrides: PerCategory<Option<f32>>,
    /// When true a face may suppress a plate and so on; otherwise suppression stays
    /// within one category.
    pub cross_category: bool,
}

impl Default for NmsSettings {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            overrides: PerCategory::default(),
            cross_category: true,
        }
    }
}

/// Geometry and edge-density thresholds of the plate heuristic.
///
/// None of these values come from a labelled dataset; they were tuned by eye on
/// street photos and should be treated as starting points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlateSettings {
    pub enabled: bool,
    /// Narrowest accepted width/height ratio.
    pub min_aspect: f32,
    /// Widest accepted width/height ratio.
    pub max_aspect: f32,
    /// Lower bound of the accepted edge-pixel ratio.
    pub min_edge_density: f32,
    /// Upper bound of the accepted edge-pixel ratio.
    pub max_edge_density: f32,
    /// Fraction of the image height where the search region begins (0.5 = lower half).
    pub search_start: f32,
    /// Sobel magnitude above which a pixel counts as an edge.
    pub gradient_threshold: f32,
    /// Window heights as fractions of the analysed image height.
    pub window_heights: Vec<f32>,
    /// Window width/height ratios to try.
    pub window_aspects: Vec<f32>,
    /// Window step as a fraction of the window height.
    pub stride: f32,
    /// The scan runs on a copy downscaled to this longest side.
    pub analysis_max_dimension: u32,
    /// Number of candidates kept after ranking.
    pub max_candidates: usize,
    /// Confidence assigned at the edges of the density band.
    pub min_confidence: f32,
    /// Confidence assigned at the centre of the density band.
    pub max_confidence: f32,
}

impl Default for PlateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_aspect: 1.5,
            max_aspect: 6.0,
            min_edge_density: 0.15,
            max_edge_density: 0.60,
            search_start: 0.5,
            gradient_threshold: 80.0,
            window_heights: vec![0.04, 0.06, 0.09, 0.13],
            window_aspects: vec![2.0, 3.0, 4.5],
            stride: 0.5,
            analysis_max_dimension: 640,
            max_candidates: 10,
            min_confidence: 0.3,
            max_confidence: 0.8,
        }
    }
}

/// Which detections of a category become redaction regions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RedactionPolicy {
    /// Every surviving detection is redacted.
    #[default]
    All,
    /// Only the greatest-area detection is redacted.
    LargestOnly,
}

/// How far a `largest_only` policy reaches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionScope {
    /// Each `largest_only` category keeps its own greatest-area detection.
    #[default]
    PerCategory,
    /// All `largest_only` categories compete for one slot, so a single detection
    /// survives across them.
    Overall,
}

impl fmt::Display for SelectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectionScope::PerCategory => "per-category",
            SelectionScope::Overall => "overall",
        })
    }
}

impl FromStr for SelectionScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "per-category" | "category" => Ok(SelectionScope::PerCategory),
            "overall" | "image" => Ok(SelectionScope::Overall),
            other => Err(format!(
                "invalid selection scope '{other}'; expected 'per-category' or 'overall'"
            )),
        }
    }
}

impl fmt::Display for RedactionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RedactionPolicy::All => "all",
            RedactionPolicy::LargestOnly => "largest-only",
        })
    }
}

impl FromStr for RedactionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "all" => Ok(RedactionPolicy::All),
            "largest-only" | "largest" => Ok(RedactionPolicy::LargestOnly),
            other => Err(format!(
                "invalid redaction policy '{other}'; expected 'all' or 'largest-only'"
            )),
        }
    }
}

/// Width/height multipliers applied to a detection before it is blurred.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Multiplier {
    pub width: f32,
    pub height: f32,
}

impl Multiplier {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Size-tiered expansion for one category. Tiers are selected by the detection's
/// area relative to the full image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExpansionTiers {
    /// Relative area above which `large` applies.
    pub large_area: f32,
    /// Relative area at or above which `medium` applies.
    pub medium_area: f32,
    pub large: Multiplier,
    pub medium: Multiplier,
    pub small: Multiplier,
}

impl ExpansionTiers {
    pub const fn flat(multiplier: Multiplier) -> Self {
        Self {
            large_area: 0.02,
            medium_area: 0.005,
            large: multiplier,
            medium: multiplier,
            small: multiplier,
        }
    }
}

impl Default for ExpansionTiers {
    fn default() -> Self {
        Self {
            large_area: 0.02,
            medium_area: 0.005,
            large: Multiplier::new(2.5, 3.0),
            medium: Multiplier::new(2.0, 2.5),
            small: Multiplier::new(1.5, 2.0),
        }
    }
}

/// How the permanent blur is rendered into the pixel buffer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlurStyle {
    #[default]
    Gaussian,
    Pixelate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlurSettings {
    pub style: BlurStyle,
    /// Gaussian sigma as a fraction of the region's shorter side.
    pub sigma_fraction: f32,
    /// Lower bound for the Gaussian sigma in pixels.
    pub min_sigma: f32,
    /// Pixelation cells across the region's shorter side.
    pub pixel_cells: u32,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            style: BlurStyle::Gaussian,
            sigma_fraction: 0.15,
            min_sigma: 6.0,
            pixel_cells: 8,
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        self.level
            .trim()
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Debug)
    }
}

/// Persistent pipeline settings consumed by the CLI and embedding applications.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RedactSettings {
    pub models: ModelSettings,
    pub multiscale: MultiScaleSettings,
    /// Minimum calibrated confidence per category; lower candidates never reach NMS.
    pub acceptance: PerCategory<f32>,
    pub nms: NmsSettings,
    pub plates: PlateSettings,
    pub policy: PerCategory<RedactionPolicy>,
    /// Whether `largest_only` picks one detection per category or one per image.
    pub selection_scope: SelectionScope,
    pub expansion: PerCategory<ExpansionTiers>,
    pub blur: BlurSettings,
    pub telemetry: TelemetrySettings,
}

impl Default for PerCategory<f32> {
    fn default() -> Self {
        Self {
            face: 0.55,
            person: 0.5,
            plate: 0.3,
        }
    }
}

impl Default for PerCategory<Option<f32>> {
    fn default() -> Self {
        Self::uniform(None)
    }
}

impl Default for PerCategory<RedactionPolicy> {
    fn default() -> Self {
        Self::uniform(RedactionPolicy::All)
    }
}

impl Default for PerCategory<ExpansionTiers> {
    fn default() -> Self {
        Self {
            face: ExpansionTiers::default(),
            person: ExpansionTiers::flat(Multiplier::new(1.1, 1.1)),
            plate: ExpansionTiers::flat(Multiplier::new(1.3, 1.5)),
        }
    }
}

impl RedactSettings {
    /// Load settings from a JSON file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: RedactSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        settings.sanitize();
        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }

    /// Clamp values to usable ranges and restore the ordering invariants the
    /// pipeline relies on.
    pub fn sanitize(&mut self) {
        let ms = &mut self.multiscale;
        ms.scales.retain(|s| s.is_finite() && *s > 0.0);
        ms.scales.sort_by(f32::total_cmp);
        ms.scales.dedup();
        if ms.scales.is_empty() {
            ms.scales.push(1.0);
        }
        ms.confidence_cap = ms.confidence_cap.clamp(0.0, 0.99);
        ms.scale_boost = ms.scale_boost.max(0.0);
        ms.max_workers = ms.max_workers.max(1);

        let plates = &mut self.plates;
        if plates.min_aspect > plates.max_aspect {
            std::mem::swap(&mut plates.min_aspect, &mut plates.max_aspect);
        }
        if plates.min_edge_density > plates.max_edge_density {
            std::mem::swap(&mut plates.min_edge_density, &mut plates.max_edge_density);
        }
        plates.search_start = plates.search_start.clamp(0.0, 1.0);
        plates.stride = plates.stride.clamp(0.05, 1.0);

        self.nms.iou_threshold = self.nms.iou_threshold.clamp(0.0, 1.0);
    }
}

/// Returns the default path for persisted settings (`config/redact_settings.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/redact_settings.json"))
        .unwrap_or_else(|_| PathBuf::from("config/redact_settings.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_settings_round_trip() {
        let file = NamedTempFile::new().expect("tempfile");
        let settings = RedactSettings::default();
        settings.save_to_path(file.path()).expect("save");

        let loaded = RedactSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.multiscale, settings.multiscale);
        assert_eq!(loaded.plates, settings.plates);
        assert_eq!(loaded.policy, settings.policy);
        assert_eq!(loaded.models, settings.models);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = NamedTempFile::new().expect("tempfile");
        let json = r#"{
            "policy": { "face": "largest_only", "person": "all", "plate": "all" },
            "nms": { "iou_threshold": 0.45 }
        }"#;
        fs::write(file.path(), json).expect("write settings");

        let loaded = RedactSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.policy.face, RedactionPolicy::LargestOnly);
        assert_eq!(loaded.policy.plate, RedactionPolicy::All);
        assert_eq!(loaded.nms.iou_threshold, 0.45);
        assert!(loaded.nms.cross_category);
        assert_eq!(loaded.acceptance.face, 0.55);
        assert_eq!(loaded.multiscale.max_scaled_dimension, 2000);
    }

    #[test]
    fn per_category_tables_fill_missing_categories() {
        let settings: RedactSettings = serde_json::from_str(
            r#"{
                "policy": { "face": "largest_only" },
                "acceptance": { "plate": 0.4 },
                "nms": { "overrides": { "person": 0.6 } },
                "selection_scope": "overall"
            }"#,
        )
        .expect("partial per-category tables parse");

        assert_eq!(settings.policy.face, RedactionPolicy::LargestOnly);
        assert_eq!(settings.policy.person, RedactionPolicy::All);
        assert_eq!(settings.policy.plate, RedactionPolicy::All);
        assert_eq!(settings.acceptance.face, 0.55);
        assert_eq!(settings.acceptance.person, 0.5);
        assert_eq!(settings.acceptance.plate, 0.4);
        assert_eq!(settings.nms.overrides.person, Some(0.6));
        assert_eq!(settings.nms.overrides.face, None);
        assert_eq!(settings.expansion.plate, PerCategory::<ExpansionTiers>::default().plate);
        assert_eq!(settings.selection_scope, SelectionScope::Overall);
    }

    #[test]
    fn selection_scope_parses_cli_spellings() {
        assert_eq!("overall".parse::<SelectionScope>(), Ok(SelectionScope::Overall));
        assert_eq!("Per_Category".parse::<SelectionScope>(), Ok(SelectionScope::PerCategory));
        assert!("global-ish".parse::<SelectionScope>().is_err());
        assert_eq!(RedactSettings::default().selection_scope, SelectionScope::PerCategory);
    }

    #[test]
    fn sanitize_orders_scales_and_caps_confidence() {
        let mut settings = RedactSettings::default();
        settings.multiscale.scales = vec![2.0, -1.0, 1.0, 2.0, f32::NAN];
        settings.multiscale.confidence_cap = 1.5;
        settings.plates.min_aspect = 7.0;
        settings.plates.max_aspect = 2.0;
        settings.sanitize();

        assert_eq!(settings.multiscale.scales, vec![1.0, 2.0]);
        assert_eq!(settings.multiscale.confidence_cap, 0.99);
        assert_eq!(settings.plates.min_aspect, 2.0);
        assert_eq!(settings.plates.max_aspect, 7.0);
    }

    #[test]
    fn policy_parses_cli_spellings() {
        assert_eq!("all".parse::<RedactionPolicy>(), Ok(RedactionPolicy::All));
        assert_eq!("largest-only".parse::<RedactionPolicy>(), Ok(RedactionPolicy::LargestOnly));
        assert_eq!("Largest_Only".parse::<RedactionPolicy>(), Ok(RedactionPolicy::LargestOnly));
        assert!("biggest".parse::<RedactionPolicy>().is_err());
    }

    #[test]
    fn telemetry_level_parses_variants() {
        let telemetry = TelemetrySettings {
            level: "TRACE".into(),
            ..TelemetrySettings::default()
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Trace);

        let telemetry = TelemetrySettings {
            level: "nonsense".into(),
            ..TelemetrySettings::default()
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Debug);
    }
}
