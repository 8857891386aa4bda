//! End-to-end redaction of a single still image.

use std::{fmt, sync::Arc};

use image::{DynamicImage, GenericImageView};
use log::{debug, info};
use redact_utils::{ImageFormatHint, RedactSettings, decode_image_bytes, encode_image, timing_guard};
use serde::Serialize;

use crate::{
    adapter::{DetectorSet, SharedDetectors, process_detectors},
    cancel::CancelToken,
    compositor::{BlurRegion, burn_in, expand_detections, overlay_regions},
    detection::{Detection, DetectionCounts},
    error::RedactError,
    multiscale::MultiScaleRunner,
    nms::deduplicate,
    plate::PlateLocator,
    render::cover_geometry,
    selector::select_for_redaction,
};

/// Non-fatal condition that reduced what the pipeline could detect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineWarning {
    pub message: String,
}

impl PipelineWarning {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of analysing one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionReport {
    pub image_width: u32,
    pub image_height: u32,
    /// Detections chosen for redaction, base-image space.
    pub detections: Vec<Detection>,
    /// Expanded rectangles that get blurred, base-image space.
    pub regions: Vec<BlurRegion>,
    pub counts: DetectionCounts,
    pub warnings: Vec<PipelineWarning>,
}

impl RedactionReport {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

enum DetectorSource {
    Shared(Arc<SharedDetectors>),
    Fixed(Arc<DetectorSet>),
}

/// Detection, deduplication, selection, and compositing for still images.
pub struct RedactionPipeline {
    settings: RedactSettings,
    detectors: DetectorSource,
    runner: MultiScaleRunner,
    plates: PlateLocator,
}

impl RedactionPipeline {
    /// Pipeline whose detectors come from a shared, lazily loaded handle.
    pub fn new(settings: RedactSettings, detectors: Arc<SharedDetectors>) -> Self {
        Self::build(settings, DetectorSource::Shared(detectors))
    }

    /// Pipeline on the process-wide detector handle, loading the models named in
    /// `settings` on first use. Every pipeline built this way shares one loaded
    /// set; see [`process_detectors`].
    pub fn from_settings(settings: RedactSettings) -> Self {
        let shared = process_detectors(&settings);
        Self::new(settings, shared)
    }

    /// Pipeline over an already loaded detector set.
    pub fn with_detectors(settings: RedactSettings, detectors: DetectorSet) -> Self {
        Self::build(settings, DetectorSource::Fixed(Arc::new(detectors)))
    }

    fn build(settings: RedactSettings, detectors: DetectorSource) -> Self {
        let runner = MultiScaleRunner::new(settings.multiscale.clone());
        let plates = PlateLocator::new(settings.plates.clone());
        Self {
            settings,
            detectors,
            runner,
            plates,
        }
    }

    pub fn settings(&self) -> &RedactSettings {
        &self.settings
    }

    pub fn analyze(&self, image: &DynamicImage) -> Result<RedactionReport, RedactError> {
        self.analyze_cancellable(image, &CancelToken::new())
            .map(|report| report.unwrap_or_else(|| empty_report(image)))
    }

    /// Like [`Self::analyze`], returning `Ok(None)` when `cancel` fires first.
    pub fn analyze_cancellable(
        &self,
        image: &DynamicImage,
        cancel: &CancelToken,
    ) -> Result<Option<RedactionReport>, RedactError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(RedactError::ZeroDimensions);
        }
        let _guard = timing_guard("redact_core::analyze", log::Level::Info);

        let mut warnings = Vec::new();
        let set = self.detector_set(&mut warnings);
        if set.as_ref().is_some_and(|set| !set.is_empty())
            && self.runner.planned_passes((width, height)).is_empty()
        {
            warnings.push(PipelineWarning::new(
                "no detection pass could run at the configured scales; no faces or people were detected",
            ));
        }

        let Some(mut candidates) = (match &set {
            Some(set) => self.runner.run(image, set.detectors(), cancel),
            None => Some(Vec::new()),
        }) else {
            return Ok(None);
        };
        let Some(plates) = self.plates.locate(image, cancel) else {
            return Ok(None);
        };
        candidates.extend(plates);

        let merged = candidates.len();
        let acceptance = &self.settings.acceptance;
        candidates.retain(|c| c.confidence >= c.category.pick(acceptance));
        let accepted = candidates.len();

        let unique = deduplicate(candidates, &self.settings.nms);
        let deduplicated = unique.len();
        let selected = select_for_redaction(
            unique,
            &self.settings.policy,
            self.settings.selection_scope,
        );
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let regions = expand_detections(&selected, (width, height), &self.settings.expansion);
        let counts = DetectionCounts::from_detections(&selected);
        debug!(
            "{merged} candidates, {accepted} accepted, {deduplicated} after NMS, {} selected",
            selected.len()
        );
        info!(
            "Detected {} face(s), {} person(s), {} plate(s)",
            counts.faces_detected, counts.people_detected, counts.plates_detected
        );

        Ok(Some(RedactionReport {
            image_width: width,
            image_height: height,
            detections: selected,
            regions,
            counts,
            warnings,
        }))
    }

    /// Analyse `image` and return a redacted copy alongside the report.
    pub fn redact(&self, image: &DynamicImage) -> Result<(DynamicImage, RedactionReport), RedactError> {
        let report = self.analyze(image)?;
        let redacted = burn_in(image, &report.regions, &self.settings.blur);
        Ok((redacted, report))
    }

    pub fn redact_cancellable(
        &self,
        image: &DynamicImage,
        cancel: &CancelToken,
    ) -> Result<Option<(DynamicImage, RedactionReport)>, RedactError> {
        let Some(report) = self.analyze_cancellable(image, cancel)? else {
            return Ok(None);
        };
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let redacted = burn_in(image, &report.regions, &self.settings.blur);
        Ok(Some((redacted, report)))
    }

    /// Decode an encoded image and analyse it.
    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<RedactionReport, RedactError> {
        let image = decode(bytes)?;
        self.analyze(&image)
    }

    pub fn redact_bytes(&self, bytes: &[u8]) -> Result<(DynamicImage, RedactionReport), RedactError> {
        let image = decode(bytes)?;
        self.redact(&image)
    }

    /// Decode, redact, and re-encode: the artifact that may leave the device.
    pub fn redact_encoded(
        &self,
        bytes: &[u8],
        format: ImageFormatHint,
        jpeg_quality: u8,
    ) -> Result<(Vec<u8>, RedactionReport), RedactError> {
        let (redacted, report) = self.redact_bytes(bytes)?;
        let encoded = encode_image(&redacted, format, jpeg_quality)
            .map_err(|err| RedactError::Encode(format!("{err:#}")))?;
        Ok((encoded, report))
    }

    /// Overlay rectangles for `report` shown cover-fitted in `container`.
    pub fn preview_overlay(&self, report: &RedactionReport, container: (u32, u32)) -> Vec<BlurRegion> {
        cover_geometry((report.image_width, report.image_height), container)
            .map(|geometry| overlay_regions(&report.regions, &geometry))
            .unwrap_or_default()
    }

    fn detector_set(&self, warnings: &mut Vec<PipelineWarning>) -> Option<Arc<DetectorSet>> {
        let set = match &self.detectors {
            DetectorSource::Fixed(set) => Some(set.clone()),
            DetectorSource::Shared(shared) => shared.get(),
        };
        match &set {
            None => warnings.push(PipelineWarning::new(
                "detector initialisation failed; no faces or people were detected",
            )),
            Some(set) => {
                warnings.extend(set.load_failures().iter().cloned().map(PipelineWarning::new));
                if set.is_empty() && set.load_failures().is_empty() {
                    warnings.push(PipelineWarning::new(
                        "no detector models configured; only plates were searched",
                    ));
                }
            }
        }
        set
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, RedactError> {
    decode_image_bytes(bytes).map_err(|err| RedactError::ImageDecode(format!("{err:#}")))
}

fn empty_report(image: &DynamicImage) -> RedactionReport {
    RedactionReport {
        image_width: image.width(),
        image_height: image.height(),
        detections: Vec::new(),
        regions: Vec::new(),
        counts: DetectionCounts::default(),
        warnings: Vec::new(),
    }
}
