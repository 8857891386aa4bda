//! Serializable report records for redact-cli.

use redact_core::{BlurRegion, Detection, DetectionCounts, RedactionReport};
use serde::Serialize;

/// One redacted (or skipped) region, in source pixels.
#[derive(Debug, Serialize)]
pub struct RegionRecord {
    pub category: String,
    pub confidence: f32,
    /// `[x, y, width, height]`
    pub bbox: [f32; 4],
}

#[derive(Debug, Serialize)]
pub struct DetectionRecord {
    pub category: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
    pub scale: f32,
    pub detector: String,
}

/// Everything the CLI learned about a single input image.
#[derive(Debug, Default, Serialize)]
pub struct ImageReport {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<DetectionCounts>,
    pub detections: Vec<DetectionRecord>,
    pub regions: Vec<RegionRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageReport {
    pub fn failed(image: String, error: impl Into<String>) -> Self {
        Self {
            image,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn from_report(image: String, report: &RedactionReport) -> Self {
        Self {
            image,
            width: Some(report.image_width),
            height: Some(report.image_height),
            counts: Some(report.counts),
            detections: report.detections.iter().map(DetectionRecord::from).collect(),
            regions: report.regions.iter().map(RegionRecord::from).collect(),
            warnings: report.warnings.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }
}

impl From<&Detection> for DetectionRecord {
    fn from(detection: &Detection) -> Self {
        Self {
            category: detection.category.to_string(),
            confidence: detection.confidence,
            bbox: [
                detection.bbox.x,
                detection.bbox.y,
                detection.bbox.width,
                detection.bbox.height,
            ],
            scale: detection.source_scale,
            detector: detection.source_detector.clone(),
        }
    }
}

impl From<&BlurRegion> for RegionRecord {
    fn from(region: &BlurRegion) -> Self {
        Self {
            category: region.category.to_string(),
            confidence: region.confidence,
            bbox: [region.rect.x, region.rect.y, region.rect.width, region.rect.height],
        }
    }
}
