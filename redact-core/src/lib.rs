//! Privacy redaction for still images.
//!
//! Faces and people are found with pretrained ONNX detectors run at several
//! scales, license plates with an edge-density heuristic. Candidates from every
//! source are deduplicated with IoU-based NMS, filtered by a per-category
//! redaction policy, expanded, and then either mapped onto a cover-fitted preview
//! or blurred into a copy of the image.

/// Detector adapter trait and the shared, lazily loaded detector set.
pub mod adapter;
/// Cooperative cancellation.
pub mod cancel;
/// Region expansion, preview overlay, and burn-in.
pub mod compositor;
/// Detection records and box geometry.
pub mod detection;
pub mod error;
/// YuNet face detector.
pub mod face;
/// ONNX graph loading and execution.
pub mod model;
/// Multi-scale detection and confidence calibration.
pub mod multiscale;
/// Non-maximum suppression.
pub mod nms;
/// Row-output ONNX object detector.
pub mod object;
/// End-to-end redaction pipeline.
pub mod pipeline;
/// Heuristic plate locator.
pub mod plate;
/// Image pre-processing (letterboxing, tiling, tensor conversion).
pub mod preprocess;
/// Cover-fit render geometry and preview events.
pub mod render;
/// Redaction policy selection.
pub mod selector;
/// Last-request-wins background sessions.
pub mod session;

pub use adapter::{
    DetectorSet, ObjectDetector, RawDetection, SharedDetectors, process_detectors, shared_detectors,
};
pub use cancel::CancelToken;
pub use compositor::{BlurRegion, burn_in, expand_detections, overlay_regions};
pub use detection::{BoundingBox, Category, Detection, DetectionCounts};
pub use error::RedactError;
pub use face::YuNetFaceDetector;
pub use model::OnnxGraph;
pub use multiscale::{MultiScaleRunner, calibrate_confidence};
pub use nms::deduplicate;
pub use object::OnnxObjectDetector;
pub use pipeline::{PipelineWarning, RedactionPipeline, RedactionReport};
pub use plate::PlateLocator;
pub use preprocess::{InputSize, Placement, TensorLayout};
pub use render::{PreviewMapper, RenderEvent, RenderGeometry, cover_geometry};
pub use selector::select_for_redaction;
pub use session::{RedactionSession, SessionMessage, SessionOutcome};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
