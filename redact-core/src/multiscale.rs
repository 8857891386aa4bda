//! Running the detectors over several resampled copies of one image.
//!
//! Each pass resamples the base image by a scale factor, runs every adapter on the
//! resampled copy, maps the returned boxes back into base-image pixels and
//! calibrates their confidence. A base larger than the configured cap is fitted
//! under it first; passes that would still exceed the cap are skipped, and a
//! pass that errors is logged and dropped.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView, imageops::FilterType};
use log::{debug, warn};
use rayon::prelude::*;
use redact_utils::{config::MultiScaleSettings, scaled_dimensions, timing_guard};

use crate::{
    adapter::ObjectDetector,
    cancel::CancelToken,
    detection::{BoundingBox, Detection},
};

/// Adjust a raw detector score for the scale it was produced at.
///
/// Passes above 1.0 are boosted by `boost` per unit of scale, since the detectors
/// underweight the small, distant subjects those passes exist to catch. The result
/// never exceeds `cap`.
pub fn calibrate_confidence(raw: f32, scale: f32, boost: f32, cap: f32) -> f32 {
    let raw = if raw.is_finite() { raw } else { 0.0 };
    let adjusted = if scale > 1.0 {
        raw * (1.0 + boost.max(0.0) * (scale - 1.0))
    } else {
        raw
    };
    adjusted.clamp(0.0, cap.clamp(0.0, 1.0))
}

/// One planned resample of the base image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalePass {
    pub factor: f32,
    pub width: u32,
    pub height: u32,
}

/// Passes to run for an image of `size`, ascending.
///
/// Factors are applied to a base that is first fitted under
/// `max_scaled_dimension`, so an image larger than the cap is downscaled rather
/// than skipped. Passes that still exceed the cap after fitting are left out; if
/// that removes every pass, one pass runs on the fitted base itself.
/// The result is empty only when no usable factor is configured.
pub fn plan_passes(size: (u32, u32), settings: &MultiScaleSettings) -> Vec<ScalePass> {
    let mut factors: Vec<f32> = settings
        .scales
        .iter()
        .copied()
        .filter(|f| f.is_finite() && *f > 0.0)
        .collect();
    factors.sort_by(f32::total_cmp);
    factors.dedup();

    let cap = settings.max_scaled_dimension;
    let longest = size.0.max(size.1);
    let fit = if cap > 0 && longest > cap {
        cap as f32 / longest as f32
    } else {
        1.0
    };
    if fit < 1.0 {
        debug!(
            "Base {}x{} exceeds cap {cap}; passes run on a copy scaled by {fit:.3}",
            size.0, size.1
        );
    }
    let within_cap = |(width, height): (u32, u32)| cap == 0 || (width <= cap && height <= cap);

    let mut passes: Vec<ScalePass> = factors
        .iter()
        .filter_map(|&factor| {
            let (width, height) = scaled_dimensions(size, factor * fit);
            if !within_cap((width, height)) {
                debug!("Skipping scale {factor}: {width}x{height} exceeds cap {cap}");
                return None;
            }
            Some(ScalePass {
                factor,
                width,
                height,
            })
        })
        .collect();

    if passes.is_empty() && !factors.is_empty() {
        let (width, height) = scaled_dimensions(size, fit);
        let clamp = |v: u32| if cap > 0 { v.min(cap) } else { v };
        passes.push(ScalePass {
            factor: 1.0,
            width: clamp(width),
            height: clamp(height),
        });
    }
    passes
}

/// Multi-scale driver around a set of detector adapters.
pub struct MultiScaleRunner {
    settings: MultiScaleSettings,
    pool: Option<rayon::ThreadPool>,
}

impl MultiScaleRunner {
    pub fn new(settings: MultiScaleSettings) -> Self {
        let pool = if settings.parallel {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(settings.max_workers.max(1))
                .thread_name(|i| format!("redact-scale-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(err) => {
                    warn!("Could not build scale worker pool, running sequentially: {err}");
                    None
                }
            }
        } else {
            None
        };
        Self { settings, pool }
    }

    pub fn settings(&self) -> &MultiScaleSettings {
        &self.settings
    }

    /// The passes [`Self::run`] would execute for an image of `size`.
    pub fn planned_passes(&self, size: (u32, u32)) -> Vec<ScalePass> {
        plan_passes(size, &self.settings)
    }

    /// All candidates across every pass, in base-image coordinates.
    ///
    /// Returns `None` when `cancel` fires before the passes complete.
    pub fn run(
        &self,
        image: &DynamicImage,
        detectors: &[Arc<dyn ObjectDetector>],
        cancel: &CancelToken,
    ) -> Option<Vec<Detection>> {
        if detectors.is_empty() {
            return Some(Vec::new());
        }
        let passes = plan_passes(image.dimensions(), &self.settings);

        let per_pass: Vec<Vec<Detection>> = match &self.pool {
            Some(pool) => pool.install(|| {
                passes
                    .par_iter()
                    .map(|pass| self.run_pass(image, *pass, detectors, cancel))
                    .collect()
            }),
            None => {
                let mut results = Vec::with_capacity(passes.len());
                for pass in &passes {
                    if cancel.is_cancelled() {
                        break;
                    }
                    results.push(self.run_pass(image, *pass, detectors, cancel));
                }
                results
            }
        };

        if cancel.is_cancelled() {
            debug!("Multi-scale detection cancelled");
            return None;
        }
        Some(per_pass.into_iter().flatten().collect())
    }

    fn run_pass(
        &self,
        image: &DynamicImage,
        pass: ScalePass,
        detectors: &[Arc<dyn ObjectDetector>],
        cancel: &CancelToken,
    ) -> Vec<Detection> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        let _guard = timing_guard(
            format!("redact_core::scale_pass[{:.2}]", pass.factor),
            log::Level::Debug,
        );

        let resampled;
        let view = if (pass.width, pass.height) == image.dimensions() {
            image
        } else {
            resampled = image.resize_exact(pass.width, pass.height, FilterType::Triangle);
            &resampled
        };
        // Use the realised ratio so rounding of the resampled size cannot skew boxes.
        let back_x = image.width() as f32 / pass.width as f32;
        let back_y = image.height() as f32 / pass.height as f32;

        let mut out = Vec::new();
        for detector in detectors {
            if cancel.is_cancelled() {
                break;
            }
            let raw = match detector.detect(view) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(
                        "Detector '{}' failed at scale {}: {err:#}",
                        detector.name(),
                        pass.factor
                    );
                    continue;
                }
            };
            out.extend(raw.into_iter().filter_map(|candidate| {
                let b = candidate.bbox;
                let bbox = BoundingBox::new(
                    b.x * back_x,
                    b.y * back_y,
                    b.width * back_x,
                    b.height * back_y,
                );
                bbox.is_valid().then(|| Detection {
                    bbox,
                    confidence: calibrate_confidence(
                        candidate.confidence,
                        pass.factor,
                        self.settings.scale_boost,
                        self.settings.confidence_cap,
                    ),
                    category: candidate.category,
                    source_scale: pass.factor,
                    source_detector: detector.name().to_string(),
                })
            }));
        }
        debug!(
            "Scale {:.2} ({}x{}) produced {} candidates",
            pass.factor,
            pass.width,
            pass.height,
            out.len()
        );
        out
    }
}
