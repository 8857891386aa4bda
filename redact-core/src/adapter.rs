//! Uniform interface over the pretrained detectors and their one-time loading.

use std::{
    fmt,
    path::Path,
    sync::{Arc, OnceLock},
};

use anyhow::Result;
use image::DynamicImage;
use log::{info, warn};
use redact_utils::{RedactSettings, config::ModelSettings};

use crate::{
    detection::{BoundingBox, Category},
    face::YuNetFaceDetector,
    object::OnnxObjectDetector,
};

/// A box returned by a detector, in the pixel space of the image it was given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    /// Uncalibrated score in `0.0..=1.0`.
    pub confidence: f32,
    pub category: Category,
}

/// Narrow view of an opaque pretrained detector: image in, boxes out.
pub trait ObjectDetector: Send + Sync {
    /// Short identifier recorded on every detection this adapter produces.
    fn name(&self) -> &str;

    /// Detect objects in `image`. Boxes are in `image`'s own pixel space.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>>;
}

/// The adapters that loaded successfully, plus why the others did not.
#[derive(Default)]
pub struct DetectorSet {
    detectors: Vec<Arc<dyn ObjectDetector>>,
    load_failures: Vec<String>,
}

impl fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorSet")
            .field(
                "detectors",
                &self.detectors.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .field("load_failures", &self.load_failures)
            .finish()
    }
}

impl DetectorSet {
    pub fn new(detectors: Vec<Arc<dyn ObjectDetector>>) -> Self {
        Self {
            detectors,
            load_failures: Vec::new(),
        }
    }

    /// Load every detector configured in `settings`.
    ///
    /// A model that is missing or fails to load is logged and left out; the set
    /// may end up empty, which the pipeline treats as "no ML detections".
    pub fn load(settings: &RedactSettings) -> Self {
        let models = &settings.models;
        let mut set = Self::default();

        if let Some(path) = models.face_model.as_deref() {
            set.try_add("face", path, |p| {
                YuNetFaceDetector::new(p, models.face_input.into())
                    .map(|d| Arc::new(d) as Arc<dyn ObjectDetector>)
            });
        }
        if let Some(path) = models.person_model.as_deref() {
            set.try_add("person", path, |p| {
                OnnxObjectDetector::person(p, models.person_input.into(), models.person_class_id)
                    .map(|d| Arc::new(d) as Arc<dyn ObjectDetector>)
            });
        }

        if set.detectors.is_empty() {
            warn!("No detector models available; only heuristic plate detection will run");
        }
        set
    }

    fn try_add<F>(&mut self, kind: &str, path: &str, load: F)
    where
        F: FnOnce(&Path) -> Result<Arc<dyn ObjectDetector>>,
    {
        match load(Path::new(path)) {
            Ok(detector) => {
                info!("Loaded {kind} detector '{}' from {path}", detector.name());
                self.detectors.push(detector);
            }
            Err(err) => {
                warn!("{kind} detector unavailable ({path}): {err:#}");
                self.load_failures
                    .push(format!("{kind} detector unavailable: {err}"));
            }
        }
    }

    pub fn detectors(&self) -> &[Arc<dyn ObjectDetector>] {
        &self.detectors
    }

    pub fn load_failures(&self) -> &[String] {
        &self.load_failures
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

type Loader = Box<dyn Fn() -> Result<DetectorSet> + Send + Sync>;

/// Lazily-initialised, memoised detector handle.
///
/// The first call to [`SharedDetectors::get`] runs the loader; concurrent first
/// callers block on that same load instead of starting their own. The outcome,
/// including failure, is kept for the lifetime of the handle.
pub struct SharedDetectors {
    loader: Loader,
    cell: OnceLock<Option<Arc<DetectorSet>>>,
}

impl SharedDetectors {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<DetectorSet> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            cell: OnceLock::new(),
        }
    }

    /// Handle that loads the models named in `settings`.
    pub fn from_settings(settings: RedactSettings) -> Self {
        Self::new(move || Ok(DetectorSet::load(&settings)))
    }

    /// The loaded set, or `None` when initialisation failed.
    pub fn get(&self) -> Option<Arc<DetectorSet>> {
        self.cell
            .get_or_init(|| match (self.loader)() {
                Ok(set) => Some(Arc::new(set)),
                Err(err) => {
                    warn!("Detector initialisation failed: {err:#}");
                    None
                }
            })
            .clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

static PROCESS_DETECTORS: OnceLock<(ModelSettings, Arc<SharedDetectors>)> = OnceLock::new();

/// Process-wide lazy detector handle. The model settings of the first caller
/// decide which models are loaded; later callers share that handle, and a caller
/// asking for different models is warned and still gets the first set.
pub fn process_detectors(settings: &RedactSettings) -> Arc<SharedDetectors> {
    let (models, shared) = PROCESS_DETECTORS.get_or_init(|| {
        (
            settings.models.clone(),
            Arc::new(SharedDetectors::from_settings(settings.clone())),
        )
    });
    if *models != settings.models {
        warn!("Detector models are already configured for this process; ignoring new model settings");
    }
    shared.clone()
}

/// Loaded process-wide detector set; see [`process_detectors`].
pub fn shared_detectors(settings: &RedactSettings) -> Option<Arc<DetectorSet>> {
    process_detectors(settings).get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Barrier,
        atomic::{AtomicUsize, Ordering},
    };
    use std::thread;
    use std::time::Duration;

    struct Fixed;

    impl ObjectDetector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn concurrent_callers_share_one_initialisation() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let shared = Arc::new(SharedDetectors::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(DetectorSet::new(vec![Arc::new(Fixed)]))
        }));

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    shared.get().map(|set| set.detectors().len())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().expect("join"), Some(1));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_initialisation_is_memoised() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let shared = SharedDetectors::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("runtime missing")
        });

        assert!(shared.get().is_none());
        assert!(shared.get().is_none());
        assert!(shared.is_initialized());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_models_degrade_to_empty_set() {
        let mut settings = RedactSettings::default();
        settings.models.face_model = Some("does/not/exist.onnx".into());
        settings.models.person_model = Some("also/missing.onnx".into());

        let set = DetectorSet::load(&settings);
        assert!(set.is_empty());
        assert_eq!(set.load_failures().len(), 2);
    }

    #[test]
    fn process_handle_is_shared_across_callers() {
        let mut settings = RedactSettings::default();
        settings.models.face_model = None;

        let first = process_detectors(&settings);
        let second = process_detectors(&settings);
        assert!(Arc::ptr_eq(&first, &second));

        let (a, b) = (shared_detectors(&settings), shared_detectors(&settings));
        match (a, b) {
            (Some(a), Some(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("process detectors failed to load: {other:?}"),
        }
    }
}
