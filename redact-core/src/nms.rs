//! Greedy IoU deduplication across detectors, scales, and categories.

use redact_utils::{config::NmsSettings, timing_guard};

use crate::detection::{Category, Detection};

/// IoU above which `category` candidates are suppressed.
pub fn threshold_for(settings: &NmsSettings, category: Category) -> f32 {
    category
        .pick(&settings.overrides)
        .unwrap_or(settings.iou_threshold)
}

/// Merge overlapping candidates, keeping the most confident of each cluster.
///
/// Candidates are visited in descending confidence (ties keep input order). A
/// candidate is dropped when its IoU with an already-kept detection exceeds the
/// threshold for the candidate's own category. With `cross_category` disabled only
/// kept detections of the same category can suppress it. Output is ordered by
/// descending confidence, so running this on its own output changes nothing.
pub fn deduplicate(candidates: Vec<Detection>, settings: &NmsSettings) -> Vec<Detection> {
    let _guard = timing_guard("redact_core::nms", log::Level::Debug);
    suppress(candidates, |kept, candidate| {
        if !settings.cross_category && kept.category != candidate.category {
            return false;
        }
        kept.bbox.iou(&candidate.bbox) > threshold_for(settings, candidate.category)
    })
}

/// Category-agnostic NMS with one threshold.
pub fn non_max_suppression(candidates: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    suppress(candidates, |kept, candidate| {
        kept.bbox.iou(&candidate.bbox) > threshold
    })
}

fn suppress<F>(mut candidates: Vec<Detection>, overlaps: F) -> Vec<Detection>
where
    F: Fn(&Detection, &Detection) -> bool,
{
    // `sort_by` is stable, which gives first-seen wins on equal confidence.
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut result: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates.drain(..) {
        if !result.iter().any(|kept| overlaps(kept, &candidate)) {
            result.push(candidate);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use redact_utils::PerCategory;

    fn det(x: f32, y: f32, w: f32, h: f32, confidence: f32, category: Category) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, y, w, h),
            confidence,
            category,
            source_scale: 1.0,
            source_detector: "test".into(),
        }
    }

    #[test]
    fn overlapping_faces_keep_higher_confidence() {
        // 10x10 boxes offset by 10/3 share IoU 0.5.
        let a = det(0.0, 0.0, 10.0, 10.0, 0.7, Category::Face);
        let b = det(10.0 / 3.0, 0.0, 10.0, 10.0, 0.9, Category::Face);
        assert!((a.bbox.iou(&b.bbox) - 0.5).abs() < 1e-4);

        let kept = deduplicate(vec![a, b.clone()], &NmsSettings::default());
        assert_eq!(kept, vec![b]);
    }

    #[test]
    fn deduplication_is_idempotent() {
        let candidates = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.9, Category::Face),
            det(2.0, 2.0, 10.0, 10.0, 0.8, Category::Face),
            det(7.0, 0.0, 10.0, 10.0, 0.85, Category::Person),
            det(50.0, 50.0, 30.0, 10.0, 0.4, Category::Plate),
            det(52.0, 51.0, 30.0, 10.0, 0.4, Category::Plate),
            det(100.0, 0.0, 5.0, 5.0, 0.6, Category::Face),
        ];
        let settings = NmsSettings::default();
        let once = deduplicate(candidates, &settings);
        let twice = deduplicate(once.clone(), &settings);
        assert_eq!(once, twice);
    }

    #[test]
    fn equal_confidence_keeps_first_seen() {
        let first = det(0.0, 0.0, 10.0, 10.0, 0.8, Category::Face);
        let mut second = det(1.0, 1.0, 10.0, 10.0, 0.8, Category::Face);
        second.source_detector = "second".into();

        let kept = non_max_suppression(vec![first.clone(), second], 0.3);
        assert_eq!(kept, vec![first]);
    }

    #[test]
    fn per_category_override_applies_to_candidate() {
        let settings = NmsSettings {
            overrides: PerCategory {
                plate: Some(0.9),
                ..PerCategory::uniform(None)
            },
            ..NmsSettings::default()
        };
        let a = det(0.0, 0.0, 10.0, 10.0, 0.9, Category::Plate);
        let b = det(2.0, 0.0, 10.0, 10.0, 0.8, Category::Plate);
        assert_eq!(deduplicate(vec![a.clone(), b.clone()], &settings).len(), 2);

        let mut face = b;
        face.category = Category::Face;
        assert_eq!(deduplicate(vec![a, face], &settings).len(), 1);
    }

    #[test]
    fn same_category_only_mode() {
        let settings = NmsSettings {
            cross_category: false,
            ..NmsSettings::default()
        };
        let face = det(0.0, 0.0, 10.0, 10.0, 0.9, Category::Face);
        let person = det(0.0, 0.0, 10.0, 10.0, 0.8, Category::Person);
        assert_eq!(deduplicate(vec![face.clone(), person.clone()], &settings).len(), 2);
        assert_eq!(
            deduplicate(vec![face, person], &NmsSettings::default()).len(),
            1
        );
    }
}
