use redact_utils::{PerCategory, RedactionPolicy, SelectionScope};

use crate::detection::{Category, Detection};

/// Apply each category's redaction policy to a deduplicated set.
///
/// Under [`RedactionPolicy::LargestOnly`] the greatest-area detection wins (the
/// first one seen on a tie). With [`SelectionScope::PerCategory`] every
/// largest-only category keeps its own winner, so an image holding a face, a
/// person and a plate still yields three regions when all three categories are
/// largest-only. [`SelectionScope::Overall`] pools the largest-only categories
/// and keeps exactly one detection across them. Categories under
/// [`RedactionPolicy::All`] are never thinned. Relative order of the survivors is
/// preserved.
pub fn select_for_redaction(
    detections: Vec<Detection>,
    policy: &PerCategory<RedactionPolicy>,
    scope: SelectionScope,
) -> Vec<Detection> {
    let slot_index = |category: Category| match scope {
        SelectionScope::PerCategory => category_slot(category),
        SelectionScope::Overall => 0,
    };
    let mut largest: [Option<usize>; 3] = [None; 3];
    for (index, detection) in detections.iter().enumerate() {
        if detection.category.pick(policy) != RedactionPolicy::LargestOnly {
            continue;
        }
        let slot = &mut largest[slot_index(detection.category)];
        match *slot {
            Some(best) if detections[best].area() >= detection.area() => {}
            _ => *slot = Some(index),
        }
    }

    detections
        .into_iter()
        .enumerate()
        .filter(|(index, detection)| match detection.category.pick(policy) {
            RedactionPolicy::All => true,
            RedactionPolicy::LargestOnly => {
                largest[slot_index(detection.category)] == Some(*index)
            }
        })
        .map(|(_, detection)| detection)
        .collect()
}

fn category_slot(category: Category) -> usize {
    match category {
        Category::Face => 0,
        Category::Person => 1,
        Category::Plate => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn det(side: f32, category: Category) -> Detection {
        Detection {
            bbox: BoundingBox::new(0.0, 0.0, side, side),
            confidence: 0.9,
            category,
            source_scale: 1.0,
            source_detector: format!("{side}"),
        }
    }

    #[test]
    fn largest_only_keeps_greatest_area() {
        let policy = PerCategory::uniform(RedactionPolicy::LargestOnly);
        let kept = select_for_redaction(
            vec![det(10.0, Category::Face), det(20.0, Category::Face)],
            &policy,
            SelectionScope::PerCategory,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].area(), 400.0);
    }

    #[test]
    fn all_keeps_everything() {
        let detections = vec![det(10.0, Category::Face), det(20.0, Category::Face)];
        let kept = select_for_redaction(
            detections.clone(),
            &PerCategory::uniform(RedactionPolicy::All),
            SelectionScope::Overall,
        );
        assert_eq!(kept, detections);
    }

    #[test]
    fn ties_go_to_first_seen() {
        let mut second = det(10.0, Category::Face);
        second.source_detector = "second".into();
        let kept = select_for_redaction(
            vec![det(10.0, Category::Face), second],
            &PerCategory::uniform(RedactionPolicy::LargestOnly),
            SelectionScope::PerCategory,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_detector, "10");
    }

    #[test]
    fn policy_is_per_category() {
        let policy = PerCategory {
            face: RedactionPolicy::LargestOnly,
            ..PerCategory::uniform(RedactionPolicy::All)
        };
        let kept = select_for_redaction(
            vec![
                det(10.0, Category::Face),
                det(5.0, Category::Plate),
                det(30.0, Category::Face),
                det(6.0, Category::Plate),
            ],
            &policy,
            SelectionScope::PerCategory,
        );
        let summary: Vec<(Category, f32)> = kept.iter().map(|d| (d.category, d.area())).collect();
        assert_eq!(
            summary,
            vec![
                (Category::Plate, 25.0),
                (Category::Face, 900.0),
                (Category::Plate, 36.0)
            ]
        );
    }

    #[test]
    fn largest_only_in_every_category_keeps_one_per_category() {
        let mixed = vec![
            det(10.0, Category::Face),
            det(40.0, Category::Person),
            det(8.0, Category::Plate),
        ];
        let policy = PerCategory::uniform(RedactionPolicy::LargestOnly);

        let per_category = select_for_redaction(mixed.clone(), &policy, SelectionScope::PerCategory);
        assert_eq!(per_category.len(), 3);

        let overall = select_for_redaction(mixed, &policy, SelectionScope::Overall);
        assert_eq!(overall.len(), 1);
        assert_eq!(overall[0].category, Category::Person);
    }

    #[test]
    fn overall_scope_leaves_keep_all_categories_alone() {
        let policy = PerCategory {
            plate: RedactionPolicy::All,
            ..PerCategory::uniform(RedactionPolicy::LargestOnly)
        };
        let kept = select_for_redaction(
            vec![
                det(10.0, Category::Face),
                det(5.0, Category::Plate),
                det(30.0, Category::Person),
                det(6.0, Category::Plate),
            ],
            &policy,
            SelectionScope::Overall,
        );
        let summary: Vec<(Category, f32)> = kept.iter().map(|d| (d.category, d.area())).collect();
        assert_eq!(
            summary,
            vec![
                (Category::Plate, 25.0),
                (Category::Person, 900.0),
                (Category::Plate, 36.0)
            ]
        );
    }
}
