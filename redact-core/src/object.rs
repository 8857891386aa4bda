//! Generic row-output ONNX detector used for the person category.

use std::path::Path;

use anyhow::Result;
use image::DynamicImage;
use redact_utils::timing_guard;
use tract_onnx::prelude::Tensor;

use crate::{
    adapter::{ObjectDetector, RawDetection},
    detection::Category,
    model::{OnnxGraph, output_rows},
    preprocess::{InputSize, Placement, TensorLayout, model_views},
};

/// `x1, y1, x2, y2, score, class`
const ROW_COLS: usize = 6;
const CANDIDATE_FLOOR: f32 = 0.25;

/// Detector for graphs that already run their own decode and emit one row per box.
#[derive(Debug)]
pub struct OnnxObjectDetector {
    graph: OnnxGraph,
    input_size: InputSize,
    class_id: u32,
    category: Category,
    name: String,
}

impl OnnxObjectDetector {
    /// Keep rows whose class equals `class_id` and label them `category`.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: InputSize,
        class_id: u32,
        category: Category,
    ) -> Result<Self> {
        let graph = OnnxGraph::load(model_path)?;
        let name = graph
            .path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("onnx-{category}"));
        Ok(Self {
            graph,
            input_size,
            class_id,
            category,
            name,
        })
    }

    pub fn person<P: AsRef<Path>>(model_path: P, input_size: InputSize, class_id: u32) -> Result<Self> {
        Self::new(model_path, input_size, class_id, Category::Person)
    }
}

impl ObjectDetector for OnnxObjectDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let _guard = timing_guard("redact_core::object_detect", log::Level::Debug);
        let mut found = Vec::new();
        for view in model_views(image, self.input_size, TensorLayout::RgbUnit)? {
            let mut outputs = self.graph.run(view.tensor)?;
            anyhow::ensure!(!outputs.is_empty(), "object model produced no outputs");
            let output = outputs.swap_remove(0);
            found.extend(decode_rows(&output, self.class_id, self.category, view.placement)?);
        }
        Ok(found)
    }
}

fn decode_rows(
    output: &Tensor,
    class_id: u32,
    category: Category,
    placement: Placement,
) -> Result<Vec<RawDetection>> {
    let (data, rows) = output_rows(output, ROW_COLS)?;
    let wanted = class_id as f32;

    Ok(data
        .chunks_exact(ROW_COLS)
        .take(rows)
        .filter(|row| (row[5] - wanted).abs() < 0.5)
        .filter(|row| row[4].is_finite() && row[4] >= CANDIDATE_FLOOR)
        .filter_map(|row| {
            let bbox = placement.map_corners(row[0], row[1], row[2], row[3]);
            bbox.is_valid().then_some(RawDetection {
                bbox,
                confidence: row[4].min(1.0),
                category,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    #[test]
    fn keeps_only_configured_class() {
        let rows = [
            10.0f32, 10.0, 50.0, 90.0, 0.8, 0.0, // person
            0.0, 0.0, 20.0, 20.0, 0.9, 2.0, // car
            5.0, 5.0, 6.0, 6.0, 0.1, 0.0, // person, below floor
        ];
        let tensor = Tensor::from_shape(&[1, 3, 6], &rows).unwrap();

        let people = decode_rows(&tensor, 0, Category::Person, Placement::scaled(2.0, 2.0)).expect("decode");
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].bbox, BoundingBox::new(20.0, 20.0, 80.0, 160.0));
        assert_eq!(people[0].category, Category::Person);
    }

    #[test]
    fn tile_placement_offsets_corners() {
        let rows = [0.0f32, 0.0, 100.0, 200.0, 0.7, 0.0];
        let tensor = Tensor::from_shape(&[1, 6], &rows).unwrap();
        let people =
            decode_rows(&tensor, 0, Category::Person, Placement::offset(320, 0)).expect("decode");
        assert_eq!(people[0].bbox, BoundingBox::new(320.0, 0.0, 100.0, 200.0));
    }

    #[test]
    fn rejects_unexpected_shape() {
        let tensor = Tensor::from_shape(&[2, 5], &[0f32; 10]).unwrap();
        assert!(decode_rows(&tensor, 0, Category::Person, Placement::scaled(1.0, 1.0)).is_err());
    }
}
