//! YuNet face detector adapter.

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

const STRIDES: [usize; 3] = [8, 16, 32];
const OUTPUTS_PER_STRIDE: usize = 4; // cls, obj, bbox, kps
const OUTPUT_COLS: usize = 15; // bbox (4) + landmarks (10) + score (1)

/// Scores below this never leave the adapter; the anchor grid otherwise yields
/// thousands of near-zero rows per pass.
const CANDIDATE_FLOOR: f32 = 0.3;
const TOP_K: usize = 5_000;

/// Face detector backed by the YuNet ONNX graph.
#[derive(Debug)]
pub struct YuNetFaceDetector {
    graph: OnnxGraph,
    input_size: InputSize,
}

impl YuNetFaceDetector {
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: InputSize) -> Result<Self> {
        let graph = OnnxGraph::load(model_path)?;
        Ok(Self { graph, input_size })
    }

    /// Run the graph and return one fused `[N, 15]` tensor in input-pixel space.
    fn infer(&self, input: Tensor) -> Result<Tensor> {
        let mut outputs = self.graph.run(input)?;
        match outputs.len() {
            1 => outputs
                .pop()
                .ok_or_else(|| anyhow::anyhow!("YuNet model produced no outputs")),
            len if len == STRIDES.len() * OUTPUTS_PER_STRIDE => {
                decode_stride_outputs(&outputs, self.input_size)
            }
            other => anyhow::bail!(
                "unexpected number of YuNet outputs: expected 1 or {}, got {}",
                STRIDES.len() * OUTPUTS_PER_STRIDE,
                other
            ),
        }
    }
}

impl ObjectDetector for YuNetFaceDetector {
    fn name(&self) -> &str {
        "yunet"
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let _guard = timing_guard("redact_core::yunet_detect", log::Level::Debug);
        let mut faces = Vec::new();
        for view in model_views(image, self.input_size, TensorLayout::BgrRaw)? {
            let fused = self.infer(view.tensor)?;
            faces.extend(rows_to_faces(&fused, view.placement)?);
        }
        faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        faces.truncate(TOP_K);
        Ok(faces)
    }
}

/// Turn fused YuNet rows into face candidates in image space.
fn rows_to_faces(fused: &Tensor, placement: Placement) -> Result<Vec<RawDetection>> {
    let (data, rows) = output_rows(fused, OUTPUT_COLS)?;
    let mut faces: Vec<RawDetection> = data
        .chunks_exact(OUTPUT_COLS)
        .take(rows)
        .filter_map(|row| {
            let score = row[14];
            if !score.is_finite() || score < CANDIDATE_FLOOR {
                return None;
            }
            let bbox = placement.map_box(row[0], row[1], row[2], row[3]);
            bbox.is_valid().then_some(RawDetection {
                bbox,
                confidence: score.min(1.0),
                category: Category::Face,
            })
        })
        .collect();

    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    faces.truncate(TOP_K);
    Ok(faces)
}

/// Fuse the twelve raw head outputs (cls/obj/bbox/kps per stride) into `[N, 15]`
/// rows of `x, y, w, h, 10 landmark coords, score`.
fn decode_stride_outputs(outputs: &[Tensor], input_size: InputSize) -> Result<Tensor> {
    let pad_w = (input_size.width as usize).div_ceil(32) * 32;
    let pad_h = (input_size.height as usize).div_ceil(32) * 32;

    let mut fused = Vec::new();
    for (stride_index, &stride) in STRIDES.iter().enumerate() {
        let cols = pad_w / stride;
        let rows = pad_h / stride;
        let cells = rows * cols;
        let stride_f = stride as f32;

        let head = |offset: usize, label: &str, per_cell: usize| -> Result<&[f32]> {
            let slice = outputs[stride_index + STRIDES.len() * offset]
                .as_slice::<f32>()
                .map_err(|e| anyhow::anyhow!("{label} output not f32: {e}"))?;
            anyhow::ensure!(
                slice.len() == cells * per_cell,
                "{label} length mismatch at stride {stride}: expected {}, got {}",
                cells * per_cell,
                slice.len()
            );
            Ok(slice)
        };
        let cls = head(0, "cls", 1)?;
        let obj = head(1, "obj", 1)?;
        let bbox = head(2, "bbox", 4)?;
        let kps = head(3, "kps", 10)?;

        fused.reserve(cells * OUTPUT_COLS);
        for row in 0..rows {
            for col in 0..cols {
                let idx = row * cols + col;
                let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();

                let b = &bbox[idx * 4..idx * 4 + 4];
                let cx = (col as f32 + b[0]) * stride_f;
                let cy = (row as f32 + b[1]) * stride_f;
                let w = b[2].exp() * stride_f;
                let h = b[3].exp() * stride_f;
                fused.extend_from_slice(&[cx - 0.5 * w, cy - 0.5 * h, w, h]);

                let k = &kps[idx * 10..idx * 10 + 10];
                for lm in 0..5 {
                    fused.push((k[lm * 2] + col as f32) * stride_f);
                    fused.push((k[lm * 2 + 1] + row as f32) * stride_f);
                }

                fused.push(if score.is_finite() { score } else { 0.0 });
            }
        }
    }

    let rows = fused.len() / OUTPUT_COLS;
    Tensor::from_shape(&[rows, OUTPUT_COLS], &fused)
        .map_err(|e| anyhow::anyhow!("failed to build fused YuNet tensor: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn tensor_from_rows(rows: &[[f32; 15]]) -> Tensor {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_shape(&[rows.len(), 15], &flat).unwrap()
    }

    fn row(x: f32, y: f32, w: f32, h: f32, score: f32) -> [f32; 15] {
        let mut r = [0.0; 15];
        r[..4].copy_from_slice(&[x, y, w, h]);
        r[14] = score;
        r
    }

    #[test]
    fn rows_are_filtered_scaled_and_sorted() {
        let tensor = tensor_from_rows(&[
            row(10.0, 20.0, 30.0, 40.0, 0.6),
            row(5.0, 5.0, 10.0, 10.0, 0.1),
            row(1.0, 1.0, 2.0, 2.0, 0.95),
            row(1.0, 1.0, 0.0, 2.0, 0.99),
        ]);

        let faces = rows_to_faces(&tensor, Placement::scaled(2.0, 0.5)).expect("decode");
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].confidence, 0.95);
        assert_eq!(faces[1].bbox, BoundingBox::new(20.0, 10.0, 60.0, 20.0));
        assert!(faces.iter().all(|f| f.category == Category::Face));
    }

    #[test]
    fn tile_rows_are_offset_into_the_image() {
        let tensor = tensor_from_rows(&[row(10.0, 20.0, 30.0, 40.0, 0.8)]);
        let faces = rows_to_faces(&tensor, Placement::offset(640, 320)).expect("decode");
        assert_eq!(faces[0].bbox, BoundingBox::new(650.0, 340.0, 30.0, 40.0));
    }

    #[test]
    fn stride_outputs_decode_to_expected_row_count() {
        let input = InputSize::new(64, 64);
        let mut heads: [Vec<Tensor>; 4] = Default::default();
        for &stride in STRIDES.iter() {
            let cells = (64 / stride) * (64 / stride);
            heads[0].push(Tensor::from_shape(&[cells], &vec![0.81f32; cells]).unwrap());
            heads[1].push(Tensor::from_shape(&[cells], &vec![1.0f32; cells]).unwrap());
            heads[2].push(Tensor::from_shape(&[cells, 4], &vec![0.0f32; cells * 4]).unwrap());
            heads[3].push(Tensor::from_shape(&[cells, 10], &vec![0.0f32; cells * 10]).unwrap());
        }
        let outputs: Vec<Tensor> = heads.into_iter().flatten().collect();

        let fused = decode_stride_outputs(&outputs, input).expect("decode");
        assert_eq!(fused.shape(), &[64 + 16 + 4, 15]);

        let data = fused.as_slice::<f32>().unwrap();
        // First cell of stride 8: centre (0, 0), exp(0) * 8 = 8px box.
        assert_eq!(&data[..4], &[-4.0, -4.0, 8.0, 8.0]);
        assert!((data[14] - 0.9).abs() < 1e-6);
    }
}
