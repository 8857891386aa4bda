use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact, TypedOp, tvec,
};

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A loaded, runnable ONNX graph.
///
/// The graph is optimised when tract can do so; graphs with operators the optimiser
/// rejects fall back to the slower decluttered form rather than failing.
#[derive(Debug)]
pub struct OnnxGraph {
    runnable: RunnableModel,
    path: PathBuf,
}

impl OnnxGraph {
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let runnable = match load_runnable(path, true) {
            Ok(model) => {
                debug!("ONNX graph {} optimized successfully", path.display());
                model
            }
            Err(opt_err) => {
                warn!(
                    "ONNX graph {} failed optimized load ({opt_err:#}); falling back to decluttered graph",
                    path.display()
                );
                load_runnable(path, false).with_context(|| {
                    format!("fallback to decluttered graph failed after optimize error: {opt_err}")
                })?
            }
        };

        Ok(Self {
            runnable,
            path: path.to_path_buf(),
        })
    }

    /// Execute the graph on a single input tensor and return all outputs.
    pub fn run(&self, input: Tensor) -> Result<Vec<Tensor>> {
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| anyhow::anyhow!("execution of {} failed: {e}", self.path.display()))?;
        let tensors: Vec<Tensor> = outputs.into_iter().map(|v| v.into_tensor()).collect();
        anyhow::ensure!(
            !tensors.is_empty(),
            "graph {} produced no outputs",
            self.path.display()
        );
        Ok(tensors)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load_runnable(path: &Path, optimized: bool) -> Result<RunnableModel> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    }
}

/// Rows of a 2-D (or batched 3-D) detection output as a flat slice plus row count.
pub(crate) fn output_rows(output: &Tensor, cols: usize) -> Result<(&[f32], usize)> {
    let rows = match output.shape() {
        [rows, c] if *c == cols => *rows,
        [1, rows, c] if *c == cols => *rows,
        other => anyhow::bail!(
            "detection output must have shape [N, {cols}] or [1, N, {cols}] (got {:?})",
            other
        ),
    };
    let slice = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("detection output is not f32: {e}"))?;
    anyhow::ensure!(
        slice.len() == rows * cols,
        "detection output data is not contiguous"
    );
    Ok((slice, rows))
}
