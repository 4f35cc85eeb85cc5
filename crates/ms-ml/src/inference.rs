//! ONNX inference engine
//!
//! Thin wrapper over tract (pure Rust) exposing f32 tensor in/out. Models
//! are optimized once at load and the resulting plan is immutable, so one
//! engine can serve every render worker.

use std::path::Path;

use tract_onnx::prelude::*;

use crate::error::{MlError, MlResult};

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Loaded, optimized ONNX model.
#[derive(Debug)]
pub struct InferenceEngine {
    plan: TractPlan,
    name: String,
}

impl InferenceEngine {
    /// Load and optimize a model from an ONNX file.
    pub fn load<P: AsRef<Path>>(model_path: P) -> MlResult<Self> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(MlError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| MlError::Tract(e.to_string()))?
            .into_optimized()
            .map_err(|e| MlError::Tract(e.to_string()))?
            .into_runnable()
            .map_err(|e| MlError::Tract(e.to_string()))?;

        log::info!("loaded model {} from {}", name, path.display());

        Ok(Self { plan, name })
    }

    /// Model name derived from the file stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run inference over f32 input tensors, returning f32 outputs.
    pub fn run_f32(
        &self,
        inputs: Vec<tract_ndarray::ArrayD<f32>>,
    ) -> MlResult<Vec<tract_ndarray::ArrayD<f32>>> {
        let tract_inputs: TVec<TValue> = inputs
            .into_iter()
            .map(|arr| {
                let tensor: Tensor = arr.into();
                tensor.into()
            })
            .collect();

        let outputs = self
            .plan
            .run(tract_inputs)
            .map_err(|e| MlError::Tract(e.to_string()))?;

        let mut result = Vec::with_capacity(outputs.len());
        for output in outputs.iter() {
            let view = output
                .to_array_view::<f32>()
                .map_err(|e| MlError::Tract(e.to_string()))?;
            result.push(view.to_owned());
        }
        Ok(result)
    }
}
