//! Neural vocoder bridge
//!
//! `(mel, f0) -> waveform`. The mel arrives as `num_mels x frames`; the
//! model expects `[1, frames, num_mels]` plus `[1, frames]`, and returns a
//! waveform tensor that is flattened to mono samples.

use std::path::Path;

use tract_onnx::prelude::tract_ndarray;

use ms_dsp::FloatMatrix;

use crate::error::{MlError, MlResult};
use crate::inference::InferenceEngine;

/// Mel-spectrogram-to-waveform model.
pub struct Vocoder {
    engine: InferenceEngine,
}

impl Vocoder {
    pub fn load<P: AsRef<Path>>(model_path: P) -> MlResult<Self> {
        Ok(Self {
            engine: InferenceEngine::load(model_path)?,
        })
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// Synthesize mono samples from a mel spectrogram and an f0 contour.
    ///
    /// `f0` must hold one Hz value per mel frame.
    pub fn synthesize(&self, mel: &FloatMatrix, f0: &[f32]) -> MlResult<Vec<f32>> {
        let mels = mel.rows();
        let frames = mel.cols();
        if f0.len() != frames {
            return Err(MlError::ProcessingFailed(format!(
                "f0 length {} does not match {} mel frames",
                f0.len(),
                frames
            )));
        }

        // [1, frames, mels], transposed from the row-major mel
        let mut mel_buf = Vec::with_capacity(frames * mels);
        for frame in 0..frames {
            for channel in 0..mels {
                mel_buf.push(mel.get(channel, frame));
            }
        }
        let mel_tensor = tract_ndarray::Array3::from_shape_vec((1, frames, mels), mel_buf)
            .map_err(|e| MlError::ProcessingFailed(e.to_string()))?
            .into_dyn();
        let f0_tensor = tract_ndarray::Array2::from_shape_vec((1, frames), f0.to_vec())
            .map_err(|e| MlError::ProcessingFailed(e.to_string()))?
            .into_dyn();

        let outputs = self.engine.run_f32(vec![mel_tensor, f0_tensor])?;
        let waveform = outputs.into_iter().next().ok_or_else(|| {
            MlError::InvalidOutputShape {
                expected: "waveform tensor".into(),
                got: "no outputs".into(),
            }
        })?;

        Ok(waveform.into_iter().collect())
    }
}
