//! Harmonic/noise separator bridge
//!
//! STFT -> complex mask inference -> ISTFT. The model sees the one-sided
//! spectrum packed as `[1, 2, bins, frames]` (`[real | imag]`) and returns
//! a complex mask of the same shape; the mask is multiplied in and the
//! masked spectrum resynthesized to the input length. Any failure along
//! the way degrades to returning the input untouched.

use std::path::Path;

use tract_onnx::prelude::tract_ndarray;

use ms_dsp::stft::{istft, stft};
use ms_dsp::window::hann;
use ms_dsp::simd;

use crate::error::{MlError, MlResult};
use crate::inference::InferenceEngine;

/// STFT size used by the separation model.
const SEP_N_FFT: usize = 2048;

/// Hop size used by the separation model.
const SEP_HOP: usize = 512;

/// Harmonic-component extraction model.
pub struct HarmonicSeparator {
    engine: InferenceEngine,
}

impl HarmonicSeparator {
    pub fn load<P: AsRef<Path>>(model_path: P) -> MlResult<Self> {
        Ok(Self {
            engine: InferenceEngine::load(model_path)?,
        })
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// Extract the harmonic component, same length as the input.
    ///
    /// Inference failures are swallowed: the caller gets a copy of the
    /// input and a warning in the log.
    pub fn separate(&self, samples: &[f32]) -> Vec<f32> {
        match self.try_separate(samples) {
            Ok(harmonic) => harmonic,
            Err(e) => {
                log::warn!("harmonic separation failed, passing input through: {e}");
                samples.to_vec()
            }
        }
    }

    fn try_separate(&self, samples: &[f32]) -> MlResult<Vec<f32>> {
        let window = hann(SEP_N_FFT);
        let mut spec = stft(samples, SEP_N_FFT, SEP_HOP, SEP_N_FFT, &window, true)?;
        let bins = spec.bins;
        let frames = spec.frames;

        // [1, 2, bins, frames]: channel 0 real, channel 1 imag
        let mut packed = Vec::with_capacity(2 * bins * frames);
        packed.extend_from_slice(&spec.re);
        packed.extend_from_slice(&spec.im);
        let input = tract_ndarray::Array4::from_shape_vec((1, 2, bins, frames), packed)
            .map_err(|e| MlError::ProcessingFailed(e.to_string()))?
            .into_dyn();

        let outputs = self.engine.run_f32(vec![input])?;
        let mask = outputs.into_iter().next().ok_or_else(|| {
            MlError::InvalidOutputShape {
                expected: "complex mask tensor".into(),
                got: "no outputs".into(),
            }
        })?;

        let expected_shape = [1, 2, bins, frames];
        if mask.shape() != expected_shape {
            return Err(MlError::InvalidOutputShape {
                expected: format!("{expected_shape:?}"),
                got: format!("{:?}", mask.shape()),
            });
        }

        let mask_flat = mask
            .as_slice()
            .ok_or_else(|| MlError::ProcessingFailed("non-contiguous mask tensor".into()))?;
        let (mask_re, mask_im) = mask_flat.split_at(bins * frames);
        simd::complex_mul_in_place(&mut spec.re, &mut spec.im, mask_re, mask_im);

        let harmonic = istft(
            &spec.re,
            &spec.im,
            bins,
            frames,
            SEP_N_FFT,
            SEP_HOP,
            SEP_N_FFT,
            &window,
            true,
            samples.len(),
        )?;
        Ok(harmonic)
    }
}
