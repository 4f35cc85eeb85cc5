//! Synthesis backend capability
//!
//! The render core talks to inference through this small trait so the
//! orchestrator stays agnostic of the runtime. Production uses tract-backed
//! models; tests plug in deterministic stand-ins.

use ms_dsp::FloatMatrix;

use crate::error::MlResult;
use crate::hnsep::HarmonicSeparator;
use crate::vocoder::Vocoder;

/// External model capability consumed by the renderer.
pub trait SynthesisBackend: Send + Sync {
    /// `(mel, f0) -> waveform`. Failures propagate as render errors.
    fn spec_to_wav(&self, mel: &FloatMatrix, f0: &[f32]) -> MlResult<Vec<f32>>;

    /// Extract the harmonic component. Never fails: implementations fall
    /// back to an untouched copy of the input.
    fn separate_harmonic(&self, samples: &[f32]) -> Vec<f32>;

    /// Whether a separator model is actually available.
    fn has_separator(&self) -> bool;
}

/// Tract-backed production backend.
pub struct TractBackend {
    vocoder: Vocoder,
    separator: Option<HarmonicSeparator>,
}

impl TractBackend {
    pub fn new(vocoder: Vocoder, separator: Option<HarmonicSeparator>) -> Self {
        Self { vocoder, separator }
    }
}

impl SynthesisBackend for TractBackend {
    fn spec_to_wav(&self, mel: &FloatMatrix, f0: &[f32]) -> MlResult<Vec<f32>> {
        self.vocoder.synthesize(mel, f0)
    }

    fn separate_harmonic(&self, samples: &[f32]) -> Vec<f32> {
        match &self.separator {
            Some(separator) => separator.separate(samples),
            None => samples.to_vec(),
        }
    }

    fn has_separator(&self) -> bool {
        self.separator.is_some()
    }
}
