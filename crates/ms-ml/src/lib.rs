//! ms-ml: opaque inference collaborators
//!
//! The vocoder (`mel + f0 -> waveform`) and the harmonic/noise separator
//! (complex mask in the STFT domain) behind a small backend trait, served
//! by tract-onnx.

pub mod backend;
pub mod error;
pub mod hnsep;
pub mod inference;
pub mod vocoder;

pub use backend::{SynthesisBackend, TractBackend};
pub use error::{MlError, MlResult};
pub use hnsep::HarmonicSeparator;
pub use inference::InferenceEngine;
pub use vocoder::Vocoder;
