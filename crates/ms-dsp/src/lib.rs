//! ms-dsp: signal-processing primitives for the sampler
//!
//! ## Core modules
//! - `fft` - radix-2 FFT with cached plans, Bluestein fallback for
//!   arbitrary lengths
//! - `stft` - windowed framing, forward STFT, overlap-add inverse
//! - `matrix` - row-major float matrix with a blocked multiply
//! - `interp` - Akima cubic and linear interpolation
//! - `effects` - growl, loudness normalize, amplitude-from-pitch, peak limit
//! - `simd` - runtime SIMD dispatch for the hot f32 kernels
//! - `window` - cached periodic Hann windows

pub mod effects;
pub mod error;
pub mod fft;
pub mod interp;
pub mod matrix;
pub mod simd;
pub mod stft;
pub mod window;

pub use error::{DspError, DspResult};
pub use interp::AkimaSpline;
pub use matrix::FloatMatrix;
pub use stft::Spectrogram;
