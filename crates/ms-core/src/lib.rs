//! ms-core: shared configuration, flag model, and UTAU conventions
//!
//! Everything the rest of the workspace agrees on: the sampler config
//! section, the clamped flag record and its cache signature, the UTAU
//! argument/pitch-bend decoding, and the cancellation token threaded
//! through long renders.

pub mod cancel;
pub mod config;
pub mod error;
pub mod flags;
pub mod utau;

pub use cancel::CancelToken;
pub use config::SamplerConfig;
pub use error::{CoreError, CoreResult};
pub use flags::Flags;
pub use utau::{decode_pitch_bend, midi_to_hz, note_to_midi, parse_args, RenderRequest};
