//! ms-render: the render orchestrator
//!
//! Takes a parsed request, produces a mono WAV through the cached feature
//! pipeline, the stretch schedule, the external vocoder, and the post
//! chain.

pub mod error;
pub mod renderer;
pub mod stats;

pub use error::{RenderError, RenderResult};
pub use renderer::Renderer;
pub use stats::RenderStats;
