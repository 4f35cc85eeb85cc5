//! ms-server: the local HTTP dispatcher
//!
//! JSON-over-HTTP front end for the render pipeline, with a fixed-size
//! worker pool of render permits.

pub mod request;
pub mod server;

pub use request::{FlagsDto, ResampleRequest};
pub use server::{router, run_server, AppState};
