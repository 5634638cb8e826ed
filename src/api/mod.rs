//! HTTP facade: request extraction, branch normalization, and the
//! always-200 response contract for the voice-assistant integration.

mod handlers;
pub mod server;
mod types;

pub use handlers::ApiState;
