//! Utility modules for the Warden engine.

pub mod config;
pub mod logging;

pub use config::{DebugConfig, PolicyConfig, SecurityConfig};
pub use logging::DebugFlags;
