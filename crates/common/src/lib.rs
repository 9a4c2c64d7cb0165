//! SceneStitch Common Utilities
//!
//! Shared infrastructure for all SceneStitch crates:
//! - Error types and result aliases
//! - Frame/time conversions and render stopwatches
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
