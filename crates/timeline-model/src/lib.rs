//! SceneStitch Timeline Model
//!
//! Defines the data contracts shared by the analysis and render crates:
//! - **Timeline:** Ordered tracks of time-windowed elements
//! - **Elements:** Host media (video/image/text) and scene-module elements
//! - **Blend modes:** The twelve pixel-compositing modes a layer may use
//! - **Documents:** Timeline plus export settings, persisted as JSON
//!
//! Times are in seconds. Element positions are pixel offsets from the
//! output origin; rotation is in degrees.

pub mod blend;
pub mod document;
pub mod timeline;

pub use blend::*;
pub use document::*;
pub use timeline::*;
