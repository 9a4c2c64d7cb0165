//! SceneStitch Render Engine
//!
//! Turns a timeline with embedded scene modules into a finished video.
//!
//! # Pipeline Architecture
//!
//! ```text
//! module elements ──► PreRenderer ──► frame stores (PNG per frame)
//!                                          │
//! timeline ──► HostRenderer ──► base ──────┤
//!                                          ▼
//!                     compute_layer_order ─► FrameCompositor (blend + transform)
//!                                          │
//!                                          ▼
//!                                  FrameSink (ffmpeg / PNG sequence)
//! ```

pub mod blend;
pub mod compositor;
pub mod encoder;
pub mod export;
pub mod frame_store;
pub mod host;
pub mod layer;
pub mod prerender;
pub mod rasterizer;

pub use blend::CompositeOp;
pub use compositor::{CompositeFrame, FrameCompositor, MAX_SURFACE_DIMENSION};
pub use encoder::{codec_args_for_format, command_exists, FfmpegSink, FrameSink, ImageSequenceSink};
pub use export::*;
pub use frame_store::{load_frame, FrameStore};
pub use host::{HostRenderer, SolidHostRenderer};
pub use layer::{compute_layer_order, CompositeLayer, LayerSource, LayerTransform};
pub use prerender::{PreRenderOptions, PreRenderProgress, PreRenderResult, PreRenderer};
pub use rasterizer::{select_backend, ModuleRegistry, ModuleRenderer, RasterBackend};
