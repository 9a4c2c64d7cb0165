//! SceneStitch Sequence Analysis
//!
//! Discovers the timing a scene module declares without running it:
//! - **Syntax:** tolerant parser for the module's element-tree source
//! - **Extraction:** Sequence/Transition descriptors with literal or dynamic values
//! - **Structure:** concrete frame layout with cross-fade overlaps
//! - **Service:** content-hash keyed LRU cache around the above

pub mod descriptor;
pub mod extract;
pub mod service;
pub mod structure;
pub mod syntax;

pub use descriptor::{FrameValue, ParsedStructure, SequenceDescriptor, TransitionDescriptor};
pub use extract::extract;
pub use service::{source_hash, AnalysisResult, CacheStats, SequenceAnalysisService};
pub use structure::{to_structure, SequenceStructure, StructureSequence, StructureTransition};
