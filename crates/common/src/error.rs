//! Error types shared across SceneStitch crates.

use std::path::PathBuf;

/// Top-level error type for SceneStitch operations.
#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("Composite error: {message}")]
    Composite { message: String },

    #[error("Pre-render error: {message}")]
    PreRender { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using StitchError.
pub type StitchResult<T> = Result<T, StitchError>;

impl StitchError {
    pub fn composite(msg: impl Into<String>) -> Self {
        Self::Composite {
            message: msg.into(),
        }
    }

    pub fn prerender(msg: impl Into<String>) -> Self {
        Self::PreRender {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error represents a user/caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
