//! Timeline documents and export settings.
//!
//! A document is the unit the CLI and the export engine load: the timeline
//! plus the output parameters it should be rendered with.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::timeline::Timeline;

/// Top-level timeline document (`*.timeline.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineDocument {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Last modified timestamp (ISO 8601).
    pub modified_at: String,

    /// Output parameters.
    #[serde(default)]
    pub settings: ExportSettings,

    /// Editing timeline.
    pub timeline: Timeline,
}

/// Output parameters for an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Output frame rate.
    pub fps: u32,

    /// Container/codec selection.
    pub format: ExportFormat,

    /// Video bitrate in kbps (0 = encoder default).
    pub video_bitrate_kbps: u32,

    /// Background colour behind the bottom-most layer, as `#rrggbb`.
    pub background: String,
}

/// Output video format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    #[serde(rename = "mp4-h264")]
    Mp4H264,
    #[serde(rename = "mp4-h265")]
    Mp4H265,
    Webm,
    Gif,
}

impl ExportFormat {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp4H264 | ExportFormat::Mp4H265 => "mp4",
            ExportFormat::Webm => "webm",
            ExportFormat::Gif => "gif",
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            format: ExportFormat::Mp4H264,
            video_bitrate_kbps: 8000,
            background: "#000000".to_string(),
        }
    }
}

impl ExportSettings {
    /// Frame rate as a float for time arithmetic.
    pub fn fps_f64(&self) -> f64 {
        f64::from(self.fps.max(1))
    }

    /// Parse `background` into RGBA, defaulting to opaque black.
    pub fn background_rgba(&self) -> [u8; 4] {
        parse_hex_color(&self.background).unwrap_or([0, 0, 0, 255])
    }
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(value: &str) -> Option<[u8; 4]> {
    let hex = value.trim().strip_prefix('#')?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0, 0, 0, 255];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            Some(out)
        }
        6 => Some([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            255,
        ]),
        8 => Some([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            channel(&hex[6..8])?,
        ]),
        _ => None,
    }
}

impl TimelineDocument {
    /// Create a new document with default export settings.
    pub fn new(name: impl Into<String>, timeline: Timeline) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            created_at: now.clone(),
            modified_at: now,
            settings: ExportSettings::default(),
            timeline,
        }
    }

    /// Load a document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| DocumentError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let document: Self =
            serde_json::from_str(&json).map_err(|e| DocumentError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        if document.settings.width == 0 || document.settings.height == 0 {
            return Err(DocumentError::ValidationError {
                message: "export resolution must be non-zero".to_string(),
            });
        }

        Ok(document)
    }

    /// Save the document as pretty JSON, updating `modified_at`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocumentError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        self.modified_at = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string_pretty(self).map_err(|e| DocumentError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| DocumentError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors that can occur when loading or saving documents.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid document: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{ElementKind, TimelineElement, Track};

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ff8000"), Some([255, 128, 0, 255]));
        assert_eq!(parse_hex_color("#fff"), Some([255, 255, 255, 255]));
        assert_eq!(parse_hex_color("#00000080"), Some([0, 0, 0, 128]));
        assert_eq!(parse_hex_color("red"), None);
        assert_eq!(parse_hex_color("#12345"), None);
    }

    #[test]
    fn test_format_extension() {
        assert_eq!(ExportFormat::Mp4H265.extension(), "mp4");
        assert_eq!(ExportFormat::Webm.extension(), "webm");
    }

    #[test]
    fn test_document_save_and_load() {
        let dir = std::env::temp_dir().join("scenestitch_test_document");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("demo.timeline.json");

        let mut timeline = Timeline::new();
        timeline.tracks.push(
            Track::new("main").with_element(TimelineElement::new("clip", ElementKind::Video, 0.0, 3.0)),
        );
        let mut document = TimelineDocument::new("Demo", timeline);
        document.settings.fps = 24;
        document.save(&path).unwrap();

        let loaded = TimelineDocument::load(&path).unwrap();
        assert_eq!(loaded.name, "Demo");
        assert_eq!(loaded.settings.fps, 24);
        assert_eq!(loaded.timeline.tracks[0].elements[0].id, "clip");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_zero_resolution() {
        let dir = std::env::temp_dir().join("scenestitch_test_document_zero");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("zero.json");

        let mut document = TimelineDocument::new("Zero", Timeline::new());
        document.settings.width = 0;
        std::fs::write(&path, serde_json::to_string(&document).unwrap()).unwrap();

        assert!(matches!(
            TimelineDocument::load(&path),
            Err(DocumentError::ValidationError { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_settings_fall_back_to_defaults() {
        let json = r#"{
            "version": "1.0",
            "name": "Legacy",
            "created_at": "2024-01-01T00:00:00Z",
            "modified_at": "2024-01-01T00:00:00Z",
            "timeline": {"version": "1.0", "tracks": []}
        }"#;
        let document: TimelineDocument = serde_json::from_str(json).unwrap();
        assert_eq!(document.settings, ExportSettings::default());
        assert_eq!(document.settings.background_rgba(), [0, 0, 0, 255]);
    }
}
