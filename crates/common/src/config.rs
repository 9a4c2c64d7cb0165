//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sequence analysis settings.
    pub analysis: AnalysisConfig,

    /// Pre-render pass settings.
    pub prerender: PreRenderConfig,

    /// Default export parameters.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Sequence analysis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Duration substituted for dynamic or missing frame counts.
    pub default_duration_frames: u64,

    /// Maximum number of cached analyses before LRU eviction.
    pub max_cache_size: usize,
}

/// Pre-render pass parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreRenderConfig {
    /// Maximum number of frame-render units in flight per element.
    pub concurrency: usize,

    /// Directory under which per-element frame stores are created.
    pub frame_root: PathBuf,

    /// Planning estimate for a single frame render, in milliseconds.
    pub estimated_ms_per_frame: u64,
}

/// Encoder settings shared by every export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Encoder binary name or path.
    pub ffmpeg_binary: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "scenestitch=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_duration_frames: 30,
            max_cache_size: 100,
        }
    }
}

impl Default for PreRenderConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            frame_root: std::env::temp_dir().join("scenestitch-prerender"),
            estimated_ms_per_frame: 40,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("scenestitch").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.analysis.default_duration_frames, 30);
        assert_eq!(config.analysis.max_cache_size, 100);
        assert_eq!(config.prerender.concurrency, 4);
        assert_eq!(config.export.ffmpeg_binary, "ffmpeg");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_config_fills_missing_sections() {
        let config: AppConfig =
            serde_json::from_str(r#"{"analysis": {"max_cache_size": 8}}"#).unwrap();
        assert_eq!(config.analysis.max_cache_size, 8);
        assert_eq!(config.analysis.default_duration_frames, 30);
        assert_eq!(config.export.ffmpeg_binary, "ffmpeg");
    }

    #[test]
    fn test_config_path_ends_with_app_dir() {
        let path = config_file_path();
        assert!(path.ends_with("scenestitch/config.json"));
    }
}
