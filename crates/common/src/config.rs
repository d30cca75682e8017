//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Export defaults.
    pub export: ExportDefaults,

    /// Vertical presentation styling.
    #[serde(default)]
    pub vertical: VerticalStyle,

    /// Where finished exports are persisted.
    pub library: LibraryConfig,

    /// Playback hand-off after export.
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Container name ("mp4", "mov", "webm").
    pub container: String,

    /// Quality preset name ("highest", "high", "medium", "low").
    pub quality: String,

    /// Progress poll interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Directory used when no output path is given.
    pub output_dir: PathBuf,
}

/// Styling knobs for the vertical presentation overlays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerticalStyle {
    /// Blur strength applied to the side panels.
    pub blur_strength: f64,

    /// Peak opacity of the side-panel fade gradients.
    pub fade_alpha: f64,

    /// Duration of the panel "clear" transition, in seconds.
    pub transition_secs: f64,

    /// Fraction of the transition already elapsed at time zero.
    pub transition_start_fraction: f64,
}

/// Persistence target for finished exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Library directory; exports are copied here after encoding.
    pub dir: PathBuf,

    /// Whether to persist at all.
    pub enabled: bool,
}

/// Playback hand-off configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Player command; the output path is appended as the last argument.
    pub command: String,

    /// Whether to launch the player after export.
    pub enabled: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reframe=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Append log output to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            export: ExportDefaults::default(),
            vertical: VerticalStyle::default(),
            library: LibraryConfig::default(),
            playback: PlaybackConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            container: "mp4".to_string(),
            quality: "highest".to_string(),
            poll_interval_ms: 1000,
            output_dir: std::env::temp_dir().join("reframe"),
        }
    }
}

impl Default for VerticalStyle {
    fn default() -> Self {
        Self {
            blur_strength: 20.0,
            fade_alpha: 0.5,
            transition_secs: 1.0,
            transition_start_fraction: 0.1,
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            dir: dirs_default_library(),
            enabled: true,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            command: "xdg-open".to_string(),
            enabled: true,
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
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
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
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Progress poll interval as a `Duration`, never zero.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.export.poll_interval_ms.max(1))
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
    base.join("reframe").join("config.json")
}

/// Default library directory.
fn dirs_default_library() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("reframe").join("library")
}
