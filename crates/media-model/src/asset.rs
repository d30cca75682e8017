//! Source assets and the provider interface that loads them.
//!
//! An [`Asset`] is an immutable description of a source media file: its
//! total time range and the tracks it carries. The pipeline only reads
//! assets; how they are discovered is left to an injected [`AssetProvider`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::geometry::Size;
use crate::time::TimeRange;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => f.write_str("video"),
            MediaKind::Audio => f.write_str("audio"),
        }
    }
}

/// A single stream inside a source asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetTrack {
    /// Stream index within the source container.
    pub index: u32,

    /// Media kind.
    pub kind: MediaKind,

    /// Untransformed presentation size (video tracks only).
    #[serde(default)]
    pub natural_size: Option<Size>,

    /// Codec name as reported by the prober.
    #[serde(default)]
    pub codec: String,
}

/// Immutable handle to source media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Location of the source file.
    pub source: PathBuf,

    /// Total time range of the asset.
    pub time_range: TimeRange,

    /// Streams in container order.
    pub tracks: Vec<AssetTrack>,
}

impl Asset {
    /// First track of the requested kind, in container order.
    pub fn first_track(&self, kind: MediaKind) -> Option<&AssetTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    /// Total duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.time_range.duration_secs
    }

    pub fn has_kind(&self, kind: MediaKind) -> bool {
        self.first_track(kind).is_some()
    }
}

/// Errors raised while loading assets.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {path}")]
    AssetNotFound { path: PathBuf },

    #[error("Asset unreadable at {path}: {message}")]
    AssetUnreadable { path: PathBuf, message: String },
}

impl AssetError {
    pub fn unreadable(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::AssetUnreadable {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Supplies [`Asset`] handles for source locations.
pub trait AssetProvider: Send + Sync {
    /// Load (probe) the asset at `source`.
    fn load(&self, source: &Path) -> Result<Asset, AssetError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Provider backed by a fixed table of assets.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAssetProvider {
    assets: HashMap<PathBuf, Asset>,
}

impl InMemoryAssetProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset under its own source path.
    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.insert(asset);
        self
    }

    pub fn insert(&mut self, asset: Asset) {
        self.assets.insert(asset.source.clone(), asset);
    }

    /// Parse a JSON asset description (as printed by `reframe probe`).
    pub fn insert_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let asset: Asset = serde_json::from_str(json)?;
        self.insert(asset);
        Ok(())
    }
}

impl AssetProvider for InMemoryAssetProvider {
    fn load(&self, source: &Path) -> Result<Asset, AssetError> {
        self.assets
            .get(source)
            .cloned()
            .ok_or_else(|| AssetError::AssetNotFound {
                path: source.to_path_buf(),
            })
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landscape_asset() -> Asset {
        Asset {
            source: PathBuf::from("clips/landscape.mp4"),
            time_range: TimeRange::from_duration(12.0),
            tracks: vec![
                AssetTrack {
                    index: 0,
                    kind: MediaKind::Audio,
                    natural_size: None,
                    codec: "aac".to_string(),
                },
                AssetTrack {
                    index: 1,
                    kind: MediaKind::Video,
                    natural_size: Some(Size::new(1920.0, 1080.0)),
                    codec: "h264".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_first_track_respects_container_order() {
        let asset = landscape_asset();
        assert_eq!(asset.first_track(MediaKind::Video).unwrap().index, 1);
        assert_eq!(asset.first_track(MediaKind::Audio).unwrap().index, 0);
    }

    #[test]
    fn test_in_memory_provider_reports_missing() {
        let provider = InMemoryAssetProvider::new().with_asset(landscape_asset());
        assert!(provider.load(Path::new("clips/landscape.mp4")).is_ok());

        let err = provider.load(Path::new("clips/missing.mp4")).unwrap_err();
        assert!(matches!(err, AssetError::AssetNotFound { .. }));
    }

    #[test]
    fn test_insert_json_accepts_probe_output() {
        let json = serde_json::to_string(&landscape_asset()).unwrap();
        let mut provider = InMemoryAssetProvider::new();
        provider.insert_json(&json).unwrap();

        let loaded = provider.load(Path::new("clips/landscape.mp4")).unwrap();
        assert_eq!(loaded.tracks.len(), 2);
        assert!(loaded.has_kind(MediaKind::Video));
    }

    #[test]
    fn test_asset_json_defaults_optional_track_fields() {
        let json = r#"{
            "source": "a.mp4",
            "time_range": {"start_secs": 0.0, "duration_secs": 3.0},
            "tracks": [{"index": 0, "kind": "audio"}]
        }"#;
        let asset: Asset = serde_json::from_str(json).unwrap();
        assert!(asset.tracks[0].natural_size.is_none());
        assert_eq!(asset.tracks[0].codec, "");
    }
}
