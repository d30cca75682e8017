//! Compositions: time-aligned tracks assembled from source assets.
//!
//! A [`CompositionBuilder`] is the only mutable view of a composition.
//! Once [`CompositionBuilder::build`] succeeds the resulting
//! [`Composition`] is read-only and can be shared with the render stages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::asset::{Asset, MediaKind};
use crate::geometry::Size;
use crate::time::TimeRange;

/// Caller-assigned track identifier, unique within a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u32);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A time-ranged slice of a source stream placed on the composition timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Source file the media comes from.
    pub source: PathBuf,

    /// Stream index inside the source.
    pub source_track_index: u32,

    /// Portion of the source that is used.
    pub source_range: TimeRange,

    /// Where the segment sits on the composition timeline.
    pub target_range: TimeRange,

    /// Natural size of the source stream (video only).
    pub natural_size: Option<Size>,
}

/// A single media channel within a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub kind: MediaKind,
    /// Segments ordered by timeline start; never overlapping.
    pub segments: Vec<Segment>,
}

impl Track {
    fn new(id: TrackId, kind: MediaKind) -> Self {
        Self {
            id,
            kind,
            segments: vec![],
        }
    }

    /// Range from the first segment start to the last segment end.
    pub fn time_range(&self) -> TimeRange {
        self.segments
            .iter()
            .map(|s| s.target_range)
            .reduce(|acc, r| acc.union(&r))
            .unwrap_or(TimeRange::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segment playing at time `t`, if any.
    pub fn segment_at(&self, t: f64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.target_range.contains(t))
    }
}

/// Errors raised while assembling a composition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompositionError {
    #[error("Track id {id} is already in use")]
    DuplicateTrackId { id: TrackId },

    #[error("Track {id} does not exist in this composition")]
    UnknownTrack { id: TrackId },

    #[error("Track {id} holds {expected} media, cannot insert {found}")]
    TrackKindMismatch {
        id: TrackId,
        expected: MediaKind,
        found: MediaKind,
    },

    #[error("Asset {path} has no {kind} track")]
    NoMatchingTrackInAsset { path: PathBuf, kind: MediaKind },

    #[error("Video track in {path} reports no natural size")]
    MissingNaturalSize { path: PathBuf },

    #[error(
        "Natural size {found_w}x{found_h} conflicts with established {expected_w}x{expected_h}"
    )]
    InconsistentNaturalSize {
        expected_w: f64,
        expected_h: f64,
        found_w: f64,
        found_h: f64,
    },

    #[error("Segment at {start_secs:.3}s overlaps existing media on track {id}")]
    OverlappingSegment { id: TrackId, start_secs: f64 },

    #[error("Insert time {at_secs} is not a valid timeline position")]
    InvalidInsertTime { at_secs: f64 },

    #[error("Composition has no video track with media")]
    NoVideoTrack,
}

/// Mutable build phase of a composition.
#[derive(Debug, Default)]
pub struct CompositionBuilder {
    tracks: Vec<Track>,
    natural_size: Option<Size>,
}

impl CompositionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty track with a caller-supplied id.
    pub fn add_track(&mut self, kind: MediaKind, id: TrackId) -> Result<TrackId, CompositionError> {
        if self.tracks.iter().any(|t| t.id == id) {
            return Err(CompositionError::DuplicateTrackId { id });
        }
        self.tracks.push(Track::new(id, kind));
        tracing::debug!(track = %id, %kind, "Added composition track");
        Ok(id)
    }

    /// Copy the first `kind` track of `asset` into `track` at `at_secs`,
    /// spanning the asset's whole time range.
    ///
    /// Every check runs before the builder is touched, so a failed insert
    /// leaves no partial state behind.
    pub fn insert_segment(
        &mut self,
        track: TrackId,
        asset: &Asset,
        kind: MediaKind,
        at_secs: f64,
    ) -> Result<(), CompositionError> {
        if !at_secs.is_finite() || at_secs < 0.0 {
            return Err(CompositionError::InvalidInsertTime { at_secs });
        }

        let position = self
            .tracks
            .iter()
            .position(|t| t.id == track)
            .ok_or(CompositionError::UnknownTrack { id: track })?;

        let target = &self.tracks[position];
        if target.kind != kind {
            return Err(CompositionError::TrackKindMismatch {
                id: track,
                expected: target.kind,
                found: kind,
            });
        }

        let source_track =
            asset
                .first_track(kind)
                .ok_or_else(|| CompositionError::NoMatchingTrackInAsset {
                    path: asset.source.clone(),
                    kind,
                })?;

        let target_range = asset.time_range.shifted_to(at_secs);
        if target
            .segments
            .iter()
            .any(|s| s.target_range.overlaps(&target_range))
        {
            return Err(CompositionError::OverlappingSegment {
                id: track,
                start_secs: at_secs,
            });
        }

        let natural_size = if kind == MediaKind::Video {
            let size = source_track
                .natural_size
                .filter(|s| !s.is_empty())
                .ok_or_else(|| CompositionError::MissingNaturalSize {
                    path: asset.source.clone(),
                })?;
            if let Some(established) = self.natural_size {
                if !established.approx_eq(&size) {
                    return Err(CompositionError::InconsistentNaturalSize {
                        expected_w: established.width,
                        expected_h: established.height,
                        found_w: size.width,
                        found_h: size.height,
                    });
                }
            }
            Some(size)
        } else {
            None
        };

        let segment = Segment {
            source: asset.source.clone(),
            source_track_index: source_track.index,
            source_range: asset.time_range,
            target_range,
            natural_size,
        };

        if self.natural_size.is_none() {
            self.natural_size = natural_size;
        }
        let segments = &mut self.tracks[position].segments;
        let insert_at = segments
            .iter()
            .position(|s| s.target_range.start_secs > at_secs)
            .unwrap_or(segments.len());
        segments.insert(insert_at, segment);

        tracing::debug!(
            track = %track,
            %kind,
            source = %asset.source.display(),
            at_secs,
            duration_secs = asset.duration_secs(),
            "Inserted segment"
        );
        Ok(())
    }

    /// Natural render size established by the inserted video media.
    pub fn natural_size(&self) -> Result<Size, CompositionError> {
        self.natural_size.ok_or(CompositionError::NoVideoTrack)
    }

    /// Tracks added so far.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Finish the build phase.
    pub fn build(self) -> Result<Composition, CompositionError> {
        let natural_size = self.natural_size()?;
        Ok(Composition {
            tracks: self.tracks,
            natural_size,
        })
    }
}

/// An immutable set of time-aligned tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    tracks: Vec<Track>,
    natural_size: Size,
}

impl Composition {
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn tracks_of(&self, kind: MediaKind) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    pub fn natural_size(&self) -> Size {
        self.natural_size
    }

    /// End of the latest segment across all tracks.
    pub fn duration_secs(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.segments.iter())
            .map(|s| s.target_range.end_secs())
            .fold(0.0, f64::max)
    }

    /// The whole composition timeline starting at zero.
    pub fn time_range(&self) -> TimeRange {
        TimeRange::from_duration(self.duration_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetTrack;

    fn asset(path: &str, duration: f64, size: Option<Size>, audio: bool) -> Asset {
        let mut tracks = vec![];
        if let Some(size) = size {
            tracks.push(AssetTrack {
                index: 0,
                kind: MediaKind::Video,
                natural_size: Some(size),
                codec: "h264".to_string(),
            });
        }
        if audio {
            tracks.push(AssetTrack {
                index: tracks.len() as u32,
                kind: MediaKind::Audio,
                natural_size: None,
                codec: "aac".to_string(),
            });
        }
        Asset {
            source: PathBuf::from(path),
            time_range: TimeRange::from_duration(duration),
            tracks,
        }
    }

    #[test]
    fn test_build_single_segment_composition() {
        let source = asset("a.mp4", 8.0, Some(Size::new(1920.0, 1080.0)), true);
        let mut builder = CompositionBuilder::new();
        let video = builder.add_track(MediaKind::Video, TrackId(1)).unwrap();
        let audio = builder.add_track(MediaKind::Audio, TrackId(2)).unwrap();
        builder
            .insert_segment(video, &source, MediaKind::Video, 0.0)
            .unwrap();
        builder
            .insert_segment(audio, &source, MediaKind::Audio, 0.0)
            .unwrap();

        let composition = builder.build().unwrap();
        assert_eq!(composition.natural_size(), Size::new(1920.0, 1080.0));
        assert!((composition.duration_secs() - 8.0).abs() < 1e-9);
        assert_eq!(composition.tracks_of(MediaKind::Audio).count(), 1);
        assert_eq!(
            composition.track(TrackId(2)).unwrap().segments[0].source_track_index,
            1
        );
    }

    #[test]
    fn test_duplicate_track_id_rejected() {
        let mut builder = CompositionBuilder::new();
        builder.add_track(MediaKind::Video, TrackId(7)).unwrap();
        let err = builder.add_track(MediaKind::Audio, TrackId(7)).unwrap_err();
        assert_eq!(err, CompositionError::DuplicateTrackId { id: TrackId(7) });
        assert_eq!(builder.tracks().len(), 1);
    }

    #[test]
    fn test_missing_kind_in_asset_rejected() {
        let silent = asset("silent.mp4", 4.0, Some(Size::new(1280.0, 720.0)), false);
        let mut builder = CompositionBuilder::new();
        let audio = builder.add_track(MediaKind::Audio, TrackId(1)).unwrap();
        let err = builder
            .insert_segment(audio, &silent, MediaKind::Audio, 0.0)
            .unwrap_err();
        assert!(matches!(
            err,
            CompositionError::NoMatchingTrackInAsset {
                kind: MediaKind::Audio,
                ..
            }
        ));
    }

    #[test]
    fn test_inconsistent_natural_size_leaves_builder_untouched() {
        let hd = asset("hd.mp4", 5.0, Some(Size::new(1920.0, 1080.0)), false);
        let sd = asset("sd.mp4", 5.0, Some(Size::new(640.0, 480.0)), false);

        let mut builder = CompositionBuilder::new();
        let first = builder.add_track(MediaKind::Video, TrackId(1)).unwrap();
        let second = builder.add_track(MediaKind::Video, TrackId(2)).unwrap();
        builder
            .insert_segment(first, &hd, MediaKind::Video, 0.0)
            .unwrap();
        let before: Vec<Track> = builder.tracks().to_vec();

        let err = builder
            .insert_segment(second, &sd, MediaKind::Video, 0.0)
            .unwrap_err();
        assert!(matches!(
            err,
            CompositionError::InconsistentNaturalSize { .. }
        ));
        assert_eq!(builder.tracks(), before.as_slice());
        assert_eq!(builder.natural_size().unwrap(), Size::new(1920.0, 1080.0));
    }

    #[test]
    fn test_overlapping_segments_rejected() {
        let clip = asset("clip.mp4", 5.0, Some(Size::new(1920.0, 1080.0)), false);
        let mut builder = CompositionBuilder::new();
        let video = builder.add_track(MediaKind::Video, TrackId(1)).unwrap();
        builder
            .insert_segment(video, &clip, MediaKind::Video, 0.0)
            .unwrap();

        let err = builder
            .insert_segment(video, &clip, MediaKind::Video, 4.0)
            .unwrap_err();
        assert!(matches!(err, CompositionError::OverlappingSegment { .. }));

        // Back-to-back is fine and stays ordered.
        builder
            .insert_segment(video, &clip, MediaKind::Video, 5.0)
            .unwrap();
        let composition = builder.build().unwrap();
        let track = composition.track(video).unwrap();
        assert_eq!(track.segments.len(), 2);
        assert!((track.time_range().end_secs() - 10.0).abs() < 1e-9);
        assert!(track.segment_at(7.0).is_some());
    }

    #[test]
    fn test_kind_mismatch_and_unknown_track() {
        let clip = asset("clip.mp4", 5.0, Some(Size::new(1920.0, 1080.0)), true);
        let mut builder = CompositionBuilder::new();
        let video = builder.add_track(MediaKind::Video, TrackId(1)).unwrap();

        let err = builder
            .insert_segment(video, &clip, MediaKind::Audio, 0.0)
            .unwrap_err();
        assert!(matches!(err, CompositionError::TrackKindMismatch { .. }));

        let err = builder
            .insert_segment(TrackId(9), &clip, MediaKind::Video, 0.0)
            .unwrap_err();
        assert_eq!(err, CompositionError::UnknownTrack { id: TrackId(9) });
    }

    #[test]
    fn test_build_without_video_fails() {
        let mut builder = CompositionBuilder::new();
        builder.add_track(MediaKind::Video, TrackId(1)).unwrap();
        assert_eq!(builder.build().unwrap_err(), CompositionError::NoVideoTrack);
    }
}
