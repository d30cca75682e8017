//! Time-ranged layer instructions for a single video track.

use reframe_media_model::{AffineTransform, Rect, TimeRange, TrackId};
use serde::{Deserialize, Serialize};

/// How a track's frames are placed into the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    /// Map source pixels through an affine transform.
    Transform(AffineTransform),
    /// Keep only the pixels inside this rectangle, in place.
    Crop(Rect),
}

/// One `(range, geometry)` directive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstructionEntry {
    pub range: TimeRange,
    pub geometry: Geometry,
}

/// Errors raised while assembling instructions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstructionError {
    #[error("Instruction at {start_secs:.3}s overlaps an existing entry for track {track}")]
    OverlappingEntry { track: TrackId, start_secs: f64 },

    #[error("Instruction range for track {track} is empty")]
    EmptyRange { track: TrackId },
}

/// Ordered, non-overlapping directives bound to one video track.
///
/// Coverage may be partial: times with no entry render nothing for the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInstruction {
    track: TrackId,
    entries: Vec<InstructionEntry>,
}

impl LayerInstruction {
    pub fn new(track: TrackId) -> Self {
        Self {
            track,
            entries: vec![],
        }
    }

    /// An instruction with a single entry.
    pub fn single(
        track: TrackId,
        range: TimeRange,
        geometry: Geometry,
    ) -> Result<Self, InstructionError> {
        let mut instruction = Self::new(track);
        instruction.push(range, geometry)?;
        Ok(instruction)
    }

    /// Add an entry, keeping entries ordered by start time.
    pub fn push(&mut self, range: TimeRange, geometry: Geometry) -> Result<(), InstructionError> {
        if range.is_empty() {
            return Err(InstructionError::EmptyRange { track: self.track });
        }
        if self.entries.iter().any(|e| e.range.overlaps(&range)) {
            return Err(InstructionError::OverlappingEntry {
                track: self.track,
                start_secs: range.start_secs,
            });
        }
        let at = self
            .entries
            .iter()
            .position(|e| e.range.start_secs > range.start_secs)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, InstructionEntry { range, geometry });
        Ok(())
    }

    pub fn track(&self) -> TrackId {
        self.track
    }

    pub fn entries(&self) -> &[InstructionEntry] {
        &self.entries
    }

    /// Geometry in effect at time `t`.
    pub fn geometry_at(&self, t: f64) -> Option<&Geometry> {
        self.entries
            .iter()
            .find(|e| e.range.contains(t))
            .map(|e| &e.geometry)
    }

    /// Sub-ranges of `range` that no entry covers.
    pub fn coverage_gaps(&self, range: &TimeRange) -> Vec<TimeRange> {
        let mut gaps = vec![];
        let mut cursor = range.start_secs;
        for entry in &self.entries {
            if entry.range.end_secs() <= cursor {
                continue;
            }
            if entry.range.start_secs >= range.end_secs() {
                break;
            }
            if entry.range.start_secs > cursor {
                gaps.push(TimeRange::new(cursor, entry.range.start_secs - cursor));
            }
            cursor = cursor.max(entry.range.end_secs());
        }
        if cursor < range.end_secs() {
            gaps.push(TimeRange::new(cursor, range.end_secs() - cursor));
        }
        gaps.retain(|g| !g.is_empty());
        gaps
    }

    /// Whether the entries cover `range` without gaps.
    pub fn covers(&self, range: &TimeRange) -> bool {
        self.coverage_gaps(range).is_empty()
    }
}
