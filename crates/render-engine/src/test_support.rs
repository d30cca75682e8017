//! Fixtures shared by unit tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reframe_framing_core::VerticalLayout;
use reframe_media_model::{
    Asset, AssetTrack, CompositionBuilder, MediaKind, Size, TimeRange, TrackId,
};

use crate::compositor::{BoundComposition, VerticalCompositor};

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// 10 s of 1920x1080 video (stream 0) with audio (stream 1).
pub(crate) fn landscape_asset() -> Asset {
    Asset {
        source: PathBuf::from("clips/landscape.mp4"),
        time_range: TimeRange::from_duration(10.0),
        tracks: vec![
            AssetTrack {
                index: 0,
                kind: MediaKind::Video,
                natural_size: Some(Size::new(1920.0, 1080.0)),
                codec: "h264".to_string(),
            },
            AssetTrack {
                index: 1,
                kind: MediaKind::Audio,
                natural_size: None,
                codec: "aac".to_string(),
            },
        ],
    }
}

/// Backdrop on track 1, slice on track 2, audio on track 3.
pub(crate) fn bound_composition() -> Arc<BoundComposition> {
    let asset = landscape_asset();
    let mut builder = CompositionBuilder::new();
    for id in [TrackId(1), TrackId(2)] {
        builder.add_track(MediaKind::Video, id).unwrap();
        builder
            .insert_segment(id, &asset, MediaKind::Video, 0.0)
            .unwrap();
    }
    builder.add_track(MediaKind::Audio, TrackId(3)).unwrap();
    builder
        .insert_segment(TrackId(3), &asset, MediaKind::Audio, 0.0)
        .unwrap();
    let composition = builder.build().unwrap();

    let layout = VerticalLayout::compute(composition.natural_size()).unwrap();
    let range = composition.time_range();
    let instructions = vec![
        layout.background_instruction(TrackId(1), range).unwrap(),
        layout.foreground_instruction(TrackId(2), range).unwrap(),
    ];
    let bound = VerticalCompositor::default()
        .compose(&layout, Arc::new(composition), instructions)
        .unwrap();
    Arc::new(bound)
}

/// Fresh, empty directory under the system temp dir.
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir()
        .join("reframe-tests")
        .join(format!("{name}-{}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
