use std::path::{Path, PathBuf};

use reframe_framing_core::vertical::{LayoutError, VerticalLayout};
use reframe_framing_core::Geometry;
use reframe_media_model::{
    AssetProvider, CompositionBuilder, InMemoryAssetProvider, MediaKind, Point, Rect, Size,
    TrackId,
};

fn fixture_provider() -> InMemoryAssetProvider {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("sources");

    let mut provider = InMemoryAssetProvider::new();
    for name in ["landscape-1080p.json", "tall-screen-recording.json"] {
        let content =
            std::fs::read_to_string(dir.join(name)).expect("fixture asset should be readable");
        provider
            .insert_json(&content)
            .expect("fixture asset should parse");
    }
    provider
}

#[test]
fn common_source_sizes_produce_expected_crops() {
    let table = [
        ((1920.0, 1080.0), Rect::new(656.0, 0.0, 608.0, 1080.0)),
        ((1280.0, 720.0), Rect::new(438.0, 0.0, 404.0, 720.0)),
        ((3840.0, 2160.0), Rect::new(1313.0, 0.0, 1214.0, 2160.0)),
        ((854.0, 480.0), Rect::new(292.0, 0.0, 270.0, 480.0)),
    ];

    for ((w, h), expected) in table {
        let layout = VerticalLayout::compute(Size::new(w, h)).unwrap();
        assert_eq!(layout.crop_rect(), expected, "crop for {w}x{h}");
    }
}

#[test]
fn landscape_fixture_builds_vertical_instructions() {
    let provider = fixture_provider();
    let asset = provider
        .load(Path::new("fixtures/sources/landscape-1080p.mp4"))
        .unwrap();

    let mut builder = CompositionBuilder::new();
    let background = builder.add_track(MediaKind::Video, TrackId(1)).unwrap();
    let foreground = builder.add_track(MediaKind::Video, TrackId(2)).unwrap();
    builder
        .insert_segment(background, &asset, MediaKind::Video, 0.0)
        .unwrap();
    builder
        .insert_segment(foreground, &asset, MediaKind::Video, 0.0)
        .unwrap();
    let composition = builder.build().unwrap();

    let layout = VerticalLayout::compute(composition.natural_size()).unwrap();
    let range = composition.time_range();
    let bg = layout.background_instruction(background, range).unwrap();
    let fg = layout.foreground_instruction(foreground, range).unwrap();

    assert!(bg.covers(&range));
    assert!(fg.covers(&range));
    match bg.geometry_at(7.0) {
        Some(Geometry::Transform(t)) => {
            let mapped = t.apply(Point::new(960.0, 540.0));
            assert!(mapped.x.abs() < 1e-9 && mapped.y.abs() < 1e-9);
        }
        other => panic!("expected transform, got {other:?}"),
    }
    assert_eq!(
        fg.geometry_at(14.0),
        Some(&Geometry::Crop(Rect::new(656.0, 0.0, 608.0, 1080.0)))
    );
}

#[test]
fn tall_fixture_is_rejected_as_degenerate() {
    let provider = fixture_provider();
    let asset = provider
        .load(Path::new("fixtures/sources/tall-screen-recording.mov"))
        .unwrap();
    let size = asset
        .first_track(MediaKind::Video)
        .and_then(|t| t.natural_size)
        .unwrap();

    let err = VerticalLayout::compute(size).unwrap_err();
    assert!(matches!(err, LayoutError::DegenerateCrop { .. }));
}
