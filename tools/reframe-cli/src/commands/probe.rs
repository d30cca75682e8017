//! Print the asset model of a source.

use std::path::PathBuf;

use reframe_media_model::AssetProvider;
use reframe_render_engine::ffmpeg::FfprobeAssetProvider;

pub fn run(input: PathBuf) -> anyhow::Result<()> {
    let provider = FfprobeAssetProvider::new();
    let asset = provider
        .load(&input)
        .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", input.display()))?;
    println!("{}", serde_json::to_string_pretty(&asset)?);
    Ok(())
}
