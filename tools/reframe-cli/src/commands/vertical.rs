//! Export a vertical presentation of a landscape source.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reframe_common::config::AppConfig;
use reframe_render_engine::ffmpeg::{FfmpegEngine, FfprobeAssetProvider};
use reframe_render_engine::{ContainerFormat, ExportSettings, PipelineError, VerticalPipeline};

pub struct VerticalArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub container: Option<String>,
    pub quality: Option<String>,
    pub fps: Option<u32>,
    pub play: bool,
    pub save: bool,
}

pub async fn run(mut config: AppConfig, args: VerticalArgs) -> anyhow::Result<()> {
    match (&args.container, &args.output) {
        (Some(container), _) => config.export.container = container.clone(),
        (None, Some(output)) => {
            if let Some(container) = container_for(output) {
                config.export.container = container.to_string();
            }
        }
        (None, None) => {}
    }
    if let Some(quality) = &args.quality {
        config.export.quality = quality.clone();
    }
    config.library.enabled &= args.save;
    config.playback.enabled &= args.play;

    let mut pipeline = VerticalPipeline::from_config(
        &config,
        Arc::new(FfprobeAssetProvider::new()),
        Arc::new(FfmpegEngine::new()),
    )?;
    if let Some(fps) = args.fps {
        let settings = ExportSettings {
            fps,
            ..*pipeline.settings()
        };
        pipeline = pipeline.with_settings(settings);
    }

    let output = args
        .output
        .unwrap_or_else(|| pipeline.default_output(&args.input, &config.export.output_dir));

    println!("Exporting vertical presentation of: {}", args.input.display());
    let prepared = pipeline.prepare(&args.input)?;
    let size = prepared.layout.natural_size();
    let crop = prepared.layout.crop_rect();
    println!(
        "  Source: {}x{}, {:.2}s",
        size.width,
        size.height,
        prepared.asset.duration_secs()
    );
    println!(
        "  Slice: {}x{} at x={}",
        crop.width, crop.height, crop.x
    );
    println!(
        "  Format: {} ({})",
        pipeline.settings().container,
        pipeline.settings().quality
    );
    println!("  Output: {}", output.display());

    let running = pipeline.start(&prepared, &output, |update| {
        let eta = update
            .eta
            .map(|d| format!("{:.0}s", d.as_secs_f64()))
            .unwrap_or_else(|| "--".to_string());
        print!(
            "\r  Progress: {:.1}% (ETA: {eta})  ",
            update.progress * 100.0
        );
        let _ = std::io::stdout().flush();
    })?;

    let job = running.job().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling export");
            job.cancel();
        }
    });

    let result = running.finish().await;
    interrupt.abort();

    match result {
        Ok(report) => {
            println!("\nExport complete: {}", report.completion.output_path.display());
            if let Some(saved) = &report.completion.persisted {
                println!("  Saved to library: {}", saved.display());
            }
            Ok(())
        }
        Err(PipelineError::Cancelled) => {
            println!("\nExport cancelled");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Export failed: {e}")),
    }
}

fn container_for(output: &Path) -> Option<ContainerFormat> {
    output.extension()?.to_str()?.parse().ok()
}
