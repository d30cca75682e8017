//! Linear vertical-export pipeline: load, compose, lay out, bind, export,
//! monitor, complete. Each stage returns its own result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reframe_common::config::AppConfig;
use reframe_framing_core::VerticalLayout;
use reframe_media_model::{Asset, AssetProvider, CompositionBuilder, MediaKind, TrackId};

use crate::completion::{CompletionHandler, CompletionReport};
use crate::compositor::{BoundComposition, OverlayStyle, VerticalCompositor};
use crate::error::{PipelineError, PipelineResult};
use crate::export::{CompletionHandle, EncodeEngine, ExportJob, ExportSettings};
use crate::monitor::{MonitorHandle, MonitorSummary, MonitorUpdate, ProgressMonitor};

/// Track holding the zoomed backdrop.
pub const BACKGROUND_TRACK: TrackId = TrackId(1);
/// Track holding the sharp centered slice.
pub const FOREGROUND_TRACK: TrackId = TrackId(2);
/// Track holding the source audio, when present.
pub const AUDIO_TRACK: TrackId = TrackId(3);

/// A source prepared for export.
#[derive(Debug, Clone)]
pub struct PreparedExport {
    pub asset: Asset,
    pub layout: VerticalLayout,
    pub bound: Arc<BoundComposition>,
}

/// Everything the pipeline produced for one successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub completion: CompletionReport,
    pub monitor: MonitorSummary,
}

/// Turns landscape sources into vertical-presentation exports.
pub struct VerticalPipeline {
    provider: Arc<dyn AssetProvider>,
    engine: Arc<dyn EncodeEngine>,
    compositor: VerticalCompositor,
    settings: ExportSettings,
    poll_interval: Duration,
    completion: CompletionHandler,
}

impl std::fmt::Debug for VerticalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerticalPipeline")
            .field("provider", &self.provider.name())
            .field("engine", &self.engine.name())
            .field("settings", &self.settings)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl VerticalPipeline {
    pub fn new(provider: Arc<dyn AssetProvider>, engine: Arc<dyn EncodeEngine>) -> Self {
        Self {
            provider,
            engine,
            compositor: VerticalCompositor::default(),
            settings: ExportSettings::default(),
            poll_interval: Duration::from_secs(1),
            completion: CompletionHandler::default(),
        }
    }

    /// Pipeline configured from `config`: styling, export defaults, poll
    /// interval, library persistence and playback.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn AssetProvider>,
        engine: Arc<dyn EncodeEngine>,
    ) -> PipelineResult<Self> {
        Ok(Self::new(provider, engine)
            .with_compositor(VerticalCompositor::new(OverlayStyle::from(&config.vertical)))
            .with_settings(ExportSettings::from_defaults(&config.export)?)
            .with_poll_interval(config.poll_interval())
            .with_completion(CompletionHandler::from_config(
                &config.library,
                &config.playback,
            )))
    }

    pub fn with_compositor(mut self, compositor: VerticalCompositor) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn with_settings(mut self, settings: ExportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_completion(mut self, completion: CompletionHandler) -> Self {
        self.completion = completion;
        self
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Load `source` and build the bound composition for it.
    ///
    /// Two video tracks carry the same source (backdrop below, slice above);
    /// the source audio, if any, goes on a third track.
    pub fn prepare(&self, source: &Path) -> PipelineResult<PreparedExport> {
        let asset = self.provider.load(source)?;
        tracing::info!(
            source = %source.display(),
            provider = self.provider.name(),
            duration_secs = asset.duration_secs(),
            tracks = asset.tracks.len(),
            "Loaded source asset"
        );

        let mut builder = CompositionBuilder::new();
        for track in [BACKGROUND_TRACK, FOREGROUND_TRACK] {
            builder.add_track(MediaKind::Video, track)?;
            builder.insert_segment(track, &asset, MediaKind::Video, 0.0)?;
        }
        if asset.has_kind(MediaKind::Audio) {
            builder.add_track(MediaKind::Audio, AUDIO_TRACK)?;
            builder.insert_segment(AUDIO_TRACK, &asset, MediaKind::Audio, 0.0)?;
        }
        let composition = builder.build()?;

        let layout = VerticalLayout::compute(composition.natural_size())?;
        let range = composition.time_range();
        let instructions = vec![
            layout.background_instruction(BACKGROUND_TRACK, range)?,
            layout.foreground_instruction(FOREGROUND_TRACK, range)?,
        ];

        let bound = self
            .compositor
            .compose(&layout, Arc::new(composition), instructions)?;

        Ok(PreparedExport {
            asset,
            layout,
            bound: Arc::new(bound),
        })
    }

    /// Default output location for `source` under `output_dir`.
    pub fn default_output(&self, source: &Path, output_dir: &Path) -> PathBuf {
        output_dir.join(self.settings.output_file_name(source))
    }

    /// Start exporting `prepared` to `output` with a progress monitor attached.
    pub fn start<F>(
        &self,
        prepared: &PreparedExport,
        output: &Path,
        on_progress: F,
    ) -> PipelineResult<RunningExport>
    where
        F: FnMut(MonitorUpdate) + Send + 'static,
    {
        if !self.engine.is_available() {
            return Err(PipelineError::EngineUnavailable {
                name: self.engine.name().to_string(),
            });
        }

        let job = ExportJob::new(Arc::clone(&self.engine));
        let completion = job.start(Arc::clone(&prepared.bound), output, self.settings)?;
        let monitor = ProgressMonitor::new(self.poll_interval).start(job.clone(), on_progress);

        Ok(RunningExport {
            job,
            completion,
            monitor,
            handler: self.completion.clone(),
        })
    }

    /// Prepare, export and complete in one go.
    pub async fn run<F>(
        &self,
        source: &Path,
        output: &Path,
        on_progress: F,
    ) -> PipelineResult<PipelineReport>
    where
        F: FnMut(MonitorUpdate) + Send + 'static,
    {
        let prepared = self.prepare(source)?;
        self.start(&prepared, output, on_progress)?.finish().await
    }
}

/// An export in flight.
#[derive(Debug)]
pub struct RunningExport {
    job: ExportJob,
    completion: CompletionHandle,
    monitor: MonitorHandle,
    handler: CompletionHandler,
}

impl RunningExport {
    pub fn job(&self) -> &ExportJob {
        &self.job
    }

    pub fn cancel(&self) {
        self.job.cancel();
    }

    /// Wait for the job, let the monitor observe the terminal state, then
    /// run completion handling.
    pub async fn finish(self) -> PipelineResult<PipelineReport> {
        let outcome = self.completion.wait().await;
        let monitor = self.monitor.join().await?;
        let completion = self.handler.handle(outcome).await?;
        Ok(PipelineReport {
            completion,
            monitor,
        })
    }
}
