//! Export job: an asynchronous, cancellable encode of a bound composition.
//!
//! A job moves `Idle → Exporting → {Completed, Failed, Cancelled}` exactly
//! once. Status, progress and error live together in one `watch` value so
//! readers always see a consistent triple.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};

use reframe_common::config::ExportDefaults;

use crate::compositor::BoundComposition;

/// Lifecycle states of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Idle,
    Exporting,
    Completed,
    Failed,
    Cancelled,
}

impl ExportStatus {
    /// Terminal states are absorbing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Exporting => "exporting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors raised by an export job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    #[error("Export job was already started")]
    AlreadyStarted,

    #[error("Encoding failed: {message}")]
    EncodeFailure { message: String },

    #[error("I/O failure at {path}: {message}")]
    IoFailure { path: PathBuf, message: String },

    #[error("Unsupported format: {message}")]
    UnsupportedFormat { message: String },
}

impl ExportError {
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::EncodeFailure {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: msg.into(),
        }
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp4,
    Mov,
    Webm,
}

impl ContainerFormat {
    /// Canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Webm => "webm",
        }
    }

    /// Whether an output file extension belongs to this container.
    pub fn accepts_extension(self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        match self {
            Self::Mp4 => ext == "mp4" || ext == "m4v",
            Self::Mov => ext == "mov" || ext == "qt",
            Self::Webm => ext == "webm",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContainerFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" | "m4v" => Ok(Self::Mp4),
            "mov" | "qt" | "quicktime" => Ok(Self::Mov),
            "webm" => Ok(Self::Webm),
            other => Err(ExportError::unsupported(format!(
                "unknown container '{other}'"
            ))),
        }
    }
}

/// Encoder quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    Highest,
    High,
    Medium,
    Low,
}

impl fmt::Display for ExportQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportQuality {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest" | "best" => Ok(Self::Highest),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ExportError::unsupported(format!(
                "unknown quality preset '{other}'"
            ))),
        }
    }
}

/// Encoding parameters for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSettings {
    pub container: ContainerFormat,
    pub quality: ExportQuality,
    /// Output frame rate.
    pub fps: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            container: ContainerFormat::Mp4,
            quality: ExportQuality::Highest,
            fps: 30,
        }
    }
}

impl ExportSettings {
    /// Settings from the configured export defaults.
    pub fn from_defaults(defaults: &ExportDefaults) -> Result<Self, ExportError> {
        Ok(Self {
            container: defaults.container.parse()?,
            quality: defaults.quality.parse()?,
            ..Self::default()
        })
    }

    /// Default file name for an export of `source` in this container.
    pub fn output_file_name(&self, source: &Path) -> String {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".to_string());
        format!("{stem}-vertical.{}", self.container.extension())
    }
}

/// Status, progress and error observed together.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub status: ExportStatus,
    /// Fraction in `[0, 1]`, never decreasing.
    pub progress: f64,
    pub error: Option<ExportError>,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self {
            status: ExportStatus::Idle,
            progress: 0.0,
            error: None,
        }
    }
}

/// How an export job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed { output_path: PathBuf },
    Failed(ExportError),
    Cancelled,
}

impl ExportOutcome {
    pub fn status(&self) -> ExportStatus {
        match self {
            Self::Completed { .. } => ExportStatus::Completed,
            Self::Failed(_) => ExportStatus::Failed,
            Self::Cancelled => ExportStatus::Cancelled,
        }
    }
}

/// Everything an engine needs to produce the output file.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub bound: Arc<BoundComposition>,
    pub output_path: PathBuf,
    pub settings: ExportSettings,
}

/// Write side of a job's progress, handed to the engine.
///
/// Reports are clamped to `[0, 1]`; anything at or below the current value
/// is dropped, as is anything after the job left `Exporting`.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    state: Arc<watch::Sender<JobSnapshot>>,
}

impl ProgressReporter {
    pub fn report(&self, progress: f64) {
        if !progress.is_finite() {
            return;
        }
        let progress = progress.clamp(0.0, 1.0);
        self.state.send_if_modified(|snapshot| {
            if snapshot.status != ExportStatus::Exporting || progress <= snapshot.progress {
                return false;
            }
            snapshot.progress = progress;
            true
        });
    }
}

/// Backend that turns a bound composition into an encoded file.
#[async_trait]
pub trait EncodeEngine: Send + Sync {
    /// Engine name.
    fn name(&self) -> &str;

    /// Check if this engine can run on this system.
    fn is_available(&self) -> bool;

    /// Encode `request`, reporting progress as it goes.
    ///
    /// The future may be dropped at any await point when the job is cancelled.
    async fn encode(
        &self,
        request: &EncodeRequest,
        reporter: &ProgressReporter,
    ) -> Result<(), ExportError>;
}

/// Anything the progress monitor can poll.
pub trait ProgressSource: Send + Sync + 'static {
    fn snapshot(&self) -> JobSnapshot;
}

struct JobShared {
    engine: Arc<dyn EncodeEngine>,
    state: Arc<watch::Sender<JobSnapshot>>,
    cancel: watch::Sender<bool>,
    output_path: OnceLock<PathBuf>,
}

/// A single export. Cloning shares the same job.
#[derive(Clone)]
pub struct ExportJob {
    shared: Arc<JobShared>,
}

impl fmt::Debug for ExportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportJob")
            .field("engine", &self.shared.engine.name())
            .field("output_path", &self.shared.output_path.get())
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl ExportJob {
    pub fn new(engine: Arc<dyn EncodeEngine>) -> Self {
        let (state, _) = watch::channel(JobSnapshot::default());
        let (cancel, _) = watch::channel(false);
        Self {
            shared: Arc::new(JobShared {
                engine,
                state: Arc::new(state),
                cancel,
                output_path: OnceLock::new(),
            }),
        }
    }

    /// Begin exporting on the current tokio runtime.
    ///
    /// Returns immediately; the encode runs on a spawned task. A job can be
    /// started once.
    pub fn start(
        &self,
        bound: Arc<BoundComposition>,
        output_path: impl Into<PathBuf>,
        settings: ExportSettings,
    ) -> Result<CompletionHandle, ExportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ExportError::encode(format!("No async runtime to export on: {e}")))?;

        let started = self.shared.state.send_if_modified(|snapshot| {
            if snapshot.status != ExportStatus::Idle {
                return false;
            }
            snapshot.status = ExportStatus::Exporting;
            true
        });
        if !started {
            return Err(ExportError::AlreadyStarted);
        }

        let output_path = output_path.into();
        let _ = self.shared.output_path.set(output_path.clone());

        tracing::info!(
            output = %output_path.display(),
            engine = self.shared.engine.name(),
            container = %settings.container,
            quality = %settings.quality,
            duration_secs = bound.duration_secs(),
            "Starting export"
        );

        let request = EncodeRequest {
            bound,
            output_path,
            settings,
        };
        let (done_tx, done_rx) = oneshot::channel();
        let job = self.clone();
        runtime.spawn(async move {
            let output_path = request.output_path.clone();
            let driver = job.clone();
            // A panicking engine still has to leave the job in `Failed`.
            let result = match tokio::spawn(async move { driver.drive(&request).await }).await {
                Ok(result) => result,
                Err(err) => Err(ExportError::encode(format!("Encode task aborted: {err}"))),
            };
            let outcome = job.finish(result, &output_path);
            let _ = done_tx.send(outcome);
        });

        Ok(CompletionHandle { rx: done_rx })
    }

    /// Stop a running export. Has no effect before `start` or after the job
    /// reached a terminal state.
    pub fn cancel(&self) {
        let cancelled = self.shared.state.send_if_modified(|snapshot| {
            if snapshot.status != ExportStatus::Exporting {
                return false;
            }
            snapshot.status = ExportStatus::Cancelled;
            true
        });
        if cancelled {
            self.shared.cancel.send_replace(true);
            tracing::info!(
                output = ?self.shared.output_path.get(),
                "Export cancelled"
            );
        }
    }

    pub fn status(&self) -> ExportStatus {
        self.shared.state.borrow().status
    }

    pub fn current_progress(&self) -> f64 {
        self.shared.state.borrow().progress
    }

    /// Status, progress and error in one consistent read.
    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.state.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.shared.state.subscribe()
    }

    /// Output path, once started.
    pub fn output_path(&self) -> Option<&Path> {
        self.shared.output_path.get().map(PathBuf::as_path)
    }

    async fn drive(&self, request: &EncodeRequest) -> Result<(), ExportError> {
        prepare_output(&request.output_path, request.settings.container).await?;

        let reporter = ProgressReporter {
            state: Arc::clone(&self.shared.state),
        };
        let cancel = self.shared.cancel.subscribe();

        tokio::select! {
            biased;
            _ = cancellation(cancel) => {
                tracing::debug!("Encode dropped after cancellation");
                Ok(())
            }
            result = self.shared.engine.encode(request, &reporter) => result,
        }
    }

    /// Publish the terminal snapshot, then derive the outcome from it.
    fn finish(&self, result: Result<(), ExportError>, output_path: &Path) -> ExportOutcome {
        self.shared.state.send_if_modified(|snapshot| {
            if snapshot.status != ExportStatus::Exporting {
                return false;
            }
            match &result {
                Ok(()) => {
                    snapshot.status = ExportStatus::Completed;
                    snapshot.progress = 1.0;
                }
                Err(err) => {
                    snapshot.status = ExportStatus::Failed;
                    snapshot.error = Some(err.clone());
                }
            }
            true
        });

        let snapshot = self.snapshot();
        match snapshot.status {
            ExportStatus::Completed => {
                tracing::info!(output = %output_path.display(), "Export completed");
                ExportOutcome::Completed {
                    output_path: output_path.to_path_buf(),
                }
            }
            ExportStatus::Failed => {
                let error = snapshot
                    .error
                    .unwrap_or_else(|| ExportError::encode("export failed without a cause"));
                tracing::error!(output = %output_path.display(), error = %error, "Export failed");
                ExportOutcome::Failed(error)
            }
            // Only a cancel can have moved the job out of `Exporting` first.
            ExportStatus::Cancelled | ExportStatus::Idle | ExportStatus::Exporting => {
                ExportOutcome::Cancelled
            }
        }
    }
}

impl ProgressSource for ExportJob {
    fn snapshot(&self) -> JobSnapshot {
        ExportJob::snapshot(self)
    }
}

/// Resolves once the export job reached a terminal state.
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<ExportOutcome>,
}

impl CompletionHandle {
    /// Wait for the outcome. Delivered exactly once, after the terminal
    /// snapshot is visible.
    pub async fn wait(self) -> ExportOutcome {
        self.rx.await.unwrap_or_else(|_| {
            ExportOutcome::Failed(ExportError::encode(
                "export task ended without reporting an outcome",
            ))
        })
    }
}

async fn cancellation(mut cancel: watch::Receiver<bool>) {
    while !*cancel.borrow_and_update() {
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn prepare_output(path: &Path, container: ContainerFormat) -> Result<(), ExportError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !container.accepts_extension(extension) {
        return Err(ExportError::unsupported(format!(
            "output {} does not match the {container} container",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExportError::IoFailure {
                path: parent.to_path_buf(),
                message: e.to_string(),
            })?;
    }
    Ok(())
}
