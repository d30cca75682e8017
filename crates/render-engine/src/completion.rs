//! Completion handling: persist the finished export, then hand it to a player.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;

use reframe_common::config::{LibraryConfig, PlaybackConfig};
use reframe_common::error::{ReframeError, ReframeResult};

use crate::error::PipelineError;
use crate::export::ExportOutcome;

/// Stores a finished export somewhere durable.
#[async_trait]
pub trait PersistenceCollaborator: Send + Sync {
    /// Persist `path`, returning where it ended up.
    async fn save(&self, path: &Path) -> ReframeResult<PathBuf>;
}

/// Starts playback of a finished export without waiting for it.
#[async_trait]
pub trait PlaybackCollaborator: Send + Sync {
    async fn play(&self, path: &Path) -> ReframeResult<()>;
}

/// Copies exports into a library directory under a timestamped name.
#[derive(Debug, Clone)]
pub struct LibraryPersistence {
    dir: PathBuf,
}

impl LibraryPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(&config.dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target_for(&self, path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".to_string());
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let name = match path.extension() {
            Some(ext) => format!("{stem}-{stamp}.{}", ext.to_string_lossy()),
            None => format!("{stem}-{stamp}"),
        };
        self.dir.join(name)
    }
}

#[async_trait]
impl PersistenceCollaborator for LibraryPersistence {
    async fn save(&self, path: &Path) -> ReframeResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ReframeError::persistence(format!(
                "Failed to create library {}: {e}",
                self.dir.display()
            ))
        })?;

        let target = self.target_for(path);
        tokio::fs::copy(path, &target).await.map_err(|e| {
            ReframeError::persistence(format!(
                "Failed to copy {} into library: {e}",
                path.display()
            ))
        })?;

        tracing::info!(
            source = %path.display(),
            target = %target.display(),
            "Export saved to library"
        );
        Ok(target)
    }
}

/// Launches an external player command with the output path as argument.
#[derive(Debug, Clone)]
pub struct CommandPlayback {
    command: String,
}

impl CommandPlayback {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(&config.command)
    }
}

#[async_trait]
impl PlaybackCollaborator for CommandPlayback {
    async fn play(&self, path: &Path) -> ReframeResult<()> {
        let child = tokio::process::Command::new(&self.command)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ReframeError::playback(format!("Failed to launch '{}': {e}", self.command))
            })?;

        tracing::info!(
            command = %self.command,
            pid = ?child.id(),
            output = %path.display(),
            "Playback started"
        );
        Ok(())
    }
}

/// What happened after a successful export.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub output_path: PathBuf,
    /// Library location, when persistence ran and succeeded.
    pub persisted: Option<PathBuf>,
    pub played: bool,
}

/// Routes an export outcome to the persistence and playback collaborators.
#[derive(Clone, Default)]
pub struct CompletionHandler {
    persistence: Option<Arc<dyn PersistenceCollaborator>>,
    playback: Option<Arc<dyn PlaybackCollaborator>>,
}

impl std::fmt::Debug for CompletionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandler")
            .field("persistence", &self.persistence.is_some())
            .field("playback", &self.playback.is_some())
            .finish()
    }
}

impl CompletionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceCollaborator>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_playback(mut self, playback: Arc<dyn PlaybackCollaborator>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Collaborators as enabled in the library and playback config.
    pub fn from_config(library: &LibraryConfig, playback: &PlaybackConfig) -> Self {
        let mut handler = Self::new();
        if library.enabled {
            handler = handler.with_persistence(Arc::new(LibraryPersistence::from_config(library)));
        }
        if playback.enabled {
            handler = handler.with_playback(Arc::new(CommandPlayback::from_config(playback)));
        }
        handler
    }

    /// Handle the end of an export.
    ///
    /// A completed export is persisted and then played; a persistence
    /// failure is logged and does not prevent playback. Failed or cancelled
    /// exports are returned as errors and never played.
    pub async fn handle(&self, outcome: ExportOutcome) -> Result<CompletionReport, PipelineError> {
        let output_path = match outcome {
            ExportOutcome::Completed { output_path } => output_path,
            ExportOutcome::Failed(err) => return Err(PipelineError::Export(err)),
            ExportOutcome::Cancelled => return Err(PipelineError::Cancelled),
        };

        let persisted = match &self.persistence {
            Some(persistence) => match persistence.save(&output_path).await {
                Ok(target) => Some(target),
                Err(err) => {
                    tracing::warn!(
                        output = %output_path.display(),
                        error = %err,
                        "Failed to persist export"
                    );
                    None
                }
            },
            None => None,
        };

        let played = match &self.playback {
            Some(playback) => match playback.play(&output_path).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(
                        output = %output_path.display(),
                        error = %err,
                        "Failed to start playback"
                    );
                    false
                }
            },
            None => false,
        };

        Ok(CompletionReport {
            output_path,
            persisted,
            played,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportError;
    use crate::test_support::scratch_dir;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPersistence {
        fail: bool,
        saved: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl PersistenceCollaborator for RecordingPersistence {
        async fn save(&self, path: &Path) -> ReframeResult<PathBuf> {
            if self.fail {
                return Err(ReframeError::persistence("library is read-only"));
            }
            self.saved.lock().unwrap().push(path.to_path_buf());
            Ok(PathBuf::from("/library").join(path.file_name().unwrap()))
        }
    }

    #[derive(Default)]
    struct RecordingPlayback {
        played: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl PlaybackCollaborator for RecordingPlayback {
        async fn play(&self, path: &Path) -> ReframeResult<()> {
            self.played.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn handler(
        fail_persist: bool,
    ) -> (
        CompletionHandler,
        Arc<RecordingPersistence>,
        Arc<RecordingPlayback>,
    ) {
        let persistence = Arc::new(RecordingPersistence {
            fail: fail_persist,
            ..Default::default()
        });
        let playback = Arc::new(RecordingPlayback::default());
        let handler = CompletionHandler::new()
            .with_persistence(persistence.clone())
            .with_playback(playback.clone());
        (handler, persistence, playback)
    }

    fn completed() -> ExportOutcome {
        ExportOutcome::Completed {
            output_path: PathBuf::from("/tmp/out/talk-vertical.mp4"),
        }
    }

    #[tokio::test]
    async fn test_completed_export_is_saved_then_played() {
        let (handler, persistence, playback) = handler(false);
        let report = handler.handle(completed()).await.unwrap();

        assert_eq!(
            report.persisted,
            Some(PathBuf::from("/library/talk-vertical.mp4"))
        );
        assert!(report.played);
        assert_eq!(persistence.saved.lock().unwrap().len(), 1);
        assert_eq!(
            playback.played.lock().unwrap()[0],
            PathBuf::from("/tmp/out/talk-vertical.mp4")
        );
    }

    #[tokio::test]
    async fn test_persistence_failure_still_plays() {
        let (handler, _, playback) = handler(true);
        let report = handler.handle(completed()).await.unwrap();

        assert_eq!(report.persisted, None);
        assert!(report.played);
        assert_eq!(playback.played.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_export_is_not_played() {
        let (handler, persistence, playback) = handler(false);
        let err = handler
            .handle(ExportOutcome::Failed(ExportError::encode("boom")))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Export(ExportError::EncodeFailure { .. })
        ));
        assert!(persistence.saved.lock().unwrap().is_empty());
        assert!(playback.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_export_is_not_played() {
        let (handler, _, playback) = handler(false);
        let err = handler.handle(ExportOutcome::Cancelled).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(playback.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_without_collaborators() {
        let report = CompletionHandler::new().handle(completed()).await.unwrap();
        assert_eq!(report.persisted, None);
        assert!(!report.played);
    }

    #[tokio::test]
    async fn test_library_persistence_copies_with_timestamp() {
        let dir = scratch_dir("library");
        let source = dir.join("clip-vertical.mp4");
        std::fs::write(&source, b"encoded").unwrap();

        let library = LibraryPersistence::new(dir.join("library"));
        let target = library.save(&source).await.unwrap();

        assert!(target.starts_with(library.dir()));
        let name = target.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("clip-vertical-"));
        assert!(name.ends_with(".mp4"));
        assert_eq!(std::fs::read(&target).unwrap(), b"encoded");
    }

    #[tokio::test]
    async fn test_library_persistence_reports_missing_source() {
        let dir = scratch_dir("library-missing");
        let library = LibraryPersistence::new(dir.join("library"));
        let err = library.save(&dir.join("gone.mp4")).await.unwrap_err();
        assert!(matches!(err, ReframeError::Persistence { .. }));
    }

    #[tokio::test]
    async fn test_missing_player_is_playback_error() {
        let player = CommandPlayback::new("reframe-test-no-such-player");
        let err = player.play(Path::new("/tmp/x.mp4")).await.unwrap_err();
        assert!(matches!(err, ReframeError::Playback { .. }));
    }

    #[test]
    fn test_from_config_respects_enabled_flags() {
        let library = LibraryConfig {
            dir: PathBuf::from("/tmp/lib"),
            enabled: false,
        };
        let playback = PlaybackConfig {
            command: "mpv".to_string(),
            enabled: true,
        };
        let handler = CompletionHandler::from_config(&library, &playback);
        assert!(handler.persistence.is_none());
        assert!(handler.playback.is_some());
    }
}
