//! Error types shared across Reframe crates.

/// Errors from the collaborators around an export: library persistence,
/// playback and background tasks.
#[derive(Debug, thiserror::Error)]
pub enum ReframeError {
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Playback error: {message}")]
    Playback { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReframeError.
pub type ReframeResult<T> = Result<T, ReframeError>;

impl ReframeError {
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence {
            message: msg.into(),
        }
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback {
            message: msg.into(),
        }
    }
}
