//! Error type for the end-to-end vertical export pipeline.

use reframe_common::error::ReframeError;
use reframe_framing_core::LayoutError;
use reframe_media_model::{AssetError, CompositionError};

use crate::export::ExportError;
use crate::render_tree::RenderTreeError;

/// Any failure between loading a source and handling the export outcome.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Render tree error: {0}")]
    RenderTree(#[from] RenderTreeError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Export was cancelled")]
    Cancelled,

    #[error("Encode engine '{name}' is not available")]
    EngineUnavailable { name: String },

    #[error(transparent)]
    Common(#[from] ReframeError),
}

/// Result type alias using PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_media_model::TrackId;

    #[test]
    fn test_stage_errors_convert() {
        let err: PipelineError = CompositionError::DuplicateTrackId { id: TrackId(2) }.into();
        assert!(matches!(err, PipelineError::Composition(_)));

        let err: PipelineError = ExportError::AlreadyStarted.into();
        assert_eq!(err.to_string(), "Export failed: Export job was already started");

        let err: PipelineError = RenderTreeError::EmptyColorList.into();
        assert!(err.to_string().starts_with("Render tree error"));
    }
}
