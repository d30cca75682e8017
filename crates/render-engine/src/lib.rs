//! Reframe Render Engine
//!
//! Composites a landscape source into a vertical presentation and exports
//! it as a single encoded file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source.mp4 ── AssetProvider (ffprobe)
//!                     │
//!                     ▼
//!           CompositionBuilder ── backdrop track, slice track, audio
//!                     │
//!                     ▼
//!            VerticalLayout ── zoom transform + 9:16 crop instructions
//!                     │
//!                     ▼
//!          VerticalCompositor ── blur panels + fade gradients, bind
//!                     │
//!                     ▼
//!   ExportJob ─ EncodeEngine (ffmpeg) ◄── ProgressMonitor polls
//!                     │
//!                     ▼
//!          CompletionHandler ── library copy, then playback
//! ```

pub mod completion;
pub mod compositor;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod monitor;
pub mod pipeline;
pub mod render_tree;

#[cfg(test)]
pub(crate) mod test_support;

pub use completion::*;
pub use compositor::*;
pub use error::*;
pub use export::*;
pub use ffmpeg::*;
pub use monitor::*;
pub use pipeline::*;
pub use render_tree::*;
