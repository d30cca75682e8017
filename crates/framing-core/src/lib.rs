//! Reframe Framing Core: layer instructions and vertical framing
//!
//! Computes how each video track is placed into the output frame over time:
//! - **Instructions:** Ordered, time-ranged transform or crop directives
//! - **Vertical Framing:** Zoomed backdrop fill and centered 9:16 crop
//!
//! This crate is pure computation with no I/O and no platform dependencies.
//! All inputs are data; all outputs are data.

pub mod instruction;
pub mod vertical;

pub use instruction::{Geometry, InstructionEntry, InstructionError, LayerInstruction};
pub use vertical::{LayoutError, VerticalLayout};
