//! Reframe Media Model
//!
//! Defines the core data contracts for Reframe compositions:
//! - **Time:** Time ranges on the composition timeline (seconds)
//! - **Geometry:** Pixel-space sizes, rectangles, and affine transforms
//! - **Assets:** Immutable handles to probed source media
//! - **Composition:** Tracks of time-ranged segments built from assets
//!
//! All geometry is in source pixels; all times are in seconds.

pub mod asset;
pub mod composition;
pub mod geometry;
pub mod time;

pub use asset::*;
pub use composition::*;
pub use geometry::*;
pub use time::*;
