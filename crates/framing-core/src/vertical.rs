//! Vertical / Social mode framing.
//!
//! Turns a landscape frame into a vertical presentation: the whole frame is
//! zoomed into a backdrop, and a centered 9:16 slice is kept sharp on top.
//! The bands left on either side are covered later by overlay panels.

use reframe_media_model::{AffineTransform, Rect, Size, TimeRange, TrackId};

use crate::instruction::{Geometry, InstructionError, LayerInstruction};

/// Width-to-height ratio of the foreground slice.
pub const VERTICAL_ASPECT: f64 = 9.0 / 16.0;

/// Zoom applied to the backdrop fill.
pub const BACKGROUND_ZOOM: f64 = 2.0;

/// Errors raised while computing vertical framing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("Crop {width}x{height} at x={x} is degenerate for a {source_w}x{source_h} source")]
    DegenerateCrop {
        x: f64,
        width: f64,
        height: f64,
        source_w: f64,
        source_h: f64,
    },

    #[error(transparent)]
    Instruction(#[from] InstructionError),
}

/// Geometry of the vertical presentation for one natural size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalLayout {
    natural_size: Size,
    front_width: f64,
    side_width: f64,
    crop: Rect,
}

impl VerticalLayout {
    /// Compute the layout for a `(W, H)` source.
    ///
    /// `side_width = round((W - H·9/16) / 2)` and the crop keeps
    /// `W - 2·side_width` pixels centered horizontally at full height. A
    /// source no wider than its own 9:16 slice (`H·9/16 >= W`) is rejected.
    pub fn compute(natural_size: Size) -> Result<Self, LayoutError> {
        let Size { width, height } = natural_size;
        let front_width = height * VERTICAL_ASPECT;
        let side_width = ((width - front_width) / 2.0).round();
        let crop = Rect::new(side_width, 0.0, width - 2.0 * side_width, height);

        if front_width >= width || crop.width <= 0.0 || crop.height <= 0.0 {
            return Err(LayoutError::DegenerateCrop {
                x: crop.x,
                width: crop.width,
                height: crop.height,
                source_w: width,
                source_h: height,
            });
        }

        tracing::debug!(
            width,
            height,
            front_width,
            side_width,
            crop_width = crop.width,
            "Computed vertical layout"
        );

        Ok(Self {
            natural_size,
            front_width,
            side_width,
            crop,
        })
    }

    pub fn natural_size(&self) -> Size {
        self.natural_size
    }

    /// Unrounded width of the 9:16 slice (`H·9/16`).
    pub fn front_width(&self) -> f64 {
        self.front_width
    }

    /// Width of each band left of and right of the crop.
    pub fn side_width(&self) -> f64 {
        self.side_width
    }

    /// The sharp foreground region.
    pub fn crop_rect(&self) -> Rect {
        self.crop
    }

    /// `scale(2, 2) ∘ translate(-W/2, -H/2)`: the frame center maps to the origin.
    ///
    /// The zoomed frame therefore covers `(-W, -H, 2W, 2H)`, so only its
    /// bottom-right quadrant lands on the output canvas.
    pub fn background_transform(&self) -> AffineTransform {
        AffineTransform::scale(BACKGROUND_ZOOM, BACKGROUND_ZOOM).translated_by(
            -self.natural_size.width / 2.0,
            -self.natural_size.height / 2.0,
        )
    }

    /// Single-entry transform instruction for the backdrop track.
    pub fn background_instruction(
        &self,
        track: TrackId,
        range: TimeRange,
    ) -> Result<LayerInstruction, LayoutError> {
        Ok(LayerInstruction::single(
            track,
            range,
            Geometry::Transform(self.background_transform()),
        )?)
    }

    /// Single-entry crop instruction for the foreground track.
    pub fn foreground_instruction(
        &self,
        track: TrackId,
        range: TimeRange,
    ) -> Result<LayerInstruction, LayoutError> {
        Ok(LayerInstruction::single(
            track,
            range,
            Geometry::Crop(self.crop),
        )?)
    }

    /// Band left of the crop: `(0, 0, side, H)`.
    pub fn left_panel_frame(&self) -> Rect {
        Rect::new(0.0, 0.0, self.side_width, self.natural_size.height)
    }

    /// Band right of the crop: `(W - side, 0, side, H)`.
    pub fn right_panel_frame(&self) -> Rect {
        Rect::new(
            self.natural_size.width - self.side_width,
            0.0,
            self.side_width,
            self.natural_size.height,
        )
    }

    /// Whether the side bands have any width at all.
    pub fn has_side_bands(&self) -> bool {
        self.side_width > 0.0
    }
}
