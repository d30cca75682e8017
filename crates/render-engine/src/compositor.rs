//! Render tree compositor: builds the vertical overlay tree and binds it to
//! a composition for export.

use std::sync::Arc;

use reframe_common::config::VerticalStyle;
use reframe_framing_core::{Geometry, LayerInstruction, VerticalLayout};
use reframe_media_model::{Composition, MediaKind, Rect, TrackId};

use crate::render_tree::{
    Color, ColorStop, EffectHandle, GradientDirection, NodeKind, RenderTree, RenderTreeError,
    TimedTransition,
};

/// Styling for the side-panel overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    /// Decoration applied to each side panel.
    pub effect: EffectHandle,
    /// Peak opacity of the fade gradients.
    pub fade_alpha: f64,
    /// Decoration transition toward cleared.
    pub transition: TimedTransition,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            effect: EffectHandle::blur(20.0),
            fade_alpha: 0.5,
            transition: TimedTransition::toward_cleared(1.0, 0.1),
        }
    }
}

impl From<&VerticalStyle> for OverlayStyle {
    fn from(style: &VerticalStyle) -> Self {
        Self {
            effect: EffectHandle::blur(style.blur_strength),
            fade_alpha: style.fade_alpha.clamp(0.0, 1.0),
            transition: TimedTransition::toward_cleared(
                style.transition_secs,
                style.transition_start_fraction.clamp(0.0, 1.0),
            ),
        }
    }
}

/// Left panel: transparent until 0.8, fading to dark at the inner edge.
pub fn left_fade_stops(alpha: f64) -> Vec<ColorStop> {
    vec![
        ColorStop::new(Color::TRANSPARENT, 0.8),
        ColorStop::new(Color::BLACK.with_alpha(alpha), 1.0),
    ]
}

/// Right panel: dark at the inner edge, transparent from 0.2 on.
pub fn right_fade_stops(alpha: f64) -> Vec<ColorStop> {
    vec![
        ColorStop::new(Color::BLACK.with_alpha(alpha), 0.0),
        ColorStop::new(Color::TRANSPARENT, 0.2),
    ]
}

/// Builds render trees for the vertical presentation.
#[derive(Debug, Clone, Default)]
pub struct VerticalCompositor {
    style: OverlayStyle,
}

impl VerticalCompositor {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Base video node plus two decorated side panels with fade gradients.
    ///
    /// Panels are omitted when the layout leaves no side bands.
    pub fn build_render_tree(&self, layout: &VerticalLayout) -> Result<RenderTree, RenderTreeError> {
        let mut tree = RenderTree::new(layout.natural_size());
        if !layout.has_side_bands() {
            tracing::debug!("No side bands, render tree holds only the video node");
            return Ok(tree);
        }

        let panels = [
            (
                "left-panel",
                layout.left_panel_frame(),
                left_fade_stops(self.style.fade_alpha),
            ),
            (
                "right-panel",
                layout.right_panel_frame(),
                right_fade_stops(self.style.fade_alpha),
            ),
        ];

        for (name, frame, stops) in panels {
            let panel = tree.add_panel(
                name,
                frame,
                self.style.effect.clone(),
                Some(self.style.transition),
            );
            tree.add_gradient(
                Some(panel),
                format!("{name}-fade"),
                frame,
                GradientDirection::Horizontal,
                stops,
            )?;
        }

        tracing::debug!(
            overlays = tree.overlay_nodes().len(),
            side_width = layout.side_width(),
            "Built vertical render tree"
        );
        Ok(tree)
    }

    /// Build the tree for `layout` and bind it to `composition`.
    pub fn compose(
        &self,
        layout: &VerticalLayout,
        composition: Arc<Composition>,
        instructions: Vec<LayerInstruction>,
    ) -> Result<BoundComposition, RenderTreeError> {
        let tree = self.build_render_tree(layout)?;
        bind(tree, composition, instructions)
    }
}

/// Associate a render tree with a composition's rendered output.
///
/// `instructions` are layered bottom to top in the given order.
pub fn bind(
    render_tree: RenderTree,
    composition: Arc<Composition>,
    instructions: Vec<LayerInstruction>,
) -> Result<BoundComposition, RenderTreeError> {
    let natural = composition.natural_size();
    if !render_tree.size().approx_eq(&natural) {
        return Err(RenderTreeError::SizeMismatch {
            tree_w: render_tree.size().width,
            tree_h: render_tree.size().height,
            comp_w: natural.width,
            comp_h: natural.height,
        });
    }

    for instruction in &instructions {
        let is_video_track = composition
            .track(instruction.track())
            .is_some_and(|t| t.kind == MediaKind::Video);
        if !is_video_track {
            return Err(RenderTreeError::InstructionTrackMissing {
                track: instruction.track(),
            });
        }
    }

    Ok(BoundComposition {
        composition,
        render_tree,
        instructions,
    })
}

/// A composition bound to its layer instructions and overlay tree.
///
/// This is what an export job consumes; it is never mutated after binding.
#[derive(Debug, Clone)]
pub struct BoundComposition {
    composition: Arc<Composition>,
    render_tree: RenderTree,
    instructions: Vec<LayerInstruction>,
}

impl BoundComposition {
    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn render_tree(&self) -> &RenderTree {
        &self.render_tree
    }

    /// Layer instructions, bottom to top.
    pub fn instructions(&self) -> &[LayerInstruction] {
        &self.instructions
    }

    pub fn duration_secs(&self) -> f64 {
        self.composition.duration_secs()
    }

    /// What the output frame at time `t` is made of.
    pub fn frame_at(&self, time_secs: f64) -> FrameComposition {
        let layers = self
            .instructions
            .iter()
            .filter_map(|instruction| {
                let track = self.composition.track(instruction.track())?;
                track.segment_at(time_secs)?;
                instruction
                    .geometry_at(time_secs)
                    .map(|geometry| LayerPlacement {
                        track: instruction.track(),
                        geometry: *geometry,
                    })
            })
            .collect();

        let panels = self
            .render_tree
            .overlay_nodes()
            .into_iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Panel { transition, .. } => Some(PanelState {
                    name: node.name.clone(),
                    frame: node.frame,
                    effect_intensity: transition
                        .map(|t| t.effect_intensity_at(time_secs))
                        .unwrap_or(1.0),
                }),
                _ => None,
            })
            .collect();

        FrameComposition {
            time_secs,
            layers,
            panels,
        }
    }
}

/// A single frame's composition, bottom to top.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameComposition {
    /// Time in seconds.
    pub time_secs: f64,

    /// Visible video layers with their geometry.
    pub layers: Vec<LayerPlacement>,

    /// Side panels with their current decoration intensity.
    pub panels: Vec<PanelState>,
}

/// A video track placed into the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerPlacement {
    pub track: TrackId,
    pub geometry: Geometry,
}

/// Decoration state of one panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelState {
    pub name: String,
    pub frame: Rect,
    /// Effect intensity in `[0, 1]`.
    pub effect_intensity: f64,
}
