//! Layered render tree: one base video node plus overlay decorations.
//!
//! Nodes are a tagged union so any backend can render them generically.
//! Panels carry an opaque [`EffectHandle`] that only an [`EffectHost`]
//! knows how to realize; the tree itself never looks inside it.

use reframe_media_model::{Rect, Size};
use serde::{Deserialize, Serialize};

/// Identifier of a node within one render tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// RGBA color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    pub fn lerp(a: &Color, b: &Color, t: f64) -> Color {
        let t = t.clamp(0.0, 1.0);
        Color {
            r: a.r + (b.r - a.r) * t,
            g: a.g + (b.g - a.g) * t,
            b: a.b + (b.b - a.b) * t,
            a: a.a + (b.a - a.a) * t,
        }
    }
}

/// A color pinned to a position along the gradient axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub color: Color,
    /// Position along the axis, `0.0` at the start edge, `1.0` at the end edge.
    pub position: f64,
}

impl ColorStop {
    pub fn new(color: Color, position: f64) -> Self {
        Self { color, position }
    }
}

/// Axis a gradient runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientDirection {
    /// Position 0 at the left edge, 1 at the right edge.
    Horizontal,
    /// Position 0 at the top edge, 1 at the bottom edge.
    Vertical,
}

/// A linear gradient defined by ordered color stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    direction: GradientDirection,
    stops: Vec<ColorStop>,
}

impl Gradient {
    /// Validate and build a gradient. Stops must be non-empty, inside
    /// `[0, 1]`, and in non-decreasing position order.
    pub fn new(
        direction: GradientDirection,
        stops: Vec<ColorStop>,
    ) -> Result<Self, RenderTreeError> {
        if stops.is_empty() {
            return Err(RenderTreeError::EmptyColorList);
        }
        let mut last = 0.0;
        for stop in &stops {
            if !(0.0..=1.0).contains(&stop.position) || stop.position < last {
                return Err(RenderTreeError::InvalidStopPosition {
                    position: stop.position,
                });
            }
            last = stop.position;
        }
        Ok(Self { direction, stops })
    }

    pub fn direction(&self) -> GradientDirection {
        self.direction
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Interpolated color at `position`; values outside the stops hold the
    /// nearest stop color.
    pub fn color_at(&self, position: f64) -> Color {
        let first = &self.stops[0];
        if position <= first.position {
            return first.color;
        }
        for pair in self.stops.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if position <= b.position {
                let span = b.position - a.position;
                if span <= f64::EPSILON {
                    return b.color;
                }
                return Color::lerp(&a.color, &b.color, (position - a.position) / span);
            }
        }
        self.stops[self.stops.len() - 1].color
    }
}

/// Opaque handle to a visual decoration provided by an effect host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectHandle {
    pub name: String,
    pub strength: f64,
}

impl EffectHandle {
    pub fn new(name: impl Into<String>, strength: f64) -> Self {
        Self {
            name: name.into(),
            strength,
        }
    }

    /// The default panel decoration.
    pub fn blur(strength: f64) -> Self {
        Self::new("blur", strength)
    }
}

/// End state a timed transition animates toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTarget {
    /// The decoration fades out.
    Cleared,
    /// The decoration fades in.
    Applied,
}

/// A decoration transition over composition time.
///
/// `start_fraction` of the transition has already elapsed at time zero, so
/// the decoration starts partially transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedTransition {
    pub target: TransitionTarget,
    pub duration_secs: f64,
    pub start_fraction: f64,
}

impl TimedTransition {
    pub fn toward_cleared(duration_secs: f64, start_fraction: f64) -> Self {
        Self {
            target: TransitionTarget::Cleared,
            duration_secs,
            start_fraction,
        }
    }

    /// Transition progress in `[0, 1]` at time `t`.
    pub fn progress_at(&self, t: f64) -> f64 {
        if self.duration_secs <= 0.0 {
            return 1.0;
        }
        (self.start_fraction + t.max(0.0) / self.duration_secs).clamp(0.0, 1.0)
    }

    /// Decoration intensity in `[0, 1]` at time `t`.
    pub fn effect_intensity_at(&self, t: f64) -> f64 {
        match self.target {
            TransitionTarget::Cleared => 1.0 - self.progress_at(t),
            TransitionTarget::Applied => self.progress_at(t),
        }
    }

    /// Time at which the transition finishes.
    pub fn end_secs(&self) -> f64 {
        ((1.0 - self.start_fraction) * self.duration_secs).max(0.0)
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// The rendered composition output.
    Video,
    /// A region carrying a decoration, optionally animated.
    Panel {
        effect: EffectHandle,
        transition: Option<TimedTransition>,
    },
    /// A static gradient fill.
    Gradient(Gradient),
}

/// A node with its frame in output pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderNode {
    pub id: NodeId,
    pub name: String,
    pub frame: Rect,
    pub kind: NodeKind,
    /// Children are drawn above their parent, in order.
    pub children: Vec<RenderNode>,
}

impl RenderNode {
    fn find(&self, id: NodeId) -> Option<&RenderNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn find_mut(&mut self, id: NodeId) -> Option<&mut RenderNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a RenderNode>) {
        out.push(self);
        for child in &self.children {
            child.collect(out);
        }
    }
}

/// Errors raised while building or binding a render tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderTreeError {
    #[error("Gradient requires at least one color stop")]
    EmptyColorList,

    #[error("Gradient stop position {position} is out of range or out of order")]
    InvalidStopPosition { position: f64 },

    #[error("Render node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("Render tree is {tree_w}x{tree_h} but the composition renders {comp_w}x{comp_h}")]
    SizeMismatch {
        tree_w: f64,
        tree_h: f64,
        comp_w: f64,
        comp_h: f64,
    },

    #[error("Instruction targets track {track} which is not a video track of the composition")]
    InstructionTrackMissing { track: reframe_media_model::TrackId },
}

/// Base video node plus overlays, drawn bottom to top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderTree {
    size: Size,
    video: RenderNode,
    overlays: Vec<RenderNode>,
    next_id: u32,
}

impl RenderTree {
    /// A tree with only the base video node, covering the full frame.
    pub fn new(size: Size) -> Self {
        Self {
            size,
            video: RenderNode {
                id: NodeId(0),
                name: "video".to_string(),
                frame: Rect::from_size(size),
                kind: NodeKind::Video,
                children: vec![],
            },
            overlays: vec![],
            next_id: 1,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn video(&self) -> &RenderNode {
        &self.video
    }

    /// Top-level overlays in draw order.
    pub fn overlays(&self) -> &[RenderNode] {
        &self.overlays
    }

    /// All overlay nodes, depth-first in draw order.
    pub fn overlay_nodes(&self) -> Vec<&RenderNode> {
        let mut out = vec![];
        for overlay in &self.overlays {
            overlay.collect(&mut out);
        }
        out
    }

    pub fn node(&self, id: NodeId) -> Option<&RenderNode> {
        if id == self.video.id {
            return Some(&self.video);
        }
        self.overlays.iter().find_map(|o| o.find(id))
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a decorated panel as a top-level overlay.
    pub fn add_panel(
        &mut self,
        name: impl Into<String>,
        frame: Rect,
        effect: EffectHandle,
        transition: Option<TimedTransition>,
    ) -> NodeId {
        let id = self.allocate_id();
        self.overlays.push(RenderNode {
            id,
            name: name.into(),
            frame,
            kind: NodeKind::Panel { effect, transition },
            children: vec![],
        });
        id
    }

    /// Add a gradient overlay, either top-level or above `parent`.
    ///
    /// Nothing is registered unless the gradient and parent are valid.
    pub fn add_gradient(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
        frame: Rect,
        direction: GradientDirection,
        stops: Vec<ColorStop>,
    ) -> Result<NodeId, RenderTreeError> {
        let gradient = Gradient::new(direction, stops)?;
        if let Some(parent_id) = parent {
            if parent_id == self.video.id || self.node(parent_id).is_none() {
                return Err(RenderTreeError::UnknownNode(parent_id));
            }
        }

        let id = self.allocate_id();
        let node = RenderNode {
            id,
            name: name.into(),
            frame,
            kind: NodeKind::Gradient(gradient),
            children: vec![],
        };
        match parent {
            Some(parent_id) => {
                let parent_node = self
                    .overlays
                    .iter_mut()
                    .find_map(|o| o.find_mut(parent_id))
                    .ok_or(RenderTreeError::UnknownNode(parent_id))?;
                parent_node.children.push(node);
            }
            None => self.overlays.push(node),
        }
        Ok(id)
    }
}

/// Capability that realizes opaque decorations for a rendering backend.
pub trait EffectHost {
    type Output;

    /// Apply `effect` at full intensity over `region`.
    fn apply(&self, effect: &EffectHandle, region: Rect) -> Self::Output;

    /// Apply `effect` over `region`, fading as `transition` progresses.
    fn transition(
        &self,
        effect: &EffectHandle,
        transition: &TimedTransition,
        region: Rect,
    ) -> Self::Output;
}
