use glam::Mat4;

use super::{GroupId, NodeId};
use crate::spline::TreeSpline;

/// One placed instance of a group: a branch segment or a leaf.
///
/// Placement fields are derived by the pipeline stages; `locked` nodes
/// keep their hand-edited offset/angle through distribution updates.
/// The `[vert_start, vert_end)` / `[tri_start, tri_end)` ranges mark
/// this node's geometry inside the shared output buffers.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,
    pub group: GroupId,
    pub parent: Option<NodeId>,

    pub seed: i32,
    /// Parametric position along the parent spline, 0..1.
    pub offset: f32,
    /// Placement angle around the parent, degrees, as derived by the
    /// distribution mode.
    pub base_angle: f32,
    /// Effective angle, degrees. Equal to `base_angle` unless the node
    /// is locked with a hand-edited value.
    pub angle: f32,
    /// Tilt away from the parent tangent, degrees.
    pub pitch: f32,
    pub scale: f32,
    pub visible: bool,
    pub locked: bool,
    /// Visibility cutoff for simulated breakage: geometry and children
    /// past this arc-time are culled. 1.0 means unbroken.
    pub break_offset: f32,

    pub matrix: Mat4,
    /// Branch nodes own a spline; leaves and the root node do not.
    pub spline: Option<TreeSpline>,

    pub vert_start: usize,
    pub vert_end: usize,
    pub tri_start: usize,
    pub tri_end: usize,
}

impl TreeNode {
    pub fn new(id: NodeId, group: GroupId, parent: Option<NodeId>) -> Self {
        Self {
            id,
            group,
            parent,
            seed: 0,
            offset: 0.0,
            base_angle: 0.0,
            angle: 0.0,
            pitch: 0.0,
            scale: 1.0,
            visible: true,
            locked: false,
            break_offset: 1.0,
            matrix: Mat4::IDENTITY,
            spline: None,
            vert_start: 0,
            vert_end: 0,
            tri_start: 0,
            tri_end: 0,
        }
    }

    pub fn has_geometry(&self) -> bool {
        self.vert_end > self.vert_start
    }
}
