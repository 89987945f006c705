use super::{GroupId, NodeId};
use crate::atlas::Rect;
use crate::curve::Curve;
use crate::mesh::{MaterialId, MeshData};

/// How child nodes are placed around/along their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionMode {
    /// Weighted sample along the distribution curve.
    Random,
    /// 180°-step pairing along the parent.
    Alternate,
    /// 90°-step quad pairing.
    Opposite,
    /// N-way clusters per whorl.
    Whorled,
}

/// Placement parameters shared by every group kind.
#[derive(Debug, Clone)]
pub struct DistributionParams {
    /// Authored per-group seed, combined with the root seed.
    pub seed: i32,
    /// Nodes per parent node (scaled by the parent node's scale), ≥ 1.
    pub frequency: f32,
    pub mode: DistributionMode,
    /// Placement weights along the parent for `Random` mode.
    pub curve: Curve,
    /// Extra rotation, degrees per unit offset.
    pub twirl: f32,
    /// Nodes per whorl for `Whorled` mode.
    pub whorled_step: u32,
    /// Peak tilt away from the parent tangent, degrees.
    pub pitch: f32,
    pub pitch_curve: Curve,
    pub scale: f32,
    pub scale_curve: Curve,
}

impl Default for DistributionParams {
    fn default() -> Self {
        Self {
            seed: 1234,
            frequency: 1.0,
            mode: DistributionMode::Random,
            curve: Curve::constant(1.0),
            twirl: 0.0,
            whorled_step: 4,
            pitch: 0.0,
            pitch_curve: Curve::constant(1.0),
            scale: 1.0,
            scale_curve: Curve::constant(1.0),
        }
    }
}

/// Wind animation coefficients packed into the output vertices.
#[derive(Debug, Clone, Copy)]
pub struct AnimationParams {
    pub primary_factor: f32,
    pub secondary_factor: f32,
    pub edge_flutter: f32,
}

impl Default for AnimationParams {
    fn default() -> Self {
        Self {
            primary_factor: 1.0,
            secondary_factor: 1.0,
            edge_flutter: 1.0,
        }
    }
}

/// Root-group parameters: the tree anchor plus the global quality knobs
/// of one generation pass.
#[derive(Debug, Clone)]
pub struct RootParams {
    /// Radius of the ground disc that root-attached branches spread over.
    pub root_spread: f32,
    pub ground_offset: f32,
    /// Rotation of the whole tree around the up axis, degrees.
    pub rotation: f32,
    /// Adaptive LOD quality, 0..1. Scales height and radial sampling.
    pub adaptive_lod_quality: f32,
    /// Quality tier of the externally baked shadow texture.
    pub shadow_texture_quality: u32,
    pub enable_welding: bool,
    pub enable_ao: bool,
    pub ao_density: f32,
    pub enable_material_optimize: bool,
}

impl Default for RootParams {
    fn default() -> Self {
        Self {
            root_spread: 0.0,
            ground_offset: 0.0,
            rotation: 0.0,
            adaptive_lod_quality: 1.0,
            shadow_texture_quality: 1,
            enable_welding: true,
            enable_ao: true,
            ao_density: 1.0,
            enable_material_optimize: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchGeometryMode {
    /// Tube geometry only.
    Branch,
    /// Tube plus frond ribbons.
    BranchFrond,
    /// Frond ribbons only.
    Frond,
}

#[derive(Debug, Clone)]
pub struct BranchParams {
    pub geometry_mode: BranchGeometryMode,
    pub material_branch: Option<MaterialId>,
    /// Cross-section material for broken branches; falls back to the
    /// branch material when absent.
    pub material_break: Option<MaterialId>,
    pub material_frond: Option<MaterialId>,

    /// Length range; the node seed picks inside it.
    pub height: (f32, f32),
    pub radius: f32,
    pub radius_curve: Curve,
    /// End-cap roundness: 0 flat fan, 1 hemisphere.
    pub cap_smoothing: f32,

    /// Growth direction wobble along the spline.
    pub crinklyness: f32,
    pub crinkle_curve: Curve,
    /// Blend of the growth direction toward (or away from) world up.
    pub seek_sun: f32,
    pub seek_curve: Curve,

    /// Radial surface noise, as a fraction of the local radius.
    pub noise: f32,
    pub noise_curve: Curve,
    pub noise_scale_u: f32,
    pub noise_scale_v: f32,

    /// Trunk flare near the base, world units at offset 0.
    pub flare_size: f32,
    /// Fraction of the branch length affected by flare.
    pub flare_height: f32,
    pub flare_noise_scale: f32,

    /// Fraction of the branch length welded onto the parent surface.
    pub weld_height: f32,
    pub weld_spread_top: f32,
    pub weld_spread_bottom: f32,

    pub breaking_chance: f32,
    /// Break point range along the branch, min..max.
    pub breaking_spot: (f32, f32),

    pub frond_count: u32,
    pub frond_width: f32,
    pub frond_curve: Curve,
    /// Arc-time range of the spline covered by fronds.
    pub frond_range: (f32, f32),
    /// Fan rotation of the whole frond set, degrees.
    pub frond_rotation: f32,
    /// Fold of each frond blade along its spine, 0..1.
    pub frond_crease: f32,

    pub lod_quality_multiplier: f32,
}

impl Default for BranchParams {
    fn default() -> Self {
        Self {
            geometry_mode: BranchGeometryMode::Branch,
            material_branch: Some(MaterialId(0)),
            material_break: None,
            material_frond: None,
            height: (10.0, 15.0),
            radius: 0.5,
            radius_curve: Curve::linear(1.0, 0.0),
            cap_smoothing: 0.0,
            crinklyness: 0.1,
            crinkle_curve: Curve::constant(1.0),
            seek_sun: 0.0,
            seek_curve: Curve::constant(1.0),
            noise: 0.1,
            noise_curve: Curve::constant(1.0),
            noise_scale_u: 0.2,
            noise_scale_v: 0.1,
            flare_size: 0.0,
            flare_height: 0.1,
            flare_noise_scale: 0.3,
            weld_height: 0.1,
            weld_spread_top: 0.0,
            weld_spread_bottom: 0.0,
            breaking_chance: 0.0,
            breaking_spot: (0.4, 0.6),
            frond_count: 1,
            frond_width: 1.0,
            frond_curve: Curve::ease_in_out(1.0, 0.3),
            frond_range: (0.1, 1.0),
            frond_rotation: 0.0,
            frond_crease: 0.0,
            lod_quality_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafGeometryMode {
    /// One double-sided quad.
    Plane,
    /// Two double-sided quads at 90°.
    Cross,
    /// Three double-sided quads.
    TriCross,
    /// One camera-facing quad; the correction lives in the normals.
    Billboard,
    /// Clone of an externally supplied mesh.
    Mesh,
}

#[derive(Debug, Clone)]
pub struct LeafParams {
    pub geometry_mode: LeafGeometryMode,
    pub material: Option<MaterialId>,
    /// Instance mesh for `Mesh` mode.
    pub instance_mesh: Option<MeshData>,
    /// Leaf size range; the node seed picks inside it.
    pub size: (f32, f32),
    /// Source texture size in texels, used for atlas packing.
    pub texture_size: (f32, f32),
    /// Padded bounding hull of the leaf silhouette inside its texture,
    /// normalized. Card corners warp toward it so non-square art keeps
    /// its silhouette.
    pub hull: Rect,
    /// Blend of the card normal away from the parent surface.
    pub perpendicular_align: f32,
    /// Blend of the card toward facing world up.
    pub horizontal_align: f32,
    /// Roll around the card normal, degrees, min..max.
    pub rotation_range: (f32, f32),
}

impl Default for LeafParams {
    fn default() -> Self {
        Self {
            geometry_mode: LeafGeometryMode::Plane,
            material: Some(MaterialId(1)),
            instance_mesh: None,
            size: (1.0, 1.0),
            texture_size: (128.0, 128.0),
            hull: Rect::new(0.0, 0.0, 1.0, 1.0),
            perpendicular_align: 0.0,
            horizontal_align: 0.0,
            rotation_range: (0.0, 0.0),
        }
    }
}

/// Per-kind payload of a [`TreeGroup`].
#[derive(Debug, Clone)]
pub enum GroupKind {
    Root(RootParams),
    Branch(BranchParams),
    Leaf(LeafParams),
}

/// One generation rule of the parameter tree: owns an ordered list of
/// node ids and the child group ids it recursed into.
#[derive(Debug)]
pub struct TreeGroup {
    pub id: GroupId,
    pub parent: Option<GroupId>,
    pub children: Vec<GroupId>,
    pub nodes: Vec<NodeId>,

    /// Derived: root seed + authored distribution seed.
    pub seed: i32,
    pub visible: bool,
    pub distribution: DistributionParams,
    pub animation: AnimationParams,

    pub kind: GroupKind,
}

impl TreeGroup {
    pub fn new(id: GroupId, parent: Option<GroupId>, kind: GroupKind) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            nodes: Vec::new(),
            seed: 0,
            visible: true,
            distribution: DistributionParams::default(),
            animation: AnimationParams::default(),
            kind,
        }
    }

    pub fn as_branch(&self) -> Option<&BranchParams> {
        match &self.kind {
            GroupKind::Branch(params) => Some(params),
            _ => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafParams> {
        match &self.kind {
            GroupKind::Leaf(params) => Some(params),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, GroupKind::Root(_))
    }
}
