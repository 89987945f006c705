use glam::{Mat4, Quat, Vec3};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{
    branch, leaf, BranchParams, DistributionMode, DistributionParams, GroupKind, NodeId, Tree,
};
use crate::atlas::TextureAtlas;
use crate::curve::Curve;
use crate::mesh::{AoSphere, MaterialId, TreeMesh};
use crate::noise::{FractalNoise, Perlin};
use crate::spline::TreeSpline;

/// Spacing constant folded into per-node seeds.
const NODE_SEED_STEP: i32 = 6733;

/// Snapshot of the root group's global knobs for one pass.
#[derive(Debug, Clone)]
pub(crate) struct GenSettings {
    pub lod_quality: f32,
    pub enable_welding: bool,
    pub enable_ao: bool,
    pub ao_density: f32,
    pub enable_material_optimize: bool,
}

fn gen_settings(tree: &Tree) -> GenSettings {
    match &tree.group(tree.root()).kind {
        GroupKind::Root(params) => GenSettings {
            lod_quality: params.adaptive_lod_quality.clamp(0.0, 1.0),
            enable_welding: params.enable_welding,
            enable_ao: params.enable_ao,
            ao_density: params.ao_density,
            enable_material_optimize: params.enable_material_optimize,
        },
        _ => unreachable!("root group is always GroupKind::Root"),
    }
}

/// Run one full generation pass: frequency → seed → distribution →
/// parameters → matrix → AO → mesh, in that order, into `mesh`.
///
/// The output buffers are cleared and rebuilt wholesale. No stage
/// panics on degenerate parameters; bad groups degrade to empty
/// geometry so their siblings still generate.
pub fn regenerate(tree: &mut Tree, mesh: &mut TreeMesh) {
    log::debug!("regenerate: root seed {}", tree.root_seed());

    update_frequency(tree);
    update_seed(tree);
    update_distribution(tree, true);
    update_parameters(tree);
    update_matrix(tree);

    mesh.clear();
    let spheres = build_ao_spheres(tree);
    update_mesh(tree, &spheres, mesh);

    log::debug!(
        "regenerate: {} vertices, {} triangles, {} materials, {} ao spheres",
        mesh.vertices.len(),
        mesh.triangles.len(),
        mesh.material_count(),
        spheres.len()
    );
}

/* ---------------------------------------------------------------------- */
/*                            stage 1: frequency                           */
/* ---------------------------------------------------------------------- */

/// Resynchronize node counts: `max(1, round(frequency × parent_scale))`
/// nodes per parent node. Idempotent: a no-op update keeps every
/// existing node identity.
pub(crate) fn update_frequency(tree: &mut Tree) {
    for gid in tree.group_order() {
        if tree.group(gid).is_root() {
            // root pinned to exactly one parentless node.
            let nodes = tree.group(gid).nodes.clone();
            for &extra in nodes.iter().skip(1) {
                tree.remove_node(extra);
            }
            tree.group_mut(gid).nodes.truncate(1);
            if tree.group(gid).nodes.is_empty() {
                let nid = tree.alloc_node(gid, None);
                tree.group_mut(gid).nodes.push(nid);
            }
            continue;
        }

        let parent_gid = tree.group(gid).parent.expect("non-root group without parent");
        let parent_nodes = tree.group(parent_gid).nodes.clone();
        let frequency = tree.group(gid).distribution.frequency.max(1.0);

        // bucket existing nodes by their (live) parent node; orphans of
        // removed parents go away.
        let existing = tree.group(gid).nodes.clone();
        let mut buckets: IndexMap<NodeId, Vec<NodeId>> =
            parent_nodes.iter().map(|&p| (p, Vec::new())).collect();
        for nid in existing {
            match tree.node(nid).parent {
                Some(p) if buckets.contains_key(&p) => buckets[&p].push(nid),
                _ => tree.remove_node(nid),
            }
        }

        let mut rebuilt = Vec::new();
        for &pid in &parent_nodes {
            let desired = (frequency * tree.node(pid).scale).round().max(1.0) as usize;
            let bucket = buckets.get_mut(&pid).expect("bucket exists for parent");
            while bucket.len() > desired {
                let nid = bucket.pop().expect("bucket not empty");
                tree.remove_node(nid);
            }
            while bucket.len() < desired {
                bucket.push(tree.alloc_node(gid, Some(pid)));
            }
            rebuilt.extend_from_slice(bucket);
        }
        tree.group_mut(gid).nodes = rebuilt;
    }
}

/* ---------------------------------------------------------------------- */
/*                              stage 2: seed                              */
/* ---------------------------------------------------------------------- */

/// Propagate the root seed: group seed = root seed + authored group
/// seed, node seed = group seed + index × step.
pub(crate) fn update_seed(tree: &mut Tree) {
    let root_seed = tree.root_seed();
    for gid in tree.group_order() {
        let group_seed = root_seed.wrapping_add(tree.group(gid).distribution.seed);
        tree.group_mut(gid).seed = group_seed;

        let nodes = tree.group(gid).nodes.clone();
        for (i, nid) in nodes.into_iter().enumerate() {
            tree.node_mut(nid).seed =
                group_seed.wrapping_add((i as i32).wrapping_mul(NODE_SEED_STEP));
        }
    }
}

/* ---------------------------------------------------------------------- */
/*                          stage 3: distribution                          */
/* ---------------------------------------------------------------------- */

/// Re-derive placement (offset/angle) for unlocked nodes when
/// `complete`, and always recompute the derived per-node state: break
/// offset, visibility, scale and pitch.
pub(crate) fn update_distribution(tree: &mut Tree, complete: bool) {
    for gid in tree.group_order() {
        let group = tree.group(gid);
        let dist = group.distribution.clone();
        let is_root = group.is_root();
        let group_visible = group.visible;
        let breaking = group
            .as_branch()
            .map(|b| (b.breaking_chance, b.breaking_spot));
        let node_ids = group.nodes.clone();
        let count = node_ids.len();

        for (i, nid) in node_ids.into_iter().enumerate() {
            if complete && !is_root && !tree.node(nid).locked {
                let seed = tree.node(nid).seed;
                let (offset, angle) = place(&dist, seed, i, count);
                let node = tree.node_mut(nid);
                node.offset = offset;
                node.base_angle = angle;
                node.angle = angle;
            }

            // break offset is derived state, recomputed every pass.
            let seed = tree.node(nid).seed;
            let break_offset = match breaking {
                Some((chance, spot)) if chance > 0.0 => {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(71) as u64);
                    if rng.random::<f32>() < chance {
                        spot.0 + (spot.1 - spot.0) * rng.random::<f32>()
                    } else {
                        1.0
                    }
                }
                _ => 1.0,
            };

            let offset = tree.node(nid).offset;
            let (parent_visible, parent_break) = match tree.node(nid).parent {
                Some(pid) => {
                    let p = tree.node(pid);
                    (p.visible, p.break_offset)
                }
                None => (true, 1.0),
            };

            let node = tree.node_mut(nid);
            node.break_offset = break_offset;
            node.visible = group_visible && parent_visible && offset <= parent_break;
            node.scale = dist.scale * dist.scale_curve.evaluate(offset);
            node.pitch = dist.pitch * dist.pitch_curve.evaluate(offset);
        }
    }
}

/// Offset/angle for node `i` of `count` under one distribution mode.
fn place(dist: &DistributionParams, seed: i32, i: usize, count: usize) -> (f32, f32) {
    let count = count.max(1);
    let (offset, mut angle) = match dist.mode {
        DistributionMode::Random => {
            let mut rng = StdRng::seed_from_u64(seed as u64);
            let offset = sample_weighted(&dist.curve, rng.random::<f32>());
            let angle = rng.random_range(0.0..360.0);
            (offset, angle)
        }
        DistributionMode::Alternate => {
            let offset = (i + 1) as f32 / count as f32;
            (offset, 180.0 * i as f32)
        }
        DistributionMode::Opposite => {
            let pairs = count.div_ceil(2);
            let pair = i / 2;
            let offset = (pair + 1) as f32 / pairs as f32;
            let angle = (i % 2) as f32 * 180.0 + pair as f32 * 90.0;
            (offset, angle)
        }
        DistributionMode::Whorled => {
            let step = (dist.whorled_step.max(1)) as usize;
            let whorls = count.div_ceil(step);
            let whorl = i / step;
            let k = i % step;
            let offset = (whorl + 1) as f32 / whorls as f32;
            let angle = k as f32 * (360.0 / step as f32);
            (offset, angle)
        }
    };
    angle += dist.twirl * offset;
    (offset.clamp(0.0, 1.0), angle)
}

/// Invert the distribution curve as a density: pick the offset whose
/// cumulative weight matches `u`.
fn sample_weighted(curve: &Curve, u: f32) -> f32 {
    const STEPS: usize = 32;
    let mut cumulative = [0.0f32; STEPS + 1];
    let mut total = 0.0;
    for k in 0..STEPS {
        let t = (k as f32 + 0.5) / STEPS as f32;
        total += curve.evaluate(t).max(0.0);
        cumulative[k + 1] = total;
    }
    if total <= 0.0 {
        // a flat or negative curve degenerates to uniform placement.
        return u.clamp(0.0, 1.0);
    }

    let target = u.clamp(0.0, 1.0) * total;
    let mut k = 0;
    while k < STEPS && cumulative[k + 1] < target {
        k += 1;
    }
    let k = k.min(STEPS - 1);
    let c0 = cumulative[k];
    let c1 = cumulative[k + 1];
    let frac = if c1 > c0 { (target - c0) / (c1 - c0) } else { 0.5 };
    (k as f32 + frac) / STEPS as f32
}

/* ---------------------------------------------------------------------- */
/*                           stage 4: parameters                           */
/* ---------------------------------------------------------------------- */

/// Convert authored group curves into per-node geometry state; for
/// branches that means rebuilding the node spline.
pub(crate) fn update_parameters(tree: &mut Tree) {
    for gid in tree.group_order() {
        let Some(params) = tree.group(gid).as_branch().cloned() else {
            continue;
        };
        let node_ids = tree.group(gid).nodes.clone();
        for nid in node_ids {
            let (seed, scale) = {
                let n = tree.node(nid);
                (n.seed, n.scale)
            };
            let spline = build_branch_spline(&params, seed, scale);
            tree.node_mut(nid).spline = Some(spline);
        }
    }
}

/// Grow a branch spline: a seeded random walk along +Y, wobbled by
/// fractal noise (crinklyness) and blended toward/away from world up
/// (seek sun).
fn build_branch_spline(params: &BranchParams, seed: i32, scale: f32) -> TreeSpline {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(17) as u64);
    let height =
        (params.height.0 + (params.height.1 - params.height.0) * rng.random::<f32>()) * scale;

    let mut spline = TreeSpline::new();
    if height <= f32::EPSILON {
        return spline;
    }

    let fractal = FractalNoise::new(0.9, 2.0, 3.0, Perlin::with_seed(seed));
    let steps = ((height * 0.5).round() as usize).clamp(4, 12);
    let step_len = height / (steps - 1) as f32;

    let mut dir = Vec3::Y;
    let mut pos = Vec3::ZERO;
    spline.add_point(pos, 0.0);

    for s in 1..steps {
        let t = s as f32 / (steps - 1) as f32;

        let crinkle = params.crinklyness * params.crinkle_curve.evaluate(t);
        if crinkle.abs() > 0.0 {
            let ax = fractal.brownian_motion(t * 3.0, 0.37) * crinkle;
            let az = fractal.brownian_motion(0.91, t * 3.0) * crinkle;
            dir = Quat::from_rotation_x(ax) * (Quat::from_rotation_z(az) * dir);
        }

        let seek = params.seek_sun * params.seek_curve.evaluate(t);
        if seek != 0.0 {
            dir = (dir + Vec3::Y * seek).normalize_or(dir);
        }

        pos += dir * step_len;
        spline.add_point(pos, t);
    }

    spline.update_time();
    spline.update_rotations();
    spline
}

/* ---------------------------------------------------------------------- */
/*                             stage 5: matrix                             */
/* ---------------------------------------------------------------------- */

/// World transform per node: the parent spline sample at the node's
/// offset composed with the local angle/pitch, all below the root
/// anchor transform.
pub(crate) fn update_matrix(tree: &mut Tree) {
    for gid in tree.group_order() {
        let leaf_align = tree
            .group(gid)
            .as_leaf()
            .map(|l| (l.perpendicular_align, l.horizontal_align));
        let node_ids = tree.group(gid).nodes.clone();

        for nid in node_ids {
            let (parent, offset, angle, pitch) = {
                let n = tree.node(nid);
                (n.parent, n.offset, n.angle, n.pitch)
            };

            let matrix = match parent {
                None => match &tree.group(gid).kind {
                    GroupKind::Root(root) => {
                        Mat4::from_rotation_y(root.rotation.to_radians())
                            * Mat4::from_translation(Vec3::new(0.0, root.ground_offset, 0.0))
                    }
                    _ => Mat4::IDENTITY,
                },
                Some(pid) => {
                    let parent_node = tree.node(pid);
                    let parent_matrix = parent_node.matrix;

                    let (local_pos, local_rot) = match &parent_node.spline {
                        Some(spline) if spline.node_count() >= 2 => (
                            spline.position_at_time(offset),
                            spline.rotation_at_time(offset),
                        ),
                        _ => {
                            // parent without a spline is the root anchor:
                            // place on the root spread disc instead.
                            let spread = match &tree.group(parent_node.group).kind {
                                GroupKind::Root(root) => root.root_spread,
                                _ => 0.0,
                            };
                            let r = spread * offset;
                            (
                                Quat::from_rotation_y(angle.to_radians())
                                    * Vec3::new(r, 0.0, 0.0),
                                Quat::IDENTITY,
                            )
                        }
                    };

                    let orient = local_rot
                        * Quat::from_rotation_y(angle.to_radians())
                        * Quat::from_rotation_x(pitch.to_radians());
                    parent_matrix * Mat4::from_rotation_translation(orient, local_pos)
                }
            };

            let matrix = match leaf_align {
                Some((perpendicular, horizontal)) => {
                    let mut m = matrix;
                    if perpendicular > 0.0 {
                        if let Some(pid) = parent {
                            let parent_pos = tree.node(pid).matrix.w_axis.truncate();
                            let pos = m.w_axis.truncate();
                            let radial = (pos - parent_pos).normalize_or_zero();
                            if radial != Vec3::ZERO {
                                m = align_axis(m, radial, perpendicular);
                            }
                        }
                    }
                    if horizontal > 0.0 {
                        m = align_axis(m, Vec3::Y, horizontal);
                    }
                    m
                }
                None => matrix,
            };

            tree.node_mut(nid).matrix = matrix;
        }
    }
}

/// Rotate `matrix` about its own origin so its local +Y leans toward
/// `target` by `blend`.
fn align_axis(matrix: Mat4, target: Vec3, blend: f32) -> Mat4 {
    let current = matrix.transform_vector3(Vec3::Y).normalize_or_zero();
    if current == Vec3::ZERO {
        return matrix;
    }
    let pos = matrix.w_axis.truncate();
    let corrective = Quat::IDENTITY.slerp(
        Quat::from_rotation_arc(current, target),
        blend.clamp(0.0, 1.0),
    );
    Mat4::from_translation(pos) * Mat4::from_quat(corrective) * Mat4::from_translation(-pos) * matrix
}

/* ---------------------------------------------------------------------- */
/*                          stage 6: AO and mesh                           */
/* ---------------------------------------------------------------------- */

/// Collect the ambient-occlusion proxy spheres: a run of spheres along
/// every visible branch, one per visible leaf.
pub(crate) fn build_ao_spheres(tree: &Tree) -> Vec<AoSphere> {
    let settings = gen_settings(tree);
    if !settings.enable_ao {
        return Vec::new();
    }

    let mut spheres = Vec::new();
    for gid in tree.group_order() {
        let group = tree.group(gid);
        match &group.kind {
            GroupKind::Branch(params) => {
                for &nid in &group.nodes {
                    let node = tree.node(nid);
                    if !node.visible {
                        continue;
                    }
                    let Some(spline) = &node.spline else { continue };
                    if spline.node_count() < 2 {
                        continue;
                    }
                    const STEPS: usize = 6;
                    for k in 0..=STEPS {
                        let t = k as f32 / STEPS as f32 * node.break_offset;
                        let radius = branch::radius_at(params, node.scale, t);
                        if radius <= 1e-4 {
                            continue;
                        }
                        let pos = node.matrix.transform_point3(spline.position_at_time(t));
                        spheres.push(AoSphere::new(pos, radius * 2.5, 0.6));
                    }
                }
            }
            GroupKind::Leaf(params) => {
                for &nid in &group.nodes {
                    let node = tree.node(nid);
                    if !node.visible {
                        continue;
                    }
                    let size = 0.5 * (params.size.0 + params.size.1) * node.scale;
                    if size <= 1e-4 {
                        continue;
                    }
                    spheres.push(AoSphere::new(node.matrix.w_axis.truncate(), size, 0.5));
                }
            }
            GroupKind::Root(_) => {}
        }
    }
    spheres
}

/// The shared leaf-card atlas of one pass, when material optimization
/// is on: every card material packed into one sheet, all cards sharing
/// one output slot (the first card material stands in for the sheet).
pub(crate) fn build_leaf_atlas(tree: &Tree) -> Option<(TextureAtlas, MaterialId)> {
    if !gen_settings(tree).enable_material_optimize {
        return None;
    }

    let mut atlas = TextureAtlas::new();
    let mut seen: Vec<MaterialId> = Vec::new();
    for group in tree.groups() {
        let Some(params) = group.as_leaf() else { continue };
        if params.geometry_mode == super::LeafGeometryMode::Mesh {
            continue;
        }
        let Some(material) = params.material else { continue };
        if seen.contains(&material) {
            continue;
        }
        seen.push(material);
        atlas.add(
            material,
            glam::Vec2::new(params.texture_size.0, params.texture_size.1),
            false,
        );
    }

    let representative = *seen.first()?;
    match atlas.pack(1024, 1024, 4, true) {
        Ok(()) => Some((atlas, representative)),
        Err(err) => {
            log::warn!("leaf atlas packing failed: {err}");
            None
        }
    }
}

/// Depth-first mesh emission: every group appends its nodes' geometry,
/// then its children follow (they are later in the group order).
pub(crate) fn update_mesh(tree: &mut Tree, spheres: &[AoSphere], mesh: &mut TreeMesh) {
    let settings = gen_settings(tree);
    let perlin = Perlin::with_seed(tree.root_seed());
    let leaf_atlas = build_leaf_atlas(tree);

    enum Tag {
        Root,
        Branch,
        Leaf,
    }

    for gid in tree.group_order() {
        let tag = match &tree.group(gid).kind {
            GroupKind::Root(_) => Tag::Root,
            GroupKind::Branch(_) => Tag::Branch,
            GroupKind::Leaf(_) => Tag::Leaf,
        };
        match tag {
            Tag::Root => {
                // the anchor has no geometry of its own.
                let nodes = tree.group(gid).nodes.clone();
                for nid in nodes {
                    let (v, t) = (mesh.vertices.len(), mesh.triangles.len());
                    let node = tree.node_mut(nid);
                    node.vert_start = v;
                    node.vert_end = v;
                    node.tri_start = t;
                    node.tri_end = t;
                }
            }
            Tag::Branch => branch::update_mesh(tree, gid, &perlin, spheres, &settings, mesh),
            Tag::Leaf => leaf::update_mesh(tree, gid, spheres, &settings, &leaf_atlas, mesh),
        }
    }
}

/* ---------------------------------------------------------------------- */
/*                                  Tests                                  */
/* ---------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::super::{
        BranchGeometryMode, DistributionMode, GroupKind, LeafGeometryMode, LeafParams,
    };
    use super::*;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn quiet_branch() -> BranchParams {
        // no stochastic surface detail, so ring shapes are exact.
        BranchParams {
            noise: 0.0,
            crinklyness: 0.0,
            flare_size: 0.0,
            weld_spread_top: 0.0,
            weld_spread_bottom: 0.0,
            ..BranchParams::default()
        }
    }

    #[test]
    fn single_branch_emits_a_tapering_tube() {
        init_logs();
        let mut tree = Tree::new(1);
        if let GroupKind::Root(root) = &mut tree.group_mut(tree.root()).kind {
            root.root_spread = 5.0;
        }
        let branch = tree.add_branch_group(
            tree.root(),
            BranchParams {
                height: (10.0, 15.0),
                radius: 0.5,
                radius_curve: Curve::linear(1.0, 0.0),
                ..quiet_branch()
            },
        );
        tree.group_mut(branch).distribution.frequency = 1.0;

        let mut mesh = TreeMesh::new();
        regenerate(&mut tree, &mut mesh);

        let nodes = tree.group(branch).nodes.clone();
        assert_eq!(nodes.len(), 1);
        let node = tree.node(nodes[0]);
        assert!(node.vert_end > node.vert_start);
        assert!(node.tri_end > node.tri_start);

        // monotonically decreasing radius curve ⇒ monotonically
        // non-increasing ring radii along the tube. Ring vertices share
        // their uv V (the arc-time).
        let mut rings: IndexMap<u32, Vec<Vec3>> = IndexMap::new();
        for v in &mesh.vertices[node.vert_start..node.vert_end] {
            rings.entry(v.uv0.y.to_bits()).or_default().push(v.position);
        }
        let mut radii = Vec::new();
        for (_, verts) in rings.iter() {
            let centroid = verts.iter().copied().sum::<Vec3>() / verts.len() as f32;
            let radius = verts
                .iter()
                .map(|p| (*p - centroid).length())
                .fold(0.0f32, f32::max);
            radii.push(radius);
        }
        assert!(radii.len() >= 3);
        for pair in radii.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-3, "ring radii grew: {radii:?}");
        }
    }

    #[test]
    fn leaf_plane_frequency_three_emits_three_double_sided_quads() {
        let mut tree = Tree::new(7);
        let branch = tree.add_branch_group(tree.root(), quiet_branch());
        tree.group_mut(branch).distribution.frequency = 1.0;
        let leaves = tree.add_leaf_group(
            branch,
            LeafParams {
                geometry_mode: LeafGeometryMode::Plane,
                size: (1.0, 1.0),
                ..LeafParams::default()
            },
        );
        tree.group_mut(leaves).distribution.frequency = 3.0;

        let mut mesh = TreeMesh::new();
        regenerate(&mut tree, &mut mesh);

        let nodes = tree.group(leaves).nodes.clone();
        assert_eq!(nodes.len(), 3);
        for nid in nodes {
            let node = tree.node(nid);
            assert_eq!(node.vert_end - node.vert_start, 8);
            assert_eq!(node.tri_end - node.tri_start, 4);
        }
    }

    #[test]
    fn breaking_truncates_the_branch() {
        let broken_params = BranchParams {
            height: (12.0, 12.0),
            radius_curve: Curve::constant(1.0),
            breaking_chance: 1.0,
            breaking_spot: (0.3, 0.3),
            ..quiet_branch()
        };
        let whole_params = BranchParams {
            breaking_chance: 0.0,
            ..broken_params.clone()
        };

        let build = |params: BranchParams| {
            let mut tree = Tree::new(5);
            let gid = tree.add_branch_group(tree.root(), params);
            let mut mesh = TreeMesh::new();
            regenerate(&mut tree, &mut mesh);
            let nid = tree.group(gid).nodes[0];
            let node = tree.node(nid).clone();
            let max_y = mesh.vertices[node.vert_start..node.vert_end]
                .iter()
                .map(|v| v.position.y)
                .fold(f32::MIN, f32::max);
            (node, max_y)
        };

        let (broken_node, broken_y) = build(broken_params);
        let (_, whole_y) = build(whole_params);

        assert_eq!(broken_node.break_offset, 0.3);
        assert!(broken_y > 0.0);
        // geometry past the break point is absent.
        assert!(
            broken_y < whole_y * 0.5,
            "broken {broken_y} vs whole {whole_y}"
        );
    }

    #[test]
    fn children_past_the_break_are_invisible() {
        let mut tree = Tree::new(3);
        let trunk = tree.add_branch_group(
            tree.root(),
            BranchParams {
                breaking_chance: 1.0,
                breaking_spot: (0.3, 0.3),
                ..quiet_branch()
            },
        );
        let twigs = tree.add_branch_group(trunk, quiet_branch());
        {
            let dist = &mut tree.group_mut(twigs).distribution;
            dist.frequency = 4.0;
            dist.mode = DistributionMode::Alternate;
        }

        let mut mesh = TreeMesh::new();
        regenerate(&mut tree, &mut mesh);

        // alternate offsets are (i+1)/4; only 0.25 survives a 0.3 break.
        let nodes = tree.group(twigs).nodes.clone();
        assert_eq!(nodes.len(), 4);
        let visible: Vec<_> = nodes.iter().filter(|&&n| tree.node(n).visible).collect();
        assert_eq!(visible.len(), 1);
        for &nid in &nodes {
            let node = tree.node(nid);
            assert_eq!(node.visible, node.has_geometry());
        }
    }

    #[test]
    fn frequency_update_is_idempotent() {
        let mut tree = Tree::new(9);
        let branch = tree.add_branch_group(tree.root(), quiet_branch());
        tree.group_mut(branch).distribution.frequency = 2.4;
        let leaves = tree.add_leaf_group(branch, LeafParams::default());
        tree.group_mut(leaves).distribution.frequency = 5.0;

        update_frequency(&mut tree);
        let first: Vec<_> = tree.group_order()
            .iter()
            .map(|&g| tree.group(g).nodes.clone())
            .collect();

        update_frequency(&mut tree);
        let second: Vec<_> = tree.group_order()
            .iter()
            .map(|&g| tree.group(g).nodes.clone())
            .collect();

        // same counts and the same node identities, no churn.
        assert_eq!(first, second);
        assert_eq!(tree.group(branch).nodes.len(), 2);
    }

    #[test]
    fn whole_regeneration_is_deterministic() {
        init_logs();
        let build = || {
            let mut tree = Tree::new(1234);
            let trunk = tree.add_branch_group(
                tree.root(),
                BranchParams {
                    flare_size: 0.4,
                    noise: 0.15,
                    crinklyness: 0.2,
                    ..BranchParams::default()
                },
            );
            let limbs = tree.add_branch_group(
                trunk,
                BranchParams {
                    height: (4.0, 6.0),
                    radius: 0.2,
                    geometry_mode: BranchGeometryMode::BranchFrond,
                    material_frond: Some(MaterialId(5)),
                    ..BranchParams::default()
                },
            );
            {
                let dist = &mut tree.group_mut(limbs).distribution;
                dist.frequency = 3.0;
                dist.mode = DistributionMode::Whorled;
            }
            let leaves = tree.add_leaf_group(
                limbs,
                LeafParams {
                    geometry_mode: LeafGeometryMode::Cross,
                    rotation_range: (0.0, 180.0),
                    ..LeafParams::default()
                },
            );
            tree.group_mut(leaves).distribution.frequency = 4.0;

            let mut mesh = TreeMesh::new();
            regenerate(&mut tree, &mut mesh);
            mesh
        };

        let a = build();
        let b = build();

        assert!(!a.vertices.is_empty());
        assert_eq!(a.vertices.len(), b.vertices.len());
        let a_bytes: &[u8] = bytemuck::cast_slice(&a.vertices);
        let b_bytes: &[u8] = bytemuck::cast_slice(&b.vertices);
        assert_eq!(a_bytes, b_bytes);
        assert_eq!(a.triangles, b.triangles);
        assert_eq!(a.material_count(), b.material_count());
    }

    #[test]
    fn ao_darkens_crowded_geometry() {
        let build = |ao: bool| {
            let mut tree = Tree::new(11);
            if let GroupKind::Root(root) = &mut tree.group_mut(tree.root()).kind {
                root.enable_ao = ao;
            }
            let trunk = tree.add_branch_group(tree.root(), quiet_branch());
            let leaves = tree.add_leaf_group(trunk, LeafParams::default());
            tree.group_mut(leaves).distribution.frequency = 6.0;
            let mut mesh = TreeMesh::new();
            regenerate(&mut tree, &mut mesh);
            mesh
        };

        let with_ao = build(true);
        let without = build(false);

        assert!(without.vertices.iter().all(|v| v.color.w == 1.0));
        let min_ao = with_ao
            .vertices
            .iter()
            .map(|v| v.color.w)
            .fold(f32::MAX, f32::min);
        assert!(min_ao < 1.0);
    }

    #[test]
    fn distribution_modes_place_inside_the_parent_range() {
        for mode in [
            DistributionMode::Random,
            DistributionMode::Alternate,
            DistributionMode::Opposite,
            DistributionMode::Whorled,
        ] {
            let mut tree = Tree::new(21);
            let trunk = tree.add_branch_group(tree.root(), quiet_branch());
            let twigs = tree.add_branch_group(trunk, quiet_branch());
            {
                let dist = &mut tree.group_mut(twigs).distribution;
                dist.frequency = 7.0;
                dist.mode = mode;
            }

            let mut mesh = TreeMesh::new();
            regenerate(&mut tree, &mut mesh);

            let nodes = tree.group(twigs).nodes.clone();
            assert_eq!(nodes.len(), 7, "{mode:?}");
            for nid in nodes {
                let node = tree.node(nid);
                assert!((0.0..=1.0).contains(&node.offset), "{mode:?}");
            }
        }
    }

    #[test]
    fn locked_nodes_keep_their_placement() {
        let mut tree = Tree::new(2);
        let trunk = tree.add_branch_group(tree.root(), quiet_branch());
        let twigs = tree.add_branch_group(trunk, quiet_branch());
        tree.group_mut(twigs).distribution.frequency = 2.0;

        let mut mesh = TreeMesh::new();
        regenerate(&mut tree, &mut mesh);

        let nid = tree.group(twigs).nodes[0];
        {
            let node = tree.node_mut(nid);
            node.locked = true;
            node.offset = 0.123;
            node.angle = 45.0;
        }
        regenerate(&mut tree, &mut mesh);

        let node = tree.node(nid);
        assert_eq!(node.offset, 0.123);
        assert_eq!(node.angle, 45.0);
        // derived state still follows the hand-edited offset.
        assert!(node.visible);
    }

    #[test]
    fn material_optimize_collapses_card_materials() {
        let build = |optimize: bool| {
            let mut tree = Tree::new(4);
            if let GroupKind::Root(root) = &mut tree.group_mut(tree.root()).kind {
                root.enable_material_optimize = optimize;
            }
            let trunk = tree.add_branch_group(tree.root(), quiet_branch());
            for id in [10u32, 11] {
                let leaves = tree.add_leaf_group(
                    trunk,
                    LeafParams {
                        material: Some(MaterialId(id)),
                        ..LeafParams::default()
                    },
                );
                tree.group_mut(leaves).distribution.frequency = 2.0;
            }
            let mut mesh = TreeMesh::new();
            regenerate(&mut tree, &mut mesh);
            mesh.material_count()
        };

        // bark + two card materials, vs bark + one shared sheet.
        assert_eq!(build(false), 3);
        assert_eq!(build(true), 2);
    }

    #[test]
    fn root_anchor_emits_no_geometry() {
        let mut tree = Tree::new(6);
        tree.add_branch_group(tree.root(), quiet_branch());
        let mut mesh = TreeMesh::new();
        regenerate(&mut tree, &mut mesh);

        let root_node = tree.group(tree.root()).nodes[0];
        assert!(!tree.node(root_node).has_geometry());
        // the branch below the anchor still generated.
        assert!(!mesh.vertices.is_empty());
    }
}
