use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::pipeline::GenSettings;
use super::{AnimationParams, BranchGeometryMode, BranchParams, GroupId, NodeId, Tree, TreeNode};
use crate::geom::{ray_triangle, Aabb, Bvh};
use crate::mesh::{occlusion, AoSphere, CapMapping, RingLoop, TreeMesh, TreeTriangle, TreeVertex};
use crate::noise::Perlin;
use crate::spline::TreeSpline;

/// Tube radius at arc-time `t`: authored radius × node scale × radius
/// curve.
pub(crate) fn radius_at(params: &BranchParams, node_scale: f32, t: f32) -> f32 {
    (params.radius * node_scale * params.radius_curve.evaluate(t)).max(0.0)
}

/// Radial segment count as a function of local radius and LOD quality,
/// rounded up to even so low-res seams can pair vertices.
fn radial_segments(radius: f32, lod: f32) -> usize {
    let segs = ((radius * 24.0 * lod.sqrt()).round() as isize).clamp(4, 32) as usize;
    (segs + 1) & !1
}

/// The parent branch surface as a raycast target for welding.
struct ParentSurface {
    bvh: Bvh,
    triangles: Vec<[Vec3; 3]>,
}

fn parent_surface(mesh: &TreeMesh, node: &TreeNode) -> Option<ParentSurface> {
    if node.tri_end <= node.tri_start {
        return None;
    }
    let count = node.tri_end - node.tri_start;
    let mut triangles = Vec::with_capacity(count);
    let mut bounds = Vec::with_capacity(count);
    for tri in &mesh.triangles[node.tri_start..node.tri_end] {
        let pts = [
            mesh.vertices[tri.v[0] as usize].position,
            mesh.vertices[tri.v[1] as usize].position,
            mesh.vertices[tri.v[2] as usize].position,
        ];
        bounds.push(Aabb::from_points(&pts).grow(1e-3));
        triangles.push(pts);
    }
    Some(ParentSurface {
        bvh: Bvh::build(&bounds),
        triangles,
    })
}

/// Emit tube, cap and frond geometry for every visible node of a branch
/// group, recording each node's buffer ranges.
pub(crate) fn update_mesh(
    tree: &mut Tree,
    gid: GroupId,
    perlin: &Perlin,
    spheres: &[AoSphere],
    settings: &GenSettings,
    mesh: &mut TreeMesh,
) {
    let (params, anim) = {
        let group = tree.group(gid);
        (
            group.as_branch().expect("branch group").clone(),
            group.animation,
        )
    };
    let lod = (settings.lod_quality * params.lod_quality_multiplier).clamp(0.05, 1.0);
    let node_ids = tree.group(gid).nodes.clone();

    // weld raycast targets, one per distinct parent node.
    let mut surfaces: HashMap<NodeId, Option<ParentSurface>> = HashMap::new();

    for nid in node_ids {
        let vert_start = mesh.vertices.len();
        let tri_start = mesh.triangles.len();

        let node = tree.node(nid).clone();
        let wants_weld = settings.enable_welding && params.weld_height > 0.0;
        let surface = match (wants_weld, node.parent) {
            (true, Some(pid)) => surfaces
                .entry(pid)
                .or_insert_with(|| parent_surface(mesh, tree.node(pid)))
                .as_ref(),
            _ => None,
        };

        if node.visible {
            match &node.spline {
                Some(spline) if spline.node_count() >= 2 => {
                    emit_node(
                        &params, &anim, lod, settings, &node, spline, perlin, surface, mesh,
                    );
                }
                _ => log::warn!("branch node without a usable spline, emitting nothing"),
            }
        }

        if settings.enable_ao && !spheres.is_empty() {
            let end = mesh.vertices.len();
            for v in &mut mesh.vertices[vert_start..end] {
                v.color.w = occlusion(spheres, v.position, settings.ao_density);
            }
        }

        let node = tree.node_mut(nid);
        node.vert_start = vert_start;
        node.vert_end = mesh.vertices.len();
        node.tri_start = tri_start;
        node.tri_end = mesh.triangles.len();
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_node(
    params: &BranchParams,
    anim: &AnimationParams,
    lod: f32,
    settings: &GenSettings,
    node: &TreeNode,
    spline: &TreeSpline,
    perlin: &Perlin,
    surface: Option<&ParentSurface>,
    mesh: &mut TreeMesh,
) {
    let length = spline.approximate_length();
    if length <= f32::EPSILON {
        log::warn!("zero-length branch spline, emitting nothing");
        return;
    }
    let t_max = node.break_offset.clamp(0.0, 1.0);
    if t_max <= 0.0 {
        return;
    }
    let broken = t_max < 1.0;

    let mut rng = StdRng::seed_from_u64(node.seed.wrapping_add(101) as u64);
    let phase = Vec2::new(rng.random::<f32>(), rng.random::<f32>());

    if params.geometry_mode != BranchGeometryMode::Frond {
        if let Some(material) = params.material_branch {
            let mat_index = mesh.material_index(material, true);
            let last_ring = emit_tube(
                params, anim, lod, settings, node, spline, perlin, surface, mesh, mat_index,
                t_max, phase,
            );

            if let Some(last) = last_ring {
                let cap_material = if broken {
                    params.material_break.unwrap_or(material)
                } else {
                    material
                };
                let cap_mat_index = mesh.material_index(cap_material, !broken);
                let (sphere_factor, mapping) = if broken {
                    // a break exposes a flat cross-section.
                    (0.0, CapMapping::Planar)
                } else {
                    (params.cap_smoothing, CapMapping::Follow)
                };
                last.cap(
                    sphere_factor,
                    params.noise * 0.3,
                    perlin,
                    mapping,
                    1.0,
                    mesh,
                    cap_mat_index,
                );
            }
        }
    }

    if params.geometry_mode != BranchGeometryMode::Branch && params.frond_count > 0 {
        if let Some(material) = params.material_frond {
            let mat_index = mesh.material_index(material, false);
            emit_fronds(params, anim, lod, node, spline, t_max, phase, mesh, mat_index);
        }
    }
}

/// Ring-by-ring tube extrusion. Returns the last ring when it still has
/// area to close with a cap.
#[allow(clippy::too_many_arguments)]
fn emit_tube(
    params: &BranchParams,
    anim: &AnimationParams,
    lod: f32,
    settings: &GenSettings,
    node: &TreeNode,
    spline: &TreeSpline,
    perlin: &Perlin,
    surface: Option<&ParentSurface>,
    mesh: &mut TreeMesh,
    mat_index: u32,
    t_max: f32,
    phase: Vec2,
) -> Option<RingLoop> {
    let length = spline.approximate_length();
    let count = ((length * t_max * 4.0 * lod).round() as usize).clamp(2, 48);
    // at low quality, pair up seam vertices instead of full stitching.
    let lowres = lod < 0.3;

    let mut prev: Option<RingLoop> = None;
    let mut last_radius = 0.0;

    for s in 0..=count {
        let t = t_max * s as f32 / count as f32;
        let radius = radius_at(params, node.scale, t);
        last_radius = radius;
        let segments = radial_segments(radius.max(0.02), lod);

        let ring_matrix = node.matrix
            * Mat4::from_rotation_translation(
                spline.rotation_at_time(t),
                spline.position_at_time(t),
            );

        let mut ring = RingLoop::new();
        ring.reset(radius, ring_matrix, t, segments);

        // surface angle from the local radius derivative along the tube.
        let dt = 0.05_f32.min(t_max * 0.5).max(1e-3);
        let dr = radius_at(params, node.scale, (t - dt).max(0.0))
            - radius_at(params, node.scale, (t + dt).min(t_max));
        ring.set_surface_angle((dr / (2.0 * dt * length).max(1e-6)).atan());

        ring.set_noise(
            params.noise * params.noise_curve.evaluate(t) * radius,
            params.noise_scale_u,
            params.noise_scale_v,
        );

        if params.flare_size > 0.0 {
            let falloff = (1.0 - t / params.flare_height.max(1e-3)).clamp(0.0, 1.0);
            if falloff > 0.0 {
                ring.set_flares(params.flare_size * falloff * node.scale, params.flare_noise_scale);
            }
        }

        let welding = surface.is_some() && t < params.weld_height;
        if welding {
            let w = 1.0 - t / params.weld_height.max(1e-6);
            ring.set_spread(
                params.weld_spread_top * w * radius,
                params.weld_spread_bottom * w * radius,
            );
        }

        ring.set_animation_properties(
            anim.primary_factor * t,
            anim.secondary_factor * t,
            anim.edge_flutter,
            phase,
        );

        ring.build_vertices(perlin, &mut mesh.vertices);

        if welding && settings.enable_welding {
            let blend = 1.0 - t / params.weld_height.max(1e-6);
            if let Some(surface) = surface {
                weld_ring(mesh, ring.vert_offset(), surface, ring_matrix, blend);
            }
        }

        if let Some(prev) = &prev {
            prev.connect(&ring, &mut mesh.triangles, mat_index, false, lowres);
        }
        prev = Some(ring);
    }

    if last_radius > 1e-4 {
        prev
    } else {
        None
    }
}

/// Project the ring's fresh vertices outward from the ring center onto
/// the parent surface, blended by the weld strength. Smooths the seam
/// where a branch meets its parent.
fn weld_ring(
    mesh: &mut TreeMesh,
    vert_offset: usize,
    surface: &ParentSurface,
    ring_matrix: Mat4,
    blend: f32,
) {
    let base = ring_matrix.w_axis.truncate();
    let blend = blend.clamp(0.0, 1.0);
    let end = mesh.vertices.len();

    for v in &mut mesh.vertices[vert_offset..end] {
        let offset = v.position - base;
        let dist = offset.length();
        if dist <= 1e-6 {
            continue;
        }
        let dir = offset / dist;
        let hit = surface.bvh.raycast(base, dir, dist * 8.0 + 1.0, |i, origin, d| {
            let [a, b, c] = surface.triangles[i as usize];
            ray_triangle(origin, d, a, b, c)
        });
        if let Some((_, t)) = hit {
            let target = base + dir * t;
            v.position += (target - v.position) * blend;
        }
    }
}

/// Double-sided ribbon blades fanned around the branch spine.
#[allow(clippy::too_many_arguments)]
fn emit_fronds(
    params: &BranchParams,
    anim: &AnimationParams,
    lod: f32,
    node: &TreeNode,
    spline: &TreeSpline,
    t_max: f32,
    phase: Vec2,
    mesh: &mut TreeMesh,
    mat_index: u32,
) {
    let lo = params.frond_range.0.clamp(0.0, 1.0).min(t_max);
    let hi = params.frond_range.1.clamp(0.0, 1.0).min(t_max);
    if hi <= lo || params.frond_width <= 0.0 {
        return;
    }

    let length = spline.approximate_length();
    let samples = ((length * (hi - lo) * 2.0 * lod).round() as usize).clamp(1, 24);
    let fold = params.frond_crease.clamp(0.0, 1.0) * FRAC_PI_2;

    for f in 0..params.frond_count {
        // blades fan across a half turn; double-siding covers the rest.
        let blade_angle = params.frond_rotation.to_radians()
            + ((f as f32 + 0.5) / params.frond_count as f32 - 0.5) * PI;

        let left_rot = Quat::from_rotation_y(blade_angle - fold);
        let right_rot = Quat::from_rotation_y(blade_angle + fold);
        let mid_rot = Quat::from_rotation_y(blade_angle);

        let front_start = mesh.vertices.len();

        for s in 0..=samples {
            let u = s as f32 / samples as f32;
            let t = lo + (hi - lo) * u;
            let width = params.frond_width * params.frond_curve.evaluate(t) * node.scale;

            let m = node.matrix
                * Mat4::from_rotation_translation(
                    spline.rotation_at_time(t),
                    spline.position_at_time(t),
                );

            let row = [
                (left_rot * Vec3::NEG_X * width, left_rot * Vec3::Z, 0.0),
                (Vec3::ZERO, mid_rot * Vec3::Z, 0.5),
                (right_rot * Vec3::X * width, right_rot * Vec3::Z, 1.0),
            ];
            for (local, normal_local, tex_u) in row {
                let edge = (tex_u - 0.5_f32).abs() * 2.0;
                mesh.vertices.push(TreeVertex {
                    position: m.transform_point3(local),
                    normal: m.transform_vector3(normal_local).normalize_or_zero(),
                    tangent: m
                        .transform_vector3(mid_rot * Vec3::X)
                        .normalize_or_zero()
                        .extend(1.0),
                    uv0: Vec2::new(tex_u, u),
                    uv1: phase,
                    color: Vec4::new(
                        anim.primary_factor * t,
                        anim.secondary_factor * t,
                        anim.edge_flutter * edge,
                        1.0,
                    ),
                });
            }
        }

        // front side strip: two quads per row pair.
        for s in 0..samples {
            let r0 = (front_start + s * 3) as u32;
            let r1 = (front_start + (s + 1) * 3) as u32;
            for k in 0..2u32 {
                mesh.triangles
                    .push(TreeTriangle::new([r0 + k, r1 + k, r0 + k + 1], mat_index));
                mesh.triangles
                    .push(TreeTriangle::new([r0 + k + 1, r1 + k, r1 + k + 1], mat_index));
            }
        }

        // mirrored back side: same positions, flipped normals/winding.
        let back_start = mesh.vertices.len();
        let front_count = (samples + 1) * 3;
        for i in 0..front_count {
            let mut v = mesh.vertices[front_start + i];
            v.normal = -v.normal;
            mesh.vertices.push(v);
        }
        for s in 0..samples {
            let r0 = (back_start + s * 3) as u32;
            let r1 = (back_start + (s + 1) * 3) as u32;
            for k in 0..2u32 {
                mesh.triangles
                    .push(TreeTriangle::new([r0 + k, r0 + k + 1, r1 + k], mat_index));
                mesh.triangles
                    .push(TreeTriangle::new([r0 + k + 1, r1 + k + 1, r1 + k], mat_index));
            }
        }
    }
}
