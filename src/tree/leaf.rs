use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::pipeline::GenSettings;
use super::{AnimationParams, GroupId, LeafGeometryMode, LeafParams, Tree};
use crate::atlas::{Rect, TextureAtlas};
use crate::mesh::{occlusion, AoSphere, MaterialId, MeshData, TreeMesh, TreeTriangle, TreeVertex};

/// Emit card/billboard/mesh geometry for every visible node of a leaf
/// group, recording each node's buffer ranges.
pub(crate) fn update_mesh(
    tree: &mut Tree,
    gid: GroupId,
    spheres: &[AoSphere],
    settings: &GenSettings,
    leaf_atlas: &Option<(TextureAtlas, MaterialId)>,
    mesh: &mut TreeMesh,
) {
    let (params, anim) = {
        let group = tree.group(gid);
        (group.as_leaf().expect("leaf group").clone(), group.animation)
    };
    let node_ids = tree.group(gid).nodes.clone();

    // card UVs remap into the shared sheet when material optimization
    // packed one; instance meshes always keep their own material.
    let card_slot = params.material.map(|material| {
        match leaf_atlas {
            Some((atlas, shared)) if params.geometry_mode != LeafGeometryMode::Mesh => {
                let uv = atlas.uv_rect(material);
                (mesh.material_index(*shared, false), uv)
            }
            _ => (mesh.material_index(material, false), None),
        }
    });

    for nid in node_ids {
        let vert_start = mesh.vertices.len();
        let tri_start = mesh.triangles.len();

        let node = tree.node(nid).clone();
        if node.visible {
            let mut rng = StdRng::seed_from_u64(node.seed.wrapping_add(37) as u64);
            let size = (params.size.0 + (params.size.1 - params.size.0) * rng.random::<f32>())
                * node.scale;
            let roll = (params.rotation_range.0
                + (params.rotation_range.1 - params.rotation_range.0) * rng.random::<f32>())
            .to_radians();
            let phase = Vec2::new(rng.random::<f32>(), rng.random::<f32>());

            if size > f32::EPSILON {
                let matrix = node.matrix * Mat4::from_quat(Quat::from_rotation_y(roll));
                match params.geometry_mode {
                    LeafGeometryMode::Plane
                    | LeafGeometryMode::Cross
                    | LeafGeometryMode::TriCross => {
                        if let Some((mat_index, uv_remap)) = card_slot {
                            for rot in card_rotations(params.geometry_mode) {
                                emit_card(
                                    &params, &anim, matrix * Mat4::from_quat(rot), size, phase,
                                    uv_remap, mesh, mat_index,
                                );
                            }
                        }
                    }
                    LeafGeometryMode::Billboard => {
                        if let Some((mat_index, uv_remap)) = card_slot {
                            emit_billboard(
                                &anim, &node.matrix, size, phase, uv_remap, mesh, mat_index,
                            );
                        }
                    }
                    LeafGeometryMode::Mesh => match (&params.instance_mesh, params.material) {
                        (Some(instance), Some(material)) => {
                            let mat_index = mesh.material_index(material, false);
                            emit_instance(
                                &anim, instance, matrix, size, phase, mesh, mat_index,
                            );
                        }
                        _ => log::warn!("mesh-mode leaf without instance mesh or material"),
                    },
                }
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

/// Card orientations around the node: one plane, a 90° cross, or a
/// cross plus a flat third card.
fn card_rotations(mode: LeafGeometryMode) -> Vec<Quat> {
    match mode {
        LeafGeometryMode::Plane => vec![Quat::IDENTITY],
        LeafGeometryMode::Cross => vec![Quat::IDENTITY, Quat::from_rotation_z(FRAC_PI_2)],
        LeafGeometryMode::TriCross => vec![
            Quat::IDENTITY,
            Quat::from_rotation_z(FRAC_PI_2),
            Quat::from_rotation_x(FRAC_PI_2),
        ],
        _ => Vec::new(),
    }
}

/// One double-sided quad: 8 vertices, 4 triangles. Corners warp toward
/// the texture's padded hull so the silhouette matches non-square art.
#[allow(clippy::too_many_arguments)]
fn emit_card(
    params: &LeafParams,
    anim: &AnimationParams,
    matrix: Mat4,
    size: f32,
    phase: Vec2,
    uv_remap: Option<Rect>,
    mesh: &mut TreeMesh,
    mat_index: u32,
) {
    let hull = params.hull;
    let corners = [(0.0f32, 0.0f32), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
    let base = mesh.vertices.len() as u32;

    for flip in [false, true] {
        for (u, v) in corners {
            // bilinear warp of the unit quad into the hull footprint.
            let local = Vec3::new(
                (hull.x + u * hull.w - 0.5) * size,
                0.0,
                (hull.y + v * hull.h) * size,
            );
            let normal_local = if flip { Vec3::NEG_Y } else { Vec3::Y };
            let uv0 = match uv_remap {
                Some(rect) => Vec2::new(rect.x + u * rect.w, rect.y + v * rect.h),
                None => Vec2::new(u, v),
            };
            mesh.vertices.push(TreeVertex {
                position: matrix.transform_point3(local),
                normal: matrix.transform_vector3(normal_local).normalize_or_zero(),
                tangent: matrix
                    .transform_vector3(Vec3::X)
                    .normalize_or_zero()
                    .extend(1.0),
                uv0,
                uv1: phase,
                color: Vec4::new(
                    anim.primary_factor,
                    anim.secondary_factor,
                    anim.edge_flutter * v,
                    1.0,
                ),
            });
        }
    }

    let mut tri = |v: [u32; 3]| {
        let mut t = TreeTriangle::new(v, mat_index);
        t.cutout = true;
        mesh.triangles.push(t);
    };
    tri([base, base + 1, base + 2]);
    tri([base, base + 2, base + 3]);
    tri([base + 4, base + 6, base + 5]);
    tri([base + 4, base + 7, base + 6]);
}

/// A single camera-facing quad. All four vertices sit at the node
/// center; the corner expansion is encoded in the normals and applied
/// by the shader, never reconstructed here.
#[allow(clippy::too_many_arguments)]
fn emit_billboard(
    anim: &AnimationParams,
    matrix: &Mat4,
    size: f32,
    phase: Vec2,
    uv_remap: Option<Rect>,
    mesh: &mut TreeMesh,
    mat_index: u32,
) {
    let center = matrix.w_axis.truncate();
    let base = mesh.vertices.len() as u32;
    let corners = [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    for (sx, sy) in corners {
        mesh.vertices.push(TreeVertex {
            position: center,
            // spherical billboard correction: half-extents in XY.
            normal: Vec3::new(sx * 0.5 * size, sy * 0.5 * size, 0.0),
            tangent: Vec4::new(0.0, 0.0, 1.0, size),
            uv0: {
                let (u, v) = ((sx + 1.0) * 0.5, (sy + 1.0) * 0.5);
                match uv_remap {
                    Some(rect) => Vec2::new(rect.x + u * rect.w, rect.y + v * rect.h),
                    None => Vec2::new(u, v),
                }
            },
            uv1: phase,
            color: Vec4::new(
                anim.primary_factor,
                anim.secondary_factor,
                anim.edge_flutter,
                1.0,
            ),
        });
    }

    for v in [[base, base + 1, base + 2], [base, base + 2, base + 3]] {
        let mut t = TreeTriangle::new(v, mat_index);
        t.billboard = true;
        t.cutout = true;
        mesh.triangles.push(t);
    }
}

/// Clone an externally supplied mesh through the node transform.
fn emit_instance(
    anim: &AnimationParams,
    instance: &MeshData,
    matrix: Mat4,
    size: f32,
    phase: Vec2,
    mesh: &mut TreeMesh,
    mat_index: u32,
) {
    let m = matrix * Mat4::from_scale(Vec3::splat(size));
    let base = mesh.vertices.len() as u32;

    for (i, &position) in instance.positions.iter().enumerate() {
        let normal = instance.normals.get(i).copied().unwrap_or(Vec3::Y);
        let tangent = instance
            .tangents
            .get(i)
            .copied()
            .unwrap_or(Vec4::new(1.0, 0.0, 0.0, 1.0));
        let uv = instance.uvs.get(i).copied().unwrap_or(Vec2::ZERO);

        mesh.vertices.push(TreeVertex {
            position: m.transform_point3(position),
            normal: m.transform_vector3(normal).normalize_or_zero(),
            tangent: m
                .transform_vector3(tangent.truncate())
                .normalize_or_zero()
                .extend(tangent.w),
            uv0: uv,
            uv1: phase,
            color: Vec4::new(
                anim.primary_factor,
                anim.secondary_factor,
                anim.edge_flutter,
                1.0,
            ),
        });
    }

    for tri in instance.indices.chunks_exact(3) {
        mesh.triangles.push(TreeTriangle::new(
            [base + tri[0], base + tri[1], base + tri[2]],
            mat_index,
        ));
    }
}
