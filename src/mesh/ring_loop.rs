use std::f32::consts::{FRAC_PI_2, TAU};

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::{TreeMesh, TreeTriangle, TreeVertex};
use crate::noise::Perlin;

/// UV mapping for an end cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapMapping {
    /// Radial planar projection centered on the cap.
    Planar,
    /// Continue the tube's U coordinate and advance V past the rim.
    Follow,
}

/// A closed polygon of vertices encircling one cross-section of a branch
/// tube. Ephemeral: configured with [`reset`](Self::reset), consumed to
/// emit vertices/triangles, then discarded.
///
/// The ring lives in the local XZ plane of its matrix, with +Y the tube
/// axis. [`build_vertices`](Self::build_vertices) must run before
/// [`connect`](Self::connect) or [`cap`](Self::cap).
#[derive(Debug, Clone)]
pub struct RingLoop {
    radius: f32,
    matrix: Mat4,
    base_uv_v: f32,
    segments: usize,

    /// Index of this ring's first vertex in the output buffer, set by
    /// `build_vertices`.
    vert_offset: usize,
    built: bool,

    surface_angle: f32,
    anim_primary: f32,
    anim_secondary: f32,
    anim_edge: f32,
    anim_phase: Vec2,
    spread_top: f32,
    spread_bottom: f32,
    noise_amount: f32,
    noise_scale_u: f32,
    noise_scale_v: f32,
    flare_radius: f32,
    flare_noise_scale: f32,
}

impl Default for RingLoop {
    fn default() -> Self {
        Self {
            radius: 0.0,
            matrix: Mat4::IDENTITY,
            base_uv_v: 0.0,
            segments: 0,
            vert_offset: 0,
            built: false,
            surface_angle: 0.0,
            anim_primary: 0.0,
            anim_secondary: 0.0,
            anim_edge: 0.0,
            anim_phase: Vec2::ZERO,
            spread_top: 0.0,
            spread_bottom: 0.0,
            noise_amount: 0.0,
            noise_scale_u: 1.0,
            noise_scale_v: 1.0,
            flare_radius: 0.0,
            flare_noise_scale: 1.0,
        }
    }
}

impl RingLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the ring for one cross-section sample. Clears all
    /// modifiers and the built state.
    pub fn reset(&mut self, radius: f32, matrix: Mat4, base_uv_v: f32, segments: usize) {
        *self = Self {
            radius,
            matrix,
            base_uv_v,
            segments,
            ..Self::default()
        };
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn vert_offset(&self) -> usize {
        self.vert_offset
    }

    /// Tilt of the surface normal along the tube axis, in radians.
    /// Positive values lean the normals toward +Y (a tapering tube).
    pub fn set_surface_angle(&mut self, angle: f32) {
        self.surface_angle = angle;
    }

    pub fn set_animation_properties(
        &mut self,
        primary: f32,
        secondary: f32,
        edge: f32,
        phase: Vec2,
    ) {
        self.anim_primary = primary;
        self.anim_secondary = secondary;
        self.anim_edge = edge;
        self.anim_phase = phase;
    }

    /// Asymmetric weld spread: widens the ring on its local +X / -X
    /// sides, cosine weighted around the loop.
    pub fn set_spread(&mut self, top: f32, bottom: f32) {
        self.spread_top = top;
        self.spread_bottom = bottom;
    }

    /// Radial Perlin perturbation: `amount` in world units, scales map
    /// ring U and tube V into noise space.
    pub fn set_noise(&mut self, amount: f32, scale_u: f32, scale_v: f32) {
        self.noise_amount = amount;
        self.noise_scale_u = scale_u;
        self.noise_scale_v = scale_v;
    }

    /// Trunk flare: |Perlin|-weighted radial bulge of up to `radius`
    /// world units.
    pub fn set_flares(&mut self, radius: f32, noise_scale: f32) {
        self.flare_radius = radius;
        self.flare_noise_scale = noise_scale;
    }

    /// Appends exactly `segments + 1` vertices; the last duplicates the
    /// first position to close the UV seam. Records the ring's offset in
    /// the buffer.
    pub fn build_vertices(&mut self, perlin: &Perlin, verts: &mut Vec<TreeVertex>) {
        self.vert_offset = verts.len();
        self.built = true;
        if self.segments == 0 {
            return;
        }

        // local positions first; normals need the neighboring deltas.
        let mut local = Vec::with_capacity(self.segments + 1);
        for i in 0..=self.segments {
            let t = i as f32 / self.segments as f32;
            let noise_x = if i == self.segments { 1.0 } else { t };
            let angle = t * TAU;
            let (sin, cos) = angle.sin_cos();

            let spread = cos.abs()
                * if cos > 0.0 {
                    self.spread_top
                } else {
                    self.spread_bottom
                };
            let noise_r = perlin.noise2(
                noise_x * self.noise_scale_u,
                self.base_uv_v * self.noise_scale_v,
            ) * self.noise_amount;
            let flare_r = perlin
                .noise2(
                    noise_x * self.flare_noise_scale,
                    self.base_uv_v * self.flare_noise_scale,
                )
                .abs()
                * self.flare_radius;

            let r = (self.radius + spread + noise_r + flare_r).max(0.0);
            local.push(Vec3::new(cos * r, 0.0, sin * r));
        }

        let degenerate = self.radius <= 1e-5 && self.flare_radius <= 0.0;
        let (tilt_sin, tilt_cos) = self.surface_angle.sin_cos();

        for i in 0..=self.segments {
            let t = i as f32 / self.segments as f32;
            let angle = t * TAU;
            let (sin, cos) = angle.sin_cos();

            let normal_local = if degenerate {
                // cap tip: no ring plane to derive a normal from.
                Vec3::Y
            } else {
                // 90° rotation of the neighbor delta in ring space, then
                // tilted by the surface angle.
                let wrapped = i % self.segments;
                let prev = local[(wrapped + self.segments - 1) % self.segments];
                let next = local[(wrapped + 1) % self.segments];
                let d = next - prev;
                let outward = Vec3::new(d.z, 0.0, -d.x).normalize_or_zero();
                let outward = if outward == Vec3::ZERO {
                    Vec3::new(cos, 0.0, sin)
                } else {
                    outward
                };
                (outward * tilt_cos + Vec3::Y * tilt_sin).normalize()
            };

            let tangent_local = Vec3::new(-sin, 0.0, cos);

            verts.push(TreeVertex {
                position: self.matrix.transform_point3(local[i]),
                normal: self
                    .matrix
                    .transform_vector3(normal_local)
                    .normalize_or_zero(),
                tangent: self
                    .matrix
                    .transform_vector3(tangent_local)
                    .normalize_or_zero()
                    .extend(1.0),
                uv0: Vec2::new(t, self.base_uv_v),
                uv1: self.anim_phase,
                color: Vec4::new(self.anim_primary, self.anim_secondary, self.anim_edge, 1.0),
            });
        }
    }

    /// Close the ring with a hemispherical-to-flat cap.
    ///
    /// `sphere_factor` blends between a flat fan (≈0) and a hemisphere
    /// (1); `noise` perturbs the concentric loops radially. Degenerate
    /// rings (unbuilt, radius ~0 or fewer than 3 segments) emit nothing.
    pub fn cap(
        &self,
        sphere_factor: f32,
        noise: f32,
        perlin: &Perlin,
        mapping: CapMapping,
        mapping_scale: f32,
        mesh: &mut TreeMesh,
        material_index: u32,
    ) {
        if !self.built || self.segments < 3 || self.radius <= 1e-5 {
            return;
        }
        let sphere_factor = sphere_factor.clamp(0.0, 1.0);

        let loops = ((self.segments as f32 * 0.25).ceil() as usize).max(1);
        let mut prev_offset = self.vert_offset;

        for l in 1..=loops {
            let lt = l as f32 / loops as f32;
            let phi = lt * FRAC_PI_2;
            let r_factor = (1.0 - lt) + (phi.cos() - (1.0 - lt)) * sphere_factor;
            let y = phi.sin() * self.radius * sphere_factor;

            if l < loops {
                let ring_offset = mesh.vertices.len();
                for i in 0..=self.segments {
                    let t = i as f32 / self.segments as f32;
                    let angle = t * TAU;
                    let (sin, cos) = angle.sin_cos();

                    let wobble =
                        1.0 + perlin.noise2(t * 4.0, self.base_uv_v + lt) * noise;
                    let local = Vec3::new(
                        cos * self.radius * r_factor * wobble,
                        y,
                        sin * self.radius * r_factor * wobble,
                    );
                    let sphere_normal =
                        Vec3::new(cos * phi.cos(), phi.sin(), sin * phi.cos());
                    let normal_local = (Vec3::Y + (sphere_normal - Vec3::Y) * sphere_factor)
                        .normalize_or_zero();

                    let uv0 = match mapping {
                        CapMapping::Planar => {
                            Vec2::new(0.5 + 0.5 * cos * r_factor, 0.5 + 0.5 * sin * r_factor)
                                * mapping_scale
                        }
                        CapMapping::Follow => Vec2::new(
                            t,
                            self.base_uv_v + lt * self.radius * mapping_scale,
                        ),
                    };

                    mesh.vertices.push(TreeVertex {
                        position: self.matrix.transform_point3(local),
                        normal: self
                            .matrix
                            .transform_vector3(normal_local)
                            .normalize_or_zero(),
                        uv0,
                        uv1: self.anim_phase,
                        color: Vec4::new(
                            self.anim_primary,
                            self.anim_secondary,
                            self.anim_edge,
                            1.0,
                        ),
                        ..TreeVertex::default()
                    });
                }

                for i in 0..self.segments {
                    let a0 = (prev_offset + i) as u32;
                    let a1 = (prev_offset + i + 1) as u32;
                    let b0 = (ring_offset + i) as u32;
                    let b1 = (ring_offset + i + 1) as u32;
                    mesh.triangles
                        .push(TreeTriangle::new([a0, b0, a1], material_index));
                    mesh.triangles
                        .push(TreeTriangle::new([a1, b0, b1], material_index));
                }
                prev_offset = ring_offset;
            } else {
                // final loop collapses to the center vertex; fan close.
                let center_index = mesh.vertices.len() as u32;
                let uv0 = match mapping {
                    CapMapping::Planar => Vec2::splat(0.5) * mapping_scale,
                    CapMapping::Follow => {
                        Vec2::new(0.5, self.base_uv_v + self.radius * mapping_scale)
                    }
                };
                mesh.vertices.push(TreeVertex {
                    position: self.matrix.transform_point3(Vec3::new(0.0, y, 0.0)),
                    normal: self.matrix.transform_vector3(Vec3::Y).normalize_or_zero(),
                    uv0,
                    uv1: self.anim_phase,
                    color: Vec4::new(
                        self.anim_primary,
                        self.anim_secondary,
                        self.anim_edge,
                        1.0,
                    ),
                    ..TreeVertex::default()
                });

                for i in 0..self.segments {
                    let a0 = (prev_offset + i) as u32;
                    let a1 = (prev_offset + i + 1) as u32;
                    mesh.triangles
                        .push(TreeTriangle::new([a0, center_index, a1], material_index));
                }
            }
        }
    }

    /// Stitch a triangle strip between two built rings.
    ///
    /// Always connects from the higher-resolution ring to the lower/equal
    /// one (swapping and recursing otherwise). Different segment counts
    /// map proportionally by rounding; `lowres` pairs every other vertex
    /// and requires equal, even counts.
    pub fn connect(
        &self,
        other: &RingLoop,
        tris: &mut Vec<TreeTriangle>,
        material_index: u32,
        flip: bool,
        lowres: bool,
    ) {
        if !self.built || !other.built {
            log::warn!("RingLoop::connect called before build_vertices, skipping");
            return;
        }
        if self.segments < other.segments {
            other.connect(self, tris, material_index, !flip, lowres);
            return;
        }
        if self.segments == 0 || other.segments == 0 {
            return;
        }

        let mut push = |v: [u32; 3]| {
            let v = if flip { [v[0], v[2], v[1]] } else { v };
            tris.push(TreeTriangle::new(v, material_index));
        };

        if lowres && self.segments == other.segments && self.segments % 2 == 0 {
            // exact paired seam: the far ring runs at half resolution,
            // its odd vertices are skipped but the near rim stays
            // watertight.
            for i in (0..self.segments).step_by(2) {
                let a0 = (self.vert_offset + i) as u32;
                let a1 = (self.vert_offset + i + 1) as u32;
                let a2 = (self.vert_offset + i + 2) as u32;
                let b0 = (other.vert_offset + i) as u32;
                let b2 = (other.vert_offset + i + 2) as u32;
                push([a0, b0, a1]);
                push([a1, b0, b2]);
                push([a1, b2, a2]);
            }
            return;
        }

        let ratio = other.segments as f32 / self.segments as f32;
        for i in 0..self.segments {
            let b0 = (i as f32 * ratio).round() as usize;
            let b1 = ((i + 1) as f32 * ratio).round() as usize;

            let a0 = (self.vert_offset + i) as u32;
            let a1 = (self.vert_offset + i + 1) as u32;
            let ob0 = (other.vert_offset + b0) as u32;
            let ob1 = (other.vert_offset + b1) as u32;

            push([a0, ob0, a1]);
            if b1 != b0 {
                push([a1, ob0, ob1]);
            }
        }
    }
}

/* ------------------------------------------------------------------------- */
/*                                    Tests                                  */
/* ------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_ring(radius: f32, y: f32, segments: usize) -> RingLoop {
        let mut ring = RingLoop::new();
        ring.reset(
            radius,
            Mat4::from_translation(Vec3::new(0.0, y, 0.0)),
            y,
            segments,
        );
        ring
    }

    #[test]
    fn closure_emits_n_plus_one_and_seam_coincides() {
        let perlin = Perlin::with_seed(1);
        let mut verts = Vec::new();
        let mut ring = plain_ring(1.0, 0.0, 8);
        ring.build_vertices(&perlin, &mut verts);

        assert_eq!(verts.len(), 9);
        let first = verts[0].position;
        let last = verts[8].position;
        assert!((first - last).length() < 1e-4);
        // seam closes in UV space, not geometry: U runs 0 to 1.
        assert_eq!(verts[0].uv0.x, 0.0);
        assert_eq!(verts[8].uv0.x, 1.0);
    }

    #[test]
    fn tip_ring_uses_axis_normals() {
        let perlin = Perlin::with_seed(1);
        let mut verts = Vec::new();
        let mut ring = plain_ring(0.0, 2.0, 6);
        ring.build_vertices(&perlin, &mut verts);
        for v in &verts {
            assert!((v.normal - Vec3::Y).length() < 1e-5);
        }
    }

    #[test]
    fn connect_equal_counts_is_watertight() {
        let perlin = Perlin::with_seed(1);
        let mut verts = Vec::new();
        let mut tris = Vec::new();

        let n = 8;
        let mut a = plain_ring(1.0, 0.0, n);
        let mut b = plain_ring(1.0, 1.0, n);
        a.build_vertices(&perlin, &mut verts);
        b.build_vertices(&perlin, &mut verts);
        a.connect(&b, &mut tris, 0, false, false);

        assert_eq!(tris.len(), 2 * n);

        // every consecutive rim edge on both rings is used exactly once.
        let mut edge_use = std::collections::HashMap::new();
        for tri in &tris {
            for e in [(0, 1), (1, 2), (2, 0)] {
                let mut pair = [tri.v[e.0], tri.v[e.1]];
                pair.sort();
                *edge_use.entry(pair).or_insert(0) += 1;
            }
        }
        for ring_offset in [0u32, (n + 1) as u32] {
            for i in 0..n as u32 {
                let mut pair = [ring_offset + i, ring_offset + i + 1];
                pair.sort();
                assert_eq!(edge_use.get(&pair), Some(&1), "edge {pair:?}");
            }
        }
    }

    #[test]
    fn connect_swaps_toward_high_resolution_ring() {
        let perlin = Perlin::with_seed(1);
        let mut verts = Vec::new();
        let mut tris_ab = Vec::new();
        let mut tris_ba = Vec::new();

        let mut a = plain_ring(1.0, 0.0, 4);
        let mut b = plain_ring(1.0, 1.0, 8);
        a.build_vertices(&perlin, &mut verts);
        b.build_vertices(&perlin, &mut verts);

        a.connect(&b, &mut tris_ab, 0, false, false);
        b.connect(&a, &mut tris_ba, 0, true, false);

        // either direction routes through the 8-segment ring.
        assert_eq!(tris_ab.len(), tris_ba.len());
        assert!(tris_ab.len() > 8);
    }

    #[test]
    fn connect_before_build_is_skipped() {
        let mut tris = Vec::new();
        let a = plain_ring(1.0, 0.0, 6);
        let b = plain_ring(1.0, 1.0, 6);
        a.connect(&b, &mut tris, 0, false, false);
        assert!(tris.is_empty());
    }

    #[test]
    fn lowres_seam_covers_every_near_edge() {
        let perlin = Perlin::with_seed(1);
        let mut verts = Vec::new();
        let mut tris = Vec::new();

        let n = 8;
        let mut a = plain_ring(1.0, 0.0, n);
        let mut b = plain_ring(1.0, 1.0, n);
        a.build_vertices(&perlin, &mut verts);
        b.build_vertices(&perlin, &mut verts);
        a.connect(&b, &mut tris, 0, false, true);

        // 3 triangles per vertex pair.
        assert_eq!(tris.len(), 3 * n / 2);
    }

    #[test]
    fn flat_cap_stays_in_ring_plane() {
        let perlin = Perlin::with_seed(1);
        let mut mesh = TreeMesh::new();
        let mut ring = plain_ring(1.0, 0.0, 8);
        ring.build_vertices(&perlin, &mut mesh.vertices);

        let vert_base = mesh.vertices.len();
        ring.cap(0.0, 0.0, &perlin, CapMapping::Planar, 1.0, &mut mesh, 0);

        assert!(mesh.triangles.len() >= 8);
        for v in &mesh.vertices[vert_base..] {
            assert!(v.position.y.abs() < 1e-5);
            assert!((v.normal - Vec3::Y).length() < 1e-4);
        }
    }

    #[test]
    fn spherical_cap_rises_above_ring() {
        let perlin = Perlin::with_seed(1);
        let mut mesh = TreeMesh::new();
        let mut ring = plain_ring(1.0, 0.0, 8);
        ring.build_vertices(&perlin, &mut mesh.vertices);

        let vert_base = mesh.vertices.len();
        ring.cap(1.0, 0.0, &perlin, CapMapping::Follow, 1.0, &mut mesh, 0);

        let max_y = mesh.vertices[vert_base..]
            .iter()
            .map(|v| v.position.y)
            .fold(f32::MIN, f32::max);
        assert!((max_y - 1.0).abs() < 0.1);
    }

    #[test]
    fn noise_displaces_but_stays_deterministic() {
        let perlin = Perlin::with_seed(3);
        let mut plain = Vec::new();
        let mut noisy_a = Vec::new();
        let mut noisy_b = Vec::new();

        let mut ring = plain_ring(1.0, 0.5, 12);
        ring.build_vertices(&perlin, &mut plain);

        let mut ring = plain_ring(1.0, 0.5, 12);
        ring.set_noise(0.3, 2.0, 2.0);
        ring.build_vertices(&perlin, &mut noisy_a);

        let mut ring = plain_ring(1.0, 0.5, 12);
        ring.set_noise(0.3, 2.0, 2.0);
        ring.build_vertices(&perlin, &mut noisy_b);

        let moved = plain
            .iter()
            .zip(&noisy_a)
            .any(|(p, n)| (p.position - n.position).length() > 1e-4);
        assert!(moved);
        for (a, b) in noisy_a.iter().zip(&noisy_b) {
            assert_eq!(a.position, b.position);
        }
    }
}
