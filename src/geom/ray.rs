use glam::Vec3;

/// Möller–Trumbore ray/triangle intersection.
///
/// Returns the hit distance along the (not necessarily normalized)
/// direction, or `None` when the ray misses. Both triangle windings
/// are accepted.
pub fn ray_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;

    let ab = b - a;
    let ac = c - a;
    let p = dir.cross(ac);
    let det = ab.dot(p);
    if det.abs() < EPSILON {
        // ray parallel to the triangle plane.
        return None;
    }

    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(ab);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = ac.dot(q) * inv_det;
    if t >= 0.0 {
        Some(t)
    } else {
        None
    }
}
