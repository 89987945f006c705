use glam::Vec3;

/// Approximate ambient-occlusion proxy volume. Accumulated while the
/// node tree is walked, consumed during vertex emission, then discarded.
#[derive(Debug, Clone, Copy)]
pub struct AoSphere {
    pub position: Vec3,
    pub radius: f32,
    pub density: f32,
}

impl AoSphere {
    pub fn new(position: Vec3, radius: f32, density: f32) -> Self {
        Self {
            position,
            radius,
            density,
        }
    }
}

/// Baked occlusion at `point`: `1 − clamp01(Σ area/(area + d²) · density
/// · global_density)` over all spheres.
pub fn occlusion(spheres: &[AoSphere], point: Vec3, global_density: f32) -> f32 {
    let mut total = 0.0;
    for sphere in spheres {
        let d2 = (sphere.position - point).length_squared();
        let area = sphere.radius * sphere.radius;
        if area <= 0.0 {
            continue;
        }
        total += area / (area + d2) * sphere.density * global_density;
    }
    1.0 - total.clamp(0.0, 1.0)
}
