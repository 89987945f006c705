use glam::Vec3;

#[derive(Debug, Clone)]
pub struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing all the given points.
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut min = Vec3::INFINITY;
        let mut max = Vec3::NEG_INFINITY;
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        Aabb::new(min, max)
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    /// Returns a new Aabb that encloses both self and the other Aabb.
    pub fn union(&self, other: &Aabb) -> Aabb {
        let min = self.min().min(other.min());
        let max = self.max().max(other.max());
        Aabb::new(min, max)
    }

    pub fn center(&self) -> Vec3 {
        (self.max() + self.min()) * 0.5
    }

    pub fn dimensions(&self) -> Vec3 {
        self.max() - self.min()
    }

    /// Expand the box by `amount` on every side.
    pub fn grow(&self, amount: f32) -> Aabb {
        let d = Vec3::splat(amount);
        Aabb::new(self.min - d, self.max + d)
    }

    /// Slab test against a ray given as origin and the component-wise
    /// inverse of its direction. Returns `true` when the ray enters the
    /// box anywhere in `[0, t_max]`.
    pub fn intersects_ray(&self, origin: Vec3, dir_inv: Vec3, t_max: f32) -> bool {
        let t0 = (self.min - origin) * dir_inv;
        let t1 = (self.max - origin) * dir_inv;
        let t_near = t0.min(t1);
        let t_far = t0.max(t1);
        let enter = t_near.max_element().max(0.0);
        let exit = t_far.min_element().min(t_max);
        enter <= exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_encloses_both() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        let u = a.union(&b);
        assert_eq!(u.min(), Vec3::ZERO);
        assert_eq!(u.max(), Vec3::splat(3.0));
    }

    #[test]
    fn ray_hits_and_misses() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let dir = Vec3::new(0.0, 0.0, 1.0);
        let dir_inv = dir.recip();
        assert!(b.intersects_ray(Vec3::new(0.0, 0.0, -5.0), dir_inv, 100.0));
        // pointing away
        assert!(!b.intersects_ray(Vec3::new(0.0, 0.0, 5.0), dir_inv, 100.0));
        // ray too short
        assert!(!b.intersects_ray(Vec3::new(0.0, 0.0, -5.0), dir_inv, 1.0));
    }
}
