use glam::{Mat3, Quat, Vec3, Vec4};

/// One control point of a [`TreeSpline`]. Owned exclusively by its
/// spline and rebuilt wholesale whenever the spline is rebuilt.
#[derive(Debug, Clone)]
pub struct SplineNode {
    pub point: Vec3,
    pub rot: Quat,
    pub normal: Vec3,
    pub tangent: Vec3,
    /// Arc-length-normalized parameter in [0, 1].
    pub time: f32,
}

impl SplineNode {
    pub fn new(point: Vec3, time: f32) -> Self {
        Self {
            point,
            rot: Quat::IDENTITY,
            normal: Vec3::Z,
            tangent: Vec3::Y,
            time,
        }
    }
}

/// Catmull-Rom-style 3-D curve sampled by arc-time.
///
/// Node order is arc order. After [`update_time`](Self::update_time) the
/// node times are monotone with `nodes[0].time == 0` and
/// `nodes[last].time == 1`.
#[derive(Debug, Clone)]
pub struct TreeSpline {
    nodes: Vec<SplineNode>,
    /// Interpolation stiffness; 0.5 is a classic Catmull-Rom.
    pub tension: f32,
}

impl Default for TreeSpline {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            tension: 0.5,
        }
    }
}

impl TreeSpline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
    }

    pub fn add_point(&mut self, point: Vec3, time_hint: f32) {
        self.nodes.push(SplineNode::new(point, time_hint));
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[SplineNode] {
        &self.nodes
    }

    /// Chord-length sum over the control polygon.
    pub fn approximate_length(&self) -> f32 {
        let mut length = 0.0;
        for pair in self.nodes.windows(2) {
            length += (pair[1].point - pair[0].point).length();
        }
        length
    }

    /// Recompute node times as cumulative chord length over total length.
    ///
    /// A fully degenerate spline (total length ~ 0) falls back to evenly
    /// spaced times so the monotonicity invariant still holds.
    pub fn update_time(&mut self) {
        if self.nodes.len() < 2 {
            return;
        }

        let total: f32 = self.approximate_length();
        if total <= f32::EPSILON {
            log::warn!("zero-length spline, assigning uniform node times");
            let last = (self.nodes.len() - 1) as f32;
            for (i, node) in self.nodes.iter_mut().enumerate() {
                node.time = i as f32 / last;
            }
            return;
        }

        let mut travelled = 0.0;
        let mut prev = self.nodes[0].point;
        for node in self.nodes.iter_mut() {
            travelled += (node.point - prev).length();
            prev = node.point;
            node.time = travelled / total;
        }
        self.nodes[0].time = 0.0;
        let last = self.nodes.len() - 1;
        self.nodes[last].time = 1.0;
    }

    /// Recompute a smoothly varying orthonormal frame per node.
    ///
    /// The tangent is the average of the neighboring chord directions
    /// (clamped at the ends); the right vector is carried from node to
    /// node and re-orthogonalized, which keeps the frame from spinning.
    /// Quaternion signs are aligned pairwise so interpolation never runs
    /// the long way around (double-cover fix).
    pub fn update_rotations(&mut self) {
        let n = self.nodes.len();
        if n < 2 {
            return;
        }

        let mut right = Vec3::X;
        let mut prev_rot = Quat::IDENTITY;

        for i in 0..n {
            let before = self.nodes[i.saturating_sub(1)].point;
            let after = self.nodes[(i + 1).min(n - 1)].point;
            let tangent = (after - before).normalize_or_zero();
            let tangent = if tangent == Vec3::ZERO { Vec3::Y } else { tangent };

            // Gram-Schmidt the carried right vector against the tangent.
            let mut r = right - tangent * right.dot(tangent);
            if r.length_squared() < 1e-10 {
                // carried right collapsed onto the tangent, restart from
                // whichever axis is least aligned.
                let fallback = if tangent.x.abs() < 0.9 { Vec3::X } else { Vec3::Z };
                r = fallback - tangent * fallback.dot(tangent);
            }
            let r = r.normalize();
            // right-handed frame: right × tangent gives the normal.
            let normal = r.cross(tangent);

            let mut rot = Quat::from_mat3(&Mat3::from_cols(r, tangent, normal));
            if i > 0 && rot.dot(prev_rot) < 0.0 {
                rot = -rot;
            }

            let node = &mut self.nodes[i];
            node.tangent = tangent;
            node.normal = normal;
            node.rot = rot;

            right = r;
            prev_rot = rot;
        }
    }

    /// Position at arc-time `t`, clamped to the node range.
    /// Fewer than 2 nodes degenerate to `Vec3::ZERO`.
    pub fn position_at_time(&self, t: f32) -> Vec3 {
        if self.nodes.len() < 2 {
            return Vec3::ZERO;
        }
        match self.bracket(t) {
            Bracket::Before => self.nodes[0].point,
            Bracket::After => self.nodes[self.nodes.len() - 1].point,
            Bracket::Inside(i, u) => {
                let (p0, p1, p2, p3) = self.neighborhood(i);
                let m1 = (p2.point - p0.point) * self.tension;
                let m2 = (p3.point - p1.point) * self.tension;
                let (h00, h10, h01, h11) = hermite(u);
                p1.point * h00 + m1 * h10 + p2.point * h01 + m2 * h11
            }
        }
    }

    /// Rotation at arc-time `t`, clamped to the node range.
    /// Fewer than 2 nodes degenerate to `Quat::IDENTITY`.
    ///
    /// Quaternions blend component-wise through the same Hermite basis as
    /// positions, then normalize. This relies on the sign alignment done
    /// in [`update_rotations`](Self::update_rotations).
    pub fn rotation_at_time(&self, t: f32) -> Quat {
        if self.nodes.len() < 2 {
            return Quat::IDENTITY;
        }
        match self.bracket(t) {
            Bracket::Before => self.nodes[0].rot,
            Bracket::After => self.nodes[self.nodes.len() - 1].rot,
            Bracket::Inside(i, u) => {
                let (p0, p1, p2, p3) = self.neighborhood(i);
                let q0 = Vec4::from(p0.rot);
                let q1 = Vec4::from(p1.rot);
                let q2 = Vec4::from(p2.rot);
                let q3 = Vec4::from(p3.rot);
                let m1 = (q2 - q0) * self.tension;
                let m2 = (q3 - q1) * self.tension;
                let (h00, h10, h01, h11) = hermite(u);
                let q = q1 * h00 + m1 * h10 + q2 * h01 + m2 * h11;
                Quat::from_vec4(q).normalize()
            }
        }
    }

    /// Bracketing segment for `t`: segment index plus local parameter.
    fn bracket(&self, t: f32) -> Bracket {
        let nodes = &self.nodes;
        if t <= nodes[0].time {
            return Bracket::Before;
        }
        if t >= nodes[nodes.len() - 1].time {
            return Bracket::After;
        }
        let mut i = 0;
        while nodes[i + 1].time < t {
            i += 1;
        }
        let span = nodes[i + 1].time - nodes[i].time;
        let u = if span <= f32::EPSILON {
            0.0
        } else {
            (t - nodes[i].time) / span
        };
        Bracket::Inside(i, u)
    }

    /// Segment nodes plus outer neighbors, clamped at the sequence ends.
    fn neighborhood(&self, i: usize) -> (&SplineNode, &SplineNode, &SplineNode, &SplineNode) {
        let n = self.nodes.len();
        (
            &self.nodes[i.saturating_sub(1)],
            &self.nodes[i],
            &self.nodes[i + 1],
            &self.nodes[(i + 2).min(n - 1)],
        )
    }
}

enum Bracket {
    Before,
    After,
    Inside(usize, f32),
}

#[inline]
fn hermite(u: f32) -> (f32, f32, f32, f32) {
    let u2 = u * u;
    let u3 = u2 * u;
    (
        2.0 * u3 - 3.0 * u2 + 1.0,
        u3 - 2.0 * u2 + u,
        -2.0 * u3 + 3.0 * u2,
        u3 - u2,
    )
}

/* ------------------------------------------------------------------------- */
/*                                    Tests                                  */
/* ------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_spline(n: usize) -> TreeSpline {
        let mut s = TreeSpline::new();
        for i in 0..n {
            s.add_point(Vec3::new(0.0, i as f32, 0.0), 0.0);
        }
        s.update_time();
        s.update_rotations();
        s
    }

    #[test]
    fn time_monotone_and_pinned() {
        let mut s = TreeSpline::new();
        s.add_point(Vec3::ZERO, 0.0);
        s.add_point(Vec3::new(0.0, 1.0, 0.0), 0.0);
        s.add_point(Vec3::new(0.0, 4.0, 0.0), 0.0);
        s.add_point(Vec3::new(0.0, 5.0, 0.0), 0.0);
        s.update_time();

        let nodes = s.nodes();
        assert_eq!(nodes[0].time, 0.0);
        assert_eq!(nodes[3].time, 1.0);
        for pair in nodes.windows(2) {
            assert!(pair[0].time <= pair[1].time);
        }
        // times are proportional to chord length, not node index.
        assert!((nodes[1].time - 0.2).abs() < 1e-5);
        assert!((nodes[2].time - 0.8).abs() < 1e-5);
    }

    #[test]
    fn zero_length_spline_gets_uniform_times() {
        let mut s = TreeSpline::new();
        for _ in 0..3 {
            s.add_point(Vec3::ONE, 0.0);
        }
        s.update_time();
        let nodes = s.nodes();
        assert_eq!(nodes[0].time, 0.0);
        assert!((nodes[1].time - 0.5).abs() < 1e-6);
        assert_eq!(nodes[2].time, 1.0);
    }

    #[test]
    fn degenerate_spline_samples_identity() {
        let mut s = TreeSpline::new();
        assert_eq!(s.position_at_time(0.5), Vec3::ZERO);
        assert_eq!(s.rotation_at_time(0.5), Quat::IDENTITY);
        s.add_point(Vec3::new(3.0, 0.0, 0.0), 0.0);
        assert_eq!(s.position_at_time(0.5), Vec3::ZERO);
    }

    #[test]
    fn clamped_outside_range() {
        let s = straight_spline(3);
        assert_eq!(s.position_at_time(-1.0), s.nodes()[0].point);
        assert_eq!(s.position_at_time(2.0), s.nodes()[2].point);
    }

    #[test]
    fn continuous_across_node_boundaries() {
        let mut s = TreeSpline::new();
        s.add_point(Vec3::ZERO, 0.0);
        s.add_point(Vec3::new(1.0, 1.0, 0.0), 0.0);
        s.add_point(Vec3::new(0.5, 2.0, 1.0), 0.0);
        s.add_point(Vec3::new(0.0, 3.0, 0.5), 0.0);
        s.update_time();
        s.update_rotations();

        for node in s.nodes() {
            let t = node.time;
            let before = s.position_at_time((t - 1e-4).clamp(0.0, 1.0));
            let after = s.position_at_time((t + 1e-4).clamp(0.0, 1.0));
            assert!((after - before).length() < 1e-2);
        }
    }

    #[test]
    fn repeated_sampling_is_pure() {
        let s = straight_spline(4);
        for i in 0..=10 {
            let t = i as f32 / 10.0;
            assert_eq!(s.position_at_time(t), s.position_at_time(t));
            assert_eq!(s.rotation_at_time(t), s.rotation_at_time(t));
        }
    }

    #[test]
    fn straight_spline_points_up() {
        let s = straight_spline(4);
        let p = s.position_at_time(0.5);
        assert!((p - Vec3::new(0.0, 1.5, 0.0)).length() < 1e-4);
        // the frame's Y axis must follow the growth direction.
        let up = s.rotation_at_time(0.5) * Vec3::Y;
        assert!((up - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn neighbor_rotations_stay_in_same_hemisphere() {
        let mut s = TreeSpline::new();
        // a sharp S-bend that would flip a naive frame.
        s.add_point(Vec3::ZERO, 0.0);
        s.add_point(Vec3::new(0.0, 1.0, 0.0), 0.0);
        s.add_point(Vec3::new(1.0, 1.5, 0.0), 0.0);
        s.add_point(Vec3::new(1.0, 0.5, 0.0), 0.0);
        s.update_time();
        s.update_rotations();

        for pair in s.nodes().windows(2) {
            assert!(pair[0].rot.dot(pair[1].rot) >= 0.0);
        }
    }
}
