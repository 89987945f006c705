use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const B: usize = 256;
const BM: usize = B - 1;
/// Table size: base entries, duplicated once for wraparound, plus two
/// guard entries read by the smooth interpolation.
const TABLE: usize = B + B + 2;
/// Offset applied before lattice folding so moderately negative
/// coordinates still land on a positive lattice.
const N: f32 = 4096.0;

/// Classic lattice-gradient noise with a seeded permutation table and
/// 1-D/2-D/3-D gradient tables.
///
/// Values are smooth, deterministic for a given seed, and roughly in
/// [-1, 1] (unnormalized). NaN/Inf inputs propagate, nothing panics.
pub struct Perlin {
    p: [usize; TABLE],
    g1: [f32; TABLE],
    g2: [[f32; 2]; TABLE],
    g3: [[f32; 3]; TABLE],
}

impl Perlin {
    pub fn with_seed(seed: i32) -> Self {
        let mut noise = Self {
            p: [0; TABLE],
            g1: [0.0; TABLE],
            g2: [[0.0; 2]; TABLE],
            g3: [[0.0; 3]; TABLE],
        };
        noise.set_seed(seed);
        noise
    }

    /// Rebuild the permutation and gradient tables from `seed`.
    pub fn set_seed(&mut self, seed: i32) {
        let mut rng = StdRng::seed_from_u64(seed as u64);

        for i in 0..B {
            self.p[i] = i;
            self.g1[i] = rng.random_range(-1.0..=1.0);

            let g2 = [rng.random_range(-1.0..=1.0), rng.random_range(-1.0..=1.0)];
            self.g2[i] = normalize2(g2);

            let g3 = [
                rng.random_range(-1.0..=1.0),
                rng.random_range(-1.0..=1.0),
                rng.random_range(-1.0..=1.0),
            ];
            self.g3[i] = normalize3(g3);
        }

        // Fisher-Yates over the permutation table.
        for i in (1..B).rev() {
            let j = rng.random_range(0..=i);
            self.p.swap(i, j);
        }

        // duplicate for wraparound.
        for i in 0..B + 2 {
            self.p[B + i] = self.p[i];
            self.g1[B + i] = self.g1[i];
            self.g2[B + i] = self.g2[i];
            self.g3[B + i] = self.g3[i];
        }
    }

    pub fn noise1(&self, x: f32) -> f32 {
        let (bx0, bx1, rx0, rx1) = setup(x);
        let sx = s_curve(rx0);

        let u = rx0 * self.g1[self.p[bx0]];
        let v = rx1 * self.g1[self.p[bx1]];
        lerp(sx, u, v)
    }

    pub fn noise2(&self, x: f32, y: f32) -> f32 {
        let (bx0, bx1, rx0, rx1) = setup(x);
        let (by0, by1, ry0, ry1) = setup(y);

        let i = self.p[bx0];
        let j = self.p[bx1];

        let b00 = self.p[i + by0];
        let b10 = self.p[j + by0];
        let b01 = self.p[i + by1];
        let b11 = self.p[j + by1];

        let sx = s_curve(rx0);
        let sy = s_curve(ry0);

        let u = at2(rx0, ry0, self.g2[b00]);
        let v = at2(rx1, ry0, self.g2[b10]);
        let a = lerp(sx, u, v);

        let u = at2(rx0, ry1, self.g2[b01]);
        let v = at2(rx1, ry1, self.g2[b11]);
        let b = lerp(sx, u, v);

        lerp(sy, a, b)
    }

    pub fn noise3(&self, x: f32, y: f32, z: f32) -> f32 {
        let (bx0, bx1, rx0, rx1) = setup(x);
        let (by0, by1, ry0, ry1) = setup(y);
        let (bz0, bz1, rz0, rz1) = setup(z);

        let i = self.p[bx0];
        let j = self.p[bx1];

        let b00 = self.p[i + by0];
        let b10 = self.p[j + by0];
        let b01 = self.p[i + by1];
        let b11 = self.p[j + by1];

        let sx = s_curve(rx0);
        let sy = s_curve(ry0);
        let sz = s_curve(rz0);

        let u = at3(rx0, ry0, rz0, self.g3[b00 + bz0]);
        let v = at3(rx1, ry0, rz0, self.g3[b10 + bz0]);
        let a = lerp(sx, u, v);

        let u = at3(rx0, ry1, rz0, self.g3[b01 + bz0]);
        let v = at3(rx1, ry1, rz0, self.g3[b11 + bz0]);
        let b = lerp(sx, u, v);

        let c = lerp(sy, a, b);

        let u = at3(rx0, ry0, rz1, self.g3[b00 + bz1]);
        let v = at3(rx1, ry0, rz1, self.g3[b10 + bz1]);
        let a = lerp(sx, u, v);

        let u = at3(rx0, ry1, rz1, self.g3[b01 + bz1]);
        let v = at3(rx1, ry1, rz1, self.g3[b11 + bz1]);
        let b = lerp(sx, u, v);

        let d = lerp(sy, a, b);

        lerp(sz, c, d)
    }
}

/* ------------------------------------------------------------------------- */

/// Lattice cell and fractional offsets for one coordinate.
#[inline(always)]
fn setup(v: f32) -> (usize, usize, f32, f32) {
    let t = v + N;
    let it = t.floor();
    let b0 = (it as i64 as usize) & BM;
    let b1 = (b0 + 1) & BM;
    let r0 = t - it;
    let r1 = r0 - 1.0;
    (b0, b1, r0, r1)
}

#[inline(always)]
fn s_curve(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

#[inline(always)]
fn lerp(t: f32, a: f32, b: f32) -> f32 {
    a + t * (b - a)
}

#[inline(always)]
fn at2(rx: f32, ry: f32, g: [f32; 2]) -> f32 {
    rx * g[0] + ry * g[1]
}

#[inline(always)]
fn at3(rx: f32, ry: f32, rz: f32, g: [f32; 3]) -> f32 {
    rx * g[0] + ry * g[1] + rz * g[2]
}

fn normalize2(v: [f32; 2]) -> [f32; 2] {
    let len = (v[0] * v[0] + v[1] * v[1]).sqrt();
    if len <= f32::EPSILON {
        return [1.0, 0.0];
    }
    [v[0] / len, v[1] / len]
}

fn normalize3(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        return [1.0, 0.0, 0.0];
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

/* ------------------------------------------------------------------------- */
/*                                    Tests                                  */
/* ------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_values() {
        let a = Perlin::with_seed(42);
        let b = Perlin::with_seed(42);
        for i in 0..64 {
            let x = i as f32 * 0.37;
            let y = i as f32 * 0.13;
            assert_eq!(a.noise2(x, y).to_bits(), b.noise2(x, y).to_bits());
            assert_eq!(
                a.noise3(x, y, 0.5).to_bits(),
                b.noise3(x, y, 0.5).to_bits()
            );
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let a = Perlin::with_seed(1);
        let b = Perlin::with_seed(2);
        let mut any_diff = false;
        for i in 0..64 {
            let x = i as f32 * 0.29 + 0.1;
            if a.noise1(x) != b.noise1(x) {
                any_diff = true;
                break;
            }
        }
        assert!(any_diff);
    }

    #[test]
    fn zero_at_lattice_points() {
        // at integer lattice coordinates every fractional offset is zero,
        // so all gradient dot products vanish.
        let noise = Perlin::with_seed(7);
        for i in 0..8 {
            assert!(noise.noise2(i as f32, i as f32).abs() < 1e-4);
        }
    }

    #[test]
    fn values_stay_bounded_on_a_grid() {
        let noise = Perlin::with_seed(1234);
        for i in 0..50 {
            for j in 0..50 {
                let v = noise.noise2(i as f32 * 0.17, j as f32 * 0.23);
                assert!(v > -1.5 && v < 1.5, "out of range: {v}");
            }
        }
    }
}
