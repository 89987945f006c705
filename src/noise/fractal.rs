use super::Perlin;

/// Octave compositor over a [`Perlin`] field.
///
/// The per-octave spectral weights are fixed at construction; the three
/// compositors walk the integer octaves and add a fractional remainder
/// octave when the octave count is not whole.
pub struct FractalNoise {
    perlin: Perlin,
    exponent: Vec<f32>,
    int_octaves: usize,
    octaves: f32,
    lacunarity: f32,
}

impl FractalNoise {
    /// `h` is the spectral falloff exponent, `lacunarity` the per-octave
    /// frequency multiplier, `octaves` the (possibly fractional) octave
    /// count.
    pub fn new(h: f32, lacunarity: f32, octaves: f32, perlin: Perlin) -> Self {
        let int_octaves = octaves.max(0.0) as usize;
        let mut exponent = Vec::with_capacity(int_octaves + 2);
        let mut frequency = 1.0f32;
        for _ in 0..int_octaves + 2 {
            exponent.push(frequency.powf(-h));
            frequency *= lacunarity;
        }

        Self {
            perlin,
            exponent,
            int_octaves,
            octaves: octaves.max(0.0),
            lacunarity,
        }
    }

    pub fn perlin(&self) -> &Perlin {
        &self.perlin
    }

    pub fn hybrid_multifractal(&self, x: f32, y: f32, offset: f32) -> f32 {
        let mut x = x;
        let mut y = y;

        let mut value = (self.perlin.noise2(x, y) + offset) * self.exponent[0];
        let mut weight = value;
        x *= self.lacunarity;
        y *= self.lacunarity;

        for i in 1..self.int_octaves {
            if weight > 1.0 {
                weight = 1.0;
            }
            let signal = (self.perlin.noise2(x, y) + offset) * self.exponent[i];
            value += weight * signal;
            weight *= signal;
            x *= self.lacunarity;
            y *= self.lacunarity;
        }

        let remainder = self.octaves - self.int_octaves as f32;
        if remainder > 0.0 {
            value += remainder * self.perlin.noise2(x, y) * self.exponent[self.int_octaves];
        }
        value
    }

    pub fn ridged_multifractal(&self, x: f32, y: f32, offset: f32, gain: f32) -> f32 {
        let mut x = x;
        let mut y = y;

        let mut signal = offset - self.perlin.noise2(x, y).abs();
        signal *= signal;
        let mut value = signal;

        for i in 1..self.int_octaves {
            x *= self.lacunarity;
            y *= self.lacunarity;

            let weight = (signal * gain).clamp(0.0, 1.0);
            signal = offset - self.perlin.noise2(x, y).abs();
            signal *= signal;
            signal *= weight;
            value += signal * self.exponent[i];
        }
        value
    }

    pub fn brownian_motion(&self, x: f32, y: f32) -> f32 {
        let mut x = x;
        let mut y = y;

        let mut value = 0.0;
        for i in 0..self.int_octaves {
            value += self.perlin.noise2(x, y) * self.exponent[i];
            x *= self.lacunarity;
            y *= self.lacunarity;
        }

        let remainder = self.octaves - self.int_octaves as f32;
        if remainder > 0.0 {
            value += remainder * self.perlin.noise2(x, y) * self.exponent[self.int_octaves];
        }
        value
    }
}
