mod perlin;
pub use perlin::*;

mod fractal;
pub use fractal::*;
