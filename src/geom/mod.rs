mod aabb;
pub use aabb::*;

mod bvh;
pub use bvh::*;

mod ray;
pub use ray::*;
