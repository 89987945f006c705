//! Procedural tree mesh generation.
//!
//! A parameter tree of branch/leaf groups is expanded into flat
//! vertex/triangle/material buffers through a fixed stage pipeline:
//! frequency → seed → distribution → parameters → matrix → mesh.
//! The whole pass is deterministic for a given root seed.

pub mod atlas;
pub mod curve;
pub mod geom;
pub mod mesh;
pub mod noise;
pub mod spline;
pub mod tree;

pub use curve::Curve;
pub use mesh::{MaterialId, TreeMesh, TreeTriangle, TreeVertex};
pub use tree::{regenerate, Tree};
