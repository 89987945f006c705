mod tree_spline;
pub use tree_spline::*;
