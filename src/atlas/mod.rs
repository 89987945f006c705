mod texture_atlas;
pub use texture_atlas::*;
