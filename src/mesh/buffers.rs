use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use indexmap::IndexMap;

/// Opaque handle to an externally owned material/texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// One output vertex, laid out for direct GPU upload.
///
/// `color.x/y/z` pack the wind animation coefficients (primary sway,
/// secondary sway, edge flutter), `color.w` is baked ambient occlusion.
/// `uv1` carries the per-node wind phase pair.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TreeVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec4,
    pub uv0: Vec2,
    pub uv1: Vec2,
    pub color: Vec4,
}

impl Default for TreeVertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
            uv0: Vec2::ZERO,
            uv1: Vec2::ZERO,
            color: Vec4::ONE,
        }
    }
}

/// One output triangle: three vertex indices plus the material slot it
/// renders with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeTriangle {
    pub v: [u32; 3],
    pub material_index: u32,
    /// Shader reorients the surface toward the camera.
    pub billboard: bool,
    /// Alpha-cutout rendering (leaf cards).
    pub cutout: bool,
    /// The material's V coordinate tiles (branch bark).
    pub tile_v: bool,
}

impl TreeTriangle {
    pub fn new(v: [u32; 3], material_index: u32) -> Self {
        Self {
            v,
            material_index,
            billboard: false,
            cutout: false,
            tile_v: false,
        }
    }
}

/// One deduplicated output material slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialSlot {
    pub material: MaterialId,
    /// Set when any geometry using this slot tiles in V.
    pub tile_v: bool,
}

/// The flat output buffers of one generation pass.
///
/// Owned by the caller; cleared and rebuilt wholesale on every pass,
/// never patched incrementally.
#[derive(Debug, Default)]
pub struct TreeMesh {
    pub vertices: Vec<TreeVertex>,
    pub triangles: Vec<TreeTriangle>,
    materials: IndexMap<MaterialId, MaterialSlot>,
}

impl TreeMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.triangles.clear();
        self.materials.clear();
    }

    /// Slot index for `material`, deduplicated by id in first-use order.
    /// `tile_v` ORs into the slot so a material ever used tiled stays
    /// flagged as tiled.
    pub fn material_index(&mut self, material: MaterialId, tile_v: bool) -> u32 {
        let entry = self
            .materials
            .entry(material)
            .or_insert(MaterialSlot { material, tile_v });
        entry.tile_v |= tile_v;
        self.materials.get_index_of(&material).expect("slot just inserted") as u32
    }

    pub fn materials(&self) -> impl Iterator<Item = &MaterialSlot> {
        self.materials.values()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}

/// Externally supplied instance mesh, cloned per node for Mesh-mode
/// leaves. Buffers are parallel; `indices` is a triangle list.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_dedup_keeps_first_use_order() {
        let mut mesh = TreeMesh::new();
        let bark = MaterialId(7);
        let leaf = MaterialId(3);

        assert_eq!(mesh.material_index(bark, true), 0);
        assert_eq!(mesh.material_index(leaf, false), 1);
        assert_eq!(mesh.material_index(bark, false), 0);
        assert_eq!(mesh.material_count(), 2);

        // tiling flag sticks once set.
        let slots: Vec<_> = mesh.materials().cloned().collect();
        assert!(slots[0].tile_v);
        assert!(!slots[1].tile_v);
    }

    #[test]
    fn clear_resets_material_lookup() {
        let mut mesh = TreeMesh::new();
        mesh.material_index(MaterialId(1), false);
        mesh.clear();
        assert_eq!(mesh.material_count(), 0);
        assert_eq!(mesh.material_index(MaterialId(2), false), 0);
    }

    #[test]
    fn vertex_is_pod_sized_for_upload() {
        // position + normal + tangent + uv0 + uv1 + color, tightly packed.
        assert_eq!(std::mem::size_of::<TreeVertex>(), 72);
        let v = TreeVertex::default();
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 72);
    }
}
