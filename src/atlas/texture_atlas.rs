use glam::Vec2;
use ordered_float::OrderedFloat;
use thiserror::Error;

use crate::mesh::MaterialId;

/// Axis-aligned rectangle in texel (or normalized UV) space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

/// One packed texture entry: pack-once, read-many until the atlas is
/// rebuilt.
#[derive(Debug, Clone)]
pub struct TextureNode {
    pub texture: MaterialId,
    /// Requested size in texels.
    pub source_rect: Rect,
    /// Placement inside the atlas in texels.
    pub packed_rect: Rect,
    /// Placement normalized to [0, 1] against the atlas target size.
    pub uv_rect: Rect,
    /// Tiles vertically: packed as a full-height column so V can wrap.
    pub tile_v: bool,
}

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("atlas has no textures to pack")]
    Empty,
    #[error("target size must be non-zero")]
    DegenerateTarget,
}

/// 2-D rectangle packer for the combined tree texture sheet.
///
/// V-tiling textures (branch bark) occupy full-height columns packed
/// left to right; everything else shelf-packs into the remaining area,
/// tallest first. Entries are scaled down uniformly until they fit, so
/// packing always succeeds for a non-degenerate target.
#[derive(Debug, Default)]
pub struct TextureAtlas {
    nodes: Vec<TextureNode>,
    packed: bool,
}

impl TextureAtlas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, texture: MaterialId, size: Vec2, tile_v: bool) {
        self.nodes.push(TextureNode {
            texture,
            source_rect: Rect::new(0.0, 0.0, size.x.max(1.0), size.y.max(1.0)),
            packed_rect: Rect::new(0.0, 0.0, 0.0, 0.0),
            uv_rect: Rect::new(0.0, 0.0, 0.0, 0.0),
            tile_v,
        });
        self.packed = false;
    }

    pub fn nodes(&self) -> &[TextureNode] {
        &self.nodes
    }

    /// Packed UV rect for `texture`, if it was added and packed.
    pub fn uv_rect(&self, texture: MaterialId) -> Option<Rect> {
        if !self.packed {
            return None;
        }
        self.nodes
            .iter()
            .find(|n| n.texture == texture)
            .map(|n| n.uv_rect)
    }

    pub fn pack(
        &mut self,
        target_width: u32,
        target_height: u32,
        padding: u32,
        correct_pow2: bool,
    ) -> Result<(), AtlasError> {
        if self.nodes.is_empty() {
            return Err(AtlasError::Empty);
        }
        if target_width == 0 || target_height == 0 {
            return Err(AtlasError::DegenerateTarget);
        }

        let tw = target_width as f32;
        let th = target_height as f32;
        let pad = padding as f32;

        // tiled columns first, widest first for a stable layout.
        let mut tiled: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].tile_v)
            .collect();
        tiled.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(self.nodes[i].source_rect.w)));

        let mut untiled: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| !self.nodes[i].tile_v)
            .collect();
        untiled.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(self.nodes[i].source_rect.h)));

        // columns may not squeeze the shelf area out entirely.
        let column_limit = if untiled.is_empty() { tw } else { tw * 0.5 };
        let mut column_width: f32 = tiled
            .iter()
            .map(|&i| self.sized(i, correct_pow2).x + pad)
            .sum();
        let column_scale = if column_width > column_limit && column_width > 0.0 {
            column_limit / column_width
        } else {
            1.0
        };

        let mut cursor_x = 0.0;
        for &i in &tiled {
            let size = self.sized(i, correct_pow2);
            let w = (size.x * column_scale).max(1.0);
            self.nodes[i].packed_rect = Rect::new(cursor_x, 0.0, w, th);
            cursor_x += w + pad;
        }
        column_width = cursor_x;

        // shelf-pack the rest into the remaining area, scaling down
        // until everything fits.
        let mut scale = 1.0f32;
        'retry: loop {
            let mut shelf_x = column_width;
            let mut shelf_y = 0.0f32;
            let mut shelf_h = 0.0f32;

            let mut placements = Vec::with_capacity(untiled.len());
            for &i in &untiled {
                let size = self.sized(i, correct_pow2) * scale;
                let (w, h) = (size.x.max(1.0), size.y.max(1.0));

                if shelf_x + w > tw {
                    // new shelf.
                    shelf_x = column_width;
                    shelf_y += shelf_h + pad;
                    shelf_h = 0.0;
                }
                if shelf_x + w > tw || shelf_y + h > th {
                    scale *= 0.8;
                    if scale < 1e-3 {
                        // cannot happen for a non-degenerate target, but
                        // never loop forever on pathological inputs.
                        log::warn!("atlas packing degenerated, giving up on scaling");
                        break;
                    }
                    continue 'retry;
                }

                placements.push((i, Rect::new(shelf_x, shelf_y, w, h)));
                shelf_x += w + pad;
                shelf_h = shelf_h.max(h);
            }

            for (i, rect) in placements {
                self.nodes[i].packed_rect = rect;
            }
            break;
        }

        for node in &mut self.nodes {
            node.uv_rect = Rect::new(
                node.packed_rect.x / tw,
                node.packed_rect.y / th,
                node.packed_rect.w / tw,
                node.packed_rect.h / th,
            );
        }
        self.packed = true;
        Ok(())
    }

    fn sized(&self, i: usize, correct_pow2: bool) -> Vec2 {
        let r = self.nodes[i].source_rect;
        if correct_pow2 {
            Vec2::new(next_pow2(r.w), next_pow2(r.h))
        } else {
            Vec2::new(r.w, r.h)
        }
    }
}

fn next_pow2(v: f32) -> f32 {
    let mut p = 1u32;
    while (p as f32) < v {
        p <<= 1;
    }
    p as f32
}

/* ------------------------------------------------------------------------- */
/*                                    Tests                                  */
/* ------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_atlas_refuses_to_pack() {
        let mut atlas = TextureAtlas::new();
        assert!(matches!(atlas.pack(256, 256, 0, false), Err(AtlasError::Empty)));
    }

    #[test]
    fn degenerate_target_refused() {
        let mut atlas = TextureAtlas::new();
        atlas.add(MaterialId(1), Vec2::new(64.0, 64.0), false);
        assert!(matches!(
            atlas.pack(0, 256, 0, false),
            Err(AtlasError::DegenerateTarget)
        ));
    }

    #[test]
    fn tiled_textures_get_full_height_columns() {
        let mut atlas = TextureAtlas::new();
        atlas.add(MaterialId(1), Vec2::new(64.0, 64.0), true);
        atlas.add(MaterialId(2), Vec2::new(32.0, 32.0), true);
        atlas.pack(256, 256, 0, false).unwrap();

        for node in atlas.nodes() {
            assert_eq!(node.packed_rect.h, 256.0);
            assert_eq!(node.uv_rect.h, 1.0);
            assert_eq!(node.packed_rect.y, 0.0);
        }
        // widest column first, no overlap.
        assert_eq!(atlas.nodes()[0].packed_rect.x, 0.0);
    }

    #[test]
    fn untiled_rects_do_not_overlap() {
        let mut atlas = TextureAtlas::new();
        for i in 0..6 {
            atlas.add(MaterialId(i), Vec2::new(100.0, 60.0 + i as f32 * 10.0), false);
        }
        atlas.pack(256, 256, 2, false).unwrap();

        let rects: Vec<Rect> = atlas.nodes().iter().map(|n| n.packed_rect).collect();
        for (i, a) in rects.iter().enumerate() {
            assert!(a.x + a.w <= 256.0 + 1e-3);
            assert!(a.y + a.h <= 256.0 + 1e-3);
            for b in rects.iter().skip(i + 1) {
                let separated = a.x + a.w <= b.x + 1e-3
                    || b.x + b.w <= a.x + 1e-3
                    || a.y + a.h <= b.y + 1e-3
                    || b.y + b.h <= a.y + 1e-3;
                assert!(separated, "rects overlap: {a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn uv_rects_are_normalized() {
        let mut atlas = TextureAtlas::new();
        atlas.add(MaterialId(1), Vec2::new(128.0, 128.0), false);
        atlas.pack(256, 256, 0, false).unwrap();

        let uv = atlas.uv_rect(MaterialId(1)).unwrap();
        assert!(uv.w > 0.0 && uv.w <= 1.0);
        assert!(uv.h > 0.0 && uv.h <= 1.0);
        assert!(atlas.uv_rect(MaterialId(99)).is_none());
    }

    #[test]
    fn pow2_correction_rounds_sizes_up() {
        let mut atlas = TextureAtlas::new();
        atlas.add(MaterialId(1), Vec2::new(100.0, 60.0), false);
        atlas.pack(512, 512, 0, true).unwrap();

        let node = &atlas.nodes()[0];
        assert_eq!(node.packed_rect.w, 128.0);
        assert_eq!(node.packed_rect.h, 64.0);
    }

    #[test]
    fn oversized_input_scales_down_to_fit() {
        let mut atlas = TextureAtlas::new();
        for i in 0..4 {
            atlas.add(MaterialId(i), Vec2::new(300.0, 300.0), false);
        }
        atlas.pack(256, 256, 0, false).unwrap();
        for node in atlas.nodes() {
            assert!(node.packed_rect.w <= 256.0);
            assert!(node.packed_rect.h <= 256.0);
        }
    }
}
