use super::Aabb;
use glam::Vec3;
use ordered_float::OrderedFloat;

/// The final, flattened BVH node.
///
/// • `left` – index of the left-hand child in the node vector
/// • right-hand child is implicitly `left + 1`
#[derive(Debug, Clone)]
pub struct BvhNode {
    pub aabb: Aabb,
    /// Leaf: index of the original primitive.
    /// Internal: ignored.
    pub primitive: u32,
    /// Internal: index of the left child (right = left + 1).
    /// Leaf: ignored.
    pub left: u32,
    pub is_leaf: bool,
}

/* ------------------------------------------------------------------------- */

/// Flattened median-split BVH over a set of primitive bounds.
/// The root node is always at index `0`; an empty input yields an
/// empty tree that never reports hits.
#[derive(Debug, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
}

impl Bvh {
    pub fn build(aabbs: &[Aabb]) -> Self {
        if aabbs.is_empty() {
            return Self { nodes: Vec::new() };
        }

        // Pair every AABB with its original index.
        let mut items: Vec<(Aabb, u32)> = aabbs
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, a)| (a, i as u32))
            .collect();

        // The very first element is a dummy root that is overwritten
        // by the recursion.
        let mut nodes = Vec::new();
        nodes.push(dummy_node(&items[0].0));

        let len = items.len();
        build_in_place(&mut items, &mut nodes, 0, 0, len);

        Self { nodes }
    }

    /// Nearest hit along `origin + t·dir` for `t` in `[0, t_max]`.
    ///
    /// `intersect` tests a single primitive by index and returns the hit
    /// distance, if any. Returns `(primitive, t)` of the closest hit.
    pub fn raycast<F>(
        &self,
        origin: Vec3,
        dir: Vec3,
        t_max: f32,
        mut intersect: F,
    ) -> Option<(u32, f32)>
    where
        F: FnMut(u32, Vec3, Vec3) -> Option<f32>,
    {
        if self.nodes.is_empty() {
            return None;
        }
        let dir_inv = dir.recip();
        let mut best: Option<(u32, f32)> = None;
        let mut best_t = t_max;

        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.intersects_ray(origin, dir_inv, best_t) {
                continue;
            }
            if node.is_leaf {
                if let Some(t) = intersect(node.primitive, origin, dir) {
                    if t >= 0.0 && t < best_t {
                        best_t = t;
                        best = Some((node.primitive, t));
                    }
                }
            } else {
                stack.push(node.left as usize);
                stack.push(node.left as usize + 1);
            }
        }
        best
    }
}

/* ------------------------------------------------------------------------- */

/// Recursively builds the BVH and **writes** each node *in place*.
///
/// `node_index` – position in `nodes` that has to be filled
/// `start..end` – range inside `items` that this node covers
fn build_in_place(
    items: &mut [(Aabb, u32)],
    nodes: &mut Vec<BvhNode>,
    node_index: usize,
    start: usize,
    end: usize,
) {
    let count = end - start;

    // union AABB of the whole range.
    let mut union = items[start].0.clone();
    for i in (start + 1)..end {
        union = union.union(&items[i].0);
    }

    if count == 1 {
        nodes[node_index] = BvhNode {
            aabb: union,
            primitive: items[start].1,
            left: 0,
            is_leaf: true,
        };
        return;
    }

    // split on the longest axis.
    let dims = union.dimensions();
    let axis = if dims.x >= dims.y && dims.x >= dims.z {
        0
    } else if dims.y >= dims.x && dims.y >= dims.z {
        1
    } else {
        2
    };

    items[start..end].sort_by_key(|(aabb, _)| {
        let c = aabb.center();
        let k = match axis {
            0 => c.x,
            1 => c.y,
            _ => c.z,
        };
        OrderedFloat(k)
    });

    let mid = start + count / 2;

    // allocate *two consecutive* children.
    let left_index = nodes.len();
    nodes.push(dummy_node(&union)); // left
    nodes.push(dummy_node(&union)); // right ( => left + 1 )

    nodes[node_index] = BvhNode {
        aabb: union,
        primitive: 0,
        left: left_index as u32,
        is_leaf: false,
    };

    build_in_place(items, nodes, left_index, start, mid);
    build_in_place(items, nodes, left_index + 1, mid, end);
}

#[inline(always)]
fn dummy_node(aabb: &Aabb) -> BvhNode {
    BvhNode {
        aabb: aabb.clone(),
        primitive: 0,
        left: 0,
        is_leaf: false,
    }
}

/* ------------------------------------------------------------------------- */
/*                                    Tests                                  */
/* ------------------------------------------------------------------------- */
