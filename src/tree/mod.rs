mod node;
pub use node::*;

mod group;
pub use group::*;

mod pipeline;
pub use pipeline::*;

mod branch;
mod leaf;

use indexmap::IndexMap;

/// Id of a [`TreeGroup`] inside one [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub(crate) u32);

/// Id of a [`TreeNode`] inside one [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

/// The parameter tree: flat arenas of groups and nodes, related by ids.
///
/// Exactly one root group exists; it always carries exactly one node
/// with no parent. Group parent/child relations form a tree rooted
/// there. All placement and geometry state is derived from this
/// structure by [`regenerate`].
#[derive(Debug)]
pub struct Tree {
    root_seed: i32,
    root: GroupId,
    groups: IndexMap<GroupId, TreeGroup>,
    nodes: IndexMap<NodeId, TreeNode>,
    next_group: u32,
    next_node: u32,
}

impl Tree {
    pub fn new(root_seed: i32) -> Self {
        let root = GroupId(0);
        let root_node = NodeId(0);

        let mut groups = IndexMap::new();
        groups.insert(
            root,
            TreeGroup::new(root, None, GroupKind::Root(RootParams::default())),
        );
        groups[&root].nodes.push(root_node);

        let mut nodes = IndexMap::new();
        nodes.insert(root_node, TreeNode::new(root_node, root, None));

        Self {
            root_seed,
            root,
            groups,
            nodes,
            next_group: 1,
            next_node: 1,
        }
    }

    pub fn root_seed(&self) -> i32 {
        self.root_seed
    }

    pub fn set_root_seed(&mut self, seed: i32) {
        self.root_seed = seed;
    }

    pub fn root(&self) -> GroupId {
        self.root
    }

    /// Suggested edge size for the externally baked shadow texture,
    /// derived from the root quality tier.
    pub fn shadow_texture_size(&self) -> u32 {
        match &self.group(self.root).kind {
            GroupKind::Root(params) => 256 << params.shadow_texture_quality.min(4),
            _ => 256,
        }
    }

    pub fn add_branch_group(&mut self, parent: GroupId, params: BranchParams) -> GroupId {
        self.add_group(parent, GroupKind::Branch(params))
    }

    pub fn add_leaf_group(&mut self, parent: GroupId, params: LeafParams) -> GroupId {
        self.add_group(parent, GroupKind::Leaf(params))
    }

    fn add_group(&mut self, parent: GroupId, kind: GroupKind) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        self.groups.insert(id, TreeGroup::new(id, Some(parent), kind));
        self.group_mut(parent).children.push(id);
        id
    }

    pub fn group(&self, id: GroupId) -> &TreeGroup {
        self.groups.get(&id).expect("dangling group id")
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut TreeGroup {
        self.groups.get_mut(&id).expect("dangling group id")
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        self.nodes.get(&id).expect("dangling node id")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        self.nodes.get_mut(&id).expect("dangling node id")
    }

    pub fn groups(&self) -> impl Iterator<Item = &TreeGroup> {
        self.groups.values()
    }

    /// Group ids in depth-first pre-order: every parent before its
    /// children, sibling order preserved.
    pub fn group_order(&self) -> Vec<GroupId> {
        let mut order = Vec::with_capacity(self.groups.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let group = self.group(id);
            for &child in group.children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    pub(crate) fn alloc_node(&mut self, group: GroupId, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, TreeNode::new(id, group, parent));
        id
    }

    pub(crate) fn remove_node(&mut self, id: NodeId) {
        self.nodes.shift_remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tree_has_one_parentless_root_node() {
        let tree = Tree::new(42);
        let root = tree.group(tree.root());
        assert!(matches!(root.kind, GroupKind::Root(_)));
        assert_eq!(root.nodes.len(), 1);
        assert!(tree.node(root.nodes[0]).parent.is_none());
    }

    #[test]
    fn group_order_visits_parents_first() {
        let mut tree = Tree::new(1);
        let trunk = tree.add_branch_group(tree.root(), BranchParams::default());
        let twig = tree.add_branch_group(trunk, BranchParams::default());
        let leaves = tree.add_leaf_group(twig, LeafParams::default());

        let order = tree.group_order();
        let pos = |id| order.iter().position(|&g| g == id).unwrap();
        assert_eq!(pos(tree.root()), 0);
        assert!(pos(trunk) < pos(twig));
        assert!(pos(twig) < pos(leaves));
    }

    #[test]
    fn shadow_texture_size_follows_quality_tier() {
        let mut tree = Tree::new(1);
        assert_eq!(tree.shadow_texture_size(), 256 << 1);
        if let GroupKind::Root(params) = &mut tree.group_mut(tree.root()).kind {
            params.shadow_texture_quality = 3;
        }
        assert_eq!(tree.shadow_texture_size(), 2048);
    }
}
