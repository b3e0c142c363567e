//! Arena-indexed rooted tree.
//!
//! Nodes live in a growable table and reference each other by [`NodeId`].
//! Structural edits (detach, attach, delete, re-root) only rewrite the
//! parent/child index fields, so a node id stays valid for the lifetime of the
//! tree even after the node has been cut out of the reachable structure.
//! Unreachable slots are dropped by [`Tree::copy`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use super::TreeError;

/// Index of a node inside a [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node label (gene name for leaves, usually empty for internal nodes).
    pub name: String,
    /// Length of the branch above this node.
    pub dist: f64,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    features: BTreeMap<String, String>,
}

impl Node {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dist: 0.0,
            parent: None,
            children: Vec::new(),
            features: BTreeMap::new(),
        }
    }
}

/// Rooted tree with named leaves and per-node string attributes.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Create a tree made of a single root node.
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node::new(root_name)],
            root: NodeId(0),
        }
    }

    /// Root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Add a detached node to the arena.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        self.nodes.push(Node::new(name));
        NodeId(self.nodes.len() - 1)
    }

    /// Add a new node as the last child of `parent`.
    pub fn add_new_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let child = self.add_node(name);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        child
    }

    /// Attach a detached node (and its subtree) as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check(parent)?;
        self.check(child)?;
        if child == self.root || self.nodes[child.0].parent.is_some() {
            return Err(TreeError::AlreadyAttached(child.0));
        }
        if self.is_ancestor(child, parent) || child == parent {
            return Err(TreeError::Cycle(child.0));
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Cut `node` from its parent. The root cannot be detached and is left as is.
    pub fn detach(&mut self, node: NodeId) -> NodeId {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
        node
    }

    /// Remove an internal, non-root node and hand its children to its parent,
    /// in the position the node occupied.
    pub fn delete(&mut self, node: NodeId) {
        let Some(parent) = self.nodes[node.0].parent else {
            return;
        };
        let children = std::mem::take(&mut self.nodes[node.0].children);
        let dist = self.nodes[node.0].dist;
        for &child in &children {
            self.nodes[child.0].parent = Some(parent);
            self.nodes[child.0].dist += dist;
        }
        let siblings = &mut self.nodes[parent.0].children;
        if let Some(pos) = siblings.iter().position(|&c| c == node) {
            siblings.splice(pos..=pos, children);
        }
        self.nodes[node.0].parent = None;
    }

    /// Remove a leaf, then every ancestor left without children.
    pub fn remove_leaf(&mut self, leaf: NodeId) {
        let mut current = leaf;
        while let Some(parent) = self.parent(current) {
            self.detach(current);
            if parent == self.root || !self.nodes[parent.0].children.is_empty() {
                break;
            }
            current = parent;
        }
    }

    /// Collapse every non-root node with exactly one child. With `enable_root`,
    /// a single-child root is replaced by its child as well.
    pub fn collapse_single_child(&mut self, enable_root: bool) {
        let mut order = self.preorder(self.root);
        order.reverse();
        for node in order {
            if node != self.root && self.nodes[node.0].children.len() == 1 {
                self.delete(node);
            }
        }
        if enable_root {
            while self.nodes[self.root.0].children.len() == 1 {
                let child = self.nodes[self.root.0].children[0];
                self.nodes[self.root.0].children.clear();
                self.nodes[child.0].parent = None;
                self.nodes[child.0].dist = 0.0;
                self.root = child;
            }
        }
    }

    /// Drop every attribute of every node.
    pub fn clear_features(&mut self) {
        for node in &mut self.nodes {
            node.features.clear();
        }
    }

    /// Node accessor.
    pub fn node(&self, node: NodeId) -> &Node {
        &self.nodes[node.0]
    }

    /// Node label.
    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    /// Replace a node label.
    pub fn set_name(&mut self, node: NodeId, name: impl Into<String>) {
        self.nodes[node.0].name = name.into();
    }

    /// Branch length above `node`.
    pub fn dist(&self, node: NodeId) -> f64 {
        self.nodes[node.0].dist
    }

    /// Set the branch length above `node`.
    pub fn set_dist(&mut self, node: NodeId, dist: f64) {
        self.nodes[node.0].dist = dist;
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.nodes[node.0].children.is_empty()
    }

    pub fn is_root(&self, node: NodeId) -> bool {
        node == self.root
    }

    /// Named attribute of a node.
    pub fn feature(&self, node: NodeId, key: &str) -> Option<&str> {
        self.nodes[node.0].features.get(key).map(String::as_str)
    }

    /// Set a named attribute.
    pub fn set_feature(&mut self, node: NodeId, key: impl Into<String>, value: impl Into<String>) {
        self.nodes[node.0].features.insert(key.into(), value.into());
    }

    /// All named attributes of a node.
    pub fn features(&self, node: NodeId) -> &BTreeMap<String, String> {
        &self.nodes[node.0].features
    }

    /// `node` followed by all its descendants, parents before children.
    pub fn preorder(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current.0].children.iter().rev());
        }
        out
    }

    /// Every node reachable from the root.
    pub fn traverse(&self) -> Vec<NodeId> {
        self.preorder(self.root)
    }

    /// Descendants of `node` (excluding itself) in preorder.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut all = self.preorder(node);
        all.remove(0);
        all
    }

    /// Descendants of `node` (excluding itself) in breadth-first order.
    pub fn levelorder_descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut queue: VecDeque<NodeId> = self.children(node).iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            out.push(current);
            queue.extend(self.children(current).iter().copied());
        }
        out
    }

    /// Leaves under `node`, left to right.
    pub fn leaves_of(&self, node: NodeId) -> Vec<NodeId> {
        self.preorder(node)
            .into_iter()
            .filter(|&n| self.is_leaf(n))
            .collect()
    }

    /// Leaves of the whole tree.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.leaves_of(self.root)
    }

    /// Leaf names under `node`.
    pub fn leaf_names_of(&self, node: NodeId) -> Vec<String> {
        self.leaves_of(node)
            .into_iter()
            .map(|n| self.nodes[n.0].name.clone())
            .collect()
    }

    /// Leaf names of the whole tree.
    pub fn leaf_names(&self) -> Vec<String> {
        self.leaf_names_of(self.root)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Number of reachable nodes.
    pub fn node_count(&self) -> usize {
        self.traverse().len()
    }

    /// Ancestors of `node`, nearest first, ending at the root.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.nodes[node.0].parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.nodes[parent.0].parent;
        }
        out
    }

    /// Whether `ancestor` lies on the path from `node` to the root.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes[node.0].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent.0].parent;
        }
        false
    }

    /// Nodes that are neither ancestors nor descendants of `node`.
    pub fn incomparable(&self, node: NodeId) -> Vec<NodeId> {
        let mut excluded: HashSet<NodeId> = self.ancestors(node).into_iter().collect();
        excluded.extend(self.preorder(node));
        self.traverse()
            .into_iter()
            .filter(|n| !excluded.contains(n))
            .collect()
    }

    /// Deepest node having every node of `nodes` in its subtree.
    pub fn common_ancestor(&self, nodes: &[NodeId]) -> Result<NodeId, TreeError> {
        let (&first, rest) = nodes.split_first().ok_or(TreeError::EmptyNodeSet)?;
        let mut path = vec![first];
        path.extend(self.ancestors(first));
        let depth: HashMap<NodeId, usize> = path.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        let mut deepest = 0;
        for &node in rest {
            let mut current = Some(node);
            while let Some(n) = current {
                if let Some(&idx) = depth.get(&n) {
                    deepest = deepest.max(idx);
                    break;
                }
                current = self.nodes[n.0].parent;
            }
        }
        Ok(path[deepest])
    }

    /// Common ancestor of the leaves with the given names.
    pub fn common_ancestor_of_names<S: AsRef<str>>(&self, names: &[S]) -> Result<NodeId, TreeError> {
        let nodes = names
            .iter()
            .map(|name| self.leaf_by_name(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.common_ancestor(&nodes)
    }

    /// Leaf with the given name.
    pub fn find_leaf(&self, name: &str) -> Option<NodeId> {
        self.leaves().into_iter().find(|&n| self.nodes[n.0].name == name)
    }

    /// Leaf with the given name, or an error.
    pub fn leaf_by_name(&self, name: &str) -> Result<NodeId, TreeError> {
        self.find_leaf(name)
            .ok_or_else(|| TreeError::LeafNotFound(name.to_string()))
    }

    /// Reachable nodes whose attribute `key` equals `value`.
    pub fn search_nodes(&self, key: &str, value: &str) -> Vec<NodeId> {
        self.traverse()
            .into_iter()
            .filter(|&n| self.feature(n, key) == Some(value))
            .collect()
    }

    /// Copy the subtree rooted at `node` into a new, compact tree.
    pub fn extract_subtree(&self, node: NodeId) -> Tree {
        let mut out = Tree {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        out.copy_from(self, node, None);
        out
    }

    /// Compact deep copy of the reachable tree.
    pub fn copy(&self) -> Tree {
        self.extract_subtree(self.root)
    }

    /// Copy `subtree` into this arena as the last child of `parent`.
    /// Returns the id of the grafted subtree root.
    pub fn graft(&mut self, parent: NodeId, subtree: &Tree) -> Result<NodeId, TreeError> {
        self.check(parent)?;
        Ok(self.copy_from(subtree, subtree.root, Some(parent)))
    }

    fn copy_from(&mut self, source: &Tree, node: NodeId, parent: Option<NodeId>) -> NodeId {
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        let mut top = None;
        for current in source.preorder(node) {
            let mut copied = source.nodes[current.0].clone();
            copied.children.clear();
            copied.parent = if current == node {
                parent
            } else {
                source.nodes[current.0].parent.map(|p| mapping[&p])
            };
            self.nodes.push(copied);
            let id = NodeId(self.nodes.len() - 1);
            if let Some(p) = self.nodes[id.0].parent {
                self.nodes[p.0].children.push(id);
            }
            mapping.insert(current, id);
            top.get_or_insert(id);
        }
        let top = top.unwrap_or(node);
        if parent.is_none() && self.nodes.len() == mapping.len() {
            self.root = top;
        }
        top
    }

    /// Re-root the tree on the branch above `outgroup`, so that the outgroup
    /// clade becomes one of the two root children.
    pub fn set_outgroup(&mut self, outgroup: NodeId) -> Result<(), TreeError> {
        self.check(outgroup)?;
        if outgroup == self.root {
            return Err(TreeError::OutgroupIsRoot);
        }
        if self.nodes[self.root.0].children.len() == 1 {
            self.collapse_single_child(true);
            if outgroup == self.root {
                return Err(TreeError::OutgroupIsRoot);
            }
        }

        let old_root = self.root;
        let reachable = self.traverse();
        let root_children = self.nodes[old_root.0].children.clone();
        let bifurcating_root = root_children.len() == 2;

        let mut adjacency: HashMap<NodeId, Vec<(NodeId, f64)>> = HashMap::new();
        let mut link = |a: NodeId, b: NodeId, len: f64| {
            adjacency.entry(a).or_default().push((b, len));
            adjacency.entry(b).or_default().push((a, len));
        };
        for &node in &reachable {
            let Some(parent) = self.nodes[node.0].parent else {
                continue;
            };
            if bifurcating_root && parent == old_root {
                continue;
            }
            link(node, parent, self.nodes[node.0].dist);
        }
        if bifurcating_root {
            let (a, b) = (root_children[0], root_children[1]);
            link(a, b, self.nodes[a.0].dist + self.nodes[b.0].dist);
        }

        let anchor = match self.nodes[outgroup.0].parent {
            Some(parent) if bifurcating_root && parent == old_root => root_children
                .iter()
                .copied()
                .find(|&c| c != outgroup)
                .ok_or(TreeError::OutgroupIsRoot)?,
            Some(parent) => parent,
            None => return Err(TreeError::UnknownNode(outgroup.0)),
        };
        let edge_len = adjacency
            .get(&outgroup)
            .and_then(|nbrs| nbrs.iter().find(|(n, _)| *n == anchor))
            .map_or(0.0, |(_, len)| *len);
        if let Some(nbrs) = adjacency.get_mut(&outgroup) {
            nbrs.retain(|(n, _)| *n != anchor);
        }
        if let Some(nbrs) = adjacency.get_mut(&anchor) {
            nbrs.retain(|(n, _)| *n != outgroup);
        }

        for &node in &reachable {
            self.nodes[node.0].children.clear();
            self.nodes[node.0].parent = None;
        }
        let new_root = if bifurcating_root {
            old_root
        } else {
            self.add_node("")
        };
        self.root = new_root;
        self.nodes[new_root.0].dist = 0.0;

        let mut visited: HashSet<NodeId> = HashSet::from([new_root, outgroup, anchor]);
        let mut stack = Vec::new();
        for side in [outgroup, anchor] {
            self.nodes[side.0].parent = Some(new_root);
            self.nodes[side.0].dist = edge_len / 2.0;
            self.nodes[new_root.0].children.push(side);
            stack.push(side);
        }
        while let Some(node) = stack.pop() {
            let neighbours = adjacency.get(&node).cloned().unwrap_or_default();
            for (next, len) in neighbours {
                if !visited.insert(next) {
                    continue;
                }
                self.nodes[next.0].parent = Some(node);
                self.nodes[next.0].dist = len;
                self.nodes[node.0].children.push(next);
                stack.push(next);
            }
        }
        Ok(())
    }

    fn check(&self, node: NodeId) -> Result<(), TreeError> {
        if node.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(TreeError::UnknownNode(node.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree {
        Tree::from_newick("((a,b),(c,(d,e)));").unwrap()
    }

    #[test]
    fn test_leaves_and_counts() {
        let tree = sample();
        assert_eq!(tree.leaf_names(), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(tree.leaf_count(), 5);
        assert_eq!(tree.node_count(), 9);
    }

    #[test]
    fn test_common_ancestor() {
        let tree = sample();
        let ca = tree.common_ancestor_of_names(&["d", "c"]).unwrap();
        let mut names = tree.leaf_names_of(ca);
        names.sort();
        assert_eq!(names, vec!["c", "d", "e"]);

        let root = tree.common_ancestor_of_names(&["a", "e"]).unwrap();
        assert!(tree.is_root(root));
    }

    #[test]
    fn test_incomparable_excludes_lineage() {
        let tree = sample();
        let d = tree.find_leaf("d").unwrap();
        let incomparable = tree.incomparable(d);
        for node in &incomparable {
            assert!(!tree.is_ancestor(*node, d));
            assert!(!tree.is_ancestor(d, *node));
            assert_ne!(*node, d);
        }
        // a, b, (a,b), c, e
        assert_eq!(incomparable.len(), 5);
    }

    #[test]
    fn test_detach_and_attach() {
        let mut tree = sample();
        let a = tree.find_leaf("a").unwrap();
        let e = tree.find_leaf("e").unwrap();
        tree.detach(a);
        let e_parent = tree.parent(e).unwrap();
        tree.add_child(e_parent, a).unwrap();
        assert_eq!(tree.leaf_count(), 5);
        assert!(tree.add_child(e_parent, a).is_err());
    }

    #[test]
    fn test_collapse_single_child() {
        let mut tree = sample();
        let a = tree.find_leaf("a").unwrap();
        tree.remove_leaf(a);
        tree.collapse_single_child(true);
        assert_eq!(tree.to_newick(false), "(b,(c,(d,e)));");
    }

    #[test]
    fn test_remove_leaf_prunes_empty_ancestors() {
        let mut tree = sample();
        for name in ["d", "e"] {
            let leaf = tree.find_leaf(name).unwrap();
            tree.remove_leaf(leaf);
        }
        tree.collapse_single_child(true);
        assert_eq!(tree.leaf_names(), vec!["a", "b", "c"]);
        assert!(tree.leaves().iter().all(|&l| !tree.name(l).is_empty()));
    }

    #[test]
    fn test_set_outgroup_preserves_unrooted_topology() {
        let mut tree = sample();
        let before = tree.copy();
        let d = tree.find_leaf("d").unwrap();
        tree.set_outgroup(d).unwrap();

        let root = tree.root();
        assert_eq!(tree.children(root).len(), 2);
        assert!(tree.children(root).contains(&d));
        assert_eq!(tree.leaf_count(), 5);
        assert_eq!(tree.robinson_foulds(&before).0, 0);
    }

    #[test]
    fn test_set_outgroup_rejects_root() {
        let mut tree = sample();
        let root = tree.root();
        assert_eq!(tree.set_outgroup(root), Err(TreeError::OutgroupIsRoot));
    }

    #[test]
    fn test_graft_copies_subtree() {
        let mut tree = sample();
        let other = Tree::from_newick("(x,y);").unwrap();
        let root = tree.root();
        let grafted = tree.graft(root, &other).unwrap();
        assert_eq!(tree.parent(grafted), Some(root));
        assert_eq!(tree.leaf_count(), 7);
    }

    #[test]
    fn test_features_and_search() {
        let mut tree = sample();
        let a = tree.find_leaf("a").unwrap();
        let b = tree.find_leaf("b").unwrap();
        tree.set_feature(a, "species", "S1");
        tree.set_feature(b, "species", "S1");
        assert_eq!(tree.search_nodes("species", "S1"), vec![a, b]);
        assert_eq!(tree.feature(a, "species"), Some("S1"));

        let copy = tree.copy();
        let a2 = copy.find_leaf("a").unwrap();
        assert_eq!(copy.feature(a2, "species"), Some("S1"));
    }
}
