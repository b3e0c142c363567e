//! Structural branch fingerprints.
//!
//! A [`BranchRep`] names a branch by what it separates rather than by where
//! it sits in one particular tree, so the same branch can be found in two
//! different parents during crossover.

use std::collections::BTreeMap;

use sha2::{Digest, Sha384};

use crate::tree::{NodeId, Tree};

use super::SPECIES_FEATURE;

/// Whether a branch ends in a leaf or in an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BranchKind {
    Leaf,
    Internal,
}

/// Branch identity: kind, species-labelled clade shape and the species
/// bipartition it induces.
///
/// The bipartition is stored with its lexicographically smaller side first,
/// so two branches separating the same species sets compare equal in either
/// orientation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchRep {
    kind: BranchKind,
    shape: String,
    split: (Vec<String>, Vec<String>),
}

/// Species of a leaf: its `species` attribute, or its name when unset.
pub fn leaf_species(tree: &Tree, node: NodeId) -> &str {
    tree.feature(node, SPECIES_FEATURE)
        .unwrap_or_else(|| tree.name(node))
}

/// Per-species leaf counts under `node`.
pub fn species_counter(tree: &Tree, node: NodeId) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for leaf in tree.leaves_of(node) {
        *counts.entry(leaf_species(tree, leaf).to_string()).or_insert(0) += 1;
    }
    counts
}

fn sha384_hex(data: &str) -> String {
    let mut hasher = Sha384::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl BranchRep {
    /// Build from explicit parts. `shape` is any canonical rendering of the
    /// clade; only its digest is kept.
    pub fn new(kind: BranchKind, shape: &str, inside: Vec<String>, outside: Vec<String>) -> Self {
        let (mut inside, mut outside) = (inside, outside);
        inside.sort();
        outside.sort();
        let split = if inside <= outside {
            (inside, outside)
        } else {
            (outside, inside)
        };
        Self {
            kind,
            shape: sha384_hex(shape),
            split,
        }
    }

    /// Fingerprint of the branch above `node`.
    pub fn of(tree: &Tree, node: NodeId) -> Self {
        let kind = if tree.is_leaf(node) {
            BranchKind::Leaf
        } else {
            BranchKind::Internal
        };
        let shape = tree.canonical_newick(node, |n| leaf_species(tree, n).to_string());

        let mut inside = Vec::new();
        let mut outside = Vec::new();
        for leaf in tree.leaves() {
            let species = leaf_species(tree, leaf).to_string();
            if leaf == node || tree.is_ancestor(node, leaf) {
                inside.push(species);
            } else {
                outside.push(species);
            }
        }
        Self::new(kind, &shape, inside, outside)
    }

    pub fn kind(&self) -> BranchKind {
        self.kind
    }

    pub fn is_internal(&self) -> bool {
        self.kind == BranchKind::Internal
    }

    /// Species bipartition, smaller side first.
    pub fn split(&self) -> (&[String], &[String]) {
        (&self.split.0, &self.split.1)
    }

    /// Single digest of the whole representation.
    pub fn fingerprint(&self) -> String {
        let kind = match self.kind {
            BranchKind::Leaf => "leaf",
            BranchKind::Internal => "internal",
        };
        sha384_hex(&format!(
            "{kind}|{}|{}|{}",
            self.shape,
            self.split.0.join(","),
            self.split.1.join(",")
        ))
    }
}

/// Every branch whose parent is not the root, in level order.
pub fn enumerate_branches(tree: &Tree) -> Vec<(BranchRep, NodeId)> {
    let root = tree.root();
    tree.levelorder_descendants(root)
        .into_iter()
        .filter(|&n| tree.parent(n) != Some(root))
        .map(|n| (BranchRep::of(tree, n), n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reflexive_and_orientation_symmetric() {
        let a = BranchRep::new(BranchKind::Internal, "(x,y);", names(&["a", "b"]), names(&["c", "d"]));
        let b = BranchRep::new(BranchKind::Internal, "(x,y);", names(&["d", "c"]), names(&["b", "a"]));
        assert_eq!(a, a.clone());
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());

        let leaf = BranchRep::new(BranchKind::Leaf, "(x,y);", names(&["a", "b"]), names(&["c", "d"]));
        assert_ne!(a, leaf);
        let other_shape = BranchRep::new(BranchKind::Internal, "(y,z);", names(&["a", "b"]), names(&["c", "d"]));
        assert_ne!(a, other_shape);
    }

    #[test]
    fn test_same_clade_in_two_trees() {
        let mut t1 = Tree::from_newick("(((a1,b1),c1),(d1,a2));").unwrap();
        let mut t2 = Tree::from_newick("(((b2,a2),c1),(a1,d1));").unwrap();
        for tree in [&mut t1, &mut t2] {
            for leaf in tree.leaves() {
                let species = tree.name(leaf)[..1].to_string();
                tree.set_feature(leaf, SPECIES_FEATURE, species);
            }
        }
        let clade1 = t1.common_ancestor_of_names(&["a1", "b1"]).unwrap();
        let clade2 = t2.common_ancestor_of_names(&["b2", "a2"]).unwrap();
        assert_eq!(BranchRep::of(&t1, clade1), BranchRep::of(&t2, clade2));

        let counts = species_counter(&t1, t1.root());
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["d"], 1);
    }

    #[test]
    fn test_enumeration_skips_root_children() {
        let tree = Tree::from_newick("((a,b),(c,(d,e)));").unwrap();
        let branches = enumerate_branches(&tree);
        // a, b, c and (d,e) then d and e
        assert_eq!(branches.len(), 6);
        let root = tree.root();
        assert!(branches.iter().all(|(_, n)| tree.parent(*n) != Some(root)));
        assert_eq!(branches.iter().filter(|(b, _)| b.is_internal()).count(), 1);
    }
}
