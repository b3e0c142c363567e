//! Topological comparison of trees.

use std::collections::BTreeSet;

use super::Tree;

impl Tree {
    /// Non-trivial bipartitions of the leaf names, each stored as the side
    /// that excludes the lexicographically smallest leaf.
    pub fn splits(&self) -> BTreeSet<Vec<String>> {
        let all: BTreeSet<String> = self.leaf_names().into_iter().collect();
        let mut out = BTreeSet::new();
        let Some(anchor) = all.first().cloned() else {
            return out;
        };
        let total = all.len();

        for node in self.descendants(self.root()) {
            if self.is_leaf(node) {
                continue;
            }
            let clade: BTreeSet<String> = self.leaf_names_of(node).into_iter().collect();
            if clade.len() <= 1 || clade.len() + 1 >= total {
                continue;
            }
            let side: Vec<String> = if clade.contains(&anchor) {
                all.difference(&clade).cloned().collect()
            } else {
                clade.into_iter().collect()
            };
            out.insert(side);
        }
        out
    }

    /// Robinson-Foulds distance between the unrooted topologies, together
    /// with the maximum possible distance for the two trees.
    pub fn robinson_foulds(&self, other: &Tree) -> (usize, usize) {
        let ours = self.splits();
        let theirs = other.splits();
        let rf = ours.symmetric_difference(&theirs).count();
        (rf, ours.len() + theirs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_topologies() {
        let t1 = Tree::from_newick("((a,b),(c,(d,e)));").unwrap();
        let t2 = Tree::from_newick("(((e,d),c),(b,a));").unwrap();
        assert_eq!(t1.robinson_foulds(&t2).0, 0);
    }

    #[test]
    fn test_different_topologies() {
        let t1 = Tree::from_newick("((a,b),(c,(d,e)));").unwrap();
        let t2 = Tree::from_newick("((a,c),(b,(d,e)));").unwrap();
        let (rf, max) = t1.robinson_foulds(&t2);
        assert_eq!(rf, 2);
        assert_eq!(max, 4);
    }

    #[test]
    fn test_rooting_does_not_matter() {
        let t1 = Tree::from_newick("((a,b),(c,d));").unwrap();
        let t2 = Tree::from_newick("(a,(b,(c,d)));").unwrap();
        assert_eq!(t1.robinson_foulds(&t2).0, 0);
    }
}
