//! Crossover strategies for tree genomes.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::evolution::{EvolutionError, Result};
use crate::tree::{NodeId, Tree, TreeError};

use super::{BranchRep, TreeGenome, enumerate_branches, leaf_species, species_counter};

/// Occurrences of one branch: node and parent index (0 or 1).
type Occurrences = Vec<(NodeId, usize)>;

/// Engine crossover hook: dispatches on the run's reconciliation setting.
pub fn tree_crossover(mom: &TreeGenome, dad: &TreeGenome, rng: &mut StdRng) -> Result<(TreeGenome, TreeGenome)> {
    if mom.context().reconcile() {
        no_recon_crossover(dad, mom, rng)
    } else {
        cost_preserve_crossover(dad, mom, rng)
    }
}

/// Swap one clade present in both parents with identical species content.
///
/// Both offspring keep the leaf-species multiset of their parent. When no
/// such clade exists the offspring are plain clones.
pub fn cost_preserve_crossover(
    dad: &TreeGenome,
    mom: &TreeGenome,
    rng: &mut StdRng,
) -> Result<(TreeGenome, TreeGenome)> {
    let mut g1 = dad.clone();
    let mut g2 = mom.clone();
    let prob = g1.intbrnp().max(g2.intbrnp());

    let mut buckets: BTreeMap<BranchRep, Occurrences> = BTreeMap::new();
    for (index, genome) in [&g1, &g2].into_iter().enumerate() {
        for (rep, node) in enumerate_branches(genome.tree()) {
            buckets.entry(rep).or_default().push((node, index));
        }
    }

    let trees = [g1.tree(), g2.tree()];
    let candidates: Vec<(BranchRep, Occurrences)> = buckets
        .into_iter()
        .filter(|(_, occurrences)| branch_is_valid(&trees, occurrences))
        .collect();
    if candidates.is_empty() {
        debug!("No shared branch between parents, offspring are clones");
        return Ok((g1, g2));
    }

    let Some((rep, occurrences)) = two_step_branch_selection(&candidates, prob, rng) else {
        return Ok((g1, g2));
    };
    debug!(
        "Swapping {:?} branch {} across {} occurrences",
        rep.kind(),
        rep.fingerprint(),
        occurrences.len()
    );
    find_and_swap(&mut g1, &mut g2, occurrences)?;
    Ok((g1, g2))
}

/// A branch can be swapped when both parents hold it and every occurrence
/// covers the same species counts.
fn branch_is_valid(trees: &[&Tree; 2], occurrences: &Occurrences) -> bool {
    let parents: BTreeSet<usize> = occurrences.iter().map(|&(_, i)| i).collect();
    if parents.len() < 2 {
        return false;
    }
    let counts: Vec<BTreeMap<String, usize>> = occurrences
        .iter()
        .map(|&(node, i)| species_counter(trees[i], node))
        .collect();
    counts.iter().all(|c| *c == counts[0])
}

/// Prefer internal branches with probability `prob`, leaf branches
/// otherwise, falling back to any candidate when the preferred kind is
/// absent.
pub fn two_step_branch_selection<'a, T>(
    candidates: &'a [(BranchRep, T)],
    prob: f64,
    rng: &mut StdRng,
) -> Option<&'a (BranchRep, T)> {
    let want_internal = rng.r#gen::<f64>() < prob;
    let preferred: Vec<&(BranchRep, T)> = candidates
        .iter()
        .filter(|(rep, _)| rep.is_internal() == want_internal)
        .collect();
    if preferred.is_empty() {
        return candidates.choose(rng);
    }
    preferred.choose(rng).copied()
}

/// Exchange the first occurrence of a branch between both genomes.
///
/// Leaves outside the swapped clades whose names would collide with the
/// incoming clade are renamed to unused genes of the same species first.
fn find_and_swap(g1: &mut TreeGenome, g2: &mut TreeGenome, occurrences: &Occurrences) -> Result<()> {
    let first = |parent: usize| {
        occurrences
            .iter()
            .find(|&&(_, i)| i == parent)
            .map(|&(node, _)| node)
    };
    let (Some(swap1), Some(swap2)) = (first(0), first(1)) else {
        return Ok(());
    };

    let names1: BTreeSet<String> = g1.tree().leaf_names_of(swap1).into_iter().collect();
    let names2: BTreeSet<String> = g2.tree().leaf_names_of(swap2).into_iter().collect();
    if names1 != names2 {
        let swapped_species: BTreeSet<String> = g1
            .tree()
            .leaves_of(swap1)
            .into_iter()
            .map(|n| leaf_species(g1.tree(), n).to_string())
            .collect();
        let outside1 = outside_by_species(g1.tree(), swap1);
        let outside2 = outside_by_species(g2.tree(), swap2);

        for species in &swapped_species {
            let empty = Vec::new();
            let out1 = outside1.get(species).unwrap_or(&empty);
            let out2 = outside2.get(species).unwrap_or(&empty);
            let used1: BTreeSet<String> = out1.iter().map(|&n| g1.tree().name(n).to_string()).collect();
            let used2: BTreeSet<String> = out2.iter().map(|&n| g2.tree().name(n).to_string()).collect();
            let mut free1: BTreeSet<String> = used2.difference(&used1).cloned().collect();
            let mut free2: BTreeSet<String> = used1.difference(&used2).cloned().collect();

            rename_clashes(g1.tree_mut(), out1, &names2, &mut free1);
            rename_clashes(g2.tree_mut(), out2, &names1, &mut free2);
        }
    }

    let clade1 = g1.tree().extract_subtree(swap1);
    let clade2 = g2.tree().extract_subtree(swap2);
    let parent1 = g1.tree().parent(swap1).ok_or(TreeError::UnknownNode(swap1.index()))?;
    let parent2 = g2.tree().parent(swap2).ok_or(TreeError::UnknownNode(swap2.index()))?;

    let tree1 = g1.tree_mut();
    tree1.detach(swap1);
    tree1.graft(parent1, &clade2)?;
    *tree1 = tree1.copy();

    let tree2 = g2.tree_mut();
    tree2.detach(swap2);
    tree2.graft(parent2, &clade1)?;
    *tree2 = tree2.copy();
    Ok(())
}

fn outside_by_species(tree: &Tree, clade: NodeId) -> BTreeMap<String, Vec<NodeId>> {
    let mut out: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for leaf in tree.leaves() {
        if leaf == clade || tree.is_ancestor(clade, leaf) {
            continue;
        }
        out.entry(leaf_species(tree, leaf).to_string()).or_default().push(leaf);
    }
    out
}

fn rename_clashes(tree: &mut Tree, leaves: &[NodeId], incoming: &BTreeSet<String>, free: &mut BTreeSet<String>) {
    for &leaf in leaves {
        if !incoming.contains(tree.name(leaf)) {
            continue;
        }
        match free.pop_first() {
            Some(name) => tree.set_name(leaf, name),
            None => warn!("No unused gene left to rename clashing leaf '{}'", tree.name(leaf)),
        }
    }
}

/// Graft a random clade of each parent into a copy of the other parent,
/// removing the grafted genes from their previous positions first.
pub fn no_recon_crossover(dad: &TreeGenome, mom: &TreeGenome, rng: &mut StdRng) -> Result<(TreeGenome, TreeGenome)> {
    let expected = dad.tree().leaf_count();
    let mut child1 = dad.clone();
    let mut child2 = mom.clone();
    let donor1 = child1.tree().copy();
    let donor2 = child2.tree().copy();

    transplant(&donor1, child2.tree_mut(), rng)?;
    transplant(&donor2, child1.tree_mut(), rng)?;

    for child in [&child1, &child2] {
        let got = child.tree().leaf_count();
        if got != expected {
            return Err(EvolutionError::LeafCountMismatch { expected, got });
        }
    }
    Ok((child1, child2))
}

fn transplant(donor: &Tree, receiver: &mut Tree, rng: &mut StdRng) -> Result<()> {
    let Some(&clade) = donor.descendants(donor.root()).choose(rng) else {
        return Ok(());
    };
    let subtree = donor.extract_subtree(clade);
    let moved: BTreeSet<String> = subtree.leaf_names().into_iter().collect();

    for leaf in receiver.leaves() {
        if moved.contains(receiver.name(leaf)) {
            receiver.remove_leaf(leaf);
        }
    }
    receiver.collapse_single_child(true);

    let anchor = receiver.descendants(receiver.root()).choose(rng).copied();
    *receiver = graft_above(receiver, anchor, &subtree)?;
    receiver.collapse_single_child(true);
    *receiver = receiver.copy();
    Ok(())
}

/// Insert a new node on the branch above `anchor` holding `subtree` and
/// `anchor`. Without an anchor, the new node becomes the root.
fn graft_above(tree: &Tree, anchor: Option<NodeId>, subtree: &Tree) -> Result<Tree> {
    let Some(anchor) = anchor.filter(|&n| !tree.is_root(n)) else {
        let mut out = Tree::new("");
        let root = out.root();
        out.graft(root, subtree)?;
        let bare_root = tree.is_leaf(tree.root()) && tree.name(tree.root()).is_empty();
        if !bare_root {
            out.graft(root, tree)?;
        }
        return Ok(out);
    };
    let mut out = tree.clone();
    let parent = out.parent(anchor).ok_or(TreeError::UnknownNode(anchor.index()))?;
    out.detach(anchor);
    let joint = out.add_new_child(parent, "");
    out.graft(joint, subtree)?;
    out.add_child(joint, anchor)?;
    Ok(out)
}
