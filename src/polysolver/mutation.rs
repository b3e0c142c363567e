//! Mutation operators for tree genomes.

use log::trace;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::{IteratorRandom, SliceRandom};

use crate::evolution::{MutationContext, Result};

use super::{ReconEvent, SPECIES_FEATURE, TreeGenome};

/// Swap the gene names of two random leaves of `species`. Returns whether a
/// swap happened.
pub fn permute_seq(genome: &mut TreeGenome, species: &str, rng: &mut StdRng) -> bool {
    let tree = genome.tree_mut();
    let leaves: Vec<_> = tree
        .search_nodes(SPECIES_FEATURE, species)
        .into_iter()
        .filter(|&n| tree.is_leaf(n))
        .collect();
    if leaves.len() < 2 {
        return false;
    }
    let picked = rand::seq::index::sample(rng, leaves.len(), 2);
    let (n1, n2) = (leaves[picked.index(0)], leaves[picked.index(1)]);
    let name1 = tree.name(n1).to_string();
    let name2 = tree.name(n2).to_string();
    tree.set_name(n1, name2);
    tree.set_name(n2, name1);
    true
}

/// Subtree prune-and-regraft transfer.
///
/// A random non-root donor is moved onto the branch above a random receiver
/// taken from the donor's incomparable nodes. Nothing happens when the donor
/// hangs from the root, the receiver is the root, no receiver exists, or
/// donor and receiver are siblings. Returns whether the tree changed.
pub fn perform_spr(genome: &mut TreeGenome, rng: &mut StdRng) -> Result<bool> {
    let tree = genome.tree();
    let Some(&donor) = tree.descendants(tree.root()).choose(rng) else {
        return Ok(false);
    };
    let Some(receiver) = tree.incomparable(donor).into_iter().choose(rng) else {
        trace!("SPR rejected: donor has no incomparable node");
        return Ok(false);
    };
    let (Some(donor_parent), Some(receiver_parent)) = (tree.parent(donor), tree.parent(receiver)) else {
        trace!("SPR rejected: receiver is the root");
        return Ok(false);
    };
    if tree.is_root(donor_parent) {
        trace!("SPR rejected: donor hangs from the root");
        return Ok(false);
    }
    if donor_parent == receiver_parent {
        trace!("SPR rejected: donor and receiver are siblings");
        return Ok(false);
    }

    let tree = genome.tree_mut();
    tree.detach(donor);
    tree.delete(donor_parent);
    tree.detach(receiver);
    let joint = tree.add_new_child(receiver_parent, "");
    tree.add_child(joint, donor)?;
    tree.add_child(joint, receiver)?;
    genome.set_done_transfer();
    Ok(true)
}

/// Re-root the tree on the branch above a random non-root node.
pub fn reroot(genome: &mut TreeGenome, rng: &mut StdRng) -> Result<()> {
    let tree = genome.tree_mut();
    if let Some(&outgroup) = tree.descendants(tree.root()).choose(rng) {
        tree.set_outgroup(outgroup)?;
    }
    Ok(())
}

/// Engine mutation hook. Returns the number of mutation events applied.
///
/// In fast-convergence mode with `rate * species > 1`, that many events
/// (rounded up) are applied, each a coin flip between a gene permutation and
/// an SPR transfer. Otherwise one event happens with probability `rate`:
/// a gene permutation, or with reconciliation the event picked by the
/// reconciliation policy.
pub fn mutate(genome: &mut TreeGenome, ctx: &mut MutationContext<'_>) -> Result<usize> {
    let species: Vec<String> = genome.species_count().keys().cloned().collect();
    let expected = ctx.rate * species.len() as f64;
    let rng = &mut *ctx.rng;

    if ctx.fast_convergence && expected > 1.0 {
        let events = expected.ceil() as usize;
        for _ in 0..events {
            if rng.r#gen::<f64>() > 0.5 {
                if let Some(spec) = species.choose(rng) {
                    permute_seq(genome, spec, rng);
                }
            } else {
                perform_spr(genome, rng)?;
            }
        }
        return Ok(events);
    }

    if rng.r#gen::<f64>() > ctx.rate {
        return Ok(0);
    }
    match genome.context().reconciliation().cloned() {
        Some(recon) => match recon.select_event(genome, rng) {
            ReconEvent::Root => reroot(genome, rng)?,
            ReconEvent::Dtl => genome.dtl_rates_mut().mutate(rng),
            ReconEvent::Edge => genome.edge_rates_mut().mutate(rng),
            ReconEvent::Transfer => {
                perform_spr(genome, rng)?;
            }
        },
        None => {
            if let Some(spec) = species.choose(rng) {
                permute_seq(genome, spec, rng);
            }
        }
    }
    Ok(1)
}
