//! Reconciliation of gene trees against a species tree.

use std::collections::HashMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use serde::Serialize;

use crate::schema::{EventWeights, ReconciliationConfig};
use crate::tree::{NodeId, Tree};

use super::{ModelError, TreeGenome};

/// Mutation event applied to a reconciled genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReconEvent {
    /// Re-anchor the root on another branch.
    Root,
    /// Mutate the duplication/transfer/loss rates.
    Dtl,
    /// Mutate the per-edge rates.
    Edge,
    /// Subtree prune-and-regraft transfer.
    Transfer,
}

const EVENTS: [ReconEvent; 4] = [
    ReconEvent::Root,
    ReconEvent::Dtl,
    ReconEvent::Edge,
    ReconEvent::Transfer,
];

/// Reconciliation policy and cost.
pub trait ReconciliationParams: Send + Sync {
    /// Pick the mutation event to apply to `genome`.
    fn select_event(&self, genome: &TreeGenome, rng: &mut StdRng) -> ReconEvent;

    /// Reconciliation cost of the genome's tree, minimized.
    fn compute_rec_cost(&self, genome: &TreeGenome) -> Result<f64, ModelError>;
}

/// Duplication/loss cost under the LCA mapping.
///
/// Every gene node maps to the lowest species node above the species of its
/// leaves. A node mapped to the same species node as one of its children is a
/// duplication; each species level skipped along a gene branch is a loss.
#[derive(Debug, Clone)]
pub struct LcaReconciliation {
    species_tree: Tree,
    depth: HashMap<NodeId, usize>,
    duplication_cost: f64,
    loss_cost: f64,
    events: WeightedIndex<f64>,
}

impl LcaReconciliation {
    pub fn new(
        species_tree: Tree,
        duplication_cost: f64,
        loss_cost: f64,
        weights: EventWeights,
    ) -> Result<Self, ModelError> {
        let events = WeightedIndex::new([weights.root, weights.dtl, weights.edge, weights.transfer])
            .map_err(|e| ModelError::Reconciliation(format!("invalid event weights: {e}")))?;
        let depth = species_tree
            .traverse()
            .into_iter()
            .map(|n| (n, species_tree.ancestors(n).len()))
            .collect();
        Ok(Self {
            species_tree,
            depth,
            duplication_cost,
            loss_cost,
            events,
        })
    }

    pub fn from_config(config: &ReconciliationConfig) -> Result<Self, ModelError> {
        let species_tree = Tree::from_newick(&config.species_tree)?;
        Self::new(
            species_tree,
            config.duplication_cost,
            config.loss_cost,
            config.event_weights,
        )
    }

    pub fn species_tree(&self) -> &Tree {
        &self.species_tree
    }

    /// Duplication and loss counts of `gene_tree`, leaf species given by
    /// `species_of`.
    pub fn count_events<F>(&self, gene_tree: &Tree, species_of: F) -> Result<(usize, usize), ModelError>
    where
        F: Fn(NodeId) -> Option<String>,
    {
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        let mut order = gene_tree.preorder(gene_tree.root());
        order.reverse();

        let mut duplications = 0;
        let mut losses = 0;
        for node in order {
            if gene_tree.is_leaf(node) {
                let species = species_of(node)
                    .ok_or_else(|| ModelError::UnmappedGene(gene_tree.name(node).to_string()))?;
                let target = self
                    .species_tree
                    .find_leaf(&species)
                    .ok_or(ModelError::UnknownSpecies(species))?;
                mapping.insert(node, target);
                continue;
            }

            let child_maps: Vec<NodeId> = gene_tree.children(node).iter().map(|c| mapping[c]).collect();
            let lca = self.species_tree.common_ancestor(&child_maps)?;
            let is_duplication = child_maps.contains(&lca);
            if is_duplication {
                duplications += 1;
            }
            let lca_depth = self.depth[&lca];
            for child in child_maps {
                let gap = self.depth[&child] - lca_depth;
                losses += if is_duplication { gap } else { gap.saturating_sub(1) };
            }
            mapping.insert(node, lca);
        }
        Ok((duplications, losses))
    }
}

impl ReconciliationParams for LcaReconciliation {
    fn select_event(&self, _genome: &TreeGenome, rng: &mut StdRng) -> ReconEvent {
        EVENTS[self.events.sample(rng)]
    }

    fn compute_rec_cost(&self, genome: &TreeGenome) -> Result<f64, ModelError> {
        let tree = genome.tree();
        let (duplications, losses) = self.count_events(tree, |n| genome.species(n).map(str::to_string))?;
        Ok(duplications as f64 * self.duplication_cost + losses as f64 * self.loss_cost)
    }
}
