//! Tree genomes and their genetic operators.
//!
//! [`TreeGenome`] wraps a gene tree whose leaves are gene names tagged with a
//! `species` attribute. Operators never change the multiset of leaf species:
//! crossover swaps clades with identical species content, mutation permutes
//! gene names within a species or moves whole subtrees.
//!
//! Scoring is delegated to a [`TreeModel`]; reconciliation against a species
//! tree is optional and enabled by placing a [`ReconciliationParams`] in the
//! shared [`RunContext`].

mod branch;
mod crossover;
mod evaluate;
mod genome;
mod model;
mod mutation;
mod rates;
mod reconcile;
mod setup;

pub use branch::*;
pub use crossover::*;
pub use evaluate::*;
pub use genome::*;
pub use model::*;
pub use mutation::*;
pub use rates::*;
pub use reconcile::*;
pub use setup::*;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::memo::CacheError;
use crate::tree::TreeError;

/// Leaf attribute holding the species a gene belongs to.
pub const SPECIES_FEATURE: &str = "species";

/// Failures of the scoring and reconciliation collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model '{model}' failed: {message}")]
    Scoring { model: String, message: String },
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),
    #[error("Species '{0}' is not in the species tree")]
    UnknownSpecies(String),
    #[error("Gene '{0}' is missing from the gene map")]
    UnmappedGene(String),
    #[error("Species '{species}' has {leaves} leaves but only {genes} genes")]
    NotEnoughGenes {
        species: String,
        leaves: usize,
        genes: usize,
    },
    #[error("Model '{model}' returned {got} scores for {expected} trees")]
    ScoreCountMismatch {
        model: String,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Run-wide settings shared by every genome of one run.
#[derive(Clone, Default)]
pub struct RunContext {
    gene_map: BTreeMap<String, Vec<String>>,
    reverse_map: BTreeMap<String, String>,
    reconciliation: Option<Arc<dyn ReconciliationParams>>,
}

impl RunContext {
    /// Build from a species to genes map. Genes listed under several species
    /// keep the last species.
    pub fn new(gene_map: BTreeMap<String, Vec<String>>) -> Self {
        let reverse_map = gene_map
            .iter()
            .flat_map(|(species, genes)| genes.iter().map(move |g| (g.clone(), species.clone())))
            .collect();
        Self {
            gene_map,
            reverse_map,
            reconciliation: None,
        }
    }

    pub fn with_reconciliation(mut self, params: Arc<dyn ReconciliationParams>) -> Self {
        self.reconciliation = Some(params);
        self
    }

    pub fn gene_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.gene_map
    }

    /// Species of `gene`, if mapped.
    pub fn species_of(&self, gene: &str) -> Option<&str> {
        self.reverse_map.get(gene).map(String::as_str)
    }

    /// Whether reconciliation operators and costs are active.
    pub fn reconcile(&self) -> bool {
        self.reconciliation.is_some()
    }

    pub fn reconciliation(&self) -> Option<&Arc<dyn ReconciliationParams>> {
        self.reconciliation.as_ref()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("gene_map", &self.gene_map)
            .field("reconcile", &self.reconcile())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tree::Tree;

    /// Gene map with two genes per species a, b, c and one for d.
    pub(crate) fn gene_map() -> BTreeMap<String, Vec<String>> {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), vec!["a1".to_string(), "a2".to_string()]);
        map.insert("b".to_string(), vec!["b1".to_string(), "b2".to_string()]);
        map.insert("c".to_string(), vec!["c1".to_string(), "c2".to_string()]);
        map.insert("d".to_string(), vec!["d1".to_string()]);
        map
    }

    /// Gene tree with named leaves covering every gene of [`gene_map`].
    pub(crate) fn gene_tree() -> Tree {
        Tree::from_newick("(((a1,b1),(c1,a2)),((b2,c2),d1));").unwrap()
    }

    #[test]
    fn test_reverse_map() {
        let ctx = RunContext::new(gene_map());
        assert_eq!(ctx.species_of("c2"), Some("c"));
        assert_eq!(ctx.species_of("zz"), None);
        assert!(!ctx.reconcile());
    }
}
