//! The tree genome.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::evolution::{Genome, GenomeBase, GenomeOps};
use crate::tree::{NodeId, Tree, TreeError};

use super::{
    ModelError, RateModel, RunContext, SPECIES_FEATURE, TreeModel, bulk_evaluate, evaluate, leaf_species,
    mutate, tree_crossover,
};

/// A candidate gene tree together with its reconciliation parameters.
pub struct TreeGenome {
    tree: Tree,
    model: Arc<dyn TreeModel>,
    dtl_rates: Box<dyn RateModel>,
    edge_rates: Box<dyn RateModel>,
    intbrnp: f64,
    species_count: BTreeMap<String, usize>,
    is_init: bool,
    done_transfer: bool,
    ctx: Arc<RunContext>,
    base: GenomeBase,
}

impl TreeGenome {
    pub fn new(
        tree: Tree,
        model: Arc<dyn TreeModel>,
        dtl_rates: Box<dyn RateModel>,
        edge_rates: Box<dyn RateModel>,
        ctx: Arc<RunContext>,
    ) -> Self {
        let mut genome = Self {
            tree,
            model,
            dtl_rates,
            edge_rates,
            intbrnp: 0.95,
            species_count: BTreeMap::new(),
            is_init: false,
            done_transfer: false,
            ctx,
            base: GenomeBase::default(),
        };
        genome.recount_species();
        genome
    }

    /// Probability of preferring an internal branch during crossover.
    pub fn with_intbrnp(mut self, intbrnp: f64) -> Self {
        self.intbrnp = intbrnp;
        self
    }

    /// Mark the leaves as already carrying gene names.
    pub fn with_is_init(mut self, is_init: bool) -> Self {
        self.is_init = is_init;
        self.recount_species();
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn model(&self) -> &Arc<dyn TreeModel> {
        &self.model
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    pub fn dtl_rates(&self) -> &dyn RateModel {
        self.dtl_rates.as_ref()
    }

    pub fn dtl_rates_mut(&mut self) -> &mut dyn RateModel {
        self.dtl_rates.as_mut()
    }

    pub fn edge_rates(&self) -> &dyn RateModel {
        self.edge_rates.as_ref()
    }

    pub fn edge_rates_mut(&mut self) -> &mut dyn RateModel {
        self.edge_rates.as_mut()
    }

    pub fn intbrnp(&self) -> f64 {
        self.intbrnp
    }

    pub fn is_init(&self) -> bool {
        self.is_init
    }

    /// Leaf count per species.
    pub fn species_count(&self) -> &BTreeMap<String, usize> {
        &self.species_count
    }

    /// Number of distinct species.
    pub fn species_len(&self) -> usize {
        self.species_count.len()
    }

    pub fn has_undergone_transfer(&self) -> bool {
        self.done_transfer
    }

    pub fn set_done_transfer(&mut self) {
        self.done_transfer = true;
    }

    /// Species of a leaf, from its attribute or the gene map.
    pub fn species(&self, node: NodeId) -> Option<&str> {
        self.tree
            .feature(node, SPECIES_FEATURE)
            .or_else(|| self.ctx.species_of(self.tree.name(node)))
    }

    fn recount_species(&mut self) {
        let mut counts = BTreeMap::new();
        for leaf in self.tree.leaves() {
            let species = if self.is_init {
                self.species(leaf).unwrap_or_else(|| self.tree.name(leaf))
            } else {
                leaf_species(&self.tree, leaf)
            };
            *counts.entry(species.to_string()).or_insert(0) += 1;
        }
        self.species_count = counts;
    }

    /// Give every leaf its gene name and species attribute.
    ///
    /// Leaves labelled by species receive the genes of that species in a
    /// random order. Leaves that already carry gene names only get their
    /// species attribute.
    pub fn initialize(&mut self, rng: &mut StdRng) -> Result<(), ModelError> {
        if self.is_init {
            for (species, genes) in self.ctx.gene_map() {
                for gene in genes {
                    let leaf = self.tree.leaf_by_name(gene)?;
                    self.tree.set_feature(leaf, SPECIES_FEATURE, species.clone());
                }
            }
        } else {
            let mut shuffled: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (species, genes) in self.ctx.gene_map() {
                let mut genes = genes.clone();
                genes.shuffle(rng);
                shuffled.insert(species.clone(), genes);
            }
            let mut position: BTreeMap<String, usize> = BTreeMap::new();
            for leaf in self.tree.leaves() {
                let species = leaf_species(&self.tree, leaf).to_string();
                let genes = shuffled
                    .get(&species)
                    .ok_or_else(|| ModelError::UnknownSpecies(species.clone()))?;
                let pos = position.entry(species.clone()).or_insert(0);
                let gene = genes.get(*pos).ok_or_else(|| ModelError::NotEnoughGenes {
                    species: species.clone(),
                    leaves: self.species_count.get(&species).copied().unwrap_or(0),
                    genes: genes.len(),
                })?;
                *pos += 1;
                self.tree.set_feature(leaf, SPECIES_FEATURE, species.clone());
                self.tree.set_name(leaf, gene.clone());
            }
        }
        self.is_init = true;
        self.recount_species();
        Ok(())
    }

    /// Replace the tree by a refined version of the same topology.
    ///
    /// The refined tree is re-rooted on the clade of the current root's first
    /// child (second child as fallback) and receives every node attribute of
    /// the current tree.
    pub fn update_tree(&mut self, mut refined: Tree) -> Result<(), ModelError> {
        let root_children = self.tree.children(self.tree.root()).to_vec();
        let mut rooted = false;
        let mut last_error = None;
        for &child in root_children.iter().take(2) {
            match self.reroot_on(&mut refined, child) {
                Ok(()) => {
                    rooted = true;
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        if !rooted && let Some(e) = last_error {
            return Err(e.into());
        }

        for node in self.tree.traverse() {
            let features = self.tree.features(node);
            if features.is_empty() {
                continue;
            }
            let target = if self.tree.is_leaf(node) {
                refined.leaf_by_name(self.tree.name(node))?
            } else {
                refined.common_ancestor_of_names(self.tree.leaf_names_of(node).as_slice())?
            };
            for (key, value) in features {
                refined.set_feature(target, key.clone(), value.clone());
            }
        }
        self.tree = refined.copy();
        Ok(())
    }

    fn reroot_on(&self, refined: &mut Tree, clade: NodeId) -> Result<(), TreeError> {
        let names = self.tree.leaf_names_of(clade);
        let outgroup = refined.common_ancestor_of_names(names.as_slice())?;
        if outgroup == refined.root() {
            return Err(TreeError::OutgroupIsRoot);
        }
        if refined.parent(outgroup) == Some(refined.root()) && refined.children(refined.root()).len() == 2 {
            return Ok(());
        }
        refined.set_outgroup(outgroup)
    }
}

impl Clone for TreeGenome {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.copy(),
            model: Arc::clone(&self.model),
            dtl_rates: self.dtl_rates.clone(),
            edge_rates: self.edge_rates.clone(),
            intbrnp: self.intbrnp,
            species_count: self.species_count.clone(),
            is_init: self.is_init,
            done_transfer: false,
            ctx: Arc::clone(&self.ctx),
            base: self.base.clone(),
        }
    }
}

impl std::fmt::Debug for TreeGenome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeGenome")
            .field("tree", &self.tree.to_newick(false))
            .field("model", &self.model.name())
            .field("dtl_rates", &self.dtl_rates)
            .field("edge_rates", &self.edge_rates)
            .field("score", &self.base.score)
            .field("fitness", &self.base.fitness)
            .finish()
    }
}

impl Genome for TreeGenome {
    fn base(&self) -> &GenomeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut GenomeBase {
        &mut self.base
    }

    /// Same topology, same scorer and scores equal to five decimals.
    fn same_solution(&self, other: &Self) -> bool {
        let (a, b) = (self.score(), other.score());
        let same_score = !a.is_empty()
            && a.len() == b.len()
            && a.iter().zip(b).all(|(x, y)| format!("{x:.5}") == format!("{y:.5}"));
        same_score && Arc::ptr_eq(&self.model, &other.model) && self.tree.robinson_foulds(&other.tree).0 == 0
    }
}

/// Operator table for [`TreeGenome`].
pub fn tree_genome_ops() -> GenomeOps<TreeGenome> {
    GenomeOps::new(
        |genome: &mut TreeGenome, rng: &mut StdRng| Ok(genome.initialize(rng)?),
        mutate,
        evaluate,
    )
    .with_crossover(tree_crossover)
    .with_batch_evaluator(bulk_evaluate)
}
