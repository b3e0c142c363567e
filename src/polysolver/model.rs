//! Tree scorers.

use log::trace;

use crate::memo::Memoizer;
use crate::tree::Tree;

use super::ModelError;

/// Result of scoring one tree.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Score to minimize.
    pub score: f64,
    /// Tree with optimized branch lengths, when the scorer produced one.
    /// It may be rooted anywhere and carries no node attributes.
    pub refined: Option<Tree>,
}

/// External tree scorer.
pub trait TreeModel: Send + Sync {
    /// Stable scorer identifier, part of memo cache keys.
    fn name(&self) -> &str;

    fn optimize_model(&self, tree: &Tree, expect_tree: bool) -> Result<ModelOutput, ModelError>;

    /// Score several trees, one score per tree in order.
    fn optimize_batch(&self, trees: &[&Tree]) -> Result<Vec<f64>, ModelError> {
        trees
            .iter()
            .map(|tree| self.optimize_model(tree, false).map(|out| out.score))
            .collect()
    }
}

/// Scores a gene tree by its Robinson-Foulds distance to a reference tree.
#[derive(Debug, Clone)]
pub struct ReferenceTreeModel {
    name: String,
    reference: Tree,
    refine: bool,
}

impl ReferenceTreeModel {
    pub fn new(reference: Tree) -> Self {
        Self {
            name: "reference-rf".to_string(),
            reference,
            refine: false,
        }
    }

    /// Return a refined tree when one is requested. The refined tree is an
    /// attribute-free copy re-rooted on its first leaf, like the output of an
    /// external optimizer.
    pub fn with_refinement(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }

    pub fn reference(&self) -> &Tree {
        &self.reference
    }

    fn refined(tree: &Tree) -> Result<Tree, ModelError> {
        let mut out = tree.copy();
        out.clear_features();
        if let Some(&first) = out.leaves().first()
            && out.leaf_count() > 2
        {
            out.set_outgroup(first)?;
        }
        Ok(out.copy())
    }
}

impl TreeModel for ReferenceTreeModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn optimize_model(&self, tree: &Tree, expect_tree: bool) -> Result<ModelOutput, ModelError> {
        let (rf, _) = tree.robinson_foulds(&self.reference);
        let refined = if expect_tree && self.refine {
            Some(Self::refined(tree)?)
        } else {
            None
        };
        Ok(ModelOutput {
            score: rf as f64,
            refined,
        })
    }
}

/// Memoizes the scores of any [`TreeModel`], keyed on the scorer name and
/// the canonical gene-labelled topology. Cache hits never carry a refined
/// tree.
pub struct CachedModel<M> {
    inner: M,
    cache: Memoizer<f64>,
}

impl<M: TreeModel> CachedModel<M> {
    pub fn new(inner: M, cache: Memoizer<f64>) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn cache(&self) -> &Memoizer<f64> {
        &self.cache
    }

    fn key(&self, tree: &Tree) -> (String, String) {
        let topology = tree.canonical_newick(tree.root(), |n| tree.name(n).to_string());
        (self.inner.name().to_string(), topology)
    }
}

impl<M: TreeModel> TreeModel for CachedModel<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn optimize_model(&self, tree: &Tree, expect_tree: bool) -> Result<ModelOutput, ModelError> {
        let key = self.key(tree);
        if let Some(score) = self.cache.get(&key)? {
            trace!("Memo hit for {}", key.1);
            return Ok(ModelOutput {
                score,
                refined: None,
            });
        }
        let out = self.inner.optimize_model(tree, expect_tree)?;
        self.cache.insert(&key, out.score)?;
        Ok(out)
    }

    fn optimize_batch(&self, trees: &[&Tree]) -> Result<Vec<f64>, ModelError> {
        let keys: Vec<(String, String)> = trees.iter().map(|t| self.key(t)).collect();
        let mut scores: Vec<Option<f64>> = Vec::with_capacity(trees.len());
        for key in &keys {
            scores.push(self.cache.get(key)?);
        }

        let missing: Vec<usize> = (0..trees.len()).filter(|&i| scores[i].is_none()).collect();
        if !missing.is_empty() {
            let pending: Vec<&Tree> = missing.iter().map(|&i| trees[i]).collect();
            let computed = self.inner.optimize_batch(&pending)?;
            if computed.len() != pending.len() {
                return Err(ModelError::ScoreCountMismatch {
                    model: self.inner.name().to_string(),
                    expected: pending.len(),
                    got: computed.len(),
                });
            }
            for (&i, score) in missing.iter().zip(computed) {
                self.cache.insert(&keys[i], score)?;
                scores[i] = Some(score);
            }
        }
        let expected = scores.len();
        let resolved: Vec<f64> = scores.into_iter().flatten().collect();
        if resolved.len() != expected {
            return Err(ModelError::ScoreCountMismatch {
                model: self.inner.name().to_string(),
                expected,
                got: resolved.len(),
            });
        }
        Ok(resolved)
    }
}
