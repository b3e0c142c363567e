//! Genome abstraction and the hook table bound to a genome type.

use std::sync::Arc;

use rand::rngs::StdRng;
use serde::Serialize;

use super::Result;

/// Score bookkeeping shared by every genome type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenomeBase {
    /// Raw score components, minimized.
    pub score: Vec<f64>,
    /// Scaled fitness, maximized.
    pub fitness: f64,
}

/// One candidate solution.
pub trait Genome: Clone + Send + Sync + 'static {
    fn base(&self) -> &GenomeBase;

    fn base_mut(&mut self) -> &mut GenomeBase;

    fn score(&self) -> &[f64] {
        &self.base().score
    }

    fn fitness(&self) -> f64 {
        self.base().fitness
    }

    /// Whether two genomes encode the same solution.
    fn same_solution(&self, other: &Self) -> bool {
        self.score() == other.score()
    }
}

/// Parameters handed to a mutation hook.
pub struct MutationContext<'a> {
    /// Per-genome mutation rate.
    pub rate: f64,
    /// Whether several mutation events may be applied.
    pub fast_convergence: bool,
    pub rng: &'a mut StdRng,
}

pub type Initializer<G> = Arc<dyn Fn(&mut G, &mut StdRng) -> Result<()> + Send + Sync>;
/// Returns the number of mutation events applied.
pub type Mutator<G> = Arc<dyn Fn(&mut G, &mut MutationContext<'_>) -> Result<usize> + Send + Sync>;
/// Produces two offspring from (mom, dad).
pub type Crossover<G> = Arc<dyn Fn(&G, &G, &mut StdRng) -> Result<(G, G)> + Send + Sync>;
/// Returns the raw score components; may refine the genome in place.
pub type Evaluator<G> = Arc<dyn Fn(&mut G) -> Result<Vec<f64>> + Send + Sync>;
/// Returns one score vector per genome, in order.
pub type BatchEvaluator<G> = Arc<dyn Fn(&[G]) -> Result<Vec<Vec<f64>>> + Send + Sync>;

/// Hooks bound once per genome type.
pub struct GenomeOps<G> {
    pub initializer: Initializer<G>,
    pub mutator: Mutator<G>,
    pub crossover: Option<Crossover<G>>,
    pub evaluator: Evaluator<G>,
    pub batch_evaluator: Option<BatchEvaluator<G>>,
}

impl<G> Clone for GenomeOps<G> {
    fn clone(&self) -> Self {
        Self {
            initializer: Arc::clone(&self.initializer),
            mutator: Arc::clone(&self.mutator),
            crossover: self.crossover.clone(),
            evaluator: Arc::clone(&self.evaluator),
            batch_evaluator: self.batch_evaluator.clone(),
        }
    }
}

impl<G: Genome> GenomeOps<G> {
    pub fn new<I, M, E>(initializer: I, mutator: M, evaluator: E) -> Self
    where
        I: Fn(&mut G, &mut StdRng) -> Result<()> + Send + Sync + 'static,
        M: Fn(&mut G, &mut MutationContext<'_>) -> Result<usize> + Send + Sync + 'static,
        E: Fn(&mut G) -> Result<Vec<f64>> + Send + Sync + 'static,
    {
        Self {
            initializer: Arc::new(initializer),
            mutator: Arc::new(mutator),
            crossover: None,
            evaluator: Arc::new(evaluator),
            batch_evaluator: None,
        }
    }

    pub fn with_crossover<C>(mut self, crossover: C) -> Self
    where
        C: Fn(&G, &G, &mut StdRng) -> Result<(G, G)> + Send + Sync + 'static,
    {
        self.crossover = Some(Arc::new(crossover));
        self
    }

    pub fn with_batch_evaluator<B>(mut self, batch: B) -> Self
    where
        B: Fn(&[G]) -> Result<Vec<Vec<f64>>> + Send + Sync + 'static,
    {
        self.batch_evaluator = Some(Arc::new(batch));
        self
    }
}
