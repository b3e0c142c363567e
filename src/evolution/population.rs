//! Fixed-size population of genomes.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use rand::rngs::StdRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::schema::{ConfigError, EvaluationMode, ScalingMethod};

use super::{EvolutionError, Genome, GenomeOps, Result, Statistics};

/// Raw score to fitness conversion.
#[derive(Clone)]
pub enum Scaling {
    /// `-sum(score)`.
    NegatedSum,
    /// `-sum(w_i * score_i)`; missing weights count as 1.
    Weighted(Vec<f64>),
    Custom(Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>),
}

impl Scaling {
    pub fn apply(&self, score: &[f64]) -> f64 {
        match self {
            Scaling::NegatedSum => -score.iter().sum::<f64>(),
            Scaling::Weighted(weights) => -score
                .iter()
                .enumerate()
                .map(|(i, s)| s * weights.get(i).copied().unwrap_or(1.0))
                .sum::<f64>(),
            Scaling::Custom(f) => f(score),
        }
    }
}

impl Default for Scaling {
    fn default() -> Self {
        Self::NegatedSum
    }
}

impl From<ScalingMethod> for Scaling {
    fn from(method: ScalingMethod) -> Self {
        match method {
            ScalingMethod::NegatedSum => Self::NegatedSum,
            ScalingMethod::Weighted { weights } => Self::Weighted(weights),
        }
    }
}

impl fmt::Debug for Scaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scaling::NegatedSum => write!(f, "NegatedSum"),
            Scaling::Weighted(w) => f.debug_tuple("Weighted").field(w).finish(),
            Scaling::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Ordered collection of genomes with a fixed target size.
pub struct Population<G: Genome> {
    genomes: Vec<G>,
    size: usize,
    sorted: bool,
    stats: Statistics,
    scaling: Scaling,
    evaluation: EvaluationMode,
    pool: Option<Arc<ThreadPool>>,
}

impl<G: Genome> Population<G> {
    /// Create an empty population. Parallel evaluation builds its worker pool
    /// here.
    pub fn new(size: usize, evaluation: EvaluationMode, scaling: Scaling) -> Result<Self> {
        if size < 2 {
            return Err(ConfigError::PopulationTooSmall(size).into());
        }
        let pool = match evaluation {
            EvaluationMode::Parallel { max_workers, .. } => Some(Arc::new(
                ThreadPoolBuilder::new()
                    .num_threads(max_workers)
                    .build()
                    .map_err(|e| EvolutionError::WorkerPool(e.to_string()))?,
            )),
            _ => None,
        };
        Ok(Self {
            genomes: Vec::with_capacity(size),
            size,
            sorted: false,
            stats: Statistics::default(),
            scaling,
            evaluation,
            pool,
        })
    }

    /// Empty population sharing this one's settings.
    pub fn empty_like(&self) -> Self {
        Self {
            genomes: Vec::with_capacity(self.size),
            size: self.size,
            sorted: false,
            stats: Statistics::default(),
            scaling: self.scaling.clone(),
            evaluation: self.evaluation,
            pool: self.pool.clone(),
        }
    }

    /// Fill the population with initialized clones of `template`.
    pub fn create(&mut self, template: &G, ops: &GenomeOps<G>, rng: &mut StdRng) -> Result<()> {
        self.genomes.clear();
        for _ in 0..self.size {
            let mut genome = template.clone();
            (ops.initializer)(&mut genome, rng)?;
            self.genomes.push(genome);
        }
        self.sorted = false;
        Ok(())
    }

    pub fn set_scaling(&mut self, scaling: Scaling) {
        self.scaling = scaling;
    }

    /// Target size.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.genomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genomes.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn genomes(&self) -> &[G] {
        &self.genomes
    }

    pub fn get(&self, index: usize) -> Result<&G> {
        self.genomes.get(index).ok_or(EvolutionError::IndexOutOfRange {
            index,
            len: self.genomes.len(),
        })
    }

    pub fn push(&mut self, genome: G) {
        self.genomes.push(genome);
        self.sorted = false;
    }

    /// Overwrite the genome at `index`.
    pub fn replace(&mut self, index: usize, genome: G) -> Result<()> {
        let len = self.genomes.len();
        let slot = self
            .genomes
            .get_mut(index)
            .ok_or(EvolutionError::IndexOutOfRange { index, len })?;
        *slot = genome;
        self.sorted = false;
        Ok(())
    }

    /// Score every genome, then recompute fitness.
    pub fn evaluate(&mut self, ops: &GenomeOps<G>) -> Result<()> {
        match self.evaluation {
            EvaluationMode::Sequential => self.evaluate_sequential(ops)?,
            EvaluationMode::Parallel { full_copy, .. } => self.evaluate_parallel(ops, full_copy)?,
            EvaluationMode::Batch => match &ops.batch_evaluator {
                Some(batch) => {
                    let scores = batch(&self.genomes)?;
                    if scores.len() != self.genomes.len() {
                        return Err(EvolutionError::ScoreCountMismatch {
                            expected: self.genomes.len(),
                            got: scores.len(),
                        });
                    }
                    for (genome, score) in self.genomes.iter_mut().zip(scores) {
                        genome.base_mut().score = score;
                    }
                }
                None => return Err(EvolutionError::MissingBatchEvaluator),
            },
        }
        self.scale();
        Ok(())
    }

    fn evaluate_sequential(&mut self, ops: &GenomeOps<G>) -> Result<()> {
        for genome in &mut self.genomes {
            let score = (ops.evaluator)(genome)?;
            genome.base_mut().score = score;
        }
        Ok(())
    }

    fn evaluate_parallel(&mut self, ops: &GenomeOps<G>, full_copy: bool) -> Result<()> {
        let Some(pool) = self.pool.clone() else {
            warn!("No worker pool available, evaluating sequentially");
            return self.evaluate_sequential(ops);
        };
        let evaluator = &ops.evaluator;
        let evaluated: Vec<Result<G>> = pool.install(|| {
            self.genomes
                .par_iter()
                .map(|genome| {
                    let mut clone = genome.clone();
                    let score = evaluator(&mut clone)?;
                    clone.base_mut().score = score;
                    Ok(clone)
                })
                .collect()
        });

        for (slot, result) in self.genomes.iter_mut().zip(evaluated) {
            let clone = result?;
            if full_copy {
                *slot = clone;
            } else {
                slot.base_mut().score = clone.base().score.clone();
            }
        }
        debug!("Evaluated {} genomes in parallel", self.genomes.len());
        Ok(())
    }

    /// Recompute fitness from raw scores.
    pub fn scale(&mut self) {
        for genome in &mut self.genomes {
            let fitness = self.scaling.apply(genome.score());
            genome.base_mut().fitness = fitness;
        }
        self.sorted = false;
    }

    /// Order by fitness, best first.
    pub fn sort(&mut self) {
        self.genomes
            .sort_by(|a, b| b.fitness().total_cmp(&a.fitness()));
        self.sorted = true;
    }

    /// Adopt an externally computed order (Pareto ranking).
    pub fn moop_sort(&mut self, order: Vec<G>) {
        self.genomes = order;
        self.sorted = true;
    }

    /// Slot index of the genome ranked `rank` by fitness.
    pub fn rank_index(&self, rank: usize) -> Result<usize> {
        let len = self.genomes.len();
        if rank >= len {
            return Err(EvolutionError::IndexOutOfRange { index: rank, len });
        }
        if self.sorted {
            return Ok(rank);
        }
        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| self.genomes[b].fitness().total_cmp(&self.genomes[a].fitness()));
        Ok(order[rank])
    }

    /// The `k`-th best genome by fitness.
    pub fn best_fitness(&self, k: usize) -> Result<&G> {
        let index = self.rank_index(k)?;
        Ok(&self.genomes[index])
    }

    /// The `k`-th worst genome by fitness.
    pub fn worst_fitness(&self, k: usize) -> Result<&G> {
        let len = self.genomes.len();
        if k >= len {
            return Err(EvolutionError::IndexOutOfRange { index: k, len });
        }
        self.best_fitness(len - 1 - k)
    }

    /// The `k`-th best genome by first raw component (lowest first).
    pub fn best_raw(&self, k: usize) -> Result<&G> {
        self.raw_ranked(k, false)
    }

    /// The `k`-th worst genome by first raw component (highest first).
    pub fn worst_raw(&self, k: usize) -> Result<&G> {
        self.raw_ranked(k, true)
    }

    fn raw_ranked(&self, k: usize, descending: bool) -> Result<&G> {
        let len = self.genomes.len();
        if k >= len {
            return Err(EvolutionError::IndexOutOfRange { index: k, len });
        }
        let first = |g: &G| g.score().first().copied().unwrap_or(f64::INFINITY);
        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| {
            let ord = first(&self.genomes[a]).total_cmp(&first(&self.genomes[b]));
            if descending { ord.reverse() } else { ord }
        });
        Ok(&self.genomes[order[k]])
    }

    /// Recompute and return the statistics.
    pub fn statistics(&mut self) -> &Statistics {
        self.stats = Statistics::from_genomes(&self.genomes);
        &self.stats
    }

    /// Last computed statistics.
    pub fn stats(&self) -> &Statistics {
        &self.stats
    }
}
