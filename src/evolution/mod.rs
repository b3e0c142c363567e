//! Generic genetic-algorithm engine.
//!
//! The engine is parameterized by a [`Genome`] type and the [`GenomeOps`]
//! table of hooks bound to it. It owns one [`Population`], draws parents with
//! a [`Selector`], and merges generations by elitism, fast convergence or
//! Pareto front.

mod engine;
mod genome;
mod pareto;
mod population;
mod selectors;
mod statistics;

pub use engine::*;
pub use genome::*;
pub use pareto::*;
pub use population::*;
pub use selectors::*;
pub use statistics::*;

use crate::memo::CacheError;
use crate::polysolver::ModelError;
use crate::schema::ConfigError;
use crate::tree::TreeError;

/// Errors that end an evolutionary run.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Batch evaluation returned {got} scores for {expected} genomes")]
    ScoreCountMismatch { expected: usize, got: usize },
    #[error("Crossover produced a tree with {got} leaves, expected {expected}")]
    LeafCountMismatch { expected: usize, got: usize },
    #[error("Rank {index} is out of range for a population of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Failed to build the evaluation worker pool: {0}")]
    WorkerPool(String),
    #[error("Batch evaluation requested but no batch evaluator is bound")]
    MissingBatchEvaluator,
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EvolutionError>;
