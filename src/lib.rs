//! phylo-evolve - Genetic-algorithm search over phylogenetic gene trees.
//!
//! The crate couples a generic genetic-algorithm engine with tree genomes
//! whose operators preserve the species content of every gene tree.
//!
//! # Architecture
//!
//! - `evolution`: Generic engine (population, selectors, statistics, Pareto merge)
//! - `polysolver`: Tree genome, crossover and mutation operators, scorers
//! - `tree`: Arena-indexed rooted trees with a minimal Newick reader
//! - `memo`: Content-addressed memoization cache for scores
//! - `schema`: Configuration types and run files
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use phylo_evolve::{polysolver::build_engine, schema::RunFile};
//!
//! let run = RunFile::load(Path::new("run.json"))?;
//! let mut engine = build_engine(&run)?;
//! let outcome = engine.evolve()?;
//!
//! println!("Best tree: {}", outcome.best.tree().to_newick(false));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod evolution;
pub mod memo;
pub mod polysolver;
pub mod schema;
pub mod tree;

// Re-export commonly used types
pub use evolution::{Engine, EvolutionError, EvolutionOutcome, Genome, GenomeOps, StopReason};
pub use polysolver::{TreeGenome, build_engine};
pub use schema::{EngineConfig, RunFile};
pub use tree::Tree;
