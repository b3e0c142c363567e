//! Configuration types for the genetic-algorithm engine.

use serde::{Deserialize, Serialize};

/// Engine parameters for one evolutionary run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of generations to run.
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Population size (at least 2).
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Per-genome mutation rate in [0, 1].
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Per-pair crossover rate in [0, 1].
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Parent selection strategy.
    #[serde(default)]
    pub selector: SelectionMethod,
    /// Carry the best individuals into the next generation.
    #[serde(default = "default_elitism")]
    pub elitism: bool,
    /// Number of elite ranks. Values in (0, 1) are a fraction of the
    /// population size, rounded up.
    #[serde(default = "default_elitism_replacement")]
    pub elitism_replacement: f64,
    /// Several mutation events per genome and reintroduction of dominating
    /// individuals from the previous generation.
    #[serde(default)]
    pub fast_convergence: bool,
    /// Merge generations by Pareto front instead of elitism.
    #[serde(default)]
    pub multi_objective: bool,
    /// How genomes are scored.
    #[serde(default)]
    pub evaluation: EvaluationMode,
    /// Raw score to fitness conversion.
    #[serde(default)]
    pub scaling: ScalingMethod,
    /// Wall-clock budget in seconds.
    #[serde(default)]
    pub max_time_secs: Option<f64>,
    /// Log statistics every N generations (0 disables).
    #[serde(default)]
    pub freq_stats: usize,
    /// Random seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generations: default_generations(),
            population_size: default_population_size(),
            mutation_rate: default_mutation_rate(),
            crossover_rate: default_crossover_rate(),
            selector: SelectionMethod::default(),
            elitism: default_elitism(),
            elitism_replacement: default_elitism_replacement(),
            fast_convergence: false,
            multi_objective: false,
            evaluation: EvaluationMode::default(),
            scaling: ScalingMethod::default(),
            max_time_secs: None,
            freq_stats: 0,
            seed: None,
        }
    }
}

fn default_generations() -> usize {
    100
}
fn default_population_size() -> usize {
    80
}
fn default_mutation_rate() -> f64 {
    0.02
}
fn default_crossover_rate() -> f64 {
    0.9
}
fn default_elitism() -> bool {
    true
}
fn default_elitism_replacement() -> f64 {
    1.0
}

impl EngineConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size < 2 {
            return Err(ConfigError::PopulationTooSmall(self.population_size));
        }
        if self.generations < 1 {
            return Err(ConfigError::NoGenerations);
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(ConfigError::InvalidMutationRate(self.mutation_rate));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(ConfigError::InvalidCrossoverRate(self.crossover_rate));
        }
        self.elitism_count()?;
        match self.selector {
            SelectionMethod::Tournament { pool } | SelectionMethod::TournamentAlternative { pool }
                if pool == 0 =>
            {
                return Err(ConfigError::EmptyTournamentPool);
            }
            _ => {}
        }
        if let EvaluationMode::Parallel { max_workers, .. } = self.evaluation
            && max_workers == 0
        {
            return Err(ConfigError::NoWorkers);
        }
        if let ScalingMethod::Weighted { weights } = &self.scaling
            && weights.is_empty()
        {
            return Err(ConfigError::EmptyWeights);
        }
        if let Some(limit) = self.max_time_secs
            && (limit.is_nan() || limit <= 0.0)
        {
            return Err(ConfigError::InvalidTimeLimit(limit));
        }
        Ok(())
    }

    /// Number of elite ranks to carry over.
    pub fn elitism_count(&self) -> Result<usize, ConfigError> {
        let replacement = self.elitism_replacement;
        if replacement >= 1.0 {
            Ok(replacement.floor() as usize)
        } else if replacement > 0.0 {
            Ok((replacement * self.population_size as f64).ceil() as usize)
        } else {
            Err(ConfigError::InvalidElitismReplacement(replacement))
        }
    }
}

/// Parent selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum SelectionMethod {
    /// Uniform among the genomes tied with the best fitness.
    Rank,
    /// Uniform over the population.
    Uniform,
    /// Lowest fitness of a roulette-drawn pool.
    Tournament {
        #[serde(default = "default_tournament_pool")]
        pool: usize,
    },
    /// Lowest fitness of a uniformly drawn pool.
    TournamentAlternative {
        #[serde(default = "default_tournament_pool")]
        pool: usize,
    },
    /// Rank-weighted roulette wheel.
    RouletteWheel,
}

impl Default for SelectionMethod {
    fn default() -> Self {
        Self::Rank
    }
}

fn default_tournament_pool() -> usize {
    2
}

/// Population evaluation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum EvaluationMode {
    /// One genome after the other on the calling thread.
    Sequential,
    /// Private clones scored on a worker pool.
    Parallel {
        #[serde(default = "default_max_workers")]
        max_workers: usize,
        /// Copy the whole evaluated clone back instead of only its score.
        #[serde(default)]
        full_copy: bool,
    },
    /// One call to the batch evaluator for the whole population.
    Batch,
}

impl Default for EvaluationMode {
    fn default() -> Self {
        Self::Sequential
    }
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Serializable raw score to fitness conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScalingMethod {
    /// Fitness is the negated sum of the score components.
    NegatedSum,
    /// Fitness is the negated weighted sum of the score components.
    Weighted { weights: Vec<f64> },
}

impl Default for ScalingMethod {
    fn default() -> Self {
        Self::NegatedSum
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be at least 2, got {0}")]
    PopulationTooSmall(usize),
    #[error("Generation count must be at least 1")]
    NoGenerations,
    #[error("Mutation rate must be within [0, 1], got {0}")]
    InvalidMutationRate(f64),
    #[error("Crossover rate must be within [0, 1], got {0}")]
    InvalidCrossoverRate(f64),
    #[error("Elitism replacement must be >= 1 or a fraction in (0, 1), got {0}")]
    InvalidElitismReplacement(f64),
    #[error("Tournament pool must hold at least one genome")]
    EmptyTournamentPool,
    #[error("Parallel evaluation needs at least one worker")]
    NoWorkers,
    #[error("Weighted scaling needs at least one weight")]
    EmptyWeights,
    #[error("Time limit must be positive, got {0}")]
    InvalidTimeLimit(f64),
    #[error("Intbrnp must be within [0, 1], got {0}")]
    InvalidIntbrnp(f64),
    #[error("Failed to read run file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse run file: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.generations, 100);
        assert_eq!(config.population_size, 80);
        assert_eq!(config.mutation_rate, 0.02);
        assert_eq!(config.crossover_rate, 0.9);
        assert_eq!(config.selector, SelectionMethod::Rank);
        assert!(config.elitism);
        assert_eq!(config.elitism_count().unwrap(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tagged_enums() {
        let json = r#"{
            "selector": { "method": "Tournament" },
            "evaluation": { "mode": "Parallel", "max_workers": 3 },
            "scaling": { "type": "Weighted", "weights": [1.0, 0.5] }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.selector, SelectionMethod::Tournament { pool: 2 });
        assert_eq!(
            config.evaluation,
            EvaluationMode::Parallel {
                max_workers: 3,
                full_copy: false
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fractional_elitism() {
        let config = EngineConfig {
            population_size: 10,
            elitism_replacement: 0.25,
            ..Default::default()
        };
        assert_eq!(config.elitism_count().unwrap(), 3);

        let config = EngineConfig {
            elitism_replacement: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidElitismReplacement(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        let small = EngineConfig {
            population_size: 1,
            ..Default::default()
        };
        assert!(matches!(
            small.validate(),
            Err(ConfigError::PopulationTooSmall(1))
        ));

        let rate = EngineConfig {
            mutation_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            rate.validate(),
            Err(ConfigError::InvalidMutationRate(_))
        ));

        let gens = EngineConfig {
            generations: 0,
            ..Default::default()
        };
        assert!(matches!(gens.validate(), Err(ConfigError::NoGenerations)));
    }
}
