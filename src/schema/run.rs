//! CLI run file: one JSON document describing a complete run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ConfigError, EngineConfig};

/// A complete run: engine parameters, the starting gene tree and the data
/// needed to score it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Starting gene tree in Newick. Leaves carry species names unless
    /// `is_init` is set, in which case they already carry gene names.
    pub gene_tree: String,
    /// Species name to the names of its genes.
    pub gene_map: BTreeMap<String, Vec<String>>,
    /// Gene tree the reference scorer measures distance to.
    pub reference_tree: String,
    #[serde(default)]
    pub is_init: bool,
    /// Probability of preferring an internal branch in crossover.
    #[serde(default = "default_intbrnp")]
    pub intbrnp: f64,
    /// Enables reconciliation against a species tree.
    #[serde(default)]
    pub reconciliation: Option<ReconciliationConfig>,
    #[serde(default)]
    pub rates: RateConfig,
    /// Memoize scores of already seen trees.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

fn default_intbrnp() -> f64 {
    0.95
}

impl RunFile {
    /// Read and validate a run file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let run: RunFile = serde_json::from_str(&contents)?;
        run.validate()?;
        Ok(run)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if !(0.0..=1.0).contains(&self.intbrnp) {
            return Err(ConfigError::InvalidIntbrnp(self.intbrnp));
        }
        Ok(())
    }
}

/// Duplication/loss reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Species tree in Newick.
    pub species_tree: String,
    #[serde(default = "default_event_cost")]
    pub duplication_cost: f64,
    #[serde(default = "default_event_cost")]
    pub loss_cost: f64,
    /// Relative weights of the mutation events drawn while reconciling.
    #[serde(default)]
    pub event_weights: EventWeights,
}

fn default_event_cost() -> f64 {
    1.0
}

/// Relative weights of root re-anchoring, DTL-rate mutation, edge-rate
/// mutation and SPR transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventWeights {
    #[serde(default = "default_weight")]
    pub root: f64,
    #[serde(default = "default_weight")]
    pub dtl: f64,
    #[serde(default = "default_weight")]
    pub edge: f64,
    #[serde(default = "default_weight")]
    pub transfer: f64,
}

impl Default for EventWeights {
    fn default() -> Self {
        Self {
            root: 1.0,
            dtl: 1.0,
            edge: 1.0,
            transfer: 1.0,
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

/// Initial rate parameters and their mutation step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    #[serde(default = "default_duplication")]
    pub duplication: f64,
    #[serde(default = "default_loss")]
    pub loss: f64,
    #[serde(default = "default_transfer")]
    pub transfer: f64,
    #[serde(default = "default_edge_rate")]
    pub edge_rate: f64,
    /// Standard deviation of the log-normal mutation step.
    #[serde(default = "default_sigma")]
    pub sigma: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            duplication: default_duplication(),
            loss: default_loss(),
            transfer: default_transfer(),
            edge_rate: default_edge_rate(),
            sigma: default_sigma(),
        }
    }
}

fn default_duplication() -> f64 {
    0.1
}
fn default_loss() -> f64 {
    0.1
}
fn default_transfer() -> f64 {
    0.05
}
fn default_edge_rate() -> f64 {
    1.0
}
fn default_sigma() -> f64 {
    0.1
}

/// Memo cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Directory for on-disk entries; memory only when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_max_entries() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "gene_tree": "((A,A),B);",
        "gene_map": { "A": ["a1", "a2"], "B": ["b1"] },
        "reference_tree": "((a1,a2),b1);"
    }"#;

    #[test]
    fn test_minimal_run_file() {
        let run: RunFile = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(run.intbrnp, 0.95);
        assert!(!run.is_init);
        assert!(run.reconciliation.is_none());
        assert_eq!(run.rates, RateConfig::default());
        assert!(run.validate().is_ok());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, MINIMAL).unwrap();
        let run = RunFile::load(&path).unwrap();
        assert_eq!(run.gene_map["A"], vec!["a1", "a2"]);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RunFile::load(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_intbrnp_range() {
        let mut run: RunFile = serde_json::from_str(MINIMAL).unwrap();
        run.intbrnp = 1.5;
        assert!(matches!(
            run.validate(),
            Err(ConfigError::InvalidIntbrnp(_))
        ));
    }
}
