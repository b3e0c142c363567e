//! Assembly of a complete run from a [`RunFile`].

use std::sync::Arc;

use log::info;

use crate::evolution::{Engine, Result};
use crate::memo::Memoizer;
use crate::schema::RunFile;
use crate::tree::Tree;

use super::{
    CachedModel, DtlRates, EdgeRates, LcaReconciliation, ReferenceTreeModel, RunContext, TreeGenome, TreeModel,
    tree_genome_ops,
};

/// Build the engine described by `run`: gene tree template, scorer (memoized
/// when a cache is configured) and optional reconciliation.
pub fn build_engine(run: &RunFile) -> Result<Engine<TreeGenome>> {
    run.validate()?;
    let gene_tree = Tree::from_newick(&run.gene_tree)?;
    let reference = Tree::from_newick(&run.reference_tree)?;

    let mut ctx = RunContext::new(run.gene_map.clone());
    if let Some(config) = &run.reconciliation {
        ctx = ctx.with_reconciliation(Arc::new(LcaReconciliation::from_config(config)?));
    }

    let scorer = ReferenceTreeModel::new(reference);
    let model: Arc<dyn TreeModel> = match &run.cache {
        Some(cache) => {
            let memo = match &cache.dir {
                Some(dir) => Memoizer::open(cache.max_entries, dir)?,
                None => Memoizer::in_memory(cache.max_entries),
            };
            Arc::new(CachedModel::new(scorer, memo))
        }
        None => Arc::new(scorer),
    };

    let rates = run.rates;
    let branches = gene_tree.node_count().saturating_sub(1);
    let template = TreeGenome::new(
        gene_tree,
        model,
        Box::new(DtlRates::new(rates.duplication, rates.transfer, rates.loss, rates.sigma)),
        Box::new(EdgeRates::uniform(branches, rates.edge_rate, rates.sigma)),
        Arc::new(ctx),
    )
    .with_intbrnp(run.intbrnp)
    .with_is_init(run.is_init);

    info!(
        "Run assembled: {} species, reconciliation {}",
        template.species_len(),
        if run.reconciliation.is_some() { "on" } else { "off" }
    );
    Engine::new(run.engine.clone(), template, tree_genome_ops())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::{EvolutionError, Genome};

    const RUN: &str = r#"{
        "engine": { "generations": 3, "population_size": 6, "seed": 5 },
        "gene_tree": "(((a,b),(c,a)),((b,c),d));",
        "gene_map": { "a": ["a1", "a2"], "b": ["b1", "b2"], "c": ["c1", "c2"], "d": ["d1"] },
        "reference_tree": "(((a1,b1),(c1,a2)),((b2,c2),d1));",
        "cache": { "max_entries": 100 }
    }"#;

    #[test]
    fn test_build_and_run() {
        let run: RunFile = serde_json::from_str(RUN).unwrap();
        let mut engine = build_engine(&run).unwrap();
        let outcome = engine.evolve().unwrap();
        assert_eq!(outcome.generations, 3);
        assert!(outcome.best.score()[0] >= 0.0);
    }

    #[test]
    fn test_reconciled_run() {
        let mut run: RunFile = serde_json::from_str(RUN).unwrap();
        run.reconciliation = serde_json::from_str(r#"{ "species_tree": "((a,b),(c,d));" }"#).unwrap();
        let mut engine = build_engine(&run).unwrap();
        let outcome = engine.evolve().unwrap();
        assert_eq!(outcome.best.score().len(), 2);
    }

    #[test]
    fn test_bad_newick_is_reported() {
        let mut run: RunFile = serde_json::from_str(RUN).unwrap();
        run.gene_tree = "((a,b),c".to_string();
        assert!(matches!(build_engine(&run), Err(EvolutionError::Tree(_))));
    }
}
