//! Evaluation glue between tree genomes and their scorer.

use log::trace;

use crate::evolution::{EvolutionError, Result};

use super::TreeGenome;

/// Engine evaluation hook.
///
/// Component 0 is the model score. A refined tree returned by the model
/// replaces the genome's tree. With reconciliation, component 1 is the
/// reconciliation cost.
pub fn evaluate(genome: &mut TreeGenome) -> Result<Vec<f64>> {
    let model = genome.model().clone();
    let output = model.optimize_model(genome.tree(), true)?;
    if let Some(refined) = output.refined {
        trace!("Applying refined tree from {}", model.name());
        genome.update_tree(refined)?;
    }
    let mut score = vec![output.score];
    if let Some(recon) = genome.context().reconciliation().cloned() {
        score.push(recon.compute_rec_cost(genome)?);
    }
    Ok(score)
}

/// Engine batch evaluation hook: scores every tree with one call to the
/// first genome's model.
pub fn bulk_evaluate(genomes: &[TreeGenome]) -> Result<Vec<Vec<f64>>> {
    let Some(first) = genomes.first() else {
        return Ok(Vec::new());
    };
    let trees: Vec<_> = genomes.iter().map(TreeGenome::tree).collect();
    let scores = first.model().optimize_batch(&trees)?;
    if scores.len() != trees.len() {
        return Err(EvolutionError::ScoreCountMismatch {
            expected: trees.len(),
            got: scores.len(),
        });
    }

    let recon = first.context().reconciliation().cloned();
    genomes
        .iter()
        .zip(scores)
        .map(|(genome, score)| -> Result<Vec<f64>> {
            let mut components = vec![score];
            if let Some(recon) = &recon {
                components.push(recon.compute_rec_cost(genome)?);
            }
            Ok(components)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polysolver::genome::tests::{genome_with, named_genome, reconciled_genome};
    use crate::polysolver::tests::{gene_map, gene_tree};
    use crate::evolution::{Genome, Population, Scaling};
    use crate::polysolver::{
        LcaReconciliation, ModelError, ModelOutput, ReferenceTreeModel, RunContext, TreeModel, tree_genome_ops,
    };
    use crate::schema::EvaluationMode;
    use crate::schema::EventWeights;
    use crate::tree::Tree;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    struct ShortBatch;

    impl TreeModel for ShortBatch {
        fn name(&self) -> &str {
            "short"
        }

        fn optimize_model(&self, _tree: &Tree, _expect_tree: bool) -> std::result::Result<ModelOutput, ModelError> {
            Ok(ModelOutput {
                score: 0.0,
                refined: None,
            })
        }

        fn optimize_batch(&self, _trees: &[&Tree]) -> std::result::Result<Vec<f64>, ModelError> {
            Ok(vec![0.0])
        }
    }

    /// Returns a fixed tree with the root split of [`gene_tree`] but
    /// different inner clades.
    struct Reshaping;

    fn reshaped() -> Tree {
        Tree::from_newick("(((a1,c1),(b1,a2)),((b2,c2),d1));").unwrap()
    }

    impl TreeModel for Reshaping {
        fn name(&self) -> &str {
            "reshaping"
        }

        fn optimize_model(&self, _tree: &Tree, _expect_tree: bool) -> std::result::Result<ModelOutput, ModelError> {
            Ok(ModelOutput {
                score: 1.0,
                refined: Some(reshaped()),
            })
        }
    }

    #[test]
    fn test_parallel_full_copy_keeps_refined_trees() {
        let model: Arc<dyn TreeModel> = Arc::new(Reshaping);
        for full_copy in [false, true] {
            let mode = EvaluationMode::Parallel {
                max_workers: 2,
                full_copy,
            };
            let mut pop = Population::new(2, mode, Scaling::NegatedSum).unwrap();
            for seed in 0..2 {
                let mut genome = genome_with(gene_tree(), model.clone(), RunContext::new(gene_map())).with_is_init(true);
                genome.initialize(&mut StdRng::seed_from_u64(seed)).unwrap();
                pop.push(genome);
            }
            pop.evaluate(&tree_genome_ops()).unwrap();

            for genome in pop.genomes() {
                assert_eq!(genome.score(), &[1.0]);
                assert_eq!(genome.fitness(), -1.0);
                let from_gene_tree = genome.tree().robinson_foulds(&gene_tree()).0;
                if full_copy {
                    assert_eq!(genome.tree().robinson_foulds(&reshaped()).0, 0);
                    assert!(from_gene_tree > 0);
                } else {
                    assert_eq!(from_gene_tree, 0);
                }
                assert!(genome.tree().leaves().iter().all(|&n| genome.species(n).is_some()));
            }
        }
    }

    #[test]
    fn test_evaluate_model_score() {
        let mut genome = named_genome();
        assert_eq!(evaluate(&mut genome).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_evaluate_with_reconciliation() {
        let recon = LcaReconciliation::new(
            Tree::from_newick("((a,b),(c,d));").unwrap(),
            2.0,
            1.0,
            EventWeights::default(),
        )
        .unwrap();
        let mut genome = reconciled_genome(recon);
        let score = evaluate(&mut genome).unwrap();
        assert_eq!(score.len(), 2);
        assert_eq!(score[0], 0.0);
        assert!(score[1] > 0.0);
    }

    #[test]
    fn test_evaluate_applies_refined_tree() {
        let model: Arc<dyn TreeModel> = Arc::new(ReferenceTreeModel::new(gene_tree()).with_refinement(true));
        let mut genome = genome_with(gene_tree(), model, RunContext::new(gene_map())).with_is_init(true);
        genome.initialize(&mut StdRng::seed_from_u64(0)).unwrap();
        evaluate(&mut genome).unwrap();
        let tree = genome.tree();
        assert_eq!(tree.robinson_foulds(&gene_tree()).0, 0);
        assert!(tree.leaves().iter().all(|&n| genome.species(n).is_some()));
    }

    #[test]
    fn test_bulk_evaluate() {
        let genomes = vec![named_genome(), named_genome()];
        assert_eq!(bulk_evaluate(&genomes).unwrap(), vec![vec![0.0], vec![0.0]]);
        assert!(bulk_evaluate(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_bulk_evaluate_count_mismatch() {
        let model: Arc<dyn TreeModel> = Arc::new(ShortBatch);
        let genomes = vec![
            genome_with(gene_tree(), model.clone(), RunContext::new(gene_map())),
            genome_with(gene_tree(), model, RunContext::new(gene_map())),
        ];
        let err = bulk_evaluate(&genomes).unwrap_err();
        assert!(matches!(err, EvolutionError::ScoreCountMismatch { expected: 2, got: 1 }));
    }
}
