//! Generation loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::schema::EngineConfig;

use super::{
    Crossover, Genome, GenomeOps, MutationContext, Population, Result, Scaling, Selector,
    Statistics, merge_generations,
};

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopReason {
    MaxGenerations,
    TimeBudget,
    /// A named termination criterion held.
    TerminationCriteria(String),
    StepCallback,
    Cancelled,
}

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Initializing,
    Evaluating,
    Selecting,
    Reproducing,
    Replacing,
    Terminated,
}

/// Called before every generation; returning `true` stops the run.
pub type StepCallback<G> = Box<dyn FnMut(&Engine<G>) -> bool + Send>;

/// Predicate checked before every generation.
pub type TerminationCriterion<G> = Arc<dyn Fn(&Engine<G>) -> bool + Send + Sync>;

/// Result of [`Engine::evolve`].
#[derive(Debug, Clone)]
pub struct EvolutionOutcome<G> {
    pub best: G,
    pub stop_reason: StopReason,
    pub generations: usize,
    pub elapsed_secs: f64,
    pub statistics: Statistics,
}

/// Genetic-algorithm engine over one population.
pub struct Engine<G: Genome> {
    config: EngineConfig,
    template: G,
    ops: GenomeOps<G>,
    population: Population<G>,
    selector: Selector,
    rng: StdRng,
    elitism_count: usize,
    step_callback: Option<StepCallback<G>>,
    criteria: Vec<(String, TerminationCriterion<G>)>,
    current_generation: usize,
    time_init: Option<Instant>,
    state: EngineState,
    cancelled: Arc<AtomicBool>,
}

impl<G: Genome> Engine<G> {
    /// Validate `config` and build an engine around `template`, the genome
    /// every individual of the first generation is cloned from.
    pub fn new(config: EngineConfig, template: G, ops: GenomeOps<G>) -> Result<Self> {
        config.validate()?;
        let elitism_count = config.elitism_count()?;
        let population = Population::new(
            config.population_size,
            config.evaluation,
            Scaling::from(config.scaling.clone()),
        )?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!(
            "Engine created: generations={}, population={}",
            config.generations, config.population_size
        );

        Ok(Self {
            selector: Selector::new(config.selector),
            config,
            template,
            ops,
            population,
            rng,
            elitism_count,
            step_callback: None,
            criteria: Vec::new(),
            current_generation: 0,
            time_init: None,
            state: EngineState::Idle,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the raw score to fitness conversion.
    pub fn with_scaling(mut self, scaling: Scaling) -> Self {
        self.population.set_scaling(scaling);
        self
    }

    /// Stop the run when `callback` returns `true`.
    pub fn set_step_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&Engine<G>) -> bool + Send + 'static,
    {
        self.step_callback = Some(Box::new(callback));
    }

    /// Register a named termination criterion.
    pub fn add_termination_criterion<F>(&mut self, name: impl Into<String>, criterion: F)
    where
        F: Fn(&Engine<G>) -> bool + Send + Sync + 'static,
    {
        self.criteria.push((name.into(), Arc::new(criterion)));
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn population(&self) -> &Population<G> {
        &self.population
    }

    pub fn statistics(&self) -> &Statistics {
        self.population.stats()
    }

    pub fn current_generation(&self) -> usize {
        self.current_generation
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Best genome of the current generation.
    pub fn best_individual(&self) -> Result<&G> {
        self.population.best_fitness(0)
    }

    /// Worst genome of the current generation.
    pub fn worst_individual(&self) -> Result<&G> {
        self.population.worst_fitness(0)
    }

    /// Up to `n` best genomes, best first.
    pub fn best_n_individuals(&self, n: usize) -> Vec<&G> {
        (0..n.min(self.population.len()))
            .filter_map(|k| self.population.best_fitness(k).ok())
            .collect()
    }

    /// Create, score and rank the first generation.
    pub fn initialize(&mut self) -> Result<()> {
        self.state = EngineState::Initializing;
        self.current_generation = 0;
        self.selector.reset();
        self.time_init.get_or_insert_with(Instant::now);
        self.population.create(&self.template, &self.ops, &mut self.rng)?;

        self.state = EngineState::Evaluating;
        self.population.evaluate(&self.ops)?;
        if self.config.multi_objective {
            let ranked = merge_generations(self.population.genomes(), &[], self.population.size());
            self.population.moop_sort(ranked);
        } else {
            self.population.sort();
        }
        self.population.statistics();
        debug!("The engine was initialized");
        Ok(())
    }

    /// Run one generation. Returns `true` once the generation count or the
    /// time budget is exhausted.
    pub fn step(&mut self) -> Result<bool> {
        let mut next = self.population.empty_like();
        let len = self.population.len();
        let pop_id = self.current_generation;

        for _ in 0..len / 2 {
            self.state = EngineState::Selecting;
            let mom = self.select_parent(pop_id)?;
            let dad = self.select_parent(pop_id)?;

            self.state = EngineState::Reproducing;
            let (mut sister, mut brother) = match self.crossover_hook() {
                Some(crossover) => crossover(&mom, &dad, &mut self.rng)?,
                None => (mom, dad),
            };
            self.mutate(&mut sister)?;
            self.mutate(&mut brother)?;
            next.push(sister);
            next.push(brother);
        }

        if len % 2 != 0 {
            self.state = EngineState::Selecting;
            let mom = self.select_parent(pop_id)?;
            let dad = self.select_parent(pop_id)?;

            self.state = EngineState::Reproducing;
            let child = match self.crossover_hook() {
                Some(crossover) => crossover(&mom, &dad, &mut self.rng)?.0,
                None => {
                    let mut child = if self.rng.gen_bool(0.5) { mom } else { dad };
                    self.mutate(&mut child)?;
                    child
                }
            };
            next.push(child);
        }

        self.state = EngineState::Evaluating;
        debug!("Evaluating the new generation");
        next.evaluate(&self.ops)?;

        self.state = EngineState::Replacing;
        self.replace(&mut next)?;
        if !self.config.multi_objective {
            next.sort();
        }
        next.statistics();
        self.population = next;

        debug!("The generation {} was finished", self.current_generation);
        self.current_generation += 1;

        Ok(self.time_exceeded() || self.current_generation >= self.config.generations)
    }

    /// Run generations until a stop condition holds and report the best
    /// genome found.
    pub fn evolve(&mut self) -> Result<EvolutionOutcome<G>> {
        let start = Instant::now();
        self.time_init = Some(start);
        self.initialize()?;
        debug!("Starting loop over evolutionary algorithm");

        let freq_stats = self.config.freq_stats;
        let stop_reason = loop {
            if self.cancelled.load(Ordering::Relaxed) {
                debug!("Evolution cancelled");
                break StopReason::Cancelled;
            }

            let callback_stop = match self.step_callback.take() {
                Some(mut callback) => {
                    let stop = callback(self);
                    self.step_callback = Some(callback);
                    stop
                }
                None => false,
            };

            let engine: &Self = self;
            let fired = engine
                .criteria
                .iter()
                .find(|(_, criterion)| criterion(engine))
                .map(|(name, _)| name.clone());

            if freq_stats > 0 && self.current_generation % freq_stats == 0 {
                self.log_stats();
            }

            if let Some(name) = fired {
                debug!("Evolution stopped by the termination criterion '{name}'");
                break StopReason::TerminationCriteria(name);
            }
            if callback_stop {
                debug!("Evolution stopped by the step callback");
                break StopReason::StepCallback;
            }

            if self.step()? {
                break if self.time_exceeded() {
                    StopReason::TimeBudget
                } else {
                    StopReason::MaxGenerations
                };
            }
        };

        self.state = EngineState::Terminated;
        if freq_stats > 0 {
            self.log_stats();
        }

        Ok(EvolutionOutcome {
            best: self.best_individual()?.clone(),
            stop_reason,
            generations: self.current_generation,
            elapsed_secs: start.elapsed().as_secs_f64(),
            statistics: self.population.stats().clone(),
        })
    }

    fn crossover_hook(&mut self) -> Option<Crossover<G>> {
        let crossover = self.ops.crossover.clone()?;
        let rate = self.config.crossover_rate;
        (rate >= 1.0 || self.rng.r#gen::<f64>() < rate).then_some(crossover)
    }

    fn select_parent(&mut self, pop_id: usize) -> Result<G> {
        let index = self.selector.select(&self.population, pop_id, &mut self.rng)?;
        Ok(self.population.get(index)?.clone())
    }

    fn mutate(&mut self, genome: &mut G) -> Result<usize> {
        let mut ctx = MutationContext {
            rate: self.config.mutation_rate,
            fast_convergence: self.config.fast_convergence,
            rng: &mut self.rng,
        };
        (self.ops.mutator)(genome, &mut ctx)
    }

    /// Merge the previous generation into `next` with exactly one policy.
    ///
    /// Elitism compares the `k`-th best of both generations for
    /// `k < min(elitism_count, next.len() / 2)` and writes a better old genome
    /// over the `k`-th worst slot of `next`. The cap keeps every overwritten
    /// slot in the lower half, so the top ranks of `next` survive.
    ///
    /// Fast convergence visits the `floor(ln(len))` worst old genomes and
    /// carries one over the current worst slot of `next` when it dominates it:
    /// on both components for two-part scores, on the first otherwise.
    fn replace(&mut self, next: &mut Population<G>) -> Result<()> {
        if self.config.multi_objective {
            let merged = merge_generations(next.genomes(), self.population.genomes(), self.population.len());
            next.moop_sort(merged);
        } else if self.config.elitism {
            next.sort();
            let rounds = self.elitism_count.min(next.len() / 2).min(self.population.len());
            let mut replacements = Vec::new();
            for k in 0..rounds {
                let old = self.population.best_fitness(k)?;
                if old.fitness() > next.best_fitness(k)?.fitness() {
                    replacements.push((next.len() - 1 - k, old.clone()));
                }
            }
            for (slot, genome) in replacements {
                next.replace(slot, genome)?;
            }
        } else if self.config.fast_convergence {
            debug!("Running in fast convergence mode");
            next.sort();
            let candidates = ((next.len() as f64).ln().floor() as usize).max(1);
            let mut accepted = 0;
            for i in 0..candidates.min(self.population.len()) {
                if accepted >= next.len() {
                    break;
                }
                let slot = next.len() - 1 - accepted;
                let current = next.get(slot)?.score();
                let two_components = current.len() > 1;
                let old = if two_components {
                    self.population.worst_fitness(i)?
                } else {
                    self.population.worst_raw(i)?
                };
                let dominates = match (old.score(), current) {
                    ([a0, a1, ..], [b0, b1, ..]) => a0 < b0 && a1 < b1,
                    ([a0, ..], [b0, ..]) => a0 < b0,
                    _ => false,
                };
                if dominates {
                    let old = old.clone();
                    next.replace(slot, old)?;
                    accepted += 1;
                }
            }
        }
        Ok(())
    }

    fn time_exceeded(&self) -> bool {
        match (self.config.max_time_secs, self.time_init) {
            (Some(limit), Some(start)) => start.elapsed().as_secs_f64() > limit,
            _ => false,
        }
    }

    fn log_stats(&mut self) {
        let percent = self.current_generation as f64 * 100.0 / self.config.generations as f64;
        let elapsed = self.time_init.map_or(0.0, |t| t.elapsed().as_secs_f64());
        self.population.statistics();
        let stats = self.population.stats();
        info!(
            "Gen. {} ({:.2}%): {} individuals, {:.3}s elapsed\n{}",
            self.current_generation,
            percent,
            self.population.len(),
            elapsed,
            stats
        );
    }
}

/// Stops when the first and last ranked genomes are the same solution.
pub fn convergence_criteria<G: Genome>(engine: &Engine<G>) -> bool {
    let population = engine.population();
    match (population.best_fitness(0), population.worst_fitness(0)) {
        (Ok(first), Ok(last)) => first.same_solution(last),
        _ => false,
    }
}

/// Stops when maximum, minimum and average fitness coincide.
pub fn fitness_stats_criteria<G: Genome>(engine: &Engine<G>) -> bool {
    let stats = engine.statistics();
    stats.fit_max == stats.fit_min && stats.fit_min == stats.fit_ave
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::EvolutionError;
    use crate::evolution::population::tests::{Value, value, value_ops};
    use crate::schema::{ConfigError, EvaluationMode, SelectionMethod};

    fn config(population_size: usize, generations: usize) -> EngineConfig {
        EngineConfig {
            population_size,
            generations,
            mutation_rate: 0.3,
            seed: Some(42),
            ..Default::default()
        }
    }

    fn engine(config: EngineConfig) -> Engine<Value> {
        Engine::new(config, value(0.0), value_ops()).unwrap()
    }

    /// Population with explicit raw scores, fitness scaled but unsorted.
    fn with_scores(scores: &[[f64; 2]]) -> Population<Value> {
        let mut pop = Population::new(scores.len(), EvaluationMode::Sequential, Scaling::NegatedSum).unwrap();
        for score in scores {
            let mut genome = value(score[0]);
            genome.base.score = score.to_vec();
            pop.push(genome);
        }
        pop.scale();
        pop
    }

    fn fast_convergence_engine() -> Engine<Value> {
        engine(EngineConfig {
            elitism: false,
            fast_convergence: true,
            ..config(4, 10)
        })
    }

    #[test]
    fn test_runs_exact_generations() {
        let mut engine = engine(config(10, 5));
        let outcome = engine.evolve().unwrap();
        assert_eq!(outcome.stop_reason, StopReason::MaxGenerations);
        assert_eq!(outcome.generations, 5);
        assert_eq!(engine.current_generation(), 5);
        assert_eq!(engine.state(), EngineState::Terminated);
    }

    #[test]
    fn test_population_size_is_constant() {
        for size in [2, 7, 10] {
            let mut engine = engine(config(size, 20));
            engine.initialize().unwrap();
            for _ in 0..8 {
                engine.step().unwrap();
                assert_eq!(engine.population().len(), size);
            }
        }
    }

    #[test]
    fn test_elitism_never_loses_the_best() {
        let mut engine = engine(EngineConfig {
            selector: SelectionMethod::Uniform,
            ..config(9, 30)
        });
        engine.initialize().unwrap();
        let mut best = engine.best_individual().unwrap().fitness();
        for _ in 0..30 {
            engine.step().unwrap();
            let current = engine.best_individual().unwrap().fitness();
            assert!(current >= best);
            best = current;
        }
    }

    #[test]
    fn test_cancellation() {
        let mut engine = engine(config(6, 100));
        engine.cancel_handle().store(true, Ordering::Relaxed);
        let outcome = engine.evolve().unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert_eq!(outcome.generations, 0);
    }

    #[test]
    fn test_termination_criterion() {
        let mut engine = engine(config(6, 100));
        engine.add_termination_criterion("two generations", |e: &Engine<Value>| {
            e.current_generation() >= 2
        });
        let outcome = engine.evolve().unwrap();
        assert_eq!(
            outcome.stop_reason,
            StopReason::TerminationCriteria("two generations".to_string())
        );
        assert_eq!(outcome.generations, 2);
    }

    #[test]
    fn test_step_callback() {
        let mut engine = engine(config(6, 100));
        let mut calls = 0;
        engine.set_step_callback(move |_| {
            calls += 1;
            calls == 3
        });
        let outcome = engine.evolve().unwrap();
        assert_eq!(outcome.stop_reason, StopReason::StepCallback);
        assert_eq!(outcome.generations, 2);
    }

    #[test]
    fn test_time_budget() {
        let mut engine = engine(EngineConfig {
            max_time_secs: Some(1e-9),
            ..config(6, 1000)
        });
        let outcome = engine.evolve().unwrap();
        assert_eq!(outcome.stop_reason, StopReason::TimeBudget);
        assert_eq!(outcome.generations, 1);
    }

    #[test]
    fn test_convergence_criteria_on_uniform_population() {
        let ops = GenomeOps::new(
            |g: &mut Value, _rng: &mut StdRng| {
                g.value = 1.0;
                Ok(())
            },
            |_g: &mut Value, _ctx: &mut MutationContext<'_>| Ok(0),
            |g: &mut Value| Ok(vec![g.value]),
        );
        let mut engine = Engine::new(config(4, 50), value(0.0), ops).unwrap();
        engine.add_termination_criterion("converged", convergence_criteria);
        engine.add_termination_criterion("flat", fitness_stats_criteria);
        let outcome = engine.evolve().unwrap();
        assert_eq!(
            outcome.stop_reason,
            StopReason::TerminationCriteria("converged".to_string())
        );
        assert_eq!(outcome.generations, 0);
        assert!(fitness_stats_criteria(&engine));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let a = engine(config(8, 10)).evolve().unwrap();
        let b = engine(config(8, 10)).evolve().unwrap();
        assert_eq!(a.best.value, b.best.value);
        assert_eq!(a.statistics, b.statistics);
    }

    #[test]
    fn test_fast_convergence_and_pareto_keep_size() {
        let fast = EngineConfig {
            elitism: false,
            fast_convergence: true,
            ..config(7, 6)
        };
        let pareto = EngineConfig {
            multi_objective: true,
            ..config(7, 6)
        };
        for cfg in [fast, pareto] {
            let mut engine = engine(cfg);
            let outcome = engine.evolve().unwrap();
            assert_eq!(outcome.generations, 6);
            assert_eq!(engine.population().len(), 7);
        }
    }

    #[test]
    fn test_fast_convergence_carries_dominating_worst() {
        let mut engine = fast_convergence_engine();
        engine.population = with_scores(&[[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]]);
        let mut next = with_scores(&[[5.0, 6.0], [1.0, 1.0], [1.0, 2.0], [2.0, 1.0]]);

        engine.replace(&mut next).unwrap();
        let scores: Vec<&[f64]> = next.genomes().iter().map(|g| g.score()).collect();
        assert_eq!(scores[3], &[4.0, 4.0]);
        assert!(!scores.contains(&[5.0, 6.0].as_slice()));
    }

    #[test]
    fn test_fast_convergence_keeps_non_dominated_worst() {
        let mut engine = fast_convergence_engine();
        engine.population = with_scores(&[[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]]);
        // [4, 4] beats [5, 3] on the first component only
        let mut next = with_scores(&[[5.0, 3.0], [1.0, 1.0], [1.0, 2.0], [2.0, 1.0]]);

        engine.replace(&mut next).unwrap();
        assert_eq!(next.genomes()[3].score(), &[5.0, 3.0]);
        assert!(next.genomes().iter().all(|g| g.score() != [4.0, 4.0]));
    }

    #[test]
    fn test_second_run_rebuilds_selector_caches() {
        let mut engine = engine(EngineConfig {
            selector: SelectionMethod::RouletteWheel,
            ..config(6, 1)
        });
        engine.evolve().unwrap();
        let outcome = engine.evolve().unwrap();
        assert_eq!(outcome.generations, 1);

        engine.initialize().unwrap();
        engine.select_parent(0).unwrap();
        let ranked: Vec<f64> = (0..engine.population().len())
            .map(|k| engine.population().best_fitness(k).unwrap().fitness())
            .collect();
        assert_eq!(
            engine.selector.cached_wheel().unwrap(),
            crate::evolution::roulette_wheel_weights(&ranked).as_slice()
        );
    }

    #[test]
    fn test_parallel_evaluation_run() {
        let mut engine = engine(EngineConfig {
            evaluation: EvaluationMode::Parallel {
                max_workers: 2,
                full_copy: true,
            },
            ..config(8, 4)
        });
        let outcome = engine.evolve().unwrap();
        assert_eq!(outcome.generations, 4);
        assert_eq!(engine.best_n_individuals(3).len(), 3);
        assert_eq!(engine.best_n_individuals(30).len(), 8);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = Engine::new(config(1, 5), value(0.0), value_ops());
        assert!(matches!(
            result,
            Err(EvolutionError::Config(ConfigError::PopulationTooSmall(1)))
        ));
    }
}
