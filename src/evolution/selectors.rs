//! Parent selection strategies.
//!
//! Selectors return slot indices into a fitness-sorted population. Rank picks
//! among the best genomes while Tournament and roulette favour the lowest
//! fitness: the two conventions coexist on purpose and callers choose the
//! strategy matching their scaling.

use rand::Rng;
use rand::rngs::StdRng;

use crate::schema::SelectionMethod;

use super::{EvolutionError, Genome, Population, Result};

/// Parent selector with per-generation caches.
#[derive(Debug, Clone)]
pub struct Selector {
    method: SelectionMethod,
    rank_cache: Option<(usize, usize)>,
    wheel_cache: Option<(usize, Vec<f64>)>,
}

impl Selector {
    pub fn new(method: SelectionMethod) -> Self {
        Self {
            method,
            rank_cache: None,
            wheel_cache: None,
        }
    }

    pub fn method(&self) -> SelectionMethod {
        self.method
    }

    /// Drop the cached tie count and wheel. Generation numbers restart with
    /// every run, so the caches must not outlive the population they were
    /// built from.
    pub fn reset(&mut self) {
        self.rank_cache = None;
        self.wheel_cache = None;
    }

    #[cfg(test)]
    pub(crate) fn cached_wheel(&self) -> Option<&[f64]> {
        self.wheel_cache.as_ref().map(|(_, w)| w.as_slice())
    }

    /// Pick one genome of `population`. `pop_id` identifies the generation;
    /// cached data is rebuilt whenever it changes.
    pub fn select<G: Genome>(
        &mut self,
        population: &Population<G>,
        pop_id: usize,
        rng: &mut StdRng,
    ) -> Result<usize> {
        if population.is_empty() {
            return Err(EvolutionError::IndexOutOfRange { index: 0, len: 0 });
        }
        match self.method {
            SelectionMethod::Rank => self.rank(population, pop_id, rng),
            SelectionMethod::Uniform => Ok(uniform(population, rng)),
            SelectionMethod::Tournament { pool } => {
                let mut chosen: Option<usize> = None;
                for _ in 0..pool.max(1) {
                    let candidate = self.roulette_wheel(population, pop_id, rng)?;
                    chosen = Some(lowest_fitness(population, chosen, candidate));
                }
                Ok(chosen.unwrap_or(0))
            }
            SelectionMethod::TournamentAlternative { pool } => {
                let mut chosen: Option<usize> = None;
                for _ in 0..pool.max(1) {
                    let candidate = uniform(population, rng);
                    chosen = Some(lowest_fitness(population, chosen, candidate));
                }
                Ok(chosen.unwrap_or(0))
            }
            SelectionMethod::RouletteWheel => self.roulette_wheel(population, pop_id, rng),
        }
    }

    fn rank<G: Genome>(
        &mut self,
        population: &Population<G>,
        pop_id: usize,
        rng: &mut StdRng,
    ) -> Result<usize> {
        let count = match self.rank_cache {
            Some((id, count)) if id == pop_id => count,
            _ => {
                let best = population.best_fitness(0)?.fitness();
                let mut count = 0;
                for index in 1..population.len() {
                    if population.get(index)?.fitness() == best {
                        count += 1;
                    }
                }
                self.rank_cache = Some((pop_id, count));
                count
            }
        };
        let rank = rng.gen_range(0..=count.min(population.len().saturating_sub(1)));
        population.rank_index(rank)
    }

    fn roulette_wheel<G: Genome>(
        &mut self,
        population: &Population<G>,
        pop_id: usize,
        rng: &mut StdRng,
    ) -> Result<usize> {
        let rebuild = !matches!(&self.wheel_cache, Some((id, _)) if *id == pop_id);
        if rebuild {
            let mut ranked = Vec::with_capacity(population.len());
            for rank in 0..population.len() {
                ranked.push(population.best_fitness(rank)?.fitness());
            }
            self.wheel_cache = Some((pop_id, roulette_wheel_weights(&ranked)));
        }
        let wheel = self.wheel_cache.as_ref().map(|(_, w)| w.as_slice()).unwrap_or(&[]);

        let cutoff: f64 = rng.r#gen();
        let mut lower: isize = 0;
        let mut upper: isize = wheel.len() as isize - 1;
        while upper >= lower {
            let i = lower + (upper - lower) / 2;
            if wheel[i as usize] > cutoff {
                upper = i - 1;
            } else {
                lower = i + 1;
            }
        }
        let rank = lower.clamp(0, population.len() as isize - 1) as usize;
        population.rank_index(rank)
    }
}

fn uniform<G: Genome>(population: &Population<G>, rng: &mut StdRng) -> usize {
    rng.gen_range(0..population.len())
}

fn lowest_fitness<G: Genome>(population: &Population<G>, current: Option<usize>, candidate: usize) -> usize {
    let fitness = |i: usize| population.genomes()[i].fitness();
    match current {
        Some(c) if fitness(c) <= fitness(candidate) => c,
        _ => candidate,
    }
}

/// Cumulative, normalized selection weights over fitness values given in
/// rank order (best first). Lower fitness gets the larger weight:
/// `w_i = max + min - f_i` when all fitness values share a sign, `max - f_i`
/// otherwise. Equal extremes give the uniform ramp `(i + 1) / n`.
pub fn roulette_wheel_weights(ranked_fitness: &[f64]) -> Vec<f64> {
    let n = ranked_fitness.len();
    if n == 0 {
        return Vec::new();
    }
    let max = ranked_fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = ranked_fitness.iter().copied().fold(f64::INFINITY, f64::min);

    if max == min {
        return (0..n).map(|i| (i + 1) as f64 / n as f64).collect();
    }

    let same_sign = (max > 0.0 && min >= 0.0) || (max <= 0.0 && min < 0.0);
    let offset = if same_sign { max + min } else { max };

    let mut cumulative = Vec::with_capacity(n);
    let mut total = 0.0;
    for &f in ranked_fitness {
        total += offset - f;
        cumulative.push(total);
    }
    if total == 0.0 {
        return (0..n).map(|i| (i + 1) as f64 / n as f64).collect();
    }
    for value in &mut cumulative {
        *value /= total;
    }
    cumulative
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::population::tests::scored_population;
    use proptest::prelude::*;
    use rand::SeedableRng;

    #[test]
    fn test_rank_picks_best_without_ties() {
        // negated scores read [10, 8, 6, 4]
        let mut pop = scored_population(&[-10.0, -8.0, -6.0, -4.0]);
        pop.sort();
        let fitness: Vec<f64> = pop.genomes().iter().map(|g| g.fitness()).collect();
        assert_eq!(fitness, vec![10.0, 8.0, 6.0, 4.0]);

        let mut selector = Selector::new(SelectionMethod::Rank);
        let mut rng = StdRng::seed_from_u64(7);
        for pop_id in 0..20 {
            let idx = selector.select(&pop, pop_id, &mut rng).unwrap();
            assert_eq!(pop.genomes()[idx].fitness(), 10.0);
        }
    }

    #[test]
    fn test_rank_spreads_over_ties() {
        let mut pop = scored_population(&[1.0, 1.0, 1.0, 5.0]);
        pop.sort();
        let mut selector = Selector::new(SelectionMethod::Rank);
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; 4];
        for _ in 0..200 {
            let idx = selector.select(&pop, 0, &mut rng).unwrap();
            seen[idx] = true;
        }
        assert_eq!(seen, [true, true, true, false]);
    }

    #[test]
    fn test_tournament_prefers_low_fitness() {
        let mut pop = scored_population(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        pop.sort();
        let mut selector = Selector::new(SelectionMethod::TournamentAlternative { pool: 5 });
        let mut rng = StdRng::seed_from_u64(11);
        let mut worst_hits = 0;
        for _ in 0..200 {
            let idx = selector.select(&pop, 0, &mut rng).unwrap();
            if idx == pop.len() - 1 {
                worst_hits += 1;
            }
        }
        // a pool of five draws misses the worst slot with probability 0.8^5
        assert!(worst_hits > 100);
    }

    #[test]
    fn test_roulette_stays_in_range() {
        let mut pop = scored_population(&[3.0, 1.0, 2.0]);
        pop.sort();
        let mut selector = Selector::new(SelectionMethod::Tournament { pool: 2 });
        let mut rng = StdRng::seed_from_u64(5);
        for pop_id in 0..50 {
            let idx = selector.select(&pop, pop_id / 10, &mut rng).unwrap();
            assert!(idx < pop.len());
        }
    }

    #[test]
    fn test_reset_rebuilds_wheel_for_same_generation() {
        let mut first = scored_population(&[1.0, 2.0, 3.0, 4.0]);
        first.sort();
        let mut second = scored_population(&[1.0, 10.0, 20.0, 40.0]);
        second.sort();
        let mut selector = Selector::new(SelectionMethod::RouletteWheel);
        let mut rng = StdRng::seed_from_u64(9);

        selector.select(&first, 0, &mut rng).unwrap();
        let stale = selector.cached_wheel().unwrap().to_vec();
        selector.reset();
        assert!(selector.cached_wheel().is_none());

        selector.select(&second, 0, &mut rng).unwrap();
        let ranked: Vec<f64> = second.genomes().iter().map(|g| g.fitness()).collect();
        assert_eq!(selector.cached_wheel().unwrap(), roulette_wheel_weights(&ranked).as_slice());
        assert_ne!(selector.cached_wheel().unwrap(), stale.as_slice());
    }

    #[test]
    fn test_wheel_uniform_ramp() {
        assert_eq!(roulette_wheel_weights(&[2.0, 2.0, 2.0, 2.0]), vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_wheel_negative_fitness() {
        let wheel = roulette_wheel_weights(&[-1.0, -2.0, -3.0]);
        // weights: -4 + 1, -4 + 2, -4 + 3 -> all negative, same normalisation
        let expected = [-3.0 / -6.0, -5.0 / -6.0, 1.0];
        for (w, e) in wheel.iter().zip(expected) {
            assert!((w - e).abs() < 1e-12);
        }
    }

    proptest! {
        #[test]
        fn wheel_is_monotone_and_normalized(
            mut values in prop::collection::vec(-1000.0f64..1000.0, 2..40)
        ) {
            values.sort_by(|a, b| b.total_cmp(a));
            let all_negative = values.iter().all(|v| *v < 0.0);
            let all_positive = values.iter().all(|v| *v > 0.0);
            prop_assume!(!all_negative && !all_positive);
            let wheel = roulette_wheel_weights(&values);
            prop_assert_eq!(wheel.len(), values.len());
            prop_assert!((wheel[wheel.len() - 1] - 1.0).abs() < 1e-9);
            for pair in wheel.windows(2) {
                prop_assert!(pair[1] >= pair[0] - 1e-12);
            }
        }

        #[test]
        fn wheel_same_sign_is_monotone(
            mut values in prop::collection::vec(0.0f64..1000.0, 2..40)
        ) {
            values.sort_by(|a, b| b.total_cmp(a));
            let wheel = roulette_wheel_weights(&values);
            prop_assert!((wheel[wheel.len() - 1] - 1.0).abs() < 1e-9);
            for pair in wheel.windows(2) {
                prop_assert!(pair[1] >= pair[0] - 1e-12);
            }
        }
    }
}
