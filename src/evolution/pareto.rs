//! Pareto ranking for multi-objective generation merging.
//!
//! NSGA-II fast non-dominated sorting and crowding distance over raw score
//! vectors. Every component is minimized.

use std::cmp::Ordering;

use super::Genome;

/// Ranked individual: Pareto front index and crowding distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParetoRank {
    pub front: usize,
    pub crowding_distance: f64,
}

/// Whether `a` is no worse than `b` on every component and strictly better on
/// at least one. Vectors of different length never dominate.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x > y {
            return false;
        }
        if x < y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Indices grouped by Pareto front, best front first.
pub fn fast_non_dominated_sort(objectives: &[Vec<f64>]) -> Vec<Vec<usize>> {
    let n = objectives.len();
    let mut domination_count = vec![0usize; n];
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();

    let mut first = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(&objectives[i], &objectives[j]) {
                dominated[i].push(j);
            } else if dominates(&objectives[j], &objectives[i]) {
                domination_count[i] += 1;
            }
        }
        if domination_count[i] == 0 {
            first.push(i);
        }
    }
    if first.is_empty() {
        return fronts;
    }
    fronts.push(first);

    let mut current = 0;
    while current < fronts.len() {
        let mut next = Vec::new();
        for &i in &fronts[current] {
            for &j in &dominated[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        if !next.is_empty() {
            fronts.push(next);
        }
        current += 1;
    }
    fronts
}

/// Crowding distance of each member of `front`, in the order of `front`.
/// Boundary members get infinite distance.
pub fn crowding_distance(objectives: &[Vec<f64>], front: &[usize]) -> Vec<f64> {
    let size = front.len();
    if size <= 2 {
        return vec![f64::INFINITY; size];
    }
    let mut distance = vec![0.0; size];
    let components = objectives[front[0]].len();

    for obj in 0..components {
        let value = |pos: usize| objectives[front[pos]].get(obj).copied().unwrap_or(0.0);
        let mut order: Vec<usize> = (0..size).collect();
        order.sort_by(|&a, &b| value(a).partial_cmp(&value(b)).unwrap_or(Ordering::Equal));

        distance[order[0]] = f64::INFINITY;
        distance[order[size - 1]] = f64::INFINITY;

        let range = value(order[size - 1]) - value(order[0]);
        if range.abs() < 1e-10 {
            continue;
        }
        for i in 1..size - 1 {
            distance[order[i]] += (value(order[i + 1]) - value(order[i - 1])) / range;
        }
    }
    distance
}

/// Rank every score vector.
pub fn pareto_ranks(objectives: &[Vec<f64>]) -> Vec<ParetoRank> {
    let mut ranks = vec![
        ParetoRank {
            front: 0,
            crowding_distance: 0.0,
        };
        objectives.len()
    ];
    for (front_index, front) in fast_non_dominated_sort(objectives).iter().enumerate() {
        let distances = crowding_distance(objectives, front);
        for (&member, distance) in front.iter().zip(distances) {
            ranks[member] = ParetoRank {
                front: front_index,
                crowding_distance: distance,
            };
        }
    }
    ranks
}

/// Crowded comparison: lower front first, then larger crowding distance.
pub fn crowded_order(a: &ParetoRank, b: &ParetoRank) -> Ordering {
    a.front.cmp(&b.front).then_with(|| {
        b.crowding_distance
            .partial_cmp(&a.crowding_distance)
            .unwrap_or(Ordering::Equal)
    })
}

/// Merge an offspring generation with its parents and keep the best `size`
/// genomes by crowded comparison, best first.
pub fn merge_generations<G: Genome>(offspring: &[G], parents: &[G], size: usize) -> Vec<G> {
    let pool: Vec<&G> = offspring.iter().chain(parents).collect();
    let objectives: Vec<Vec<f64>> = pool.iter().map(|g| g.score().to_vec()).collect();
    let ranks = pareto_ranks(&objectives);

    let mut order: Vec<usize> = (0..pool.len()).collect();
    order.sort_by(|&a, &b| crowded_order(&ranks[a], &ranks[b]));
    order
        .into_iter()
        .take(size)
        .map(|i| pool[i].clone())
        .collect()
}
