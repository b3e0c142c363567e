//! Per-generation score statistics.

use std::fmt;

use serde::Serialize;

use super::Genome;

/// Aggregate statistics over one generation. Raw entries hold one value per
/// score component.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub raw_max: Vec<f64>,
    pub raw_min: Vec<f64>,
    pub raw_ave: Vec<f64>,
    pub raw_dev: Vec<f64>,
    pub raw_var: Vec<f64>,
    pub raw_med: Vec<f64>,
    pub fit_max: f64,
    pub fit_min: f64,
    pub fit_ave: f64,
}

/// Statistics of a single raw score component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentStats {
    pub max: f64,
    pub min: f64,
    pub ave: f64,
    pub dev: f64,
    pub var: f64,
    pub med: f64,
}

/// Human-readable description of each statistic.
pub const DESCRIPTIONS: [(&str, &str); 9] = [
    ("raw_max", "Maximum raw score for each evaluator"),
    ("raw_min", "Minimum raw score for each evaluator"),
    ("raw_ave", "Average of raw scores for each evaluator"),
    ("raw_dev", "Standard deviation of raw scores for each evaluator"),
    ("raw_var", "Raw scores variance for each evaluator"),
    ("raw_med", "Median of raw scores for each evaluator"),
    ("fit_max", "Maximum fitness"),
    ("fit_min", "Minimum fitness"),
    ("fit_ave", "Fitness average"),
];

impl Statistics {
    /// Compute statistics over the scored genomes.
    pub fn from_genomes<G: Genome>(genomes: &[G]) -> Self {
        let mut stats = Self::default();
        if genomes.is_empty() {
            return stats;
        }

        let components = genomes.iter().map(|g| g.score().len()).max().unwrap_or(0);
        for i in 0..components {
            let mut values: Vec<f64> = genomes.iter().filter_map(|g| g.score().get(i).copied()).collect();
            let n = values.len() as f64;
            let ave = values.iter().sum::<f64>() / n;
            let var = if values.len() > 1 {
                values.iter().map(|v| (v - ave).powi(2)).sum::<f64>() / (n - 1.0)
            } else {
                0.0
            };
            values.sort_by(f64::total_cmp);
            let mid = values.len() / 2;
            let med = if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            };

            stats.raw_max.push(values[values.len() - 1]);
            stats.raw_min.push(values[0]);
            stats.raw_ave.push(ave);
            stats.raw_var.push(var);
            stats.raw_dev.push(var.sqrt());
            stats.raw_med.push(med);
        }

        let fitness = genomes.iter().map(|g| g.fitness());
        stats.fit_max = fitness.clone().fold(f64::NEG_INFINITY, f64::max);
        stats.fit_min = fitness.clone().fold(f64::INFINITY, f64::min);
        stats.fit_ave = fitness.sum::<f64>() / genomes.len() as f64;
        stats
    }

    /// Reset every statistic.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Statistics of one raw score component.
    pub fn raw_component(&self, index: usize) -> Option<ComponentStats> {
        Some(ComponentStats {
            max: *self.raw_max.get(index)?,
            min: *self.raw_min.get(index)?,
            ave: *self.raw_ave.get(index)?,
            dev: *self.raw_dev.get(index)?,
            var: *self.raw_var.get(index)?,
            med: *self.raw_med.get(index)?,
        })
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |values: &[f64]| {
            let parts: Vec<String> = values.iter().map(|v| format!("{v:.2}")).collect();
            format!("[{}]", parts.join(", "))
        };
        let rendered = [
            list(&self.raw_max),
            list(&self.raw_min),
            list(&self.raw_ave),
            list(&self.raw_dev),
            list(&self.raw_var),
            list(&self.raw_med),
            format!("{:.2}", self.fit_max),
            format!("{:.2}", self.fit_min),
            format!("{:.2}", self.fit_ave),
        ];
        writeln!(f, "- Statistics")?;
        for ((_, description), value) in DESCRIPTIONS.iter().zip(rendered) {
            writeln!(f, "\t{description:<55} = {value}")?;
        }
        Ok(())
    }
}
