//! Rate-parameter objects carried by tree genomes.

use std::fmt;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// A self-mutating set of rate parameters.
pub trait RateModel: fmt::Debug + Send + Sync {
    /// Perturb the parameters in place.
    fn mutate(&mut self, rng: &mut StdRng);

    fn clone_box(&self) -> Box<dyn RateModel>;

    /// Whether every parameter is finite and inside its bounds.
    fn is_valid(&self) -> bool;

    /// Current parameter values.
    fn values(&self) -> Vec<f64>;
}

impl Clone for Box<dyn RateModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Bounds shared by every rate.
pub const RATE_BOUNDS: (f64, f64) = (1e-6, 10.0);

/// Log-normal step: `value * exp(sigma * z)`, clamped to [`RATE_BOUNDS`].
fn lognormal_step(rng: &mut StdRng, value: f64, sigma: f64) -> f64 {
    let noise: f64 = rng.sample(rand_distr::StandardNormal);
    (value * (sigma * noise).exp()).clamp(RATE_BOUNDS.0, RATE_BOUNDS.1)
}

fn in_bounds(value: f64) -> bool {
    value.is_finite() && (RATE_BOUNDS.0..=RATE_BOUNDS.1).contains(&value)
}

/// Duplication, transfer and loss rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtlRates {
    pub duplication: f64,
    pub transfer: f64,
    pub loss: f64,
    /// Standard deviation of the log-normal mutation step.
    pub sigma: f64,
}

impl DtlRates {
    pub fn new(duplication: f64, transfer: f64, loss: f64, sigma: f64) -> Self {
        Self {
            duplication: duplication.clamp(RATE_BOUNDS.0, RATE_BOUNDS.1),
            transfer: transfer.clamp(RATE_BOUNDS.0, RATE_BOUNDS.1),
            loss: loss.clamp(RATE_BOUNDS.0, RATE_BOUNDS.1),
            sigma,
        }
    }
}

impl RateModel for DtlRates {
    fn mutate(&mut self, rng: &mut StdRng) {
        let sigma = self.sigma;
        let target = match rng.gen_range(0..3) {
            0 => &mut self.duplication,
            1 => &mut self.transfer,
            _ => &mut self.loss,
        };
        *target = lognormal_step(rng, *target, sigma);
    }

    fn clone_box(&self) -> Box<dyn RateModel> {
        Box::new(self.clone())
    }

    fn is_valid(&self) -> bool {
        [self.duplication, self.transfer, self.loss]
            .into_iter()
            .all(in_bounds)
    }

    fn values(&self) -> Vec<f64> {
        vec![self.duplication, self.transfer, self.loss]
    }
}

/// One substitution-rate multiplier per branch class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRates {
    pub rates: Vec<f64>,
    pub sigma: f64,
}

impl EdgeRates {
    /// `count` classes starting at `initial`.
    pub fn uniform(count: usize, initial: f64, sigma: f64) -> Self {
        Self {
            rates: vec![initial.clamp(RATE_BOUNDS.0, RATE_BOUNDS.1); count.max(1)],
            sigma,
        }
    }
}

impl RateModel for EdgeRates {
    fn mutate(&mut self, rng: &mut StdRng) {
        if self.rates.is_empty() {
            return;
        }
        let index = rng.gen_range(0..self.rates.len());
        self.rates[index] = lognormal_step(rng, self.rates[index], self.sigma);
    }

    fn clone_box(&self) -> Box<dyn RateModel> {
        Box::new(self.clone())
    }

    fn is_valid(&self) -> bool {
        !self.rates.is_empty() && self.rates.iter().copied().all(in_bounds)
    }

    fn values(&self) -> Vec<f64> {
        self.rates.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_clone_then_mutate_stays_valid() {
        let mut rng = StdRng::seed_from_u64(17);
        let originals: Vec<Box<dyn RateModel>> = vec![
            Box::new(DtlRates::new(0.1, 0.05, 0.1, 0.5)),
            Box::new(EdgeRates::uniform(4, 1.0, 0.5)),
        ];
        for original in &originals {
            let before = original.values();
            let mut copy = original.clone();
            for _ in 0..100 {
                copy.mutate(&mut rng);
                assert!(copy.is_valid());
            }
            assert_eq!(original.values(), before);
            assert_ne!(copy.values(), before);
        }
    }

    #[test]
    fn test_extreme_steps_are_clamped() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut rates = DtlRates::new(5.0, 5.0, 5.0, 50.0);
        for _ in 0..200 {
            rates.mutate(&mut rng);
        }
        assert!(rates.is_valid());
        assert!(rates.values().iter().all(|v| *v <= RATE_BOUNDS.1));
    }

    #[test]
    fn test_invalid_rates_are_detected() {
        let rates = EdgeRates {
            rates: vec![1.0, f64::NAN],
            sigma: 0.1,
        };
        assert!(!rates.is_valid());
        assert!(!EdgeRates { rates: vec![], sigma: 0.1 }.is_valid());
    }
}
