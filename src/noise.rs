/// Gaussian perturbation of blended actions and the log of drawn perturbations.

use std::collections::VecDeque;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{ControlError, ControlResult};

/// How `noise_var` turns into the multiplier applied to a standard normal sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseScaling {
    /// sample * noise_var, the injected variance is noise_var^2
    #[default]
    VarianceAsScale,
    /// sample * sqrt(noise_var), the injected variance is noise_var
    StandardDeviation,
}

impl NoiseScaling {
    /// Standard deviation of the injected noise for the given `noise_var`
    pub fn std_dev(&self, noise_var: f64) -> f64 {
        match self {
            NoiseScaling::VarianceAsScale => noise_var,
            NoiseScaling::StandardDeviation => noise_var.sqrt(),
        }
    }
}

/// Draws independent zero mean Gaussian perturbations
#[derive(Debug, Clone)]
pub struct GaussianPerturbation {
    std_dev: f64,
    dist: Normal<f64>,
}

impl GaussianPerturbation {
    pub fn new(noise_var: f64, scaling: NoiseScaling) -> ControlResult<Self> {
        if !noise_var.is_finite() || noise_var < 0.0 {
            return Err(ControlError::InvalidInput(format!("noise_var must be finite and non-negative, got {}", noise_var)));
        }
        let std_dev = scaling.std_dev(noise_var);
        let dist = Normal::new(0.0, std_dev)
            .map_err(|e| ControlError::InvalidInput(format!("cannot build noise distribution: {}", e)))?;
        Ok(Self { std_dev, dist })
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    /// Draw `m` independent components; a zero standard deviation yields the zero vector without touching `rng`
    pub fn sample<R: Rng + ?Sized>(&self, m: usize, rng: &mut R) -> Vec<f64> {
        if self.std_dev == 0.0 {
            return vec![0.0; m];
        }
        (0..m).map(|_| Distribution::sample(&self.dist, rng)).collect()
    }
}

/// What the perturbation log keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerturbationLogPolicy {
    /// Keep every perturbation for the lifetime of the log
    #[default]
    Unbounded,
    /// Keep only the most recent `capacity` perturbations
    Bounded { capacity: usize },
    /// Keep nothing, only count
    Disabled,
}

/// Append-only record of drawn perturbations
#[derive(Debug, Clone, Default)]
pub struct PerturbationLog {
    policy: PerturbationLogPolicy,
    entries: VecDeque<Vec<f64>>,
    total_recorded: usize,
}

impl PerturbationLog {
    pub fn new(policy: PerturbationLogPolicy) -> Self {
        Self {
            policy,
            entries: VecDeque::new(),
            total_recorded: 0,
        }
    }

    pub fn record(&mut self, perturbation: Vec<f64>) {
        self.total_recorded += 1;
        match self.policy {
            PerturbationLogPolicy::Unbounded => self.entries.push_back(perturbation),
            PerturbationLogPolicy::Bounded { capacity } => {
                if capacity == 0 {
                    return;
                }
                if self.entries.len() == capacity {
                    self.entries.pop_front();
                }
                self.entries.push_back(perturbation);
            }
            PerturbationLogPolicy::Disabled => {}
        }
    }

    pub fn policy(&self) -> PerturbationLogPolicy {
        self.policy
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of perturbations ever recorded, retained or not
    pub fn total_recorded(&self) -> usize {
        self.total_recorded
    }

    /// Retained entry `k`, oldest first
    /// With the unbounded policy entry k is the perturbation of call k+1
    pub fn get(&self, k: usize) -> Option<&Vec<f64>> {
        self.entries.get(k)
    }

    pub fn latest(&self) -> Option<&Vec<f64>> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<f64>> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_zero_noise_is_zero_vector() {
        let perturbation = GaussianPerturbation::new(0.0, NoiseScaling::VarianceAsScale).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(perturbation.sample(3, &mut rng), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_negative_noise_rejected() {
        assert!(GaussianPerturbation::new(-0.1, NoiseScaling::VarianceAsScale).is_err());
        assert!(GaussianPerturbation::new(f64::NAN, NoiseScaling::StandardDeviation).is_err());
    }

    #[test]
    fn test_scaling_modes() {
        assert_eq!(NoiseScaling::VarianceAsScale.std_dev(0.25), 0.25);
        assert_eq!(NoiseScaling::StandardDeviation.std_dev(0.25), 0.5);
    }

    #[test]
    fn test_empirical_variance_follows_scaling() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples_needed = 20000;
        for (scaling, expected_variance) in [(NoiseScaling::VarianceAsScale, 0.25), (NoiseScaling::StandardDeviation, 0.5)] {
            let perturbation = GaussianPerturbation::new(0.5, scaling).unwrap();
            let samples = perturbation.sample(samples_needed, &mut rng);
            let mean = samples.iter().sum::<f64>() / samples_needed as f64;
            let variance = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / samples_needed as f64;
            assert!((variance - expected_variance).abs() < 0.05 * expected_variance + 0.01,
                "{:?}: variance {} vs {}", scaling, variance, expected_variance);
        }
    }

    #[test]
    fn test_bounded_log_keeps_most_recent() {
        let mut log = PerturbationLog::new(PerturbationLogPolicy::Bounded { capacity: 2 });
        log.record(vec![1.0]);
        log.record(vec![2.0]);
        log.record(vec![3.0]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.total_recorded(), 3);
        assert_eq!(log.get(0), Some(&vec![2.0]));
        assert_eq!(log.latest(), Some(&vec![3.0]));
    }

    #[test]
    fn test_disabled_log_only_counts() {
        let mut log = PerturbationLog::new(PerturbationLogPolicy::Disabled);
        log.record(vec![1.0]);
        assert!(log.is_empty());
        assert_eq!(log.total_recorded(), 1);
    }
}
