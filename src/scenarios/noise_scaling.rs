/// Empirical check of both noise scaling modes.
///
/// A single zero-action controller is aggregated with noise_var = 0.5. With the
/// default scaling the standard normal draw is multiplied by noise_var, so the
/// logged perturbations must show a variance of noise_var^2. With standard
/// deviation scaling the variance must be noise_var.

use std::rc::Rc;

use crate::aggregator::{Aggregator, AggregatorConfig};
use crate::controllers::{share, ConstantController, Controller};
use crate::dynamics::{Dynamics, LinearDynamics};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::noise::{NoiseScaling, PerturbationLogPolicy};
use crate::scenarios::{check, finish};
use crate::utils;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "noise_scaling",
    run,
});

const NOISE_VAR: f64 = 0.5;
const DRAWS: usize = 10000;
const TOLERANCE: f64 = 0.1;

/// Empirical variance of `DRAWS` perturbations under `scaling`
fn empirical_variance(scaling: NoiseScaling, salt: u64) -> Result<f64, Box<dyn std::error::Error>> {
    let dynamics: Rc<dyn Dynamics> = Rc::new(LinearDynamics::double_integrator(0.1));
    let zero = share(ConstantController::new(vec![0.0], 2, 1)?);
    let config = AggregatorConfig {
        noise_var: NOISE_VAR,
        noise_scaling: scaling,
        log_policy: PerturbationLogPolicy::Unbounded,
        seed: 0,
    };
    let mut aggregator = Aggregator::with_rng(dynamics, vec![zero], vec![1.0], config, utils::seeded_rng(salt))?;

    for _ in 0..DRAWS {
        aggregator.eval(&[0.0, 0.0], 0.0)?;
    }

    let samples: Vec<f64> = aggregator.perturbation_log().iter().map(|p| p[0]).collect();
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    Ok(samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / samples.len() as f64)
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut errors: Vec<String> = Vec::new();

    for (salt, scaling) in [NoiseScaling::VarianceAsScale, NoiseScaling::StandardDeviation].into_iter().enumerate() {
        let expected = scaling.std_dev(NOISE_VAR).powi(2);
        let variance = empirical_variance(scaling, salt as u64)?;
        logln!(logger, LogEvent::Scenario, "{:?}: empirical variance {:.4}, expected {:.4}", scaling, variance, expected);

        check(logger, &mut errors, (variance - expected).abs() < TOLERANCE * expected,
            format!("{:?} variance within {:.0}% of {:.4}: {:.4}", scaling, TOLERANCE * 100.0, expected, variance));
    }

    finish(scenario_name, errors)
}
