/// Two constant controllers blended with equal weights.
///
/// Controller A always answers 2.0, controller B always answers 4.0, there is
/// no noise, so every blended action must be exactly 3.0 and the perturbation
/// log must hold one zero entry per call.

use std::rc::Rc;

use crate::aggregator::{Aggregator, AggregatorConfig};
use crate::controllers::{share, ConstantController, Controller, MpcController};
use crate::dynamics::{Dynamics, LinearDynamics};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::scenarios::{check, finish};

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "constant_blend",
    run,
});

const STEPS: usize = 20;

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let dynamics: Rc<dyn Dynamics> = Rc::new(LinearDynamics::double_integrator(0.1));
    let controller_a = share(ConstantController::new(vec![2.0], 2, 10)?);
    let controller_b = share(ConstantController::new(vec![4.0], 2, 10)?);

    let mut aggregator = Aggregator::new(dynamics, vec![controller_a, controller_b], vec![0.5, 0.5], AggregatorConfig::default())?;
    logln!(logger, LogEvent::Scenario, "{}", aggregator.controller_string());

    let mut actions = Vec::with_capacity(STEPS);
    for k in 0..STEPS {
        // state is irrelevant to constant controllers
        let state = [k as f64, -(k as f64)];
        actions.push(aggregator.eval(&state, k as f64 * 0.1)?);
    }

    let mut errors: Vec<String> = Vec::new();

    let all_three = actions.iter().all(|a| a == &vec![3.0]);
    check(logger, &mut errors, all_three, format!("Every blended action equals 3.0 over {} calls", STEPS));

    let log = aggregator.perturbation_log();
    check(logger, &mut errors, log.len() == STEPS,
        format!("Perturbation log holds one entry per call: {} == {}", log.len(), STEPS));
    check(logger, &mut errors, log.iter().all(|p| p == &vec![0.0]),
        "Every logged perturbation is zero".to_string());

    let prediction = aggregator.control_prediction();
    let plan_is_three = (0..prediction.cols()).all(|k| prediction.column(k) == vec![3.0]);
    check(logger, &mut errors, plan_is_three, "Aggregated prediction equals 3.0 at every step".to_string());

    finish(scenario_name, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_passes() {
        let mut logger = Logger::new();
        assert!(run("constant_blend", &mut logger).is_ok());
    }
}
