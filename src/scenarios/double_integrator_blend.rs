/// A gradient MPC and a saturated state feedback blended on a double integrator.
///
/// The cart starts one unit away from the origin at rest. Three runs are made:
///
/// - Variant A: MPC alone
///
/// - Variant B: state feedback alone
///
/// - Variant C: 60/40 blend of both with small Gaussian noise on the action
///
/// The blend is expected to bring the cart close to the origin, and its
/// perturbation log must hold exactly one entry per simulation step.

use std::rc::Rc;

use crate::aggregator::{Aggregator, AggregatorConfig};
use crate::controllers::{share, GradientMpcController, GradientMpcParams, MpcController, SharedController, StateFeedbackController};
use crate::dynamics::{Dynamics, LinearDynamics};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::scenarios::{check, finish};
use crate::simulation::SimulationRun;
use crate::utils;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "double_integrator_blend",
    run,
});

pub const DT: f64 = 0.1;
pub const STEPS: usize = 100;
pub const INITIAL_STATE: [f64; 2] = [1.0, 0.0];
const HORIZON: usize = 10;
const NOISE_VAR: f64 = 0.05;

pub fn double_integrator() -> Rc<LinearDynamics> {
    Rc::new(LinearDynamics::double_integrator(DT))
}

pub fn mpc_controller(dynamics: Rc<LinearDynamics>) -> Result<SharedController, Box<dyn std::error::Error>> {
    let params = GradientMpcParams {
        horizon: HORIZON,
        ..GradientMpcParams::default()
    };
    Ok(share(GradientMpcController::new(dynamics, vec![0.0, 0.0], params)?))
}

pub fn feedback_controller(dynamics: Rc<dyn Dynamics>) -> Result<SharedController, Box<dyn std::error::Error>> {
    Ok(share(StateFeedbackController::new(dynamics, vec![vec![4.0, 3.0]], vec![0.0, 0.0], 2.0, HORIZON)?))
}

/// The blended controller of variant C, noise drawn from the scenario seed
pub fn blended_controller(dynamics: Rc<LinearDynamics>) -> Result<Aggregator, Box<dyn std::error::Error>> {
    let mpc = mpc_controller(dynamics.clone())?;
    let feedback = feedback_controller(dynamics.clone())?;
    let config = AggregatorConfig::with_noise(NOISE_VAR);
    let aggregator = Aggregator::with_rng(dynamics, vec![mpc, feedback], vec![0.6, 0.4], config, utils::seeded_rng(0))?;
    Ok(aggregator)
}

/// Simulate a shared controller from the initial state
pub fn simulate(dynamics: &dyn Dynamics, controller: &SharedController, logger: &mut Logger) -> Result<SimulationRun, Box<dyn std::error::Error>> {
    let mut controller = controller.borrow_mut();
    Ok(SimulationRun::run(dynamics, &mut *controller, &INITIAL_STATE, DT, STEPS, logger)?)
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let dynamics = double_integrator();

    logln!(logger, LogEvent::Scenario, "Running MPC alone");
    let mpc = mpc_controller(dynamics.clone())?;
    let run_a = simulate(&*dynamics, &mpc, logger)?;
    run_a.printout("MPC", logger);

    logln!(logger, LogEvent::Scenario, "Running state feedback alone");
    let feedback = feedback_controller(dynamics.clone())?;
    let run_b = simulate(&*dynamics, &feedback, logger)?;
    run_b.printout("Feedback", logger);

    logln!(logger, LogEvent::Scenario, "Running blend");
    let mut aggregator = blended_controller(dynamics.clone())?;
    let run_c = SimulationRun::run(&*dynamics, &mut aggregator, &INITIAL_STATE, DT, STEPS, logger)?;
    run_c.printout("Blend", logger);

    let stat_c = run_c.stat();
    logln!(logger, LogEvent::Scenario, "");

    let mut errors: Vec<String> = Vec::new();

    check(logger, &mut errors, stat_c.final_state_norm < 0.25 * stat_c.initial_state_norm,
        format!("Blend ends close to the origin: |xN| = {:.4} < {:.4}", stat_c.final_state_norm, 0.25 * stat_c.initial_state_norm));

    let log = aggregator.perturbation_log();
    check(logger, &mut errors, log.len() == STEPS && log.total_recorded() == STEPS,
        format!("Perturbation log holds one entry per step: {} == {}", log.len(), STEPS));

    // nominal part of each action is the recorded action minus its perturbation
    let nominal_bounded = run_c.actions.iter().zip(log.iter()).all(|(u, p)| (u[0] - p[0]).abs() <= 2.0 + 1e-9);
    check(logger, &mut errors, nominal_bounded,
        "Nominal blended action stays within the sub-controllers' bounds".to_string());

    check(logger, &mut errors, aggregator.control_prediction().shape() == (1, HORIZON),
        format!("Aggregated prediction has shape 1x{}", HORIZON));

    finish(scenario_name, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::Controller;

    #[test]
    fn test_scenario_passes() {
        let mut logger = Logger::new();
        assert!(run("double_integrator_blend", &mut logger).is_ok());
    }

    #[test]
    fn test_blend_uses_both_controllers() {
        let dynamics = double_integrator();
        let aggregator = blended_controller(dynamics).unwrap();
        assert_eq!(aggregator.weights(), &[0.6, 0.4]);
        assert_eq!(aggregator.controllers().len(), 2);
        assert_eq!(aggregator.nx(), 2);
        assert_eq!(aggregator.nu(), 1);
    }
}
