/// Closed loop simulation: one controller driving one dynamical system.
///
/// Each step evaluates the controller at time k*dt, applies the action to the
/// dynamics and records the trajectory. The run is summarized by `SimulationStat`.

use std::sync::atomic::Ordering;

use crate::controllers::Controller;
use crate::dynamics::Dynamics;
use crate::error::{ControlError, ControlResult};
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::types::norm;
use crate::utils::TOTAL_SIMULATION_RUNS;

/// Recorded trajectory of one run
/// `states` has one more entry than `actions` (the final state)
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    pub actions: Vec<Vec<f64>>,
}

/// Summary statistics of a run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationStat {
    pub steps: usize,
    pub initial_state_norm: f64,
    pub final_state_norm: f64,
    /// Mean over steps of ||x_k||^2, k = 1..=steps
    pub mean_squared_error: f64,
    /// Mean over steps of the mean absolute action component
    pub mean_abs_action: f64,
}

impl SimulationRun {
    /// Run `controller` on `dynamics` for `steps` steps from `initial_state`
    ///
    /// # Arguments
    /// * `dynamics` - System to drive
    /// * `controller` - Controller evaluated once per step
    /// * `initial_state` - Starting state, length nx
    /// * `dt` - Time between steps, used for the time passed to the controller
    /// * `steps` - Number of steps
    /// * `logger` - Receives each step at `LogEvent::Step`
    pub fn run<C: Controller + ?Sized>(
        dynamics: &dyn Dynamics,
        controller: &mut C,
        initial_state: &[f64],
        dt: f64,
        steps: usize,
        logger: &mut Logger,
    ) -> ControlResult<Self> {
        if initial_state.len() != dynamics.nx() {
            return Err(ControlError::length("initial state", dynamics.nx(), initial_state.len()));
        }
        if controller.nx() != dynamics.nx() || controller.nu() != dynamics.nu() {
            return Err(ControlError::InvalidInput(format!(
                "controller has nx={}, nu={} but dynamics has nx={}, nu={}",
                controller.nx(),
                controller.nu(),
                dynamics.nx(),
                dynamics.nu()
            )));
        }

        let mut times = Vec::with_capacity(steps);
        let mut states = Vec::with_capacity(steps + 1);
        let mut actions = Vec::with_capacity(steps);
        states.push(initial_state.to_vec());

        for k in 0..steps {
            let time = k as f64 * dt;
            let state = &states[k];
            let action = controller.eval(state, time)?;
            let next = dynamics.step(state, &action)?;
            logln!(logger, LogEvent::Step, "t={:.3} x={:?} u={:?}", time, state, action);

            times.push(time);
            actions.push(action);
            states.push(next);
        }

        TOTAL_SIMULATION_RUNS.fetch_add(1, Ordering::Relaxed);
        Ok(Self { times, states, actions })
    }

    pub fn final_state(&self) -> &[f64] {
        // states always holds the initial state
        &self.states[self.states.len() - 1]
    }

    pub fn stat(&self) -> SimulationStat {
        let steps = self.actions.len();
        let mean_squared_error = if steps == 0 {
            0.0
        } else {
            self.states[1..].iter().map(|x| x.iter().map(|v| v * v).sum::<f64>()).sum::<f64>() / steps as f64
        };
        let mean_abs_action = if steps == 0 {
            0.0
        } else {
            self.actions
                .iter()
                .map(|u| u.iter().map(|v| v.abs()).sum::<f64>() / u.len().max(1) as f64)
                .sum::<f64>()
                / steps as f64
        };
        SimulationStat {
            steps,
            initial_state_norm: norm(&self.states[0]),
            final_state_norm: norm(self.final_state()),
            mean_squared_error,
            mean_abs_action,
        }
    }

    /// Log the run summary at `LogEvent::Simulation`
    pub fn printout(&self, name: &str, logger: &mut Logger) {
        let stat = self.stat();
        logln!(logger, LogEvent::Simulation, "{}: {} steps, |x0|={:.4}, |xN|={:.4}, mse={:.4}, mean|u|={:.4}",
            name, stat.steps, stat.initial_state_norm, stat.final_state_norm, stat.mean_squared_error, stat.mean_abs_action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{ConstantController, StateFeedbackController};
    use crate::dynamics::LinearDynamics;
    use std::rc::Rc;

    #[test]
    fn test_constant_push() {
        let dynamics = LinearDynamics::double_integrator(0.1);
        let mut controller = ConstantController::new(vec![1.0], 2, 3).unwrap();
        let mut logger = Logger::new();

        let run = SimulationRun::run(&dynamics, &mut controller, &[0.0, 0.0], 0.1, 10, &mut logger).unwrap();
        assert_eq!(run.states.len(), 11);
        assert_eq!(run.actions.len(), 10);
        assert!((run.times[9] - 0.9).abs() < 1e-12);
        // constant unit force for 1s: v = 1, x = 0.5
        assert!((run.final_state()[1] - 1.0).abs() < 1e-9);
        assert!((run.final_state()[0] - 0.5).abs() < 1e-9);
        assert_eq!(run.stat().mean_abs_action, 1.0);
    }

    #[test]
    fn test_feedback_regulates() {
        let dynamics: Rc<dyn Dynamics> = Rc::new(LinearDynamics::double_integrator(0.1));
        let mut controller = StateFeedbackController::new(dynamics.clone(), vec![vec![4.0, 3.0]], vec![0.0, 0.0], 5.0, 5).unwrap();
        let mut logger = Logger::new();

        let run = SimulationRun::run(&*dynamics, &mut controller, &[1.0, 0.0], 0.1, 100, &mut logger).unwrap();
        let stat = run.stat();
        assert!(stat.final_state_norm < 0.05 * stat.initial_state_norm, "{:?}", stat);
    }

    #[test]
    fn test_rejects_wrong_initial_state() {
        let dynamics = LinearDynamics::double_integrator(0.1);
        let mut controller = ConstantController::new(vec![1.0], 2, 3).unwrap();
        let mut logger = Logger::new();
        assert!(SimulationRun::run(&dynamics, &mut controller, &[0.0], 0.1, 10, &mut logger).is_err());
    }
}
