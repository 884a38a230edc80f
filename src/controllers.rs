use std::cell::RefCell;
use std::rc::Rc;

use crate::dynamics::{Dynamics, LinearDynamics};
use crate::error::{ControlError, ControlResult};
use crate::types::{mat_vec, ControlSequence};

/// Trait for anything that maps a state and a time to a control action
pub trait Controller {
    /// Compute the control action for the current state
    ///
    /// # Arguments
    /// * `state` - Current system state, length `nx()`
    /// * `time` - Current control time, units chosen by the caller
    ///
    /// # Returns
    /// The action to apply, length `nu()`
    fn eval(&mut self, state: &[f64], time: f64) -> ControlResult<Vec<f64>>;

    /// State dimension
    fn nx(&self) -> usize;

    /// Control dimension
    fn nu(&self) -> usize;

    /// Get a string representation of the controller
    fn controller_string(&self) -> String;
}

/// Controller that plans over a finite horizon and exposes its plan
pub trait MpcController: Controller {
    /// Control sequence planned by the most recent `eval`, shape (nu, horizon)
    fn control_prediction(&self) -> ControlSequence;

    /// Number of steps planned ahead
    fn horizon(&self) -> usize;
}

/// Controllers are shared between owners (an aggregator does not copy them)
pub type SharedController = Rc<RefCell<dyn MpcController>>;

/// Wrap a controller into a shared handle
pub fn share<C: MpcController + 'static>(controller: C) -> SharedController {
    Rc::new(RefCell::new(controller))
}

fn check_state(context: &str, expected: usize, state: &[f64]) -> ControlResult<()> {
    if state.len() != expected {
        return Err(ControlError::length(context, expected, state.len()));
    }
    Ok(())
}

/// Controller that always returns the same action
pub struct ConstantController {
    pub action: Vec<f64>,
    nx: usize,
    horizon: usize,
}

impl ConstantController {
    pub fn new(action: Vec<f64>, nx: usize, horizon: usize) -> ControlResult<Self> {
        if action.is_empty() {
            return Err(ControlError::InvalidInput("constant action must not be empty".to_string()));
        }
        Ok(Self { action, nx, horizon })
    }
}

impl Controller for ConstantController {
    fn eval(&mut self, state: &[f64], _time: f64) -> ControlResult<Vec<f64>> {
        check_state("constant controller state", self.nx, state)?;
        Ok(self.action.clone())
    }

    fn nx(&self) -> usize {
        self.nx
    }

    fn nu(&self) -> usize {
        self.action.len()
    }

    fn controller_string(&self) -> String {
        format!("Constant: {:?}", self.action)
    }
}

impl MpcController for ConstantController {
    fn control_prediction(&self) -> ControlSequence {
        ControlSequence::repeated(&self.action, self.horizon)
    }

    fn horizon(&self) -> usize {
        self.horizon
    }
}

/// Saturated linear state feedback u = clamp(-K (x - r))
/// The prediction rolls the dynamics forward under the same law
pub struct StateFeedbackController {
    dynamics: Rc<dyn Dynamics>,
    gain: Vec<Vec<f64>>,  // nu x nx
    reference: Vec<f64>,
    max_action: f64,      // symmetric bound on every action component
    horizon: usize,
    prediction: ControlSequence,
}

impl StateFeedbackController {
    pub fn new(dynamics: Rc<dyn Dynamics>, gain: Vec<Vec<f64>>, reference: Vec<f64>, max_action: f64, horizon: usize) -> ControlResult<Self> {
        let nx = dynamics.nx();
        let nu = dynamics.nu();
        if gain.len() != nu || gain.iter().any(|row| row.len() != nx) {
            return Err(ControlError::InvalidInput(format!("feedback gain must be {}x{}", nu, nx)));
        }
        if reference.len() != nx {
            return Err(ControlError::InvalidInput(format!("reference must have length {}, got {}", nx, reference.len())));
        }
        if !(max_action > 0.0) {
            return Err(ControlError::InvalidInput(format!("max_action must be positive, got {}", max_action)));
        }
        Ok(Self {
            dynamics,
            gain,
            reference,
            max_action,
            horizon,
            prediction: ControlSequence::zeros(nu, horizon),
        })
    }

    fn feedback(&self, state: &[f64]) -> Vec<f64> {
        let error: Vec<f64> = state.iter().zip(&self.reference).map(|(x, r)| x - r).collect();
        mat_vec(&self.gain, &error)
            .into_iter()
            .map(|u| (-u).clamp(-self.max_action, self.max_action))
            .collect()
    }
}

impl Controller for StateFeedbackController {
    fn eval(&mut self, state: &[f64], _time: f64) -> ControlResult<Vec<f64>> {
        check_state("state feedback state", self.dynamics.nx(), state)?;

        let action = self.feedback(state);

        // Roll forward to fill the plan
        let mut prediction = ControlSequence::zeros(self.dynamics.nu(), self.horizon);
        let mut x = state.to_vec();
        for k in 0..self.horizon {
            let u = self.feedback(&x);
            prediction.set_column(k, &u);
            x = self.dynamics.step(&x, &u)?;
        }
        self.prediction = prediction;

        Ok(action)
    }

    fn nx(&self) -> usize {
        self.dynamics.nx()
    }

    fn nu(&self) -> usize {
        self.dynamics.nu()
    }

    fn controller_string(&self) -> String {
        format!("State feedback: K={:?}, max={:.2}", self.gain, self.max_action)
    }
}

impl MpcController for StateFeedbackController {
    fn control_prediction(&self) -> ControlSequence {
        self.prediction.clone()
    }

    fn horizon(&self) -> usize {
        self.horizon
    }
}

/// Tuning for the gradient descent planner
#[derive(Debug, Clone)]
pub struct GradientMpcParams {
    pub horizon: usize,
    pub iterations: usize,
    pub learning_rate: f64,
    pub regularization: f64,  // weight of the action effort term
    pub action_clip: f64,     // symmetric bound on every planned action
}

impl Default for GradientMpcParams {
    fn default() -> Self {
        Self {
            horizon: 10,
            iterations: 40,
            learning_rate: 0.1,
            regularization: 0.1,
            action_clip: 2.0,
        }
    }
}

/// Finite horizon MPC over a linear model
///
/// Minimizes sum ||x_k - target||^2 + lambda * sum ||u_k||^2 over the action
/// sequence with projected gradient descent. Gradients come from an adjoint
/// pass through the linear model. Each call warm starts from the previous plan
/// shifted by one step.
pub struct GradientMpcController {
    dynamics: Rc<LinearDynamics>,
    target: Vec<f64>,
    params: GradientMpcParams,
    plan: ControlSequence,
}

impl GradientMpcController {
    pub fn new(dynamics: Rc<LinearDynamics>, target: Vec<f64>, params: GradientMpcParams) -> ControlResult<Self> {
        if target.len() != dynamics.nx() {
            return Err(ControlError::InvalidInput(format!("target must have length {}, got {}", dynamics.nx(), target.len())));
        }
        if params.horizon == 0 {
            return Err(ControlError::InvalidInput("horizon must be at least 1".to_string()));
        }
        if !(params.learning_rate > 0.0) || !(params.action_clip > 0.0) || params.regularization < 0.0 {
            return Err(ControlError::InvalidInput(format!("invalid planner tuning: {:?}", params)));
        }
        let plan = ControlSequence::zeros(dynamics.nu(), params.horizon);
        Ok(Self { dynamics, target, params, plan })
    }

    /// Simulate the plan from `state`, returning x_0..x_N
    fn rollout(&self, state: &[f64], plan: &ControlSequence) -> ControlResult<Vec<Vec<f64>>> {
        let mut states = Vec::with_capacity(plan.cols() + 1);
        states.push(state.to_vec());
        for k in 0..plan.cols() {
            let next = self.dynamics.step(&states[k], &plan.column(k))?;
            states.push(next);
        }
        Ok(states)
    }

    /// Plan cost, mostly useful for inspecting convergence
    pub fn cost(&self, state: &[f64], plan: &ControlSequence) -> ControlResult<f64> {
        let states = self.rollout(state, plan)?;
        let tracking: f64 = states[1..]
            .iter()
            .map(|x| x.iter().zip(&self.target).map(|(a, b)| (a - b) * (a - b)).sum::<f64>())
            .sum();
        let effort: f64 = (0..plan.cols())
            .map(|k| plan.column(k).iter().map(|u| u * u).sum::<f64>())
            .sum();
        Ok(tracking + self.params.regularization * effort)
    }

    fn gradient_step(&self, state: &[f64], plan: &mut ControlSequence) -> ControlResult<()> {
        let states = self.rollout(state, plan)?;
        let horizon = plan.cols();
        let lambda = self.params.regularization;
        let lr = self.params.learning_rate;
        let clip = self.params.action_clip;

        // Adjoint p_{k+1} = dJ/dx_{k+1}, propagated backwards
        let mut adjoint: Vec<f64> = states[horizon].iter().zip(&self.target).map(|(x, t)| 2.0 * (x - t)).collect();
        for k in (0..horizon).rev() {
            let bt_p = self.dynamics.b_transpose_times(&adjoint);
            let u = plan.column(k);
            let updated: Vec<f64> = u
                .iter()
                .zip(&bt_p)
                .map(|(u, g)| (u - lr * (g + 2.0 * lambda * u)).clamp(-clip, clip))
                .collect();

            let at_p = self.dynamics.a_transpose_times(&adjoint);
            adjoint = states[k].iter().zip(&self.target).zip(&at_p).map(|((x, t), ap)| 2.0 * (x - t) + ap).collect();

            plan.set_column(k, &updated);
        }
        Ok(())
    }
}

impl Controller for GradientMpcController {
    fn eval(&mut self, state: &[f64], _time: f64) -> ControlResult<Vec<f64>> {
        check_state("gradient mpc state", self.dynamics.nx(), state)?;

        let mut plan = self.plan.shifted();
        for _ in 0..self.params.iterations {
            self.gradient_step(state, &mut plan)?;
        }
        let action = plan.column(0);
        self.plan = plan;
        Ok(action)
    }

    fn nx(&self) -> usize {
        self.dynamics.nx()
    }

    fn nu(&self) -> usize {
        self.dynamics.nu()
    }

    fn controller_string(&self) -> String {
        format!("Gradient MPC: N={}, iters={}, lr={:.3}", self.params.horizon, self.params.iterations, self.params.learning_rate)
    }
}

impl MpcController for GradientMpcController {
    fn control_prediction(&self) -> ControlSequence {
        self.plan.clone()
    }

    fn horizon(&self) -> usize {
        self.params.horizon
    }
}
