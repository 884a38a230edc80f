/// Weighted aggregation of several MPC controllers into one blended action.
///
/// Every call queries each sub-controller in list order for its immediate action
/// and its planned control sequence, sums both with the configured weights and
/// perturbs the blended action with Gaussian noise. The drawn perturbation is
/// appended to the aggregator's log.
///
/// Controllers are shared through `Rc<RefCell<..>>`, so an aggregator is neither
/// `Send` nor `Sync` and is driven from a single control loop.

use std::rc::Rc;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::controllers::{Controller, MpcController, SharedController};
use crate::dynamics::Dynamics;
use crate::error::{ControlError, ControlResult};
use crate::noise::{GaussianPerturbation, NoiseScaling, PerturbationLog, PerturbationLogPolicy};
use crate::types::{axpy, ControlSequence};

/// Tunables of an aggregator
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub noise_var: f64,
    pub noise_scaling: NoiseScaling,
    pub log_policy: PerturbationLogPolicy,
    /// Seed of the default random source, ignored by `Aggregator::with_rng`
    pub seed: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            noise_var: 0.0,
            noise_scaling: NoiseScaling::VarianceAsScale,
            log_policy: PerturbationLogPolicy::Unbounded,
            seed: 0,
        }
    }
}

impl AggregatorConfig {
    /// Default config with the given noise variance
    pub fn with_noise(noise_var: f64) -> Self {
        Self {
            noise_var,
            ..Self::default()
        }
    }
}

pub struct Aggregator<R: Rng = StdRng> {
    dynamics: Rc<dyn Dynamics>,
    controllers: Vec<SharedController>,
    weights: Vec<f64>,
    noise_var: f64,
    perturbation: GaussianPerturbation,
    n: usize,
    m: usize,
    horizon: usize,
    perturbation_log: PerturbationLog,
    aggregated_prediction: ControlSequence,
    rng: R,
}

impl Aggregator<StdRng> {
    /// Create an aggregator whose noise comes from a `StdRng` seeded with `config.seed`
    pub fn new(dynamics: Rc<dyn Dynamics>, controllers: Vec<SharedController>, weights: Vec<f64>, config: AggregatorConfig) -> ControlResult<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(dynamics, controllers, weights, config, rng)
    }
}

impl<R: Rng> Aggregator<R> {
    /// Create an aggregator drawing its noise from `rng`
    ///
    /// # Arguments
    /// * `dynamics` - Model the sub-controllers were built for, must agree with them on nx/nu
    /// * `controllers` - Non-empty list of sub-controllers, all sharing nx, nu and horizon
    /// * `weights` - One finite weight per controller, matched by position
    /// * `config` - Noise variance, scaling and log policy
    /// * `rng` - Random source for the perturbation
    pub fn with_rng(dynamics: Rc<dyn Dynamics>, controllers: Vec<SharedController>, weights: Vec<f64>, config: AggregatorConfig, rng: R) -> ControlResult<Self> {
        let first = controllers
            .first()
            .ok_or_else(|| ControlError::InvalidInput("controller list must not be empty".to_string()))?;
        if controllers.len() != weights.len() {
            return Err(ControlError::InvalidInput(format!(
                "got {} controllers but {} weights",
                controllers.len(),
                weights.len()
            )));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
            return Err(ControlError::InvalidInput(format!("weights must be finite, got {}", w)));
        }

        let (n, m, horizon) = {
            let first = first.borrow();
            (first.nx(), first.nu(), first.horizon())
        };
        for (i, controller) in controllers.iter().enumerate().skip(1) {
            let controller = controller.borrow();
            if (controller.nx(), controller.nu(), controller.horizon()) != (n, m, horizon) {
                return Err(ControlError::InvalidInput(format!(
                    "controller {} has nx={}, nu={}, horizon={} but controller 0 has nx={}, nu={}, horizon={}",
                    i,
                    controller.nx(),
                    controller.nu(),
                    controller.horizon(),
                    n,
                    m,
                    horizon
                )));
            }
        }
        if dynamics.nx() != n || dynamics.nu() != m {
            return Err(ControlError::InvalidInput(format!(
                "dynamics has nx={}, nu={} but controllers have nx={}, nu={}",
                dynamics.nx(),
                dynamics.nu(),
                n,
                m
            )));
        }

        let perturbation = GaussianPerturbation::new(config.noise_var, config.noise_scaling)?;

        Ok(Self {
            dynamics,
            controllers,
            weights,
            noise_var: config.noise_var,
            perturbation,
            n,
            m,
            horizon,
            perturbation_log: PerturbationLog::new(config.log_policy),
            aggregated_prediction: ControlSequence::zeros(m, horizon),
            rng,
        })
    }

    pub fn dynamics(&self) -> &Rc<dyn Dynamics> {
        &self.dynamics
    }

    pub fn controllers(&self) -> &[SharedController] {
        &self.controllers
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn noise_var(&self) -> f64 {
        self.noise_var
    }

    pub fn perturbation_log(&self) -> &PerturbationLog {
        &self.perturbation_log
    }

    /// Weighted sum of the sub-controllers' plans from the most recent call
    pub fn aggregated_prediction(&self) -> &ControlSequence {
        &self.aggregated_prediction
    }

    /// Weighted sums of the sub-controllers' actions and plans, without noise
    fn blend(&self, state: &[f64], time: f64) -> ControlResult<(Vec<f64>, ControlSequence)> {
        let mut u_nom = vec![0.0; self.m];
        let mut u_seq_agg = ControlSequence::zeros(self.m, self.horizon);

        for (i, (controller, &weight)) in self.controllers.iter().zip(&self.weights).enumerate() {
            let mut controller = controller.borrow_mut();

            let action = controller.eval(state, time)?;
            if action.len() != self.m {
                return Err(ControlError::length(&format!("action of controller {}", i), self.m, action.len()));
            }
            axpy(&mut u_nom, weight, &action);

            let prediction = controller.control_prediction();
            if prediction.shape() != (self.m, self.horizon) {
                return Err(ControlError::shape(&format!("prediction of controller {}", i), (self.m, self.horizon), prediction.shape()));
            }
            u_seq_agg.add_scaled(weight, &prediction)?;
        }

        Ok((u_nom, u_seq_agg))
    }
}

impl<R: Rng> Controller for Aggregator<R> {
    fn eval(&mut self, state: &[f64], time: f64) -> ControlResult<Vec<f64>> {
        if state.len() != self.n {
            return Err(ControlError::length("aggregator state", self.n, state.len()));
        }

        let (u_nom, u_seq_agg) = self.blend(state, time)?;
        self.aggregated_prediction = u_seq_agg;

        let u_pert = self.perturbation.sample(self.m, &mut self.rng);
        let action = u_nom.iter().zip(&u_pert).map(|(u, p)| u + p).collect();
        self.perturbation_log.record(u_pert);

        Ok(action)
    }

    fn nx(&self) -> usize {
        self.n
    }

    fn nu(&self) -> usize {
        self.m
    }

    fn controller_string(&self) -> String {
        let parts: Vec<String> = self
            .controllers
            .iter()
            .zip(&self.weights)
            .map(|(c, w)| format!("{:.3} x [{}]", w, c.borrow().controller_string()))
            .collect();
        format!("Aggregated (noise_var={:.4}): {}", self.noise_var, parts.join(" + "))
    }
}

impl<R: Rng> MpcController for Aggregator<R> {
    fn control_prediction(&self) -> ControlSequence {
        self.aggregated_prediction.clone()
    }

    fn horizon(&self) -> usize {
        self.horizon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{share, ConstantController, StateFeedbackController};
    use crate::dynamics::LinearDynamics;
    use crate::noise::NoiseScaling;

    const EPSILON: f64 = 1e-12;

    fn dynamics() -> Rc<dyn Dynamics> {
        Rc::new(LinearDynamics::double_integrator(0.1))
    }

    fn constant(action: f64) -> SharedController {
        share(ConstantController::new(vec![action], 2, 5).unwrap())
    }

    /// Controller whose outputs can be made malformed
    struct Misbehaving {
        action_len: usize,
        prediction_shape: (usize, usize),
        fail: bool,
    }

    impl Controller for Misbehaving {
        fn eval(&mut self, _state: &[f64], _time: f64) -> ControlResult<Vec<f64>> {
            if self.fail {
                return Err(ControlError::Controller("solver diverged".to_string()));
            }
            Ok(vec![1.0; self.action_len])
        }
        fn nx(&self) -> usize { 2 }
        fn nu(&self) -> usize { 1 }
        fn controller_string(&self) -> String { "Misbehaving".to_string() }
    }

    impl MpcController for Misbehaving {
        fn control_prediction(&self) -> ControlSequence {
            ControlSequence::zeros(self.prediction_shape.0, self.prediction_shape.1)
        }
        fn horizon(&self) -> usize { 5 }
    }

    #[test]
    fn test_two_controllers_equal_weights() {
        let mut aggregator = Aggregator::new(dynamics(), vec![constant(2.0), constant(4.0)], vec![0.5, 0.5], AggregatorConfig::default()).unwrap();
        assert_eq!(aggregator.nx(), 2);
        assert_eq!(aggregator.nu(), 1);
        assert_eq!(aggregator.eval(&[0.3, -1.0], 0.0).unwrap(), vec![3.0]);
        assert_eq!(aggregator.eval(&[10.0, 7.0], 4.2).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_single_controller_is_pass_through() {
        let mut aggregator = Aggregator::new(dynamics(), vec![constant(5.0)], vec![1.0], AggregatorConfig::default()).unwrap();
        for step in 0..5 {
            assert_eq!(aggregator.eval(&[0.0, 0.0], step as f64).unwrap(), vec![5.0]);
        }
        assert_eq!(aggregator.perturbation_log().len(), 5);
        assert!(aggregator.perturbation_log().iter().all(|p| p == &vec![0.0]));
    }

    #[test]
    fn test_weighted_sum_without_noise() {
        let weights = vec![0.2, 0.3, 0.5];
        let actions = [1.0, -2.0, 6.0];
        let controllers = actions.iter().map(|&a| constant(a)).collect();
        let mut aggregator = Aggregator::new(dynamics(), controllers, weights.clone(), AggregatorConfig::default()).unwrap();

        let expected: f64 = weights.iter().zip(&actions).map(|(w, a)| w * a).sum();
        let action = aggregator.eval(&[1.0, 1.0], 0.0).unwrap();
        assert!((action[0] - expected).abs() < EPSILON);
    }

    #[test]
    fn test_weights_need_not_sum_to_one() {
        let mut aggregator = Aggregator::new(dynamics(), vec![constant(1.0), constant(1.0)], vec![2.0, 3.0], AggregatorConfig::default()).unwrap();
        assert_eq!(aggregator.eval(&[0.0, 0.0], 0.0).unwrap(), vec![5.0]);
    }

    #[test]
    fn test_aggregated_prediction_is_weighted_sum() {
        let dynamics = dynamics();
        let feedback = share(StateFeedbackController::new(dynamics.clone(), vec![vec![1.0, 1.5]], vec![0.0, 0.0], 10.0, 5).unwrap());
        let mut aggregator = Aggregator::new(dynamics, vec![feedback.clone(), constant(1.0)], vec![0.25, 0.75], AggregatorConfig::default()).unwrap();

        aggregator.eval(&[1.0, 0.0], 0.0).unwrap();

        let feedback_plan = feedback.borrow().control_prediction();
        let aggregated = aggregator.aggregated_prediction();
        assert_eq!(aggregated.shape(), (1, 5));
        for k in 0..5 {
            let expected = 0.25 * feedback_plan.get(0, k) + 0.75;
            assert!((aggregated.get(0, k) - expected).abs() < EPSILON);
        }
        assert_eq!(&aggregator.control_prediction(), aggregated);
    }

    #[test]
    fn test_noise_log_matches_added_perturbation() {
        let config = AggregatorConfig::with_noise(0.5);
        let mut aggregator = Aggregator::new(dynamics(), vec![constant(2.0), constant(4.0)], vec![0.5, 0.5], config).unwrap();

        let mut outputs = Vec::new();
        for step in 0..10 {
            outputs.push(aggregator.eval(&[0.0, 0.0], step as f64).unwrap());
        }

        let log = aggregator.perturbation_log();
        assert_eq!(log.len(), 10);
        assert_eq!(log.total_recorded(), 10);
        for (k, output) in outputs.iter().enumerate() {
            let perturbation = log.get(k).unwrap();
            assert!((output[0] - (3.0 + perturbation[0])).abs() < EPSILON);
        }
        assert!(log.iter().any(|p| p[0] != 0.0));
    }

    #[test]
    fn test_same_seed_same_noise() {
        let config = AggregatorConfig { noise_var: 1.0, seed: 11, ..AggregatorConfig::default() };
        let mut a = Aggregator::new(dynamics(), vec![constant(0.0)], vec![1.0], config.clone()).unwrap();
        let mut b = Aggregator::new(dynamics(), vec![constant(0.0)], vec![1.0], config).unwrap();
        for _ in 0..5 {
            assert_eq!(a.eval(&[0.0, 0.0], 0.0).unwrap(), b.eval(&[0.0, 0.0], 0.0).unwrap());
        }
    }

    #[test]
    fn test_injected_rng() {
        let config = AggregatorConfig { noise_var: 0.3, noise_scaling: NoiseScaling::StandardDeviation, ..AggregatorConfig::default() };
        let rng = StdRng::seed_from_u64(99);
        let mut aggregator = Aggregator::with_rng(dynamics(), vec![constant(0.0)], vec![1.0], config, rng).unwrap();

        let mut expected_rng = StdRng::seed_from_u64(99);
        let expected = GaussianPerturbation::new(0.3, NoiseScaling::StandardDeviation).unwrap().sample(1, &mut expected_rng);
        assert_eq!(aggregator.eval(&[0.0, 0.0], 0.0).unwrap(), expected);
    }

    #[test]
    fn test_bounded_log_policy() {
        let config = AggregatorConfig { noise_var: 0.1, log_policy: PerturbationLogPolicy::Bounded { capacity: 3 }, ..AggregatorConfig::default() };
        let mut aggregator = Aggregator::new(dynamics(), vec![constant(0.0)], vec![1.0], config).unwrap();
        let mut last = Vec::new();
        for _ in 0..8 {
            last = aggregator.eval(&[0.0, 0.0], 0.0).unwrap();
        }
        assert_eq!(aggregator.perturbation_log().len(), 3);
        assert_eq!(aggregator.perturbation_log().total_recorded(), 8);
        assert_eq!(aggregator.perturbation_log().latest(), Some(&last));
    }

    #[test]
    fn test_construction_errors() {
        let empty = Aggregator::new(dynamics(), vec![], vec![], AggregatorConfig::default());
        assert!(matches!(empty, Err(ControlError::InvalidInput(_))));

        let mismatched = Aggregator::new(dynamics(), vec![constant(1.0), constant(2.0)], vec![1.0], AggregatorConfig::default());
        assert!(matches!(mismatched, Err(ControlError::InvalidInput(_))));

        let negative_noise = Aggregator::new(dynamics(), vec![constant(1.0)], vec![1.0], AggregatorConfig::with_noise(-1.0));
        assert!(matches!(negative_noise, Err(ControlError::InvalidInput(_))));

        let nan_weight = Aggregator::new(dynamics(), vec![constant(1.0)], vec![f64::NAN], AggregatorConfig::default());
        assert!(matches!(nan_weight, Err(ControlError::InvalidInput(_))));

        let other_horizon = share(ConstantController::new(vec![1.0], 2, 7).unwrap());
        let horizons = Aggregator::new(dynamics(), vec![constant(1.0), other_horizon], vec![0.5, 0.5], AggregatorConfig::default());
        assert!(matches!(horizons, Err(ControlError::InvalidInput(_))));

        let wide = share(ConstantController::new(vec![1.0, 2.0], 2, 5).unwrap());
        let wrong_dynamics = Aggregator::new(dynamics(), vec![wide], vec![1.0], AggregatorConfig::default());
        assert!(matches!(wrong_dynamics, Err(ControlError::InvalidInput(_))));
    }

    #[test]
    fn test_dimension_mismatch_at_call_time() {
        let bad_action = share(Misbehaving { action_len: 2, prediction_shape: (1, 5), fail: false });
        let mut aggregator = Aggregator::new(dynamics(), vec![constant(1.0), bad_action], vec![0.5, 0.5], AggregatorConfig::with_noise(1.0)).unwrap();
        assert!(matches!(aggregator.eval(&[0.0, 0.0], 0.0), Err(ControlError::DimensionMismatch { .. })));
        assert_eq!(aggregator.perturbation_log().total_recorded(), 0);

        let bad_prediction = share(Misbehaving { action_len: 1, prediction_shape: (1, 4), fail: false });
        let mut aggregator = Aggregator::new(dynamics(), vec![bad_prediction], vec![1.0], AggregatorConfig::default()).unwrap();
        assert!(matches!(aggregator.eval(&[0.0, 0.0], 0.0), Err(ControlError::DimensionMismatch { .. })));

        let mut aggregator = Aggregator::new(dynamics(), vec![constant(1.0)], vec![1.0], AggregatorConfig::default()).unwrap();
        assert_eq!(aggregator.eval(&[0.0], 0.0), Err(ControlError::length("aggregator state", 2, 1)));
    }

    #[test]
    fn test_sub_controller_error_propagates() {
        let failing = share(Misbehaving { action_len: 1, prediction_shape: (1, 5), fail: true });
        let mut aggregator = Aggregator::new(dynamics(), vec![failing], vec![1.0], AggregatorConfig::default()).unwrap();
        assert_eq!(aggregator.eval(&[0.0, 0.0], 0.0), Err(ControlError::Controller("solver diverged".to_string())));
        assert!(aggregator.perturbation_log().is_empty());
    }

    #[test]
    fn test_shared_controller_is_not_copied() {
        let shared = share(ConstantController::new(vec![1.0], 2, 5).unwrap());
        let mut aggregator = Aggregator::new(dynamics(), vec![shared.clone()], vec![2.0], AggregatorConfig::default()).unwrap();
        assert_eq!(aggregator.eval(&[0.0, 0.0], 0.0).unwrap(), vec![2.0]);
        assert_eq!(Rc::strong_count(&shared), 2);
    }

    #[test]
    fn test_nested_aggregator() {
        let inner = Aggregator::new(dynamics(), vec![constant(2.0), constant(4.0)], vec![0.5, 0.5], AggregatorConfig::default()).unwrap();
        let mut outer = Aggregator::new(dynamics(), vec![share(inner), constant(1.0)], vec![0.5, 0.5], AggregatorConfig::default()).unwrap();
        assert_eq!(outer.eval(&[0.0, 0.0], 0.0).unwrap(), vec![2.0]);
        assert_eq!(outer.aggregated_prediction().column(4), vec![2.0]);
    }
}
