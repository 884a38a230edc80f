/// Discrete-time dynamical systems that controllers are built against.

use crate::error::{ControlError, ControlResult};
use crate::types::{mat_vec, mat_t_vec};

/// Trait for a discrete-time system x' = f(x, u)
pub trait Dynamics {
    /// State dimension
    fn nx(&self) -> usize;

    /// Control dimension
    fn nu(&self) -> usize;

    /// Advance the system one step from `state` under `action`
    fn step(&self, state: &[f64], action: &[f64]) -> ControlResult<Vec<f64>>;

    /// Short human readable description
    fn dynamics_string(&self) -> String;
}

/// Linear discrete system x' = A x + B u
#[derive(Debug, Clone)]
pub struct LinearDynamics {
    pub a: Vec<Vec<f64>>,
    pub b: Vec<Vec<f64>>,
}

impl LinearDynamics {
    /// Create a linear system, `a` must be n x n and `b` must be n x m
    pub fn new(a: Vec<Vec<f64>>, b: Vec<Vec<f64>>) -> ControlResult<Self> {
        let n = a.len();
        if n == 0 {
            return Err(ControlError::InvalidInput("state matrix A is empty".to_string()));
        }
        if a.iter().any(|row| row.len() != n) {
            return Err(ControlError::InvalidInput("state matrix A must be square".to_string()));
        }
        if b.len() != n {
            return Err(ControlError::InvalidInput(format!(
                "input matrix B must have {} rows, got {}",
                n,
                b.len()
            )));
        }
        let m = b[0].len();
        if m == 0 || b.iter().any(|row| row.len() != m) {
            return Err(ControlError::InvalidInput("input matrix B rows must share a non-zero width".to_string()));
        }
        Ok(Self { a, b })
    }

    /// Position/velocity system driven by a force input, integrated with step `dt`
    pub fn double_integrator(dt: f64) -> Self {
        Self {
            a: vec![vec![1.0, dt], vec![0.0, 1.0]],
            b: vec![vec![0.5 * dt * dt], vec![dt]],
        }
    }

    /// A^T v, used by gradient based planners for the adjoint pass
    pub fn a_transpose_times(&self, v: &[f64]) -> Vec<f64> {
        mat_t_vec(&self.a, v)
    }

    /// B^T v
    pub fn b_transpose_times(&self, v: &[f64]) -> Vec<f64> {
        mat_t_vec(&self.b, v)
    }
}

impl Dynamics for LinearDynamics {
    fn nx(&self) -> usize {
        self.a.len()
    }

    fn nu(&self) -> usize {
        self.b[0].len()
    }

    fn step(&self, state: &[f64], action: &[f64]) -> ControlResult<Vec<f64>> {
        if state.len() != self.nx() {
            return Err(ControlError::length("dynamics state", self.nx(), state.len()));
        }
        if action.len() != self.nu() {
            return Err(ControlError::length("dynamics action", self.nu(), action.len()));
        }
        let ax = mat_vec(&self.a, state);
        let bu = mat_vec(&self.b, action);
        Ok(ax.iter().zip(&bu).map(|(x, u)| x + u).collect())
    }

    fn dynamics_string(&self) -> String {
        format!("Linear (nx={}, nu={})", self.nx(), self.nu())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_integrator_step() {
        let dynamics = LinearDynamics::double_integrator(0.1);
        let next = dynamics.step(&[1.0, 2.0], &[10.0]).unwrap();
        // position: 1 + 0.1*2 + 0.5*0.01*10 = 1.25, velocity: 2 + 0.1*10 = 3
        assert!((next[0] - 1.25).abs() < 1e-12);
        assert!((next[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_step_rejects_wrong_state_length() {
        let dynamics = LinearDynamics::double_integrator(0.1);
        assert_eq!(dynamics.step(&[1.0], &[0.0]), Err(ControlError::length("dynamics state", 2, 1)));
    }

    #[test]
    fn test_new_validates_shapes() {
        assert!(LinearDynamics::new(vec![vec![1.0, 0.0]], vec![vec![1.0]]).is_err());
        assert!(LinearDynamics::new(vec![vec![1.0]], vec![vec![1.0], vec![2.0]]).is_err());
        let dynamics = LinearDynamics::new(vec![vec![1.0]], vec![vec![1.0, 2.0]]).unwrap();
        assert_eq!(dynamics.nx(), 1);
        assert_eq!(dynamics.nu(), 2);
    }
}
