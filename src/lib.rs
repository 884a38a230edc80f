//! Weighted blending of model predictive controllers.
//!
//! An [`aggregator::Aggregator`] queries a fixed list of shared MPC controllers
//! once per timestep, sums their actions and plans with fixed weights and adds
//! Gaussian noise to the blended action. The remaining modules provide the
//! dynamics, reference controllers, a closed loop simulation, logging,
//! a scenario catalog and charts around it.

pub mod error;
pub mod types;
pub mod dynamics;
pub mod controllers;
pub mod noise;
pub mod aggregator;
pub mod simulation;
pub mod logger;
pub mod utils;
pub mod scenarios;
pub mod charts;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use controllers::{Controller, MpcController, SharedController};
pub use error::{ControlError, ControlResult};
