//! Probability models: observations, Bayesian parameters, edge transitions,
//! and conjugate covariance learners

pub mod covariance;
pub mod observation;
pub mod parameter;
pub mod transition;

pub use covariance::*;
pub use observation::*;
pub use parameter::*;
pub use transition::*;
