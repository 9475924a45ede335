//! Kalman filtering and the outer particle loop
//!
//! - [`kalman::SvdKalmanFilter`]: linear-Gaussian filter over SVD-factored
//!   covariances
//! - [`motion::MotionEstimator`]: the dual ground/road motion model, rebuilt
//!   per time step
//! - [`tracker::VehicleTracker`]: the particle-filter outer loop

pub mod kalman;
pub mod motion;
pub mod tracker;
