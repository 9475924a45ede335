//! Vehicle state: the per-particle parameter bundle and the step predictor

pub mod predictor;
pub mod state;

pub use predictor::VehicleStatePredictor;
pub use state::VehicleStateDistribution;
