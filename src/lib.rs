//! Roadtrack: Map-Matched Vehicle Tracking for Rust
//!
//! On-line probabilistic tracking of a vehicle over a road network: given a
//! stream of noisy GPS fixes and a static road graph, maintain a distribution
//! over the vehicle's pose — position, velocity, and which road edge (if any)
//! it is traveling on.
//!
//! # Architecture
//!
//! - **Dual-mode Kalman filtering**: a 4-D *ground* model in planar
//!   coordinates and a 2-D *road* model in arc-length coordinates, with a
//!   bidirectional projection between them ([`paths::projection`])
//! - **Path-state algebra**: states as `(path, motion-state)` pairs with
//!   differencing, reprojection, and merging under orientation ambiguity
//! - **On/off-road transitions**: per-step sampling of the next edge (or
//!   free motion) from a topology- and uncertainty-dependent domain
//!   ([`models::transition`])
//!
//! Covariances are carried in SVD-factored form throughout, so positive
//! semi-definiteness survives repeated projection ([`types::svd`]).

pub mod types;
pub mod geom;
pub mod graph;
pub mod paths;
pub mod models;
pub mod filters;
pub mod vehicle;

pub mod prelude {
    pub use crate::types::spaces::*;
    pub use crate::types::svd::SvdCovariance;
    pub use crate::types::gaussian::{GaussianBelief, TruncatedGaussian};
    pub use crate::graph::{GraphEdge, RoadEdge, RoadNetwork, Segment};
    pub use crate::paths::{Path, PathEdge, PathState, PathStateBelief, RoadPath};
    pub use crate::models::observation::GpsObservation;
    pub use crate::models::transition::{OnOffEdgeTransition, TransitionType};
    pub use crate::filters::motion::MotionEstimator;
    pub use crate::vehicle::state::VehicleStateDistribution;
}

/// Error types for the library.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackingError {
    /// A covariance left the PSD cone, an SVD failed, or a state went NaN.
    /// Recoverable at the particle level: drop the particle at resample time.
    #[error("numerical failure: {0}")]
    Numeric(String),
    /// A geometric operation produced no usable result (empty snap, empty
    /// extraction). Recoverable at the particle level.
    #[error("geometry failure: {0}")]
    Geometry(String),
    /// Two paths relate in none of the recognized topological ways. Fatal:
    /// indicates an implementation or data bug.
    #[error("path topology error: {0}")]
    Topology(String),
    /// A caller broke an interface contract (non-positive time delta, wrong
    /// dimensionality, missing value). Fatal.
    #[error("contract violation: {0}")]
    Contract(String),
}

impl TrackingError {
    /// True for errors that the outer filter absorbs by dropping the
    /// affected particle, false for errors that must surface to the caller.
    pub fn is_particle_recoverable(&self) -> bool {
        matches!(self, TrackingError::Numeric(_) | TrackingError::Geometry(_))
    }
}

pub type Result<T> = ::std::result::Result<T, TrackingError>;
