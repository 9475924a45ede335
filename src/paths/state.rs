//! Path states: a path paired with a motion state of matching mode
//!
//! The dimensionality invariant — 4-D motion iff off-road — is encoded in the
//! enum itself, so no runtime check can be forgotten. On-road arc-lengths are
//! clamped onto the path at construction.

use crate::types::gaussian::GaussianBelief;
use crate::types::spaces::{GroundSpace, GroundState, RoadSpace, RoadState};

use super::edge::PathEdge;
use super::path::{Path, RoadPath};
use super::projection::{ground_belief_from_road, ground_state_from_road};
use crate::Result;

// ============================================================================
// PathState
// ============================================================================

/// A vehicle pose: free motion in the plane, or motion along a path.
#[derive(Debug, Clone)]
pub enum PathState {
    /// Off-road: a 4-D planar state.
    Ground(GroundState),
    /// On-road: a 2-D arc-length state on a concrete path.
    OnRoad {
        path: RoadPath,
        state: RoadState,
    },
}

impl PathState {
    /// An on-road state; the arc-length is clamped onto the path.
    pub fn on_road(path: RoadPath, state: RoadState) -> Self {
        let mut state = state;
        state.set_index(0, path.clamp_to_path(state.index(0)));
        PathState::OnRoad { path, state }
    }

    #[inline]
    pub fn is_on_road(&self) -> bool {
        matches!(self, PathState::OnRoad { .. })
    }

    /// The path, null for ground states.
    pub fn path(&self) -> Path {
        match self {
            PathState::Ground(_) => Path::Null,
            PathState::OnRoad { path, .. } => Path::Road(path.clone()),
        }
    }

    /// The road path, if on-road.
    pub fn road_path(&self) -> Option<&RoadPath> {
        match self {
            PathState::Ground(_) => None,
            PathState::OnRoad { path, .. } => Some(path),
        }
    }

    /// The road motion state, if on-road.
    pub fn road_state(&self) -> Option<&RoadState> {
        match self {
            PathState::Ground(_) => None,
            PathState::OnRoad { state, .. } => Some(state),
        }
    }

    /// The path edge under the current arc-length, if on-road.
    pub fn edge(&self) -> Option<&PathEdge> {
        match self {
            PathState::Ground(_) => None,
            PathState::OnRoad { path, state } => Some(path.edge_for_distance(state.index(0))),
        }
    }

    /// This state in ground coordinates, lifting on-road states through the
    /// segment projection (speed-preserving).
    pub fn ground_state(&self) -> Result<GroundState> {
        match self {
            PathState::Ground(g) => Ok(g.clone()),
            PathState::OnRoad { path, state } => {
                let edge = path.edge_for_distance(state.index(0));
                ground_state_from_road(state, edge, true)
            }
        }
    }
}

// ============================================================================
// PathStateBelief
// ============================================================================

/// A Gaussian belief over a path state.
#[derive(Debug, Clone)]
pub enum PathStateBelief {
    /// Off-road: a belief in ground coordinates.
    Ground(GaussianBelief<4, GroundSpace>),
    /// On-road: a belief in arc-length coordinates on a concrete path.
    OnRoad {
        path: RoadPath,
        belief: GaussianBelief<2, RoadSpace>,
    },
}

impl PathStateBelief {
    /// An on-road belief; the mean arc-length is clamped onto the path.
    pub fn on_road(path: RoadPath, belief: GaussianBelief<2, RoadSpace>) -> Self {
        let mut belief = belief;
        belief.mean.set_index(0, path.clamp_to_path(belief.mean.index(0)));
        PathStateBelief::OnRoad { path, belief }
    }

    #[inline]
    pub fn is_on_road(&self) -> bool {
        matches!(self, PathStateBelief::OnRoad { .. })
    }

    /// The mean as a path state.
    pub fn mean_state(&self) -> PathState {
        match self {
            PathStateBelief::Ground(belief) => PathState::Ground(belief.mean.clone()),
            PathStateBelief::OnRoad { path, belief } => PathState::OnRoad {
                path: path.clone(),
                state: belief.mean.clone(),
            },
        }
    }

    /// The path edge under the mean arc-length, if on-road.
    pub fn edge(&self) -> Option<&PathEdge> {
        match self {
            PathStateBelief::Ground(_) => None,
            PathStateBelief::OnRoad { path, belief } => {
                Some(path.edge_for_distance(belief.mean.index(0)))
            }
        }
    }

    /// This belief in ground coordinates, lifting on-road beliefs through
    /// the segment projection (speed-preserving).
    pub fn ground_belief(&self) -> Result<GaussianBelief<4, GroundSpace>> {
        match self {
            PathStateBelief::Ground(belief) => Ok(belief.clone()),
            PathStateBelief::OnRoad { path, belief } => {
                let edge = path.edge_for_distance(belief.mean.index(0));
                ground_belief_from_road(belief, edge, false, true)
            }
        }
    }
}
