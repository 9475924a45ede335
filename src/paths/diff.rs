//! Path-state differencing
//!
//! Subtracting two on-road states is only meaningful once their paths are
//! related: the to-path may continue the from-path, share its start, or do
//! either with reversed orientation. Each relation needs its own arithmetic
//! to express the difference in the to-path's frame. Any pair matching none
//! of the relations is a modeling bug and surfaces as a topology error.

use geo::Line;

use crate::types::spaces::RoadState;
use crate::{Result, TrackingError};

use super::state::PathState;

/// The difference between two path states, in the frame of the `to` state.
#[derive(Debug, Clone)]
pub enum StateDelta {
    /// Difference of ground states (either state was off-road).
    Ground(crate::types::spaces::GroundState),
    /// Difference in road coordinates along the `to` path.
    Road(RoadState),
}

impl StateDelta {
    /// The squared Euclidean norm of the delta.
    pub fn norm_squared(&self) -> f64 {
        match self {
            StateDelta::Ground(g) => g.norm_squared(),
            StateDelta::Road(r) => r.norm_squared(),
        }
    }
}

fn lines_equal_topo(a: &Line<f64>, b: &Line<f64>) -> bool {
    (a.start == b.start && a.end == b.end) || (a.start == b.end && a.end == b.start)
}

/// Computes `to − from` across the recognized path relations.
///
/// `use_raw` relaxes the distance upper-bound check for callers differencing
/// unclamped states. Off-road on either side delegates to ground
/// subtraction.
pub fn state_diff(from: &PathState, to: &PathState, use_raw: bool) -> Result<StateDelta> {
    let (from_path, from_vec, to_path, to_vec) = match (from, to) {
        (
            PathState::OnRoad {
                path: from_path,
                state: from_state,
            },
            PathState::OnRoad {
                path: to_path,
                state: to_state,
            },
        ) => (from_path, from_state, to_path, to_state),
        _ => {
            let delta = to.ground_state()? - from.ground_state()?;
            return Ok(StateDelta::Ground(delta));
        }
    };

    let to_first_line = *to_path.first_edge().line();
    let to_last_line: Option<Line<f64>> = (to_path.edges().len() > 1)
        .then(|| *to_path.last_edge().line());

    let from_first_line = *from_path.first_edge().line();
    let from_last_line: Option<Line<f64>> = (from_path.edges().len() > 1)
        .then(|| *from_path.last_edge().line());

    let result: RoadState;
    let distance_max: f64;

    if from_last_line == Some(to_first_line) && from_last_line != to_last_line {
        // Head-to-tail: the to-path picks up where the from-path ends.
        let from_adj = if from_path.is_backward() {
            from_vec.scale(-1.0)
        } else {
            from_vec.clone()
        };
        let from_edge = from.edge().expect("on-road state has an edge");

        result = head_to_tail_diff(
            to_vec,
            to_path.is_backward(),
            &to_first_line,
            &from_adj,
            from_edge.dist_to_start(),
            from_path.last_edge().line(),
        );

        distance_max = from_path.total_path_distance().abs()
            + to_path.total_path_distance().abs()
            - crate::geom::segment_length(&from_last_line.expect("checked above"));
    } else if from_first_line == to_first_line {
        // Same start, same path directions.
        let from_adj = if to_path.is_backward() == from_path.is_backward() {
            from_vec.clone()
        } else {
            from_vec.scale(-1.0)
        };

        result = to_vec.clone() - from_adj;

        distance_max = from_path
            .total_path_distance()
            .abs()
            .max(to_path.total_path_distance().abs());
    } else if from_last_line.is_some_and(|l| lines_equal_topo(&l, &to_first_line)) {
        // Head-to-tail, but in opposite path directions.
        result = head_to_tail_rev_diff(to, from);

        distance_max = from_path.total_path_distance().abs()
            + to_path.total_path_distance().abs()
            - crate::geom::segment_length(&from_last_line.expect("checked above"));
    } else if lines_equal_topo(&from_first_line, &to_first_line) {
        // Opposite path directions from the same starting location.
        let adjusted_location =
            -(from_vec.index(0).abs() - from_path.first_edge().length());
        let dist_diff =
            to_path.direction_sign() * (to_vec.index(0).abs() - adjusted_location);

        let to_vel = to_vec.index(1);
        let from_vel = if from_path.is_backward() != to_path.is_backward() {
            from_vec.index(1)
        } else {
            -from_vec.index(1)
        };
        let vel_diff = to_vel - from_vel;

        result = RoadState::from_array([dist_diff, vel_diff]);

        distance_max = from_path
            .total_path_distance()
            .abs()
            .max(to_path.total_path_distance().abs());
    } else if to_last_line == Some(from_first_line) {
        // Head-to-tail with from and to exchanged.
        let mut from_adj = if to_path.is_backward() == from_path.is_backward() {
            from_vec.clone()
        } else {
            from_vec.scale(-1.0)
        };
        from_adj.set_index(0, from_adj.index(0) + to_path.last_edge().dist_to_start());

        result = to_vec.clone() - from_adj;

        distance_max = from_path
            .total_path_distance()
            .abs()
            .max(to_path.total_path_distance().abs());
    } else {
        return Err(TrackingError::Topology(format!(
            "paths are unrelated: from total {} to total {}",
            from_path.total_path_distance(),
            to_path.total_path_distance()
        )));
    }

    debug_assert!(
        use_raw || result.index(0).abs() - distance_max <= 1.0,
        "state diff exceeds the path-distance bound"
    );
    #[cfg(debug_assertions)]
    {
        if let (Ok(tg), Ok(fg)) = (to.ground_state(), from.ground_state()) {
            let chord_sq = (tg - fg).norm_squared();
            debug_assert!(
                chord_sq - result.norm_squared() <= 1.0,
                "state diff shorter than the Euclidean chord"
            );
        }
    }

    Ok(StateDelta::Road(result))
}

/// Difference for the head-to-tail relation: expresses the from-state's
/// distance in the to-path frame (origin at the to-path start) and subtracts.
fn head_to_tail_diff(
    to_state: &RoadState,
    to_state_is_backward: bool,
    to_start_edge: &Line<f64>,
    from_state: &RoadState,
    from_state_dist_to_start: f64,
    from_last_edge: &Line<f64>,
) -> RoadState {
    let to_sign = if to_state_is_backward { -1.0 } else { 1.0 };

    // The from-state's distance along its path, re-based onto the start of
    // the to-path (the shared edge).
    let from_flip_dist = from_state.index(0).abs() - from_state_dist_to_start.abs();

    let to_dist = to_state.index(0).abs();
    let length_diff = to_sign * (to_dist - from_flip_dist);

    let to_vel = to_sign * to_state.index(1);
    let from_vel = if from_last_edge == to_start_edge {
        from_state.index(1)
    } else {
        -from_state.index(1)
    };

    RoadState::from_array([length_diff, to_vel - from_vel])
}

/// Difference for the head-to-tail relation with opposite orientations: the
/// other state is flipped around to travel the same direction as this state.
fn head_to_tail_rev_diff(this: &PathState, other: &PathState) -> RoadState {
    let (this_path, this_vec) = match this {
        PathState::OnRoad { path, state } => (path, state),
        PathState::Ground(_) => unreachable!("callers guarantee on-road"),
    };
    let (other_path, other_vec) = match other {
        PathState::OnRoad { path, state } => (path, state),
        PathState::Ground(_) => unreachable!("callers guarantee on-road"),
    };

    let this_dir = this_path.direction_sign();
    let other_dir = other_path.direction_sign();

    let other_dist = this_dir
        * (other_path.total_path_distance().abs() - other_vec.index(0).abs());

    // Normed velocities: positive for motion in the direction of geometry.
    let other_vel_norm_rev = -other_dir * other_vec.index(1);
    let this_vel_norm = this_dir * this_vec.index(1);
    let rel_vel_diff = this_dir * (this_vel_norm - other_vel_norm_rev);

    RoadState::from_array([this_vec.index(0) - other_dist, rel_vel_diff])
}
