//! Bidirectional projection between ground and road coordinates
//!
//! Every on-road segment induces a linear pair `(P, a)`: road states lift to
//! the plane as `P·x + a`, ground states drop onto the segment as
//! `Pᵀ·(x − a)` after snapping. Both directions propagate covariance through
//! the SVD rule, and both work in the *positive* arc-length form — callers on
//! backward paths negate on the way in and out.
//!
//! Velocity deserves care: projecting a 4-D velocity onto a segment loses the
//! component orthogonal to it. The `use_abs_velocity` flag rescales the
//! projected velocity to the original speed, and a supplied previous
//! location overrides the speed with a finite difference against the snapped
//! position.

use geo::{Coord, Line, LineString};
use nalgebra::SVector;

use crate::geom::{
    location_to_length, project_to_segment, segment_at, segment_length, snap, total_length,
    PolylineLocation,
};
use crate::types::gaussian::GaussianBelief;
use crate::types::spaces::{GroundSpace, GroundState, ObsSpace, ObsVector, RoadSpace, RoadState};
use crate::types::svd::{is_pos_semidefinite, SvdCovariance, SVD_FLOOR};
use crate::types::transforms::{
    coordinate_swap, ground_observation, ground_velocity, road_velocity, RoadToGround, Transform,
};
use crate::{Result, TrackingError};

use super::edge::PathEdge;
use super::path::RoadPath;
use super::EDGE_LENGTH_ERROR_TOLERANCE;

// ============================================================================
// Segment projection pair
// ============================================================================

/// The linear pair `(P, a)` projecting between a segment and the plane.
///
/// Always expressed in the positive (path-directed) arc-length form.
#[derive(Debug, Clone)]
pub struct SegmentProjection {
    matrix: RoadToGround,
    offset: SVector<f64, 4>,
}

impl SegmentProjection {
    /// The 4×2 projection matrix `P`.
    #[inline]
    pub fn matrix(&self) -> &RoadToGround {
        &self.matrix
    }

    /// The ground-space offset `a`.
    #[inline]
    pub fn offset(&self) -> &SVector<f64, 4> {
        &self.offset
    }

    /// Lifts a positive-form road state into the plane: `P·x + a`.
    pub fn lift(&self, road: &RoadState) -> GroundState {
        GroundState::from_svector(self.matrix.as_matrix() * road.as_svector() + self.offset)
    }

    /// Lowers a ground state onto the segment: `Pᵀ·(x − a)`, positive form.
    pub fn lower(&self, ground: &GroundState) -> RoadState {
        RoadState::from_svector(self.matrix.as_matrix().transpose() * (ground.as_svector() - self.offset))
    }
}

/// Builds the projection pair for a segment line at the given (absolute)
/// distance from the start of the path.
///
/// `P` stacks the unit segment direction onto the position and velocity
/// blocks and permutes into ground ordering; `a` anchors the segment start
/// minus the along-path offset.
pub fn pos_vel_projection_pair(line: &Line<f64>, dist_to_start: f64) -> Result<SegmentProjection> {
    let length = segment_length(line);
    if length <= 0.0 {
        return Err(TrackingError::Geometry(
            "projection needs a segment of positive length".to_string(),
        ));
    }

    let d = dist_to_start.abs();
    let p1 = Coord {
        x: (line.end.x - line.start.x) / length,
        y: (line.end.y - line.start.y) / length,
    };
    let s1 = Coord {
        x: line.start.x - p1.x * d,
        y: line.start.y - p1.y * d,
    };

    // Stacked (x, y, vx, vy) form, then swapped into ground ordering.
    let stacked = nalgebra::matrix![
        p1.x, 0.0;
        p1.y, 0.0;
        0.0, p1.x;
        0.0, p1.y
    ];
    let offset_stacked = nalgebra::vector![s1.x, s1.y, 0.0, 0.0];

    let u = coordinate_swap();
    Ok(SegmentProjection {
        matrix: Transform::from_matrix(u * stacked),
        offset: u * offset_stacked,
    })
}

/// The projection pair of a path edge, anchored at its distance from the
/// path start.
pub fn ground_projection(edge: &PathEdge) -> Result<SegmentProjection> {
    pos_vel_projection_pair(edge.line(), edge.dist_to_start().abs())
}

/// The segment of `geometry` under `dist_along` (nonnegative) together with
/// the distance from the geometry start to that segment's start.
pub fn segment_and_distance_to_start(
    geometry: &LineString<f64>,
    dist_along: f64,
) -> Result<(Line<f64>, f64)> {
    if dist_along < 0.0 {
        return Err(TrackingError::Contract(format!(
            "distance along geometry must be nonnegative, got {dist_along}"
        )));
    }
    let loc = crate::geom::locate(geometry, dist_along);
    let line = segment_at(geometry, loc.segment);
    let dist_to_seg = location_to_length(
        geometry,
        &PolylineLocation {
            segment: loc.segment,
            fraction: 0.0,
        },
    );
    Ok((line, dist_to_seg))
}

// ============================================================================
// Ground <- Road
// ============================================================================

/// Lifts a road state on `edge` into ground coordinates.
pub fn ground_state_from_road(
    state: &RoadState,
    edge: &PathEdge,
    use_abs_velocity: bool,
) -> Result<GroundState> {
    let proj = ground_projection(edge)?;

    let pos_state = if edge.is_backward() {
        state.scale(-1.0)
    } else {
        state.clone()
    };

    let mut mean = proj.lift(&pos_state);

    if use_abs_velocity {
        rescale_to_speed(&mut mean, (road_velocity() * state.as_svector())[0].abs());
    }

    Ok(mean)
}

/// Lifts a road belief on `edge` into ground coordinates.
///
/// With `expand_covariance` the 2×2 road covariance is block-doubled onto
/// both planar axes instead of being projected through `P`; this keeps the
/// full road uncertainty visible in the plane, at the cost of isotropy.
pub fn ground_belief_from_road(
    belief: &GaussianBelief<2, RoadSpace>,
    edge: &PathEdge,
    expand_covariance: bool,
    use_abs_velocity: bool,
) -> Result<GaussianBelief<4, GroundSpace>> {
    let proj = ground_projection(edge)?;

    let covariance = if expand_covariance {
        belief.covariance.block_double()
    } else {
        proj.matrix.propagate(&belief.covariance)
    };
    debug_assert!(is_pos_semidefinite(&covariance.as_full(), SVD_FLOOR));

    let pos_state = if edge.is_backward() {
        belief.mean.scale(-1.0)
    } else {
        belief.mean.clone()
    };
    let mut mean = proj.lift(&pos_state);

    if use_abs_velocity {
        rescale_to_speed(&mut mean, (road_velocity() * belief.mean.as_svector())[0].abs());
    }

    Ok(GaussianBelief::new(mean, covariance))
}

fn rescale_to_speed(mean: &mut GroundState, speed: f64) {
    if speed > 0.0 {
        let v = ground_velocity() * mean.as_svector();
        let norm = v.norm();
        if norm > 0.0 {
            let scaled = v.scale(speed / norm);
            mean.set_index(1, scaled[0]);
            mean.set_index(3, scaled[1]);
        }
    }
}

// ============================================================================
// Road <- Ground
// ============================================================================

/// Projects a ground belief onto a path geometry.
///
/// With no `edge_hint` the position is snapped to the nearest segment of the
/// geometry; a hint pins the projection to a specific segment at a known
/// distance from the path start. The returned mean satisfies the on-path
/// postcondition: its arc-length lies on the geometry (sign per direction).
pub fn road_belief_from_ground(
    belief: &GaussianBelief<4, GroundSpace>,
    geometry: &LineString<f64>,
    path_is_backward: bool,
    edge_hint: Option<(&Line<f64>, f64)>,
    use_abs_velocity: bool,
    source_location: Option<&GroundState>,
    time_diff: Option<f64>,
) -> Result<GaussianBelief<2, RoadSpace>> {
    let mean = road_state_from_ground(
        &belief.mean,
        geometry,
        path_is_backward,
        edge_hint,
        use_abs_velocity,
        source_location,
        time_diff,
    )?;

    let (seg_line, dist_to_seg) = resolve_segment(&belief.mean, geometry, edge_hint)?;
    let proj = pos_vel_projection_pair(&seg_line, dist_to_seg)?;
    let covariance = proj.matrix.transpose().propagate(&belief.covariance);
    debug_assert!(is_pos_semidefinite(&covariance.as_full(), SVD_FLOOR));

    Ok(GaussianBelief::new(mean, covariance))
}

/// Mean-only version of [`road_belief_from_ground`].
pub fn road_state_from_ground(
    state: &GroundState,
    geometry: &LineString<f64>,
    path_is_backward: bool,
    edge_hint: Option<(&Line<f64>, f64)>,
    use_abs_velocity: bool,
    source_location: Option<&GroundState>,
    time_diff: Option<f64>,
) -> Result<RoadState> {
    let (seg_line, dist_to_seg) = resolve_segment(state, geometry, edge_hint)?;

    // Snap the position onto the chosen segment; without this the projection
    // picks up the orthogonal offset as phantom arc-length.
    let pos = Coord {
        x: state.index(0),
        y: state.index(2),
    };
    let (_, point_on_line) = project_to_segment(&seg_line, pos);
    let mut adjusted = state.clone();
    adjusted.set_index(0, point_on_line.x);
    adjusted.set_index(2, point_on_line.y);

    let proj = pos_vel_projection_pair(&seg_line, dist_to_seg)?;
    let mut mean = proj.lower(&adjusted);

    if path_is_backward {
        mean = mean.scale(-1.0);
    }

    if use_abs_velocity {
        let speed = (ground_velocity() * adjusted.as_svector()).norm();
        mean.set_index(1, mean.index(1).signum() * speed);
    }

    if let (Some(source), Some(dt)) = (source_location, time_diff) {
        let og = ground_observation();
        let moved = og.as_matrix() * adjusted.as_svector() - og.as_matrix() * source.as_svector();
        let speed = moved.norm() / dt;
        mean.set_index(1, mean.index(1).signum() * speed);
    }

    debug_assert!(
        mean.index(0).abs() <= total_length(geometry) + EDGE_LENGTH_ERROR_TOLERANCE,
        "projected arc-length must lie on the geometry"
    );

    Ok(mean)
}

fn resolve_segment(
    state: &GroundState,
    geometry: &LineString<f64>,
    edge_hint: Option<(&Line<f64>, f64)>,
) -> Result<(Line<f64>, f64)> {
    match edge_hint {
        Some((line, dist)) => Ok((*line, dist.abs())),
        None => {
            let pos = Coord {
                x: state.index(0),
                y: state.index(2),
            };
            let (loc, _) = snap(geometry, pos);
            let line = segment_at(geometry, loc.segment);
            let dist = location_to_length(
                geometry,
                &PolylineLocation {
                    segment: loc.segment,
                    fraction: 0.0,
                },
            );
            Ok((line, dist))
        }
    }
}

// ============================================================================
// Observation lifting
// ============================================================================

/// Transforms a planar observation and its covariance into road coordinates
/// on the given path edge: a 1-D arc-length measurement.
pub fn road_observation(
    obs: &ObsVector,
    obs_cov: &SvdCovariance<2>,
    path: &RoadPath,
    edge: &PathEdge,
) -> Result<GaussianBelief<1, ObsSpace>> {
    let og = ground_observation();

    // Lift the observation into a degenerate ground belief.
    let mean4 = GroundState::from_svector(og.as_matrix().transpose() * obs.as_svector());
    let cov4 = obs_cov.transform(&og.as_matrix().transpose());
    let ground = GaussianBelief::new(mean4, cov4);

    let road = road_belief_from_ground(
        &ground,
        path.geometry(),
        path.is_backward(),
        Some((edge.line(), edge.dist_to_start())),
        true,
        None,
        None,
    )?;

    let or = crate::types::transforms::road_observation();
    let mean = or.as_matrix() * road.mean.as_svector();
    let cov = road.covariance.transform(or.as_matrix());

    Ok(GaussianBelief::new(
        crate::types::spaces::Vector::from_svector(mean),
        cov,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::path::RoadPath;
    use geo::line_string;
    use nalgebra::vector;
    use std::sync::Arc;

    fn east_edge() -> Arc<crate::graph::RoadEdge> {
        Arc::new(crate::graph::RoadEdge::new(
            1,
            line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)],
            false,
        ))
    }

    fn east_path() -> RoadPath {
        RoadPath::from_graph_edges(&[east_edge()], false)
    }

    #[test]
    fn test_projection_pair_shape() {
        let path = east_path();
        let proj = ground_projection(path.first_edge()).unwrap();
        let p = proj.matrix().as_matrix();
        // Eastward unit direction in ground ordering [x, vx, y, vy].
        assert!((p[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((p[(1, 1)] - 1.0).abs() < 1e-12);
        assert!(p[(2, 0)].abs() < 1e-12);
        assert!(p[(3, 1)].abs() < 1e-12);
    }

    #[test]
    fn test_lift_road_state() {
        let path = east_path();
        let road = RoadState::from_array([30.0, 5.0]);
        let ground = ground_state_from_road(&road, path.first_edge(), false).unwrap();
        assert!((ground.index(0) - 30.0).abs() < 1e-12);
        assert!((ground.index(1) - 5.0).abs() < 1e-12);
        assert!(ground.index(2).abs() < 1e-12);
        assert!(ground.index(3).abs() < 1e-12);
    }

    #[test]
    fn test_drop_ground_state_with_offset() {
        let path = east_path();
        // 3 m north of the segment; arc-length must ignore the offset.
        let ground = GroundState::from_array([40.0, 2.0, 3.0, 0.0]);
        let road = road_state_from_ground(
            &ground,
            path.geometry(),
            false,
            None,
            false,
            None,
            None,
        )
        .unwrap();
        assert!((road.distance() - 40.0).abs() < 1e-9);
        assert!((road.velocity() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_roundtrip_mean_and_covariance() {
        let path = east_path();
        let ground = GaussianBelief::new(
            GroundState::from_array([30.0, 2.0, 0.0, 1.0]),
            SvdCovariance::from_diagonal(&vector![1.0, 1.0, 1.0, 1.0]),
        );

        let road = road_belief_from_ground(
            &ground,
            path.geometry(),
            false,
            None,
            false,
            None,
            None,
        )
        .unwrap();

        let back = ground_belief_from_road(&road, path.first_edge(), false, false).unwrap();

        // Position roundtrips exactly on the segment; the off-segment y is lost.
        assert!((back.mean.index(0) - 30.0).abs() < 1e-6);
        assert!(back.mean.index(2).abs() < 1e-6);

        // Covariance: dropping then lifting keeps the along-segment variance.
        let full = back.covariance.as_full();
        assert!((full[(0, 0)] - 1.0).abs() < 1e-5);
        assert!(is_pos_semidefinite(&full, SVD_FLOOR));
    }

    #[test]
    fn test_backward_path_negates() {
        let edge = east_edge();
        let path = RoadPath::from_graph_edges(&[edge], true);
        let ground = GroundState::from_array([40.0, -2.0, 0.0, 0.0]);

        let road = road_state_from_ground(
            &ground,
            path.geometry(),
            true,
            None,
            false,
            None,
            None,
        )
        .unwrap();

        // 40 m east is 60 m along the reversed geometry; backward sign applies.
        assert!((road.distance() + 60.0).abs() < 1e-9);

        let back = ground_state_from_road(&road, path.first_edge(), false).unwrap();
        assert!((back.index(0) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_source_location_velocity_override() {
        let path = east_path();
        let ground = GroundState::from_array([50.0, 1.0, 0.0, 0.0]);
        let source = GroundState::from_array([30.0, 0.0, 0.0, 0.0]);

        let road = road_state_from_ground(
            &ground,
            path.geometry(),
            false,
            None,
            false,
            Some(&source),
            Some(2.0),
        )
        .unwrap();

        // 20 m in 2 s.
        assert!((road.velocity() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_road_observation() {
        let path = east_path();
        let obs = ObsVector::from_array([25.0, 4.0]);
        let cov = SvdCovariance::from_diagonal(&vector![9.0, 9.0]);

        let road_obs = road_observation(&obs, &cov, &path, path.first_edge()).unwrap();
        assert!((road_obs.mean.index(0) - 25.0).abs() < 1e-9);
        assert!((road_obs.covariance.as_full()[(0, 0)] - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_length_segment_rejected() {
        let line = geo::Line::new(
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 1.0, y: 1.0 },
        );
        assert!(pos_vel_projection_pair(&line, 0.0).is_err());
    }
}
