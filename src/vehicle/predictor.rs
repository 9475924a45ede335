//! The per-step predictor
//!
//! Sequences one filtering step for one particle: rebuild the motion model
//! for the step's `Δt`, predict, measure, sample the edge transition,
//! re-project onto the sampled edge, and update the covariance posteriors.
//! The predictor borrows the particle and graph for the duration of the step
//! and retains neither.

use std::sync::Arc;

use rand::Rng;
use tracing::trace;

use crate::filters::motion::{
    ground_covariance_factor_left_inv, ground_transition_matrix, road_covariance_factor_left_inv,
    road_transition_matrix, MotionEstimator,
};
use crate::graph::{GraphEdge, RoadNetwork};
use crate::models::observation::GpsObservation;
use crate::models::transition::TransitionContext;
use crate::paths::diff::{state_diff, StateDelta};
use crate::paths::projection::road_belief_from_ground;
use crate::paths::{PathState, PathStateBelief, RoadPath};
use crate::types::transforms::ground_observation;
use crate::vehicle::state::VehicleStateDistribution;
use crate::{Result, TrackingError};

/// Steps particles against a road network.
pub struct VehicleStatePredictor<'a, G: RoadNetwork> {
    graph: &'a G,
}

impl<'a, G: RoadNetwork> VehicleStatePredictor<'a, G> {
    pub fn new(graph: &'a G) -> Self {
        Self { graph }
    }

    /// Runs one full step for one particle, producing its successor.
    ///
    /// Fails with a contract violation when the observation does not advance
    /// time; numeric and geometry failures mark the particle as droppable.
    pub fn step<R: Rng + ?Sized>(
        &self,
        parent: &VehicleStateDistribution,
        observation: Arc<GpsObservation>,
        rng: &mut R,
    ) -> Result<VehicleStateDistribution> {
        let dt = observation.timestamp() - parent.observation().timestamp();
        if dt <= 0.0 {
            return Err(TrackingError::Contract(format!(
                "observation does not advance time: dt = {dt}"
            )));
        }

        let estimator = MotionEstimator::new(
            dt,
            &parent.off_road_covariance_param.value,
            &parent.on_road_covariance_param.value,
            &parent.observation_covariance_param.value,
        )?;

        // Predict in the parent's regime, then weigh and fold in the fix.
        let predicted = estimator.predict(parent.belief())?;
        let log_likelihood = estimator
            .observation_distribution(&predicted)?
            .log_density(observation.projected_point())
            .unwrap_or(f64::NEG_INFINITY);
        let measured = estimator.measure(&predicted, observation.projected_point())?;

        // Sample the next edge from the transition distribution.
        let measured_ground = measured.ground_belief()?;
        let current_edge = match measured.edge() {
            Some(edge) => GraphEdge::Real(edge.graph_edge().clone()),
            None => GraphEdge::Null,
        };
        let distance_to_travel = match &measured {
            PathStateBelief::OnRoad { belief, .. } => belief.mean.index(0),
            PathStateBelief::Ground(_) => 0.0,
        };
        let ctx = TransitionContext {
            current_edge: current_edge.clone(),
            mean_location: geo::Coord {
                x: measured_ground.mean.index(0),
                y: measured_ground.mean.index(2),
            },
            observation_covariance: &parent.observation_covariance_param.value,
            distance_to_travel,
        };
        let sampled_edge = parent
            .edge_transition_param
            .sample(self.graph, &ctx, rng);

        let new_belief =
            self.reproject(&measured, &current_edge, &sampled_edge, parent, dt)?;
        trace!(
            dt,
            on_road = new_belief.is_on_road(),
            log_likelihood,
            "stepped particle"
        );

        // Assemble the successor, then run the parameter updates.
        let mut child = parent.clone();
        child.set_observation(observation.clone());
        child.log_likelihood = log_likelihood;
        child.path_state_param.prior = new_belief.clone();
        child.path_state_param.value = new_belief.mean_state();
        child.set_parent(parent);

        self.update_observation_covariance(&mut child, &estimator, rng)?;
        self.update_process_covariance(&mut child, parent, dt)?;
        child
            .edge_transition_param
            .observe_transition(&current_edge, &sampled_edge);

        Ok(child)
    }

    /// Moves the measured belief onto the sampled edge: staying put is a
    /// no-op, boarding and switching project through ground with the
    /// parent's position as the velocity reference, leaving lifts to ground.
    fn reproject(
        &self,
        measured: &PathStateBelief,
        current_edge: &GraphEdge,
        sampled_edge: &GraphEdge,
        parent: &VehicleStateDistribution,
        dt: f64,
    ) -> Result<PathStateBelief> {
        if !sampled_edge.is_null() && *sampled_edge == *current_edge {
            // Same edge: nothing to re-project.
            return Ok(measured.clone());
        }

        match (measured, sampled_edge) {
            (PathStateBelief::Ground(_), GraphEdge::Null) => Ok(measured.clone()),
            (_, GraphEdge::Null) => {
                // Going off-road: the ground lift is the new belief.
                Ok(PathStateBelief::Ground(measured.ground_belief()?))
            }
            (_, GraphEdge::Real(edge)) => {
                // Boarding or switching edges: project the ground belief
                // onto the sampled edge's own path.
                let path = RoadPath::from_graph_edges(&[edge.clone()], false);
                let ground = measured.ground_belief()?;
                let parent_ground = parent.path_state_param.value.ground_state().ok();

                let road = road_belief_from_ground(
                    &ground,
                    path.geometry(),
                    path.is_backward(),
                    None,
                    true,
                    parent_ground.as_ref(),
                    parent_ground.as_ref().map(|_| dt),
                )?;
                Ok(PathStateBelief::on_road(path, road))
            }
        }
    }

    /// Observation-covariance update: the error between the fix and a
    /// noise-perturbed sample of the new state, pushed through `O_g`.
    fn update_observation_covariance<R: Rng + ?Sized>(
        &self,
        child: &mut VehicleStateDistribution,
        estimator: &MotionEstimator,
        rng: &mut R,
    ) -> Result<()> {
        let sampled =
            estimator.sample_state_transition_error(&child.path_state_param.value, rng);
        let sampled_ground = sampled.ground_state()?;
        let og = ground_observation();
        let predicted_obs = og.as_matrix() * sampled_ground.as_svector();

        let error = child.observation().projected_point().as_svector() - predicted_obs;
        child.observation_covariance_param.prior.update(&error);
        child.observation_covariance_param.value = child
            .observation_covariance_param
            .prior
            .mean_covariance();
        Ok(())
    }

    /// Process-covariance update: reconstruct the acceleration-noise draw
    /// implied by the step via the covariance-factor left inverse and feed
    /// it to the matching inverse-Wishart. Steps that changed regime carry
    /// no reconstructable residual and are skipped.
    fn update_process_covariance(
        &self,
        child: &mut VehicleStateDistribution,
        parent: &VehicleStateDistribution,
        dt: f64,
    ) -> Result<()> {
        let old = &parent.path_state_param.value;
        let new = &child.path_state_param.value;

        match (old, new) {
            (PathState::Ground(old_ground), PathState::Ground(new_ground)) => {
                let residual = new_ground.as_svector()
                    - ground_transition_matrix(dt) * old_ground.as_svector();
                let q = ground_covariance_factor_left_inv(dt) * residual;
                child.off_road_covariance_param.prior.update(&q);
                child.off_road_covariance_param.value =
                    child.off_road_covariance_param.prior.mean();
            }
            (PathState::OnRoad { state: old_state, .. }, PathState::OnRoad { .. }) => {
                let delta = match state_diff(old, new, false) {
                    Ok(StateDelta::Road(delta)) => delta,
                    Ok(StateDelta::Ground(_)) => return Ok(()),
                    // Unrelated paths can occur after a transition jump;
                    // there is no residual to learn from.
                    Err(TrackingError::Topology(_)) => return Ok(()),
                    Err(e) => return Err(e),
                };
                // Expected motion from the old state under A_r, as a delta.
                let expected = road_transition_matrix(dt) * old_state.as_svector()
                    - old_state.as_svector();
                let residual = delta.as_svector() - expected;
                let q = road_covariance_factor_left_inv(dt) * residual;
                child.on_road_covariance_param.prior.update(&q);
                child.on_road_covariance_param.value =
                    child.on_road_covariance_param.prior.mean();
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RoadEdge, SimpleRoadNetwork};
    use crate::models::covariance::{InverseWishart, ScaledInverseGamma};
    use crate::models::parameter::SimpleParameter;
    use crate::models::transition::OnOffEdgeTransition;
    use crate::types::gaussian::GaussianBelief;
    use crate::types::spaces::{GroundState, ObsVector, RoadState};
    use crate::types::svd::SvdCovariance;
    use geo::line_string;
    use nalgebra::{matrix, vector};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn network() -> SimpleRoadNetwork {
        let mk = |id, line| Arc::new(RoadEdge::new(id, line, false));
        SimpleRoadNetwork::new(vec![
            mk(0, line_string![(x: 0.0, y: 0.0), (x: 1000.0, y: 0.0)]),
            mk(1, line_string![(x: 1000.0, y: 0.0), (x: 2000.0, y: 0.0)]),
        ])
    }

    fn on_road_particle(net: &SimpleRoadNetwork) -> VehicleStateDistribution {
        let path = RoadPath::from_graph_edges(&[net.edges()[0].clone()], false);
        let belief = PathStateBelief::on_road(
            path,
            GaussianBelief::new(
                RoadState::from_array([100.0, 10.0]),
                SvdCovariance::from_diagonal(&vector![25.0, 4.0]),
            ),
        );
        let obs = Arc::new(GpsObservation::projected_only(
            "v",
            0.0,
            ObsVector::from_array([100.0, 0.0]),
            0,
            None,
        ));
        VehicleStateDistribution::new(
            obs,
            belief,
            SimpleParameter::simple(
                SvdCovariance::from_diagonal(&vector![4.0, 4.0]),
                ScaledInverseGamma::default_observation_prior(),
            ),
            SimpleParameter::simple(matrix![0.25], InverseWishart::centered_on(matrix![0.25])),
            SimpleParameter::simple(
                matrix![0.25, 0.0; 0.0, 0.25],
                InverseWishart::centered_on(matrix![0.25, 0.0; 0.0, 0.25]),
            ),
            // Overwhelmingly prefer staying on-road.
            OnOffEdgeTransition::new([1.0, 1.0], [1e8, 1.0]),
        )
    }

    #[test]
    fn test_step_advances_on_road() {
        let net = network();
        let predictor = VehicleStatePredictor::new(&net);
        let parent = on_road_particle(&net);
        let obs = Arc::new(GpsObservation::projected_only(
            "v",
            1.0,
            ObsVector::from_array([110.0, 0.0]),
            1,
            None,
        ));

        let mut rng = StdRng::seed_from_u64(5);
        let child = predictor.step(&parent, obs, &mut rng).unwrap();

        assert!(child.belief().is_on_road());
        let s = match child.belief() {
            PathStateBelief::OnRoad { belief, .. } => belief.mean.distance(),
            _ => unreachable!(),
        };
        assert!(s > 100.0 && s < 125.0, "arc-length was {s}");
        assert!(child.log_likelihood.is_finite());
        assert!(child.parent().is_some());
    }

    #[test]
    fn test_step_rejects_stale_observation() {
        let net = network();
        let predictor = VehicleStatePredictor::new(&net);
        let parent = on_road_particle(&net);
        let obs = Arc::new(GpsObservation::projected_only(
            "v",
            0.0,
            ObsVector::from_array([100.0, 0.0]),
            1,
            None,
        ));

        let mut rng = StdRng::seed_from_u64(5);
        match predictor.step(&parent, obs, &mut rng) {
            Err(TrackingError::Contract(_)) => {}
            other => panic!("expected contract violation, got {other:?}"),
        }
    }

    #[test]
    fn test_off_road_particle_stays_off_when_far() {
        let net = network();
        let predictor = VehicleStatePredictor::new(&net);

        let belief = PathStateBelief::Ground(GaussianBelief::new(
            GroundState::from_array([500.0, 0.0, 500.0, 0.0]),
            SvdCovariance::from_diagonal(&vector![25.0, 1.0, 25.0, 1.0]),
        ));
        let obs0 = Arc::new(GpsObservation::projected_only(
            "v",
            0.0,
            ObsVector::from_array([500.0, 500.0]),
            0,
            None,
        ));
        let mut parent = on_road_particle(&net);
        parent.path_state_param.prior = belief.clone();
        parent.path_state_param.value = belief.mean_state();
        parent.set_observation(obs0);

        let obs = Arc::new(GpsObservation::projected_only(
            "v",
            1.0,
            ObsVector::from_array([500.0, 500.0]),
            1,
            None,
        ));
        let mut rng = StdRng::seed_from_u64(9);
        let child = predictor.step(&parent, obs, &mut rng).unwrap();
        assert!(!child.belief().is_on_road());
    }

    #[test]
    fn test_covariance_posteriors_move() {
        let net = network();
        let predictor = VehicleStatePredictor::new(&net);
        let parent = on_road_particle(&net);
        let shape_before = parent.observation_covariance_param.prior.shape();

        let obs = Arc::new(GpsObservation::projected_only(
            "v",
            1.0,
            ObsVector::from_array([110.0, 0.0]),
            1,
            None,
        ));
        let mut rng = StdRng::seed_from_u64(5);
        let child = predictor.step(&parent, obs, &mut rng).unwrap();

        assert!(child.observation_covariance_param.prior.shape() > shape_before);
    }
}
