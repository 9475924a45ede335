//! The per-particle state bundle
//!
//! One particle owns everything it believes: the path-state belief, the
//! learned covariances, the transition model, and a one-step genealogy back
//! to the particle it was cloned from. The graph is the only shared
//! structure, and it is read-only.

use std::sync::Arc;

use geo::{Coord, LineString};
use nalgebra::SMatrix;

use crate::geom::{extract, snap, location_to_length};
use crate::graph::GraphEdge;
use crate::models::covariance::{InverseWishart, ScaledInverseGamma};
use crate::models::observation::GpsObservation;
use crate::models::parameter::{BayesianParameter, SimpleParameter};
use crate::models::transition::OnOffEdgeTransition;
use crate::paths::{PathState, PathStateBelief};
use crate::types::svd::SvdCovariance;
use crate::Result;

/// One particle of the vehicle-state distribution.
#[derive(Debug, Clone)]
pub struct VehicleStateDistribution {
    observation: Arc<GpsObservation>,
    /// Sampled concrete path state together with its Gaussian prior.
    pub path_state_param: BayesianParameter<PathState, (), PathStateBelief>,
    /// GPS error covariance with its inverse-gamma prior.
    pub observation_covariance_param: SimpleParameter<SvdCovariance<2>, ScaledInverseGamma>,
    /// Road-model acceleration noise (scalar) with its prior.
    pub on_road_covariance_param: SimpleParameter<SMatrix<f64, 1, 1>, InverseWishart<1>>,
    /// Ground-model acceleration noise (2×2) with its prior.
    pub off_road_covariance_param: SimpleParameter<SMatrix<f64, 2, 2>, InverseWishart<2>>,
    /// On/off-edge transition model (carries its own Dirichlet priors).
    pub edge_transition_param: OnOffEdgeTransition,
    /// Log-likelihood of the observation under the predictive distribution,
    /// set by the predictor; the outer filter resamples on it.
    pub log_likelihood: f64,
    parent: Option<Box<VehicleStateDistribution>>,
}

impl VehicleStateDistribution {
    pub fn new(
        observation: Arc<GpsObservation>,
        belief: PathStateBelief,
        observation_covariance_param: SimpleParameter<SvdCovariance<2>, ScaledInverseGamma>,
        on_road_covariance_param: SimpleParameter<SMatrix<f64, 1, 1>, InverseWishart<1>>,
        off_road_covariance_param: SimpleParameter<SMatrix<f64, 2, 2>, InverseWishart<2>>,
        edge_transition_param: OnOffEdgeTransition,
    ) -> Self {
        let value = belief.mean_state();
        Self {
            observation,
            path_state_param: BayesianParameter::new(value, (), belief),
            observation_covariance_param,
            on_road_covariance_param,
            off_road_covariance_param,
            edge_transition_param,
            log_likelihood: 0.0,
            parent: None,
        }
    }

    #[inline]
    pub fn observation(&self) -> &Arc<GpsObservation> {
        &self.observation
    }

    /// Rebinds the particle to a newer observation.
    pub fn set_observation(&mut self, observation: Arc<GpsObservation>) {
        self.observation = observation;
    }

    /// The current path-state belief.
    #[inline]
    pub fn belief(&self) -> &PathStateBelief {
        &self.path_state_param.prior
    }

    /// The previous particle, when one step of genealogy is retained.
    pub fn parent(&self) -> Option<&VehicleStateDistribution> {
        self.parent.as_deref()
    }

    /// Installs the parent, severing the grandparent chain so genealogy
    /// stays one step deep.
    pub fn set_parent(&mut self, parent: &VehicleStateDistribution) {
        let mut copy = parent.clone();
        copy.parent = None;
        self.parent = Some(Box::new(copy));
    }

    /// The edge the particle currently occupies.
    pub fn current_edge(&self) -> GraphEdge {
        match self.belief().edge() {
            Some(edge) => GraphEdge::Real(edge.graph_edge().clone()),
            None => GraphEdge::Null,
        }
    }

    /// Mean planar location of the belief.
    pub fn mean_location(&self) -> Result<Coord<f64>> {
        let ground = self.belief().ground_belief()?;
        Ok(Coord {
            x: ground.mean.index(0),
            y: ground.mean.index(2),
        })
    }

    /// The geometry traversed since the parent particle, when both states
    /// are on-road: the subline of the current path between the parent's
    /// position (snapped onto it) and the current arc-length. `None`
    /// off-road or without a parent.
    pub fn movement_path(&self) -> Result<Option<LineString<f64>>> {
        let parent = match self.parent() {
            Some(p) => p,
            None => return Ok(None),
        };

        let (path, state) = match &self.path_state_param.value {
            PathState::OnRoad { path, state } => (path, state),
            PathState::Ground(_) => return Ok(None),
        };
        if !parent.path_state_param.value.is_on_road() {
            return Ok(None);
        }

        let parent_ground = parent.path_state_param.value.ground_state()?;
        let parent_pos = Coord {
            x: parent_ground.index(0),
            y: parent_ground.index(2),
        };
        let (loc, _) = snap(path.geometry(), parent_pos);
        let start = location_to_length(path.geometry(), &loc);
        let end = state.index(0).abs();

        Ok(Some(extract(path.geometry(), start, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::RoadPath;
    use crate::types::gaussian::GaussianBelief;
    use crate::types::spaces::{ObsVector, RoadState};
    use geo::line_string;
    use nalgebra::{matrix, vector};

    fn particle(belief: PathStateBelief) -> VehicleStateDistribution {
        let obs = Arc::new(GpsObservation::projected_only(
            "t",
            0.0,
            ObsVector::zeros(),
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
            SimpleParameter::simple(matrix![0.5], InverseWishart::centered_on(matrix![0.5])),
            SimpleParameter::simple(
                matrix![0.5, 0.0; 0.0, 0.5],
                InverseWishart::centered_on(matrix![0.5, 0.0; 0.0, 0.5]),
            ),
            OnOffEdgeTransition::new([10.0, 1.0], [10.0, 1.0]),
        )
    }

    fn east_path() -> RoadPath {
        let edge = Arc::new(crate::graph::RoadEdge::new(
            1,
            line_string![(x: 0.0, y: 0.0), (x: 1000.0, y: 0.0)],
            false,
        ));
        RoadPath::from_graph_edges(&[edge], false)
    }

    #[test]
    fn test_current_edge_modes() {
        let on = particle(PathStateBelief::on_road(
            east_path(),
            GaussianBelief::new(RoadState::from_array([5.0, 1.0]), SvdCovariance::identity()),
        ));
        assert!(!on.current_edge().is_null());

        let off = particle(PathStateBelief::Ground(GaussianBelief::new(
            crate::types::spaces::GroundState::from_array([0.0, 0.0, 50.0, 0.0]),
            SvdCovariance::identity(),
        )));
        assert!(off.current_edge().is_null());
    }

    #[test]
    fn test_parent_chain_truncated() {
        let a = particle(PathStateBelief::on_road(
            east_path(),
            GaussianBelief::new(RoadState::from_array([5.0, 1.0]), SvdCovariance::identity()),
        ));
        let mut b = a.clone();
        b.set_parent(&a);
        let mut c = particle(PathStateBelief::on_road(
            east_path(),
            GaussianBelief::new(RoadState::from_array([15.0, 1.0]), SvdCovariance::identity()),
        ));
        c.set_parent(&b);

        assert!(c.parent().is_some());
        assert!(c.parent().unwrap().parent().is_none());
    }

    #[test]
    fn test_movement_path_on_road() {
        let a = particle(PathStateBelief::on_road(
            east_path(),
            GaussianBelief::new(RoadState::from_array([20.0, 10.0]), SvdCovariance::identity()),
        ));
        let mut b = particle(PathStateBelief::on_road(
            east_path(),
            GaussianBelief::new(RoadState::from_array([80.0, 10.0]), SvdCovariance::identity()),
        ));
        b.set_parent(&a);

        let path = b.movement_path().unwrap().unwrap();
        assert!((crate::geom::total_length(&path) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_movement_path_none_off_road() {
        let a = particle(PathStateBelief::Ground(GaussianBelief::new(
            crate::types::spaces::GroundState::zeros(),
            SvdCovariance::identity(),
        )));
        let mut b = a.clone();
        b.set_parent(&a);
        assert!(b.movement_path().unwrap().is_none());
    }
}
