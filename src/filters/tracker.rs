//! The particle-filter outer loop
//!
//! Owns the particle population and drives it observation by observation:
//! step every particle, drop the ones that failed numerically, weight the
//! survivors by observation likelihood, resample back to size.
//! Observations that do not advance time are skipped outright.

use std::sync::Arc;

use nalgebra::{matrix, SMatrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, warn};

use crate::graph::RoadNetwork;
use crate::models::covariance::{InverseWishart, ScaledInverseGamma};
use crate::models::observation::GpsObservation;
use crate::models::parameter::SimpleParameter;
use crate::models::transition::OnOffEdgeTransition;
use crate::paths::PathStateBelief;
use crate::types::svd::SvdCovariance;
use crate::vehicle::predictor::VehicleStatePredictor;
use crate::vehicle::state::VehicleStateDistribution;
use crate::{Result, TrackingError};

/// Initial-model parameters for a tracker population.
#[derive(Debug, Clone)]
pub struct TrackerParams {
    /// Population size, kept constant across resamples.
    pub num_particles: usize,
    /// Dirichlet concentrations for free-motion transitions (off→off, off→on).
    pub free_motion_alpha: [f64; 2],
    /// Dirichlet concentrations for edge-motion transitions (on→on, on→off).
    pub edge_motion_alpha: [f64; 2],
    /// Initial ground acceleration-noise covariance.
    pub off_road_noise: SMatrix<f64, 2, 2>,
    /// Initial road acceleration noise.
    pub on_road_noise: SMatrix<f64, 1, 1>,
    /// Initial observation covariance.
    pub observation_covariance: SvdCovariance<2>,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            num_particles: 25,
            free_motion_alpha: [30.0, 1.0],
            edge_motion_alpha: [30.0, 1.0],
            off_road_noise: matrix![0.25, 0.0; 0.0, 0.25],
            on_road_noise: matrix![0.25],
            observation_covariance: SvdCovariance::from_diagonal(&nalgebra::vector![25.0, 25.0]),
        }
    }
}

/// Outcome of feeding one observation to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The population advanced.
    Stepped,
    /// The observation did not advance time and was ignored.
    Skipped,
}

/// The outer particle filter over vehicle states.
pub struct VehicleTracker<G: RoadNetwork> {
    graph: Arc<G>,
    particles: Vec<VehicleStateDistribution>,
    params: TrackerParams,
    prev_time: f64,
    seed: u64,
    step_count: u64,
    rng: StdRng,
}

impl<G: RoadNetwork> VehicleTracker<G> {
    /// Builds the initial population around a first observation.
    ///
    /// Every particle starts in free motion, its position and velocity drawn
    /// from the observation (and its linked predecessor, when present).
    pub fn new(
        graph: Arc<G>,
        initial_obs: Arc<GpsObservation>,
        params: TrackerParams,
        seed: u64,
    ) -> Result<Self> {
        let estimator = crate::filters::motion::MotionEstimator::new(
            1.0,
            &params.off_road_noise,
            &params.on_road_noise,
            &params.observation_covariance,
        )?;

        let mut particles = Vec::with_capacity(params.num_particles);
        for idx in 0..params.num_particles {
            let mut rng = StdRng::seed_from_u64(seed ^ (idx as u64));
            let belief =
                PathStateBelief::Ground(estimator.initial_ground_belief(&initial_obs, &mut rng));

            particles.push(VehicleStateDistribution::new(
                initial_obs.clone(),
                belief,
                SimpleParameter::simple(
                    params.observation_covariance.clone(),
                    ScaledInverseGamma::default_observation_prior(),
                ),
                SimpleParameter::simple(
                    params.on_road_noise,
                    InverseWishart::centered_on(params.on_road_noise),
                ),
                SimpleParameter::simple(
                    params.off_road_noise,
                    InverseWishart::centered_on(params.off_road_noise),
                ),
                OnOffEdgeTransition::new(params.free_motion_alpha, params.edge_motion_alpha),
            ));
        }

        Ok(Self {
            graph,
            particles,
            prev_time: initial_obs.timestamp(),
            seed,
            step_count: 0,
            rng: StdRng::seed_from_u64(seed),
            params,
        })
    }

    /// The current population.
    pub fn particles(&self) -> &[VehicleStateDistribution] {
        &self.particles
    }

    /// The highest-likelihood particle of the last step.
    pub fn best_particle(&self) -> &VehicleStateDistribution {
        self.particles
            .iter()
            .max_by(|a, b| a.log_likelihood.total_cmp(&b.log_likelihood))
            .expect("population is never empty")
    }

    /// Feeds one observation through predict, measure, and resample.
    ///
    /// Observations must arrive in per-source timestamp order; a fix that
    /// does not advance time is skipped. Zero surviving particles is fatal.
    pub fn update(&mut self, observation: Arc<GpsObservation>) -> Result<StepOutcome> {
        let dt = observation.timestamp() - self.prev_time;
        if dt <= 0.0 {
            debug!(dt, "skipping observation that does not advance time");
            return Ok(StepOutcome::Skipped);
        }

        self.step_count += 1;
        let predictor = VehicleStatePredictor::new(self.graph.as_ref());

        let mut survivors = Vec::with_capacity(self.particles.len());
        let mut failed = 0usize;
        for (idx, particle) in self.particles.iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(
                self.seed
                    .wrapping_add(self.step_count.wrapping_mul(0x9E37_79B9_7F4A_7C15))
                    .wrapping_add(idx as u64),
            );
            match predictor.step(particle, observation.clone(), &mut rng) {
                Ok(child) => survivors.push(child),
                Err(e) if e.is_particle_recoverable() => {
                    failed += 1;
                    debug!(particle = idx, error = %e, "dropping failed particle");
                }
                Err(e) => return Err(e),
            }
        }

        if failed > 0 {
            warn!(failed, surviving = survivors.len(), "particle failures this step");
        }
        if survivors.is_empty() {
            error!("no particle survived the step");
            return Err(TrackingError::Numeric(
                "zero surviving particles".to_string(),
            ));
        }

        self.particles = self.resample(survivors);
        self.prev_time = observation.timestamp();
        debug!(
            step = self.step_count,
            particles = self.particles.len(),
            "advanced population"
        );
        Ok(StepOutcome::Stepped)
    }

    /// Multinomial resampling on normalized likelihood weights.
    fn resample(
        &mut self,
        survivors: Vec<VehicleStateDistribution>,
    ) -> Vec<VehicleStateDistribution> {
        let max_log = survivors
            .iter()
            .map(|p| p.log_likelihood)
            .fold(f64::NEG_INFINITY, f64::max);

        let weights: Vec<f64> = survivors
            .iter()
            .map(|p| (p.log_likelihood - max_log).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        if !(total > 0.0) || !total.is_finite() {
            // Degenerate weights: keep the survivors, padded by repetition.
            let mut kept = survivors.clone();
            while kept.len() < self.params.num_particles {
                let idx = self.rng.gen_range(0..survivors.len());
                kept.push(survivors[idx].clone());
            }
            kept.truncate(self.params.num_particles);
            return kept;
        }

        let mut resampled = Vec::with_capacity(self.params.num_particles);
        for _ in 0..self.params.num_particles {
            let mut u: f64 = self.rng.gen::<f64>() * total;
            let mut chosen = survivors.len() - 1;
            for (idx, w) in weights.iter().enumerate() {
                if u < *w {
                    chosen = idx;
                    break;
                }
                u -= w;
            }
            resampled.push(survivors[chosen].clone());
        }
        resampled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RoadEdge, SimpleRoadNetwork};
    use crate::types::spaces::ObsVector;
    use geo::line_string;

    fn network() -> Arc<SimpleRoadNetwork> {
        Arc::new(SimpleRoadNetwork::new(vec![Arc::new(RoadEdge::new(
            0,
            line_string![(x: 0.0, y: 0.0), (x: 1000.0, y: 0.0)],
            false,
        ))]))
    }

    fn obs(t: f64, x: f64, y: f64) -> Arc<GpsObservation> {
        Arc::new(GpsObservation::projected_only(
            "t",
            t,
            ObsVector::from_array([x, y]),
            t as u64,
            None,
        ))
    }

    #[test]
    fn test_population_size_constant() {
        let mut tracker = VehicleTracker::new(
            network(),
            obs(0.0, 5.0, 5.0),
            TrackerParams {
                num_particles: 10,
                ..TrackerParams::default()
            },
            7,
        )
        .unwrap();

        assert_eq!(tracker.particles().len(), 10);
        tracker.update(obs(1.0, 6.0, 5.0)).unwrap();
        assert_eq!(tracker.particles().len(), 10);
    }

    #[test]
    fn test_stale_observation_skipped() {
        let mut tracker = VehicleTracker::new(
            network(),
            obs(10.0, 5.0, 5.0),
            TrackerParams::default(),
            7,
        )
        .unwrap();

        assert_eq!(
            tracker.update(obs(10.0, 6.0, 5.0)).unwrap(),
            StepOutcome::Skipped
        );
        assert_eq!(
            tracker.update(obs(9.0, 6.0, 5.0)).unwrap(),
            StepOutcome::Skipped
        );
        assert_eq!(
            tracker.update(obs(11.0, 6.0, 5.0)).unwrap(),
            StepOutcome::Stepped
        );
    }

    #[test]
    fn test_track_follows_observations() {
        let mut tracker = VehicleTracker::new(
            network(),
            obs(0.0, 0.0, 20.0),
            TrackerParams {
                num_particles: 20,
                // A maneuvering-grade model so the filter can pick up the
                // 10 m/s motion within a few fixes.
                off_road_noise: matrix![25.0, 0.0; 0.0, 25.0],
                observation_covariance: SvdCovariance::from_diagonal(&nalgebra::vector![4.0, 4.0]),
                ..TrackerParams::default()
            },
            13,
        )
        .unwrap();

        for step in 1..=10 {
            let t = step as f64;
            tracker.update(obs(t, 10.0 * t, 20.0)).unwrap();
        }

        let best = tracker.best_particle();
        let location = best.mean_location().unwrap();
        assert!((location.x - 100.0).abs() < 25.0, "x was {}", location.x);
    }
}
