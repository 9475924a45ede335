//! The dual ground/road motion model
//!
//! One estimator per time step: both filters are rebuilt around the step's
//! `Δt`, with process noise shaped by the covariance factor `F(Δt)` so that a
//! single acceleration-noise parameter scales consistently across step
//! sizes. Road-mode measurement goes the long way around — lift to ground,
//! fold in the observation, project back — because observations live in the
//! plane, not on the path.

use nalgebra::allocator::Allocator;
use nalgebra::{Const, DefaultAllocator, DimDiff, DimSub, SMatrix, SVector, U1};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::models::observation::GpsObservation;
use crate::paths::projection::{ground_belief_from_road, road_belief_from_ground};
use crate::paths::{PathState, PathStateBelief};
use crate::types::gaussian::{GaussianBelief, TruncatedGaussian};
use crate::types::spaces::{GroundSpace, GroundState, ObsSpace, RoadState};
use crate::types::svd::{diagonal_sqrt, SvdCovariance, SVD_FLOOR};
use crate::types::transforms::{ground_observation, road_observation};
use crate::{Result, TrackingError};

use super::kalman::SvdKalmanFilter;

/// Fixed road-measurement error `diag(50, 0)`: the position component models
/// inaccuracy in the mapped edge geometry, the velocity component is zero
/// because velocity is never measured directly on-road.
pub fn road_measurement_error() -> SvdCovariance<2> {
    SvdCovariance::from_diagonal(&nalgebra::vector![50.0, 0.0])
}

// ============================================================================
// Model matrices
// ============================================================================

/// Ground transition `A_g(Δt)`: identity with `A[0,1] = A[2,3] = Δt`.
pub fn ground_transition_matrix(dt: f64) -> SMatrix<f64, 4, 4> {
    let mut a = SMatrix::identity();
    a[(0, 1)] = dt;
    a[(2, 3)] = dt;
    a
}

/// Road transition `A_r(Δt)`: identity with `A[0,1] = Δt`.
pub fn road_transition_matrix(dt: f64) -> SMatrix<f64, 2, 2> {
    let mut a = SMatrix::identity();
    a[(0, 1)] = dt;
    a
}

/// Ground covariance factor `F_g(Δt)` mapping 2-D acceleration noise into
/// the 4-D state.
pub fn ground_covariance_factor(dt: f64) -> SMatrix<f64, 4, 2> {
    nalgebra::matrix![
        dt * dt / 2.0, 0.0;
        dt, 0.0;
        0.0, dt * dt / 2.0;
        0.0, dt
    ]
}

/// Road covariance factor `F_r(Δt)` mapping scalar acceleration noise into
/// the 2-D state.
pub fn road_covariance_factor(dt: f64) -> SMatrix<f64, 2, 1> {
    nalgebra::matrix![
        dt * dt / 2.0;
        dt
    ]
}

/// Left inverse of [`ground_covariance_factor`], recovering acceleration
/// noise from a state residual.
pub fn ground_covariance_factor_left_inv(dt: f64) -> SMatrix<f64, 2, 4> {
    nalgebra::matrix![
        1.0 / (dt * dt), 1.0 / (2.0 * dt), 0.0, 0.0;
        0.0, 0.0, 1.0 / (dt * dt), 1.0 / (2.0 * dt)
    ]
}

/// Left inverse of [`road_covariance_factor`].
pub fn road_covariance_factor_left_inv(dt: f64) -> SMatrix<f64, 1, 2> {
    nalgebra::matrix![1.0 / (dt * dt), 1.0 / (2.0 * dt)]
}

/// Process covariance `F·√Q·(F·√Q)ᵀ` in factored form. `Q` is read as a
/// diagonal (off-diagonal mass is ignored, matching the diagonal noise
/// parameterization of the learners).
fn state_covariance<const N: usize, const K: usize>(
    factor: &SMatrix<f64, N, K>,
    q: &SMatrix<f64, K, K>,
) -> SvdCovariance<N>
where
    Const<N>: DimSub<U1>,
    DefaultAllocator: Allocator<DimDiff<Const<N>, U1>>,
{
    let diag_sqrt: SVector<f64, K> = diagonal_sqrt(&q.diagonal());
    let sq = SMatrix::<f64, K, K>::from_diagonal(&diag_sqrt);
    let b: SMatrix<f64, N, K> = factor * sq;
    SvdCovariance::from_full(b * b.transpose())
}

// ============================================================================
// MotionEstimator
// ============================================================================

/// The two linear dynamical systems of one time step.
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    dt: f64,
    ground_filter: SvdKalmanFilter<4, 2>,
    road_filter: SvdKalmanFilter<2, 1>,
    off_road_q: SvdCovariance<2>,
}

impl MotionEstimator {
    /// Builds both filters for a time step.
    ///
    /// `off_road_q` is the 2-D ground acceleration-noise covariance,
    /// `on_road_q` the scalar road acceleration noise, `observation_cov` the
    /// current GPS error estimate.
    pub fn new(
        dt: f64,
        off_road_q: &SMatrix<f64, 2, 2>,
        on_road_q: &SMatrix<f64, 1, 1>,
        observation_cov: &SvdCovariance<2>,
    ) -> Result<Self> {
        if dt <= 0.0 {
            return Err(TrackingError::Contract(format!(
                "motion estimator needs a positive time delta, got {dt}"
            )));
        }

        let ground_filter = SvdKalmanFilter::new(
            ground_transition_matrix(dt),
            *ground_observation().as_matrix(),
            state_covariance(&ground_covariance_factor(dt), off_road_q),
            observation_cov.clone(),
        );

        let or = road_observation();
        let road_meas = road_measurement_error().transform(or.as_matrix());
        let road_filter = SvdKalmanFilter::new(
            road_transition_matrix(dt),
            *or.as_matrix(),
            state_covariance(&road_covariance_factor(dt), on_road_q),
            road_meas,
        );

        Ok(Self {
            dt,
            ground_filter,
            road_filter,
            off_road_q: SvdCovariance::from_full(*off_road_q),
        })
    }

    #[inline]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    #[inline]
    pub fn ground_filter(&self) -> &SvdKalmanFilter<4, 2> {
        &self.ground_filter
    }

    #[inline]
    pub fn road_filter(&self) -> &SvdKalmanFilter<2, 1> {
        &self.road_filter
    }

    /// The initial ground belief for a first observation: position centered
    /// on the fix perturbed by observation noise, velocity seeded from the
    /// previous fix when one is linked.
    pub fn initial_ground_belief<R: Rng + ?Sized>(
        &self,
        obs: &GpsObservation,
        rng: &mut R,
    ) -> GaussianBelief<4, GroundSpace> {
        let mut belief: GaussianBelief<4, GroundSpace> = self.ground_filter.create_initial();

        let mut z = SVector::<f64, 2>::zeros();
        for v in z.iter_mut() {
            *v = StandardNormal.sample(rng);
        }
        let noise = self
            .ground_filter
            .measurement_noise()
            .sqrt_factor()
            .transpose()
            * z;

        let projected = obs.projected_point();
        belief.mean.set_index(0, projected.index(0) + noise[0]);
        belief.mean.set_index(2, projected.index(1) + noise[1]);

        if let Some(prev) = obs.previous_observation() {
            let dt = obs.timestamp() - prev.timestamp();
            if dt > 0.0 {
                let diff = projected.clone() - prev.projected_point().clone();
                belief.mean.set_index(1, diff.index(0) / dt);
                belief.mean.set_index(3, diff.index(1) / dt);
            }
        }

        belief
    }

    /// Prediction in the belief's own regime, with arc-length truncation for
    /// road beliefs: a predicted mean below the path start is pinned to zero
    /// with the variance of the `[0, ∞)`-truncated Gaussian, one beyond the
    /// path end is clamped to the end.
    pub fn predict(&self, belief: &PathStateBelief) -> Result<PathStateBelief> {
        match belief {
            PathStateBelief::Ground(ground) => {
                Ok(PathStateBelief::Ground(self.ground_filter.predict(ground)))
            }
            PathStateBelief::OnRoad { path, belief } => {
                let mut predicted = self.road_filter.predict(belief);

                let sign = path.direction_sign();
                let along = sign * predicted.mean.index(0);
                let total = path.total_path_distance().abs();

                if along < 0.0 {
                    let variance = predicted.covariance.as_full()[(0, 0)];
                    if variance > SVD_FLOOR {
                        let truncated = TruncatedGaussian::new(along, variance, 0.0);
                        let mut full = predicted.covariance.as_full();
                        full[(0, 0)] = truncated.truncated_variance();
                        predicted.covariance = SvdCovariance::from_full(full);
                    }
                    predicted.mean.set_index(0, 0.0);
                } else if along > total {
                    predicted.mean.set_index(0, sign * total);
                }

                Ok(PathStateBelief::on_road(path.clone(), predicted))
            }
        }
    }

    /// Measurement against a projected GPS position.
    ///
    /// Road beliefs are lifted to ground, measured there, and projected back
    /// onto their path.
    pub fn measure(
        &self,
        belief: &PathStateBelief,
        observation: &crate::types::spaces::ObsVector,
    ) -> Result<PathStateBelief> {
        match belief {
            PathStateBelief::Ground(ground) => {
                let updated = self.ground_filter.measure(ground, observation)?;
                Ok(PathStateBelief::Ground(updated))
            }
            PathStateBelief::OnRoad { path, belief } => {
                let edge = path.edge_for_distance(belief.mean.index(0));
                let ground = ground_belief_from_road(belief, edge, false, false)?;
                let updated = self.ground_filter.measure(&ground, observation)?;
                let road = road_belief_from_ground(
                    &updated,
                    path.geometry(),
                    path.is_backward(),
                    None,
                    false,
                    None,
                    None,
                )?;
                Ok(PathStateBelief::on_road(path.clone(), road))
            }
        }
    }

    /// The measurement distribution of a belief in observation space:
    /// `N(O_g·μ, O_g·Σ·O_gᵀ + Q_obs)`.
    pub fn observation_distribution(
        &self,
        belief: &PathStateBelief,
    ) -> Result<GaussianBelief<2, ObsSpace>> {
        let ground = belief.ground_belief()?;
        let og = ground_observation();

        let mean = og.apply(&ground.mean);
        let covariance = ground
            .covariance
            .transform(og.as_matrix())
            .add(self.ground_filter.measurement_noise());

        Ok(GaussianBelief::new(mean, covariance))
    }

    /// Adds a sample of the state-transition noise to a state.
    ///
    /// Ground states receive `F_g·q`, `q ~ N(0, Q)`. Road states sample from
    /// the truncated road Gaussian lower-bounded at the current arc-length,
    /// so the sampled state never backs up the path.
    pub fn sample_state_transition_error<R: Rng + ?Sized>(
        &self,
        state: &PathState,
        rng: &mut R,
    ) -> PathState {
        match state {
            PathState::Ground(ground) => {
                if self.off_road_q.is_zero() {
                    return state.clone();
                }
                let mut z = SVector::<f64, 2>::zeros();
                for v in z.iter_mut() {
                    *v = StandardNormal.sample(rng);
                }
                let q_sample = self.off_road_q.sqrt_factor().transpose() * z;
                let error = ground_covariance_factor(self.dt) * q_sample;
                PathState::Ground(GroundState::from_svector(ground.as_svector() + error))
            }
            PathState::OnRoad { path, state } => {
                let sigma = self.road_filter.process_noise().as_full();
                if sigma.norm() <= SVD_FLOOR {
                    return PathState::OnRoad {
                        path: path.clone(),
                        state: state.clone(),
                    };
                }

                let s = state.index(0);
                let v = state.index(1);

                // Sample velocity marginally, then arc-length conditionally,
                // truncated below the current position.
                let var_v = sigma[(1, 1)];
                let new_v = if var_v > SVD_FLOOR {
                    let z: f64 = StandardNormal.sample(rng);
                    v + var_v.sqrt() * z
                } else {
                    v
                };

                let (cond_mean, cond_var) = if var_v > SVD_FLOOR {
                    (
                        s + sigma[(0, 1)] / var_v * (new_v - v),
                        sigma[(0, 0)] - sigma[(0, 1)] * sigma[(0, 1)] / var_v,
                    )
                } else {
                    (s, sigma[(0, 0)])
                };

                let new_s = if cond_var > SVD_FLOOR {
                    TruncatedGaussian::new(cond_mean, cond_var, s).sample(rng)
                } else {
                    cond_mean.max(s)
                };

                PathState::on_road(path.clone(), RoadState::from_array([new_s, new_v]))
            }
        }
    }
}
