//! Linear-Gaussian filter over SVD-factored covariances
//!
//! A plain discrete-time Kalman filter, except that covariances stay in
//! factored form: the predict step propagates through the SVD rule and the
//! measurement step re-factors its result, failing loudly when the update
//! leaves the PSD cone instead of silently carrying a broken covariance
//! forward.

use nalgebra::allocator::Allocator;
use nalgebra::{Const, DefaultAllocator, DimDiff, DimSub, SMatrix, U1};

use crate::types::gaussian::GaussianBelief;
use crate::types::spaces::Vector;
use crate::types::svd::{is_pos_semidefinite, SvdCovariance, SVD_FLOOR};
use crate::{Result, TrackingError};

/// A discrete-time linear-Gaussian filter with fixed matrices.
///
/// Built fresh for each time step; the transition and noise matrices embed
/// the step's `Δt`.
#[derive(Debug, Clone)]
pub struct SvdKalmanFilter<const N: usize, const M: usize> {
    transition: SMatrix<f64, N, N>,
    observation: SMatrix<f64, M, N>,
    process_noise: SvdCovariance<N>,
    measurement_noise: SvdCovariance<M>,
}

impl<const N: usize, const M: usize> SvdKalmanFilter<N, M>
where
    Const<N>: DimSub<U1>,
    DefaultAllocator: Allocator<DimDiff<Const<N>, U1>>,
{
    pub fn new(
        transition: SMatrix<f64, N, N>,
        observation: SMatrix<f64, M, N>,
        process_noise: SvdCovariance<N>,
        measurement_noise: SvdCovariance<M>,
    ) -> Self {
        Self {
            transition,
            observation,
            process_noise,
            measurement_noise,
        }
    }

    #[inline]
    pub fn transition(&self) -> &SMatrix<f64, N, N> {
        &self.transition
    }

    #[inline]
    pub fn observation(&self) -> &SMatrix<f64, M, N> {
        &self.observation
    }

    #[inline]
    pub fn process_noise(&self) -> &SvdCovariance<N> {
        &self.process_noise
    }

    #[inline]
    pub fn measurement_noise(&self) -> &SvdCovariance<M> {
        &self.measurement_noise
    }

    /// The uninformed initial belief: zero mean under the process noise.
    pub fn create_initial<S>(&self) -> GaussianBelief<N, S> {
        GaussianBelief::new(Vector::zeros(), self.process_noise.clone())
    }

    /// Prediction: `x ← A·x`, `C ← A·C·Aᵀ + Q`.
    pub fn predict<S>(&self, belief: &GaussianBelief<N, S>) -> GaussianBelief<N, S> {
        let mean = Vector::from_svector(self.transition * belief.mean.as_svector());
        let covariance = belief
            .covariance
            .transform(&self.transition)
            .add(&self.process_noise);
        GaussianBelief::new(mean, covariance)
    }

    /// Measurement update against an observation in measurement space.
    ///
    /// Joseph-form covariance update, re-factored afterwards. Fails with a
    /// numeric error when the innovation covariance cannot be inverted, when
    /// the update leaves the PSD cone, or when the state goes NaN.
    pub fn measure<S, OS>(
        &self,
        belief: &GaussianBelief<N, S>,
        observation: &Vector<M, OS>,
    ) -> Result<GaussianBelief<N, S>> {
        let c = belief.covariance.as_full();
        let h = &self.observation;
        let r = self.measurement_noise.as_full();

        // Innovation and its covariance: S = H·C·Hᵀ + R.
        let innovation = observation.as_svector() - h * belief.mean.as_svector();
        let s = h * c * h.transpose() + r;

        let s_inv = s.try_inverse().ok_or_else(|| {
            TrackingError::Numeric("singular innovation covariance".to_string())
        })?;

        // Gain: K = C·Hᵀ·S⁻¹.
        let k = c * h.transpose() * s_inv;

        let mean = Vector::from_svector(belief.mean.as_svector() + k * innovation);
        if mean.has_nan() {
            return Err(TrackingError::Numeric(
                "measurement update produced NaN state".to_string(),
            ));
        }

        // Joseph form: (I−KH)·C·(I−KH)ᵀ + K·R·Kᵀ.
        let i_kh = SMatrix::<f64, N, N>::identity() - k * h;
        let updated = i_kh * c * i_kh.transpose() + k * r * k.transpose();

        if !is_pos_semidefinite(&updated, SVD_FLOOR) {
            return Err(TrackingError::Numeric(
                "measurement update left the PSD cone".to_string(),
            ));
        }

        Ok(GaussianBelief::new(mean, SvdCovariance::from_full(updated)))
    }
}
