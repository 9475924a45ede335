//! Conjugate covariance learners
//!
//! Observation noise is learned with a scaled inverse-gamma prior over an
//! isotropic covariance; process noise with inverse-Wishart priors over the
//! ground (2×2) and road (1×1) noise blocks. Both update in closed form from
//! per-step residuals.

use nalgebra::{SMatrix, SVector};
use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::types::svd::SvdCovariance;

// ============================================================================
// Scaled inverse-gamma
// ============================================================================

/// Inverse-gamma prior over the scale of an isotropic covariance `α·I`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledInverseGamma {
    shape: f64,
    scale: f64,
}

impl ScaledInverseGamma {
    /// Creates the prior. Both parameters must be positive.
    pub fn new(shape: f64, scale: f64) -> Self {
        assert!(shape > 0.0 && scale > 0.0);
        Self { shape, scale }
    }

    /// The default observation-covariance prior: mean scale 1.
    pub fn default_observation_prior() -> Self {
        Self::new(2.0, 1.0)
    }

    #[inline]
    pub fn shape(&self) -> f64 {
        self.shape
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Posterior mean of the scalar variance, `scale / (shape − 1)`.
    pub fn mean_scalar(&self) -> f64 {
        self.scale / (self.shape - 1.0)
    }

    /// Posterior-mean isotropic covariance.
    pub fn mean_covariance<const N: usize>(&self) -> SvdCovariance<N> {
        SvdCovariance::from_diagonal(&SVector::repeat(self.mean_scalar()))
    }

    /// Conjugate update from an observation-error vector:
    /// `shape += 1/2`, `scale += ‖e‖²/2`.
    pub fn update<const N: usize>(&mut self, error: &SVector<f64, N>) {
        self.shape += 0.5;
        self.scale += 0.5 * error.norm_squared();
    }

    /// Draws a variance sample (inverse of a gamma draw).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let gamma = Gamma::new(self.shape, 1.0 / self.scale).expect("valid gamma parameters");
        1.0 / gamma.sample(rng)
    }
}

// ============================================================================
// Inverse-Wishart
// ============================================================================

/// Inverse-Wishart prior over an `N×N` process-noise covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseWishart<const N: usize> {
    scale: SMatrix<f64, N, N>,
    dof: f64,
}

impl<const N: usize> InverseWishart<N> {
    /// Creates the prior; `dof` must exceed `N + 1` for the mean to exist.
    pub fn new(scale: SMatrix<f64, N, N>, dof: f64) -> Self {
        assert!(dof > N as f64 + 1.0, "dof must exceed N + 1");
        Self { scale, dof }
    }

    /// A prior centered on the given covariance with the smallest integer
    /// dof giving that mean.
    pub fn centered_on(mean: SMatrix<f64, N, N>) -> Self {
        let dof = N as f64 + 3.0;
        Self {
            scale: mean.scale(dof - N as f64 - 1.0),
            dof,
        }
    }

    #[inline]
    pub fn dof(&self) -> f64 {
        self.dof
    }

    #[inline]
    pub fn scale(&self) -> &SMatrix<f64, N, N> {
        &self.scale
    }

    /// Posterior mean `scale / (dof − N − 1)`.
    pub fn mean(&self) -> SMatrix<f64, N, N> {
        self.scale.scale(1.0 / (self.dof - N as f64 - 1.0))
    }

    /// Conjugate update from a state-transition residual in noise space:
    /// `dof += 1`, `scale += r·rᵀ`.
    pub fn update(&mut self, residual: &SVector<f64, N>) {
        self.dof += 1.0;
        self.scale += residual * residual.transpose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{matrix, vector};

    #[test]
    fn test_default_observation_prior_mean() {
        let prior = ScaledInverseGamma::default_observation_prior();
        assert!((prior.mean_scalar() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_gamma_update() {
        let mut prior = ScaledInverseGamma::new(2.0, 1.0);
        prior.update(&vector![3.0, 4.0]);
        assert!((prior.shape() - 2.5).abs() < 1e-12);
        assert!((prior.scale() - 13.5).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_updates_track_error_scale() {
        // Feeding errors of a constant magnitude drives the mean toward
        // ~ ||e||^2 / 2 per half-count.
        let mut prior = ScaledInverseGamma::new(2.0, 1.0);
        for _ in 0..1000 {
            prior.update(&vector![2.0, 0.0]);
        }
        // shape ~ 502, scale ~ 2001: mean ~ 4.0 = per-axis variance * dim.
        assert!((prior.mean_scalar() - 4.0).abs() < 0.1);
    }

    #[test]
    fn test_inverse_wishart_mean() {
        let prior = InverseWishart::<2>::centered_on(matrix![2.0, 0.0; 0.0, 0.5]);
        let mean = prior.mean();
        assert!((mean[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((mean[(1, 1)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_wishart_update() {
        let mut prior = InverseWishart::<1>::centered_on(matrix![1.0]);
        let before = prior.mean()[(0, 0)];
        for _ in 0..500 {
            prior.update(&vector![3.0]);
        }
        let after = prior.mean()[(0, 0)];
        // Residuals of variance 9 pull the mean upward.
        assert!(after > before);
        assert!((after - 9.0).abs() < 0.5);
    }
}
