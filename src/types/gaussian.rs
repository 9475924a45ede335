//! Gaussian beliefs and the truncated road Gaussian
//!
//! A belief pairs a space-marked mean with an SVD-factored covariance. The
//! truncated Gaussian restricts the arc-length dimension of the road model to
//! a half-line, which is what keeps predicted road states from backing off
//! the start of their path.

use ::core::f64::consts::PI;
use nalgebra::SVector;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::spaces::Vector;
use super::svd::SvdCovariance;

// ============================================================================
// Gaussian Belief
// ============================================================================

/// A multivariate Gaussian over a marked vector space.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianBelief<const N: usize, Space> {
    /// Mean vector.
    pub mean: Vector<N, Space>,
    /// Covariance in factored form.
    pub covariance: SvdCovariance<N>,
}

impl<const N: usize, Space> GaussianBelief<N, Space> {
    /// Creates a belief from mean and covariance.
    #[inline]
    pub fn new(mean: Vector<N, Space>, covariance: SvdCovariance<N>) -> Self {
        Self { mean, covariance }
    }

    /// Log-density of `x` under this belief.
    ///
    /// Returns `None` when the covariance is singular (rank below `N`).
    pub fn log_density(&self, x: &Vector<N, Space>) -> Option<f64> {
        let full = self.covariance.as_full();
        let chol = nalgebra::Cholesky::new(full)?;
        let l = chol.l();

        let mut log_det_l = 0.0;
        for i in 0..N {
            let d = l[(i, i)];
            if d <= 0.0 {
                return None;
            }
            log_det_l += d.ln();
        }

        let z = x.as_svector() - self.mean.as_svector();
        let y = l.solve_lower_triangular(&z)?;
        let mahal_sq = y.norm_squared();

        let n = N as f64;
        Some(-0.5 * mahal_sq - log_det_l - 0.5 * n * (2.0 * PI).ln())
    }

    /// Draws a sample `mean + Rᵀ·z`, `z ~ N(0, I)`, where `Rᵀ·R` is the
    /// covariance. Works for rank-deficient covariances.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector<N, Space> {
        let mut z = SVector::<f64, N>::zeros();
        for v in z.iter_mut() {
            *v = StandardNormal.sample(rng);
        }
        let noise = self.covariance.sqrt_factor().transpose() * z;
        Vector::from_svector(self.mean.as_svector() + noise)
    }
}

// ============================================================================
// Scalar normal helpers
// ============================================================================

/// Standard normal density.
pub fn standard_normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

/// Standard normal CDF via the Abramowitz–Stegun 7.1.26 rational
/// approximation of erf (absolute error below 1.5e-7).
pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / core::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

// ============================================================================
// Truncated Gaussian
// ============================================================================

/// A univariate Gaussian restricted to the half-line `[lower, +∞)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TruncatedGaussian {
    /// Mean of the untruncated parent.
    pub location: f64,
    /// Variance of the untruncated parent.
    pub variance: f64,
    /// Lower truncation bound.
    pub lower: f64,
}

impl TruncatedGaussian {
    /// Creates a truncated Gaussian. `variance` must be positive.
    pub fn new(location: f64, variance: f64, lower: f64) -> Self {
        debug_assert!(variance > 0.0);
        Self {
            location,
            variance,
            lower,
        }
    }

    fn alpha(&self) -> f64 {
        (self.lower - self.location) / self.variance.sqrt()
    }

    /// Inverse Mills ratio `φ(α) / (1 − Φ(α))` at the truncation point.
    fn mills_ratio(&self) -> f64 {
        let alpha = self.alpha();
        let tail = 1.0 - standard_normal_cdf(alpha);
        if tail <= f64::MIN_POSITIVE {
            // Deep in the tail the ratio approaches alpha itself.
            alpha.max(0.0)
        } else {
            standard_normal_pdf(alpha) / tail
        }
    }

    /// Mean of the truncated distribution.
    pub fn mean(&self) -> f64 {
        self.location + self.variance.sqrt() * self.mills_ratio()
    }

    /// Variance of the truncated distribution.
    pub fn truncated_variance(&self) -> f64 {
        let alpha = self.alpha();
        let lambda = self.mills_ratio();
        let factor = 1.0 + alpha * lambda - lambda * lambda;
        (self.variance * factor).max(0.0)
    }

    /// Draws a sample above the bound.
    ///
    /// Plain rejection against the parent normal when the bound sits in the
    /// bulk; Robert's shifted-exponential proposal when it sits in the tail,
    /// where rejection would stall.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let sigma = self.variance.sqrt();
        let alpha = self.alpha();

        if alpha < 0.5 {
            loop {
                let z: f64 = StandardNormal.sample(rng);
                if z >= alpha {
                    return self.location + sigma * z;
                }
            }
        }

        let lambda = (alpha + (alpha * alpha + 4.0).sqrt()) / 2.0;
        loop {
            let e: f64 = rng.gen::<f64>();
            let z = alpha - e.ln() / lambda;
            let rho = (-(z - lambda) * (z - lambda) / 2.0).exp();
            if rng.gen::<f64>() <= rho {
                return self.location + sigma * z;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::spaces::ObsSpace;
    use nalgebra::{matrix, vector};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_log_density_peak() {
        let belief: GaussianBelief<2, ObsSpace> = GaussianBelief::new(
            Vector::from_array([1.0, 2.0]),
            SvdCovariance::from_diagonal(&vector![1.0, 1.0]),
        );

        let at_mean = belief.log_density(&Vector::from_array([1.0, 2.0])).unwrap();
        let away = belief.log_density(&Vector::from_array([3.0, 2.0])).unwrap();
        assert!(at_mean > away);
        // log N(0; I) in 2d = -log(2*pi)
        assert!((at_mean + (2.0 * PI).ln()).abs() < 1e-10);
    }

    #[test]
    fn test_singular_covariance_density() {
        let belief: GaussianBelief<2, ObsSpace> = GaussianBelief::new(
            Vector::from_array([0.0, 0.0]),
            SvdCovariance::from_diagonal(&vector![1.0, 0.0]),
        );
        assert!(belief.log_density(&Vector::from_array([0.0, 0.0])).is_none());
    }

    #[test]
    fn test_sample_statistics() {
        let belief: GaussianBelief<2, ObsSpace> = GaussianBelief::new(
            Vector::from_array([5.0, -3.0]),
            SvdCovariance::from_full(matrix![2.0, 0.3; 0.3, 1.0]),
        );

        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mut mean = [0.0; 2];
        for _ in 0..n {
            let s = belief.sample(&mut rng);
            mean[0] += s.index(0);
            mean[1] += s.index(1);
        }
        mean[0] /= n as f64;
        mean[1] /= n as f64;

        assert!((mean[0] - 5.0).abs() < 0.05);
        assert!((mean[1] + 3.0).abs() < 0.05);
    }

    #[test]
    fn test_normal_cdf_reference_values() {
        assert!((standard_normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((standard_normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((standard_normal_cdf(-3.0) - 0.00135).abs() < 1e-4);
    }

    #[test]
    fn test_truncated_moments_unconstrained_limit() {
        // Bound far below the mass: moments match the parent.
        let t = TruncatedGaussian::new(10.0, 4.0, -100.0);
        assert!((t.mean() - 10.0).abs() < 1e-6);
        assert!((t.truncated_variance() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_truncated_moments_at_bound() {
        // Bound exactly at the parent mean: half-normal moments.
        let t = TruncatedGaussian::new(0.0, 1.0, 0.0);
        let expected_mean = (2.0 / PI).sqrt();
        assert!((t.mean() - expected_mean).abs() < 1e-6);
        assert!((t.truncated_variance() - (1.0 - 2.0 / PI)).abs() < 1e-6);
    }

    #[test]
    fn test_samples_respect_bound() {
        let t = TruncatedGaussian::new(-4.8, 1.0, 0.0);
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..1000 {
            assert!(t.sample(&mut rng) >= 0.0);
        }
    }
}
