//! SVD-factored covariance matrices
//!
//! Covariances are stored as the factor triple `C = U · S · Vᵀ` and propagated
//! through linear maps without ever forming an unsymmetric intermediate, so
//! the result of `M · C · Mᵀ` is symmetric positive semi-definite by
//! construction rather than by luck. Repeated ground/road projections would
//! otherwise walk a covariance out of the PSD cone one rounding error at a
//! time.

use nalgebra::allocator::Allocator;
use nalgebra::{Const, DefaultAllocator, DimDiff, DimSub, SMatrix, SVector, U1};

/// Singular values below this threshold are treated as zero when factors are
/// square-rooted or squared.
pub const SVD_FLOOR: f64 = 1e-7;

// ============================================================================
// SvdCovariance
// ============================================================================

/// A covariance matrix carried as its singular value decomposition.
///
/// For the symmetric PSD matrices produced by this library `U == Vᵀᵀ`, but the
/// triple is kept in full so the factor algebra reads the same as the
/// projection rule it implements.
#[derive(Debug, Clone, PartialEq)]
pub struct SvdCovariance<const N: usize> {
    u: SMatrix<f64, N, N>,
    s: SVector<f64, N>,
    vt: SMatrix<f64, N, N>,
}

impl<const N: usize> SvdCovariance<N> {
    /// Builds the factored form of a symmetric matrix.
    ///
    /// Eigenvalues below zero are clamped to zero, so the result is the
    /// nearest PSD matrix in the spectral sense.
    pub fn from_full(full: SMatrix<f64, N, N>) -> Self
    where
        Const<N>: DimSub<U1>,
        DefaultAllocator: Allocator<DimDiff<Const<N>, U1>>,
    {
        let sym = (full + full.transpose()).scale(0.5);
        let eigen = sym.symmetric_eigen();
        let mut s = eigen.eigenvalues;
        for v in s.iter_mut() {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
        let u = eigen.eigenvectors;
        Self {
            u,
            s,
            vt: u.transpose(),
        }
    }

    /// A diagonal covariance.
    pub fn from_diagonal(diag: &SVector<f64, N>) -> Self {
        Self {
            u: SMatrix::identity(),
            s: *diag,
            vt: SMatrix::identity(),
        }
    }

    /// The zero covariance.
    pub fn zeros() -> Self {
        Self::from_diagonal(&SVector::zeros())
    }

    /// The identity covariance.
    pub fn identity() -> Self {
        Self::from_diagonal(&SVector::repeat(1.0))
    }

    /// Reassembles the full matrix `U · S · Vᵀ`.
    pub fn as_full(&self) -> SMatrix<f64, N, N> {
        self.u * SMatrix::from_diagonal(&self.s) * self.vt
    }

    /// The left singular factor.
    #[inline]
    pub fn u(&self) -> &SMatrix<f64, N, N> {
        &self.u
    }

    /// The singular values.
    #[inline]
    pub fn singular_values(&self) -> &SVector<f64, N> {
        &self.s
    }

    /// The right factor `Vᵀ`.
    #[inline]
    pub fn vt(&self) -> &SMatrix<f64, N, N> {
        &self.vt
    }

    /// Number of singular values above [`SVD_FLOOR`].
    pub fn rank(&self) -> usize {
        self.s.iter().filter(|v| **v > SVD_FLOOR).count()
    }

    /// Sum of singular values (equals the trace for PSD matrices).
    pub fn trace(&self) -> f64 {
        self.s.sum()
    }

    /// True when every singular value is effectively zero.
    pub fn is_zero(&self) -> bool {
        self.s.iter().all(|v| v.abs() <= SVD_FLOOR)
    }

    /// Frobenius norm, computable from the singular values alone.
    pub fn norm_frobenius(&self) -> f64 {
        self.s.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// The clipped square-root factor `diag(√S) · Vᵀ`, a matrix `R` with
    /// `Rᵀ·R = C`. Used for sampling and for the projection rule.
    pub fn sqrt_factor(&self) -> SMatrix<f64, N, N> {
        SMatrix::from_diagonal(&diagonal_sqrt(&self.s)) * self.vt
    }

    /// Propagates this covariance through a linear map: `M · C · Mᵀ`.
    ///
    /// The factor route: `B = diag(√S) · Vᵀ · Mᵀ`, result `Bᵀ·B` re-factored.
    /// `Bᵀ·B` is exactly symmetric, so the refactoring recovers the same
    /// `V, S²` pair an SVD of `B` would.
    pub fn transform<const M: usize>(&self, m: &SMatrix<f64, M, N>) -> SvdCovariance<M>
    where
        Const<M>: DimSub<U1>,
        DefaultAllocator: Allocator<DimDiff<Const<M>, U1>>,
    {
        let diag_sqrt: SVector<f64, N> = diagonal_sqrt(&self.s);
        let d = SMatrix::<f64, N, N>::from_diagonal(&diag_sqrt);
        let dv: SMatrix<f64, N, N> = d * self.vt;
        let b: SMatrix<f64, N, M> = dv * m.transpose();
        SvdCovariance::from_full(b.transpose() * b)
    }

    /// Sum of two covariances, refactored.
    pub fn add(&self, other: &Self) -> Self
    where
        Const<N>: DimSub<U1>,
        DefaultAllocator: Allocator<DimDiff<Const<N>, U1>>,
    {
        Self::from_full(self.as_full() + other.as_full())
    }

    /// Scales the covariance by a nonnegative factor.
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            u: self.u,
            s: self.s.scale(factor),
            vt: self.vt,
        }
    }
}

impl SvdCovariance<2> {
    /// Expands a 2×2 covariance to 4×4 by placing it on the `(0..1, 0..1)`
    /// and `(2..3, 2..3)` blocks, preserving the factor structure.
    ///
    /// In ground ordering `[x, vx, y, vy]` this duplicates a per-axis
    /// `(position, velocity)` covariance onto both axes.
    pub fn block_double(&self) -> SvdCovariance<4> {
        let mut u = SMatrix::<f64, 4, 4>::zeros();
        u.fixed_view_mut::<2, 2>(0, 0).copy_from(&self.u);
        u.fixed_view_mut::<2, 2>(2, 2).copy_from(&self.u);

        let mut vt = SMatrix::<f64, 4, 4>::zeros();
        vt.fixed_view_mut::<2, 2>(0, 0).copy_from(&self.vt);
        vt.fixed_view_mut::<2, 2>(2, 2).copy_from(&self.vt);

        let s = SVector::<f64, 4>::from([self.s[0], self.s[1], self.s[0], self.s[1]]);

        SvdCovariance { u, s, vt }
    }
}

// ============================================================================
// Diagonal helpers
// ============================================================================

/// Element-wise square root of a nonnegative diagonal, with entries whose
/// roots fall below [`SVD_FLOOR`] zeroed out.
pub fn diagonal_sqrt<const N: usize>(diag: &SVector<f64, N>) -> SVector<f64, N> {
    diag.map(|v| {
        let r = v.abs().sqrt();
        if r < SVD_FLOOR {
            0.0
        } else {
            r
        }
    })
}

/// True when the symmetric part of `m` has no eigenvalue below `-tolerance`.
pub fn is_pos_semidefinite<const N: usize>(m: &SMatrix<f64, N, N>, tolerance: f64) -> bool
where
    Const<N>: DimSub<U1>,
    DefaultAllocator: Allocator<DimDiff<Const<N>, U1>>,
{
    let sym = (m + m.transpose()).scale(0.5);
    sym.symmetric_eigen()
        .eigenvalues
        .iter()
        .all(|v| *v >= -tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{matrix, vector};

    #[test]
    fn test_roundtrip_full() {
        let full = matrix![4.0, 1.0; 1.0, 3.0];
        let svd = SvdCovariance::from_full(full);
        let back = svd.as_full();
        assert!((back - full).norm() < 1e-12);
    }

    #[test]
    fn test_negative_eigenvalue_clamped() {
        // Indefinite input: eigenvalues 2 and -1
        let full = matrix![0.5, 1.5; 1.5, 0.5];
        let svd = SvdCovariance::from_full(full);
        assert!(svd.singular_values().iter().all(|v| *v >= 0.0));
        assert!(is_pos_semidefinite(&svd.as_full(), SVD_FLOOR));
    }

    #[test]
    fn test_transform_matches_direct_product() {
        let c = SvdCovariance::from_full(matrix![2.0, 0.5; 0.5, 1.0]);
        let m = matrix![1.0, 2.0; 0.0, 1.0; 3.0, 0.0];

        let direct = m * c.as_full() * m.transpose();
        let factored = c.transform(&m).as_full();

        assert!((direct - factored).norm() < 1e-10);
        assert!(is_pos_semidefinite(&factored, SVD_FLOOR));
    }

    #[test]
    fn test_transform_rank_deficient() {
        // Projecting a 2x2 up to 3x3 yields a rank-2 result.
        let c = SvdCovariance::from_diagonal(&vector![1.0, 4.0]);
        let m = matrix![1.0, 0.0; 0.0, 1.0; 1.0, 1.0];
        let projected = c.transform(&m);
        assert_eq!(projected.rank(), 2);
    }

    #[test]
    fn test_block_double() {
        let c = SvdCovariance::from_full(matrix![3.0, 1.0; 1.0, 2.0]);
        let doubled = c.block_double().as_full();

        let full = c.as_full();
        for i in 0..2 {
            for j in 0..2 {
                assert!((doubled[(i, j)] - full[(i, j)]).abs() < 1e-12);
                assert!((doubled[(i + 2, j + 2)] - full[(i, j)]).abs() < 1e-12);
                assert!(doubled[(i, j + 2)].abs() < 1e-12);
                assert!(doubled[(i + 2, j)].abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_diagonal_sqrt_clipping() {
        let d = vector![4.0, 1e-20, 0.0];
        let r = diagonal_sqrt(&d);
        assert!((r[0] - 2.0).abs() < 1e-12);
        assert_eq!(r[1], 0.0);
        assert_eq!(r[2], 0.0);
    }

    #[test]
    fn test_sqrt_factor_reconstructs() {
        let c = SvdCovariance::from_full(matrix![5.0, 2.0; 2.0, 3.0]);
        let r = c.sqrt_factor();
        assert!((r.transpose() * r - c.as_full()).norm() < 1e-10);
    }
}
