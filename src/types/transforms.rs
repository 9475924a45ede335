//! Typed transformation matrices and the fixed model matrices
//!
//! Transforms carry their source and target spaces in the type, so an
//! observation matrix cannot be applied to a road state by accident. The
//! fixed matrices of the motion model (`O_g`, `O_r`, the coordinate swap `U`,
//! and the velocity extractors) are built here and shared by reference.

use ::core::marker::PhantomData;
use nalgebra::allocator::Allocator;
use nalgebra::{Const, DefaultAllocator, DimDiff, DimSub, SMatrix, U1};

use super::spaces::{GroundSpace, ObsSpace, RoadSpace, Vector};
use super::svd::SvdCovariance;

// ============================================================================
// Transform
// ============================================================================

/// A linear map from `From`-space vectors to `To`-space vectors.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Transform<const ROWS: usize, const COLS: usize, To, From> {
    inner: SMatrix<f64, ROWS, COLS>,
    _marker: PhantomData<(To, From)>,
}

impl<const ROWS: usize, const COLS: usize, To, From> Transform<ROWS, COLS, To, From> {
    /// Creates a transform from a raw matrix.
    #[inline]
    pub fn from_matrix(inner: SMatrix<f64, ROWS, COLS>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns a reference to the underlying matrix.
    #[inline]
    pub fn as_matrix(&self) -> &SMatrix<f64, ROWS, COLS> {
        &self.inner
    }

    /// The transpose, mapping in the opposite direction.
    #[inline]
    pub fn transpose(&self) -> Transform<COLS, ROWS, From, To> {
        Transform {
            inner: self.inner.transpose(),
            _marker: PhantomData,
        }
    }

    /// Applies the transform to a vector.
    #[inline]
    pub fn apply(&self, v: &Vector<COLS, From>) -> Vector<ROWS, To> {
        Vector::from_svector(self.inner * v.as_svector())
    }

    /// Propagates a covariance: `M · C · Mᵀ`, staying in factored form.
    #[inline]
    pub fn propagate(&self, cov: &SvdCovariance<COLS>) -> SvdCovariance<ROWS>
    where
        Const<ROWS>: DimSub<U1>,
        DefaultAllocator: Allocator<DimDiff<Const<ROWS>, U1>>,
    {
        cov.transform(&self.inner)
    }
}

// ============================================================================
// Type Aliases
// ============================================================================

/// Ground-model transition matrix: `GroundSpace -> GroundSpace`.
pub type GroundTransition = Transform<4, 4, GroundSpace, GroundSpace>;

/// Road-model transition matrix: `RoadSpace -> RoadSpace`.
pub type RoadTransition = Transform<2, 2, RoadSpace, RoadSpace>;

/// Ground observation matrix `O_g`: extracts the planar position.
pub type GroundObservation = Transform<2, 4, ObsSpace, GroundSpace>;

/// Road observation matrix `O_r`: extracts the arc-length.
pub type RoadObservation = Transform<1, 2, ObsSpace, RoadSpace>;

/// Per-segment projection matrix `P`: lifts road states onto the plane.
pub type RoadToGround = Transform<4, 2, GroundSpace, RoadSpace>;

// ============================================================================
// Fixed model matrices
// ============================================================================

/// `O_g = [[1,0,0,0],[0,0,1,0]]`: planar position from a ground state.
pub fn ground_observation() -> GroundObservation {
    Transform::from_matrix(nalgebra::matrix![
        1.0, 0.0, 0.0, 0.0;
        0.0, 0.0, 1.0, 0.0
    ])
}

/// `O_r = [[1, 0]]`: arc-length from a road state.
pub fn road_observation() -> RoadObservation {
    Transform::from_matrix(nalgebra::matrix![1.0, 0.0])
}

/// The permutation `U` mapping stacked `(x, y, vx, vy)` coordinates into the
/// interleaved ground ordering `(x, vx, y, vy)`.
pub fn coordinate_swap() -> SMatrix<f64, 4, 4> {
    nalgebra::matrix![
        1.0, 0.0, 0.0, 0.0;
        0.0, 0.0, 1.0, 0.0;
        0.0, 1.0, 0.0, 0.0;
        0.0, 0.0, 0.0, 1.0
    ]
}

/// `V_g`: the planar velocity pair from a ground state.
pub fn ground_velocity() -> SMatrix<f64, 2, 4> {
    nalgebra::matrix![
        0.0, 1.0, 0.0, 0.0;
        0.0, 0.0, 0.0, 1.0
    ]
}

/// `V_r`: the scalar velocity from a road state.
pub fn road_velocity() -> SMatrix<f64, 1, 2> {
    nalgebra::matrix![0.0, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::spaces::GroundState;

    #[test]
    fn test_ground_observation_extracts_position() {
        let state = GroundState::from_array([10.0, 1.0, 20.0, 2.0]);
        let obs = ground_observation().apply(&state);
        assert_eq!(obs.index(0), 10.0);
        assert_eq!(obs.index(1), 20.0);
    }

    #[test]
    fn test_coordinate_swap_is_involution() {
        let u = coordinate_swap();
        assert!((u * u - SMatrix::<f64, 4, 4>::identity()).norm() < 1e-15);
    }

    #[test]
    fn test_velocity_extractors() {
        let state = GroundState::from_array([0.0, 3.0, 0.0, 4.0]);
        let v = ground_velocity() * state.as_svector();
        assert_eq!(v[0], 3.0);
        assert_eq!(v[1], 4.0);
        assert!((v.norm() - 5.0).abs() < 1e-12);
    }
}
