//! Core types: space-marked vectors, SVD-factored covariances, Gaussians

pub mod gaussian;
pub mod spaces;
pub mod svd;
pub mod transforms;
