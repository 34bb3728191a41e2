//! Numerical primitives: least squares, HAC covariance, correlation.

pub mod ols;

pub use ols::*;
