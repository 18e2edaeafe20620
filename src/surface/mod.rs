//! Activation-time surface fitting.
//!
//! - [`model`]: the bivariate cubic and its closed-form gradient.
//! - [`lstsq`]: Householder-QR least squares.
//! - [`solver`]: per-beat fit producing a [`FittedSurface`].

pub mod lstsq;
pub mod model;
pub mod solver;

pub use lstsq::lstsq;
pub use model::{Cubic, EXPONENTS, N_COEF};
pub use solver::FittedSurface;
