//! Numerical machinery of the crate.
/// Collocation solver for nonlinear two-point boundary value problems
/// with damped Newton iteration and residual-driven mesh refinement
pub mod BVP_colloc;
