//! # BVP_colloc - collocation solver for two-point boundary value problems
//!
//! A 4th order collocation method with residual control in the manner of
//! the MATLAB/SciPy BVP solvers. The solution is approximated by a C1
//! piecewise cubic that satisfies the ODE at the midpoints of the mesh
//! intervals; the resulting nonlinear algebraic system is solved by a
//! damped Newton iteration, and the mesh is refined where the estimated
//! RMS residual exceeds tolerance.
//!
//! ## Module structure
//! - `BVP_colloc_main`: the solver itself (collocation residuals,
//!   Jacobian assembly, damped Newton, error estimation, refinement)
//! - `PPoly`: the piecewise-polynomial continuous solution representation
pub mod BVP_colloc_main;
pub mod PPoly;
