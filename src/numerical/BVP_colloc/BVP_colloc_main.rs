//! Two-point boundary value problem solver: 4th order collocation with
//! residual-driven mesh refinement, in the manner of the MATLAB/SciPy
//! collocation solvers.
//!
//! The problem is
//!
//! y'(x) = f(x, y(x)),  x in [a, b],   g(y(a), y(b)) = 0,
//!
//! with y in R^n and exactly n boundary conditions. The solution is
//! approximated by a C1 piecewise cubic matched to the nodal values and
//! ODE-consistent derivatives, and collocated at interval midpoints:
//!
//! y_mid = (y_j + y_{j+1})/2 - h/8 (f_{j+1} - f_j)
//! Phi_j = y_{j+1} - y_j - h/6 (f_j + f_{j+1} + 4 f_mid) = 0
//!
//! The nonlinear system (collocation residuals + boundary conditions) is
//! solved by a damped Newton iteration with Armijo backtracking; after
//! each converged solve, per-interval RMS residuals are estimated by
//! 5-point Lobatto quadrature and nodes are inserted where the estimate
//! exceeds tolerance. The outer loop is an explicit state machine
//! ([`SolverStage`]) so each termination condition is testable on its own.
use super::PPoly::PPoly;
use log::{info, warn};
use nalgebra::{DMatrix, DVector, LU};
use thiserror::Error;

const EPS: f64 = f64::EPSILON;

// Newton iteration constants, shared with the classic collocation solvers
const MAX_NEWTON_ITER: usize = 8;
const MAX_JAC_EVALS: usize = 4;
const SIGMA: f64 = 0.2; // Armijo sufficient-decrease constant
const TAU: f64 = 0.5; // step shrink factor
const N_TRIAL: usize = 4; // backtracking budget; smallest step fraction is TAU^N_TRIAL

/// ODE right-hand side f(x, y), vectorized: `x` holds N positions, `y` is
/// a (state dim, N) matrix, the result has the shape of `y`.
pub type OdeRhs = dyn Fn(&DVector<f64>, &DMatrix<f64>) -> DMatrix<f64>;

/// Analytic Jacobian df/dy, one (n, n) matrix per position in `x`.
pub type OdeJac = dyn Fn(&DVector<f64>, &DMatrix<f64>) -> Vec<DMatrix<f64>>;

/// Boundary condition residual g(y(a), y(b)); must have length n.
pub type BcResidual = dyn Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64>;

/// Failure of one BVP solve. Failures are local to the solve that raised
/// them; callers running several solves report and continue.
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    /// Rejected before any Newton iteration was attempted.
    #[error("malformed problem: {0}")]
    MalformedProblem(String),
    /// The damped Newton iteration could not reduce the residual on the
    /// current mesh, and the refinement retry budget ran out.
    #[error("Newton iteration diverged on {nodes} nodes (refinement pass {iteration})")]
    NewtonDivergence { iteration: usize, nodes: usize },
    /// Node count or refinement-pass budget exhausted before the error
    /// tolerance was met.
    #[error("refinement budget exceeded: {reason} ({nodes} nodes, pass {iteration})")]
    RefinementBudgetExceeded {
        reason: String,
        iteration: usize,
        nodes: usize,
    },
}

/// Tolerances and budgets for one solve.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Relative tolerance on the estimated RMS residual per interval
    pub tol: f64,
    /// Absolute tolerance on the boundary condition residuals
    pub bc_tol: f64,
    /// Hard cap on mesh size
    pub max_nodes: usize,
    /// Hard cap on refinement passes (each pass is one Newton solve)
    pub max_refinements: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            tol: 1e-6,
            bc_tol: 1e-6,
            max_nodes: 10_000,
            max_refinements: 10,
        }
    }
}

/// Stages of the outer collocation-refinement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStage {
    /// Compute mesh intervals for the current node set
    Discretize,
    /// Run the damped Newton iteration on the collocation system
    Solve,
    /// Inspect the Newton outcome; recover from divergence if possible
    CheckConvergence,
    /// Estimate per-interval RMS residuals of the collocation solution
    EstimateError,
    /// Insert nodes where the estimate exceeds tolerance
    Refine,
    Converged,
    Failed,
}

/// A converged solve: final mesh, nodal values and derivatives, and the
/// C1 cubic interpolant. Immutable once returned.
#[derive(Debug, Clone)]
pub struct BvpSolution {
    /// Continuous solution representation
    pub sol: PPoly,
    /// Final mesh nodes
    pub x: DVector<f64>,
    /// Nodal solution values, shape (n, nodes)
    pub y: DMatrix<f64>,
    /// Nodal derivative values f(x, y), shape (n, nodes)
    pub yp: DMatrix<f64>,
    /// Estimated RMS residual per interval
    pub rms_residuals: DVector<f64>,
    /// Number of refinement passes performed
    pub niter: usize,
}

impl BvpSolution {
    /// Evaluate the solution at arbitrary points; shape (n, points).
    pub fn eval(&self, pts: &[f64]) -> DMatrix<f64> {
        self.sol.call(pts, 0).transpose()
    }

    /// Evaluate the first derivative at arbitrary points; shape (n, points).
    pub fn eval_derivative(&self, pts: &[f64]) -> DMatrix<f64> {
        self.sol.call(pts, 1).transpose()
    }
}

/// Validate shapes and well-posedness; returns the RHS evaluated on the
/// initial mesh so the caller does not pay for it twice.
fn check_problem(
    rhs: &OdeRhs,
    bc: &BcResidual,
    x: &DVector<f64>,
    y: &DMatrix<f64>,
) -> Result<DMatrix<f64>, SolverError> {
    let m = x.len();
    if m < 2 {
        return Err(SolverError::MalformedProblem(
            "mesh must contain at least 2 nodes".to_string(),
        ));
    }
    for j in 0..m - 1 {
        if x[j + 1] <= x[j] {
            return Err(SolverError::MalformedProblem(
                "mesh nodes must be strictly increasing".to_string(),
            ));
        }
    }
    let n = y.nrows();
    if n == 0 || y.ncols() != m {
        return Err(SolverError::MalformedProblem(format!(
            "state array shape {:?} does not match mesh of {} nodes",
            y.shape(),
            m
        )));
    }
    let f = rhs(x, y);
    if f.shape() != y.shape() {
        return Err(SolverError::MalformedProblem(format!(
            "RHS returned shape {:?}, expected {:?}",
            f.shape(),
            y.shape()
        )));
    }
    let bc_res = bc(&y.column(0).into(), &y.column(m - 1).into());
    if bc_res.len() != n {
        return Err(SolverError::MalformedProblem(format!(
            "{} boundary conditions for a state of dimension {}",
            bc_res.len(),
            n
        )));
    }
    Ok(f)
}

/// Interval lengths h_j = x_{j+1} - x_j.
pub fn mesh_intervals(x: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(x.len() - 1, (0..x.len() - 1).map(|j| x[j + 1] - x[j]))
}

/// Forward-difference Jacobians of the RHS, one (n, n) matrix per mesh
/// position. Each state component is perturbed at all positions at once,
/// so the RHS is called at most n + 1 times.
pub fn estimate_fun_jac(
    rhs: &OdeRhs,
    x: &DVector<f64>,
    y: &DMatrix<f64>,
    f0: Option<&DMatrix<f64>>,
) -> Vec<DMatrix<f64>> {
    let (n, m) = y.shape();
    let f0_computed;
    let f0 = match f0 {
        Some(f) => f,
        None => {
            f0_computed = rhs(x, y);
            &f0_computed
        }
    };
    let mut df_dy = vec![DMatrix::zeros(n, n); m];
    for i in 0..n {
        let mut y_pert = y.clone();
        let mut hs = DVector::zeros(m);
        for j in 0..m {
            hs[j] = EPS.sqrt() * (1.0 + y[(i, j)].abs());
            y_pert[(i, j)] += hs[j];
        }
        let f_new = rhs(x, &y_pert);
        for j in 0..m {
            for r in 0..n {
                df_dy[j][(r, i)] = (f_new[(r, j)] - f0[(r, j)]) / hs[j];
            }
        }
    }
    df_dy
}

/// Forward-difference Jacobians of the boundary conditions with respect
/// to the left and right boundary states.
pub fn estimate_bc_jac(
    bc: &BcResidual,
    ya: &DVector<f64>,
    yb: &DVector<f64>,
    bc0: Option<&DVector<f64>>,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = ya.len();
    let bc0_computed;
    let bc0 = match bc0 {
        Some(r) => r,
        None => {
            bc0_computed = bc(ya, yb);
            &bc0_computed
        }
    };
    let mut dbc_dya = DMatrix::zeros(n, n);
    let mut dbc_dyb = DMatrix::zeros(n, n);
    for i in 0..n {
        let h = EPS.sqrt() * (1.0 + ya[i].abs());
        let mut ya_pert = ya.clone();
        ya_pert[i] += h;
        let r = bc(&ya_pert, yb);
        for row in 0..n {
            dbc_dya[(row, i)] = (r[row] - bc0[row]) / h;
        }

        let h = EPS.sqrt() * (1.0 + yb[i].abs());
        let mut yb_pert = yb.clone();
        yb_pert[i] += h;
        let r = bc(ya, &yb_pert);
        for row in 0..n {
            dbc_dyb[(row, i)] = (r[row] - bc0[row]) / h;
        }
    }
    (dbc_dya, dbc_dyb)
}

/// Collocation residuals for a trial state array.
///
/// Returns `(col_res, y_middle, f, f_middle)`: residuals at interval
/// midpoints (n, m-1), interpolated midpoint states (n, m-1), RHS values
/// at the nodes (n, m) and at the midpoints (n, m-1). The midpoint RHS is
/// evaluated in a single vectorized call.
pub fn collocation_fun(
    rhs: &OdeRhs,
    y: &DMatrix<f64>,
    x: &DVector<f64>,
    h: &DVector<f64>,
) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
    let (n, m) = y.shape();
    let f = rhs(x, y);

    let mut x_middle = DVector::zeros(m - 1);
    let mut y_middle = DMatrix::zeros(n, m - 1);
    for j in 0..m - 1 {
        x_middle[j] = x[j] + 0.5 * h[j];
        for i in 0..n {
            y_middle[(i, j)] =
                0.5 * (y[(i, j + 1)] + y[(i, j)]) - 0.125 * h[j] * (f[(i, j + 1)] - f[(i, j)]);
        }
    }
    let f_middle = rhs(&x_middle, &y_middle);

    let mut col_res = DMatrix::zeros(n, m - 1);
    for j in 0..m - 1 {
        for i in 0..n {
            col_res[(i, j)] = y[(i, j + 1)]
                - y[(i, j)]
                - h[j] / 6.0 * (f[(i, j)] + f[(i, j + 1)] + 4.0 * f_middle[(i, j)]);
        }
    }
    (col_res, y_middle, f, f_middle)
}

/// Assemble the dense global Jacobian of the collocation system.
///
/// Row blocks 0..m-1 are the interval residuals Phi_j, which depend only
/// on y_j and y_{j+1}; the last n rows are the boundary conditions. The
/// structure is block-banded, but the systems here are small enough that
/// a dense LU is the simplest adequate factorization.
pub fn construct_global_jac(
    n: usize,
    m: usize,
    h: &DVector<f64>,
    df_dy: &[DMatrix<f64>],
    df_dy_middle: &[DMatrix<f64>],
    dbc_dya: &DMatrix<f64>,
    dbc_dyb: &DMatrix<f64>,
) -> DMatrix<f64> {
    let total = n * m;
    let mut jac = DMatrix::zeros(total, total);

    for j in 0..m - 1 {
        let hj = h[j];

        // dPhi_j / dy_j
        let mut block = -DMatrix::identity(n, n);
        block -= hj / 6.0 * (&df_dy[j] + 2.0 * &df_dy_middle[j]);
        block -= hj * hj / 12.0 * (&df_dy_middle[j] * &df_dy[j]);
        jac.view_mut((j * n, j * n), (n, n)).copy_from(&block);

        // dPhi_j / dy_{j+1}
        let mut block = DMatrix::identity(n, n);
        block -= hj / 6.0 * (&df_dy[j + 1] + 2.0 * &df_dy_middle[j]);
        block += hj * hj / 12.0 * (&df_dy_middle[j] * &df_dy[j + 1]);
        jac.view_mut((j * n, (j + 1) * n), (n, n)).copy_from(&block);
    }

    let bc_row = (m - 1) * n;
    jac.view_mut((bc_row, 0), (n, n)).copy_from(dbc_dya);
    jac.view_mut((bc_row, (m - 1) * n), (n, n)).copy_from(dbc_dyb);
    jac
}

fn stack_residuals(col_res: &DMatrix<f64>, bc_res: &DVector<f64>) -> DVector<f64> {
    let (n, m1) = col_res.shape();
    let mut res = DVector::zeros(n * m1 + bc_res.len());
    for j in 0..m1 {
        for i in 0..n {
            res[j * n + i] = col_res[(i, j)];
        }
    }
    for i in 0..bc_res.len() {
        res[m1 * n + i] = bc_res[i];
    }
    res
}

/// Damped Newton iteration on the collocation system for a fixed mesh.
///
/// Returns the final iterate and a divergence flag. The flag is raised
/// when the linearized system is singular or when even the smallest
/// backtracking fraction of the Newton step fails to reduce the residual;
/// stopping at the iteration cap without formal convergence is not by
/// itself divergence (the outer residual estimator decides what to do).
pub fn solve_newton(
    rhs: &OdeRhs,
    bc: &BcResidual,
    ode_jac: Option<&OdeJac>,
    mut y: DMatrix<f64>,
    x: &DVector<f64>,
    h: &DVector<f64>,
    tol: f64,
    bc_tol: f64,
) -> (DMatrix<f64>, bool) {
    let (n, m) = y.shape();
    // tolerance for collocation residuals, relative to interval length
    let tol_r: DVector<f64> = h.map(|hj| 2.0 / 3.0 * hj * 5e-2 * tol);

    let mut x_middle = DVector::zeros(m - 1);
    for j in 0..m - 1 {
        x_middle[j] = x[j] + 0.5 * h[j];
    }

    let mut njev = 0usize;
    let mut recompute_jac = true;
    let mut lu: Option<LU<f64, nalgebra::Dyn, nalgebra::Dyn>> = None;

    for _iter in 0..MAX_NEWTON_ITER {
        let (col_res, y_middle, f, f_middle) = collocation_fun(rhs, &y, x, h);
        let bc_res = bc(&y.column(0).into(), &y.column(m - 1).into());

        let mut converged = bc_res.iter().all(|r| r.abs() < bc_tol);
        'check: for j in 0..m - 1 {
            for i in 0..n {
                if col_res[(i, j)].abs() >= tol_r[j] * (1.0 + f_middle[(i, j)].abs()) {
                    converged = false;
                    break 'check;
                }
            }
        }
        if converged {
            break;
        }

        if recompute_jac {
            let df_dy = match ode_jac {
                Some(jac) => jac(x, &y),
                None => estimate_fun_jac(rhs, x, &y, Some(&f)),
            };
            let df_dy_middle = match ode_jac {
                Some(jac) => jac(&x_middle, &y_middle),
                None => estimate_fun_jac(rhs, &x_middle, &y_middle, Some(&f_middle)),
            };
            let (dbc_dya, dbc_dyb) = estimate_bc_jac(
                bc,
                &y.column(0).into(),
                &y.column(m - 1).into(),
                Some(&bc_res),
            );
            let jac = construct_global_jac(n, m, h, &df_dy, &df_dy_middle, &dbc_dya, &dbc_dyb);
            lu = Some(LU::new(jac));
            njev += 1;
        }
        let Some(ref lu_decomp) = lu else {
            return (y, true);
        };

        let res = stack_residuals(&col_res, &bc_res);
        let Some(step) = lu_decomp.solve(&res) else {
            return (y, true);
        };
        let cost = step.dot(&step);

        let mut y_step = DMatrix::zeros(n, m);
        for j in 0..m {
            for i in 0..n {
                y_step[(i, j)] = step[j * n + i];
            }
        }

        // Armijo backtracking on the natural criterion ||J^-1 F||^2
        let mut alpha = 1.0;
        let mut y_new = &y - &y_step;
        let mut cost_new = cost;
        for trial in 0..=N_TRIAL {
            y_new = &y - alpha * &y_step;
            let (col_new, _, _, _) = collocation_fun(rhs, &y_new, x, h);
            let bc_new = bc(&y_new.column(0).into(), &y_new.column(m - 1).into());
            let res_new = stack_residuals(&col_new, &bc_new);
            let Some(step_new) = lu_decomp.solve(&res_new) else {
                return (y, true);
            };
            cost_new = step_new.dot(&step_new);
            if cost_new < (1.0 - 2.0 * alpha * SIGMA) * cost {
                break;
            }
            if trial < N_TRIAL {
                alpha *= TAU;
            }
        }
        if !(cost_new < cost) {
            // even the smallest step fraction failed to reduce the residual
            // (a NaN cost lands here as well)
            return (y, true);
        }

        y = y_new;
        recompute_jac = alpha != 1.0;
        if njev >= MAX_JAC_EVALS {
            break;
        }
    }
    (y, false)
}

/// Build the C1 cubic spline from nodal values and derivatives. The
/// coefficient formulas are the classic cubic Hermite ones; the spline
/// reproduces `y` and `yp` exactly at the nodes.
pub fn create_spline(
    y: &DMatrix<f64>,
    yp: &DMatrix<f64>,
    x: &DVector<f64>,
    h: &DVector<f64>,
) -> PPoly {
    let (n, m) = y.shape();
    let mut c = vec![vec![vec![0.0; n]; m - 1]; 4];
    for j in 0..m - 1 {
        for i in 0..n {
            let slope = (y[(i, j + 1)] - y[(i, j)]) / h[j];
            let t = (yp[(i, j)] + yp[(i, j + 1)] - 2.0 * slope) / h[j];
            c[0][j][i] = t / h[j];
            c[1][j][i] = (slope - yp[(i, j)]) / h[j] - t;
            c[2][j][i] = yp[(i, j)];
            c[3][j][i] = y[(i, j)];
        }
    }
    PPoly {
        c,
        x: x.iter().cloned().collect(),
        extrapolate: true,
    }
}

/// Per-interval RMS residual estimate by 5-point Lobatto quadrature.
///
/// The residual y' - f of the spline is sampled at the interval midpoint
/// (already known from the collocation residual) and at the two interior
/// Lobatto abscissae, normalized by 1 + |f|.
pub fn estimate_rms_residuals(
    rhs: &OdeRhs,
    sol: &PPoly,
    x: &DVector<f64>,
    h: &DVector<f64>,
    r_middle: &DMatrix<f64>,
    f_middle: &DMatrix<f64>,
) -> DVector<f64> {
    let (n, m1) = r_middle.shape();
    let mut x1 = DVector::zeros(m1);
    let mut x2 = DVector::zeros(m1);
    for j in 0..m1 {
        let mid = x[j] + 0.5 * h[j];
        let s = 0.5 * h[j] * (3.0f64 / 7.0).sqrt();
        x1[j] = mid + s;
        x2[j] = mid - s;
    }

    let pts1: Vec<f64> = x1.iter().cloned().collect();
    let pts2: Vec<f64> = x2.iter().cloned().collect();
    let y1 = sol.call(&pts1, 0).transpose();
    let y2 = sol.call(&pts2, 0).transpose();
    let y1p = sol.call(&pts1, 1).transpose();
    let y2p = sol.call(&pts2, 1).transpose();
    let f1 = rhs(&x1, &y1);
    let f2 = rhs(&x2, &y2);

    let mut rms = DVector::zeros(m1);
    for j in 0..m1 {
        let mut s_mid = 0.0;
        let mut s1 = 0.0;
        let mut s2 = 0.0;
        for i in 0..n {
            let r_mid = r_middle[(i, j)] / (1.0 + f_middle[(i, j)].abs());
            let r1 = (y1p[(i, j)] - f1[(i, j)]) / (1.0 + f1[(i, j)].abs());
            let r2 = (y2p[(i, j)] - f2[(i, j)]) / (1.0 + f2[(i, j)].abs());
            s_mid += r_mid * r_mid;
            s1 += r1 * r1;
            s2 += r2 * r2;
        }
        rms[j] = (0.5 * (32.0 / 45.0 * s_mid + 49.0 / 90.0 * (s1 + s2))).sqrt();
    }
    rms
}

/// Insert one midpoint node per interval in `insert_1`, two thirds-point
/// nodes per interval in `insert_2`. Existing nodes are never moved.
pub fn modify_mesh(x: &DVector<f64>, insert_1: &[usize], insert_2: &[usize]) -> DVector<f64> {
    let mut nodes: Vec<f64> = x.iter().cloned().collect();
    for &j in insert_1 {
        nodes.push(0.5 * (x[j] + x[j + 1]));
    }
    for &j in insert_2 {
        nodes.push((2.0 * x[j] + x[j + 1]) / 3.0);
        nodes.push((x[j] + 2.0 * x[j + 1]) / 3.0);
    }
    nodes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    DVector::from_vec(nodes)
}

/// Bisect every interval and carry the current iterate over by linear
/// interpolation. Used to retry a diverged Newton solve on a finer mesh,
/// where no trustworthy spline of the iterate exists.
fn bisect_mesh(x: &DVector<f64>, y: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let (n, m) = y.shape();
    let mut x_new = DVector::zeros(2 * m - 1);
    let mut y_new = DMatrix::zeros(n, 2 * m - 1);
    for j in 0..m {
        x_new[2 * j] = x[j];
        for i in 0..n {
            y_new[(i, 2 * j)] = y[(i, j)];
        }
    }
    for j in 0..m - 1 {
        x_new[2 * j + 1] = 0.5 * (x[j] + x[j + 1]);
        for i in 0..n {
            y_new[(i, 2 * j + 1)] = 0.5 * (y[(i, j)] + y[(i, j + 1)]);
        }
    }
    (x_new, y_new)
}

/// Solve a two-point BVP by collocation with adaptive mesh refinement.
///
/// `x_init` is the initial mesh (strictly increasing, at least 2 nodes),
/// `y_init` the initial guess with one column per node. Passing an
/// analytic `ode_jac` is optional; forward differences are used otherwise.
pub fn solve_bvp(
    rhs: &OdeRhs,
    bc: &BcResidual,
    ode_jac: Option<&OdeJac>,
    x_init: DVector<f64>,
    y_init: DMatrix<f64>,
    settings: &SolverSettings,
) -> Result<BvpSolution, SolverError> {
    let f_init = check_problem(rhs, bc, &x_init, &y_init)?;
    let n = y_init.nrows();

    let mut x = x_init;
    let mut y = y_init;
    let mut h = mesh_intervals(&x);
    let mut spline = create_spline(&y, &f_init, &x, &h);
    let mut f = f_init;
    let mut f_middle = DMatrix::zeros(n, x.len() - 1);
    let mut col_res = DMatrix::zeros(n, x.len() - 1);
    let mut bc_res = DVector::zeros(n);
    let mut rms_res = DVector::zeros(x.len() - 1);
    let mut diverged = false;
    let mut iteration = 0usize;
    let mut failure = SolverError::MalformedProblem("solver did not run".to_string());

    let mut stage = SolverStage::Discretize;
    loop {
        stage = match stage {
            SolverStage::Discretize => {
                h = mesh_intervals(&x);
                SolverStage::Solve
            }
            SolverStage::Solve => {
                let (y_new, div) = solve_newton(
                    rhs,
                    bc,
                    ode_jac,
                    y.clone(),
                    &x,
                    &h,
                    settings.tol,
                    settings.bc_tol,
                );
                y = y_new;
                diverged = div;
                iteration += 1;
                SolverStage::CheckConvergence
            }
            SolverStage::CheckConvergence => {
                if diverged {
                    let refined_nodes = 2 * x.len() - 1;
                    if iteration < settings.max_refinements && refined_nodes <= settings.max_nodes
                    {
                        warn!(
                            "Newton diverged on {} nodes; retrying on a bisected mesh",
                            x.len()
                        );
                        let (x_new, y_new) = bisect_mesh(&x, &y);
                        x = x_new;
                        y = y_new;
                        SolverStage::Discretize
                    } else {
                        failure = SolverError::NewtonDivergence {
                            iteration,
                            nodes: x.len(),
                        };
                        SolverStage::Failed
                    }
                } else {
                    let (cr, _, fv, fm) = collocation_fun(rhs, &y, &x, &h);
                    col_res = cr;
                    f = fv;
                    f_middle = fm;
                    bc_res = bc(&y.column(0).into(), &y.column(x.len() - 1).into());
                    SolverStage::EstimateError
                }
            }
            SolverStage::EstimateError => {
                let m1 = x.len() - 1;
                // the midpoint residual of the spline relates to the
                // collocation residual by a factor 3/(2h)
                let mut r_middle = DMatrix::zeros(n, m1);
                for j in 0..m1 {
                    for i in 0..n {
                        r_middle[(i, j)] = 1.5 * col_res[(i, j)] / h[j];
                    }
                }
                spline = create_spline(&y, &f, &x, &h);
                rms_res = estimate_rms_residuals(rhs, &spline, &x, &h, &r_middle, &f_middle);
                SolverStage::Refine
            }
            SolverStage::Refine => {
                let m = x.len();
                let max_rms = rms_res.iter().cloned().fold(0.0, f64::max);
                let max_bc_res = bc_res.iter().map(|r| r.abs()).fold(0.0, f64::max);

                let mut insert_1 = Vec::new();
                let mut insert_2 = Vec::new();
                for j in 0..m - 1 {
                    if rms_res[j] > settings.tol && rms_res[j] < 100.0 * settings.tol {
                        insert_1.push(j);
                    } else if rms_res[j] >= 100.0 * settings.tol {
                        insert_2.push(j);
                    }
                }
                let nodes_added = insert_1.len() + 2 * insert_2.len();
                info!(
                    "pass {}: max rms residual {:.2e}, max bc residual {:.2e}, {} nodes, {} to add",
                    iteration, max_rms, max_bc_res, m, nodes_added
                );

                if m + nodes_added > settings.max_nodes {
                    failure = SolverError::RefinementBudgetExceeded {
                        reason: "maximum number of mesh nodes exceeded".to_string(),
                        iteration,
                        nodes: m + nodes_added,
                    };
                    SolverStage::Failed
                } else if nodes_added > 0 {
                    if iteration >= settings.max_refinements {
                        failure = SolverError::RefinementBudgetExceeded {
                            reason: "maximum number of refinement passes exceeded".to_string(),
                            iteration,
                            nodes: m,
                        };
                        SolverStage::Failed
                    } else {
                        x = modify_mesh(&x, &insert_1, &insert_2);
                        let pts: Vec<f64> = x.iter().cloned().collect();
                        y = spline.call(&pts, 0).transpose();
                        SolverStage::Discretize
                    }
                } else if max_bc_res <= settings.bc_tol {
                    SolverStage::Converged
                } else if iteration >= settings.max_refinements {
                    failure = SolverError::RefinementBudgetExceeded {
                        reason: "boundary condition tolerance not met within the pass budget"
                            .to_string(),
                        iteration,
                        nodes: m,
                    };
                    SolverStage::Failed
                } else {
                    SolverStage::Solve
                }
            }
            SolverStage::Converged => {
                info!(
                    "converged in {} passes on {} nodes",
                    iteration,
                    x.len()
                );
                return Ok(BvpSolution {
                    sol: spline,
                    x,
                    y,
                    yp: f,
                    rms_residuals: rms_res,
                    niter: iteration,
                });
            }
            SolverStage::Failed => {
                warn!("solve failed: {}", failure);
                return Err(failure);
            }
        };
    }
}
