//! Jeffery-Hamel similarity flow.
//!
//! Radial viscous flow between two plane walls meeting at half-angle
//! alpha, reduced by the similarity variable eta in [0, 1] to the
//! third-order momentum equation
//!
//! f''' + 2 Re alpha f f' + 4 alpha^2 f' = 0,
//! f(0) = 1, f'(0) = 0, f(1) = 0,
//!
//! written as a first-order system Y = [f, f', f'']. The thermal
//! sub-problem adds the dimensionless temperature function G with
//!
//! G'' = (4 + 2 f Pr) G [+ Pr (4 f^2 - f'^2)],
//! G(0) = G(1) = 0,
//!
//! the bracketed viscous-dissipation source being present or absent per
//! variant; the coupled state is Y = [f, f', f'', G, G'].
use crate::numerical::BVP_colloc::BVP_colloc_main::{
    solve_bvp, BvpSolution, SolverError, SolverSettings,
};
use log::info;
use nalgebra::{DMatrix, DVector};

/// State dimension of the momentum-only system
pub const MOMENTUM_DIM: usize = 3;
/// State dimension of the coupled momentum + energy system
pub const COUPLED_DIM: usize = 5;

/// Which ODE system a solve works on. A closed set selected by
/// configuration; every variant maps to a pure evaluator below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowVariant {
    /// Momentum equation alone, Y = [f, f', f'']
    MomentumOnly,
    /// Momentum + energy without viscous dissipation, Y = [f, f', f'', G, G']
    CoupledNoDissipation,
    /// Momentum + energy with the viscous-dissipation source term
    CoupledWithDissipation,
}

impl FlowVariant {
    pub fn state_dim(&self) -> usize {
        match self {
            FlowVariant::MomentumOnly => MOMENTUM_DIM,
            _ => COUPLED_DIM,
        }
    }

    pub fn has_energy(&self) -> bool {
        !matches!(self, FlowVariant::MomentumOnly)
    }

    /// Short identifier used in log lines and output file names.
    pub fn label(&self) -> &'static str {
        match self {
            FlowVariant::MomentumOnly => "momentum",
            FlowVariant::CoupledNoDissipation => "coupled_without_dissipation",
            FlowVariant::CoupledWithDissipation => "coupled_with_dissipation",
        }
    }
}

/// Fixed fluid and reference-state constants.
#[derive(Debug, Clone, Copy)]
pub struct PhysicalConstants {
    /// Density, kg/m^3
    pub rho: f64,
    /// Reference (centerline) velocity scale, m/s
    pub v0: f64,
    /// Far-field pressure, Pa
    pub p_infinity: f64,
    /// Specific heat, J/(kg K)
    pub c_p: f64,
    /// Thermal conductivity, W/(m K)
    pub thermal_conductivity: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        // air at ambient conditions
        PhysicalConstants {
            rho: 1.225,
            v0: 1.0,
            p_infinity: 101_325.0,
            c_p: 1005.0,
            thermal_conductivity: 0.0262,
        }
    }
}

/// Immutable configuration of one run: geometry, the Reynolds numbers to
/// sweep, fluid constants, the derived Prandtl-like number and the solver
/// settings. Constructed once, shared read-only by all solves.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Channel half-angle, radians
    pub alpha: f64,
    /// Reynolds numbers to solve for, all nonzero
    pub re_values: Vec<f64>,
    pub constants: PhysicalConstants,
    /// rho * c_p * nu / k with nu implied by the largest |Re| in use
    pub prandtl: f64,
    /// Number of nodes in the uniform initial mesh
    pub initial_nodes: usize,
    pub settings: SolverSettings,
}

impl FlowConfig {
    /// Validates the Reynolds-number list and derives the Prandtl number.
    /// A zero Reynolds number is rejected here, before any solve starts:
    /// the viscosity scale and the stress fields both divide by Re.
    pub fn new(
        alpha_degrees: f64,
        re_values: Vec<f64>,
        constants: PhysicalConstants,
        initial_nodes: usize,
        settings: SolverSettings,
    ) -> Result<Self, SolverError> {
        if re_values.is_empty() {
            return Err(SolverError::MalformedProblem(
                "the Reynolds number list must not be empty".to_string(),
            ));
        }
        if re_values.iter().any(|re| *re == 0.0 || !re.is_finite()) {
            return Err(SolverError::MalformedProblem(
                "Reynolds numbers must be finite and nonzero".to_string(),
            ));
        }
        if initial_nodes < 2 {
            return Err(SolverError::MalformedProblem(
                "the initial mesh needs at least 2 nodes".to_string(),
            ));
        }
        let max_abs_re = re_values.iter().fold(0.0f64, |acc, re| acc.max(re.abs()));
        let nu = constants.v0 / max_abs_re;
        let prandtl = constants.rho * constants.c_p * nu / constants.thermal_conductivity;
        Ok(FlowConfig {
            alpha: alpha_degrees.to_radians(),
            re_values,
            constants,
            prandtl,
            initial_nodes,
            settings,
        })
    }

    /// The reference study: alpha = 10 deg, Re in {-100, -50, -5, 5, 50,
    /// 100}, air-like constants, 100-node initial mesh.
    pub fn study() -> Result<Self, SolverError> {
        FlowConfig::new(
            10.0,
            vec![-100.0, -50.0, -5.0, 5.0, 50.0, 100.0],
            PhysicalConstants::default(),
            100,
            SolverSettings::default(),
        )
    }

    /// Kinematic viscosity scale implied by the largest |Re| in the sweep.
    pub fn kinematic_viscosity(&self) -> f64 {
        let max_abs_re = self
            .re_values
            .iter()
            .fold(0.0f64, |acc, re| acc.max(re.abs()));
        self.constants.v0 / max_abs_re
    }
}

/// Uniform mesh of `n` nodes on [0, 1].
pub fn initial_mesh(n: usize) -> DVector<f64> {
    DVector::from_iterator(n, (0..n).map(|j| j as f64 / (n - 1) as f64))
}

impl FlowVariant {
    /// Initial state guess on the given mesh: the leading component
    /// follows the affine profile 1 - eta, everything else starts at zero.
    /// Guess quality only affects convergence, never a converged answer.
    pub fn initial_guess(&self, eta: &DVector<f64>) -> DMatrix<f64> {
        let mut y = DMatrix::zeros(self.state_dim(), eta.len());
        for j in 0..eta.len() {
            y[(0, j)] = 1.0 - eta[j];
        }
        y
    }

    /// Vectorized right-hand side of the first-order system. Pure; the
    /// captured scalars come from the immutable run configuration.
    pub fn rhs(
        &self,
        config: &FlowConfig,
        re: f64,
    ) -> impl Fn(&DVector<f64>, &DMatrix<f64>) -> DMatrix<f64> + use<> {
        let alpha = config.alpha;
        let pr = config.prandtl;
        let variant = *self;
        move |_eta: &DVector<f64>, y: &DMatrix<f64>| {
            let m = y.ncols();
            let mut dy = DMatrix::zeros(variant.state_dim(), m);
            for j in 0..m {
                let f = y[(0, j)];
                let df = y[(1, j)];
                let ddf = y[(2, j)];
                dy[(0, j)] = df;
                dy[(1, j)] = ddf;
                dy[(2, j)] = -2.0 * re * alpha * f * df - 4.0 * alpha * alpha * df;
                if variant.has_energy() {
                    let g = y[(3, j)];
                    let dg = y[(4, j)];
                    dy[(3, j)] = dg;
                    let mut g_rhs = (4.0 + 2.0 * f * pr) * g;
                    if variant == FlowVariant::CoupledWithDissipation {
                        g_rhs += pr * (4.0 * f * f - df * df);
                    }
                    dy[(4, j)] = g_rhs;
                }
            }
            dy
        }
    }

    /// Analytic Jacobian of the right-hand side, one (n, n) block per
    /// mesh position; consistent with [`FlowVariant::rhs`] by
    /// construction.
    pub fn rhs_jacobian(
        &self,
        config: &FlowConfig,
        re: f64,
    ) -> impl Fn(&DVector<f64>, &DMatrix<f64>) -> Vec<DMatrix<f64>> + use<> {
        let alpha = config.alpha;
        let pr = config.prandtl;
        let variant = *self;
        move |_eta: &DVector<f64>, y: &DMatrix<f64>| {
            let n = variant.state_dim();
            let m = y.ncols();
            let mut blocks = Vec::with_capacity(m);
            for j in 0..m {
                let f = y[(0, j)];
                let df = y[(1, j)];
                let mut jac = DMatrix::zeros(n, n);
                jac[(0, 1)] = 1.0;
                jac[(1, 2)] = 1.0;
                jac[(2, 0)] = -2.0 * re * alpha * df;
                jac[(2, 1)] = -2.0 * re * alpha * f - 4.0 * alpha * alpha;
                if variant.has_energy() {
                    let g = y[(3, j)];
                    jac[(3, 4)] = 1.0;
                    jac[(4, 0)] = 2.0 * pr * g;
                    jac[(4, 3)] = 4.0 + 2.0 * f * pr;
                    if variant == FlowVariant::CoupledWithDissipation {
                        jac[(4, 0)] += 8.0 * pr * f;
                        jac[(4, 1)] = -2.0 * pr * df;
                    }
                }
                blocks.push(jac);
            }
            blocks
        }
    }

    /// Boundary condition residual: unit inlet profile and zero slope at
    /// the centerline, no slip at the wall; the coupled variants pin the
    /// temperature function at both boundaries.
    pub fn boundary_conditions(
        &self,
    ) -> impl Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64> + use<> {
        let has_energy = self.has_energy();
        move |ya: &DVector<f64>, yb: &DVector<f64>| {
            let mut r = vec![ya[0] - 1.0, ya[1], yb[0]];
            if has_energy {
                r.push(ya[3]);
                r.push(yb[3]);
            }
            DVector::from_vec(r)
        }
    }
}

/// Solve one (Reynolds number, variant) case from the standard mesh and
/// guess. Each call owns its mesh and state; cases are independent and
/// safe to run concurrently.
pub fn solve_case(
    config: &FlowConfig,
    variant: FlowVariant,
    re: f64,
) -> Result<BvpSolution, SolverError> {
    if re == 0.0 || !re.is_finite() {
        return Err(SolverError::MalformedProblem(
            "Reynolds number must be finite and nonzero".to_string(),
        ));
    }
    let eta = initial_mesh(config.initial_nodes);
    let guess = variant.initial_guess(&eta);
    let rhs = variant.rhs(config, re);
    let jac = variant.rhs_jacobian(config, re);
    let bc = variant.boundary_conditions();
    info!("solving {} system for Re = {}", variant.label(), re);
    solve_bvp(&rhs, &bc, Some(&jac), eta, guess, &config.settings)
}
