#[cfg(test)]
mod tests {
    use crate::numerical::BVP_colloc::BVP_colloc_main::{SolverError, SolverSettings};
    use crate::physics::jeffery_hamel::{
        initial_mesh, solve_case, FlowConfig, FlowVariant, PhysicalConstants, COUPLED_DIM,
        MOMENTUM_DIM,
    };
    use approx::assert_relative_eq;

    fn study_config() -> FlowConfig {
        FlowConfig::study().unwrap()
    }

    /// The linearized profile (Re -> 0): f''' + 4 alpha^2 f' = 0 with the
    /// standard boundary conditions gives
    /// f(eta) = 1 - (1 - cos(2 alpha eta)) / (1 - cos(2 alpha)).
    fn linearized_profile(alpha: f64, eta: f64) -> f64 {
        1.0 - (1.0 - (2.0 * alpha * eta).cos()) / (1.0 - (2.0 * alpha).cos())
    }

    #[test]
    fn test_prandtl_number_derivation() {
        let config = study_config();
        // nu is set by the largest |Re| of the sweep
        let nu = 1.0 / 100.0;
        assert_relative_eq!(config.kinematic_viscosity(), nu, epsilon = 1e-14);
        assert_relative_eq!(
            config.prandtl,
            1.225 * 1005.0 * nu / 0.0262,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_variant_dimensions_and_labels() {
        assert_eq!(FlowVariant::MomentumOnly.state_dim(), MOMENTUM_DIM);
        assert_eq!(FlowVariant::CoupledNoDissipation.state_dim(), COUPLED_DIM);
        assert_eq!(FlowVariant::CoupledWithDissipation.state_dim(), COUPLED_DIM);
        assert_eq!(FlowVariant::MomentumOnly.label(), "momentum");
    }

    #[test]
    fn test_initial_mesh_and_guess() {
        let eta = initial_mesh(100);
        assert_eq!(eta.len(), 100);
        assert_relative_eq!(eta[0], 0.0, epsilon = 1e-14);
        assert_relative_eq!(eta[99], 1.0, epsilon = 1e-14);
        for j in 0..99 {
            assert!(eta[j] < eta[j + 1]);
        }
        let guess = FlowVariant::CoupledNoDissipation.initial_guess(&eta);
        assert_eq!(guess.shape(), (COUPLED_DIM, 100));
        for j in 0..100 {
            assert_relative_eq!(guess[(0, j)], 1.0 - eta[j], epsilon = 1e-14);
            for i in 1..COUPLED_DIM {
                assert_relative_eq!(guess[(i, j)], 0.0, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_zero_reynolds_number_is_rejected() {
        let config = study_config();
        let err = solve_case(&config, FlowVariant::MomentumOnly, 0.0).unwrap_err();
        assert!(matches!(err, SolverError::MalformedProblem(_)));

        // a zero entry in the sweep list is caught at configuration time
        let err = FlowConfig::new(
            10.0,
            vec![5.0, 0.0],
            PhysicalConstants::default(),
            100,
            SolverSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::MalformedProblem(_)));
    }

    #[test]
    fn test_empty_sweep_is_rejected() {
        let err = FlowConfig::new(
            10.0,
            vec![],
            PhysicalConstants::default(),
            100,
            SolverSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::MalformedProblem(_)));
    }

    #[test]
    fn test_analytic_jacobian_matches_finite_differences() {
        use crate::numerical::BVP_colloc::BVP_colloc_main::estimate_fun_jac;
        use nalgebra::{DMatrix, DVector};

        let config = study_config();
        let variant = FlowVariant::CoupledWithDissipation;
        let rhs = variant.rhs(&config, 50.0);
        let jac = variant.rhs_jacobian(&config, 50.0);

        let eta = DVector::from_vec(vec![0.2, 0.7]);
        let y = DMatrix::from_vec(
            5,
            2,
            vec![0.9, -0.3, 0.1, 0.05, -0.2, 0.4, -1.1, 0.6, -0.02, 0.3],
        );
        let analytic = jac(&eta, &y);
        let numeric = estimate_fun_jac(&rhs, &eta, &y, None);
        for (ja, jn) in analytic.iter().zip(numeric.iter()) {
            for i in 0..5 {
                for k in 0..5 {
                    assert_relative_eq!(ja[(i, k)], jn[(i, k)], epsilon = 1e-4);
                }
            }
        }
    }

    #[test]
    fn test_momentum_reference_scenario() {
        // alpha = 10 deg, Re = 50, 100-node uniform mesh, guess 1 - eta
        let config = study_config();
        let res = solve_case(&config, FlowVariant::MomentumOnly, 50.0).unwrap();

        let m = res.x.len();
        assert!(m >= 100 && m <= config.settings.max_nodes);
        assert_relative_eq!(res.y[(0, 0)], 1.0, epsilon = 1e-5);
        assert!(res.y[(1, 0)].abs() < 1e-5);
        assert!(res.y[(0, m - 1)].abs() < 1e-5);
        assert!(res.rms_residuals.iter().all(|r| *r <= config.settings.tol));
    }

    #[test]
    fn test_small_re_profile_matches_linearized_solution() {
        let config = study_config();
        let re = 0.01;
        let res = solve_case(&config, FlowVariant::MomentumOnly, re).unwrap();
        for &eta in &[0.25, 0.5, 0.75] {
            let vals = res.eval(&[eta]);
            let reference = linearized_profile(config.alpha, eta);
            assert!(
                (vals[(0, 0)] - reference).abs() < 1e-2,
                "profile {} deviates from linearized reference {} at eta = {}",
                vals[(0, 0)],
                reference,
                eta
            );
        }
    }

    #[test]
    fn test_opposite_re_profiles_average_to_linearized_solution() {
        // the O(Re) parts of the profiles for +Re and -Re cancel, so the
        // average must agree with the Re -> 0 profile to O(Re^2); this is
        // a property check of the nonlinear term, not a hard law
        let config = study_config();
        let re = 0.01;
        let plus = solve_case(&config, FlowVariant::MomentumOnly, re).unwrap();
        let minus = solve_case(&config, FlowVariant::MomentumOnly, -re).unwrap();
        for &eta in &[0.3, 0.5, 0.8] {
            let avg = 0.5 * (plus.eval(&[eta])[(0, 0)] + minus.eval(&[eta])[(0, 0)]);
            let reference = linearized_profile(config.alpha, eta);
            assert!(
                (avg - reference).abs() < 5e-3,
                "averaged profile {} vs linearized {} at eta = {}",
                avg,
                reference,
                eta
            );
        }
    }

    #[test]
    fn test_coupled_without_dissipation_has_zero_temperature() {
        // G'' = (4 + 2 f Pr) G with G(0) = G(1) = 0 is homogeneous, so
        // the converged temperature function must vanish identically
        let config = study_config();
        let res = solve_case(&config, FlowVariant::CoupledNoDissipation, 5.0).unwrap();
        assert_eq!(res.y.nrows(), COUPLED_DIM);
        for j in 0..res.x.len() {
            assert!(
                res.y[(3, j)].abs() < 1e-6,
                "G({}) = {}",
                res.x[j],
                res.y[(3, j)]
            );
        }
        // the momentum block still satisfies its boundary conditions
        assert_relative_eq!(res.y[(0, 0)], 1.0, epsilon = 1e-5);
        assert!(res.y[(0, res.x.len() - 1)].abs() < 1e-5);
    }

    #[test]
    fn test_coupled_with_dissipation_satisfies_boundary_conditions() {
        // moderate Prandtl number so the thermal layers stay resolvable
        let config = FlowConfig::new(
            10.0,
            vec![5.0],
            PhysicalConstants {
                thermal_conductivity: 35.175,
                ..PhysicalConstants::default()
            },
            100,
            SolverSettings {
                tol: 1e-6,
                bc_tol: 1e-6,
                max_nodes: 10_000,
                max_refinements: 10,
            },
        )
        .unwrap();
        assert_relative_eq!(config.prandtl, 7.0, epsilon = 1e-3);

        let res = solve_case(&config, FlowVariant::CoupledWithDissipation, 5.0).unwrap();
        let m = res.x.len();
        assert!(res.y[(3, 0)].abs() < 1e-5);
        assert!(res.y[(3, m - 1)].abs() < 1e-5);
        // the dissipation source forces a nonzero interior temperature
        let max_g = (0..m).map(|j| res.y[(3, j)].abs()).fold(0.0, f64::max);
        assert!(max_g > 1e-3, "temperature function stayed at {}", max_g);
        // boundary satisfaction of the momentum block
        assert_relative_eq!(res.y[(0, 0)], 1.0, epsilon = 1e-5);
        assert!(res.y[(1, 0)].abs() < 1e-5);
        assert!(res.y[(0, m - 1)].abs() < 1e-5);
    }
}
