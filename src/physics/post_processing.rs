//! Pressure and stress fields derived from a converged flow profile.
//!
//! The pressure model is the analytic small-angle approximation built on
//! the Bessel function J0; the arguments never exceed 2 alpha, so J0 and
//! its derivatives are evaluated by the ascending power series. The
//! stress fields are plain algebra on the profile f and its slope f'.
use super::jeffery_hamel::FlowConfig;
use nalgebra::DVector;

/// J0(x) by the ascending series.
pub fn bessel_j0(x: f64) -> f64 {
    bessel_j0_derivative(x, 0)
}

/// `order`-th derivative of J0 at `x`, by term-wise differentiation of
/// the series sum_m (-1)^m (x/2)^{2m} / (m!)^2. Accurate for the small
/// arguments used here; not intended for |x| >> 10.
pub fn bessel_j0_derivative(x: f64, order: usize) -> f64 {
    let mut sum = 0.0;
    let mut a = 1.0; // (-1)^m / (4^m (m!)^2)
    for m in 0..=60usize {
        if m > 0 {
            let mf = m as f64;
            a *= -1.0 / (4.0 * mf * mf);
        }
        let p = 2 * m;
        if p < order {
            continue;
        }
        let mut pref = 1.0;
        for v in (p - order + 1)..=p {
            pref *= v as f64;
        }
        let term = a * pref * x.powi((p - order) as i32);
        sum += term;
        if p > order && term.abs() < f64::EPSILON * sum.abs().max(1.0) {
            break;
        }
    }
    sum
}

/// Dynamic pressure q = rho v0^2 / 2.
pub fn dynamic_pressure(config: &FlowConfig) -> f64 {
    0.5 * config.constants.rho * config.constants.v0 * config.constants.v0
}

/// Pressure coefficient across the channel,
/// c_p = 1 + (4 alpha^2)/(alpha Re) (1 - F) + F3 / (alpha Re)
/// with F = J0(2 alpha eta)/J0(2 alpha) and F3 = J0'''(2 alpha eta)/J0(2 alpha).
pub fn pressure_coefficient(config: &FlowConfig, re: f64, eta: &[f64]) -> DVector<f64> {
    let alpha = config.alpha;
    let j0_wall = bessel_j0(2.0 * alpha);
    DVector::from_iterator(
        eta.len(),
        eta.iter().map(|&e| {
            let f = bessel_j0(2.0 * alpha * e) / j0_wall;
            let f3 = bessel_j0_derivative(2.0 * alpha * e, 3) / j0_wall;
            1.0 + (4.0 * alpha * alpha) / (alpha * re) * (1.0 - f) + f3 / (alpha * re)
        }),
    )
}

/// Absolute pressure p = c_p q + p_infinity.
pub fn pressure_distribution(config: &FlowConfig, re: f64, eta: &[f64]) -> DVector<f64> {
    let q = dynamic_pressure(config);
    pressure_coefficient(config, re, eta).map(|cp| cp * q + config.constants.p_infinity)
}

/// Shear stress tau_theta_r = (2/Re) f'(eta) q.
pub fn shear_stress(config: &FlowConfig, re: f64, df: &DVector<f64>) -> DVector<f64> {
    let q = dynamic_pressure(config);
    df.map(|v| 2.0 / re * v * q)
}

/// Normal stresses (tau_rr, tau_theta_theta); the circumferential one is
/// the negative of the radial one.
pub fn normal_stresses(
    config: &FlowConfig,
    re: f64,
    f: &DVector<f64>,
) -> (DVector<f64>, DVector<f64>) {
    let q = dynamic_pressure(config);
    let tau_rr = f.map(|v| 4.0 * config.alpha / re * v * q);
    let tau_theta_theta = -tau_rr.clone();
    (tau_rr, tau_theta_theta)
}
