//! Piecewise polynomial in the power basis.
//!
//! The collocation solver represents its continuous solution as a cubic
//! C1 spline: one polynomial per mesh interval, coefficients stored with
//! the highest-order term first. This module evaluates such a polynomial
//! (and its derivatives) at arbitrary points, finding the interval for
//! each point by binary search over the ascending breakpoints.
use nalgebra::DMatrix;

/// Evaluate one local polynomial or its `dx`-th derivative at local
/// coordinate `s`. `c[k][ci][cj]` holds the coefficient of the
/// `(degree - k)`-th power for interval `ci`, component `cj`.
fn evaluate_poly1(s: f64, c: &[Vec<Vec<f64>>], ci: usize, cj: usize, dx: usize) -> f64 {
    let k = c.len();
    let mut res = 0.0;
    let mut z = 1.0;
    for kp in 0..k {
        if kp < dx {
            continue;
        }
        // prefactor of the term after dx-fold differentiation
        let mut pref = 1.0;
        for v in (kp - dx + 1)..=kp {
            pref *= v as f64;
        }
        res += c[k - kp - 1][ci][cj] * z * pref;
        if kp < k - 1 {
            z *= s;
        }
    }
    res
}

/// Find the interval index for `xval` in the ascending breakpoint array,
/// starting from a hint. Returns -1 for NaN or out-of-range points when
/// extrapolation is disabled.
fn find_interval_ascending(x: &[f64], xval: f64, prev_interval: usize, extrapolate: bool) -> i64 {
    let n = x.len();
    if xval.is_nan() {
        return -1;
    }
    if xval < x[0] {
        return if extrapolate { 0 } else { -1 };
    }
    if xval > x[n - 1] {
        return if extrapolate { (n - 2) as i64 } else { -1 };
    }
    if xval == x[n - 1] {
        return (n - 2) as i64;
    }

    let low = if prev_interval < n - 1 { prev_interval } else { 0 };
    if x[low] <= xval && xval < x[low + 1] {
        return low as i64;
    }

    let (mut low, mut high) = if xval < x[low] { (0, low.max(1)) } else { (low, n - 1) };
    while high - low > 1 {
        let mid = (high + low) / 2;
        if xval < x[mid] {
            high = mid;
        } else {
            low = mid;
        }
    }
    low as i64
}

/// Piecewise polynomial over ascending breakpoints.
#[derive(Debug, Clone)]
pub struct PPoly {
    /// Coefficients, shape (order + 1, intervals, components), highest power first
    pub c: Vec<Vec<Vec<f64>>>,
    /// Breakpoints, shape (intervals + 1,)
    pub x: Vec<f64>,
    /// Evaluate out-of-range points from the boundary intervals instead of returning NaN
    pub extrapolate: bool,
}

impl PPoly {
    /// Number of vector components per evaluation point.
    pub fn components(&self) -> usize {
        self.c[0][0].len()
    }

    /// Evaluate the polynomial (`nu = 0`) or its `nu`-th derivative at the
    /// given points. Returns a (points, components) matrix; rows for
    /// out-of-range points are NaN when extrapolation is off.
    pub fn call(&self, pts: &[f64], nu: usize) -> DMatrix<f64> {
        let ncomp = self.components();
        let mut out = DMatrix::zeros(pts.len(), ncomp);
        let mut interval = 0usize;
        for (ip, &xval) in pts.iter().enumerate() {
            let i = find_interval_ascending(&self.x, xval, interval, self.extrapolate);
            if i < 0 {
                for jp in 0..ncomp {
                    out[(ip, jp)] = f64::NAN;
                }
                continue;
            }
            interval = i as usize;
            let s = xval - self.x[interval];
            for jp in 0..ncomp {
                out[(ip, jp)] = evaluate_poly1(s, &self.c, interval, jp, nu);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests_PPoly {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_ppoly() -> PPoly {
        // f(x) = 2x + 1 on [0, 1]
        PPoly {
            c: vec![vec![vec![2.0]], vec![vec![1.0]]],
            x: vec![0.0, 1.0],
            extrapolate: true,
        }
    }

    fn cubic_two_interval_ppoly() -> PPoly {
        // [0,1]: p(s) = s^3 + s, [1,2]: p(s) = -s^2 + 2s + 2
        PPoly {
            c: vec![
                vec![vec![1.0], vec![0.0]],
                vec![vec![0.0], vec![-1.0]],
                vec![vec![1.0], vec![2.0]],
                vec![vec![0.0], vec![2.0]],
            ],
            x: vec![0.0, 1.0, 2.0],
            extrapolate: true,
        }
    }

    #[test]
    fn test_linear_values_and_extrapolation() {
        let p = linear_ppoly();
        let out = p.call(&[0.0, 0.5, 1.0, 1.5], 0);
        let expected = [1.0, 2.0, 3.0, 4.0];
        for (i, &e) in expected.iter().enumerate() {
            assert_relative_eq!(out[(i, 0)], e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_out_of_range_is_nan_without_extrapolation() {
        let mut p = linear_ppoly();
        p.extrapolate = false;
        let out = p.call(&[-0.5, 0.5, 1.5], 0);
        assert!(out[(0, 0)].is_nan());
        assert_relative_eq!(out[(1, 0)], 2.0, epsilon = 1e-12);
        assert!(out[(2, 0)].is_nan());
    }

    #[test]
    fn test_piecewise_cubic_values() {
        let p = cubic_two_interval_ppoly();
        let out = p.call(&[0.5, 1.0, 1.5, 2.0], 0);
        // local coordinates: 0.5 in [0,1]; 0.0 and 0.5 and 1.0 in [1,2]
        assert_relative_eq!(out[(0, 0)], 0.625, epsilon = 1e-12);
        assert_relative_eq!(out[(1, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(out[(2, 0)], 2.75, epsilon = 1e-12);
        assert_relative_eq!(out[(3, 0)], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_first_and_second_derivatives() {
        // p(s) = s^3 + 2s^2 + 3s + 4 on [0, 2]
        let p = PPoly {
            c: vec![vec![vec![1.0]], vec![vec![2.0]], vec![vec![3.0]], vec![vec![4.0]]],
            x: vec![0.0, 2.0],
            extrapolate: true,
        };
        let d1 = p.call(&[1.0], 1);
        let d2 = p.call(&[1.0], 2);
        // p'(1) = 3 + 4 + 3, p''(1) = 6 + 4
        assert_relative_eq!(d1[(0, 0)], 10.0, epsilon = 1e-12);
        assert_relative_eq!(d2[(0, 0)], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_multiple_components() {
        // two components on one interval: [x, 1 - x]
        let p = PPoly {
            c: vec![vec![vec![1.0, -1.0]], vec![vec![0.0, 1.0]]],
            x: vec![0.0, 1.0],
            extrapolate: true,
        };
        let out = p.call(&[0.25], 0);
        assert_relative_eq!(out[(0, 0)], 0.25, epsilon = 1e-12);
        assert_relative_eq!(out[(0, 1)], 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_interval_search() {
        let x = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(find_interval_ascending(&x, 0.5, 0, true), 0);
        assert_eq!(find_interval_ascending(&x, 2.5, 0, true), 2);
        // hint far from the point still resolves correctly
        assert_eq!(find_interval_ascending(&x, 0.5, 2, true), 0);
        assert_eq!(find_interval_ascending(&x, 3.0, 0, true), 2);
        assert_eq!(find_interval_ascending(&x, -1.0, 0, false), -1);
        assert_eq!(find_interval_ascending(&x, 3.5, 0, false), -1);
        assert_eq!(find_interval_ascending(&x, f64::NAN, 0, true), -1);
    }
}
