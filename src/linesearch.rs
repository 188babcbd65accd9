// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Bracketing Armijo/weak-Wolfe line search (`awLineSearch`).
//!
//! Weak Wolfe, not strong: the directions fed into this search are already preconditioned by
//! L-BFGS, and strong Wolfe was observed to shrink the bracket too aggressively against
//! preconditioned directions.

use crate::oracle::Oracle;
use crate::vecmath::{axpy, dot};

/// Armijo sufficient-decrease constant `c₁`.
pub const C1: f64 = 1e-3;
/// Weak Wolfe constant `c₂`.
pub const C2: f64 = 0.9;
/// Minimum bracket width before the search gives up and returns its last `t`.
pub const MIN_INTERVAL: f64 = 1e-10;
/// Default iteration cap.
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Find a step length `t > 0` along `d` from `x0` satisfying Armijo and weak-Wolfe.
///
/// `phi0`/`g0` are `f(x0).phi`/`f(x0).grad`, passed in rather than recomputed since the caller
/// (the inner minimizer) already has them from the current iteration's oracle call.
pub fn aw_line_search(
    x0: &[f64],
    f: &Oracle,
    d: &[f64],
    phi0: f64,
    g0: &[f64],
    max_steps: Option<usize>,
) -> f64 {
    let max_steps = max_steps.unwrap_or(DEFAULT_MAX_STEPS);
    let dg0 = dot(d, g0);

    let mut a = 0.0_f64;
    let mut b = f64::INFINITY;
    let mut t = 1.0_f64;
    let mut iters = 0;

    loop {
        let xt = axpy(x0, t, d);
        let result = f(&xt);
        let armijo = result.phi <= phi0 + C1 * t * dg0;
        let wolfe = dot(d, &result.grad) >= C2 * dg0;

        if !armijo {
            b = t;
        } else if !wolfe {
            a = t;
        } else {
            return t;
        }

        iters += 1;
        if (b - a).abs() < MIN_INTERVAL || iters > max_steps {
            return t;
        }

        t = if b.is_finite() { (a + b) / 2.0 } else { 2.0 * a };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn quadratic_oracle() -> Oracle {
        // phi(x) = 0.5 * x^2, grad = x.
        Arc::new(|x: &[f64]| crate::oracle::OracleResult {
            phi: 0.5 * x.iter().map(|v| v * v).sum::<f64>(),
            grad: x.to_vec(),
            obj_energies: vec![],
            constr_energies: vec![],
        })
    }

    #[test]
    fn accepts_full_newton_step_on_a_quadratic() {
        // Starting at x0=[2.0], direction d=[-2.0] (the exact Newton step) should be accepted at
        // t=1 on the very first evaluation: Armijo and weak Wolfe both hold with equality-ish
        // margins at the minimizer.
        let f = quadratic_oracle();
        let x0 = vec![2.0];
        let phi0 = 2.0;
        let g0 = vec![2.0];
        let d = vec![-2.0];
        let t = aw_line_search(&x0, &f, &d, phi0, &g0, None);
        assert_relative_eq!(t, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn sufficient_decrease_holds_or_budget_is_exhausted() {
        let f = quadratic_oracle();
        let x0 = vec![5.0];
        let phi0 = 12.5;
        let g0 = vec![5.0];
        let d = vec![-5.0];
        let t = aw_line_search(&x0, &f, &d, phi0, &g0, Some(10));
        let xt = axpy(&x0, t, &d);
        let phi_t = f(&xt).phi;
        assert!(t > 0.0);
        assert!(phi_t <= phi0 + C1 * t * dot(&d, &g0) + 1e-8);
    }

    #[test]
    fn terminates_within_max_steps_on_a_pathological_direction() {
        // A direction that is not a descent direction at all: the search should still terminate.
        let f = quadratic_oracle();
        let x0 = vec![1.0];
        let phi0 = 0.5;
        let g0 = vec![1.0];
        let d = vec![1.0]; // ascent direction
        let t = aw_line_search(&x0, &f, &d, phi0, &g0, Some(5));
        assert!(t.is_finite());
        assert!(t > 0.0);
    }
}
