// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The inner (unconstrained) minimizer: L-BFGS + line search, bounded by a caller-chosen step
//! budget, with early convergence and numerical-failure detection.

use crate::error::{OptError, Result};
use crate::lbfgs::{lbfgs_step, LbfgsState};
use crate::linesearch::aw_line_search;
use crate::oracle::Oracle;
use crate::vecmath::{axpy, dot, has_nan, norm2};

/// Default convergence threshold on `⟨g, gPre⟩`, the inner minimizer's Newton-decrement-like
/// stopping test. Overridable per problem via [`crate::config::EpParams::with_uo_stop`]; kept
/// loose by default since tightening it interacts poorly with the line search's `MIN_INTERVAL` —
/// a very small threshold can force the bracket narrower than the line search is willing to go.
pub const UO_STOP: f64 = 1e-2;

/// Whether `minimize` should stop as soon as the convergence test is met, rather than always
/// running the full step budget. Always true in this crate: the caller already controls how much
/// work one `minimize` call does through its step budget, so there is no reason to keep iterating
/// past convergence.
const BREAK_EARLY: bool = true;

/// Everything `minimize` reports back about the round it just ran.
#[derive(Debug, Clone)]
pub struct MinimizeOutcome {
    /// The (possibly updated) point.
    pub x: Vec<f64>,
    /// `ϕ(x)` at the returned point.
    pub phi: f64,
    /// `⟨g, gPre⟩` from the most recent pre-update evaluation — the convergence test this loop
    /// uses, not a Euclidean norm despite the field's name.
    pub norm_grad: f64,
    /// The updated L-BFGS history.
    pub lbfgs: LbfgsState,
    /// The last raw gradient `∇ϕ(x)` evaluated.
    pub g: Vec<f64>,
    /// The last preconditioned gradient.
    pub g_pre: Vec<f64>,
    /// Set when a NaN was observed in the energy or gradient norm after a successful oracle
    /// evaluation; non-fatal, surfaced to the caller as a flag instead of raised as an error.
    pub failed: bool,
    /// Individual objective-term energies from the last oracle evaluation.
    pub obj_energies: Vec<f64>,
    /// Individual constraint-term energies from the last oracle evaluation.
    pub constr_energies: Vec<f64>,
}

/// Run up to `num_steps` L-BFGS + line-search iterations from `x0`.
///
/// Fatal conditions (`NaNInState`, `NaNInGradient`) abort immediately with `Err`.
/// `NaNInEnergy` (NaN in `ϕ` or `‖g‖₂` *after* a successful oracle evaluation) is recoverable:
/// it sets `failed = true` on the returned outcome instead of raising.
pub fn minimize(
    x0: &[f64],
    f: &Oracle,
    lbfgs0: &LbfgsState,
    num_steps: u64,
    uo_stop: f64,
) -> Result<MinimizeOutcome> {
    if num_steps < 1 {
        return Err(OptError::InsufficientSteps(num_steps).into());
    }

    let mut x = x0.to_vec();
    let mut lbfgs = lbfgs0.clone();

    // Bookkeeping from the most recent pre-update oracle evaluation: the returned `norm_grad`
    // (and the rest of the diagnostic fields) must reflect that evaluation, not the post-update
    // point, even though `x` itself is post-update.
    let mut phi = 0.0;
    let mut g: Vec<f64> = Vec::new();
    let mut g_pre: Vec<f64> = Vec::new();
    let mut norm_grad = 0.0;
    let mut obj_energies: Vec<f64> = Vec::new();
    let mut constr_energies: Vec<f64> = Vec::new();
    let mut failed = false;

    for _ in 0..num_steps {
        if has_nan(&x) {
            return Err(OptError::NaNInState.into());
        }

        let result = f(&x);
        if has_nan(&result.grad) {
            return Err(OptError::NaNInGradient.into());
        }
        phi = result.phi;
        g = result.grad;
        obj_energies = result.obj_energies;
        constr_energies = result.constr_energies;

        let (gp, lbfgs_next) = lbfgs_step(&x, &g, &lbfgs)?;
        g_pre = gp;
        lbfgs = lbfgs_next;

        norm_grad = dot(&g, &g_pre);

        if BREAK_EARLY && norm_grad < uo_stop {
            break;
        }

        let t = aw_line_search(&x, f, &crate::vecmath::scale(&g_pre, -1.0), phi, &g, None);

        if phi.is_nan() || norm2(&g).is_nan() {
            failed = true;
            break;
        }

        x = axpy(&x, -t, &g_pre);
    }

    Ok(MinimizeOutcome {
        x,
        phi,
        norm_grad,
        lbfgs,
        g,
        g_pre,
        failed,
        obj_energies,
        constr_energies,
    })
}
