// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The L-BFGS preconditioner: the two-loop recursion (Nocedal & Wright, Algorithm 7.4) that turns
//! a gradient into an approximation of `H⁻¹∇ϕ`, plus the bookkeeping of the bounded correction
//! history it runs on.
//!
//! # References
//!
//! Jorge Nocedal and Stephen J. Wright (2006). Numerical Optimization. Springer.
//! ISBN 0-387-30303-0.

use crate::error::Result;
use crate::error::OptError;
use crate::vecmath::{axpy, dot, scale, sub};
use std::collections::VecDeque;

/// Default L-BFGS history depth (`m`).
pub const DEFAULT_MEM_SIZE: usize = 17;

/// Division-safety epsilon (`ε`) added to every `⟨y, s⟩`/`⟨y, y⟩` denominator in the two-loop
/// recursion so a near-zero curvature pair never produces a divide-by-zero.
pub const EPSD: f64 = 1e-11;

/// Bounded correction history plus the bookkeeping the two-loop recursion needs between calls.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct LbfgsState {
    /// `xₖ₋₁`. Undefined (and unused) while `num_unconstr_steps == 0`.
    last_x: Vec<f64>,
    /// `∇ϕ(xₖ₋₁)`. Undefined (and unused) while `num_unconstr_steps == 0`.
    last_grad: Vec<f64>,
    /// Correction vectors `sᵢ = xᵢ₊₁ − xᵢ`, newest first.
    s_list: VecDeque<Vec<f64>>,
    /// Correction vectors `yᵢ = ∇ϕ(xᵢ₊₁) − ∇ϕ(xᵢ)`, newest first, aligned with `s_list`.
    y_list: VecDeque<Vec<f64>>,
    /// Non-negative step counter. `0` means no prior point has been recorded yet.
    num_unconstr_steps: u64,
    /// `m`, the fixed history depth. Must be `≥ 1`.
    mem_size: usize,
}

impl LbfgsState {
    /// A fresh history with the given memory depth. Panics if `mem_size == 0`; `mem_size` is a
    /// compile-time tunable, not a runtime input, so requiring it to be `>= 1` is a precondition,
    /// not a recoverable error.
    pub fn new(mem_size: usize) -> Self {
        assert!(mem_size >= 1, "L-BFGS memSize must be >= 1");
        LbfgsState {
            last_x: Vec::new(),
            last_grad: Vec::new(),
            s_list: VecDeque::with_capacity(mem_size),
            y_list: VecDeque::with_capacity(mem_size),
            num_unconstr_steps: 0,
            mem_size,
        }
    }

    /// `|sList| == |yList|`, bounded by `memSize`.
    pub fn history_len(&self) -> usize {
        debug_assert_eq!(self.s_list.len(), self.y_list.len());
        self.s_list.len()
    }

    /// Number of unconstrained steps taken against this history so far.
    pub fn num_unconstr_steps(&self) -> u64 {
        self.num_unconstr_steps
    }

    fn reset_at(x: &[f64], g: &[f64]) -> Self {
        LbfgsState {
            last_x: x.to_vec(),
            last_grad: g.to_vec(),
            s_list: VecDeque::new(),
            y_list: VecDeque::new(),
            num_unconstr_steps: 1,
            mem_size: 0, // overwritten by caller before use; see `lbfgs_step`
        }
    }
}

impl Default for LbfgsState {
    fn default() -> Self {
        LbfgsState::new(DEFAULT_MEM_SIZE)
    }
}

/// Run the two-loop recursion at `(x, g)` against `state`, returning the preconditioned gradient
/// and the updated history.
///
/// On the very first call (`num_unconstr_steps == 0`) this is steepest descent: `gPre = g`, and
/// the history is primed with `(x, g)` so the *next* call has a `(s, y)` pair to work with.
///
/// If the resulting direction `−gPre` is not a descent direction (`⟨−gPre, g⟩ > 0`), the history
/// is discarded and steepest descent is returned instead. Numerical drift occasionally makes the
/// implicit `H` indefinite; rather than patch a history that produced a bad direction, the reset
/// falls back to steepest descent and the next `(s, y)` pair is recomputed from that clean
/// baseline.
pub fn lbfgs_step(x: &[f64], g: &[f64], state: &LbfgsState) -> Result<(Vec<f64>, LbfgsState)> {
    if state.num_unconstr_steps == 0 {
        if !state.last_x.is_empty() || !state.last_grad.is_empty() {
            return Err(OptError::InvalidLbfgsState(state.num_unconstr_steps).into());
        }
        let mut fresh = LbfgsState::reset_at(x, g);
        fresh.mem_size = state.mem_size;
        return Ok((g.to_vec(), fresh));
    }
    if state.last_x.is_empty() || state.last_grad.is_empty() {
        return Err(OptError::InvalidLbfgsState(state.num_unconstr_steps).into());
    }

    let s_new = sub(x, &state.last_x);
    let y_new = sub(g, &state.last_grad);

    let mut s_list = state.s_list.clone();
    let mut y_list = state.y_list.clone();
    s_list.push_front(s_new);
    y_list.push_front(y_new);
    while s_list.len() > state.mem_size {
        s_list.pop_back();
        y_list.pop_back();
    }

    let g_pre = two_loop_recursion(g, &s_list, &y_list);

    if dot(&scale(&g_pre, -1.0), g) > 0.0 {
        let mut fresh = LbfgsState::reset_at(x, g);
        fresh.mem_size = state.mem_size;
        return Ok((g.to_vec(), fresh));
    }

    let next = LbfgsState {
        last_x: x.to_vec(),
        last_grad: g.to_vec(),
        s_list,
        y_list,
        num_unconstr_steps: state.num_unconstr_steps + 1,
        mem_size: state.mem_size,
    };
    Ok((g_pre, next))
}

/// Nocedal & Wright, Algorithm 7.4. `s_list`/`y_list` are newest-first.
fn two_loop_recursion(g: &[f64], s_list: &VecDeque<Vec<f64>>, y_list: &VecDeque<Vec<f64>>) -> Vec<f64> {
    let m = s_list.len();
    let mut rho = vec![0.0; m];
    let mut alpha = vec![0.0; m];
    let mut q = g.to_vec();

    // Backward sweep: newest to oldest.
    for i in 0..m {
        let (s_i, y_i) = (&s_list[i], &y_list[i]);
        let rho_i = 1.0 / (dot(y_i, s_i) + EPSD);
        let alpha_i = rho_i * dot(s_i, &q);
        q = axpy(&q, -alpha_i, y_i);
        rho[i] = rho_i;
        alpha[i] = alpha_i;
    }

    let gamma = if m > 0 {
        let (s0, y0) = (&s_list[0], &y_list[0]);
        dot(s0, y0) / (dot(y0, y0) + EPSD)
    } else {
        1.0
    };
    let mut r = scale(&q, gamma);

    // Forward sweep: oldest to newest.
    for i in (0..m).rev() {
        let (s_i, y_i) = (&s_list[i], &y_list[i]);
        let beta_i = rho[i] * dot(y_i, &r);
        r = axpy(&r, alpha[i] - beta_i, s_i);
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_call_is_steepest_descent() {
        let state = LbfgsState::new(5);
        let (g_pre, next) = lbfgs_step(&[1.0, 2.0], &[0.5, -0.5], &state).unwrap();
        assert_eq!(g_pre, vec![0.5, -0.5]);
        assert_eq!(next.num_unconstr_steps(), 1);
        assert_eq!(next.history_len(), 0);
    }

    #[test]
    fn history_grows_then_stays_bounded() {
        let mut state = LbfgsState::new(2);
        let mut x = vec![0.0, 0.0];
        let mut g = vec![1.0, 1.0];
        let (_, next) = lbfgs_step(&x, &g, &state).unwrap();
        state = next;
        x = vec![0.1, 0.1];
        for k in 0..5 {
            g = vec![1.0 - k as f64 * 0.1, 1.0 - k as f64 * 0.1];
            let (_, next) = lbfgs_step(&x, &g, &state).unwrap();
            state = next;
            x = axpy(&x, 0.1, &[1.0, 1.0]);
            assert!(state.history_len() <= 2);
        }
    }

    #[test]
    fn descent_direction_on_quadratic() {
        // phi(x) = 0.5*||x||^2, grad = x. Two steps from a well-conditioned start should always
        // yield a descent direction (no reset).
        let state = LbfgsState::new(10);
        let (g_pre0, state) = lbfgs_step(&[2.0, 2.0], &[2.0, 2.0], &state).unwrap();
        assert_eq!(g_pre0, vec![2.0, 2.0]);
        let (g_pre1, _state) = lbfgs_step(&[1.0, 1.0], &[1.0, 1.0], &state).unwrap();
        assert!(dot(&scale(&g_pre1, -1.0), &[1.0, 1.0]) <= 0.0);
    }

    #[test]
    fn two_loop_recursion_matches_steepest_descent_with_empty_history() {
        let g = vec![3.0, -4.0];
        let r = two_loop_recursion(&g, &VecDeque::new(), &VecDeque::new());
        assert_relative_eq!(r[0], g[0]);
        assert_relative_eq!(r[1], g[1]);
    }

    #[test]
    fn non_descent_direction_resets_history() {
        // First call is steepest descent and primes (last_x, last_grad) = ([0,0], [1,1]).
        let state0 = LbfgsState::new(1);
        let (_, state1) = lbfgs_step(&[0.0, 0.0], &[1.0, 1.0], &state0).unwrap();
        assert_eq!(state1.num_unconstr_steps(), 1);
        assert_eq!(state1.history_len(), 0);

        // s = [1,0], y = [-1,0]: ⟨s, y⟩ = -1 < 0, indefinite curvature. The two-loop recursion
        // built from this single pair yields a gPre with ⟨-gPre, g⟩ > 0 at g = [0,1], which must
        // force a reset back to steepest descent rather than a "patched" history.
        let x1 = [1.0, 0.0];
        let g1 = [0.0, 1.0];
        let (g_pre1, state2) = lbfgs_step(&x1, &g1, &state1).unwrap();

        assert_eq!(state2.history_len(), 0);
        assert_eq!(state2.num_unconstr_steps(), 1);
        assert_eq!(g_pre1, g1.to_vec());
        assert!(dot(&scale(&g_pre1, -1.0), &g1) <= 0.0);
    }
}
