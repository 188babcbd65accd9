// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The outer Exterior-Point driver: a resumable state machine over [`State`] that runs inner
//! L-BFGS rounds at a fixed constraint weight, grows the weight between rounds, and detects
//! round-over-round convergence.

use crate::error::{OptError, Result};
use crate::inner::minimize;
use crate::lbfgs::LbfgsState;
use crate::oracle::{FrozenSet, Oracle, OracleFactory};
use crate::vecmath::sub;

/// Default per-round multiplier applied to the EP weight on every non-converged exterior-point
/// step. Overridable per problem via [`crate::config::EpParams::with_weight_growth_factor`].
pub const WEIGHT_GROWTH_FACTOR: f64 = 10.0;
/// Default `epStop`, the EP round-over-round convergence threshold. Overridable per problem via
/// [`crate::config::EpParams::with_ep_stop`].
pub const EP_STOP: f64 = 1e-3;

/// Where the state machine is in its NewIter → UnconstrainedRunning → UnconstrainedConverged →
/// {UnconstrainedRunning, EPConverged} | Error progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum OptStatus {
    /// Freshly built; the next `step` call binds the initial oracle and does no iterations.
    NewIter,
    /// An inner L-BFGS round is in progress at the current weight.
    UnconstrainedRunning,
    /// The inner round at the current weight has converged; the next `step` call decides whether
    /// to declare EP convergence or grow the weight and start another round.
    UnconstrainedConverged,
    /// Terminal: constraints are (approximately) satisfied at a local optimum.
    EPConverged,
    /// Terminal: a non-fatal numerical failure (`NaNInEnergy`) was observed during an inner round.
    Error,
}

/// All of the outer driver's bookkeeping: weight, round counters, snapshots used for
/// round-over-round convergence, and the L-BFGS history carried between `step` calls.
#[derive(Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct OptParams {
    /// `w`, the current EP penalty multiplier.
    pub weight: f64,
    /// Number of inner rounds run at the current weight.
    pub uo_round: u64,
    /// Number of completed EP rounds.
    pub ep_round: u64,
    /// Current state-machine status.
    pub opt_status: OptStatus,
    /// Snapshot of `x` after the most recent inner convergence.
    pub last_uo_state: Vec<f64>,
    /// `ϕ` at `last_uo_state`.
    pub last_uo_energy: f64,
    /// Snapshot of `x` from the prior EP round, used by `ep_converged`.
    pub last_ep_state: Vec<f64>,
    /// `ϕ` at `last_ep_state`.
    pub last_ep_energy: f64,
    /// Diagnostic: gradient from the most recent inner iteration.
    pub last_gradient: Vec<f64>,
    /// Diagnostic: preconditioned gradient from the most recent inner iteration.
    pub last_gradient_preconditioned: Vec<f64>,
    /// Diagnostic: per-objective-term energies from the most recent oracle evaluation.
    pub last_obj_energies: Vec<f64>,
    /// Diagnostic: per-constraint-term energies from the most recent oracle evaluation.
    pub last_constr_energies: Vec<f64>,
    /// L-BFGS history for the current inner round.
    pub lbfgs_info: LbfgsState,
    /// The oracle currently bound to `weight` and the problem's frozen set.
    #[cfg_attr(feature = "serde1", serde(skip))]
    pub curr_oracle: Option<Oracle>,
    /// `(weight, frozen) → oracle`, as supplied by the problem builder.
    #[cfg_attr(feature = "serde1", serde(skip))]
    pub oracle_factory: Option<OracleFactory>,
    /// Initial EP weight, retained so `NewIter` can rebind against it.
    pub init_constraint_weight: f64,
    /// L-BFGS history depth used whenever the history is (re)initialized.
    pub mem_size: usize,
    /// `uoStop`, the inner-minimizer convergence threshold (see [`crate::config::EpParams`]).
    pub uo_stop: f64,
    /// `epStop`, the round-over-round EP convergence threshold.
    pub ep_stop: f64,
    /// Per-round constraint-weight growth multiplier.
    pub weight_growth_factor: f64,
}

impl std::fmt::Debug for OptParams {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("OptParams")
            .field("weight", &self.weight)
            .field("uo_round", &self.uo_round)
            .field("ep_round", &self.ep_round)
            .field("opt_status", &self.opt_status)
            .finish_non_exhaustive()
    }
}

/// The full optimizer state, handed off by value between `step` calls. The old `State` is never
/// mutated; each call returns a fresh one.
#[derive(Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct State {
    /// The parameter vector.
    pub varying_values: Vec<f64>,
    /// Indices held constant regardless of their `InputMeta` tag.
    pub frozen_values: FrozenSet,
    /// Outer-driver bookkeeping.
    pub params: OptParams,
}

impl std::fmt::Debug for State {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("State")
            .field("varying_values", &self.varying_values)
            .field("frozen_values", &self.frozen_values)
            .field("params", &self.params)
            .finish()
    }
}

/// `‖x₁ − x₀‖₂ < epStop` or `|ϕ₁ − ϕ₀| < epStop`.
pub fn ep_converged(x0: &[f64], x1: &[f64], phi0: f64, phi1: f64, ep_stop: f64) -> bool {
    crate::vecmath::norm2(&sub(x1, x0)) < ep_stop || (phi1 - phi0).abs() < ep_stop
}

/// Run one state-machine transition, plus (for `UnconstrainedRunning`) up to `steps` inner
/// iterations.
///
/// `steps >= 1` is required; smaller values fail loudly. `EPConverged` and `Error` are terminal
/// and sticky: calling `step` again on either returns the state unchanged.
pub fn step(state: &State, steps: u64) -> Result<State> {
    if steps < 1 {
        return Err(OptError::InsufficientSteps(steps).into());
    }

    match state.params.opt_status {
        OptStatus::EPConverged | OptStatus::Error => Ok(state.clone()),

        OptStatus::NewIter => {
            let factory = state
                .params
                .oracle_factory
                .clone()
                .ok_or(OptError::MissingOracle)?;
            let weight = state.params.init_constraint_weight;
            let oracle = factory(weight, &state.frozen_values);
            let mut params = state.params.clone();
            params.weight = weight;
            params.uo_round = 0;
            params.ep_round = 0;
            params.lbfgs_info = LbfgsState::new(params.mem_size);
            params.curr_oracle = Some(oracle);
            params.opt_status = OptStatus::UnconstrainedRunning;
            Ok(State {
                varying_values: state.varying_values.clone(),
                frozen_values: state.frozen_values.clone(),
                params,
            })
        }

        OptStatus::UnconstrainedRunning => {
            let oracle = state
                .params
                .curr_oracle
                .clone()
                .ok_or(OptError::MissingOracle)?;
            let outcome = minimize(
                &state.varying_values,
                &oracle,
                &state.params.lbfgs_info,
                steps,
                state.params.uo_stop,
            )?;

            let mut params = state.params.clone();
            params.lbfgs_info = outcome.lbfgs;
            params.last_uo_state = outcome.x.clone();
            params.last_uo_energy = outcome.phi;
            params.last_gradient = outcome.g;
            params.last_gradient_preconditioned = outcome.g_pre;
            params.last_obj_energies = outcome.obj_energies;
            params.last_constr_energies = outcome.constr_energies;
            params.uo_round += 1;

            if outcome.failed {
                params.opt_status = OptStatus::Error;
            } else if outcome.norm_grad < state.params.uo_stop {
                params.opt_status = OptStatus::UnconstrainedConverged;
                params.lbfgs_info = LbfgsState::new(params.mem_size);
            } else {
                params.opt_status = OptStatus::UnconstrainedRunning;
            }

            Ok(State {
                varying_values: outcome.x,
                frozen_values: state.frozen_values.clone(),
                params,
            })
        }

        OptStatus::UnconstrainedConverged => {
            let mut params = state.params.clone();

            let already_converged = params.ep_round > 1
                && ep_converged(
                    &params.last_ep_state,
                    &params.last_uo_state,
                    params.last_ep_energy,
                    params.last_uo_energy,
                    params.ep_stop,
                );

            if already_converged {
                params.opt_status = OptStatus::EPConverged;
            } else {
                params.weight *= params.weight_growth_factor;
                let factory = params.oracle_factory.clone().ok_or(OptError::MissingOracle)?;
                params.curr_oracle = Some(factory(params.weight, &state.frozen_values));
                params.uo_round = 0;
                params.ep_round += 1;
                params.opt_status = OptStatus::UnconstrainedRunning;
            }

            params.last_ep_state = params.last_uo_state.clone();
            params.last_ep_energy = params.last_uo_energy;

            Ok(State {
                varying_values: state.varying_values.clone(),
                frozen_values: state.frozen_values.clone(),
                params,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleResult;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn unconstrained_quadratic_state(x0: Vec<f64>) -> State {
        let n = x0.len();
        let factory: OracleFactory = Arc::new(move |_w, frozen| {
            let frozen = frozen.clone();
            let n = n;
            Arc::new(move |x: &[f64]| {
                let mut grad = x.to_vec();
                for i in &frozen {
                    if *i < grad.len() {
                        grad[*i] = 0.0;
                    }
                }
                OracleResult {
                    phi: 0.5 * x.iter().map(|v| v * v).sum::<f64>(),
                    grad,
                    obj_energies: vec![],
                    constr_energies: vec![],
                }
            }) as Oracle
        });
        let params = OptParams {
            weight: 10.0,
            uo_round: 0,
            ep_round: 0,
            opt_status: OptStatus::NewIter,
            last_uo_state: vec![0.0; n],
            last_uo_energy: 0.0,
            last_ep_state: vec![0.0; n],
            last_ep_energy: 0.0,
            last_gradient: vec![0.0; n],
            last_gradient_preconditioned: vec![0.0; n],
            last_obj_energies: vec![],
            last_constr_energies: vec![],
            lbfgs_info: LbfgsState::new(17),
            curr_oracle: None,
            oracle_factory: Some(factory),
            init_constraint_weight: 10.0,
            mem_size: 17,
            uo_stop: crate::inner::UO_STOP,
            ep_stop: EP_STOP,
            weight_growth_factor: WEIGHT_GROWTH_FACTOR,
        };
        State {
            varying_values: x0,
            frozen_values: FrozenSet::new(),
            params,
        }
    }

    #[test]
    fn new_iter_binds_oracle_without_iterating() {
        let state = unconstrained_quadratic_state(vec![5.0]);
        let next = step(&state, 10).unwrap();
        assert_eq!(next.params.opt_status, OptStatus::UnconstrainedRunning);
        assert_eq!(next.varying_values, vec![5.0]);
        assert!(next.params.curr_oracle.is_some());
    }

    #[test]
    fn runs_to_unconstrained_convergence() {
        let state = unconstrained_quadratic_state(vec![5.0, -3.0]);
        let state = step(&state, 10).unwrap();
        let state = step(&state, 50).unwrap();
        assert_eq!(state.params.opt_status, OptStatus::UnconstrainedConverged);
        assert_relative_eq!(state.varying_values[0], 0.0, epsilon = 1e-2);
        assert_relative_eq!(state.varying_values[1], 0.0, epsilon = 1e-2);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let state = unconstrained_quadratic_state(vec![1.0]);
        let mut state = step(&state, 10).unwrap();
        loop {
            state = step(&state, 50).unwrap();
            if state.params.opt_status == OptStatus::EPConverged
                || state.params.opt_status == OptStatus::Error
            {
                break;
            }
        }
        let once = step(&state, 3).unwrap();
        let twice = step(&once, 99).unwrap();
        assert_eq!(once.varying_values, twice.varying_values);
        assert_eq!(once.params.opt_status, twice.params.opt_status);
    }

    #[test]
    fn rejects_zero_steps() {
        let state = unconstrained_quadratic_state(vec![1.0]);
        assert!(step(&state, 0).is_err());
    }

    #[test]
    fn frozen_index_is_never_moved() {
        let mut frozen = FrozenSet::new();
        frozen.insert(1);
        let mut state = unconstrained_quadratic_state(vec![10.0, 7.0]);
        state.frozen_values = frozen;
        let mut s = step(&state, 10).unwrap();
        for _ in 0..10 {
            s = step(&s, 20).unwrap();
            assert_eq!(s.varying_values[1], 7.0);
            if matches!(
                s.params.opt_status,
                OptStatus::EPConverged | OptStatus::Error
            ) {
                break;
            }
        }
    }

    #[test]
    fn missing_oracle_is_a_catchable_error_not_a_panic() {
        // Simulates a checkpoint-resumed state: curr_oracle/oracle_factory were skipped on
        // deserialization and never rebound by the caller.
        let mut state = unconstrained_quadratic_state(vec![1.0]);
        state.params.curr_oracle = None;
        state.params.oracle_factory = None;
        state.params.opt_status = OptStatus::UnconstrainedRunning;
        let err = step(&state, 10).unwrap_err();
        assert!(err.to_string().contains("missing its bound oracle"));

        state.params.opt_status = OptStatus::NewIter;
        let err = step(&state, 10).unwrap_err();
        assert!(err.to_string().contains("missing its bound oracle"));
    }
}
