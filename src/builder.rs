// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The problem builder: wraps an external graph-compiler collaborator's compiled energy/gradient
//! function with the EP scalarization and produces the optimizer's initial [`State`].
//!
//! Construction of the computation graph, symbolic differentiation, and compilation to an
//! executable function are out of scope — this module only specifies and implements the contract
//! at that boundary.

use crate::config::{EpParams, LbfgsParams};
use crate::ep::{OptParams, OptStatus, State};
use crate::lbfgs::LbfgsState;
use crate::oracle::{mask_gradient, FrozenSet, InputMeta, Oracle, OracleFactory, OracleResult};
use std::sync::Arc;

/// A single term (objective or constraint) as a compiled, evaluable function of the full
/// parameter vector. This is the seam at which the external graph-compiler collaborator plugs
/// in: it hands over one closure per term rather than a graph handle, since the graph
/// representation itself is out of scope here.
pub trait CompiledTerm: Send + Sync {
    /// Evaluate the term's scalar value at `x`.
    fn value(&self, x: &[f64]) -> f64;
    /// Evaluate the term's gradient with respect to the full parameter vector at `x`.
    fn gradient(&self, x: &[f64]) -> Vec<f64>;
}

/// Build an oracle factory from compiled objective and constraint terms.
///
/// Computes `ϕ(x; w) = Σ oⱼ(x) + c₀·w·Σᵢ penalty(cᵢ(x))`, with `c₀` fixed at
/// [`crate::oracle::CONSTRAINT_WEIGHT`] and `w` supplied per oracle-factory call. The returned
/// gradient is masked per `inputs`/`frozen` before being handed to the optimizer.
///
/// TODO: per-constraint scaling (scaling each constraint so the penalty it generates is about the
/// same magnitude as the others) is not implemented; every constraint term is summed with the
/// same weight.
pub fn make_oracle_factory(
    n: usize,
    inputs: Vec<InputMeta>,
    objectives: Vec<Arc<dyn CompiledTerm>>,
    constraints: Vec<Arc<dyn CompiledTerm>>,
) -> OracleFactory {
    Arc::new(move |weight: f64, frozen: &FrozenSet| -> Oracle {
        let inputs = inputs.clone();
        let objectives = objectives.clone();
        let constraints = constraints.clone();
        let frozen = frozen.clone();
        Arc::new(move |x: &[f64]| -> OracleResult {
            debug_assert_eq!(x.len(), n);

            let obj_energies: Vec<f64> = objectives.iter().map(|o| o.value(x)).collect();
            let constr_raw: Vec<f64> = constraints.iter().map(|c| c.value(x)).collect();
            let constr_energies: Vec<f64> =
                constr_raw.iter().copied().map(crate::oracle::penalty).collect();

            let phi = obj_energies.iter().sum::<f64>()
                + crate::oracle::CONSTRAINT_WEIGHT * weight * constr_energies.iter().sum::<f64>();

            let mut grad = vec![0.0; n];
            for o in &objectives {
                let g = o.gradient(x);
                for i in 0..n.min(g.len()) {
                    grad[i] += g[i];
                }
            }
            // d/dx [ max(c,0)^2 ] = 2*max(c,0) * dc/dx
            for (c_val, c) in constr_raw.iter().zip(constraints.iter()) {
                if *c_val > 0.0 {
                    let g = c.gradient(x);
                    let scale = crate::oracle::CONSTRAINT_WEIGHT * weight * 2.0 * c_val;
                    for i in 0..n.min(g.len()) {
                        grad[i] += scale * g[i];
                    }
                }
            }

            let grad = mask_gradient(grad, &inputs, &frozen);

            OracleResult {
                phi,
                grad,
                obj_energies,
                constr_energies,
            }
        })
    })
}

/// Build the initial [`State`] for a problem.
///
/// `init_constraint_weight` is the problem-supplied initial EP weight; callers without a
/// domain-specific value typically pass `10.0` times a representative initial objective value.
///
/// Uses the library defaults for `uoStop`, `epStop`, weight growth, and L-BFGS history depth; see
/// [`build_problem_with_config`] to override any of those via [`EpParams`]/[`LbfgsParams`].
pub fn build_problem(
    x0: Vec<f64>,
    inputs: Vec<InputMeta>,
    objectives: Vec<Arc<dyn CompiledTerm>>,
    constraints: Vec<Arc<dyn CompiledTerm>>,
    init_constraint_weight: f64,
) -> State {
    build_problem_with_config(
        x0,
        inputs,
        objectives,
        constraints,
        EpParams::new(init_constraint_weight),
        LbfgsParams::new(),
    )
}

/// As [`build_problem`], but overriding the L-BFGS history depth (`memSize`).
pub fn build_problem_with_mem_size(
    x0: Vec<f64>,
    inputs: Vec<InputMeta>,
    objectives: Vec<Arc<dyn CompiledTerm>>,
    constraints: Vec<Arc<dyn CompiledTerm>>,
    init_constraint_weight: f64,
    mem_size: usize,
) -> State {
    build_problem_with_config(
        x0,
        inputs,
        objectives,
        constraints,
        EpParams::new(init_constraint_weight),
        LbfgsParams::new().with_mem_size(mem_size),
    )
}

/// As [`build_problem`], but taking the full [`EpParams`]/[`LbfgsParams`] configuration surface
/// rather than just `init_constraint_weight`/`mem_size`.
pub fn build_problem_with_config(
    x0: Vec<f64>,
    inputs: Vec<InputMeta>,
    objectives: Vec<Arc<dyn CompiledTerm>>,
    constraints: Vec<Arc<dyn CompiledTerm>>,
    ep_params: EpParams,
    lbfgs_params: LbfgsParams,
) -> State {
    let n = x0.len();
    let factory = make_oracle_factory(n, inputs, objectives, constraints);
    let frozen = FrozenSet::new();
    let init_constraint_weight = ep_params.init_constraint_weight();
    let mem_size = lbfgs_params.mem_size();
    let curr_oracle = factory(init_constraint_weight, &frozen);

    let params = OptParams {
        weight: init_constraint_weight,
        uo_round: 0,
        ep_round: 0,
        opt_status: OptStatus::UnconstrainedRunning,
        last_uo_state: x0.clone(),
        last_uo_energy: 0.0,
        last_ep_state: x0.clone(),
        last_ep_energy: 0.0,
        last_gradient: vec![0.0; n],
        last_gradient_preconditioned: vec![0.0; n],
        last_obj_energies: vec![],
        last_constr_energies: vec![],
        lbfgs_info: LbfgsState::new(mem_size),
        curr_oracle: Some(curr_oracle),
        oracle_factory: Some(factory),
        init_constraint_weight,
        mem_size,
        uo_stop: ep_params.uo_stop(),
        ep_stop: ep_params.ep_stop(),
        weight_growth_factor: ep_params.weight_growth_factor(),
    };

    State {
        varying_values: x0,
        frozen_values: frozen,
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ep::step;
    use crate::oracle::InputTag;
    use approx::assert_relative_eq;

    struct Square {
        target: f64,
    }

    impl CompiledTerm for Square {
        fn value(&self, x: &[f64]) -> f64 {
            (x[0] - self.target).powi(2)
        }
        fn gradient(&self, x: &[f64]) -> Vec<f64> {
            vec![2.0 * (x[0] - self.target)]
        }
    }

    struct NonNegative {
        index: usize,
    }

    impl CompiledTerm for NonNegative {
        fn value(&self, x: &[f64]) -> f64 {
            -x[self.index]
        }
        fn gradient(&self, x: &[f64]) -> Vec<f64> {
            let mut g = vec![0.0; x.len()];
            g[self.index] = -1.0;
            g
        }
    }

    #[test]
    fn one_d_quadratic_converges_without_constraints() {
        let objectives: Vec<Arc<dyn CompiledTerm>> = vec![Arc::new(Square { target: 3.0 })];
        let state = build_problem(
            vec![0.0],
            vec![InputMeta::optimized()],
            objectives,
            vec![],
            10.0,
        );
        let state = step(&state, 50).unwrap();
        assert_eq!(
            state.params.opt_status,
            crate::ep::OptStatus::UnconstrainedConverged
        );
        assert_relative_eq!(state.varying_values[0], 3.0, epsilon = 1e-2);
    }

    #[test]
    fn linear_objective_with_inequality_grows_weight_across_ep_rounds() {
        // minimize x, subject to x >= 0 (penalty = max(-x, 0)^2), x0 = -5.
        struct Linear;
        impl CompiledTerm for Linear {
            fn value(&self, x: &[f64]) -> f64 {
                x[0]
            }
            fn gradient(&self, _x: &[f64]) -> Vec<f64> {
                vec![1.0]
            }
        }
        let objectives: Vec<Arc<dyn CompiledTerm>> = vec![Arc::new(Linear)];
        let constraints: Vec<Arc<dyn CompiledTerm>> = vec![Arc::new(NonNegative { index: 0 })];
        let mut state = build_problem(
            vec![-5.0],
            vec![InputMeta::optimized()],
            objectives,
            constraints,
            10.0,
        );
        let initial_weight = state.params.weight;
        for _ in 0..200 {
            state = step(&state, 50).unwrap();
            if matches!(
                state.params.opt_status,
                crate::ep::OptStatus::EPConverged | crate::ep::OptStatus::Error
            ) {
                break;
            }
        }
        assert!(state.params.weight >= initial_weight * crate::ep::WEIGHT_GROWTH_FACTOR);
        assert!(state.params.ep_round >= 2);
        assert_relative_eq!(state.varying_values[0], 0.0, epsilon = 1e-1);
    }

    #[test]
    fn input_meta_pending_is_masked_regardless_of_frozen_set() {
        let objectives: Vec<Arc<dyn CompiledTerm>> = vec![Arc::new(Square { target: 3.0 })];
        let state = build_problem(
            vec![0.0, 2.0],
            vec![InputMeta::optimized(), InputMeta::pending()],
            objectives,
            vec![],
            10.0,
        );
        let oracle = state.params.curr_oracle.clone().unwrap();
        let result = oracle(&[0.0, 2.0]);
        assert_eq!(result.grad[1], 0.0);
        let _ = InputTag::Optimized;
    }

    #[test]
    fn build_problem_with_config_honors_overridden_thresholds() {
        use crate::config::{EpParams, LbfgsParams};

        let objectives: Vec<Arc<dyn CompiledTerm>> = vec![Arc::new(Square { target: 3.0 })];
        let ep_params = EpParams::new(5.0)
            .with_uo_stop(1e-4)
            .with_ep_stop(1e-5)
            .with_weight_growth_factor(3.0);
        let lbfgs_params = LbfgsParams::new().with_mem_size(4);
        let state = build_problem_with_config(
            vec![0.0],
            vec![InputMeta::optimized()],
            objectives,
            vec![],
            ep_params,
            lbfgs_params,
        );
        assert_eq!(state.params.weight, 5.0);
        assert_eq!(state.params.uo_stop, 1e-4);
        assert_eq!(state.params.ep_stop, 1e-5);
        assert_eq!(state.params.weight_growth_factor, 3.0);
        assert_eq!(state.params.mem_size, 4);
    }
}
