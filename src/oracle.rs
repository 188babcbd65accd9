// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The oracle contract: the external collaborator that turns a point `x` into a scalar energy,
//! its gradient, and the individual objective/constraint term values.
//!
//! Construction of the computation graph, symbolic differentiation and compilation to an
//! executable function are out of scope; this module only specifies the interface those
//! collaborators must provide.

use std::collections::HashSet;

/// Set of parameter indices whose gradient components are forced to zero.
pub type FrozenSet = HashSet<usize>;

/// Whether a parameter index is driven by the optimizer or held constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum InputTag {
    /// The optimizer is free to move this parameter.
    Optimized,
    /// The parameter is a constant as far as the optimizer is concerned.
    Pending,
}

/// Per-parameter metadata, one entry per index of `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct InputMeta {
    /// Optimized vs. Pending tag for this index.
    pub tag: InputTag,
}

impl InputMeta {
    /// A parameter the optimizer is free to move.
    pub fn optimized() -> Self {
        InputMeta {
            tag: InputTag::Optimized,
        }
    }

    /// A parameter held constant regardless of `frozen`.
    pub fn pending() -> Self {
        InputMeta {
            tag: InputTag::Pending,
        }
    }
}

/// The scalar energy, its gradient, and the per-term breakdown at one point `x`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct OracleResult {
    /// `ϕ(x)`, the scalarized energy `O(x) + c₀·w·Σᵢ penalty(Cᵢ(x))`.
    pub phi: f64,
    /// `∇ϕ(x)`, already masked to zero for frozen/non-`Optimized` indices.
    pub grad: Vec<f64>,
    /// Individual objective-term values `oⱼ(x)`.
    pub obj_energies: Vec<f64>,
    /// Individual constraint-term penalty values `penalty(cᵢ(x))`.
    pub constr_energies: Vec<f64>,
}

/// A pure, deterministic, side-effect-free energy/gradient oracle bound to a fixed EP weight.
///
/// Implemented as a boxed closure rather than a trait object hierarchy: the oracle is exactly one
/// function, `x ↦ OracleResult`, and an `Fn` closure is the idiomatic way to hand that across the
/// EP driver without inventing a single-method trait for it.
pub type Oracle = std::sync::Arc<dyn Fn(&[f64]) -> OracleResult + Send + Sync>;

/// `(weight, frozen) → oracle`, supplied by the builder's external graph-compiler collaborator.
///
/// Re-binding the oracle on every EP weight change (rather than mutating a weight field inside
/// one long-lived oracle) is what makes `State` — which stores the currently bound oracle —
/// plain, replaceable data: a new EP round gets a new oracle value, not a mutation of the old one.
pub type OracleFactory = std::sync::Arc<dyn Fn(f64, &FrozenSet) -> Oracle + Send + Sync>;

/// `c₀`, the fixed multiplier on the summed constraint penalty.
pub const CONSTRAINT_WEIGHT: f64 = 1e4;

/// `penalty(v) = max(v, 0)²` — zero when `v ≤ 0`, quadratic in violation otherwise.
pub fn penalty(v: f64) -> f64 {
    v.max(0.0).powi(2)
}

/// Zero out gradient entries for indices that are frozen or not tagged `Optimized`.
///
/// `∇ϕ'[i] = ∇ϕ[i]` iff `inputs[i].tag == Optimized` and `i ∉ frozen`, else `0`. Missing gradient
/// entries (a gradient shorter than `inputs`) are treated as `0`.
pub fn mask_gradient(mut grad: Vec<f64>, inputs: &[InputMeta], frozen: &FrozenSet) -> Vec<f64> {
    grad.resize(inputs.len(), 0.0);
    for (i, meta) in inputs.iter().enumerate() {
        if meta.tag != InputTag::Optimized || frozen.contains(&i) {
            grad[i] = 0.0;
        }
    }
    grad
}
