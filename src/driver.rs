// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A thin, optional wrapper around the pure [`step`] function that reports progress to
//! [`Observe`]rs after each call that actually ran inner iterations.
//!
//! `step` itself stays exactly the pure `(State, steps) -> Result<State>` function it always
//! was; this wrapper is additive ergonomics for callers who also want an observer stack, not a
//! replacement for calling `step` directly.

use crate::ep::{step, OptStatus, State};
use crate::error::Result;
use crate::kv::KV;
use crate::observers::Observe;

/// Owns a set of observers and reports to them after every [`step`] call that ran inner
/// iterations.
pub struct Driver {
    observers: Vec<Box<dyn Observe>>,
}

impl Driver {
    /// A driver with no observers attached.
    pub fn new() -> Self {
        Driver {
            observers: Vec::new(),
        }
    }

    /// Attach an observer. Returns `self` for chaining.
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn Observe>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Run `step(state, steps)` and report the resulting bookkeeping to every attached observer,
    /// but only when `state` entered `step` as `UnconstrainedRunning` — the only status under
    /// which `step` actually runs `minimize`'s inner iterations (see `ep::step`). The
    /// `NewIter`→`UnconstrainedRunning` and `UnconstrainedConverged`→`{UnconstrainedRunning,
    /// EPConverged}` transitions do zero inner iterations, so there is no new iteration state to
    /// report for them.
    pub fn step(&self, state: &State, steps: u64) -> Result<State> {
        let ran_inner_iterations = matches!(state.params.opt_status, OptStatus::UnconstrainedRunning);
        let next = step(state, steps)?;
        if ran_inner_iterations {
            let kv = KV::new()
                .push("weight", next.params.weight)
                .push("uo_round", next.params.uo_round)
                .push("ep_round", next.params.ep_round)
                .push("phi", next.params.last_uo_energy)
                .push("status", format!("{:?}", next.params.opt_status));
            for observer in &self.observers {
                observer.observe(&kv);
            }
        }
        Ok(next)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}
