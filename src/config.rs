// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Builder-style configuration for the two tunable surfaces this crate exposes: the L-BFGS
//! history depth and the outer EP driver's thresholds/growth rate. There is no environment or
//! file configuration for this crate — a pure computation core has no ambient process
//! environment to read — so "configuration" here is plain, in-memory, `Default`-backed structs
//! overridable through `with_*` setters.

use crate::ep::{EP_STOP, WEIGHT_GROWTH_FACTOR};
use crate::inner::UO_STOP;
use crate::lbfgs::DEFAULT_MEM_SIZE;

/// Configures the L-BFGS preconditioner used by the inner minimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LbfgsParams {
    mem_size: usize,
}

impl LbfgsParams {
    /// Defaults: `memSize = `[`DEFAULT_MEM_SIZE`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the L-BFGS history depth (`m`). Must be `>= 1`.
    #[must_use]
    pub fn with_mem_size(mut self, mem_size: usize) -> Self {
        self.mem_size = mem_size;
        self
    }

    /// The configured history depth.
    pub fn mem_size(&self) -> usize {
        self.mem_size
    }
}

impl Default for LbfgsParams {
    fn default() -> Self {
        LbfgsParams {
            mem_size: DEFAULT_MEM_SIZE,
        }
    }
}

/// Configures the outer Exterior-Point driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpParams {
    init_constraint_weight: f64,
    uo_stop: f64,
    ep_stop: f64,
    weight_growth_factor: f64,
}

impl EpParams {
    /// Defaults: `epStop = `[`EP_STOP`]`, `uoStop = `[`UO_STOP`]`, weight growth =
    /// [`WEIGHT_GROWTH_FACTOR`]. `init_constraint_weight` has no sensible library-wide default
    /// (it is problem-scaled) and must be supplied.
    pub fn new(init_constraint_weight: f64) -> Self {
        EpParams {
            init_constraint_weight,
            uo_stop: UO_STOP,
            ep_stop: EP_STOP,
            weight_growth_factor: WEIGHT_GROWTH_FACTOR,
        }
    }

    /// Override `uoStop`, the inner-minimizer convergence threshold. The default is intentionally
    /// loose; tightening it interacts poorly with the line search's `MIN_INTERVAL`, so re-run the
    /// quadratic-exactness regression test after changing it.
    #[must_use]
    pub fn with_uo_stop(mut self, uo_stop: f64) -> Self {
        self.uo_stop = uo_stop;
        self
    }

    /// Override `epStop`, the round-over-round EP convergence threshold.
    #[must_use]
    pub fn with_ep_stop(mut self, ep_stop: f64) -> Self {
        self.ep_stop = ep_stop;
        self
    }

    /// Override the per-round constraint-weight growth multiplier.
    #[must_use]
    pub fn with_weight_growth_factor(mut self, weight_growth_factor: f64) -> Self {
        self.weight_growth_factor = weight_growth_factor;
        self
    }

    /// The configured initial constraint weight.
    pub fn init_constraint_weight(&self) -> f64 {
        self.init_constraint_weight
    }

    /// The configured `uoStop`.
    pub fn uo_stop(&self) -> f64 {
        self.uo_stop
    }

    /// The configured `epStop`.
    pub fn ep_stop(&self) -> f64 {
        self.ep_stop
    }

    /// The configured weight growth multiplier.
    pub fn weight_growth_factor(&self) -> f64 {
        self.weight_growth_factor
    }
}
