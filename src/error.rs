// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Errors

use thiserror::Error;

/// The crate's error type. [`OptError`] variants are converted into this via `.into()` at each
/// call site so that callers who want to compose this crate's errors with their own can do so
/// through `anyhow`.
pub type Error = anyhow::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal and bookkeeping errors raised by the optimizer.
///
/// `NaNInState`, `NaNInGradient`, `InvalidLbfgsState`, `InsufficientSteps` and `MissingOracle`
/// are fatal and abort the current call. A NaN observed in the energy or gradient norm *after* a
/// successful oracle evaluation is recoverable and is never constructed as an `Err` —
/// [`crate::inner::minimize`] observes it internally and reports `failed = true` instead, which
/// the outer driver turns into `OptStatus::Error`. A non-descent L-BFGS direction is not an error
/// at all; it is handled locally by resetting history.
#[derive(Debug, Error)]
pub enum OptError {
    /// NaN found in the parameter vector before an oracle evaluation.
    #[error("NaN in parameter vector before evaluation")]
    NaNInState,

    /// NaN found in a gradient returned by the oracle.
    #[error("NaN in gradient returned by oracle")]
    NaNInGradient,

    /// Internal invariant violated: `numUnconstrSteps > 0` but `lastX`/`lastGrad` are missing.
    #[error("invalid L-BFGS state: step counter {0} is nonzero but no prior point is recorded")]
    InvalidLbfgsState(u64),

    /// `minimize` was called with `steps < 1`.
    #[error("minimize requires at least 1 step, got {0}")]
    InsufficientSteps(u64),

    /// `step` was called on a state whose bound oracle or oracle factory is missing — the usual
    /// cause is resuming from a checkpoint (oracles are not serializable and are skipped on load)
    /// without rebinding `oracle_factory` first.
    #[error("state is missing its bound oracle or oracle factory; rebind oracle_factory before calling step again")]
    MissingOracle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            OptError::NaNInState.to_string(),
            "NaN in parameter vector before evaluation"
        );
        assert_eq!(
            OptError::InsufficientSteps(0).to_string(),
            "minimize requires at least 1 step, got 0"
        );
    }
}
