// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! ep-optimizer is a constrained numerical optimization core written entirely in Rust.
//!
//! It drives a user-supplied energy/gradient oracle with an Exterior-Point (EP) penalty method:
//! an outer loop grows a constraint-penalty weight across rounds of an inner unconstrained
//! L-BFGS minimization, each inner step sized by an Armijo/weak-Wolfe line search. The whole
//! thing is exposed as a single pure function, [`ep::step`], so a caller can resume an
//! optimization from any previously returned [`ep::State`] — there is no in-progress call stack
//! to lose across a crash, a process boundary, or a network round-trip.
//!
//! Construction of the objective/constraint computation graph and its gradient is out of scope:
//! callers plug in compiled terms via [`builder::CompiledTerm`] and get back an initial `State`
//! from [`builder::build_problem`].
//!
//! # Highlights
//!
//! * [Checkpointing](`crate::checkpointing`)
//! * [Observers](`crate::observers`)
//!
//! # Algorithm
//!
//! - [Exterior-Point state machine](`crate::ep::step`)
//! - [L-BFGS two-loop recursion](`crate::lbfgs::lbfgs_step`)
//! - [Armijo / weak-Wolfe line search](`crate::linesearch::aw_line_search`)
//!
//! # License
//!
//! Licensed under either of
//!
//!   * Apache License, Version 2.0,
//!     ([LICENSE-APACHE](https://github.com/argmin-rs/argmin/blob/main/LICENSE-APACHE) or
//!     <http://www.apache.org/licenses/LICENSE-2.0>)
//!   * MIT License ([LICENSE-MIT](https://github.com/argmin-rs/argmin/blob/main/LICENSE-MIT) or
//!     <http://opensource.org/licenses/MIT>)
//!
//! at your option.
//!
//! ## Contribution
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted for inclusion
//! in the work by you, as defined in the Apache-2.0 license, shall be dual licensed as above,
//! without any additional terms or conditions.

#![warn(missing_docs)]
#![deny(clippy::float_cmp)]

/// Error types and the crate-wide `Result` alias.
pub mod error;

/// Small `&[f64]`-oriented vector math helpers.
pub mod vecmath;

/// The oracle contract and the EP penalty-to-gradient bookkeeping built on top of it.
pub mod oracle;

/// The L-BFGS two-loop recursion and its bounded correction history.
pub mod lbfgs;

/// The Armijo / weak-Wolfe bracketing line search.
pub mod linesearch;

/// The inner unconstrained-minimization loop.
pub mod inner;

/// The outer Exterior-Point state machine.
pub mod ep;

/// Wires a [`builder::CompiledTerm`] objective/constraint set into an oracle factory and an
/// initial `State`.
pub mod builder;

/// Builder-style configuration for the L-BFGS history depth and the outer EP driver's
/// thresholds/growth rate.
pub mod config;

/// A small key-value store used to hand diagnostic metrics to observers.
pub mod kv;

/// Progress observers, including an optional `slog`-backed terminal logger.
pub mod observers;

/// File-backed checkpointing of `State`, behind the `serde1` feature.
#[cfg(feature = "serde1")]
pub mod checkpointing;

/// A thin optional wrapper pairing `ep::step` with an observer list.
pub mod driver;

pub use crate::ep::{step, OptParams, OptStatus, State};
pub use crate::error::{Error, OptError, Result};
