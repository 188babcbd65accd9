// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Observers let a caller watch the EP driver's progress (weight, round counters, energy,
//! convergence metric) without threading any of that through [`crate::ep::State`] itself, which
//! must stay plain, serializable data so it can cross a resumability boundary untouched.

use crate::kv::KV;

/// Something that wants to be told about driver progress.
pub trait Observe: Send + Sync {
    /// Called after a `step` call that ran (or attempted to run) inner iterations.
    fn observe(&self, kv: &KV);
}

/// Logs to the terminal via `slog`, available behind the `slog-logger` feature.
#[cfg(feature = "slog-logger")]
pub struct SlogLogger {
    logger: slog::Logger,
}

#[cfg(feature = "slog-logger")]
impl SlogLogger {
    /// Log to the terminal, blocking on overflow.
    pub fn term() -> Self {
        Self::term_internal(slog_async::OverflowStrategy::Block)
    }

    /// Log to the terminal, dropping messages on overflow rather than blocking.
    pub fn term_noblock() -> Self {
        Self::term_internal(slog_async::OverflowStrategy::Drop)
    }

    fn term_internal(overflow_strategy: slog_async::OverflowStrategy) -> Self {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator)
            .use_original_order()
            .build()
            .fuse();
        let drain = slog_async::Async::new(drain)
            .overflow_strategy(overflow_strategy)
            .build()
            .fuse();
        SlogLogger {
            logger: slog::Logger::root(drain, slog::o!()),
        }
    }
}

/// Adapts [`KV`] to `slog::KV` so it can be passed as structured fields to `slog`'s macros.
#[cfg(feature = "slog-logger")]
struct SlogKV<'a>(&'a KV);

#[cfg(feature = "slog-logger")]
impl slog::KV for SlogKV<'_> {
    fn serialize(&self, _record: &slog::Record, serializer: &mut dyn slog::Serializer) -> slog::Result {
        for (key, val) in self.0.kv.iter().rev() {
            serializer.emit_str(slog::Key::from(*key), val)?;
        }
        Ok(())
    }
}

#[cfg(feature = "slog-logger")]
impl Observe for SlogLogger {
    fn observe(&self, kv: &KV) {
        slog::info!(self.logger, ""; SlogKV(kv));
    }
}
