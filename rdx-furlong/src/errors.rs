//! The engine's error taxonomy.
//!
//! Only genuinely exceptional outcomes live here. An ownership conflict is
//! an expected result under concurrent callers and is reported through
//! `TickOutcome::Skipped`, not as an error; a lost conditional write is
//! reported as `TickOutcome::Conflict`. Both resolve themselves on the next
//! tick.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A read or write against one of the backing stores failed. The
    /// current tick is abandoned without mutating in-memory derived state;
    /// the next tick retries from the authoritative row.
    #[error("store operation failed: {0}")]
    Store(String),

    /// The catalog cannot supply enough unique names to assemble a race.
    /// Fatal for this assembly attempt; the previous race's cleanup is
    /// retried on the next tick.
    #[error("catalog has {available} unique names, need {needed}")]
    InsufficientCatalog { needed: usize, available: usize },

    /// A programming defect was detected (duplicate placement, illegal
    /// phase transition, ...). The offending state is never written.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
