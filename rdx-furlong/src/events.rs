//! Defines all public event types broadcast by the Furlong engine.
//!
//! This module acts as the public API for the engine's event system.
//! Listeners subscribe to these specific, strongly-typed events to perform
//! their work; nothing in the core ever blocks on a listener.

use chrono::{DateTime, Utc};

use crate::common::ActorId;
use crate::rating::RatingChange;
use crate::state::{FinishRecord, RacePhase};

/// Fired on every committed phase transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseEvent {
    pub from: RacePhase,
    pub to: RacePhase,
    pub at: DateTime<Utc>,
}

/// Events describing the race itself.
#[derive(Debug, Clone)]
pub enum RaceEvent {
    /// The race moved to its next lifecycle phase.
    PhaseChanged(PhaseEvent),
    /// The full finish order is in.
    RaceFinished { results: Vec<FinishRecord> },
    /// Ratings and historical stats were written back to the book.
    RatingsSettled { changes: Vec<RatingChange> },
}

/// Events related to the lifecycle and health of the automation itself.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the supervisor's tick loop begins.
    SupervisorStarted { at: DateTime<Utc> },
    /// Fired once when the supervisor's tick loop exits.
    SupervisorStopped,
    /// Another actor held timer ownership this tick. Expected under
    /// concurrent callers; the tick's timer work was skipped.
    TickSkipped { holder: Option<ActorId> },
    /// A conditional write lost to a concurrent committed write.
    TickConflicted,
    /// The tick aborted on an error; the next tick retries.
    TickFailed { reason: String },
}
