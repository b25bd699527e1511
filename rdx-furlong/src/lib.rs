//! # Furlong
//!
//! A server-authoritative, phased horse race simulation and rating engine.
//!
//! Furlong runs a repeating race as a strict state machine over one
//! authoritative state row. An external trigger ticks the engine; each tick
//! derives every timer from the wall clock, advances the simulation while
//! racing, and settles an ELO-style rating book when a race completes. Any
//! number of viewers observe the same row concurrently through a broadcast
//! subscription, while timer ownership guarantees that only one of many
//! concurrent drivers advances the race at a time.
//!
//! ## Core Concepts
//!
//! - **RaceState**: the single authoritative row (phase, field, timers,
//!   results), rewritten only through conditional (compare-and-set) writes.
//! - **Phased lifecycle**: PreRace → Countdown → Racing → Finished, looping
//!   back to a fresh PreRace. Transitions are strictly linear.
//! - **Kinetic phases**: while racing, motion moves through pack,
//!   transition, and sprint regimes; the skill rating matters more the
//!   deeper into the race the field gets.
//! - **Rating book**: per-name ELO-style ratings and historical stats,
//!   settled exactly once per race with a full pairwise update.
//! - **Timer ownership**: an atomic claim/release protocol electing the
//!   single actor allowed to drive the shared timers.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use furlong::prelude::*;
//! use furlong::rating::RatingEngine;
//! use furlong::roster::HorseRoster;
//! use furlong::store::{MemoryRaceStore, MemoryRatingBook, StaticCatalog};
//! use furlong::time::SystemClock;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a configuration and the backing stores.
//!     let config = FurlongConfig::default();
//!     let store = Arc::new(MemoryRaceStore::new(RaceState::empty(chrono::Utc::now())));
//!     let book = Arc::new(MemoryRatingBook::new());
//!
//!     // 2. Wire the engine together.
//!     let ratings = RatingEngine::new(book, config.rating.clone());
//!     let roster = HorseRoster::new(Arc::new(StaticCatalog::default()), ratings.clone());
//!     let controller = Arc::new(RacePhaseController::new(
//!         ActorId::from("ticker-1"),
//!         Arc::new(SystemClock),
//!         store.clone(),
//!         roster,
//!         ratings,
//!         config,
//!     ));
//!
//!     // 3. Subscribe to an event stream before starting the automation.
//!     let supervisor = AutomationSupervisor::new(controller);
//!     let mut race_events = supervisor.subscribe_race_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = race_events.recv().await {
//!             println!("Received Race Event: {:?}", event);
//!         }
//!     });
//!
//!     // 4. Run until Ctrl+C.
//!     supervisor.start().await;
//!     tokio::signal::ctrl_c().await?;
//!     supervisor.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Furlong Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


// Declare all the modules in the crate.
pub mod common;
pub mod config;
pub mod controller;
pub mod errors;
pub mod events;
pub mod ownership;
pub mod rating;
pub mod roster;
pub mod simulator;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod time;

/// A prelude module for easy importing of the most common Furlong types.
pub mod prelude {
    pub use crate::common::{ActorId, ListenerId};
    pub use crate::config::FurlongConfig;
    pub use crate::controller::{RacePhaseController, TickOutcome};
    pub use crate::errors::EngineError;
    pub use crate::events::{PhaseEvent, RaceEvent, SystemEvent};
    pub use crate::state::{Contestant, FinishRecord, RacePhase, RaceState};
    pub use crate::supervisor::AutomationSupervisor;
}
