//! Collaborator store boundaries and their in-memory reference backends.
//!
//! The engine only ever talks to its persistence through the three traits
//! in this module: the authoritative [`RaceStateStore`] row, the
//! [`RatingBookStore`] keyed by horse name, and the cosmetic
//! [`NameCatalog`]. Each trait call is atomic; the in-memory backends keep
//! that contract with a single mutex per store and publish every committed
//! row through a `broadcast` channel so any number of viewers can observe
//! consistent snapshots in parallel with tick processing.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::common::ActorId;
use crate::errors::EngineError;
use crate::state::{HorseStats, RaceState};

/// Result of a conditional write against the authoritative row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed,
    /// The row moved since it was read; nothing was written.
    Conflict,
}

/// The authoritative store holding the single current-race row.
pub trait RaceStateStore: Send + Sync {
    /// A consistent snapshot of the current row.
    fn read(&self) -> Result<RaceState, EngineError>;

    /// Writes `state` only if the row's version still equals
    /// `expected_version`. The store assigns the new version itself and
    /// notifies subscribers on commit.
    fn conditional_write(
        &self,
        expected_version: u64,
        state: RaceState,
    ) -> Result<WriteOutcome, EngineError>;

    /// Single atomic compare-and-set on the owner slot: succeeds iff the
    /// slot is empty or already holds `actor`.
    fn claim_timer(&self, actor: &ActorId) -> Result<bool, EngineError>;

    /// Clears the owner slot only if it still holds `actor`; no-op
    /// otherwise, so a slow releaser can never clobber a new owner.
    fn release_timer(&self, actor: &ActorId) -> Result<(), EngineError>;

    /// Subscribes to the full row emitted on every committed write.
    fn subscribe(&self) -> broadcast::Receiver<RaceState>;
}

/// Persistent per-name ratings and historical stats.
pub trait RatingBookStore: Send + Sync {
    fn rating(&self, name: &str) -> Result<Option<f64>, EngineError>;
    fn set_all(&self, ratings: &HashMap<String, f64>) -> Result<(), EngineError>;
    fn stats(&self, name: &str) -> Result<Option<HorseStats>, EngineError>;
    fn set_stats(&self, name: &str, stats: &HorseStats) -> Result<(), EngineError>;
    /// Clears the entire book atomically.
    fn reset_all(&self) -> Result<(), EngineError>;
}

/// Supplier of unique horse names. Cosmetics live outside the engine; this
/// is only the consumption contract.
pub trait NameCatalog: Send + Sync {
    fn list_names(&self) -> Vec<String>;
}

const STATE_CHANNEL_CAPACITY: usize = 256;

/// In-memory authoritative store. One mutex guards the row, which keeps
/// every trait call atomic; subscribers get the committed row via a
/// `broadcast` channel.
pub struct MemoryRaceStore {
    row: Mutex<RaceState>,
    notify: broadcast::Sender<RaceState>,
}

impl MemoryRaceStore {
    pub fn new(initial: RaceState) -> Self {
        let (notify, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            row: Mutex::new(initial),
            notify,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RaceState>, EngineError> {
        self.row
            .lock()
            .map_err(|_| EngineError::Store("race state mutex poisoned".into()))
    }
}

impl RaceStateStore for MemoryRaceStore {
    fn read(&self) -> Result<RaceState, EngineError> {
        Ok(self.lock()?.clone())
    }

    fn conditional_write(
        &self,
        expected_version: u64,
        state: RaceState,
    ) -> Result<WriteOutcome, EngineError> {
        let mut row = self.lock()?;
        if row.version != expected_version {
            return Ok(WriteOutcome::Conflict);
        }
        let mut next = state;
        next.version = row.version + 1;
        // Ownership is managed through claim/release only; a row rewrite
        // must not move the owner slot.
        next.timer_owner = row.timer_owner.clone();
        *row = next;
        self.notify.send(row.clone()).ok();
        Ok(WriteOutcome::Committed)
    }

    // Claim and release move only the owner slot. They are keyed on the
    // previous owner value, not the row version, and are not row writes:
    // viewers are not notified and the version does not move, so an
    // ownership handoff never invalidates a concurrent reader's snapshot.

    fn claim_timer(&self, actor: &ActorId) -> Result<bool, EngineError> {
        let mut row = self.lock()?;
        match &row.timer_owner {
            Some(owner) if owner == actor => Ok(true),
            Some(_) => Ok(false),
            None => {
                row.timer_owner = Some(actor.clone());
                Ok(true)
            }
        }
    }

    fn release_timer(&self, actor: &ActorId) -> Result<(), EngineError> {
        let mut row = self.lock()?;
        if row.timer_owner.as_ref() == Some(actor) {
            row.timer_owner = None;
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RaceState> {
        self.notify.subscribe()
    }
}

#[derive(Debug, Clone, Default)]
struct BookEntry {
    rating: Option<f64>,
    stats: Option<HorseStats>,
}

/// In-memory rating book.
#[derive(Default)]
pub struct MemoryRatingBook {
    entries: Mutex<HashMap<String, BookEntry>>,
}

impl MemoryRatingBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, BookEntry>>, EngineError> {
        self.entries
            .lock()
            .map_err(|_| EngineError::Store("rating book mutex poisoned".into()))
    }
}

impl RatingBookStore for MemoryRatingBook {
    fn rating(&self, name: &str) -> Result<Option<f64>, EngineError> {
        Ok(self.lock()?.get(name).and_then(|e| e.rating))
    }

    fn set_all(&self, ratings: &HashMap<String, f64>) -> Result<(), EngineError> {
        let mut entries = self.lock()?;
        for (name, rating) in ratings {
            entries.entry(name.clone()).or_default().rating = Some(*rating);
        }
        Ok(())
    }

    fn stats(&self, name: &str) -> Result<Option<HorseStats>, EngineError> {
        Ok(self.lock()?.get(name).and_then(|e| e.stats.clone()))
    }

    fn set_stats(&self, name: &str, stats: &HorseStats) -> Result<(), EngineError> {
        self.lock()?.entry(name.to_string()).or_default().stats = Some(stats.clone());
        Ok(())
    }

    fn reset_all(&self) -> Result<(), EngineError> {
        self.lock()?.clear();
        Ok(())
    }
}

/// The built-in stable. Deployments with a real catalog service implement
/// [`NameCatalog`] over it instead.
pub struct StaticCatalog {
    names: Vec<String>,
}

impl StaticCatalog {
    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        const STABLE: &[&str] = &[
            "Midnight Thunder",
            "Golden Fury",
            "Silver Bullet",
            "Storm Chaser",
            "Wild Spirit",
            "Lucky Charm",
            "Iron Hoof",
            "Copper Canyon",
            "Northern Gale",
            "Velvet Comet",
            "Ember Dash",
            "Quiet Tide",
            "Marble Arch",
            "Sudden Monsoon",
            "Paper Lantern",
            "Blue Meridian",
            "Harvest Moon",
            "Cinder Track",
            "Royal Verdict",
            "Drifting Smoke",
            "Last Furlong",
            "Morning Glory",
            "Granite Peak",
            "Saffron Sky",
        ];
        Self {
            names: STABLE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl NameCatalog for StaticCatalog {
    fn list_names(&self) -> Vec<String> {
        self.names.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn conditional_write_rejects_stale_version() {
        let store = MemoryRaceStore::new(RaceState::empty(Utc::now()));
        let snapshot = store.read().unwrap();

        let mut first = snapshot.clone();
        first.race_timer = 1.0;
        assert_eq!(
            store.conditional_write(snapshot.version, first).unwrap(),
            WriteOutcome::Committed
        );

        // A second writer still holding the old version must lose.
        let mut second = snapshot.clone();
        second.race_timer = 2.0;
        assert_eq!(
            store.conditional_write(snapshot.version, second).unwrap(),
            WriteOutcome::Conflict
        );
        assert_eq!(store.read().unwrap().race_timer, 1.0);
    }

    #[test]
    fn committed_writes_reach_subscribers() {
        let store = MemoryRaceStore::new(RaceState::empty(Utc::now()));
        let mut rx = store.subscribe();

        let snapshot = store.read().unwrap();
        let mut next = snapshot.clone();
        next.race_timer = 3.5;
        store.conditional_write(snapshot.version, next).unwrap();

        let seen = rx.try_recv().unwrap();
        assert_eq!(seen.race_timer, 3.5);
        assert_eq!(seen.version, snapshot.version + 1);
    }

    #[test]
    fn claim_is_exclusive_and_reentrant() {
        let store = MemoryRaceStore::new(RaceState::empty(Utc::now()));
        let alice = ActorId::from("alice");
        let bob = ActorId::from("bob");

        assert!(store.claim_timer(&alice).unwrap());
        assert!(store.claim_timer(&alice).unwrap());
        assert!(!store.claim_timer(&bob).unwrap());
    }

    #[test]
    fn release_by_non_owner_is_a_noop() {
        let store = MemoryRaceStore::new(RaceState::empty(Utc::now()));
        let alice = ActorId::from("alice");
        let bob = ActorId::from("bob");

        assert!(store.claim_timer(&alice).unwrap());
        store.release_timer(&bob).unwrap();
        assert_eq!(store.read().unwrap().timer_owner, Some(alice.clone()));

        store.release_timer(&alice).unwrap();
        assert_eq!(store.read().unwrap().timer_owner, None);
        assert!(store.claim_timer(&bob).unwrap());
    }

    #[test]
    fn rewriting_the_row_does_not_move_the_owner_slot() {
        let store = MemoryRaceStore::new(RaceState::empty(Utc::now()));
        let alice = ActorId::from("alice");
        assert!(store.claim_timer(&alice).unwrap());

        let snapshot = store.read().unwrap();
        let mut next = snapshot.clone();
        next.timer_owner = None; // a stale row image must not release
        store.conditional_write(snapshot.version, next).unwrap();

        assert_eq!(store.read().unwrap().timer_owner, Some(alice));
    }

    #[test]
    fn rating_book_defaults_and_reset() {
        let book = MemoryRatingBook::new();
        assert_eq!(book.rating("Ember Dash").unwrap(), None);

        let mut ratings = HashMap::new();
        ratings.insert("Ember Dash".to_string(), 640.0);
        book.set_all(&ratings).unwrap();
        assert_eq!(book.rating("Ember Dash").unwrap(), Some(640.0));

        let mut stats = HorseStats::default();
        stats.record(1);
        book.set_stats("Ember Dash", &stats).unwrap();
        assert_eq!(book.stats("Ember Dash").unwrap().unwrap().wins, 1);

        book.reset_all().unwrap();
        assert_eq!(book.rating("Ember Dash").unwrap(), None);
        assert_eq!(book.stats("Ember Dash").unwrap(), None);
    }
}
