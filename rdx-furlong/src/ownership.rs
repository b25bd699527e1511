//! Mutual exclusion over the shared race timers.
//!
//! Any number of untrusted clients may attempt to drive the tick; exactly
//! one holds ownership at a time. Claim and release are single atomic
//! compare-and-set operations against the authoritative store, never a
//! read followed by a write, which would let two callers both observe an
//! empty slot and both claim it.

use std::sync::Arc;

use tracing::warn;

use crate::common::ActorId;
use crate::errors::EngineError;
use crate::store::RaceStateStore;

/// The claim/release protocol over the authoritative store's owner slot.
#[derive(Clone)]
pub struct TimerOwnership {
    store: Arc<dyn RaceStateStore>,
}

impl TimerOwnership {
    pub fn new(store: Arc<dyn RaceStateStore>) -> Self {
        Self { store }
    }

    /// Attempts to take ownership for `actor`.
    ///
    /// Succeeds iff the slot is empty or already holds `actor` (claims are
    /// re-entrant). Returns `None` when another actor holds the slot,
    /// which is expected under concurrent callers, not an error.
    pub fn claim(&self, actor: &ActorId) -> Result<Option<TimerLease<'_>>, EngineError> {
        if self.store.claim_timer(actor)? {
            Ok(Some(TimerLease {
                ownership: self,
                actor: actor.clone(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// The actor currently holding the slot, if any.
    pub fn holder(&self) -> Result<Option<ActorId>, EngineError> {
        Ok(self.store.read()?.timer_owner)
    }
}

/// Proof of a granted claim. Releases the slot when dropped; release only
/// clears the slot if it still holds this lease's actor, so a slow holder
/// can never clobber a newer owner.
pub struct TimerLease<'a> {
    ownership: &'a TimerOwnership,
    actor: ActorId,
    released: bool,
}

impl TimerLease<'_> {
    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// Explicit release, surfacing any store failure to the caller.
    pub fn release(mut self) -> Result<(), EngineError> {
        self.released = true;
        self.ownership.store.release_timer(&self.actor)
    }
}

impl Drop for TimerLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.ownership.store.release_timer(&self.actor) {
                warn!(actor = %self.actor, %err, "failed to release timer ownership");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RaceState;
    use crate::store::MemoryRaceStore;
    use chrono::Utc;

    fn ownership() -> TimerOwnership {
        let store = Arc::new(MemoryRaceStore::new(RaceState::empty(Utc::now())));
        TimerOwnership::new(store)
    }

    #[test]
    fn only_one_of_two_actors_wins() {
        let ownership = ownership();
        let alice = ActorId::from("alice");
        let bob = ActorId::from("bob");

        let lease = ownership.claim(&alice).unwrap();
        assert!(lease.is_some());
        assert!(ownership.claim(&bob).unwrap().is_none());
        assert_eq!(ownership.holder().unwrap(), Some(alice));
    }

    #[test]
    fn claim_is_reentrant_for_the_holder() {
        let ownership = ownership();
        let alice = ActorId::from("alice");

        let first = ownership.claim(&alice).unwrap().unwrap();
        let second = ownership.claim(&alice).unwrap();
        assert!(second.is_some());
        drop(second);
        drop(first);
        assert_eq!(ownership.holder().unwrap(), None);
    }

    #[test]
    fn lease_releases_on_drop() {
        let ownership = ownership();
        let alice = ActorId::from("alice");
        let bob = ActorId::from("bob");

        {
            let _lease = ownership.claim(&alice).unwrap().unwrap();
            assert!(ownership.claim(&bob).unwrap().is_none());
        }
        assert!(ownership.claim(&bob).unwrap().is_some());
    }

    #[test]
    fn concurrent_claims_grant_at_most_one_lease() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Barrier;

        const WORKERS: usize = 8;
        let store: Arc<dyn RaceStateStore> =
            Arc::new(MemoryRaceStore::new(RaceState::empty(Utc::now())));
        let granted = Arc::new(AtomicUsize::new(0));
        let all_claimed = Arc::new(Barrier::new(WORKERS));

        let mut handles = Vec::new();
        for worker in 0..WORKERS {
            let store = store.clone();
            let granted = granted.clone();
            let all_claimed = all_claimed.clone();
            handles.push(std::thread::spawn(move || {
                let ownership = TimerOwnership::new(store);
                let actor = ActorId::new(format!("actor-{worker}"));
                let lease = ownership.claim(&actor).unwrap();
                if lease.is_some() {
                    granted.fetch_add(1, Ordering::SeqCst);
                }
                // Nobody releases until every rival has attempted a claim.
                all_claimed.wait();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(granted.load(Ordering::SeqCst), 1);
    }
}
