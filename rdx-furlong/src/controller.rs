//! The top-level race state machine.
//!
//! One external trigger calls [`RacePhaseController::advance_tick`] at a
//! fixed cadence. Each tick claims timer ownership, reads the
//! authoritative row, dispatches to the current phase's handler, and
//! conditionally writes the new row back. Every timer is derived from
//! `now - phase_started_at` and the number of simulation steps owed is
//! derived from wall-clock elapsed, so duplicated, delayed, or missed
//! ticks all converge on the same row.
//!
//! A persistence failure aborts the tick without touching in-memory
//! derived state; the next tick retries from the row. Ratings are settled
//! by exactly the actor that commits the Racing → Finished transition, and
//! a failed settlement is carried as a pending settlement until it flushes.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};

use crate::common::ActorId;
use crate::config::FurlongConfig;
use crate::errors::EngineError;
use crate::events::PhaseEvent;
use crate::ownership::TimerOwnership;
use crate::rating::{RaceLine, RatingChange, RatingEngine};
use crate::roster::HorseRoster;
use crate::simulator::{FinishEvent, RaceSimulator};
use crate::state::{Contestant, FinishRecord, RacePhase, RaceState};
use crate::store::{RaceStateStore, WriteOutcome};
use crate::time::{secs_since, Clock};

/// What one call to [`RacePhaseController::advance_tick`] did.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Another actor holds the timers; all timer work was skipped.
    Skipped { holder: Option<ActorId> },
    /// Nothing was due; the row is untouched.
    Idle(RacePhase),
    /// The simulation caught up by `steps` ticks within Racing.
    Advanced { steps: u64 },
    /// The race moved to its next lifecycle phase.
    Transitioned(PhaseEvent),
    /// Racing ended: the finish order is final and settlement ran.
    Finished {
        at: DateTime<Utc>,
        results: Vec<FinishRecord>,
        changes: Vec<RatingChange>,
    },
    /// The conditional write lost to a concurrent commit; retry next tick.
    Conflict,
}

/// In-memory state derived from the authoritative row. Only committed
/// ticks may mutate it.
struct LiveRace {
    simulator: Option<RaceSimulator>,
    pending_settlement: Option<Vec<RaceLine>>,
    rng: StdRng,
}

pub struct RacePhaseController {
    actor: ActorId,
    clock: Arc<dyn Clock>,
    store: Arc<dyn RaceStateStore>,
    ownership: TimerOwnership,
    roster: HorseRoster,
    ratings: RatingEngine,
    config: FurlongConfig,
    live: Mutex<LiveRace>,
    /// Bound on simulation steps recovered in one tick after a gap.
    max_catchup: u64,
}

impl RacePhaseController {
    pub fn new(
        actor: ActorId,
        clock: Arc<dyn Clock>,
        store: Arc<dyn RaceStateStore>,
        roster: HorseRoster,
        ratings: RatingEngine,
        config: FurlongConfig,
    ) -> Self {
        Self::build(actor, clock, store, roster, ratings, config, StdRng::from_entropy())
    }

    /// A controller with a deterministic RNG, for reproducible runs.
    pub fn with_rng_seed(
        actor: ActorId,
        clock: Arc<dyn Clock>,
        store: Arc<dyn RaceStateStore>,
        roster: HorseRoster,
        ratings: RatingEngine,
        config: FurlongConfig,
        seed: u64,
    ) -> Self {
        Self::build(
            actor,
            clock,
            store,
            roster,
            ratings,
            config,
            StdRng::seed_from_u64(seed),
        )
    }

    fn build(
        actor: ActorId,
        clock: Arc<dyn Clock>,
        store: Arc<dyn RaceStateStore>,
        roster: HorseRoster,
        ratings: RatingEngine,
        config: FurlongConfig,
        rng: StdRng,
    ) -> Self {
        let max_catchup = (config.track.max_race_secs / config.track.tick_secs).ceil() as u64 + 1;
        Self {
            actor,
            clock,
            ownership: TimerOwnership::new(store.clone()),
            store,
            roster,
            ratings,
            config,
            live: Mutex::new(LiveRace {
                simulator: None,
                pending_settlement: None,
                rng,
            }),
            max_catchup,
        }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn config(&self) -> &FurlongConfig {
        &self.config
    }

    /// The controller's single entry point, invoked by the external tick
    /// trigger. One bounded, non-cancelable unit of work.
    pub fn advance_tick(&self) -> Result<TickOutcome, EngineError> {
        let Some(lease) = self.ownership.claim(&self.actor)? else {
            return Ok(TickOutcome::Skipped {
                holder: self.ownership.holder()?,
            });
        };
        let outcome = self.owned_tick();
        if let Err(err) = lease.release() {
            warn!(%err, "timer release failed; the slot clears on a later claim");
        }
        outcome
    }

    fn owned_tick(&self) -> Result<TickOutcome, EngineError> {
        self.flush_pending_settlement()?;
        let state = self.store.read()?;
        let now = self.clock.now();
        match state.phase {
            RacePhase::PreRace => self.tick_pre_race(state, now),
            RacePhase::Countdown => self.tick_countdown(state, now),
            RacePhase::Racing => self.tick_racing(state, now),
            RacePhase::Finished => self.tick_finished(state, now),
        }
    }

    fn live(&self) -> Result<MutexGuard<'_, LiveRace>, EngineError> {
        self.live
            .lock()
            .map_err(|_| EngineError::Store("live race state poisoned".into()))
    }

    /// A settlement that failed after its race's Finished transition is
    /// retried ahead of all other work.
    fn flush_pending_settlement(&self) -> Result<(), EngineError> {
        let mut live = self.live()?;
        if let Some(lines) = live.pending_settlement.take() {
            match self.ratings.settle_race(&lines) {
                Ok(changes) => {
                    info!(horses = changes.len(), "flushed deferred settlement");
                }
                Err(err) => {
                    live.pending_settlement = Some(lines);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Validates and conditionally writes `next`. Refuses to persist a row
    /// that breaks an invariant or skips a phase.
    fn commit(&self, previous: &RaceState, next: RaceState) -> Result<WriteOutcome, EngineError> {
        if next.phase != previous.phase && next.phase != previous.phase.successor() {
            return Err(EngineError::InvariantViolation(format!(
                "illegal transition {} -> {}",
                previous.phase.label(),
                next.phase.label()
            )));
        }
        next.check_invariants().map_err(EngineError::InvariantViolation)?;
        self.store.conditional_write(previous.version, next)
    }

    /// Commits a same-phase refresh, skipping the write entirely when the
    /// observable row is unchanged (e.g. a duplicate tick with no
    /// wall-clock progress).
    fn commit_refresh(&self, previous: RaceState, next: RaceState) -> Result<TickOutcome, EngineError> {
        if next.same_view(&previous) {
            return Ok(TickOutcome::Idle(previous.phase));
        }
        match self.commit(&previous, next)? {
            WriteOutcome::Committed => Ok(TickOutcome::Idle(previous.phase)),
            WriteOutcome::Conflict => Ok(TickOutcome::Conflict),
        }
    }

    fn transition(
        &self,
        previous: &RaceState,
        next: RaceState,
        at: DateTime<Utc>,
    ) -> Result<TickOutcome, EngineError> {
        let event = PhaseEvent {
            from: previous.phase,
            to: next.phase,
            at,
        };
        match self.commit(previous, next)? {
            WriteOutcome::Committed => {
                info!(from = event.from.label(), to = event.to.label(), "phase transition");
                Ok(TickOutcome::Transitioned(event))
            }
            WriteOutcome::Conflict => Ok(TickOutcome::Conflict),
        }
    }

    fn tick_pre_race(&self, state: RaceState, now: DateTime<Utc>) -> Result<TickOutcome, EngineError> {
        // An empty field marks an uninitialized deployment; assemble the
        // first race in place.
        if state.contestants.is_empty() {
            return self.open_next_race(&state, now);
        }

        let remaining = self.config.timings.pre_race_secs - secs_since(state.phase_started_at, now);
        if remaining > 0.0 {
            let mut next = state.clone();
            next.pre_race_timer = remaining;
            return self.commit_refresh(state, next);
        }

        let mut next = state.clone();
        next.phase = RacePhase::Countdown;
        next.phase_started_at = now;
        next.pre_race_timer = 0.0;
        next.countdown_timer = self.config.timings.countdown_secs;
        self.transition(&state, next, now)
    }

    fn tick_countdown(&self, state: RaceState, now: DateTime<Utc>) -> Result<TickOutcome, EngineError> {
        let remaining = self.config.timings.countdown_secs - secs_since(state.phase_started_at, now);
        if remaining > 0.0 {
            let mut next = state.clone();
            next.countdown_timer = remaining;
            return self.commit_refresh(state, next);
        }

        // Gates open: positions reset, the race clock starts now.
        let mut next = state.clone();
        for contestant in &mut next.contestants {
            contestant.position = 0.0;
        }
        next.phase = RacePhase::Racing;
        next.phase_started_at = now;
        next.race_started_at = Some(now);
        next.countdown_timer = 0.0;
        next.race_timer = 0.0;

        let seed = self.live()?.rng.gen();
        let simulator = RaceSimulator::new(
            &next.contestants,
            self.config.track.clone(),
            self.config.tuning.clone(),
            self.ratings.config(),
            seed,
        );
        let outcome = self.transition(&state, next, now)?;
        if matches!(outcome, TickOutcome::Transitioned(_)) {
            self.live()?.simulator = Some(simulator);
        }
        Ok(outcome)
    }

    fn tick_racing(&self, state: RaceState, now: DateTime<Utc>) -> Result<TickOutcome, EngineError> {
        let Some(started) = state.race_started_at else {
            return Err(EngineError::InvariantViolation(
                "racing phase without a race start timestamp".into(),
            ));
        };
        let elapsed = secs_since(started, now);
        let target_ticks = (elapsed / self.config.track.tick_secs).floor() as u64;

        let mut live = self.live()?;
        let mut simulator = match live.simulator.clone() {
            Some(simulator) => simulator,
            None => {
                // This process did not start the race (or restarted since);
                // rebuild the simulation from the authoritative row.
                let seed = live.rng.gen();
                warn!("no live simulator for a racing row; resuming from store");
                RaceSimulator::resume(
                    &state.contestants,
                    &state.results,
                    state.race_timer,
                    self.config.track.clone(),
                    self.config.tuning.clone(),
                    self.ratings.config(),
                    seed,
                )
            }
        };

        let owed = target_ticks
            .saturating_sub(simulator.ticks_advanced())
            .min(self.max_catchup);
        if owed == 0 {
            // Duplicate tick with no wall-clock progress: nothing to do.
            if live.simulator.is_none() {
                live.simulator = Some(simulator);
            }
            return Ok(TickOutcome::Idle(RacePhase::Racing));
        }

        for _ in 0..owed {
            simulator.advance();
            if simulator.is_complete() {
                break;
            }
        }
        let events = simulator.drain_finishes();

        let mut next = state.clone();
        for (id, position) in simulator.positions() {
            if let Some(contestant) = next.contestants.iter_mut().find(|c| c.id == id) {
                contestant.position = position;
            }
        }
        next.race_timer = elapsed;
        append_results(&mut next.results, &events);

        if simulator.is_complete() {
            next.phase = RacePhase::Finished;
            next.phase_started_at = now;
            let results = next.results.clone();
            let lines = race_lines(&state.contestants, &results);

            let outcome = self.transition(&state, next, now)?;
            match outcome {
                TickOutcome::Transitioned(_) => {
                    live.simulator = None;
                    // This actor committed Racing -> Finished, so only
                    // this actor settles the book.
                    let changes = match self.ratings.settle_race(&lines) {
                        Ok(changes) => changes,
                        Err(err) => {
                            error!(%err, "settlement failed; deferred to next tick");
                            live.pending_settlement = Some(lines);
                            Vec::new()
                        }
                    };
                    Ok(TickOutcome::Finished {
                        at: now,
                        results,
                        changes,
                    })
                }
                other => Ok(other),
            }
        } else {
            match self.commit(&state, next)? {
                WriteOutcome::Committed => {
                    live.simulator = Some(simulator);
                    Ok(TickOutcome::Advanced { steps: owed })
                }
                WriteOutcome::Conflict => Ok(TickOutcome::Conflict),
            }
        }
    }

    fn tick_finished(&self, state: RaceState, now: DateTime<Utc>) -> Result<TickOutcome, EngineError> {
        let shown = secs_since(state.phase_started_at, now);
        if shown < self.config.timings.finished_secs {
            // The results board is static; no write needed.
            return Ok(TickOutcome::Idle(RacePhase::Finished));
        }
        self.open_next_race(&state, now)
    }

    /// Discards the previous race record and opens a fresh PreRace around
    /// a newly assembled field.
    fn open_next_race(&self, previous: &RaceState, now: DateTime<Utc>) -> Result<TickOutcome, EngineError> {
        let contestants = {
            let mut live = self.live()?;
            self.roster
                .assemble_race(self.config.roster.pool_size, &mut live.rng)?
        };
        let next = RaceState::fresh_pre_race(contestants, now, self.config.timings.pre_race_secs);
        self.transition(previous, next, now)
    }
}

/// Appends newly crossed contestants to the results, anchoring gaps on the
/// winner's time.
fn append_results(results: &mut Vec<FinishRecord>, events: &[FinishEvent]) {
    let winner_time = results
        .iter()
        .find(|r| r.placement == 1)
        .map(|r| r.finish_time)
        .or_else(|| {
            events
                .iter()
                .find(|e| e.placement == 1)
                .map(|e| e.finish_time)
        });
    for event in events {
        let anchor = winner_time.unwrap_or(event.finish_time);
        results.push(event.to_record(anchor));
    }
}

/// Settlement input: each contestant's race-start rating and placement.
fn race_lines(contestants: &[Contestant], results: &[FinishRecord]) -> Vec<RaceLine> {
    results
        .iter()
        .filter_map(|record| {
            contestants
                .iter()
                .find(|c| c.id == record.contestant_id)
                .map(|contestant| RaceLine {
                    name: contestant.name.clone(),
                    rating: contestant.rating,
                    placement: record.placement,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HorseStats;
    use crate::store::{
        MemoryRaceStore, MemoryRatingBook, NameCatalog, RatingBookStore, StaticCatalog,
    };
    use crate::time::ManualClock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Rig {
        controller: RacePhaseController,
        store: Arc<MemoryRaceStore>,
        book: Arc<MemoryRatingBook>,
        clock: Arc<ManualClock>,
    }

    fn rig() -> Rig {
        rig_with(Arc::new(StaticCatalog::default()), Arc::new(MemoryRatingBook::new()))
    }

    fn rig_with(catalog: Arc<dyn NameCatalog>, book: Arc<MemoryRatingBook>) -> Rig {
        let config = FurlongConfig::default();
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let store = Arc::new(MemoryRaceStore::new(RaceState::empty(clock.now())));
        let ratings = RatingEngine::new(book.clone(), config.rating.clone());
        let roster = HorseRoster::new(catalog, ratings.clone());
        let controller = RacePhaseController::with_rng_seed(
            ActorId::from("ticker-1"),
            clock.clone(),
            store.clone(),
            roster,
            ratings,
            config,
            42,
        );
        Rig {
            controller,
            store,
            book,
            clock,
        }
    }

    fn run_to_finish(rig: &Rig) -> Vec<FinishRecord> {
        // Bootstrap, wait out PreRace, wait out Countdown.
        rig.controller.advance_tick().unwrap();
        rig.clock.advance(Duration::from_millis(10_100));
        rig.controller.advance_tick().unwrap();
        rig.clock.advance(Duration::from_millis(5_100));
        rig.controller.advance_tick().unwrap();
        assert_eq!(rig.store.read().unwrap().phase, RacePhase::Racing);

        for _ in 0..120 {
            rig.clock.advance(Duration::from_secs(1));
            if let TickOutcome::Finished { results, .. } = rig.controller.advance_tick().unwrap()
            {
                return results;
            }
        }
        panic!("race never finished");
    }

    #[test]
    fn bootstrap_assembles_the_first_race() {
        let rig = rig();
        let outcome = rig.controller.advance_tick().unwrap();
        assert!(matches!(outcome, TickOutcome::Transitioned(_)));

        let state = rig.store.read().unwrap();
        assert_eq!(state.phase, RacePhase::PreRace);
        assert_eq!(state.contestants.len(), 8);
        assert!(state.results.is_empty());
    }

    #[test]
    fn phases_advance_in_strict_order_and_loop() {
        let rig = rig();
        let mut observed: Vec<RacePhase> = vec![];

        rig.controller.advance_tick().unwrap();
        observed.push(rig.store.read().unwrap().phase);
        for _ in 0..450 {
            rig.clock.advance(Duration::from_millis(500));
            rig.controller.advance_tick().unwrap();
            let phase = rig.store.read().unwrap().phase;
            if observed.last() != Some(&phase) {
                observed.push(phase);
            }
            // Two full lifecycles is plenty.
            if observed.len() >= 9 {
                break;
            }
        }

        assert!(observed.len() >= 9, "observed only {observed:?}");
        let expected = [
            RacePhase::PreRace,
            RacePhase::Countdown,
            RacePhase::Racing,
            RacePhase::Finished,
        ];
        for (idx, phase) in observed.iter().enumerate() {
            assert_eq!(*phase, expected[idx % 4], "at {idx} in {observed:?}");
        }
    }

    #[test]
    fn racing_produces_full_results_and_settles_exactly_once() {
        let rig = rig();
        let results = run_to_finish(&rig);

        assert_eq!(results.len(), 8);
        let mut placements: Vec<u8> = results.iter().map(|r| r.placement).collect();
        placements.sort_unstable();
        assert_eq!(placements, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let state = rig.store.read().unwrap();
        assert_eq!(state.phase, RacePhase::Finished);
        for contestant in &state.contestants {
            let stats = rig.book.stats(&contestant.name).unwrap().unwrap();
            assert_eq!(stats.total_races, 1);
            assert!(rig.book.rating(&contestant.name).unwrap().is_some());
        }

        // Further Finished-phase ticks must not settle again.
        rig.clock.advance(Duration::from_secs(1));
        rig.controller.advance_tick().unwrap();
        let any = &state.contestants[0];
        assert_eq!(rig.book.stats(&any.name).unwrap().unwrap().total_races, 1);
    }

    #[test]
    fn finished_board_holds_then_a_fresh_race_opens() {
        let rig = rig();
        run_to_finish(&rig);
        let finished = rig.store.read().unwrap();

        rig.clock.advance(Duration::from_secs(5));
        rig.controller.advance_tick().unwrap();
        assert_eq!(rig.store.read().unwrap().phase, RacePhase::Finished);

        rig.clock.advance(Duration::from_secs(11));
        let outcome = rig.controller.advance_tick().unwrap();
        assert!(matches!(outcome, TickOutcome::Transitioned(_)));

        let fresh = rig.store.read().unwrap();
        assert_eq!(fresh.phase, RacePhase::PreRace);
        assert!(fresh.results.is_empty());
        assert!(fresh.version > finished.version);
        assert!(fresh.contestants.iter().all(|c| c.position == 0.0));
    }

    #[test]
    fn duplicate_ticks_without_clock_progress_are_idempotent() {
        let rig = rig();
        rig.controller.advance_tick().unwrap();
        rig.clock.advance(Duration::from_millis(10_100));
        rig.controller.advance_tick().unwrap();
        rig.clock.advance(Duration::from_millis(5_100));
        rig.controller.advance_tick().unwrap();

        // Mid-race snapshot.
        rig.clock.advance(Duration::from_secs(10));
        rig.controller.advance_tick().unwrap();
        let first = rig.store.read().unwrap();

        // No wall-clock progress: the second tick changes nothing at all.
        let outcome = rig.controller.advance_tick().unwrap();
        assert!(matches!(outcome, TickOutcome::Idle(RacePhase::Racing)));
        let second = rig.store.read().unwrap();
        assert!(second.same_view(&first));
        assert_eq!(second.version, first.version);
    }

    #[test]
    fn tick_is_skipped_while_another_actor_owns_the_timers() {
        let rig = rig();
        let rival = ActorId::from("ticker-2");
        assert!(rig.store.claim_timer(&rival).unwrap());

        let outcome = rig.controller.advance_tick().unwrap();
        match outcome {
            TickOutcome::Skipped { holder } => assert_eq!(holder, Some(rival.clone())),
            other => panic!("expected Skipped, got {other:?}"),
        }
        // No timer work happened: the row is still uninitialized.
        assert!(rig.store.read().unwrap().contestants.is_empty());

        rig.store.release_timer(&rival).unwrap();
        assert!(matches!(
            rig.controller.advance_tick().unwrap(),
            TickOutcome::Transitioned(_)
        ));
    }

    #[test]
    fn thin_catalog_surfaces_and_leaves_the_row_intact() {
        let catalog = Arc::new(StaticCatalog::from_names(vec![
            "One".to_string(),
            "Two".to_string(),
        ]));
        let rig = rig_with(catalog, Arc::new(MemoryRatingBook::new()));

        match rig.controller.advance_tick() {
            Err(EngineError::InsufficientCatalog { needed, available }) => {
                assert_eq!(needed, 8);
                assert_eq!(available, 2);
            }
            other => panic!("expected InsufficientCatalog, got {other:?}"),
        }
        let state = rig.store.read().unwrap();
        assert_eq!(state.phase, RacePhase::PreRace);
        assert!(state.contestants.is_empty());
    }

    /// A rating book that fails its next `set_all`, for exercising the
    /// deferred-settlement path.
    struct FlakyBook {
        inner: MemoryRatingBook,
        fail_next_set_all: AtomicBool,
    }

    impl RatingBookStore for FlakyBook {
        fn rating(&self, name: &str) -> Result<Option<f64>, EngineError> {
            self.inner.rating(name)
        }
        fn set_all(&self, ratings: &HashMap<String, f64>) -> Result<(), EngineError> {
            if self.fail_next_set_all.swap(false, Ordering::SeqCst) {
                return Err(EngineError::Store("book write refused".into()));
            }
            self.inner.set_all(ratings)
        }
        fn stats(&self, name: &str) -> Result<Option<HorseStats>, EngineError> {
            self.inner.stats(name)
        }
        fn set_stats(&self, name: &str, stats: &HorseStats) -> Result<(), EngineError> {
            self.inner.set_stats(name, stats)
        }
        fn reset_all(&self) -> Result<(), EngineError> {
            self.inner.reset_all()
        }
    }

    #[test]
    fn failed_settlement_is_deferred_and_flushed_next_tick() {
        let flaky = Arc::new(FlakyBook {
            inner: MemoryRatingBook::new(),
            fail_next_set_all: AtomicBool::new(false),
        });

        let config = FurlongConfig::default();
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let store = Arc::new(MemoryRaceStore::new(RaceState::empty(clock.now())));
        let ratings = RatingEngine::new(flaky.clone(), config.rating.clone());
        let roster = HorseRoster::new(Arc::new(StaticCatalog::default()), ratings.clone());
        let controller = RacePhaseController::with_rng_seed(
            ActorId::from("ticker-1"),
            clock.clone(),
            store.clone(),
            roster,
            ratings,
            config,
            42,
        );

        controller.advance_tick().unwrap();
        clock.advance(Duration::from_millis(10_100));
        controller.advance_tick().unwrap();
        clock.advance(Duration::from_millis(5_100));
        controller.advance_tick().unwrap();

        flaky.fail_next_set_all.store(true, Ordering::SeqCst);
        let mut finished = None;
        for _ in 0..120 {
            clock.advance(Duration::from_secs(1));
            if let TickOutcome::Finished {
                results, changes, ..
            } = controller.advance_tick().unwrap()
            {
                finished = Some((results, changes));
                break;
            }
        }
        let (results, changes) = finished.expect("race never finished");
        assert_eq!(results.len(), 8);
        // The phase advanced, but the book write was refused.
        assert!(changes.is_empty());
        assert_eq!(store.read().unwrap().phase, RacePhase::Finished);
        let winner = store.read().unwrap();
        let winner_name = winner
            .contestant(results[0].contestant_id)
            .unwrap()
            .name
            .clone();
        assert!(flaky.stats(&winner_name).unwrap().is_none());

        // The next tick flushes the deferred settlement.
        clock.advance(Duration::from_secs(1));
        controller.advance_tick().unwrap();
        assert_eq!(flaky.stats(&winner_name).unwrap().unwrap().total_races, 1);
    }
}
