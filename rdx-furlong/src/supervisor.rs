//! The automation supervisor that drives the tick loop.
//!
//! Automation state lives here, not in process-wide globals: the
//! supervisor owns its one dedicated tick-loop task, exposes an explicit
//! start/stop lifecycle, and is passed around by handle. It switches
//! cadence with the race phase (fast while Racing, slow otherwise),
//! translates tick outcomes into broadcast events, and runs the registered
//! phase-change watchers.
//!
//! Because every phase timer is wall-clock-derived, stopping and
//! restarting the supervisor at any point is safe; the next tick converges
//! on the correct row.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use slotmap::SlotMap;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{error, info, trace};

use crate::common::ListenerId;
use crate::config::PhaseTimings;
use crate::controller::{RacePhaseController, TickOutcome};
use crate::events::{PhaseEvent, RaceEvent, SystemEvent};
use crate::state::RacePhase;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A registered phase-change watcher.
struct PhaseWatcher {
    callback: Box<dyn FnMut(&PhaseEvent) + Send + Sync>,
}

/// Owns the tick-loop task and the engine's event streams.
///
/// The supervisor is designed to be cloned and shared across tasks,
/// providing a handle to the running instance.
#[derive(Clone)]
pub struct AutomationSupervisor {
    controller: Arc<RacePhaseController>,
    timings: PhaseTimings,
    race_event_sender: broadcast::Sender<RaceEvent>,
    system_event_sender: broadcast::Sender<SystemEvent>,
    phase_watchers: Arc<RwLock<SlotMap<ListenerId, PhaseWatcher>>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Mutex<Option<watch::Sender<bool>>>>,
}

impl AutomationSupervisor {
    pub fn new(controller: Arc<RacePhaseController>) -> Self {
        let (race_event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (system_event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let timings = controller.config().timings.clone();
        Self {
            controller,
            timings,
            race_event_sender,
            system_event_sender,
            phase_watchers: Arc::new(RwLock::new(SlotMap::with_key())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawns the tick-loop task.
    ///
    /// Returns `false` if the supervisor is already running.
    pub async fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(shutdown_tx);
        self.system_event_sender
            .send(SystemEvent::SupervisorStarted { at: Utc::now() })
            .ok();
        info!(actor = %self.controller.actor(), "automation supervisor started");

        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.tick_loop(shutdown_rx).await });
        true
    }

    /// Signals the tick-loop task to exit.
    ///
    /// Returns `false` if the supervisor was not running. In-flight ticks
    /// are bounded units of work and always run to completion.
    pub async fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(shutdown_tx) = self.shutdown.lock().await.take() {
            shutdown_tx.send(true).ok();
        }
        self.system_event_sender
            .send(SystemEvent::SupervisorStopped)
            .ok();
        info!("automation supervisor stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribes to the `RaceEvent` stream.
    pub fn subscribe_race_events(&self) -> broadcast::Receiver<RaceEvent> {
        self.race_event_sender.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Registers a callback to run on every committed phase transition.
    ///
    /// # Returns
    /// A `ListenerId` which can be used to later remove this watcher.
    pub async fn on_phase_change(
        &self,
        callback: impl FnMut(&PhaseEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut watchers = self.phase_watchers.write().await;
        watchers.insert(PhaseWatcher {
            callback: Box::new(callback),
        })
    }

    /// Removes a phase-change watcher.
    ///
    /// Returns `true` if the watcher was found and removed.
    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        self.phase_watchers.write().await.remove(id).is_some()
    }

    #[doc(hidden)]
    async fn tick_loop(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut last_phase = RacePhase::PreRace;
        loop {
            let cadence_ms = if last_phase == RacePhase::Racing {
                self.timings.racing_cadence_ms
            } else {
                self.timings.idle_cadence_ms
            };
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(Duration::from_millis(cadence_ms)) => {
                    match self.controller.advance_tick() {
                        Ok(outcome) => {
                            last_phase = self.publish(outcome, last_phase).await;
                        }
                        Err(err) => {
                            error!(%err, "tick failed; retrying on the next tick");
                            self.system_event_sender
                                .send(SystemEvent::TickFailed { reason: err.to_string() })
                                .ok();
                        }
                    }
                }
            }
        }
        trace!("tick loop exited");
    }

    /// Turns a tick outcome into events and returns the phase to pace the
    /// next tick by.
    #[doc(hidden)]
    async fn publish(&self, outcome: TickOutcome, last_phase: RacePhase) -> RacePhase {
        match outcome {
            TickOutcome::Skipped { holder } => {
                trace!(?holder, "tick skipped; timers owned elsewhere");
                self.system_event_sender
                    .send(SystemEvent::TickSkipped { holder })
                    .ok();
                last_phase
            }
            TickOutcome::Conflict => {
                self.system_event_sender.send(SystemEvent::TickConflicted).ok();
                last_phase
            }
            TickOutcome::Idle(phase) => phase,
            TickOutcome::Advanced { steps } => {
                trace!(steps, "simulation advanced");
                RacePhase::Racing
            }
            TickOutcome::Transitioned(event) => {
                self.notify_phase_change(&event).await;
                let to = event.to;
                self.race_event_sender
                    .send(RaceEvent::PhaseChanged(event))
                    .ok();
                to
            }
            TickOutcome::Finished {
                at,
                results,
                changes,
            } => {
                let event = PhaseEvent {
                    from: RacePhase::Racing,
                    to: RacePhase::Finished,
                    at,
                };
                self.notify_phase_change(&event).await;
                self.race_event_sender
                    .send(RaceEvent::PhaseChanged(event))
                    .ok();
                self.race_event_sender
                    .send(RaceEvent::RaceFinished { results })
                    .ok();
                if !changes.is_empty() {
                    self.race_event_sender
                        .send(RaceEvent::RatingsSettled { changes })
                        .ok();
                }
                RacePhase::Finished
            }
        }
    }

    #[doc(hidden)]
    async fn notify_phase_change(&self, event: &PhaseEvent) {
        let mut watchers = self.phase_watchers.write().await;
        for (_id, watcher) in watchers.iter_mut() {
            (watcher.callback)(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ActorId;
    use crate::config::{FurlongConfig, PhaseTimings, TrackConfig};
    use crate::rating::RatingEngine;
    use crate::roster::HorseRoster;
    use crate::state::RaceState;
    use crate::store::{MemoryRaceStore, MemoryRatingBook, StaticCatalog};
    use crate::time::SystemClock;
    use std::sync::atomic::AtomicUsize;

    /// Millisecond-scale timings so a whole lifecycle fits in a test.
    fn fast_config() -> FurlongConfig {
        FurlongConfig {
            timings: PhaseTimings {
                pre_race_secs: 0.05,
                countdown_secs: 0.05,
                finished_secs: 0.05,
                racing_cadence_ms: 5,
                idle_cadence_ms: 5,
            },
            track: TrackConfig {
                // Impossible to cover before the safety bound, so every
                // race resolves through straggler placement, quickly.
                length_m: 1200.0,
                tick_secs: 0.01,
                max_race_secs: 0.3,
            },
            ..FurlongConfig::default()
        }
    }

    fn supervisor() -> AutomationSupervisor {
        let config = fast_config();
        let store = Arc::new(MemoryRaceStore::new(RaceState::empty(Utc::now())));
        let book = Arc::new(MemoryRatingBook::new());
        let ratings = RatingEngine::new(book, config.rating.clone());
        let roster = HorseRoster::new(Arc::new(StaticCatalog::default()), ratings.clone());
        let controller = Arc::new(RacePhaseController::with_rng_seed(
            ActorId::from("supervised"),
            Arc::new(SystemClock),
            store,
            roster,
            ratings,
            config,
            7,
        ));
        AutomationSupervisor::new(controller)
    }

    #[tokio::test]
    async fn start_and_stop_are_edge_triggered() {
        let supervisor = supervisor();
        assert!(!supervisor.is_running());

        assert!(supervisor.start().await);
        assert!(supervisor.is_running());
        assert!(!supervisor.start().await, "second start must be a no-op");

        assert!(supervisor.stop().await);
        assert!(!supervisor.is_running());
        assert!(!supervisor.stop().await, "second stop must be a no-op");
    }

    #[tokio::test]
    async fn lifecycle_events_reach_subscribers() {
        let supervisor = supervisor();
        let mut system_rx = supervisor.subscribe_system_events();
        let mut race_rx = supervisor.subscribe_race_events();

        supervisor.start().await;
        let started = tokio::time::timeout(Duration::from_secs(5), system_rx.recv())
            .await
            .expect("no system event in time")
            .unwrap();
        assert!(matches!(started, SystemEvent::SupervisorStarted { .. }));

        // Wait for a full race to resolve.
        let finished = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(RaceEvent::RaceFinished { results }) = race_rx.recv().await {
                    return results;
                }
            }
        })
        .await
        .expect("no finished race in time");
        assert_eq!(finished.len(), 8);

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn phase_watchers_fire_and_can_be_removed() {
        let supervisor = supervisor();
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = fired.clone();
        let listener = supervisor
            .on_phase_change(move |_event| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        supervisor.start().await;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while fired.load(Ordering::SeqCst) == 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "watcher never fired"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        supervisor.stop().await;

        assert!(supervisor.remove_listener(listener).await);
        assert!(!supervisor.remove_listener(listener).await);
    }
}
