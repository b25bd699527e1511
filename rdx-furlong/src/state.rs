//! The authoritative race data model.
//!
//! A single [`RaceState`] row is the whole truth about the current race:
//! viewers subscribe to it, the controller conditionally rewrites it, and
//! every timer in it is a derived snapshot of `now - phase_started_at`
//! rather than an accumulated counter. Alongside it lives the persistent
//! [`HorseStats`] record kept per horse name across races.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::ActorId;

/// The lifecycle phase of the current race.
///
/// Transitions are strictly linear: PreRace → Countdown → Racing →
/// Finished → (fresh PreRace). No phase is ever skipped or revisited
/// within one race lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RacePhase {
    PreRace,
    Countdown,
    Racing,
    Finished,
}

impl RacePhase {
    /// The only phase this one may advance to.
    pub fn successor(self) -> RacePhase {
        match self {
            RacePhase::PreRace => RacePhase::Countdown,
            RacePhase::Countdown => RacePhase::Racing,
            RacePhase::Racing => RacePhase::Finished,
            RacePhase::Finished => RacePhase::PreRace,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RacePhase::PreRace => "pre-race",
            RacePhase::Countdown => "countdown",
            RacePhase::Racing => "racing",
            RacePhase::Finished => "finished",
        }
    }
}

/// One horse in the current race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contestant {
    /// Unique within the race.
    pub id: u32,
    pub name: String,
    /// Rating fixed at race assembly; settlement works against this value.
    pub rating: f64,
    /// 1-based lane assignment, unique per race.
    pub lane: u8,
    /// Meters from the start line, monotonically non-decreasing while racing.
    pub position: f64,
    /// Decimal odds, informational only.
    pub odds: f64,
}

/// One line of the finish order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishRecord {
    pub contestant_id: u32,
    /// 1-based rank, unique and contiguous from 1.
    pub placement: u8,
    /// Seconds from the race start, strictly increasing with placement.
    pub finish_time: f64,
    pub gap_to_leader: f64,
}

/// The single authoritative row describing the current race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceState {
    pub phase: RacePhase,
    /// Lane order; fixed once the race leaves PreRace.
    pub contestants: Vec<Contestant>,
    /// Seconds until the countdown begins. Derived, PreRace only.
    pub pre_race_timer: f64,
    /// Seconds until the gates open. Derived, Countdown only.
    pub countdown_timer: f64,
    /// Wall-clock seconds since the race started. Derived, Racing onward.
    pub race_timer: f64,
    /// Empty until the race finishes; placements never change once set.
    pub results: Vec<FinishRecord>,
    /// Anchors all timer computation for the current phase.
    pub phase_started_at: DateTime<Utc>,
    /// Set on the Countdown → Racing transition.
    pub race_started_at: Option<DateTime<Utc>>,
    /// The actor currently permitted to advance timers, if any.
    pub timer_owner: Option<ActorId>,
    /// Bumped by the store on every committed write; conditional writes
    /// are keyed on it.
    pub version: u64,
}

impl RaceState {
    /// An uninitialized row: PreRace with no contestants. The controller
    /// treats this as "assemble a race on the next tick".
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            phase: RacePhase::PreRace,
            contestants: Vec::new(),
            pre_race_timer: 0.0,
            countdown_timer: 0.0,
            race_timer: 0.0,
            results: Vec::new(),
            phase_started_at: now,
            race_started_at: None,
            timer_owner: None,
            version: 0,
        }
    }

    /// A fresh PreRace row around a newly assembled field.
    pub fn fresh_pre_race(contestants: Vec<Contestant>, now: DateTime<Utc>, pre_race_secs: f64) -> Self {
        Self {
            phase: RacePhase::PreRace,
            contestants,
            pre_race_timer: pre_race_secs,
            countdown_timer: 0.0,
            race_timer: 0.0,
            results: Vec::new(),
            phase_started_at: now,
            race_started_at: None,
            timer_owner: None,
            version: 0,
        }
    }

    pub fn contestant(&self, id: u32) -> Option<&Contestant> {
        self.contestants.iter().find(|c| c.id == id)
    }

    /// The contestant furthest down the track, if any.
    pub fn leader(&self) -> Option<&Contestant> {
        self.contestants
            .iter()
            .max_by(|a, b| a.position.partial_cmp(&b.position).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Structural invariants that must hold before the row may be written.
    ///
    /// Violations indicate a programming defect, not a runtime condition;
    /// the controller refuses to persist a row that fails this check.
    pub fn check_invariants(&self) -> Result<(), String> {
        let n = self.contestants.len();

        let mut lanes: Vec<u8> = self.contestants.iter().map(|c| c.lane).collect();
        lanes.sort_unstable();
        lanes.dedup();
        if lanes.len() != n {
            return Err("duplicate lane assignment".into());
        }

        let mut ids: Vec<u32> = self.contestants.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != n {
            return Err("duplicate contestant id".into());
        }

        if self.results.len() > n {
            return Err(format!("{} results for {} contestants", self.results.len(), n));
        }
        let mut placements: Vec<u8> = self.results.iter().map(|r| r.placement).collect();
        placements.sort_unstable();
        for (i, p) in placements.iter().enumerate() {
            if *p as usize != i + 1 {
                return Err(format!("placements not contiguous from 1: {placements:?}"));
            }
        }

        let mut by_placement = self.results.clone();
        by_placement.sort_by_key(|r| r.placement);
        for pair in by_placement.windows(2) {
            if pair[1].finish_time <= pair[0].finish_time {
                return Err("finish times not strictly increasing with placement".into());
            }
        }

        Ok(())
    }

    /// Whether two rows describe the same observable race, ignoring the
    /// store-managed version counter. Used to skip no-op writes so that a
    /// duplicate tick with no wall-clock progress leaves the row untouched.
    pub fn same_view(&self, other: &RaceState) -> bool {
        self.phase == other.phase
            && self.contestants == other.contestants
            && self.pre_race_timer == other.pre_race_timer
            && self.countdown_timer == other.countdown_timer
            && self.race_timer == other.race_timer
            && self.results == other.results
            && self.phase_started_at == other.phase_started_at
            && self.race_started_at == other.race_started_at
    }
}

/// Historical record for one horse name, persisted across races.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorseStats {
    pub wins: u32,
    pub total_races: u32,
    /// Last placements, most recent first, at most [`HorseStats::FORM_LEN`].
    pub recent_form: Vec<u8>,
}

impl HorseStats {
    pub const FORM_LEN: usize = 5;

    /// Folds one race result into the record.
    pub fn record(&mut self, placement: u8) {
        self.total_races += 1;
        if placement == 1 {
            self.wins += 1;
        }
        self.recent_form.insert(0, placement);
        self.recent_form.truncate(Self::FORM_LEN);
    }
}
