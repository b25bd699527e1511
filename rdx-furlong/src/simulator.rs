//! The tick-by-tick race simulator.
//!
//! Motion runs through three kinetic phases keyed on the overall progress
//! fraction `p = mean(position) / track_length`, not on the lifecycle
//! phase: a clustered pack early, a blended transition band, then a sprint
//! where the rating increasingly decides the outcome. The simulator owns
//! its finish-event queue; the controller drains it by direct method call.
//!
//! All randomness flows through one seeded RNG, so a simulator constructed
//! with the same field and seed replays the same race, and a cloned
//! simulator replays identically from its snapshot point.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{RatingConfig, SimulationTuning, TrackConfig};
use crate::state::{Contestant, FinishRecord};

/// Tie-break added to every finish time, scaled by lane index. Two
/// contestants can therefore never record the same finish time, even when
/// they cross on the same tick with the same interpolated fraction.
const LANE_TIEBREAK_SECS: f64 = 1e-6;

/// A temporary sprint-phase speed excursion in either direction.
#[derive(Debug, Clone, Copy)]
struct Surge {
    multiplier: f64,
    remaining_secs: f64,
}

#[derive(Debug, Clone)]
struct Runner {
    contestant_id: u32,
    lane: u8,
    /// Rating mapped linearly onto [0, 1].
    skill: f64,
    position: f64,
    finished: bool,
    surge: Option<Surge>,
}

impl Runner {
    fn from_contestant(contestant: &Contestant, rating_cfg: &RatingConfig) -> Self {
        let span = rating_cfg.norm_high - rating_cfg.norm_low;
        Self {
            contestant_id: contestant.id,
            lane: contestant.lane,
            skill: ((contestant.rating - rating_cfg.norm_low) / span).clamp(0.0, 1.0),
            position: contestant.position.max(0.0),
            finished: false,
            surge: None,
        }
    }
}

/// A contestant crossing the line, in placement order.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishEvent {
    pub contestant_id: u32,
    pub lane: u8,
    pub placement: u8,
    /// Seconds from the race start, interpolated within the crossing tick.
    pub finish_time: f64,
}

impl FinishEvent {
    /// The persisted form of this crossing. The winner's time anchors the
    /// gap column.
    pub fn to_record(&self, winner_time: f64) -> FinishRecord {
        FinishRecord {
            contestant_id: self.contestant_id,
            placement: self.placement,
            finish_time: self.finish_time,
            gap_to_leader: (self.finish_time - winner_time).max(0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RaceSimulator {
    track: TrackConfig,
    tuning: SimulationTuning,
    runners: Vec<Runner>,
    elapsed: f64,
    ticks: u64,
    next_placement: u8,
    pending: Vec<FinishEvent>,
    rng: StdRng,
}

impl RaceSimulator {
    /// A simulator at the starting gates: all positions zero.
    pub fn new(
        contestants: &[Contestant],
        track: TrackConfig,
        tuning: SimulationTuning,
        rating_cfg: &RatingConfig,
        seed: u64,
    ) -> Self {
        let runners = contestants
            .iter()
            .map(|c| {
                let mut runner = Runner::from_contestant(c, rating_cfg);
                runner.position = 0.0;
                runner
            })
            .collect();
        Self {
            track,
            tuning,
            runners,
            elapsed: 0.0,
            ticks: 0,
            next_placement: 1,
            pending: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Rebuilds a simulator mid-race from the authoritative row, e.g.
    /// after the driving process restarted. Positions come from the row;
    /// already-recorded finishers keep their placements and are never
    /// re-processed.
    pub fn resume(
        contestants: &[Contestant],
        results: &[FinishRecord],
        race_timer: f64,
        track: TrackConfig,
        tuning: SimulationTuning,
        rating_cfg: &RatingConfig,
        seed: u64,
    ) -> Self {
        let ticks = (race_timer / track.tick_secs).floor().max(0.0) as u64;
        let elapsed = ticks as f64 * track.tick_secs;
        let runners = contestants
            .iter()
            .map(|c| {
                let mut runner = Runner::from_contestant(c, rating_cfg);
                runner.finished = results.iter().any(|r| r.contestant_id == c.id);
                runner
            })
            .collect();
        Self {
            track,
            tuning,
            runners,
            elapsed,
            ticks,
            next_placement: (results.len() + 1) as u8,
            pending: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn ticks_advanced(&self) -> u64 {
        self.ticks
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn is_complete(&self) -> bool {
        self.runners.iter().all(|r| r.finished)
    }

    /// Current positions in lane order.
    pub fn positions(&self) -> Vec<(u32, f64)> {
        self.runners
            .iter()
            .map(|r| (r.contestant_id, r.position))
            .collect()
    }

    /// Crossings recorded since the last drain, in placement order.
    pub fn drain_finishes(&mut self) -> Vec<FinishEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Advances the race by one tick of `track.tick_secs`.
    pub fn advance(&mut self) {
        if self.is_complete() {
            return;
        }

        let dt = self.track.tick_secs;
        let length = self.track.length_m;
        let progress = self.progress_fraction();
        let centroid = self.centroid();

        let mut crossings: Vec<(usize, f64)> = Vec::new();
        for idx in 0..self.runners.len() {
            if self.runners[idx].finished {
                continue;
            }
            let speed = self.speed_for(idx, progress, centroid);
            let step = speed * dt;
            let position = self.runners[idx].position;

            if position + step >= length {
                let fraction = if step > 0.0 {
                    ((length - position) / step).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                let lane = self.runners[idx].lane;
                let finish_time = self.elapsed + fraction * dt + lane as f64 * LANE_TIEBREAK_SECS;
                let runner = &mut self.runners[idx];
                runner.position = length;
                runner.finished = true;
                crossings.push((idx, finish_time));
            } else {
                self.runners[idx].position = position + step;
            }
        }

        self.elapsed += dt;
        self.ticks += 1;

        // Placements are handed out in finish-time order as contestants
        // cross, even when several cross within one tick.
        crossings.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        for (idx, finish_time) in crossings {
            let placement = self.next_placement;
            self.next_placement += 1;
            self.pending.push(FinishEvent {
                contestant_id: self.runners[idx].contestant_id,
                lane: self.runners[idx].lane,
                placement,
                finish_time,
            });
        }

        if self.elapsed >= self.track.max_race_secs && !self.is_complete() {
            self.place_stragglers();
        }
    }

    /// Safety bound: the race is over, place whoever is still on the track
    /// in current-position order with synthesized times.
    fn place_stragglers(&mut self) {
        let mut remaining: Vec<usize> = (0..self.runners.len())
            .filter(|&idx| !self.runners[idx].finished)
            .collect();
        remaining.sort_by(|&a, &b| {
            let (ra, rb) = (&self.runners[a], &self.runners[b]);
            rb.position
                .partial_cmp(&ra.position)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ra.lane.cmp(&rb.lane))
        });

        for (offset, idx) in remaining.into_iter().enumerate() {
            let placement = self.next_placement;
            self.next_placement += 1;
            let runner = &mut self.runners[idx];
            runner.finished = true;
            self.pending.push(FinishEvent {
                contestant_id: runner.contestant_id,
                lane: runner.lane,
                placement,
                finish_time: self.elapsed
                    + (offset as f64 + 1.0) * 1e-3
                    + runner.lane as f64 * LANE_TIEBREAK_SECS,
            });
        }
    }

    /// Overall race progress: mean position over the whole field.
    fn progress_fraction(&self) -> f64 {
        self.centroid() / self.track.length_m
    }

    fn centroid(&self) -> f64 {
        if self.runners.is_empty() {
            return 0.0;
        }
        let total: f64 = self.runners.iter().map(|r| r.position).sum();
        total / self.runners.len() as f64
    }

    fn speed_for(&mut self, idx: usize, progress: f64, centroid: f64) -> f64 {
        let pack_end = self.tuning.pack_end;
        let sprint_start = self.tuning.sprint_start;
        let multiplier = if progress < pack_end {
            self.pack_multiplier(idx, centroid)
        } else if progress < sprint_start {
            let weight = (progress - pack_end) / (sprint_start - pack_end);
            (1.0 - weight) * self.pack_multiplier(idx, centroid)
                + weight * self.sprint_multiplier(idx, progress, false)
        } else {
            self.sprint_multiplier(idx, progress, true)
        };
        self.tuning.base_speed * multiplier.max(0.05)
    }

    /// Early-race motion: a loose pull toward the pack window plus bounded
    /// noise. Rating barely matters here, which keeps the outcome open.
    fn pack_multiplier(&mut self, idx: usize, centroid: f64) -> f64 {
        let offset = self.runners[idx].position - centroid;
        let pull = (-offset / self.tuning.pack_window_m).clamp(-1.0, 1.0) * self.tuning.pack_pull;
        let skill_nudge = 0.02 * self.runners[idx].skill;
        let noise = self
            .rng
            .gen_range(-self.tuning.pack_noise..=self.tuning.pack_noise);
        1.0 + pull + skill_nudge + noise
    }

    /// Late-race motion: rating-derived sprint bonus, fatigue resistance,
    /// surge/fade excursions and the final-stretch boost.
    fn sprint_multiplier(&mut self, idx: usize, progress: f64, allow_events: bool) -> f64 {
        let dt = self.track.tick_secs;
        let skill = self.runners[idx].skill;
        let position = self.runners[idx].position;
        let sprint_start = self.tuning.sprint_start;

        let depth = ((progress - sprint_start) / (1.0 - sprint_start)).clamp(0.0, 1.0);
        let fatigue = 1.0 - self.tuning.fatigue_fade * depth * (1.0 - skill);
        let mut multiplier =
            (1.0 - self.tuning.sprint_spread / 2.0 + self.tuning.sprint_spread * skill) * fatigue;

        let surge = match self.runners[idx].surge {
            Some(mut surge) => {
                surge.remaining_secs -= dt;
                self.runners[idx].surge = (surge.remaining_secs > 0.0).then_some(surge);
                surge.multiplier
            }
            None if allow_events => {
                if self.rng.gen_bool(self.tuning.surge_chance) {
                    self.start_surge(idx, self.tuning.surge_boost)
                } else if self.rng.gen_bool(self.tuning.surge_chance) {
                    self.start_surge(idx, self.tuning.fade_drop)
                } else {
                    1.0
                }
            }
            None => 1.0,
        };
        multiplier *= surge;

        if position >= self.tuning.final_stretch_frac * self.track.length_m {
            multiplier *= 1.0 + self.tuning.final_stretch_boost * skill;
        }
        multiplier
    }

    fn start_surge(&mut self, idx: usize, multiplier: f64) -> f64 {
        self.runners[idx].surge = Some(Surge {
            multiplier,
            remaining_secs: self.tuning.surge_secs,
        });
        multiplier
    }
}
