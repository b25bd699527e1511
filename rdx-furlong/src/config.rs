//! Defines all configuration structures for the Furlong engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`. This allows the deployment's phase
//! timings, track geometry, and simulation tuning to be defined externally
//! from the application code. Every field has a default, so an empty file
//! (or no file at all) yields a runnable engine.

use serde::Deserialize;

/// The top-level configuration for the Furlong engine.
///
/// One deployment uses one consistent set of phase timing constants; they
/// are defined here, not scattered through the code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FurlongConfig {
    pub timings: PhaseTimings,
    pub track: TrackConfig,
    pub tuning: SimulationTuning,
    pub rating: RatingConfig,
    pub roster: RosterConfig,
}

impl FurlongConfig {
    /// Loads configuration from `furlong.toml` (if present) overlaid with
    /// `FURLONG_*` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("furlong").required(false))
            .add_source(config::Environment::with_prefix("FURLONG").separator("__"))
            .build()?
            .try_deserialize()
    }
}

/// Wall-clock timing of the race lifecycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhaseTimings {
    /// Seconds a freshly assembled field is on display before the countdown.
    pub pre_race_secs: f64,
    /// Seconds of countdown before the gates open.
    pub countdown_secs: f64,
    /// Seconds the finished board stays up before the next race is assembled.
    pub finished_secs: f64,
    /// Tick cadence while a race is running.
    pub racing_cadence_ms: u64,
    /// Tick cadence in every other phase.
    pub idle_cadence_ms: u64,
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self {
            pre_race_secs: 10.0,
            countdown_secs: 5.0,
            finished_secs: 15.0,
            racing_cadence_ms: 100,
            idle_cadence_ms: 1000,
        }
    }
}

/// Track geometry and the simulation step.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Track length in meters.
    pub length_m: f64,
    /// Duration of one simulation step, in seconds.
    pub tick_secs: f64,
    /// Safety bound: a race never runs longer than this. Stragglers are
    /// placed by current position when it elapses.
    pub max_race_secs: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            length_m: 1200.0,
            tick_secs: 0.1,
            max_race_secs: 60.0,
        }
    }
}

/// Tuning constants for the three kinetic phases of motion.
///
/// These shape the qualitative behavior (bunched pack, blended transition,
/// rating-dominated sprint); the exact values are chosen for visual
/// plausibility and are freely tunable per deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationTuning {
    /// Nominal speed in m/s before multipliers.
    pub base_speed: f64,
    /// Progress fraction where the pack phase ends.
    pub pack_end: f64,
    /// Progress fraction where the sprint phase begins.
    pub sprint_start: f64,
    /// Meters of tolerated spread around the pack centroid.
    pub pack_window_m: f64,
    /// Strength of the pull back toward the pack window.
    pub pack_pull: f64,
    /// Bounded per-tick speed noise while packed.
    pub pack_noise: f64,
    /// Total speed range attributable to rating in the sprint.
    pub sprint_spread: f64,
    /// How much an unrated horse fades over the final stretch.
    pub fatigue_fade: f64,
    /// Per-tick chance of a surge (and, independently, of a fade).
    pub surge_chance: f64,
    pub surge_boost: f64,
    pub fade_drop: f64,
    /// How long one surge or fade lasts, in seconds.
    pub surge_secs: f64,
    /// Per-contestant position fraction where the final-stretch boost kicks in.
    pub final_stretch_frac: f64,
    /// Rating-weighted speed bonus inside the final stretch.
    pub final_stretch_boost: f64,
}

impl Default for SimulationTuning {
    fn default() -> Self {
        Self {
            base_speed: 26.0,
            pack_end: 0.40,
            sprint_start: 0.60,
            pack_window_m: 30.0,
            pack_pull: 0.35,
            pack_noise: 0.08,
            sprint_spread: 0.22,
            fatigue_fade: 0.18,
            surge_chance: 0.015,
            surge_boost: 1.25,
            fade_drop: 0.80,
            surge_secs: 0.8,
            final_stretch_frac: 0.90,
            final_stretch_boost: 0.06,
        }
    }
}

/// Rating-engine constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Rating assigned to a name never seen before.
    pub default_rating: f64,
    /// Ratings never drop below this.
    pub floor: f64,
    /// K-factor for podium placements (1..=3).
    pub k_podium: f64,
    /// K-factor for the rest of the field.
    pub k_field: f64,
    /// Ratings map linearly from [norm_low, norm_high] to [0, 1] for the
    /// simulator, clamped outside the band.
    pub norm_low: f64,
    pub norm_high: f64,
    /// Share of the probability mass paid back to the bettor; 0.98 is a 2%
    /// overround.
    pub payout_share: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            default_rating: 500.0,
            floor: 100.0,
            k_podium: 192.0,
            k_field: 32.0,
            norm_low: 400.0,
            norm_high: 2100.0,
            payout_share: 0.98,
        }
    }
}

/// Roster assembly constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Number of contestants per race.
    pub pool_size: usize,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self { pool_size: 8 }
    }
}
