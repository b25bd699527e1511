//! The rating engine: pairwise ELO updates, fair odds, and settlement.
//!
//! The computation half of this module is pure and deterministic: same
//! inputs, same outputs, no hidden randomness. The [`RatingEngine`] wrapper
//! is the persistence boundary that applies a settled race to the rating
//! book exactly once.
//!
//! The update is a full O(n²) round-robin: every unordered pair of
//! contestants is scored as one pairwise game, the better placement taking
//! 1 and the worse 0, and all deltas accumulate against the ratings fixed
//! at race start before being applied simultaneously. Podium placements use
//! a 6x K-factor, so wins and top-3 finishes swing hard while the rest of
//! the field drifts.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::RatingConfig;
use crate::errors::EngineError;
use crate::store::RatingBookStore;

pub const MIN_ODDS: f64 = 1.01;
pub const MAX_ODDS: f64 = 999.0;

/// One contestant's line in a settled race: the rating it carried into the
/// race and where it finished.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceLine {
    pub name: String,
    pub rating: f64,
    pub placement: u8,
}

/// A rating movement produced by settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingChange {
    pub name: String,
    pub old: f64,
    pub new: f64,
}

/// Logistic expectation that `a` beats `b`.
///
/// Symmetric: `expected_score(a, b) + expected_score(b, a) == 1`.
pub fn expected_score(a: f64, b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((b - a) / 400.0))
}

fn k_for(placement: u8, cfg: &RatingConfig) -> f64 {
    if placement <= 3 {
        cfg.k_podium
    } else {
        cfg.k_field
    }
}

/// New ratings for a full finish order.
///
/// Deltas are accumulated pairwise against the race-start ratings and
/// applied in one step, never sequentially, then floored at `cfg.floor`.
pub fn updated_ratings(lines: &[RaceLine], cfg: &RatingConfig) -> HashMap<String, f64> {
    let mut deltas = vec![0.0; lines.len()];
    for i in 0..lines.len() {
        for j in (i + 1)..lines.len() {
            let (a, b) = (&lines[i], &lines[j]);
            let expected_a = expected_score(a.rating, b.rating);
            let actual_a = if a.placement < b.placement { 1.0 } else { 0.0 };
            deltas[i] += k_for(a.placement, cfg) * (actual_a - expected_a);
            deltas[j] += k_for(b.placement, cfg) * ((1.0 - actual_a) - (1.0 - expected_a));
        }
    }
    lines
        .iter()
        .zip(&deltas)
        .map(|(line, delta)| (line.name.clone(), (line.rating + delta).max(cfg.floor)))
        .collect()
}

fn tier_multiplier(rating: f64) -> f64 {
    if rating >= 2000.0 {
        1.4
    } else if rating >= 1800.0 {
        1.3
    } else if rating >= 1600.0 {
        1.2
    } else if rating >= 1400.0 {
        1.1
    } else if rating < 800.0 {
        0.6
    } else if rating < 1000.0 {
        0.8
    } else {
        1.0
    }
}

/// Win probabilities for a field, tier-adjusted and normalized to sum to 1.
pub fn fair_probabilities(field: &[(String, f64)]) -> Vec<f64> {
    let strengths: Vec<f64> = field.iter().map(|(_, r)| 10f64.powf(r / 400.0)).collect();
    let total: f64 = strengths.iter().sum();
    let mut probs: Vec<f64> = strengths.iter().map(|s| s / total).collect();

    for (p, (_, rating)) in probs.iter_mut().zip(field) {
        *p *= tier_multiplier(*rating);
    }
    let adjusted_total: f64 = probs.iter().sum();
    for p in probs.iter_mut() {
        *p /= adjusted_total;
    }
    probs
}

/// Rounds to UX-friendly increments: finer near favorites, coarser for
/// longshots.
fn round_odds(odds: f64) -> f64 {
    let step = if odds < 2.0 {
        0.01
    } else if odds < 5.0 {
        0.05
    } else if odds < 10.0 {
        0.1
    } else if odds < 50.0 {
        0.5
    } else {
        1.0
    };
    (odds / step).round() * step
}

/// Decimal odds for a field, keyed by name.
///
/// Guarantees odds within [`MIN_ODDS`, `MAX_ODDS`] and monotonic ordering:
/// a higher-rated contestant never carries longer odds than a lower-rated
/// one, ties broken by rating descending then stable input order, even
/// after rounding.
pub fn fair_odds(field: &[(String, f64)], cfg: &RatingConfig) -> HashMap<String, f64> {
    let probs = fair_probabilities(field);

    let mut order: Vec<usize> = (0..field.len()).collect();
    order.sort_by(|&a, &b| {
        field[b]
            .1
            .partial_cmp(&field[a].1)
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut out = HashMap::with_capacity(field.len());
    let mut shortest_allowed = MIN_ODDS;
    for idx in order {
        let raw = cfg.payout_share / probs[idx];
        let mut odds = round_odds(raw).clamp(MIN_ODDS, MAX_ODDS);
        if odds < shortest_allowed {
            odds = shortest_allowed;
        }
        shortest_allowed = odds;
        out.insert(field[idx].0.clone(), odds);
    }
    out
}

/// The persistence boundary of the rating engine.
///
/// Owns all writes to the rating book; the rest of the engine reads
/// ratings at roster-assembly time and otherwise never touches it.
#[derive(Clone)]
pub struct RatingEngine {
    book: Arc<dyn RatingBookStore>,
    cfg: RatingConfig,
}

impl RatingEngine {
    pub fn new(book: Arc<dyn RatingBookStore>, cfg: RatingConfig) -> Self {
        Self { book, cfg }
    }

    pub fn config(&self) -> &RatingConfig {
        &self.cfg
    }

    /// The book rating for `name`, or the configured default for a name
    /// never seen before.
    pub fn rating_or_default(&self, name: &str) -> Result<f64, EngineError> {
        Ok(self.book.rating(name)?.unwrap_or(self.cfg.default_rating))
    }

    pub fn fair_odds_for(&self, field: &[(String, f64)]) -> HashMap<String, f64> {
        fair_odds(field, &self.cfg)
    }

    /// Applies one race's outcome to the book: pairwise rating update plus
    /// win/total/recent-form stats. Call exactly once per race; the caller
    /// (the actor that committed Racing → Finished) is responsible for that
    /// guarantee.
    pub fn settle_race(&self, lines: &[RaceLine]) -> Result<Vec<RatingChange>, EngineError> {
        let updated = updated_ratings(lines, &self.cfg);
        self.book.set_all(&updated)?;

        let mut changes = Vec::with_capacity(lines.len());
        for line in lines {
            let mut stats = self.book.stats(&line.name)?.unwrap_or_default();
            stats.record(line.placement);
            self.book.set_stats(&line.name, &stats)?;

            let new = updated.get(&line.name).copied().unwrap_or(line.rating);
            debug!(
                name = %line.name,
                placement = line.placement,
                old = line.rating,
                new,
                "settled"
            );
            changes.push(RatingChange {
                name: line.name.clone(),
                old: line.rating,
                new,
            });
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRatingBook;

    fn cfg() -> RatingConfig {
        RatingConfig::default()
    }

    fn line(name: &str, rating: f64, placement: u8) -> RaceLine {
        RaceLine {
            name: name.to_string(),
            rating,
            placement,
        }
    }

    #[test]
    fn expected_scores_are_complementary() {
        for (a, b) in [(500.0, 500.0), (2000.0, 500.0), (100.0, 2100.0), (731.0, 988.0)] {
            let sum = expected_score(a, b) + expected_score(b, a);
            assert!((sum - 1.0).abs() < 1e-12, "a={a} b={b} sum={sum}");
        }
        assert!((expected_score(500.0, 500.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn winner_at_or_below_field_average_always_gains() {
        let lines = vec![
            line("winner", 500.0, 1),
            line("second", 700.0, 2),
            line("third", 900.0, 3),
            line("fourth", 1100.0, 4),
        ];
        let updated = updated_ratings(&lines, &cfg());
        assert!(updated["winner"] > 500.0);
    }

    #[test]
    fn ratings_never_drop_below_floor() {
        let lines = vec![
            line("giant", 2100.0, 1),
            line("minnow", 105.0, 2),
            line("straggler", 100.0, 8),
        ];
        let updated = updated_ratings(&lines, &cfg());
        for (name, rating) in &updated {
            assert!(*rating >= 100.0, "{name} fell to {rating}");
        }
    }

    #[test]
    fn podium_k_factor_shapes_favorite_vs_longshot() {
        // A heavy favorite beating a longshot should move both ratings by
        // a comparably small amount: 192 * (1 - expected) with expected
        // near one.
        let lines = vec![line("a", 2000.0, 1), line("b", 500.0, 2)];
        let expected_a = expected_score(2000.0, 500.0);
        let updated = updated_ratings(&lines, &cfg());

        let delta_a = updated["a"] - 2000.0;
        let delta_b = updated["b"] - 500.0;
        assert!((delta_a - 192.0 * (1.0 - expected_a)).abs() < 1e-9);
        assert!((delta_a + delta_b).abs() < 1e-9, "both on podium K, zero-sum");
        assert!(delta_a > 0.0 && delta_a < 1.0, "delta_a={delta_a}");
        assert!(delta_b < 0.0 && delta_b > -1.0, "delta_b={delta_b}");
    }

    #[test]
    fn upset_win_swings_hard() {
        let lines = vec![line("underdog", 500.0, 1), line("favorite", 2000.0, 2)];
        let updated = updated_ratings(&lines, &cfg());
        // Near-certain loss turned win at K=192.
        assert!(updated["underdog"] - 500.0 > 150.0);
        assert!(2000.0 - updated["favorite"] > 150.0);
    }

    #[test]
    fn deltas_apply_simultaneously_not_sequentially() {
        // With simultaneous application the order of lines is irrelevant.
        let forward = vec![line("a", 900.0, 1), line("b", 800.0, 2), line("c", 700.0, 3)];
        let reversed: Vec<RaceLine> = forward.iter().rev().cloned().collect();
        let from_forward = updated_ratings(&forward, &cfg());
        let from_reversed = updated_ratings(&reversed, &cfg());
        for name in ["a", "b", "c"] {
            assert!((from_forward[name] - from_reversed[name]).abs() < 1e-9);
        }
    }

    #[test]
    fn probabilities_sum_to_one_and_inverse_odds_carry_the_overround() {
        let field: Vec<(String, f64)> = [
            ("a", 2050.0),
            ("b", 1700.0),
            ("c", 1450.0),
            ("d", 1100.0),
            ("e", 950.0),
            ("f", 750.0),
            ("g", 500.0),
            ("h", 500.0),
        ]
        .iter()
        .map(|(n, r)| (n.to_string(), *r))
        .collect();

        let probs = fair_probabilities(&field);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);

        // Before rounding, sum of 1/odds is exactly 1/payout_share.
        let book: f64 = probs.iter().map(|p| p / cfg().payout_share).sum();
        assert!((book - 1.0 / 0.98).abs() < 1e-9);
    }

    #[test]
    fn odds_are_monotonic_in_rating_and_clamped() {
        let field: Vec<(String, f64)> = [
            ("top", 2100.0),
            ("high", 1850.0),
            ("mid", 1500.0),
            ("tied1", 900.0),
            ("tied2", 900.0),
            ("low", 420.0),
            ("floor", 100.0),
            ("floor2", 100.0),
        ]
        .iter()
        .map(|(n, r)| (n.to_string(), *r))
        .collect();

        let odds = fair_odds(&field, &cfg());
        let mut by_rating: Vec<&(String, f64)> = field.iter().collect();
        by_rating.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let mut previous = 0.0;
        for (name, _) in by_rating {
            let o = odds[name];
            assert!(o >= MIN_ODDS && o <= MAX_ODDS, "{name} at {o}");
            assert!(o >= previous, "{name} shorter than a better-rated horse");
            previous = o;
        }
    }

    #[test]
    fn settlement_writes_book_and_stats_once() {
        let book = Arc::new(MemoryRatingBook::new());
        let engine = RatingEngine::new(book.clone(), cfg());

        let lines = vec![
            line("Ember Dash", 600.0, 1),
            line("Quiet Tide", 500.0, 2),
            line("Iron Hoof", 500.0, 3),
        ];
        let changes = engine.settle_race(&lines).unwrap();
        assert_eq!(changes.len(), 3);

        let winner = book.stats("Ember Dash").unwrap().unwrap();
        assert_eq!(winner.wins, 1);
        assert_eq!(winner.total_races, 1);
        assert_eq!(winner.recent_form, vec![1]);

        let stored = book.rating("Ember Dash").unwrap().unwrap();
        let change = changes.iter().find(|c| c.name == "Ember Dash").unwrap();
        assert!((stored - change.new).abs() < 1e-12);
        assert!(change.new > change.old);
    }
}
