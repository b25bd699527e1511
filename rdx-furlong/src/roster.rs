//! Assembles the field for a new race.
//!
//! Selection is rating-tier-weighted sampling without replacement: the
//! higher a horse's current tier, the rarer its appearance, which keeps
//! star horses from headlining every race. Lanes are assigned in selection
//! order; odds come from the rating engine over the whole field.

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::errors::EngineError;
use crate::rating::RatingEngine;
use crate::state::Contestant;
use crate::store::NameCatalog;

/// Relative selection weight for a rating tier. Higher tiers are rarer.
fn selection_weight(rating: f64) -> f64 {
    if rating >= 2000.0 {
        1.0
    } else if rating >= 1800.0 {
        2.0
    } else if rating >= 1600.0 {
        3.5
    } else if rating >= 1400.0 {
        5.0
    } else if rating >= 1200.0 {
        7.0
    } else {
        8.0
    }
}

pub struct HorseRoster {
    catalog: Arc<dyn NameCatalog>,
    ratings: RatingEngine,
}

impl HorseRoster {
    pub fn new(catalog: Arc<dyn NameCatalog>, ratings: RatingEngine) -> Self {
        Self { catalog, ratings }
    }

    /// Selects `pool_size` unique names and builds the lane-ordered field.
    ///
    /// Fails with [`EngineError::InsufficientCatalog`] when the catalog
    /// cannot supply enough unique names; the caller retries on a later
    /// tick once the catalog recovers.
    pub fn assemble_race(
        &self,
        pool_size: usize,
        rng: &mut impl Rng,
    ) -> Result<Vec<Contestant>, EngineError> {
        let mut seen = HashSet::new();
        let mut pool: Vec<(String, f64, f64)> = Vec::new();
        for name in self.catalog.list_names() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let rating = self.ratings.rating_or_default(&name)?;
            pool.push((name, rating, selection_weight(rating)));
        }

        if pool.len() < pool_size {
            return Err(EngineError::InsufficientCatalog {
                needed: pool_size,
                available: pool.len(),
            });
        }

        let mut field: Vec<(String, f64)> = Vec::with_capacity(pool_size);
        while field.len() < pool_size {
            let total: f64 = pool.iter().map(|(_, _, w)| w).sum();
            let mut roll = rng.gen_range(0.0..total);
            let mut chosen = pool.len() - 1;
            for (idx, (_, _, weight)) in pool.iter().enumerate() {
                if roll < *weight {
                    chosen = idx;
                    break;
                }
                roll -= weight;
            }
            let (name, rating, _) = pool.swap_remove(chosen);
            field.push((name, rating));
        }

        let odds = self.ratings.fair_odds_for(&field);
        let contestants = field
            .into_iter()
            .enumerate()
            .map(|(idx, (name, rating))| {
                let lane = (idx + 1) as u8;
                Contestant {
                    id: lane as u32,
                    odds: odds.get(&name).copied().unwrap_or(crate::rating::MAX_ODDS),
                    name,
                    rating,
                    lane,
                    position: 0.0,
                }
            })
            .collect::<Vec<_>>();

        debug!(field = contestants.len(), "assembled race");
        Ok(contestants)
    }
}
