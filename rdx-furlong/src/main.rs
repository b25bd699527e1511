use anyhow::Result;
use colored::Colorize;
use furlong::prelude::*;
use furlong::rating::RatingEngine;
use furlong::roster::HorseRoster;
use furlong::store::{MemoryRaceStore, MemoryRatingBook, RaceStateStore, StaticCatalog};
use furlong::time::SystemClock;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    // 2. Load the deployment configuration, falling back to defaults.
    let config = match FurlongConfig::load() {
        Ok(config) => config,
        Err(err) => {
            warn!(%err, "could not load configuration; using defaults");
            FurlongConfig::default()
        }
    };

    // 3. Build the stores and wire the engine together.
    let store = Arc::new(MemoryRaceStore::new(RaceState::empty(chrono::Utc::now())));
    let book = Arc::new(MemoryRatingBook::new());
    let ratings = RatingEngine::new(book, config.rating.clone());
    let roster = HorseRoster::new(Arc::new(StaticCatalog::default()), ratings.clone());
    let controller = Arc::new(RacePhaseController::new(
        ActorId::from("furlongdev"),
        Arc::new(SystemClock),
        store.clone(),
        roster,
        ratings,
        config,
    ));
    let supervisor = AutomationSupervisor::new(controller);

    // 4. Spawn concurrent tasks to listen to the event streams.
    spawn_event_listeners(&supervisor, store.clone());

    // 5. Run the automation until Ctrl+C.
    supervisor.start().await;
    info!("{} running. Press Ctrl+C to shut down.", furlong::ENGINE_NAME);
    tokio::signal::ctrl_c().await?;
    supervisor.stop().await;
    info!("{} has shut down.", furlong::ENGINE_NAME);

    Ok(())
}

/// Spawns tasks subscribing to the supervisor's event streams, printing a
/// race card as the lifecycle progresses.
fn spawn_event_listeners(supervisor: &AutomationSupervisor, store: Arc<MemoryRaceStore>) {
    let mut system_rx = supervisor.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut race_rx = supervisor.subscribe_race_events();
    tokio::spawn(async move {
        while let Ok(event) = race_rx.recv().await {
            match event {
                RaceEvent::PhaseChanged(change) => {
                    info!("[PHASE] {} -> {}", change.from.label(), change.to.label());
                    if change.to == RacePhase::PreRace {
                        if let Ok(state) = store.read() {
                            print_card(&state);
                        }
                    }
                }
                RaceEvent::RaceFinished { results } => {
                    let Ok(state) = store.read() else { continue };
                    println!("{}", "---- FINISH ----".bold());
                    for record in &results {
                        let name = state
                            .contestant(record.contestant_id)
                            .map(|c| c.name.clone())
                            .unwrap_or_else(|| format!("#{}", record.contestant_id));
                        let line = format!(
                            "{}. {:<18} {:>6.2}s  (+{:.2}s)",
                            record.placement, name, record.finish_time, record.gap_to_leader
                        );
                        match record.placement {
                            1 => println!("{}", line.yellow().bold()),
                            2 | 3 => println!("{}", line.cyan()),
                            _ => println!("{}", line.dimmed()),
                        }
                    }
                }
                RaceEvent::RatingsSettled { changes } => {
                    for change in changes {
                        info!(
                            "[RATING] {:<18} {:>7.1} -> {:>7.1}",
                            change.name, change.old, change.new
                        );
                    }
                }
            }
        }
    });
}

fn print_card(state: &RaceState) {
    println!("{}", "---- NEXT RACE ----".bold());
    for contestant in &state.contestants {
        println!(
            "lane {}  {:<18} rating {:>6.1}  odds {:>6.2}",
            contestant.lane,
            contestant.name,
            contestant.rating,
            contestant.odds
        );
    }
}
