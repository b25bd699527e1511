use anyhow::Result;
use colored::Colorize;
use furlong::prelude::*;
use furlong::rating::RatingEngine;
use furlong::roster::HorseRoster;
use furlong::store::{
    MemoryRaceStore, MemoryRatingBook, RaceStateStore, RatingBookStore, StaticCatalog,
};
use furlong::time::SystemClock;
use furlong::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = r#"
   ___           _
  / __\   _ _ __| | ___  _ __   __ _
 / _\| | | | '__| |/ _ \| '_ \ / _` |
/ /  | |_| | |  | | (_) | | | | (_| |
\/    \__,_|_|  |_|\___/|_| |_|\__, |
                               |___/
"#;
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );

    println!("{}", "-----------------------------------------------------------------------------------------------".dimmed());

    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";

    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());

    println!("{}", "-----------------------------------------------------------------------------------------------".dimmed());
}

/// Spawns tasks that mirror the engine's event streams into the terminal.
fn spawn_event_listeners(supervisor: &AutomationSupervisor, is_watching: Arc<AtomicBool>) {
    // System Event Listener
    let mut system_rx = supervisor.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            println!("\n<-- [SYSTEM EVENT] {:?}\n>> ", event);
        }
    });

    // Race Listener (controlled by the shared flag)
    let mut race_rx = supervisor.subscribe_race_events();
    tokio::spawn(async move {
        while let Ok(event) = race_rx.recv().await {
            if is_watching.load(Ordering::Relaxed) {
                match event {
                    RaceEvent::PhaseChanged(change) => {
                        println!(
                            "<-- [PHASE] {} -> {}",
                            change.from.label(),
                            change.to.label()
                        );
                    }
                    RaceEvent::RaceFinished { results } => {
                        println!("<-- [FINISH] {} placed", results.len());
                    }
                    RaceEvent::RatingsSettled { changes } => {
                        println!("<-- [RATINGS] {} horses settled", changes.len());
                    }
                }
            }
        }
    });
}

fn print_status(state: &RaceState) {
    println!("Phase: {}", state.phase.label().bold());
    match state.phase {
        RacePhase::PreRace => println!("  gates in {:.1}s", state.pre_race_timer),
        RacePhase::Countdown => println!("  off in {:.1}s", state.countdown_timer),
        RacePhase::Racing => {
            println!("  race clock {:.1}s", state.race_timer);
            if let Some(leader) = state.leader() {
                println!("  leading: {} at {:.0}m", leader.name, leader.position);
            }
        }
        RacePhase::Finished => println!("  results board up, {} placed", state.results.len()),
    }
}

fn print_card(state: &RaceState) {
    if state.contestants.is_empty() {
        println!("No race assembled yet; 'start' the automation first.");
        return;
    }
    for contestant in &state.contestants {
        println!(
            "lane {}  {:<18} rating {:>6.1}  odds {:>6.2}  at {:>6.1}m",
            contestant.lane,
            contestant.name,
            contestant.rating,
            contestant.odds,
            contestant.position
        );
    }
}

fn print_results(state: &RaceState) {
    if state.results.is_empty() {
        println!("No results yet.");
        return;
    }
    for record in &state.results {
        let name = state
            .contestant(record.contestant_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("#{}", record.contestant_id));
        println!(
            "{}. {:<18} {:>6.2}s  (+{:.2}s)",
            record.placement, name, record.finish_time, record.gap_to_leader
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .init();

    let config = FurlongConfig::load().unwrap_or_default();
    let store = Arc::new(MemoryRaceStore::new(RaceState::empty(chrono::Utc::now())));
    let book = Arc::new(MemoryRatingBook::new());
    let ratings = RatingEngine::new(book.clone(), config.rating.clone());
    let roster = HorseRoster::new(Arc::new(StaticCatalog::default()), ratings.clone());
    let controller = Arc::new(RacePhaseController::new(
        ActorId::from("furlongshell"),
        Arc::new(SystemClock),
        store.clone(),
        roster,
        ratings,
        config,
    ));
    let supervisor = AutomationSupervisor::new(controller);

    // Create the shared flag for the race event listener.
    let is_watching = Arc::new(AtomicBool::new(false));
    spawn_event_listeners(&supervisor, is_watching.clone());

    info!("{} shell ready.", ENGINE_NAME);

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!(
        "{} is wired up. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.trim().split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "start" => {
                            if supervisor.start().await {
                                println!("--> Automation started.");
                            } else {
                                println!("--> Automation is already running.");
                            }
                        }
                        "stop" => {
                            if supervisor.stop().await {
                                println!("--> Automation stopped.");
                            } else {
                                println!("--> Automation was not running.");
                            }
                        }
                        "status" => match store.read() {
                            Ok(state) => print_status(&state),
                            Err(err) => println!("Error: {err}"),
                        },
                        "card" => match store.read() {
                            Ok(state) => print_card(&state),
                            Err(err) => println!("Error: {err}"),
                        },
                        "results" => match store.read() {
                            Ok(state) => print_results(&state),
                            Err(err) => println!("Error: {err}"),
                        },
                        "book" => {
                            if args.len() < 2 {
                                println!("Usage: book <HORSE NAME>");
                            } else {
                                let name = args[1..].join(" ");
                                match (book.rating(&name), book.stats(&name)) {
                                    (Ok(rating), Ok(stats)) => {
                                        let rating = rating.unwrap_or(500.0);
                                        println!("{name}: rating {rating:.1}");
                                        if let Some(stats) = stats {
                                            println!(
                                                "  {} wins / {} races, form {:?}",
                                                stats.wins, stats.total_races, stats.recent_form
                                            );
                                        } else {
                                            println!("  no races on record");
                                        }
                                    }
                                    _ => println!("Error reading the book."),
                                }
                            }
                        }
                        "watch" => match args.get(1) {
                            Some(&"on") => {
                                is_watching.store(true, Ordering::Relaxed);
                                println!("--> Watching race events.");
                            }
                            Some(&"off") => {
                                is_watching.store(false, Ordering::Relaxed);
                                println!("--> Stopped watching race events.");
                            }
                            _ => println!("Usage: watch on|off"),
                        },
                        "reset-book" => match book.reset_all() {
                            Ok(()) => println!("--> Rating book cleared."),
                            Err(err) => println!("Error: {err}"),
                        },
                        "help" => {
                            println!("Available commands:");
                            println!("  start                 - Starts the race automation.");
                            println!("  stop                  - Stops the race automation.");
                            println!("  status                - Shows the current phase and timers.");
                            println!("  card                  - Shows the current field with odds.");
                            println!("  results               - Shows the latest finish order.");
                            println!("  book <NAME>           - Shows a horse's rating and form.");
                            println!("  watch on|off          - Mirrors race events into the shell.");
                            println!("  reset-book            - Clears the entire rating book.");
                            println!("  exit                  - Quits the shell.");
                        }
                        "exit" => break,
                        "" => {}
                        _ => println!("Unknown command: '{}'. Type 'help'.", line),
                    }
                }
            }
            Err(_) => {
                println!("Exiting furlongshell...");
                break;
            }
        }
    }

    supervisor.stop().await;
    Ok(())
}
