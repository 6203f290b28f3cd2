//! Plays check/call bots through an in-memory poker room
//!
//! Usage: cargo run -p cardroom_tables --bin cardroom-sim -- [--config FILE] [--hands N] [--players N]

use std::path::PathBuf;
use std::time::Duration;

use cardroom_engine::history::GameKind;
use cardroom_engine::poker::turn_prompt;
use cardroom_engine::rules::{ActionKind, PokerAction};
use cardroom_tables::{init_logging, start, IntoErrorResponse, RoomStatus, TableSettings};

const ROOM: u64 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config: Option<PathBuf> = None;
    let mut hands = 10u64;
    let mut players = 3u64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("Error: --config requires a value");
                    std::process::exit(1);
                };
                config = Some(PathBuf::from(value));
                i += 2;
            }
            "--hands" | "-n" => {
                hands = parse_count(args.get(i + 1), "--hands");
                i += 2;
            }
            "--players" | "-p" => {
                players = parse_count(args.get(i + 1), "--players");
                i += 2;
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
    }

    let settings = match &config {
        Some(path) => TableSettings::load(path)?,
        None => TableSettings::default(),
    };
    init_logging(&settings)?;
    if players < 2 || players > u64::from(settings.max_seats) {
        eprintln!("Error: --players must be between 2 and {}", settings.max_seats);
        std::process::exit(1);
    }

    let buy_in = settings.max_buy_in;
    let handle = start(settings)?;
    let room = handle.room.clone();
    for user in 1..=players {
        room.ledger().open_wallet(user, buy_in)?;
    }
    room.create_room(ROOM, GameKind::Poker)?;
    for user in 1..=players {
        room.take_seat(ROOM, user, user, (user - 1) as u8, buy_in)?;
    }
    tracing::info!(players, hands, buy_in, "simulation started");

    loop {
        let state = room.poker_state(ROOM)?;
        if let Some(prompt) = state.as_ref().and_then(turn_prompt) {
            let action = if prompt.available_actions.contains(&ActionKind::Check) {
                PokerAction::Check
            } else {
                PokerAction::Call
            };
            if let Err(e) = room.poker_action(ROOM, prompt.user_id, action) {
                e.log_and_respond();
            }
            continue;
        }
        if state.is_none() {
            let played = room.poker_meta(ROOM)?.map_or(0, |m| m.hands_played);
            let status = room.participants().room(ROOM)?.status;
            if played >= hands || status == RoomStatus::Waiting {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    println!("Hands played: {}", room.hand_history().len());
    for record in room.hand_history() {
        println!(
            "  {}  {}",
            record.hand_id,
            record.result.as_deref().unwrap_or("-")
        );
    }
    for p in room.participants().get_seated_players(ROOM)? {
        println!("Player {} (seat {}): {}", p.user_id, p.seat, p.stack);
    }
    handle.shutdown();
    Ok(())
}

fn parse_count(value: Option<&String>, flag: &str) -> u64 {
    match value.and_then(|v| v.parse().ok()) {
        Some(n) => n,
        None => {
            eprintln!("Error: {} requires a number", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("Cardroom table simulator");
    println!();
    println!("Usage: cardroom-sim [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config, -c <FILE>     TOML table settings (defaults otherwise)");
    println!("  --hands, -n <N>         Hands to play (default: 10)");
    println!("  --players, -p <N>       Seated bots (default: 3)");
    println!("  --help                  Show this help message");
}
