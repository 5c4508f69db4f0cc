//! Headless balance/regression driver: runs a random-walk bot against the
//! engine for a batch of seeds and prints a JSON summary.

use std::collections::BTreeMap;

use clap::Parser;
use dungeon_depths_server::engine::GameEngine;
use dungeon_depths_server::rng::Rng;
use dungeon_depths_server::server_utils::parse_character;
use dungeon_depths_server::types::{Direction, GameStatus};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Number of games to run with consecutive seeds.
    #[arg(long, default_value_t = 1)]
    games: u32,
    /// Turn budget per game.
    #[arg(long, default_value_t = 2_000)]
    turns: u32,
    /// Seed of the first game.
    #[arg(long, default_value_t = 1)]
    seed: u32,
    #[arg(long, default_value = "dwarf")]
    character: String,
    #[arg(long, default_value = "SimBot")]
    name: String,
}

#[derive(Clone, Debug, Serialize)]
struct GameResult {
    seed: u32,
    status: GameStatus,
    floor: i32,
    score: i32,
    level: i32,
    turns: u32,
    #[serde(rename = "eventCounts")]
    event_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    games: usize,
    wins: usize,
    deaths: usize,
    #[serde(rename = "bestScore")]
    best_score: i32,
    #[serde(rename = "averageFloor")]
    average_floor: f32,
    results: Vec<GameResult>,
}

fn main() {
    let cli = Cli::parse();
    let character = parse_character(Some(cli.character.as_str()));

    let mut results = Vec::new();
    for index in 0..cli.games {
        let seed = cli.seed.wrapping_add(index);
        match run_game(seed, cli.turns, &cli.name, character) {
            Ok(result) => results.push(result),
            Err(message) => eprintln!("[simulate] seed {seed} aborted: {message}"),
        }
    }

    let wins = results
        .iter()
        .filter(|result| result.status == GameStatus::Won)
        .count();
    let deaths = results
        .iter()
        .filter(|result| result.status == GameStatus::Dead)
        .count();
    let best_score = results.iter().map(|result| result.score).max().unwrap_or(0);
    let average_floor = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|result| result.floor as f32).sum::<f32>() / results.len() as f32
    };

    let summary = RunSummary {
        games: results.len(),
        wins,
        deaths,
        best_score,
        average_floor,
        results,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).expect("summary serializes")
    );
}

fn run_game(
    seed: u32,
    max_turns: u32,
    name: &str,
    character: dungeon_depths_server::types::CharacterKind,
) -> Result<GameResult, String> {
    let mut engine = GameEngine::new_game(
        format!("sim_{seed}"),
        name.to_string(),
        character,
        seed,
    )
    .map_err(|err| err.to_string())?;
    let mut bot = Rng::new(seed ^ 0x5eed_cafe);
    let mut event_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut turns = 0;

    for turn in 0..max_turns {
        turns = turn + 1;
        let output = if bot.chance(0.2) {
            engine.attack_with_deltas()
        } else {
            let direction = match bot.int(0, 3) {
                0 => Direction::Up,
                1 => Direction::Down,
                2 => Direction::Left,
                _ => Direction::Right,
            };
            engine.move_with_deltas(direction)
        }
        .map_err(|err| err.to_string())?;

        for event in &output.events {
            let kind = serde_json::to_value(event)
                .ok()
                .and_then(|value| {
                    value
                        .get("type")
                        .and_then(|tag| tag.as_str().map(str::to_string))
                })
                .unwrap_or_else(|| "unknown".to_string());
            *event_counts.entry(kind).or_insert(0) += 1;
        }

        if engine.state.status != GameStatus::Active {
            break;
        }
    }

    let state = &engine.state;
    Ok(GameResult {
        seed,
        status: state.status,
        floor: state.floor,
        score: state.score,
        level: state.player.level,
        turns,
        event_counts,
    })
}
