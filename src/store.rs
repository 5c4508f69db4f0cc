use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::constants::GAME_TTL_MS;
use crate::types::{GameState, LeaderboardRecord, LeaderboardResponse};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredGame {
    state: GameState,
    #[serde(rename = "updatedAtMs", alias = "updated_at_ms")]
    updated_at_ms: u64,
}

#[derive(Serialize)]
struct GameStoreFile<'a> {
    version: u8,
    games: &'a HashMap<String, StoredGame>,
}

#[derive(Deserialize)]
struct GameStoreFileRaw {
    version: u8,
    games: HashMap<String, serde_json::Value>,
}

/// Checkpoint store: one document per game, keyed by id, kept in a single
/// JSON file under the data dir. Entries expire seven days after their last
/// checkpoint, standing in for a TTL index.
pub struct GameStore {
    file_path: PathBuf,
    games: HashMap<String, StoredGame>,
}

impl GameStore {
    pub fn new(data_dir: &Path) -> Self {
        let file_path = data_dir.join("games.json");
        let mut store = Self {
            games: load_games(&file_path),
            file_path,
        };
        store.prune(now_ms());
        store
    }

    pub fn save(&mut self, state: &GameState) -> Result<(), StoreError> {
        let now = now_ms();
        self.games.insert(
            state.id.clone(),
            StoredGame {
                state: state.clone(),
                updated_at_ms: now,
            },
        );
        self.prune(now);
        self.write()
    }

    pub fn load(&self, id: &str) -> Option<GameState> {
        let stored = self.games.get(id)?;
        if now_ms().saturating_sub(stored.updated_at_ms) > GAME_TTL_MS {
            return None;
        }
        Some(stored.state.clone())
    }

    fn prune(&mut self, now: u64) {
        self.games
            .retain(|_, stored| now.saturating_sub(stored.updated_at_ms) <= GAME_TTL_MS);
    }

    fn write(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = GameStoreFile {
            version: 1,
            games: &self.games,
        };
        fs::write(&self.file_path, serde_json::to_string(&payload)?)?;
        Ok(())
    }
}

fn load_games(path: &Path) -> HashMap<String, StoredGame> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read game store");
            }
            return HashMap::new();
        }
    };
    let parsed: GameStoreFileRaw = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse game store");
            return HashMap::new();
        }
    };
    if parsed.version != 1 {
        warn!(
            path = %path.display(),
            version = parsed.version,
            "unsupported game store version"
        );
        return HashMap::new();
    }

    let mut games = HashMap::new();
    for (id, raw) in parsed.games {
        match serde_json::from_value::<StoredGame>(raw) {
            Ok(stored) => {
                games.insert(id, stored);
            }
            Err(error) => {
                warn!(game_id = %id, %error, "skipping unreadable game document");
            }
        }
    }
    games
}

#[derive(Serialize)]
struct LeaderboardFile<'a> {
    version: u8,
    entries: &'a Vec<LeaderboardRecord>,
}

#[derive(Deserialize)]
struct LeaderboardFileRaw {
    version: u8,
    entries: Vec<serde_json::Value>,
}

/// Terminal-game records, one per finished run, served sorted by score.
pub struct LeaderboardStore {
    file_path: PathBuf,
    entries: Vec<LeaderboardRecord>,
}

impl LeaderboardStore {
    pub fn new(data_dir: &Path) -> Self {
        let file_path = data_dir.join("leaderboard.json");
        Self {
            entries: load_leaderboard(&file_path),
            file_path,
        }
    }

    pub fn insert(&mut self, record: LeaderboardRecord) -> Result<(), StoreError> {
        self.entries.push(record);
        self.write()
    }

    pub fn build_response(&self, requested_limit: Option<usize>) -> LeaderboardResponse {
        let limit = requested_limit.unwrap_or(10).clamp(1, 100);
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.floor.cmp(&a.floor))
                .then_with(|| a.player_name.to_lowercase().cmp(&b.player_name.to_lowercase()))
        });
        entries.truncate(limit);
        LeaderboardResponse {
            generated_at: now_iso(),
            entries,
        }
    }

    fn write(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = LeaderboardFile {
            version: 1,
            entries: &self.entries,
        };
        fs::write(&self.file_path, serde_json::to_string(&payload)?)?;
        Ok(())
    }
}

fn load_leaderboard(path: &Path) -> Vec<LeaderboardRecord> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read leaderboard");
            }
            return Vec::new();
        }
    };
    let parsed: LeaderboardFileRaw = match serde_json::from_str::<LeaderboardFileRaw>(&text) {
        Ok(value) if value.version == 1 => value,
        Ok(value) => {
            warn!(path = %path.display(), version = value.version, "unsupported leaderboard version");
            return Vec::new();
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse leaderboard");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for raw in parsed.entries {
        match serde_json::from_value::<LeaderboardRecord>(raw) {
            Ok(entry) => entries.push(entry),
            Err(error) => {
                warn!(%error, "skipping unreadable leaderboard entry");
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CharacterKind, DungeonMap, GameStatus, Player};

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            now_ms().saturating_add(rand::random::<u32>() as u64)
        ))
    }

    fn make_state(id: &str, score: i32) -> GameState {
        GameState {
            id: id.to_string(),
            player_name: "Alice".to_string(),
            floor: 2,
            status: GameStatus::Active,
            score,
            player: Player::new(CharacterKind::Dwarf, 3, 3),
            map: DungeonMap::filled_with_walls(),
            fog: GameState::blank_fog(),
            enemies: Vec::new(),
            items: Vec::new(),
        }
    }

    fn make_record(name: &str, score: i32, floor: i32) -> LeaderboardRecord {
        LeaderboardRecord {
            id: format!("game_{name}_{score}"),
            player_name: name.to_string(),
            score,
            floor,
            killed_by: None,
            killed_by_type: None,
            killed_by_variant: None,
            created_at: now_iso(),
        }
    }

    #[test]
    fn game_store_round_trips_state() {
        let dir = temp_dir("game-store-roundtrip");
        let mut store = GameStore::new(&dir);
        store.save(&make_state("game_1", 250)).expect("save");

        // Fresh instance reads back from disk.
        let reopened = GameStore::new(&dir);
        let loaded = reopened.load("game_1").expect("state exists");
        assert_eq!(loaded.score, 250);
        assert_eq!(loaded.floor, 2);
        assert!(reopened.load("game_2").is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn game_store_overwrites_by_id() {
        let dir = temp_dir("game-store-upsert");
        let mut store = GameStore::new(&dir);
        store.save(&make_state("game_1", 100)).expect("save");
        store.save(&make_state("game_1", 400)).expect("save");
        assert_eq!(store.load("game_1").expect("state").score, 400);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn game_store_ignores_corrupt_documents() {
        let dir = temp_dir("game-store-corrupt");
        fs::create_dir_all(&dir).expect("create dir");
        let raw = r#"{
  "version": 1,
  "games": {
    "broken": {"state": 42, "updatedAtMs": 1},
    "unparsed": "nope"
  }
}"#;
        fs::write(dir.join("games.json"), raw).expect("write file");

        let store = GameStore::new(&dir);
        assert!(store.load("broken").is_none());
        assert!(store.load("unparsed").is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn leaderboard_sorts_by_score_descending() {
        let dir = temp_dir("leaderboard-sort");
        let mut store = LeaderboardStore::new(&dir);
        store.insert(make_record("Alice", 300, 4)).expect("insert");
        store.insert(make_record("Bob", 900, 9)).expect("insert");
        store.insert(make_record("Cleo", 500, 6)).expect("insert");

        let response = store.build_response(None);
        let names: Vec<_> = response
            .entries
            .iter()
            .map(|entry| entry.player_name.as_str())
            .collect();
        assert_eq!(names, vec!["Bob", "Cleo", "Alice"]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn leaderboard_limit_is_clamped() {
        let dir = temp_dir("leaderboard-limit");
        let mut store = LeaderboardStore::new(&dir);
        for index in 0..5 {
            store
                .insert(make_record(&format!("P{index}"), index * 10, 1))
                .expect("insert");
        }
        assert_eq!(store.build_response(Some(2)).entries.len(), 2);
        assert_eq!(store.build_response(Some(0)).entries.len(), 1);
        assert_eq!(store.build_response(Some(999)).entries.len(), 5);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn leaderboard_survives_reopen() {
        let dir = temp_dir("leaderboard-reopen");
        {
            let mut store = LeaderboardStore::new(&dir);
            store.insert(make_record("Alice", 777, 12)).expect("insert");
        }
        let reopened = LeaderboardStore::new(&dir);
        let response = reopened.build_response(None);
        assert_eq!(response.entries.len(), 1);
        assert_eq!(response.entries[0].score, 777);

        let _ = fs::remove_dir_all(&dir);
    }
}
