use thiserror::Error;

use crate::constants::{FLOOR_SCORE_BONUS, MAX_FLOOR, VICTORY_SCORE_BONUS};
use crate::rng::Rng;
use crate::types::{
    Direction, EventData, GameEvent, GameState, GameStatus, Player, TileKind,
};
use crate::visibility;
use crate::world::{self, MapGenError};

mod combat_system;
mod delta_system;
mod enemy_system;
mod utils;

pub use delta_system::TurnOutput;

use self::utils::{facing_of, now_ms, offset};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("map generation failed: {0}")]
    MapGeneration(#[from] MapGenError),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Owns one game's authoritative state and applies intents to it one turn at
/// a time. All randomness flows through the seeded [`Rng`], so a seed plus an
/// intent sequence reproduces a run exactly.
pub struct GameEngine {
    pub state: GameState,
    rng: Rng,
    started_at_ms: u64,
    events: Vec<GameEvent>,
    revealed_this_turn: Vec<(i32, i32)>,
    next_event_seq: u64,
}

impl GameEngine {
    pub fn new_game(
        id: String,
        player_name: String,
        character: crate::types::CharacterKind,
        seed: u32,
    ) -> Result<Self, EngineError> {
        let mut rng = Rng::new(seed);
        let generated = world::generate_floor(1, character, &mut rng)?;
        let (start_x, start_y) = generated.player_start;
        let state = GameState {
            id,
            player_name,
            floor: 1,
            status: GameStatus::Active,
            score: 0,
            player: Player::new(character, start_x, start_y),
            map: generated.map,
            fog: GameState::blank_fog(),
            enemies: generated.enemies,
            items: generated.items,
        };
        let mut engine = Self::from_state(state, seed);
        // Initial reveal around the spawn point; not part of any turn.
        visibility::update_fog(
            &mut engine.state.fog,
            engine.state.player.x,
            engine.state.player.y,
        );
        Ok(engine)
    }

    /// Rehydrates a checkpointed game. The seed only has to be fresh, not the
    /// original one; determinism matters within a run, not across resumes.
    pub fn from_state(state: GameState, seed: u32) -> Self {
        Self {
            state,
            rng: Rng::new(seed),
            started_at_ms: now_ms(),
            events: Vec::new(),
            revealed_this_turn: Vec::new(),
            next_event_seq: 1,
        }
    }

    fn begin_turn(&mut self) {
        self.events.clear();
        self.revealed_this_turn.clear();
    }

    pub(crate) fn push_event(&mut self, message: String, data: EventData) {
        let id = format!("evt_{}_{}", self.started_at_ms, self.next_event_seq);
        self.next_event_seq += 1;
        self.events.push(GameEvent { id, message, data });
    }

    fn run_fog_update(&mut self) {
        let (px, py) = (self.state.player.x, self.state.player.y);
        let revealed = visibility::update_fog(&mut self.state.fog, px, py);
        self.revealed_this_turn.extend(revealed);
    }

    /// One movement intent. A blocked step mutates nothing and skips the
    /// enemy phase entirely; stepping onto stairs descends and short-circuits
    /// the rest of the turn.
    pub fn apply_move(&mut self, direction: Direction) -> Result<(), EngineError> {
        if self.state.status != GameStatus::Active {
            return Ok(());
        }
        let (px, py) = (self.state.player.x, self.state.player.y);
        let (nx, ny) = offset(px, py, direction);
        if self.state.map.is_wall(nx, ny) {
            return Ok(());
        }

        if let Some(enemy_idx) = self.state.live_enemy_at(nx, ny) {
            if let Some(facing) = facing_of(direction) {
                self.state.player.facing = facing;
            }
            self.melee_attack(enemy_idx);
            self.run_fog_update();
            self.run_enemy_phase();
            return Ok(());
        }

        self.state.player.x = nx;
        self.state.player.y = ny;
        if let Some(facing) = facing_of(direction) {
            self.state.player.facing = facing;
        }
        self.push_event(
            "You move.".to_string(),
            EventData::PlayerMoved { x: nx, y: ny },
        );
        self.resolve_pickup(nx, ny);

        if self.state.map.kind_at(nx, ny) == Some(TileKind::Stairs) {
            return self.apply_descend();
        }

        self.run_fog_update();
        self.run_enemy_phase();
        Ok(())
    }

    /// One ranged-attack intent.
    pub fn apply_attack(&mut self) {
        if self.state.status != GameStatus::Active {
            return;
        }
        self.ranged_attack();
        self.run_enemy_phase();
    }

    /// Descend to the next floor. Valid only while standing on stairs; the
    /// old floor is discarded wholesale and the enemy phase does not run.
    pub fn apply_descend(&mut self) -> Result<(), EngineError> {
        if self.state.status != GameStatus::Active {
            return Ok(());
        }
        let (px, py) = (self.state.player.x, self.state.player.y);
        if self.state.map.kind_at(px, py) != Some(TileKind::Stairs) {
            return Ok(());
        }

        let next_floor = self.state.floor + 1;
        let generated =
            world::generate_floor(next_floor, self.state.player.character, &mut self.rng)?;

        self.state.floor = next_floor;
        self.state.map = generated.map;
        self.state.enemies = generated.enemies;
        self.state.items = generated.items;
        self.state.fog = GameState::blank_fog();
        self.state.player.x = generated.player_start.0;
        self.state.player.y = generated.player_start.1;
        self.run_fog_update();
        self.state.score += FLOOR_SCORE_BONUS;
        self.push_event(
            format!("You descend to floor {next_floor}."),
            EventData::FloorDescended { floor: next_floor },
        );

        if next_floor >= MAX_FLOOR {
            self.state.status = GameStatus::Won;
            self.state.score += VICTORY_SCORE_BONUS;
            let score = self.state.score;
            self.push_event(
                "You escape the depths alive!".to_string(),
                EventData::GameWon { score },
            );
        }
        Ok(())
    }
}
