use std::collections::{HashMap, HashSet};

use super::{EngineError, GameEngine};
use crate::constants::{MAP_HEIGHT, MAP_WIDTH, MAX_FLOOR};
use crate::types::{
    CellPos, Delta, Direction, EnemyView, EventData, Facing, GameEvent, GameStatus, Player,
    VisibleGameState,
};
use crate::visibility;

/// What one processed intent produces: the raw events and the wire-ordered
/// delta list derived from the pre/post diff.
pub struct TurnOutput {
    pub events: Vec<GameEvent>,
    pub deltas: Vec<Delta>,
}

#[derive(Clone, PartialEq, Eq)]
struct StatBlock {
    hp: i32,
    max_hp: i32,
    attack: i32,
    defense: i32,
    xp: i32,
    level: i32,
    xp_to_next_level: i32,
}

impl StatBlock {
    fn of(player: &Player) -> Self {
        Self {
            hp: player.hp,
            max_hp: player.max_hp,
            attack: player.attack,
            defense: player.defense,
            xp: player.xp,
            level: player.level,
            xp_to_next_level: player.xp_to_next_level,
        }
    }
}

struct TurnSnapshot {
    x: i32,
    y: i32,
    facing: Facing,
    stats: StatBlock,
    equipment_ids: Vec<Option<String>>,
    score: i32,
    floor: i32,
    status: GameStatus,
    visible_enemies: HashSet<String>,
    enemy_cells: HashMap<String, (i32, i32, i32)>,
    visible_items: HashSet<String>,
}

fn changed(now: i32, before: i32) -> Option<i32> {
    (now != before).then_some(now)
}

impl GameEngine {
    pub fn move_with_deltas(&mut self, direction: Direction) -> Result<TurnOutput, EngineError> {
        self.run_turn(|engine| engine.apply_move(direction))
    }

    pub fn attack_with_deltas(&mut self) -> Result<TurnOutput, EngineError> {
        self.run_turn(|engine| {
            engine.apply_attack();
            Ok(())
        })
    }

    pub fn descend_with_deltas(&mut self) -> Result<TurnOutput, EngineError> {
        self.run_turn(|engine| engine.apply_descend())
    }

    fn run_turn(
        &mut self,
        action: impl FnOnce(&mut Self) -> Result<(), EngineError>,
    ) -> Result<TurnOutput, EngineError> {
        self.begin_turn();
        let snapshot = self.snapshot();
        action(self)?;
        self.audit_invariants(&snapshot)?;
        Ok(self.diff(snapshot))
    }

    fn snapshot(&self) -> TurnSnapshot {
        let state = &self.state;
        let player = &state.player;
        TurnSnapshot {
            x: player.x,
            y: player.y,
            facing: player.facing,
            stats: StatBlock::of(player),
            equipment_ids: player
                .equipment
                .slot_ids()
                .iter()
                .map(|id| id.map(str::to_string))
                .collect(),
            score: state.score,
            floor: state.floor,
            status: state.status,
            visible_enemies: visibility::visible_enemies(&state.fog, &state.enemies)
                .into_iter()
                .map(|enemy| enemy.id.clone())
                .collect(),
            enemy_cells: state
                .enemies
                .iter()
                .map(|enemy| (enemy.id.clone(), (enemy.x, enemy.y, enemy.hp)))
                .collect(),
            visible_items: visibility::visible_items(&state.fog, &state.items)
                .into_iter()
                .map(|item| item.id.clone())
                .collect(),
        }
    }

    /// Post-turn consistency audit. A failure here means the turn corrupted
    /// state; the caller must drop the turn and keep the previous checkpoint.
    fn audit_invariants(&self, snapshot: &TurnSnapshot) -> Result<(), EngineError> {
        let state = &self.state;
        let player = &state.player;

        if state.map.is_wall(player.x, player.y) {
            return Err(EngineError::InvariantViolation(
                "player is standing inside a wall".to_string(),
            ));
        }

        let mut cells = HashSet::new();
        for enemy in state.enemies.iter().filter(|enemy| enemy.is_alive()) {
            if !cells.insert((enemy.x, enemy.y)) {
                return Err(EngineError::InvariantViolation(format!(
                    "two live enemies share cell ({}, {})",
                    enemy.x, enemy.y
                )));
            }
            if (enemy.x, enemy.y) == (player.x, player.y) {
                return Err(EngineError::InvariantViolation(
                    "enemy occupies the player's cell".to_string(),
                ));
            }
            if enemy.hp > enemy.max_hp {
                return Err(EngineError::InvariantViolation(format!(
                    "enemy {} hp above max",
                    enemy.id
                )));
            }
        }

        if player.hp < 0 || player.hp > player.max_hp {
            return Err(EngineError::InvariantViolation(
                "player hp out of bounds".to_string(),
            ));
        }
        if (state.status == GameStatus::Dead) != (player.hp <= 0) {
            return Err(EngineError::InvariantViolation(
                "death status does not match hp".to_string(),
            ));
        }
        match state.status {
            GameStatus::Won => {
                if state.floor < MAX_FLOOR {
                    return Err(EngineError::InvariantViolation(
                        "won before the final floor".to_string(),
                    ));
                }
            }
            GameStatus::Active | GameStatus::Dead => {
                if state.floor >= MAX_FLOOR {
                    return Err(EngineError::InvariantViolation(
                        "reached the final floor without winning".to_string(),
                    ));
                }
            }
        }
        if player.xp >= player.xp_to_next_level {
            return Err(EngineError::InvariantViolation(
                "xp overflow at turn boundary".to_string(),
            ));
        }

        if snapshot.status == GameStatus::Active && state.status == GameStatus::Dead {
            let obituaries = self
                .events
                .iter()
                .filter(|event| matches!(event.data, EventData::PlayerDied { .. }))
                .count();
            if obituaries != 1 {
                return Err(EngineError::InvariantViolation(format!(
                    "death turn produced {obituaries} player_died events"
                )));
            }
        }
        Ok(())
    }

    /// Diffs post-turn state against the snapshot into the wire-ordered
    /// delta list. On a descend the per-entity and fog diffs are meaningless
    /// (the whole map was replaced) and a single `new_floor` bulk delta
    /// closes the list instead.
    fn diff(&mut self, snapshot: TurnSnapshot) -> TurnOutput {
        let events = std::mem::take(&mut self.events);
        let revealed = std::mem::take(&mut self.revealed_this_turn);
        let mut deltas = Vec::new();
        let descended = self.state.floor != snapshot.floor;

        let player = &self.state.player;
        if (player.x, player.y) != (snapshot.x, snapshot.y) || player.facing != snapshot.facing {
            deltas.push(Delta::PlayerPos {
                x: player.x,
                y: player.y,
                facing: player.facing,
            });
        }

        let stats = StatBlock::of(player);
        if stats != snapshot.stats {
            deltas.push(Delta::PlayerStats {
                hp: changed(stats.hp, snapshot.stats.hp),
                max_hp: changed(stats.max_hp, snapshot.stats.max_hp),
                attack: changed(stats.attack, snapshot.stats.attack),
                defense: changed(stats.defense, snapshot.stats.defense),
                xp: changed(stats.xp, snapshot.stats.xp),
                level: changed(stats.level, snapshot.stats.level),
                xp_to_next_level: changed(stats.xp_to_next_level, snapshot.stats.xp_to_next_level),
            });
        }

        let slot_ids: Vec<Option<String>> = player
            .equipment
            .slot_ids()
            .iter()
            .map(|id| id.map(str::to_string))
            .collect();
        if slot_ids != snapshot.equipment_ids {
            deltas.push(Delta::PlayerEquipment {
                equipment: player.equipment.clone(),
            });
        }

        if self.state.score != snapshot.score {
            deltas.push(Delta::Score {
                score: self.state.score,
            });
        }
        if descended {
            deltas.push(Delta::Floor {
                floor: self.state.floor,
            });
        }

        if !descended {
            if !revealed.is_empty() {
                deltas.push(Delta::FogReveal {
                    cells: revealed.iter().map(|&(x, y)| CellPos { x, y }).collect(),
                });
                deltas.push(Delta::TilesReveal {
                    tiles: revealed
                        .iter()
                        .filter_map(|&(x, y)| self.state.map.tile(x, y))
                        .collect(),
                });
            }

            for enemy in &self.state.enemies {
                let was_visible = snapshot.visible_enemies.contains(&enemy.id);
                let now_visible =
                    enemy.is_alive() && visibility::is_revealed(&self.state.fog, enemy.x, enemy.y);
                if now_visible && !was_visible {
                    deltas.push(Delta::EnemyVisible {
                        enemy: EnemyView::from(enemy),
                    });
                } else if was_visible {
                    if !enemy.is_alive() {
                        deltas.push(Delta::EnemyKilled {
                            id: enemy.id.clone(),
                        });
                    } else if !now_visible {
                        deltas.push(Delta::EnemyHidden {
                            id: enemy.id.clone(),
                        });
                    } else if let Some(&(x, y, hp)) = snapshot.enemy_cells.get(&enemy.id) {
                        if (x, y) != (enemy.x, enemy.y) {
                            deltas.push(Delta::EnemyMoved {
                                id: enemy.id.clone(),
                                x: enemy.x,
                                y: enemy.y,
                            });
                        }
                        if hp != enemy.hp {
                            deltas.push(Delta::EnemyDamaged {
                                id: enemy.id.clone(),
                                hp: enemy.hp,
                            });
                        }
                    }
                }
            }

            for item in &self.state.items {
                if visibility::is_revealed(&self.state.fog, item.x, item.y)
                    && !snapshot.visible_items.contains(&item.id)
                {
                    deltas.push(Delta::ItemVisible { item: item.clone() });
                }
            }
            let mut removed = HashSet::new();
            for event in &events {
                if let Some(id) = event.data.removed_item_id() {
                    if removed.insert(id.to_string()) {
                        deltas.push(Delta::ItemRemoved { id: id.to_string() });
                    }
                }
            }
        }

        if self.state.status != GameStatus::Active {
            deltas.push(Delta::GameStatus {
                status: self.state.status,
            });
        }
        for event in &events {
            deltas.push(Delta::Event {
                event: event.clone(),
            });
        }
        if descended {
            deltas.push(Delta::NewFloor {
                state: self.visible_state(),
            });
        }

        TurnOutput { events, deltas }
    }

    /// Everything the client is allowed to know right now.
    pub fn visible_state(&self) -> VisibleGameState {
        let state = &self.state;
        VisibleGameState {
            id: state.id.clone(),
            player_name: state.player_name.clone(),
            floor: state.floor,
            status: state.status,
            score: state.score,
            width: MAP_WIDTH,
            height: MAP_HEIGHT,
            player: state.player.clone(),
            tiles: visibility::visible_tiles(&state.fog, &state.map),
            enemies: visibility::visible_enemies(&state.fog, &state.enemies)
                .into_iter()
                .map(EnemyView::from)
                .collect(),
            items: visibility::visible_items(&state.fog, &state.items)
                .into_iter()
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::super::test_support::{arena_engine, place_enemy};
    use super::*;
    use crate::types::{CharacterKind, EnemyBehavior, EnemyKind, Item, ItemKind, Tile, TileKind};

    fn delta_kind(delta: &Delta) -> &'static str {
        match delta {
            Delta::PlayerPos { .. } => "player_pos",
            Delta::PlayerStats { .. } => "player_stats",
            Delta::PlayerEquipment { .. } => "player_equipment",
            Delta::Score { .. } => "score",
            Delta::Floor { .. } => "floor",
            Delta::EnemyVisible { .. } => "enemy_visible",
            Delta::EnemyMoved { .. } => "enemy_moved",
            Delta::EnemyDamaged { .. } => "enemy_damaged",
            Delta::EnemyKilled { .. } => "enemy_killed",
            Delta::EnemyHidden { .. } => "enemy_hidden",
            Delta::ItemVisible { .. } => "item_visible",
            Delta::ItemRemoved { .. } => "item_removed",
            Delta::FogReveal { .. } => "fog_reveal",
            Delta::TilesReveal { .. } => "tiles_reveal",
            Delta::GameStatus { .. } => "game_status",
            Delta::Event { .. } => "event",
            Delta::NewFloor { .. } => "new_floor",
        }
    }

    #[test]
    fn plain_move_emits_pos_then_fog_then_event() {
        let mut engine = arena_engine(CharacterKind::Dwarf);
        let output = engine.move_with_deltas(Direction::Right).expect("turn");
        let kinds: Vec<_> = output.deltas.iter().map(delta_kind).collect();
        assert_eq!(kinds, vec!["player_pos", "fog_reveal", "tiles_reveal", "event"]);

        // fog_reveal and tiles_reveal carry the same cells, in order.
        let (cells, tiles) = output
            .deltas
            .iter()
            .fold((None, None), |(c, t), delta| match delta {
                Delta::FogReveal { cells } => (Some(cells.clone()), t),
                Delta::TilesReveal { tiles } => (c, Some(tiles.clone())),
                _ => (c, t),
            });
        let cells = cells.expect("fog cells");
        let tiles = tiles.expect("tiles");
        assert_eq!(cells.len(), tiles.len());
        for (cell, tile) in cells.iter().zip(tiles.iter()) {
            assert_eq!((cell.x, cell.y), (tile.x, tile.y));
        }
    }

    #[test]
    fn blocked_move_produces_no_deltas() {
        let mut engine = arena_engine(CharacterKind::Dwarf);
        engine.state.player.x = 1;
        // Fully reveal around the new position first so fog is quiet.
        crate::visibility::update_fog(&mut engine.state.fog, 1, 5);
        let output = engine.move_with_deltas(Direction::Left).expect("turn");
        assert!(output.deltas.is_empty());
        assert!(output.events.is_empty());
    }

    #[test]
    fn melee_kill_emits_score_and_enemy_killed() {
        let mut engine = arena_engine(CharacterKind::Dwarf);
        place_enemy(&mut engine, EnemyKind::Rat, 6, 5);
        let output = engine.move_with_deltas(Direction::Right).expect("turn");
        let kinds: Vec<_> = output.deltas.iter().map(delta_kind).collect();
        assert!(kinds.contains(&"score"));
        assert!(kinds.contains(&"enemy_killed"));
        assert!(kinds.contains(&"player_stats"));
        assert!(!kinds.contains(&"player_pos"), "melee does not move");
        // Stats delta carries only the xp change.
        let stats = output
            .deltas
            .iter()
            .find_map(|delta| match delta {
                Delta::PlayerStats { xp, hp, level, .. } => Some((*xp, *hp, *level)),
                _ => None,
            })
            .expect("stats delta");
        assert_eq!(stats, (Some(8), None, None));
    }

    #[test]
    fn enemy_entering_fog_becomes_visible() {
        let mut engine = arena_engine(CharacterKind::Dwarf);
        // Far enemy, outside vision, stationary so it stays put.
        place_enemy(&mut engine, EnemyKind::Orc, 13, 5);
        engine.state.enemies[0].behavior = EnemyBehavior::Stationary;
        assert!(!crate::visibility::is_revealed(&engine.state.fog, 13, 5));

        // March right until the orc's cell is revealed.
        let mut saw_visible = false;
        for _ in 0..4 {
            let output = engine.move_with_deltas(Direction::Right).expect("turn");
            if output
                .deltas
                .iter()
                .any(|delta| matches!(delta, Delta::EnemyVisible { .. }))
            {
                saw_visible = true;
                break;
            }
        }
        assert!(saw_visible, "orc never became visible");
    }

    #[test]
    fn enemy_stepping_into_darkness_is_hidden() {
        let mut engine = arena_engine(CharacterKind::Dwarf);
        // Wounded flee rat at the edge of the revealed circle; it backs away
        // into unrevealed ground during the enemy phase.
        place_enemy(&mut engine, EnemyKind::Rat, 10, 5);
        engine.state.enemies[0].behavior = EnemyBehavior::Flee;
        engine.state.enemies[0].hp = 1;
        assert!(crate::visibility::is_revealed(&engine.state.fog, 10, 5));

        let output = engine.move_with_deltas(Direction::Left).expect("turn");
        assert_eq!(
            (engine.state.enemies[0].x, engine.state.enemies[0].y),
            (11, 5)
        );
        assert!(output
            .deltas
            .iter()
            .any(|delta| matches!(delta, Delta::EnemyHidden { .. })));
    }

    #[test]
    fn pickup_emits_item_removed_once() {
        let mut engine = arena_engine(CharacterKind::Dwarf);
        engine.state.player.hp = 10;
        engine.state.items.push(Item {
            id: "item_1_0".to_string(),
            kind: ItemKind::HealthPotion,
            x: 6,
            y: 5,
            value: 10,
            equipment: None,
        });
        let output = engine.move_with_deltas(Direction::Right).expect("turn");
        let removed: Vec<_> = output
            .deltas
            .iter()
            .filter(|delta| matches!(delta, Delta::ItemRemoved { .. }))
            .collect();
        // Both item_picked_up and player_healed reference the item; the
        // delta appears exactly once.
        assert_eq!(removed.len(), 1);
    }

    #[test]
    fn descend_suppresses_entity_diffs_and_ends_with_new_floor() {
        let mut engine = arena_engine(CharacterKind::Dwarf);
        engine.state.map.set(6, 5, TileKind::Stairs);
        let output = engine.move_with_deltas(Direction::Right).expect("turn");
        let kinds: Vec<_> = output.deltas.iter().map(delta_kind).collect();
        assert!(kinds.contains(&"floor"));
        assert!(kinds.contains(&"score"));
        assert!(!kinds.contains(&"fog_reveal"));
        assert!(!kinds.contains(&"enemy_visible"));
        assert_eq!(*kinds.last().expect("deltas"), "new_floor");

        let state = output
            .deltas
            .iter()
            .find_map(|delta| match delta {
                Delta::NewFloor { state } => Some(state),
                _ => None,
            })
            .expect("new floor state");
        assert_eq!(state.floor, 2);
        assert!(state.enemies.iter().all(|enemy| enemy.id.starts_with("enemy_2_")));
    }

    #[test]
    fn death_turn_emits_game_status() {
        let mut engine = arena_engine(CharacterKind::Dwarf);
        engine.state.player.hp = 1;
        place_enemy(&mut engine, EnemyKind::Orc, 6, 5);
        engine.state.enemies[0].behavior = EnemyBehavior::Stationary;
        engine.state.player.facing = crate::types::Facing::Left;

        let output = engine.attack_with_deltas().expect("turn");
        assert!(output
            .deltas
            .iter()
            .any(|delta| matches!(delta, Delta::GameStatus { status: GameStatus::Dead })));
        assert_eq!(engine.state.status, GameStatus::Dead);
    }

    // A minimal client mirror: replaying the delta stream must reconstruct
    // exactly what the server would serve as the visible state.
    #[derive(Clone)]
    struct Mirror {
        player: Player,
        score: i32,
        floor: i32,
        status: GameStatus,
        tiles: HashMap<(i32, i32), Tile>,
        enemies: HashMap<String, (i32, i32, i32)>,
        items: HashSet<String>,
    }

    impl Mirror {
        fn of(state: &VisibleGameState) -> Self {
            Self {
                player: state.player.clone(),
                score: state.score,
                floor: state.floor,
                status: state.status,
                tiles: state.tiles.iter().map(|t| ((t.x, t.y), *t)).collect(),
                enemies: state
                    .enemies
                    .iter()
                    .map(|e| (e.id.clone(), (e.x, e.y, e.hp)))
                    .collect(),
                items: state.items.iter().map(|i| i.id.clone()).collect(),
            }
        }

        fn apply(&mut self, delta: &Delta) {
            match delta {
                Delta::PlayerPos { x, y, facing } => {
                    self.player.x = *x;
                    self.player.y = *y;
                    self.player.facing = *facing;
                }
                Delta::PlayerStats {
                    hp,
                    max_hp,
                    attack,
                    defense,
                    xp,
                    level,
                    xp_to_next_level,
                } => {
                    if let Some(v) = hp {
                        self.player.hp = *v;
                    }
                    if let Some(v) = max_hp {
                        self.player.max_hp = *v;
                    }
                    if let Some(v) = attack {
                        self.player.attack = *v;
                    }
                    if let Some(v) = defense {
                        self.player.defense = *v;
                    }
                    if let Some(v) = xp {
                        self.player.xp = *v;
                    }
                    if let Some(v) = level {
                        self.player.level = *v;
                    }
                    if let Some(v) = xp_to_next_level {
                        self.player.xp_to_next_level = *v;
                    }
                }
                Delta::PlayerEquipment { equipment } => {
                    self.player.equipment = equipment.clone();
                }
                Delta::Score { score } => self.score = *score,
                Delta::Floor { floor } => self.floor = *floor,
                Delta::EnemyVisible { enemy } => {
                    self.enemies
                        .insert(enemy.id.clone(), (enemy.x, enemy.y, enemy.hp));
                }
                Delta::EnemyMoved { id, x, y } => {
                    if let Some(cell) = self.enemies.get_mut(id) {
                        cell.0 = *x;
                        cell.1 = *y;
                    }
                }
                Delta::EnemyDamaged { id, hp } => {
                    if let Some(cell) = self.enemies.get_mut(id) {
                        cell.2 = *hp;
                    }
                }
                Delta::EnemyKilled { id } | Delta::EnemyHidden { id } => {
                    self.enemies.remove(id);
                }
                Delta::ItemVisible { item } => {
                    self.items.insert(item.id.clone());
                }
                Delta::ItemRemoved { id } => {
                    self.items.remove(id);
                }
                Delta::FogReveal { .. } => {}
                Delta::TilesReveal { tiles } => {
                    for tile in tiles {
                        self.tiles.insert((tile.x, tile.y), *tile);
                    }
                }
                Delta::GameStatus { status } => self.status = *status,
                Delta::Event { .. } => {}
                Delta::NewFloor { state } => *self = Mirror::of(state),
            }
        }

        fn assert_matches(&self, state: &VisibleGameState) {
            assert_eq!(
                serde_json::to_value(&self.player).expect("player json"),
                serde_json::to_value(&state.player).expect("player json")
            );
            assert_eq!(self.score, state.score);
            assert_eq!(self.floor, state.floor);
            assert_eq!(self.status, state.status);
            let server_tiles: HashMap<(i32, i32), Tile> =
                state.tiles.iter().map(|t| ((t.x, t.y), *t)).collect();
            assert_eq!(self.tiles.len(), server_tiles.len());
            for (cell, tile) in &self.tiles {
                assert_eq!(server_tiles.get(cell).map(|t| t.kind), Some(tile.kind));
            }
            let server_enemies: HashMap<String, (i32, i32, i32)> = state
                .enemies
                .iter()
                .map(|e| (e.id.clone(), (e.x, e.y, e.hp)))
                .collect();
            assert_eq!(self.enemies, server_enemies);
            let server_items: HashSet<String> =
                state.items.iter().map(|i| i.id.clone()).collect();
            assert_eq!(self.items, server_items);
        }
    }

    #[test]
    fn delta_stream_reconstructs_visible_state() {
        let mut engine =
            GameEngine::new_game("game_m".into(), "Mirror".into(), CharacterKind::Elf, 97)
                .expect("new game");
        let mut mirror = Mirror::of(&engine.visible_state());

        let walk = [
            Direction::Right,
            Direction::Right,
            Direction::Down,
            Direction::Down,
            Direction::Left,
            Direction::Up,
            Direction::Right,
            Direction::Right,
            Direction::Down,
            Direction::Right,
            Direction::Up,
            Direction::Up,
        ];
        for (turn, direction) in walk.iter().enumerate() {
            let output = engine.move_with_deltas(*direction).expect("turn");
            for delta in &output.deltas {
                mirror.apply(delta);
            }
            mirror.assert_matches(&engine.visible_state());

            if turn % 3 == 2 && engine.state.status == GameStatus::Active {
                let output = engine.attack_with_deltas().expect("turn");
                for delta in &output.deltas {
                    mirror.apply(delta);
                }
                mirror.assert_matches(&engine.visible_state());
            }
            if engine.state.status != GameStatus::Active {
                break;
            }
        }
    }
}
