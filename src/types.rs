use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{
    xp_to_next_level, MAP_HEIGHT, MAP_WIDTH, PLAYER_BASE_ATTACK, PLAYER_BASE_DEFENSE,
    PLAYER_BASE_HP,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterKind {
    Dwarf,
    Elf,
    Bandit,
    Wizard,
}

impl CharacterKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dwarf" => Some(Self::Dwarf),
            "elf" => Some(Self::Elf),
            "bandit" => Some(Self::Bandit),
            "wizard" => Some(Self::Wizard),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangedAttackType {
    Dagger,
    MagicDagger,
    Bolt,
    Spell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Floor,
    Wall,
    Stairs,
    Door,
}

impl TileKind {
    fn to_char(self) -> char {
        match self {
            Self::Floor => '.',
            Self::Wall => '#',
            Self::Stairs => '>',
            Self::Door => '+',
        }
    }

    fn from_char(value: char) -> Option<Self> {
        match value {
            '.' => Some(Self::Floor),
            '#' => Some(Self::Wall),
            '>' => Some(Self::Stairs),
            '+' => Some(Self::Door),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Tile {
    pub kind: TileKind,
    pub x: i32,
    pub y: i32,
}

/// Dense tile grid, `MAP_HEIGHT` rows of `MAP_WIDTH` cells. Persisted as one
/// string per row (`#`/`.`/`>`/`+`) to keep checkpoints compact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DungeonMap {
    pub tiles: Vec<Vec<TileKind>>,
}

impl DungeonMap {
    pub fn filled_with_walls() -> Self {
        Self {
            tiles: vec![vec![TileKind::Wall; MAP_WIDTH as usize]; MAP_HEIGHT as usize],
        }
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < MAP_WIDTH && y < MAP_HEIGHT
    }

    pub fn kind_at(&self, x: i32, y: i32) -> Option<TileKind> {
        if !self.in_bounds(x, y) {
            return None;
        }
        Some(self.tiles[y as usize][x as usize])
    }

    /// Out-of-bounds cells count as walls.
    pub fn is_wall(&self, x: i32, y: i32) -> bool {
        self.kind_at(x, y).map(|kind| kind == TileKind::Wall).unwrap_or(true)
    }

    pub fn set(&mut self, x: i32, y: i32, kind: TileKind) {
        if self.in_bounds(x, y) {
            self.tiles[y as usize][x as usize] = kind;
        }
    }

    pub fn tile(&self, x: i32, y: i32) -> Option<Tile> {
        self.kind_at(x, y).map(|kind| Tile { kind, x, y })
    }
}

impl Serialize for DungeonMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<String> = self
            .tiles
            .iter()
            .map(|row| row.iter().map(|kind| kind.to_char()).collect())
            .collect();
        rows.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DungeonMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows: Vec<String> = Vec::deserialize(deserializer)?;
        let tiles = rows
            .iter()
            .map(|row| {
                row.chars()
                    .map(|c| {
                        TileKind::from_char(c)
                            .ok_or_else(|| D::Error::custom(format!("unknown tile char '{c}'")))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tiles })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    Rat,
    Skeleton,
    Orc,
    Dragon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyVariant {
    Normal,
    Elite,
    Champion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyBehavior {
    Aggressive,
    Patrol,
    Flee,
    Stationary,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Enemy {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EnemyKind,
    pub variant: EnemyVariant,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub x: i32,
    pub y: i32,
    pub hp: i32,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub behavior: EnemyBehavior,
    #[serde(rename = "lastSeenPlayer", default, skip_serializing_if = "Option::is_none")]
    pub last_seen_player: Option<(i32, i32)>,
}

impl Enemy {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}

/// Fog-filtered projection of an enemy; behaviour and memory stay
/// server-side.
#[derive(Clone, Debug, Serialize)]
pub struct EnemyView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EnemyKind,
    pub variant: EnemyVariant,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub x: i32,
    pub y: i32,
    pub hp: i32,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
}

impl From<&Enemy> for EnemyView {
    fn from(enemy: &Enemy) -> Self {
        Self {
            id: enemy.id.clone(),
            kind: enemy.kind,
            variant: enemy.variant,
            display_name: enemy.display_name.clone(),
            x: enemy.x,
            y: enemy.y,
            hp: enemy.hp,
            max_hp: enemy.max_hp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Weapon,
    Shield,
    Armor,
    Ranged,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    pub name: String,
    pub slot: EquipSlot,
    pub tier: i32,
    #[serde(rename = "attackBonus")]
    pub attack_bonus: i32,
    #[serde(rename = "defenseBonus")]
    pub defense_bonus: i32,
    #[serde(rename = "hpBonus")]
    pub hp_bonus: i32,
    #[serde(rename = "rangedDamageBonus")]
    pub ranged_damage_bonus: i32,
    #[serde(rename = "rangedRangeBonus")]
    pub ranged_range_bonus: i32,
}

impl Equipment {
    /// Weight for the "is this better" comparison.
    pub fn bonus_sum(&self) -> i32 {
        self.attack_bonus
            + self.defense_bonus
            + self.hp_bonus
            + self.ranged_damage_bonus
            + self.ranged_range_bonus
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EquipmentSlots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon: Option<Equipment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shield: Option<Equipment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub armor: Option<Equipment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranged: Option<Equipment>,
}

impl EquipmentSlots {
    pub fn get(&self, slot: EquipSlot) -> Option<&Equipment> {
        match slot {
            EquipSlot::Weapon => self.weapon.as_ref(),
            EquipSlot::Shield => self.shield.as_ref(),
            EquipSlot::Armor => self.armor.as_ref(),
            EquipSlot::Ranged => self.ranged.as_ref(),
        }
    }

    pub fn set(&mut self, slot: EquipSlot, equipment: Equipment) -> Option<Equipment> {
        let target = match slot {
            EquipSlot::Weapon => &mut self.weapon,
            EquipSlot::Shield => &mut self.shield,
            EquipSlot::Armor => &mut self.armor,
            EquipSlot::Ranged => &mut self.ranged,
        };
        target.replace(equipment)
    }

    pub fn slot_ids(&self) -> [Option<&str>; 4] {
        fn id_of(slot: &Option<Equipment>) -> Option<&str> {
            slot.as_ref().map(|equipment| equipment.id.as_str())
        }
        [
            id_of(&self.weapon),
            id_of(&self.shield),
            id_of(&self.armor),
            id_of(&self.ranged),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    HealthPotion,
    Equipment,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub x: i32,
    pub y: i32,
    pub value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<Equipment>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub x: i32,
    pub y: i32,
    pub hp: i32,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    #[serde(default)]
    pub inventory: Vec<Item>,
    pub xp: i32,
    pub level: i32,
    #[serde(rename = "xpToNextLevel")]
    pub xp_to_next_level: i32,
    pub equipment: EquipmentSlots,
    pub character: CharacterKind,
    pub facing: Facing,
}

impl Player {
    pub fn new(character: CharacterKind, x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            hp: PLAYER_BASE_HP,
            max_hp: PLAYER_BASE_HP,
            attack: PLAYER_BASE_ATTACK,
            defense: PLAYER_BASE_DEFENSE,
            inventory: Vec::new(),
            xp: 0,
            level: 1,
            xp_to_next_level: xp_to_next_level(1),
            equipment: EquipmentSlots::default(),
            character,
            facing: Facing::Right,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Active,
    Dead,
    Won,
}

/// Authoritative per-game state. One instance per live game, owned by its
/// session; persisted wholesale at checkpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameState {
    pub id: String,
    #[serde(rename = "playerName")]
    pub player_name: String,
    pub floor: i32,
    pub status: GameStatus,
    pub score: i32,
    pub player: Player,
    pub map: DungeonMap,
    pub fog: Vec<Vec<bool>>,
    pub enemies: Vec<Enemy>,
    pub items: Vec<Item>,
}

impl GameState {
    pub fn blank_fog() -> Vec<Vec<bool>> {
        vec![vec![false; MAP_WIDTH as usize]; MAP_HEIGHT as usize]
    }

    pub fn live_enemy_at(&self, x: i32, y: i32) -> Option<usize> {
        self.enemies
            .iter()
            .position(|enemy| enemy.is_alive() && enemy.x == x && enemy.y == y)
    }

    pub fn item_at(&self, x: i32, y: i32) -> Option<usize> {
        self.items.iter().position(|item| item.x == x && item.y == y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CellPos {
    pub x: i32,
    pub y: i32,
}

/// Full fog-filtered view of a game, sent on `init` and inside `new_floor`.
#[derive(Clone, Debug, Serialize)]
pub struct VisibleGameState {
    pub id: String,
    #[serde(rename = "playerName")]
    pub player_name: String,
    pub floor: i32,
    pub status: GameStatus,
    pub score: i32,
    pub width: i32,
    pub height: i32,
    pub player: Player,
    pub tiles: Vec<Tile>,
    pub enemies: Vec<EnemyView>,
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameEvent {
    pub id: String,
    pub message: String,
    #[serde(flatten)]
    pub data: EventData,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventData {
    PlayerMoved {
        x: i32,
        y: i32,
    },
    PlayerAttacked {
        #[serde(rename = "enemyId")]
        enemy_id: String,
        damage: i32,
    },
    PlayerDamaged {
        #[serde(rename = "enemyId")]
        enemy_id: String,
        damage: i32,
        hp: i32,
    },
    PlayerHealed {
        #[serde(rename = "itemId")]
        item_id: String,
        amount: i32,
        hp: i32,
    },
    PotionRefused {
        #[serde(rename = "itemId")]
        item_id: String,
    },
    /// Reserved by the wire contract; the current rule set never misses in
    /// melee and ranged misses emit `ranged_missed`.
    AttackMissed,
    RangedAttack {
        #[serde(rename = "targetX")]
        target_x: i32,
        #[serde(rename = "targetY")]
        target_y: i32,
        damage: i32,
        #[serde(rename = "attackType")]
        attack_type: RangedAttackType,
        #[serde(rename = "enemyId")]
        enemy_id: String,
    },
    RangedMissed {
        #[serde(rename = "targetX")]
        target_x: i32,
        #[serde(rename = "targetY")]
        target_y: i32,
        damage: i32,
        #[serde(rename = "attackType")]
        attack_type: RangedAttackType,
    },
    EnemyKilled {
        #[serde(rename = "enemyId")]
        enemy_id: String,
        #[serde(rename = "enemyType")]
        enemy_type: EnemyKind,
        variant: EnemyVariant,
        #[serde(rename = "displayName")]
        display_name: String,
    },
    ItemPickedUp {
        #[serde(rename = "itemId")]
        item_id: String,
        #[serde(rename = "itemKind")]
        item_kind: ItemKind,
    },
    FloorDescended {
        floor: i32,
    },
    PlayerDied {
        #[serde(rename = "killedBy")]
        killed_by: String,
        #[serde(rename = "killedByType")]
        killed_by_type: EnemyKind,
        #[serde(rename = "killedByVariant")]
        killed_by_variant: EnemyVariant,
    },
    GameWon {
        score: i32,
    },
    XpGained {
        amount: i32,
        xp: i32,
    },
    LevelUp {
        level: i32,
        #[serde(rename = "maxHp")]
        max_hp: i32,
        attack: i32,
        defense: i32,
    },
    EquipmentEquipped {
        #[serde(rename = "itemId")]
        item_id: String,
        slot: EquipSlot,
        name: String,
    },
    EquipmentFound {
        #[serde(rename = "itemId")]
        item_id: String,
        #[serde(rename = "notBetter")]
        not_better: bool,
    },
}

impl EventData {
    /// Item referenced by a pickup/equip outcome this turn, if any; drives
    /// the `item_removed` delta.
    pub fn removed_item_id(&self) -> Option<&str> {
        match self {
            Self::ItemPickedUp { item_id, .. }
            | Self::PlayerHealed { item_id, .. }
            | Self::EquipmentEquipped { item_id, .. } => Some(item_id),
            _ => None,
        }
    }
}

/// Incremental change records, delivered in the order they were diffed.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    PlayerPos {
        x: i32,
        y: i32,
        facing: Facing,
    },
    PlayerStats {
        #[serde(skip_serializing_if = "Option::is_none")]
        hp: Option<i32>,
        #[serde(rename = "maxHp", skip_serializing_if = "Option::is_none")]
        max_hp: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        attack: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        defense: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        xp: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        level: Option<i32>,
        #[serde(rename = "xpToNextLevel", skip_serializing_if = "Option::is_none")]
        xp_to_next_level: Option<i32>,
    },
    PlayerEquipment {
        equipment: EquipmentSlots,
    },
    Score {
        score: i32,
    },
    Floor {
        floor: i32,
    },
    EnemyVisible {
        enemy: EnemyView,
    },
    EnemyMoved {
        id: String,
        x: i32,
        y: i32,
    },
    EnemyDamaged {
        id: String,
        hp: i32,
    },
    EnemyKilled {
        id: String,
    },
    EnemyHidden {
        id: String,
    },
    ItemVisible {
        item: Item,
    },
    ItemRemoved {
        id: String,
    },
    FogReveal {
        cells: Vec<CellPos>,
    },
    TilesReveal {
        tiles: Vec<Tile>,
    },
    GameStatus {
        status: GameStatus,
    },
    Event {
        event: GameEvent,
    },
    NewFloor {
        state: VisibleGameState,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    pub id: String,
    #[serde(rename = "playerName")]
    pub player_name: String,
    pub score: i32,
    pub floor: i32,
    #[serde(rename = "killedBy", default, skip_serializing_if = "Option::is_none")]
    pub killed_by: Option<String>,
    #[serde(rename = "killedByType", default, skip_serializing_if = "Option::is_none")]
    pub killed_by_type: Option<EnemyKind>,
    #[serde(
        rename = "killedByVariant",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub killed_by_variant: Option<EnemyVariant>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardResponse {
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
    pub entries: Vec<LeaderboardRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parsing_rejects_unknown() {
        assert_eq!(Direction::parse_move("up"), Some(Direction::Up));
        assert_eq!(Direction::parse_move("left"), Some(Direction::Left));
        assert_eq!(Direction::parse_move("north"), None);
        assert_eq!(Direction::parse_move(""), None);
    }

    #[test]
    fn dungeon_map_round_trips_through_row_strings() {
        let mut map = DungeonMap::filled_with_walls();
        map.set(3, 2, TileKind::Floor);
        map.set(4, 2, TileKind::Stairs);
        map.set(5, 2, TileKind::Door);

        let encoded = serde_json::to_string(&map).expect("serialize map");
        let decoded: DungeonMap = serde_json::from_str(&encoded).expect("deserialize map");
        assert_eq!(decoded, map);
        assert_eq!(decoded.kind_at(4, 2), Some(TileKind::Stairs));
    }

    #[test]
    fn out_of_bounds_counts_as_wall() {
        let map = DungeonMap::filled_with_walls();
        assert!(map.is_wall(-1, 0));
        assert!(map.is_wall(0, -1));
        assert!(map.is_wall(MAP_WIDTH, 0));
        assert!(map.is_wall(0, MAP_HEIGHT));
    }

    #[test]
    fn event_serializes_with_flattened_tag() {
        let event = GameEvent {
            id: "evt_1_1".to_string(),
            message: "You moved.".to_string(),
            data: EventData::PlayerMoved { x: 5, y: 6 },
        };
        let value = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(value["type"], "player_moved");
        assert_eq!(value["id"], "evt_1_1");
        assert_eq!(value["x"], 5);
    }

    #[test]
    fn player_stats_delta_omits_unchanged_fields() {
        let delta = Delta::PlayerStats {
            hp: Some(12),
            max_hp: None,
            attack: None,
            defense: None,
            xp: None,
            level: None,
            xp_to_next_level: None,
        };
        let value = serde_json::to_value(&delta).expect("serialize delta");
        assert_eq!(value["type"], "player_stats");
        assert_eq!(value["hp"], 12);
        assert!(value.get("maxHp").is_none());
        assert!(value.get("attack").is_none());
    }

    #[test]
    fn equipment_bonus_sum_adds_all_fields() {
        let equipment = Equipment {
            id: "eq_1".to_string(),
            name: "Iron Axe".to_string(),
            slot: EquipSlot::Weapon,
            tier: 3,
            attack_bonus: 6,
            defense_bonus: 1,
            hp_bonus: 2,
            ranged_damage_bonus: 0,
            ranged_range_bonus: 0,
        };
        assert_eq!(equipment.bonus_sum(), 9);
    }

    #[test]
    fn game_state_round_trips_through_json() {
        let mut map = DungeonMap::filled_with_walls();
        map.set(2, 2, TileKind::Floor);
        let state = GameState {
            id: "game_1".to_string(),
            player_name: "Alice".to_string(),
            floor: 3,
            status: GameStatus::Active,
            score: 120,
            player: Player::new(CharacterKind::Wizard, 2, 2),
            map,
            fog: GameState::blank_fog(),
            enemies: vec![Enemy {
                id: "enemy_3_0".to_string(),
                kind: EnemyKind::Skeleton,
                variant: EnemyVariant::Elite,
                display_name: "Elite Skeleton".to_string(),
                x: 5,
                y: 5,
                hp: 22,
                max_hp: 22,
                attack: 12,
                defense: 2,
                behavior: EnemyBehavior::Aggressive,
                last_seen_player: None,
            }],
            items: Vec::new(),
        };

        let encoded = serde_json::to_string(&state).expect("serialize state");
        let decoded: GameState = serde_json::from_str(&encoded).expect("deserialize state");
        assert_eq!(decoded.floor, 3);
        assert_eq!(decoded.enemies.len(), 1);
        assert_eq!(decoded.enemies[0].variant, EnemyVariant::Elite);
        assert_eq!(decoded.player.character, CharacterKind::Wizard);
    }
}
