use std::cmp::Ordering;
use std::collections::HashSet;

use thiserror::Error;

use crate::constants::{
    champion_chance, elite_chance, enemy_base_stats, enemy_kind_name, permitted_enemy_kinds,
    variant_multipliers, variant_name_prefix, MAP_GEN_RETRIES, MAP_GEN_ROOM_ATTEMPTS, MAP_HEIGHT,
    MAP_WIDTH, POTION_HEAL_VALUE,
};
use crate::rng::Rng;
use crate::types::{
    CharacterKind, DungeonMap, Enemy, EnemyBehavior, EnemyKind, EnemyVariant, EquipSlot, Equipment,
    Item, ItemKind, TileKind,
};

#[derive(Clone, Copy, Debug, Error)]
pub enum MapGenError {
    #[error("floor generation exhausted {0} attempts without a valid layout")]
    Exhausted(usize),
}

#[derive(Clone, Debug)]
pub struct GeneratedFloor {
    pub map: DungeonMap,
    pub player_start: (i32, i32),
    pub enemies: Vec<Enemy>,
    pub items: Vec<Item>,
}

#[derive(Clone, Copy, Debug)]
struct Room {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl Room {
    fn center(&self) -> (i32, i32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }

    fn overlaps_inflated(&self, other: &Room) -> bool {
        self.x - 1 < other.x + other.w
            && self.x + self.w + 1 > other.x
            && self.y - 1 < other.y + other.h
            && self.y + self.h + 1 > other.y
    }

    fn random_cell(&self, rng: &mut Rng) -> (i32, i32) {
        (
            rng.int(self.x, self.x + self.w - 1),
            rng.int(self.y, self.y + self.h - 1),
        )
    }
}

pub fn generate_floor(
    floor: i32,
    character: CharacterKind,
    rng: &mut Rng,
) -> Result<GeneratedFloor, MapGenError> {
    for _ in 0..MAP_GEN_RETRIES {
        if let Some(generated) = try_generate(floor, character, rng) {
            return Ok(generated);
        }
    }
    Err(MapGenError::Exhausted(MAP_GEN_RETRIES))
}

fn try_generate(floor: i32, character: CharacterKind, rng: &mut Rng) -> Option<GeneratedFloor> {
    let mut map = DungeonMap::filled_with_walls();
    let target_rooms = rng.int(5, 8) as usize;
    let mut rooms: Vec<Room> = Vec::new();

    for _ in 0..MAP_GEN_ROOM_ATTEMPTS {
        if rooms.len() >= target_rooms {
            break;
        }
        let w = rng.int(4, 8);
        let h = rng.int(4, 6);
        let x = rng.int(1, MAP_WIDTH - 10);
        let y = rng.int(1, MAP_HEIGHT - 8);
        let candidate = Room { x, y, w, h };
        if x + w >= MAP_WIDTH || y + h >= MAP_HEIGHT {
            continue;
        }
        if rooms.iter().any(|room| room.overlaps_inflated(&candidate)) {
            continue;
        }
        rooms.push(candidate);
    }

    if rooms.len() < 2 {
        return None;
    }

    for room in &rooms {
        carve_room(&mut map, room);
    }

    // Stable left-to-right, slightly top-biased ordering; corridors connect
    // neighbours in this order so the layout reads as one chain.
    rooms.sort_by(|a, b| room_sort_key(a).partial_cmp(&room_sort_key(b)).unwrap_or(Ordering::Equal));

    for pair in rooms.windows(2) {
        carve_corridor(&mut map, pair[0].center(), pair[1].center());
    }
    if rooms.len() > 2 {
        let first = rooms[0].center();
        let last = rooms[rooms.len() - 1].center();
        carve_corridor(&mut map, first, last);
    }

    let player_start = rooms[0].center();
    let stairs = rooms[rooms.len() - 1].center();
    map.set(stairs.0, stairs.1, TileKind::Stairs);

    let mut occupied: HashSet<(i32, i32)> = HashSet::new();
    occupied.insert(player_start);
    occupied.insert(stairs);

    let enemies = seed_enemies(floor, &rooms, &mut occupied, rng);
    let items = seed_items(floor, character, &rooms, &mut occupied, rng);

    Some(GeneratedFloor {
        map,
        player_start,
        enemies,
        items,
    })
}

fn room_sort_key(room: &Room) -> f32 {
    let (cx, cy) = room.center();
    cx as f32 + 0.5 * cy as f32
}

fn carve_room(map: &mut DungeonMap, room: &Room) {
    for y in room.y..room.y + room.h {
        for x in room.x..room.x + room.w {
            map.set(x, y, TileKind::Floor);
        }
    }
}

/// L-shaped corridor: horizontal span at the first center's y, then vertical
/// span at the second center's x.
fn carve_corridor(map: &mut DungeonMap, from: (i32, i32), to: (i32, i32)) {
    let (x1, y1) = from;
    let (x2, y2) = to;
    for x in x1.min(x2)..=x1.max(x2) {
        if map.kind_at(x, y1) == Some(TileKind::Wall) {
            map.set(x, y1, TileKind::Floor);
        }
    }
    for y in y1.min(y2)..=y1.max(y2) {
        if map.kind_at(x2, y) == Some(TileKind::Wall) {
            map.set(x2, y, TileKind::Floor);
        }
    }
}

fn seed_enemies(
    floor: i32,
    rooms: &[Room],
    occupied: &mut HashSet<(i32, i32)>,
    rng: &mut Rng,
) -> Vec<Enemy> {
    let count = rng.int(3, 5) + floor / 2;
    let kinds = permitted_enemy_kinds(floor);
    let mut enemies = Vec::new();

    for index in 0..count {
        let Some((x, y)) = pick_free_cell(&rooms[1..], occupied, rng) else {
            break;
        };
        occupied.insert((x, y));
        let Some(&kind) = rng.pick(kinds) else {
            break;
        };
        let id = format!("enemy_{floor}_{index}");
        enemies.push(spawn_enemy(id, kind, floor, x, y, rng));
    }
    enemies
}

fn seed_items(
    floor: i32,
    character: CharacterKind,
    rooms: &[Room],
    occupied: &mut HashSet<(i32, i32)>,
    rng: &mut Rng,
) -> Vec<Item> {
    let mut items = Vec::new();
    let mut index = 0;

    let potion_count = rng.int(1, 3);
    for _ in 0..potion_count {
        let Some((x, y)) = pick_free_cell(rooms, occupied, rng) else {
            break;
        };
        occupied.insert((x, y));
        items.push(Item {
            id: format!("item_{floor}_{index}"),
            kind: ItemKind::HealthPotion,
            x,
            y,
            value: POTION_HEAL_VALUE,
            equipment: None,
        });
        index += 1;
    }

    let equipment_count = rng.int(1, 2);
    let max_tier = (floor + 1).min(6);
    for _ in 0..equipment_count {
        let Some((x, y)) = pick_free_cell(rooms, occupied, rng) else {
            break;
        };
        occupied.insert((x, y));
        let slot = *rng
            .pick(&[
                EquipSlot::Weapon,
                EquipSlot::Shield,
                EquipSlot::Armor,
                EquipSlot::Ranged,
            ])
            .unwrap_or(&EquipSlot::Weapon);
        let tier = rng.int(1, max_tier);
        let equipment = catalog_equipment(slot, tier, character, format!("eq_{floor}_{index}"));
        items.push(Item {
            id: format!("item_{floor}_{index}"),
            kind: ItemKind::Equipment,
            x,
            y,
            value: 0,
            equipment: Some(equipment),
        });
        index += 1;
    }

    items
}

fn pick_free_cell(
    rooms: &[Room],
    occupied: &HashSet<(i32, i32)>,
    rng: &mut Rng,
) -> Option<(i32, i32)> {
    for _ in 0..32 {
        let Some(room) = rng.pick(rooms) else {
            return None;
        };
        let cell = room.random_cell(rng);
        if !occupied.contains(&cell) {
            return Some(cell);
        }
    }
    None
}

/// Rolls variant and base stats for a freshly spawned enemy. Champion odds
/// climb with the floor, elite odds start at 15% on floor one.
pub fn spawn_enemy(id: String, kind: EnemyKind, floor: i32, x: i32, y: i32, rng: &mut Rng) -> Enemy {
    let champion = champion_chance(floor);
    let elite = elite_chance(floor);
    let roll = rng.next_f32();
    let variant = if roll < champion {
        EnemyVariant::Champion
    } else if roll < champion + elite {
        EnemyVariant::Elite
    } else {
        EnemyVariant::Normal
    };

    let (base_hp, base_attack, base_defense, _base_xp) = enemy_base_stats(kind);
    let (hp_mult, attack_mult, defense_mult, _xp_mult) = variant_multipliers(variant);
    let hp = (base_hp as f32 * hp_mult).floor() as i32;
    let attack = (base_attack as f32 * attack_mult).floor() as i32;
    let defense = (base_defense as f32 * defense_mult).floor() as i32;

    let behavior = match kind {
        EnemyKind::Rat => EnemyBehavior::Flee,
        EnemyKind::Dragon => EnemyBehavior::Aggressive,
        EnemyKind::Skeleton | EnemyKind::Orc => {
            if rng.chance(0.7) {
                EnemyBehavior::Aggressive
            } else {
                EnemyBehavior::Patrol
            }
        }
    };

    Enemy {
        id,
        kind,
        variant,
        display_name: format!("{}{}", variant_name_prefix(variant), enemy_kind_name(kind)),
        x,
        y,
        hp,
        max_hp: hp,
        attack,
        defense,
        behavior,
        last_seen_player: None,
    }
}

const WEAPON_NAMES: [&str; 6] = [
    "Rusty Sword",
    "Short Sword",
    "Iron Axe",
    "Steel Blade",
    "Runed Saber",
    "Dragonfang",
];
const SHIELD_NAMES: [&str; 6] = [
    "Wooden Buckler",
    "Hide Shield",
    "Iron Shield",
    "Tower Shield",
    "Runed Aegis",
    "Dragonscale Wall",
];
const ARMOR_NAMES: [&str; 6] = [
    "Padded Tunic",
    "Leather Armor",
    "Chain Mail",
    "Plate Armor",
    "Runed Plate",
    "Dragonscale Mail",
];
const STAFF_NAMES: [&str; 6] = [
    "Willow Staff",
    "Oak Staff",
    "Ember Staff",
    "Storm Staff",
    "Runed Staff",
    "Dragonbone Staff",
];
const CROSSBOW_NAMES: [&str; 6] = [
    "Light Crossbow",
    "Hunter Crossbow",
    "Heavy Crossbow",
    "Siege Crossbow",
    "Runed Crossbow",
    "Dragonslayer Crossbow",
];
const DAGGER_NAMES: [&str; 6] = [
    "Throwing Knife",
    "Balanced Dagger",
    "Steel Dagger",
    "Twin Fangs",
    "Runed Dagger",
    "Dragonfang Dagger",
];

/// Builds the catalog entry for a slot/tier. The ranged family follows the
/// character: wizards find staves, bandits crossbows, elves and dwarves
/// daggers.
pub fn catalog_equipment(
    slot: EquipSlot,
    tier: i32,
    character: CharacterKind,
    id: String,
) -> Equipment {
    let tier = tier.clamp(1, 6);
    let name_index = (tier - 1) as usize;
    let (name, attack, defense, hp, ranged_damage, ranged_range) = match slot {
        EquipSlot::Weapon => (WEAPON_NAMES[name_index], 2 * tier, 0, 0, 0, 0),
        EquipSlot::Shield => (SHIELD_NAMES[name_index], 0, tier, tier - 1, 0, 0),
        EquipSlot::Armor => (ARMOR_NAMES[name_index], 0, tier, 2 * tier, 0, 0),
        EquipSlot::Ranged => {
            let names = match character {
                CharacterKind::Wizard => &STAFF_NAMES,
                CharacterKind::Bandit => &CROSSBOW_NAMES,
                CharacterKind::Elf | CharacterKind::Dwarf => &DAGGER_NAMES,
            };
            (names[name_index], 0, 0, 0, tier, tier / 2)
        }
    };

    Equipment {
        id,
        name: name.to_string(),
        slot,
        tier,
        attack_bonus: attack,
        defense_bonus: defense,
        hp_bonus: hp,
        ranged_damage_bonus: ranged_damage,
        ranged_range_bonus: ranged_range,
    }
}
