use crate::types::{CharacterKind, EnemyKind, EnemyVariant, RangedAttackType};

pub const MAP_WIDTH: i32 = 40;
pub const MAP_HEIGHT: i32 = 24;
pub const VISION_RADIUS: i32 = 5;
pub const MAX_FLOOR: i32 = 20;

pub const PLAYER_BASE_HP: i32 = 25;
pub const PLAYER_BASE_ATTACK: i32 = 10;
pub const PLAYER_BASE_DEFENSE: i32 = 2;

pub const POTION_HEAL_VALUE: i32 = 10;
pub const FLOOR_SCORE_BONUS: i32 = 100;
pub const VICTORY_SCORE_BONUS: i32 = 1_000;

pub const PATHFIND_MAX_DISTANCE: i32 = 20;
pub const PATHFIND_BUDGET_PER_TURN: usize = 5;

pub const MAP_GEN_ROOM_ATTEMPTS: usize = 100;
pub const MAP_GEN_RETRIES: usize = 8;

pub const MOVE_THROTTLE_MS: u64 = 80;
pub const ATTACK_THROTTLE_MS: u64 = 400;
pub const MAX_PENDING_MESSAGES: usize = 5;
pub const MAX_IN_FLIGHT_MESSAGES: usize = 3;

pub const IDLE_EVICT_AFTER_SECS: u64 = 5 * 60;
pub const IDLE_SWEEP_INTERVAL_SECS: u64 = 60;
pub const GAME_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

pub fn xp_to_next_level(level: i32) -> i32 {
    level * 50
}

/// (hp, attack, defense, xp) before variant scaling.
pub fn enemy_base_stats(kind: EnemyKind) -> (i32, i32, i32, i32) {
    match kind {
        EnemyKind::Rat => (6, 4, 0, 8),
        EnemyKind::Skeleton => (15, 8, 2, 30),
        EnemyKind::Orc => (25, 13, 4, 60),
        EnemyKind::Dragon => (45, 20, 8, 200),
    }
}

pub fn enemy_score(kind: EnemyKind) -> i32 {
    match kind {
        EnemyKind::Rat => 10,
        EnemyKind::Skeleton => 25,
        EnemyKind::Orc => 50,
        EnemyKind::Dragon => 200,
    }
}

pub fn enemy_kind_name(kind: EnemyKind) -> &'static str {
    match kind {
        EnemyKind::Rat => "Rat",
        EnemyKind::Skeleton => "Skeleton",
        EnemyKind::Orc => "Orc",
        EnemyKind::Dragon => "Dragon",
    }
}

/// (hp, attack, defense, xp) multipliers.
pub fn variant_multipliers(variant: EnemyVariant) -> (f32, f32, f32, f32) {
    match variant {
        EnemyVariant::Normal => (1.0, 1.0, 1.0, 1.0),
        EnemyVariant::Elite => (1.5, 1.5, 1.2, 2.5),
        EnemyVariant::Champion => (2.5, 1.8, 1.5, 4.0),
    }
}

pub fn variant_name_prefix(variant: EnemyVariant) -> &'static str {
    match variant {
        EnemyVariant::Normal => "",
        EnemyVariant::Elite => "Elite ",
        EnemyVariant::Champion => "Champion ",
    }
}

pub fn champion_chance(floor: i32) -> f32 {
    (((floor - 1) as f32) * 0.04).clamp(0.0, 0.20)
}

pub fn elite_chance(floor: i32) -> f32 {
    (0.10 + floor as f32 * 0.05).clamp(0.0, 0.40)
}

const ENEMY_KIND_LADDER: [EnemyKind; 4] = [
    EnemyKind::Rat,
    EnemyKind::Skeleton,
    EnemyKind::Orc,
    EnemyKind::Dragon,
];

/// Enemy kinds allowed to spawn on a floor: the ladder unlocks one kind
/// every third floor.
pub fn permitted_enemy_kinds(floor: i32) -> &'static [EnemyKind] {
    let count = (1 + floor / 3).clamp(1, 4) as usize;
    &ENEMY_KIND_LADDER[..count]
}

/// (base damage, base range) of the character's ranged attack.
pub fn ranged_profile(character: CharacterKind) -> (i32, i32) {
    match character {
        CharacterKind::Dwarf => (3, 2),
        CharacterKind::Bandit => (6, 3),
        CharacterKind::Elf => (6, 3),
        CharacterKind::Wizard => (7, 4),
    }
}

pub fn ranged_attack_type(character: CharacterKind) -> RangedAttackType {
    match character {
        CharacterKind::Dwarf => RangedAttackType::Dagger,
        CharacterKind::Elf => RangedAttackType::MagicDagger,
        CharacterKind::Bandit => RangedAttackType::Bolt,
        CharacterKind::Wizard => RangedAttackType::Spell,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enemy_ladder_unlocks_by_floor() {
        assert_eq!(permitted_enemy_kinds(1), &[EnemyKind::Rat]);
        assert_eq!(permitted_enemy_kinds(2), &[EnemyKind::Rat]);
        assert_eq!(
            permitted_enemy_kinds(3),
            &[EnemyKind::Rat, EnemyKind::Skeleton]
        );
        assert_eq!(
            permitted_enemy_kinds(6),
            &[EnemyKind::Rat, EnemyKind::Skeleton, EnemyKind::Orc]
        );
        assert_eq!(permitted_enemy_kinds(9).len(), 4);
        assert_eq!(permitted_enemy_kinds(20).len(), 4);
    }

    #[test]
    fn variant_chances_are_clamped() {
        assert_eq!(champion_chance(1), 0.0);
        assert!((champion_chance(3) - 0.08).abs() < 1e-6);
        assert_eq!(champion_chance(20), 0.20);
        assert!((elite_chance(1) - 0.15).abs() < 1e-6);
        assert_eq!(elite_chance(20), 0.40);
    }

    #[test]
    fn leveling_formula_is_linear() {
        assert_eq!(xp_to_next_level(1), 50);
        assert_eq!(xp_to_next_level(7), 350);
    }
}
