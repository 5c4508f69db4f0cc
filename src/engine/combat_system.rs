use super::GameEngine;
use crate::constants::{
    enemy_base_stats, enemy_score, ranged_attack_type, ranged_profile, variant_multipliers,
    xp_to_next_level,
};
use crate::types::{EventData, Facing, GameStatus, ItemKind};

impl GameEngine {
    /// Melee swing against an adjacent enemy. Damage floors at 1 so armored
    /// targets still chip.
    pub(super) fn melee_attack(&mut self, enemy_idx: usize) {
        let damage = (self.state.player.attack - self.state.enemies[enemy_idx].defense).max(1);
        let enemy = &mut self.state.enemies[enemy_idx];
        enemy.hp = (enemy.hp - damage).max(0);
        let enemy_id = enemy.id.clone();
        let display_name = enemy.display_name.clone();
        let killed = !enemy.is_alive();

        self.push_event(
            format!("You hit the {display_name} for {damage} damage."),
            EventData::PlayerAttacked { enemy_id, damage },
        );
        if killed {
            self.grant_kill_rewards(enemy_idx);
        }
    }

    /// Horizontal projectile along the player's facing. Stops at the first
    /// wall or the first live enemy.
    pub(super) fn ranged_attack(&mut self) {
        let player = &self.state.player;
        let (base_damage, base_range) = ranged_profile(player.character);
        let (bonus_damage, bonus_range) = player
            .equipment
            .ranged
            .as_ref()
            .map(|equipment| (equipment.ranged_damage_bonus, equipment.ranged_range_bonus))
            .unwrap_or((0, 0));
        let power = base_damage + bonus_damage;
        let range = base_range + bonus_range;
        let attack_type = ranged_attack_type(player.character);
        let step = match player.facing {
            Facing::Left => -1,
            Facing::Right => 1,
        };
        let (px, py) = (player.x, player.y);

        for i in 1..=range {
            let x = px + step * i;
            if self.state.map.is_wall(x, py) {
                self.push_event(
                    "Your shot strikes a wall.".to_string(),
                    EventData::RangedMissed {
                        target_x: x,
                        target_y: py,
                        damage: 0,
                        attack_type,
                    },
                );
                return;
            }
            if let Some(enemy_idx) = self.state.live_enemy_at(x, py) {
                let damage = (power - self.state.enemies[enemy_idx].defense).max(1);
                let enemy = &mut self.state.enemies[enemy_idx];
                enemy.hp = (enemy.hp - damage).max(0);
                let enemy_id = enemy.id.clone();
                let display_name = enemy.display_name.clone();
                let killed = !enemy.is_alive();

                self.push_event(
                    format!("Your shot hits the {display_name} for {damage} damage."),
                    EventData::RangedAttack {
                        target_x: x,
                        target_y: py,
                        damage,
                        attack_type,
                        enemy_id,
                    },
                );
                if killed {
                    self.grant_kill_rewards(enemy_idx);
                }
                return;
            }
        }

        self.push_event(
            "Your shot finds nothing.".to_string(),
            EventData::RangedMissed {
                target_x: px + step * range,
                target_y: py,
                damage: 0,
                attack_type,
            },
        );
    }

    /// Score, XP, and the level-up loop. Overflow XP carries into repeated
    /// level-ups within the same kill.
    pub(super) fn grant_kill_rewards(&mut self, enemy_idx: usize) {
        let (enemy_id, kind, variant, display_name) = {
            let enemy = &self.state.enemies[enemy_idx];
            (
                enemy.id.clone(),
                enemy.kind,
                enemy.variant,
                enemy.display_name.clone(),
            )
        };
        self.state.score += enemy_score(kind);
        self.push_event(
            format!("The {display_name} dies!"),
            EventData::EnemyKilled {
                enemy_id,
                enemy_type: kind,
                variant,
                display_name,
            },
        );

        let (_, _, _, base_xp) = enemy_base_stats(kind);
        let (_, _, _, xp_mult) = variant_multipliers(variant);
        let amount = (base_xp as f32 * xp_mult).floor() as i32;
        self.state.player.xp += amount;
        let xp = self.state.player.xp;
        self.push_event(
            format!("You gain {amount} XP."),
            EventData::XpGained { amount, xp },
        );

        while self.state.player.xp >= self.state.player.xp_to_next_level {
            let player = &mut self.state.player;
            player.xp -= player.xp_to_next_level;
            player.level += 1;
            player.max_hp += 3;
            player.attack += 1;
            player.defense += 1;
            player.hp = (player.hp + player.max_hp / 2).min(player.max_hp);
            player.xp_to_next_level = xp_to_next_level(player.level);
            let (level, max_hp, attack, defense) =
                (player.level, player.max_hp, player.attack, player.defense);
            self.push_event(
                format!("Welcome to level {level}!"),
                EventData::LevelUp {
                    level,
                    max_hp,
                    attack,
                    defense,
                },
            );
        }
    }

    /// Item resolution on the tile the player just entered.
    pub(super) fn resolve_pickup(&mut self, x: i32, y: i32) {
        let Some(item_idx) = self.state.item_at(x, y) else {
            return;
        };
        let kind = self.state.items[item_idx].kind;
        match kind {
            ItemKind::HealthPotion => self.pickup_potion(item_idx),
            ItemKind::Equipment => self.pickup_equipment(item_idx),
        }
    }

    fn pickup_potion(&mut self, item_idx: usize) {
        let item_id = self.state.items[item_idx].id.clone();
        let player = &self.state.player;
        if player.hp >= player.max_hp {
            self.push_event(
                "You are already at full health.".to_string(),
                EventData::PotionRefused { item_id },
            );
            return;
        }

        let item = self.state.items.remove(item_idx);
        self.push_event(
            "You pick up a health potion.".to_string(),
            EventData::ItemPickedUp {
                item_id: item.id.clone(),
                item_kind: ItemKind::HealthPotion,
            },
        );
        let player = &mut self.state.player;
        let amount = item.value.min(player.max_hp - player.hp);
        player.hp += amount;
        let hp = player.hp;
        self.push_event(
            format!("You recover {amount} HP."),
            EventData::PlayerHealed {
                item_id: item.id,
                amount,
                hp,
            },
        );
    }

    fn pickup_equipment(&mut self, item_idx: usize) {
        let item_id = self.state.items[item_idx].id.clone();
        let Some(equipment) = self.state.items[item_idx].equipment.clone() else {
            return;
        };
        let current_sum = self
            .state
            .player
            .equipment
            .get(equipment.slot)
            .map(|current| current.bonus_sum());
        let better = current_sum
            .map(|sum| equipment.bonus_sum() > sum)
            .unwrap_or(true);

        if !better {
            self.push_event(
                format!("You find a {}, but yours is better.", equipment.name),
                EventData::EquipmentFound {
                    item_id,
                    not_better: true,
                },
            );
            return;
        }

        self.state.items.remove(item_idx);
        let slot = equipment.slot;
        let name = equipment.name.clone();
        let player = &mut self.state.player;
        if let Some(old) = player.equipment.get(slot).cloned() {
            player.attack -= old.attack_bonus;
            player.defense -= old.defense_bonus;
            player.max_hp -= old.hp_bonus;
        }
        player.attack += equipment.attack_bonus;
        player.defense += equipment.defense_bonus;
        player.max_hp += equipment.hp_bonus;
        player.hp = player.hp.min(player.max_hp);
        player.equipment.set(slot, equipment);

        self.push_event(
            format!("You equip the {name}."),
            EventData::EquipmentEquipped {
                item_id,
                slot,
                name,
            },
        );
    }

    /// An enemy strikes the player. Lethal hits flip the game to dead and
    /// emit the obituary.
    pub(super) fn enemy_strike(&mut self, enemy_idx: usize) {
        let (enemy_id, display_name, kind, variant, attack) = {
            let enemy = &self.state.enemies[enemy_idx];
            (
                enemy.id.clone(),
                enemy.display_name.clone(),
                enemy.kind,
                enemy.variant,
                enemy.attack,
            )
        };
        let damage = (attack - self.state.player.defense).max(1);
        let player = &mut self.state.player;
        player.hp = (player.hp - damage).max(0);
        let hp = player.hp;

        self.push_event(
            format!("The {display_name} hits you for {damage} damage."),
            EventData::PlayerDamaged {
                enemy_id,
                damage,
                hp,
            },
        );
        if hp == 0 {
            self.state.status = GameStatus::Dead;
            self.push_event(
                format!("You were slain by a {display_name}."),
                EventData::PlayerDied {
                    killed_by: display_name,
                    killed_by_type: kind,
                    killed_by_variant: variant,
                },
            );
        }
    }
}
