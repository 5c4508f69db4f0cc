use std::collections::HashSet;

use super::utils::{is_adjacent, manhattan};
use super::GameEngine;
use crate::constants::{PATHFIND_BUDGET_PER_TURN, VISION_RADIUS};
use crate::pathfind::{self, PathQuery};
use crate::types::{EnemyBehavior, GameStatus};
use crate::visibility::has_line_of_sight;

impl GameEngine {
    /// Runs every live enemy's decision after the player's action. Closest
    /// enemies act first; only the closest few get pathfinder time.
    pub(super) fn run_enemy_phase(&mut self) {
        if self.state.status != GameStatus::Active {
            return;
        }
        let (px, py) = (self.state.player.x, self.state.player.y);

        let mut order: Vec<usize> = (0..self.state.enemies.len())
            .filter(|&idx| self.state.enemies[idx].is_alive())
            .collect();
        order.sort_by_key(|&idx| {
            let enemy = &self.state.enemies[idx];
            manhattan(enemy.x, enemy.y, px, py)
        });

        let mut path_budget = PATHFIND_BUDGET_PER_TURN;
        for idx in order {
            if self.state.status != GameStatus::Active {
                return;
            }
            let enemy = &self.state.enemies[idx];
            if !enemy.is_alive() {
                continue;
            }
            if manhattan(enemy.x, enemy.y, px, py) > VISION_RADIUS + 2 {
                continue;
            }

            let can_see = has_line_of_sight(&self.state.map, enemy.x, enemy.y, px, py);
            if can_see {
                self.state.enemies[idx].last_seen_player = Some((px, py));
            }

            let behavior = self.state.enemies[idx].behavior;
            match behavior {
                EnemyBehavior::Stationary => {
                    let enemy = &self.state.enemies[idx];
                    if is_adjacent(enemy.x, enemy.y, px, py) {
                        self.enemy_strike(idx);
                    }
                }
                EnemyBehavior::Patrol => {
                    if can_see {
                        let enemy = &self.state.enemies[idx];
                        if is_adjacent(enemy.x, enemy.y, px, py) {
                            self.enemy_strike(idx);
                        } else {
                            self.step_along_path(idx, (px, py), &mut path_budget);
                        }
                    }
                }
                EnemyBehavior::Flee => {
                    let enemy = &self.state.enemies[idx];
                    let wounded = (enemy.hp as f32) < (enemy.max_hp as f32) * 0.3;
                    if wounded && can_see {
                        self.step_away_from_player(idx);
                    } else {
                        self.aggressive_action(idx, can_see, &mut path_budget);
                    }
                }
                EnemyBehavior::Aggressive => {
                    self.aggressive_action(idx, can_see, &mut path_budget);
                }
            }
        }
    }

    /// Chase the player, or the last place they were seen. Attacks when
    /// adjacent, including right after closing the final step.
    fn aggressive_action(&mut self, idx: usize, can_see: bool, path_budget: &mut usize) {
        let (px, py) = (self.state.player.x, self.state.player.y);
        let target = if can_see {
            Some((px, py))
        } else {
            self.state.enemies[idx].last_seen_player
        };
        let Some(target) = target else {
            return;
        };

        {
            let enemy = &self.state.enemies[idx];
            if is_adjacent(enemy.x, enemy.y, px, py) {
                self.enemy_strike(idx);
                return;
            }
        }

        self.step_along_path(idx, target, path_budget);

        let enemy = &self.state.enemies[idx];
        if is_adjacent(enemy.x, enemy.y, px, py) {
            self.enemy_strike(idx);
            return;
        }
        // Memory of a stale sighting expires once the spot is reached empty.
        if !can_see {
            let enemy = &mut self.state.enemies[idx];
            if (enemy.x, enemy.y) == target {
                enemy.last_seen_player = None;
            }
        }
    }

    /// One BFS step toward `target`, spending pathfinder budget. Enemies out
    /// of budget simply hold position this turn.
    fn step_along_path(&mut self, idx: usize, target: (i32, i32), path_budget: &mut usize) -> bool {
        if *path_budget == 0 {
            return false;
        }
        *path_budget -= 1;

        let (px, py) = (self.state.player.x, self.state.player.y);
        let from = (self.state.enemies[idx].x, self.state.enemies[idx].y);
        let blocked: HashSet<(i32, i32)> = self
            .state
            .enemies
            .iter()
            .enumerate()
            .filter(|(other, enemy)| *other != idx && enemy.is_alive())
            .map(|(_, enemy)| (enemy.x, enemy.y))
            .collect();
        let query = PathQuery::new(&self.state.map, &blocked, (px, py));

        let Some(step) = pathfind::next_step(&query, from, target) else {
            return false;
        };
        if step == (px, py) {
            return false;
        }
        self.state.enemies[idx].x = step.0;
        self.state.enemies[idx].y = step.1;
        true
    }

    /// Back off one cell: the horizontal opposite first, then the vertical.
    fn step_away_from_player(&mut self, idx: usize) {
        let (px, py) = (self.state.player.x, self.state.player.y);
        let (ex, ey) = (self.state.enemies[idx].x, self.state.enemies[idx].y);
        let horizontal = if ex >= px { (ex + 1, ey) } else { (ex - 1, ey) };
        let vertical = if ey >= py { (ex, ey + 1) } else { (ex, ey - 1) };

        for (nx, ny) in [horizontal, vertical] {
            if self.enemy_can_enter(idx, nx, ny) {
                self.state.enemies[idx].x = nx;
                self.state.enemies[idx].y = ny;
                return;
            }
        }
    }

    fn enemy_can_enter(&self, idx: usize, x: i32, y: i32) -> bool {
        if self.state.map.is_wall(x, y) {
            return false;
        }
        if (x, y) == (self.state.player.x, self.state.player.y) {
            return false;
        }
        self.state
            .enemies
            .iter()
            .enumerate()
            .all(|(other, enemy)| other == idx || !enemy.is_alive() || (enemy.x, enemy.y) != (x, y))
    }
}
