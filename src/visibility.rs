use crate::constants::{MAP_HEIGHT, MAP_WIDTH, VISION_RADIUS};
use crate::types::{DungeonMap, Enemy, Item, Tile};

/// Reveals every cell within the vision circle of `(px, py)`. Returns the
/// cells that flipped from hidden to revealed this call; fog never clears
/// within a floor.
pub fn update_fog(fog: &mut [Vec<bool>], px: i32, py: i32) -> Vec<(i32, i32)> {
    let mut revealed = Vec::new();
    for dy in -VISION_RADIUS..=VISION_RADIUS {
        for dx in -VISION_RADIUS..=VISION_RADIUS {
            if dx * dx + dy * dy > VISION_RADIUS * VISION_RADIUS {
                continue;
            }
            let x = px + dx;
            let y = py + dy;
            if x < 0 || y < 0 || x >= MAP_WIDTH || y >= MAP_HEIGHT {
                continue;
            }
            let cell = &mut fog[y as usize][x as usize];
            if !*cell {
                *cell = true;
                revealed.push((x, y));
            }
        }
    }
    revealed
}

pub fn is_revealed(fog: &[Vec<bool>], x: i32, y: i32) -> bool {
    if x < 0 || y < 0 || x >= MAP_WIDTH || y >= MAP_HEIGHT {
        return false;
    }
    fog[y as usize][x as usize]
}

/// Bresenham walk from `(x1, y1)` to `(x2, y2)`. Walls after the start cell
/// block the line. Carries a no-advance guard and a `W + H` step cap against
/// malformed input.
pub fn has_line_of_sight(map: &DungeonMap, x1: i32, y1: i32, x2: i32, y2: i32) -> bool {
    if x1 == x2 && y1 == y2 {
        return true;
    }
    let dx = (x2 - x1).abs();
    let dy = (y2 - y1).abs();
    let sx = if x1 < x2 { 1 } else { -1 };
    let sy = if y1 < y2 { 1 } else { -1 };
    let mut err = dx - dy;
    let mut x = x1;
    let mut y = y1;

    for _ in 0..(MAP_WIDTH + MAP_HEIGHT) {
        let (prev_x, prev_y) = (x, y);
        let doubled = 2 * err;
        if doubled > -dy {
            err -= dy;
            x += sx;
        }
        if doubled < dx {
            err += dx;
            y += sy;
        }
        if x == prev_x && y == prev_y {
            return false;
        }
        if x == x2 && y == y2 {
            return true;
        }
        if map.is_wall(x, y) {
            return false;
        }
    }
    false
}

/// Enemies the client may know about: inside revealed fog and still alive.
pub fn visible_enemies<'a>(fog: &[Vec<bool>], enemies: &'a [Enemy]) -> Vec<&'a Enemy> {
    enemies
        .iter()
        .filter(|enemy| enemy.is_alive() && is_revealed(fog, enemy.x, enemy.y))
        .collect()
}

pub fn visible_items<'a>(fog: &[Vec<bool>], items: &'a [Item]) -> Vec<&'a Item> {
    items
        .iter()
        .filter(|item| is_revealed(fog, item.x, item.y))
        .collect()
}

pub fn visible_tiles(fog: &[Vec<bool>], map: &DungeonMap) -> Vec<Tile> {
    let mut tiles = Vec::new();
    for y in 0..MAP_HEIGHT {
        for x in 0..MAP_WIDTH {
            if is_revealed(fog, x, y) {
                if let Some(tile) = map.tile(x, y) {
                    tiles.push(tile);
                }
            }
        }
    }
    tiles
}
