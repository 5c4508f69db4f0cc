use std::collections::{HashSet, VecDeque};

use crate::constants::{MAP_HEIGHT, MAP_WIDTH, PATHFIND_MAX_DISTANCE};
use crate::types::DungeonMap;

/// Neighbour order is fixed so ties break deterministically.
const NEIGHBOR_OFFSETS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

pub struct PathQuery<'a> {
    pub map: &'a DungeonMap,
    /// Cells held by live enemies other than the mover.
    pub blocked: &'a HashSet<(i32, i32)>,
    pub player: (i32, i32),
    pub max_distance: i32,
}

impl<'a> PathQuery<'a> {
    pub fn new(map: &'a DungeonMap, blocked: &'a HashSet<(i32, i32)>, player: (i32, i32)) -> Self {
        Self {
            map,
            blocked,
            player,
            max_distance: PATHFIND_MAX_DISTANCE,
        }
    }

    fn traversable(&self, cell: (i32, i32), target: (i32, i32)) -> bool {
        if self.map.is_wall(cell.0, cell.1) || self.blocked.contains(&cell) {
            return false;
        }
        // The player's cell only counts as open when it is the destination
        // itself (the attacker stops there).
        cell != self.player || cell == target
    }
}

/// Breadth-first search over the 4-connected grid. Returns the single next
/// step toward `to`, or `None` when no path of length `<= max_distance`
/// exists within the `W * H` visit cap.
pub fn next_step(query: &PathQuery, from: (i32, i32), to: (i32, i32)) -> Option<(i32, i32)> {
    if from == to {
        return None;
    }

    let index_of = |(x, y): (i32, i32)| (y * MAP_WIDTH + x) as usize;
    let cell_count = (MAP_WIDTH * MAP_HEIGHT) as usize;
    let mut parent: Vec<Option<(i32, i32)>> = vec![None; cell_count];
    let mut distance: Vec<i32> = vec![-1; cell_count];
    let mut queue = VecDeque::new();

    distance[index_of(from)] = 0;
    queue.push_back(from);

    let mut visited = 0usize;
    while let Some(current) = queue.pop_front() {
        visited += 1;
        if visited > cell_count {
            return None;
        }
        let current_distance = distance[index_of(current)];
        if current == to {
            return first_step(&parent, from, to);
        }
        if current_distance >= query.max_distance {
            continue;
        }
        for (dx, dy) in NEIGHBOR_OFFSETS {
            let next = (current.0 + dx, current.1 + dy);
            if !query.map.in_bounds(next.0, next.1) {
                continue;
            }
            if distance[index_of(next)] >= 0 || !query.traversable(next, to) {
                continue;
            }
            distance[index_of(next)] = current_distance + 1;
            parent[index_of(next)] = Some(current);
            queue.push_back(next);
        }
    }
    None
}

fn first_step(
    parent: &[Option<(i32, i32)>],
    from: (i32, i32),
    to: (i32, i32),
) -> Option<(i32, i32)> {
    let index_of = |(x, y): (i32, i32)| (y * MAP_WIDTH + x) as usize;
    let mut cursor = to;
    loop {
        let previous = parent[index_of(cursor)]?;
        if previous == from {
            return Some(cursor);
        }
        cursor = previous;
    }
}
