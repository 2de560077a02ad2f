//! A* over the tile grid of a loaded map.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::TilePos;

/// Walkability of a map's tiles. Everything outside the bounds is blocked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavGrid {
    pub width: i32,
    pub height: i32,
    blocked: HashSet<TilePos>,
}

impl NavGrid {
    /// A grid with every tile walkable.
    pub fn open(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            blocked: HashSet::new(),
        }
    }

    /// Parse rows of `.` (walkable) and `#` (blocked). All rows must have
    /// the same length.
    pub fn from_rows(rows: &[&str]) -> CoreResult<Self> {
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        let mut grid = Self::open(width as i32, rows.len() as i32);
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                return Err(CoreError::Content(format!(
                    "nav grid row {} has length {}, expected {}",
                    y,
                    row.chars().count(),
                    width
                )));
            }
            for (x, c) in row.chars().enumerate() {
                match c {
                    '.' => {}
                    '#' => grid.block(TilePos::new(x as i32, y as i32)),
                    other => {
                        return Err(CoreError::Content(format!(
                            "nav grid has unknown tile '{}' at ({}, {})",
                            other, x, y
                        )));
                    }
                }
            }
        }
        Ok(grid)
    }

    pub fn block(&mut self, pos: TilePos) {
        self.blocked.insert(pos);
    }

    pub fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    pub fn is_walkable(&self, pos: TilePos) -> bool {
        self.in_bounds(pos) && !self.blocked.contains(&pos)
    }
}

/// Node for A* priority queue
#[derive(Clone, Eq, PartialEq)]
struct Node {
    pos: TilePos,
    g_cost: i32,
    f_cost: i32,
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: lower f_cost = higher priority
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.g_cost.cmp(&self.g_cost))
            .then_with(|| self.pos.cmp(&other.pos))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find a route from `start` to `goal` using 4-directional moves. Tiles in
/// `occupied` are treated as blocked. The returned steps exclude `start`
/// and end at `goal`. Returns None when no route exists or the search
/// expands more than `max_iterations` nodes.
pub fn find_path(
    start: TilePos,
    goal: TilePos,
    grid: &NavGrid,
    occupied: &HashSet<TilePos>,
    max_iterations: usize,
) -> Option<Vec<TilePos>> {
    if start == goal {
        return Some(Vec::new());
    }
    let passable = |pos: TilePos| grid.is_walkable(pos) && !occupied.contains(&pos);
    if !passable(goal) {
        return None;
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<TilePos, TilePos> = HashMap::new();
    let mut g_score: HashMap<TilePos, i32> = HashMap::new();

    g_score.insert(start, 0);
    open_set.push(Node {
        pos: start,
        g_cost: 0,
        f_cost: start.manhattan(goal),
    });

    let mut iterations = 0;
    while let Some(current) = open_set.pop() {
        iterations += 1;
        if iterations > max_iterations {
            return None;
        }

        if current.pos == goal {
            let mut path = vec![goal];
            let mut pos = goal;
            while let Some(&prev) = came_from.get(&pos) {
                if prev == start {
                    break;
                }
                path.push(prev);
                pos = prev;
            }
            path.reverse();
            return Some(path);
        }

        let current_g = g_score.get(&current.pos).copied().unwrap_or(i32::MAX);
        // stale heap entry
        if current.g_cost > current_g {
            continue;
        }

        for neighbor in current.pos.neighbors() {
            if !passable(neighbor) {
                continue;
            }
            let tentative_g = current_g + 1;
            if tentative_g < g_score.get(&neighbor).copied().unwrap_or(i32::MAX) {
                came_from.insert(neighbor, current.pos);
                g_score.insert(neighbor, tentative_g);
                open_set.push(Node {
                    pos: neighbor,
                    g_cost: tentative_g,
                    f_cost: tentative_g + neighbor.manhattan(goal),
                });
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_line() {
        let grid = NavGrid::open(5, 5);
        let path = find_path(TilePos::new(0, 0), TilePos::new(3, 0), &grid, &HashSet::new(), 100).unwrap();
        assert_eq!(
            path,
            vec![TilePos::new(1, 0), TilePos::new(2, 0), TilePos::new(3, 0)]
        );
    }

    #[test]
    fn test_routes_around_walls_and_npcs() {
        let grid = NavGrid::from_rows(&[
            ".....", //
            ".###.",
            ".....",
        ])
        .unwrap();
        let occupied: HashSet<_> = [TilePos::new(2, 2)].into();

        let path = find_path(TilePos::new(0, 1), TilePos::new(4, 1), &grid, &occupied, 100).unwrap();
        assert_eq!(path.len(), 6);
        assert!(path.iter().all(|p| grid.is_walkable(*p) && !occupied.contains(p)));
        assert!(path.windows(2).all(|w| w[0].is_adjacent(w[1])));
    }

    #[test]
    fn test_unreachable() {
        let grid = NavGrid::from_rows(&["..#.."]).unwrap();
        assert!(find_path(TilePos::new(0, 0), TilePos::new(4, 0), &grid, &HashSet::new(), 100).is_none());
        // goal itself blocked
        assert!(find_path(TilePos::new(0, 0), TilePos::new(2, 0), &grid, &HashSet::new(), 100).is_none());
        // iteration cap
        let open = NavGrid::open(50, 50);
        assert!(find_path(TilePos::new(0, 0), TilePos::new(49, 49), &open, &HashSet::new(), 10).is_none());
    }

    #[test]
    fn test_bad_rows() {
        assert!(NavGrid::from_rows(&["...", ".."]).is_err());
        assert!(NavGrid::from_rows(&[".x."]).is_err());
    }
}
