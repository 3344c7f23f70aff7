use crate::world::map::Map;
use crate::world::position::{Direction, Position};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Step costs in thousandths of a tile.
const ORTHOGONAL_COST: u32 = 1000;
const DIAGONAL_COST: u32 = 1414;

fn heuristic(from: Position, goal: Position) -> u32 {
    from.manhattan_distance(goal).saturating_mul(ORTHOGONAL_COST)
}

fn step_cost(direction: Direction) -> u32 {
    if direction.is_diagonal() {
        DIAGONAL_COST
    } else {
        ORTHOGONAL_COST
    }
}

/// A* over known tiles on one floor. The goal is always a candidate even when
/// occupied; every other node must be pathable. Returns the directions from
/// `start` to `goal`, or an empty list when no path is found within the
/// search box of `max_distance` around `start`.
pub fn find_path(map: &Map, start: Position, goal: Position, max_distance: u16) -> Vec<Direction> {
    if start == goal || start.z != goal.z || !start.is_valid() || !goal.is_valid() {
        return Vec::new();
    }
    if start.distance(goal) > max_distance {
        return Vec::new();
    }

    let max_iterations = usize::from(max_distance)
        .saturating_mul(usize::from(max_distance))
        .saturating_mul(4);
    let mut open = BinaryHeap::<(Reverse<u32>, Reverse<u32>, Position)>::new();
    let mut g_scores = HashMap::<Position, u32>::new();
    let mut came_from = HashMap::<Position, (Position, Direction)>::new();

    g_scores.insert(start, 0);
    open.push((Reverse(heuristic(start, goal)), Reverse(heuristic(start, goal)), start));

    let mut iterations = 0usize;
    while let Some((Reverse(f_score), _, node)) = open.pop() {
        let g_cost = g_scores.get(&node).copied().unwrap_or(u32::MAX);
        if f_score > g_cost.saturating_add(heuristic(node, goal)) {
            continue;
        }
        if node == goal {
            return reconstruct(start, goal, &came_from);
        }

        iterations += 1;
        if iterations > max_iterations {
            tracing::debug!(%start, %goal, iterations, "path search gave up");
            break;
        }

        for direction in Direction::ALL {
            let next = node.translated(direction);
            if !next.is_valid()
                || next.x.abs_diff(start.x) > max_distance
                || next.y.abs_diff(start.y) > max_distance
            {
                continue;
            }
            if next != goal && !map.is_pathable(next) {
                continue;
            }
            let tentative = g_cost.saturating_add(step_cost(direction));
            if tentative >= g_scores.get(&next).copied().unwrap_or(u32::MAX) {
                continue;
            }
            g_scores.insert(next, tentative);
            came_from.insert(next, (node, direction));
            let h_cost = heuristic(next, goal);
            open.push((Reverse(tentative.saturating_add(h_cost)), Reverse(h_cost), next));
        }
    }

    Vec::new()
}

fn reconstruct(
    start: Position,
    goal: Position,
    came_from: &HashMap<Position, (Position, Direction)>,
) -> Vec<Direction> {
    let mut directions = Vec::new();
    let mut current = goal;
    while current != start {
        let Some((previous, direction)) = came_from.get(&current) else {
            return Vec::new();
        };
        directions.push(*direction);
        current = *previous;
    }
    directions.reverse();
    directions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::item::{Item, ItemTypeId};
    use crate::events::EventQueue;
    use crate::world::item_types::test_types::*;
    use crate::world::item_types::ItemTypeIndex;
    use crate::world::map::test_support::{creature, grass_map};
    use proptest::prelude::*;

    fn walk(start: Position, path: &[Direction]) -> Position {
        path.iter().fold(start, |position, direction| position.translated(*direction))
    }

    fn wall(map: &mut Map, types: &ItemTypeIndex, x: u16, y: u16) {
        map.add_item(Position::new(x, y, 7), Item::from_provider(ItemTypeId(WALL), 0, types));
    }

    #[test]
    fn open_grid_path_is_chebyshev_long() {
        let types = sample_index();
        let map = grass_map(&types, Position::new(100, 100, 7));
        let start = Position::new(95, 97, 7);
        let goal = Position::new(105, 101, 7);
        let path = map.find_path(start, goal, 20);
        assert_eq!(path.len(), 10);
        assert_eq!(walk(start, &path), goal);
    }

    #[test]
    fn routes_around_a_wall() {
        let types = sample_index();
        let mut map = grass_map(&types, Position::new(100, 100, 7));
        for y in 96..=104 {
            wall(&mut map, &types, 101, y);
        }
        let start = Position::new(99, 100, 7);
        let goal = Position::new(103, 100, 7);
        let path = map.find_path(start, goal, 10);
        assert!(!path.is_empty());
        assert_eq!(walk(start, &path), goal);
        let mut position = start;
        for direction in &path {
            position = position.translated(*direction);
            assert_ne!(position.x, 101, "path crossed the wall at {position}");
        }
    }

    #[test]
    fn occupied_goal_is_still_reachable() {
        let types = sample_index();
        let mut map = grass_map(&types, Position::new(100, 100, 7));
        let goal = Position::new(102, 100, 7);
        map.add_creature(creature(9, "Rat"), goal);
        let path = map.find_path(Position::new(100, 100, 7), goal, 10);
        assert_eq!(path, vec![Direction::East, Direction::East]);
    }

    #[test]
    fn enclosed_goal_yields_empty_path() {
        let types = sample_index();
        let mut map = grass_map(&types, Position::new(100, 100, 7));
        for x in 101..=105 {
            for y in 98..=102 {
                if (x, y) != (103, 100) {
                    wall(&mut map, &types, x, y);
                }
            }
        }
        assert!(map
            .find_path(Position::new(99, 100, 7), Position::new(103, 100, 7), 10)
            .is_empty());
    }

    #[test]
    fn trivial_and_cross_floor_requests_are_empty() {
        let types = sample_index();
        let map = grass_map(&types, Position::new(100, 100, 7));
        let here = Position::new(100, 100, 7);
        assert!(map.find_path(here, here, 10).is_empty());
        assert!(map.find_path(here, Position::new(101, 100, 6), 10).is_empty());
        assert!(map.find_path(here, Position::new(108, 100, 7), 5).is_empty());
    }

    #[test]
    fn unknown_tiles_are_not_walked() {
        let mut map = Map::default();
        let mut events = EventQueue::default();
        map.set_central_position(Position::new(100, 100, 7), &mut events);
        assert!(map
            .find_path(Position::new(100, 100, 7), Position::new(103, 100, 7), 10)
            .is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn open_grid_paths_match_chebyshev_distance(
            sx in 93u16..=108, sy in 95u16..=106,
            gx in 93u16..=108, gy in 95u16..=106,
        ) {
            let types = sample_index();
            let map = grass_map(&types, Position::new(100, 100, 7));
            let start = Position::new(sx, sy, 7);
            let goal = Position::new(gx, gy, 7);
            let path = map.find_path(start, goal, 20);
            prop_assert_eq!(path.len(), usize::from(start.distance(goal)));
            prop_assert_eq!(walk(start, &path), goal);
        }
    }
}
