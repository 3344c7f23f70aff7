use crate::world::position::{Direction, Position, MAX_FLOOR, SEA_FLOOR};
use serde::{Deserialize, Serialize};

/// Floors above and below the current one known while underground.
pub const UNDERGROUND_FLOOR_RANGE: u8 = 2;

/// Tiles known around the central position, per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwareRange {
    pub left: u16,
    pub right: u16,
    pub top: u16,
    pub bottom: u16,
}

impl Default for AwareRange {
    fn default() -> Self {
        // Classic 18x14 window, centre offset to the north-west.
        Self {
            left: 8,
            right: 9,
            top: 6,
            bottom: 7,
        }
    }
}

impl AwareRange {
    pub fn width(&self) -> u16 {
        self.left + self.right + 1
    }

    pub fn height(&self) -> u16 {
        self.top + self.bottom + 1
    }
}

/// Rectangular cell block, scanned column by column on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub origin: Position,
    pub width: u16,
    pub height: u16,
}

impl Area {
    pub fn cell_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }

    /// Column-major cell order: `index / height` is dx, `index % height` is dy.
    pub fn cell_offset(&self, index: usize) -> (u16, u16) {
        let height = usize::from(self.height.max(1));
        ((index / height) as u16, (index % height) as u16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub center: Position,
    pub range: AwareRange,
}

impl Viewport {
    pub fn from_center(center: Position, range: AwareRange) -> Self {
        Self { center, range }
    }

    pub fn origin(&self) -> Position {
        Position {
            x: self.center.x.saturating_sub(self.range.left),
            y: self.center.y.saturating_sub(self.range.top),
            z: self.center.z,
        }
    }

    pub fn full_area(&self) -> Area {
        Area {
            origin: self.origin(),
            width: self.range.width(),
            height: self.range.height(),
        }
    }

    /// Strip exposed after the centre moved one step in `direction`.
    pub fn strip(&self, direction: Direction) -> Option<Area> {
        let origin = self.origin();
        let (origin, width, height) = match direction {
            Direction::North => (origin, self.range.width(), 1),
            Direction::East => (
                Position {
                    x: self.center.x.saturating_add(self.range.right),
                    ..origin
                },
                1,
                self.range.height(),
            ),
            Direction::South => (
                Position {
                    y: self.center.y.saturating_add(self.range.bottom),
                    ..origin
                },
                self.range.width(),
                1,
            ),
            Direction::West => (origin, 1, self.range.height()),
            _ => return None,
        };
        Some(Area {
            origin,
            width,
            height,
        })
    }

    /// Floors described by a full map description, in wire order.
    pub fn floors(&self) -> Vec<u8> {
        aware_floors(self.center.z)
    }

    pub fn is_floor_visible(&self, z: u8) -> bool {
        let z = i32::from(z);
        let center = i32::from(self.center.z);
        if center <= i32::from(SEA_FLOOR) {
            z <= i32::from(SEA_FLOOR)
        } else {
            z >= center - i32::from(UNDERGROUND_FLOOR_RANGE)
                && z <= (center + i32::from(UNDERGROUND_FLOOR_RANGE)).min(i32::from(MAX_FLOOR))
        }
    }

    /// Perspective shift of floor `z` relative to the centre floor.
    pub fn floor_offset(&self, z: u8) -> i32 {
        i32::from(self.center.z) - i32::from(z)
    }

    pub fn contains(&self, position: Position) -> bool {
        if !position.is_valid() || !self.is_floor_visible(position.z) {
            return false;
        }
        let origin = self.origin();
        let offset = self.floor_offset(position.z);
        let dx = i32::from(position.x) - i32::from(origin.x) - offset;
        let dy = i32::from(position.y) - i32::from(origin.y) - offset;
        dx >= 0
            && dy >= 0
            && dx < i32::from(self.range.width())
            && dy < i32::from(self.range.height())
    }

    /// World position of cell (dx, dy) of `area` drawn on floor `z`.
    pub fn cell_position(&self, area: &Area, dx: u16, dy: u16, z: u8) -> Option<Position> {
        let offset = self.floor_offset(z);
        let x = i32::from(area.origin.x) + i32::from(dx) + offset;
        let y = i32::from(area.origin.y) + i32::from(dy) + offset;
        if x < 0 || y < 0 || x >= i32::from(u16::MAX) || y >= i32::from(u16::MAX) {
            return None;
        }
        Some(Position {
            x: x as u16,
            y: y as u16,
            z,
        })
    }
}

pub fn aware_floors(z: u8) -> Vec<u8> {
    if z > SEA_FLOOR {
        let start = z.saturating_sub(UNDERGROUND_FLOOR_RANGE);
        let end = z.saturating_add(UNDERGROUND_FLOOR_RANGE).min(MAX_FLOOR);
        (start..=end).collect()
    } else {
        (0..=SEA_FLOOR).rev().collect()
    }
}

/// Floors newly exposed after the centre moved one floor, given the new floor.
pub fn floor_change_floors(new_z: u8, moving_up: bool) -> Vec<u8> {
    if moving_up {
        if new_z == SEA_FLOOR {
            (0..=SEA_FLOOR - UNDERGROUND_FLOOR_RANGE).rev().collect()
        } else if new_z > SEA_FLOOR {
            vec![new_z - UNDERGROUND_FLOOR_RANGE]
        } else {
            Vec::new()
        }
    } else if new_z == SEA_FLOOR + 1 {
        (new_z..=new_z + UNDERGROUND_FLOOR_RANGE).collect()
    } else if new_z > SEA_FLOOR + 1 && new_z + UNDERGROUND_FLOOR_RANGE <= MAX_FLOOR {
        vec![new_z + UNDERGROUND_FLOOR_RANGE]
    } else {
        Vec::new()
    }
}
