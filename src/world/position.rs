use std::cmp::Ordering;

/// Sea level; floors 0..=7 are above ground.
pub const SEA_FLOOR: u8 = 7;
pub const MAX_FLOOR: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Northeast,
    Southeast,
    Southwest,
    Northwest,
    /// No direction; what `direction_to` yields for identical positions.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionDelta {
    pub dx: i16,
    pub dy: i16,
    pub dz: i8,
}

impl Position {
    pub const INVALID: Position = Position {
        x: u16::MAX,
        y: u16::MAX,
        z: u8::MAX,
    };

    pub const fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    /// True when no coordinate holds its sentinel.
    pub fn is_valid(self) -> bool {
        self.x != u16::MAX && self.y != u16::MAX && self.z != u8::MAX
    }

    pub fn offset(self, delta: PositionDelta) -> Option<Self> {
        let x = i32::from(self.x) + i32::from(delta.dx);
        let y = i32::from(self.y) + i32::from(delta.dy);
        let z = i16::from(self.z) + i16::from(delta.dz);

        if x < 0 || y < 0 || z < 0 {
            return None;
        }

        if x >= i32::from(u16::MAX) || y >= i32::from(u16::MAX) || z >= i16::from(u8::MAX) {
            return None;
        }

        Some(Self {
            x: x as u16,
            y: y as u16,
            z: z as u8,
        })
    }

    /// Neighbour in `direction`; `Position::INVALID` when it would leave
    /// the coordinate space or the direction is `Invalid`.
    pub fn translated(self, direction: Direction) -> Self {
        if !self.is_valid() {
            return Self::INVALID;
        }
        direction
            .delta()
            .and_then(|delta| self.offset(delta))
            .unwrap_or(Self::INVALID)
    }

    /// Direction of the step from `self` towards `other`, ignoring z.
    pub fn direction_to(self, other: Position) -> Direction {
        let dx = i32::from(other.x) - i32::from(self.x);
        let dy = i32::from(other.y) - i32::from(self.y);
        match (dx.signum(), dy.signum()) {
            (0, -1) => Direction::North,
            (1, 0) => Direction::East,
            (0, 1) => Direction::South,
            (-1, 0) => Direction::West,
            (1, -1) => Direction::Northeast,
            (1, 1) => Direction::Southeast,
            (-1, 1) => Direction::Southwest,
            (-1, -1) => Direction::Northwest,
            _ => Direction::Invalid,
        }
    }

    /// Chebyshev distance on the x/y plane.
    pub fn distance(self, other: Position) -> u16 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    pub fn manhattan_distance(self, other: Position) -> u32 {
        u32::from(self.x.abs_diff(other.x)) + u32::from(self.y.abs_diff(other.y))
    }

    pub fn is_in_range(self, other: Position, range_x: u16, range_y: u16) -> bool {
        self.z == other.z
            && self.x.abs_diff(other.x) <= range_x
            && self.y.abs_diff(other.y) <= range_y
    }

    pub fn is_neighbour(self, other: Position) -> bool {
        self.z == other.z && self.distance(other) == 1
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.z, self.y, self.x).cmp(&(other.z, other.y, other.x))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Northeast,
        Direction::Southeast,
        Direction::Southwest,
        Direction::Northwest,
    ];

    pub fn delta(self) -> Option<PositionDelta> {
        let (dx, dy) = match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::Northeast => (1, -1),
            Direction::Southeast => (1, 1),
            Direction::Southwest => (-1, 1),
            Direction::Northwest => (-1, -1),
            Direction::Invalid => return None,
        };
        Some(PositionDelta { dx, dy, dz: 0 })
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::Northeast => Direction::Southwest,
            Direction::Southeast => Direction::Northwest,
            Direction::Southwest => Direction::Northeast,
            Direction::Northwest => Direction::Southeast,
            Direction::Invalid => Direction::Invalid,
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            Direction::Northeast
                | Direction::Northwest
                | Direction::Southeast
                | Direction::Southwest
        )
    }

    /// Wire value used by creature descriptors and turn/cancel-walk payloads.
    pub fn to_u8(self) -> u8 {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
            Direction::Northeast => 4,
            Direction::Southeast => 5,
            Direction::Southwest => 6,
            Direction::Northwest => 7,
            Direction::Invalid => 8,
        }
    }

    pub fn from_u8(value: u8) -> Direction {
        match value {
            0 => Direction::North,
            1 => Direction::East,
            2 => Direction::South,
            3 => Direction::West,
            4 => Direction::Northeast,
            5 => Direction::Southeast,
            6 => Direction::Southwest,
            7 => Direction::Northwest,
            _ => Direction::Invalid,
        }
    }

    /// Facing a creature keeps after a diagonal step.
    pub fn facing(self) -> Direction {
        match self {
            Direction::Northeast | Direction::Southeast => Direction::East,
            Direction::Northwest | Direction::Southwest => Direction::West,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lcg_next(state: &mut u64) -> u32 {
        *state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (*state >> 32) as u32
    }

    fn negate(delta: PositionDelta) -> PositionDelta {
        PositionDelta {
            dx: -delta.dx,
            dy: -delta.dy,
            dz: -delta.dz,
        }
    }

    #[test]
    fn step_and_back_with_opposites() {
        let origin = Position::new(100, 100, 7);
        for direction in Direction::ALL {
            let next = origin.translated(direction);
            assert!(next.is_valid());
            assert_eq!(next.translated(direction.opposite()), origin);
            assert_eq!(origin.direction_to(next), direction);
        }
    }

    #[test]
    fn offset_then_negated_offset_restores() {
        let mut state = 0xfeed_face_cafe_beef;
        for _ in 0..256 {
            let x = 200 + (lcg_next(&mut state) % 100) as u16;
            let y = 200 + (lcg_next(&mut state) % 100) as u16;
            let delta = PositionDelta {
                dx: (lcg_next(&mut state) % 7) as i16 - 3,
                dy: (lcg_next(&mut state) % 7) as i16 - 3,
                dz: 0,
            };
            let origin = Position::new(x, y, 7);
            let next = origin.offset(delta).expect("inside bounds");
            assert_eq!(next.offset(negate(delta)), Some(origin));
        }
    }

    #[test]
    fn sentinels_propagate() {
        assert!(!Position::INVALID.is_valid());
        assert_eq!(Position::INVALID.translated(Direction::North), Position::INVALID);
        assert_eq!(Position::new(5, 5, 7).translated(Direction::Invalid), Position::INVALID);
        assert_eq!(Position::new(0, 5, 7).translated(Direction::West), Position::INVALID);
        let here = Position::new(5, 5, 7);
        assert_eq!(here.direction_to(here), Direction::Invalid);
    }

    #[test]
    fn ordering_is_floor_then_row_then_column() {
        let mut positions = vec![
            Position::new(1, 2, 8),
            Position::new(9, 1, 7),
            Position::new(2, 2, 7),
            Position::new(1, 2, 7),
        ];
        positions.sort();
        assert_eq!(
            positions,
            vec![
                Position::new(9, 1, 7),
                Position::new(1, 2, 7),
                Position::new(2, 2, 7),
                Position::new(1, 2, 8),
            ]
        );
    }

    #[test]
    fn wire_direction_values_match_protocol_order() {
        for value in 0..8u8 {
            assert_eq!(Direction::from_u8(value).to_u8(), value);
        }
        assert_eq!(Direction::from_u8(1), Direction::East);
        assert_eq!(Direction::from_u8(9), Direction::Invalid);
    }

    #[test]
    fn distances() {
        let a = Position::new(100, 100, 7);
        let b = Position::new(103, 98, 7);
        assert_eq!(a.distance(b), 3);
        assert_eq!(a.manhattan_distance(b), 5);
        assert!(a.is_in_range(b, 3, 2));
        assert!(!a.is_in_range(Position::new(103, 98, 6), 3, 2));
    }

    proptest! {
        #[test]
        fn translated_then_direction_back_is_opposite(
            x in 1u16..0xfffd,
            y in 1u16..0xfffd,
            z in 0u8..=15,
            index in 0usize..8,
        ) {
            let origin = Position::new(x, y, z);
            let direction = Direction::ALL[index];
            let moved = origin.translated(direction);
            prop_assert!(moved.is_valid());
            prop_assert_eq!(moved.direction_to(origin), direction.opposite());
        }
    }
}
