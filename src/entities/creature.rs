use crate::world::position::{Direction, Position};
use crate::world::time::{GameTick, Light};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreatureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatureKind {
    Player,
    Monster,
    Npc,
    SummonOwn,
    SummonOther,
    Unknown,
}

impl CreatureKind {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => CreatureKind::Player,
            1 => CreatureKind::Monster,
            2 => CreatureKind::Npc,
            3 => CreatureKind::SummonOwn,
            4 => CreatureKind::SummonOther,
            _ => CreatureKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outfit {
    pub look_type: u16,
    pub head: u8,
    pub body: u8,
    pub legs: u8,
    pub feet: u8,
    pub addons: u8,
    pub look_item: u16,
}

/// Walk in progress; offsets are interpolated from `started` over `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkAnimation {
    pub from: Position,
    pub to: Position,
    pub started: GameTick,
    pub duration_ms: u64,
}

impl WalkAnimation {
    pub fn is_finished(&self, now: GameTick) -> bool {
        now.elapsed_since(self.started) >= self.duration_ms
    }

    /// Fraction of the walk already covered, in 0..=1.
    pub fn progress(&self, now: GameTick) -> f32 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        (now.elapsed_since(self.started) as f32 / self.duration_ms as f32).min(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creature {
    pub id: CreatureId,
    pub name: String,
    pub kind: CreatureKind,
    pub position: Position,
    pub direction: Direction,
    pub health_percent: u8,
    pub outfit: Outfit,
    pub light: Light,
    pub speed: u16,
    pub skull: u8,
    pub shield: u8,
    pub emblem: u8,
    pub square: Option<u8>,
    pub unpassable: bool,
    pub walk: Option<WalkAnimation>,
}

impl Creature {
    pub fn new(id: CreatureId, name: String, kind: CreatureKind) -> Self {
        Self {
            id,
            name,
            kind,
            position: Position::INVALID,
            direction: Direction::South,
            health_percent: 100,
            outfit: Outfit::default(),
            light: Light::default(),
            speed: 0,
            skull: 0,
            shield: 0,
            emblem: 0,
            square: None,
            unpassable: true,
            walk: None,
        }
    }

    /// Placeholder for an id the server calls known but the client never saw.
    pub fn stub(id: CreatureId) -> Self {
        Self::new(id, String::new(), CreatureKind::Unknown)
    }

    pub fn is_walking(&self) -> bool {
        self.walk.is_some()
    }

    pub fn start_walk(&mut self, to: Position, now: GameTick, duration_ms: u64) {
        let from = self.position;
        self.direction = from.direction_to(to).facing();
        self.walk = Some(WalkAnimation {
            from,
            to,
            started: now,
            duration_ms,
        });
    }

    pub fn stop_walk(&mut self) {
        self.walk = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_progress_clamps() {
        let mut creature = Creature::new(CreatureId(7), "Rat".to_string(), CreatureKind::Monster);
        creature.position = Position::new(10, 10, 7);
        creature.start_walk(Position::new(11, 11, 7), GameTick(1000), 400);
        assert_eq!(creature.direction, Direction::East);
        let walk = creature.walk.expect("walk");
        assert_eq!(walk.progress(GameTick(1200)), 0.5);
        assert!(!walk.is_finished(GameTick(1399)));
        assert!(walk.is_finished(GameTick(1400)));
        assert_eq!(walk.progress(GameTick(5000)), 1.0);
    }

    #[test]
    fn unknown_kind_bytes_map_to_unknown() {
        assert_eq!(CreatureKind::from_u8(2), CreatureKind::Npc);
        assert_eq!(CreatureKind::from_u8(200), CreatureKind::Unknown);
    }
}
