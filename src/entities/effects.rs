use crate::world::position::Position;
use crate::world::time::GameTick;

pub const EFFECT_DURATION_MS: u64 = 1000;
pub const ANIMATED_TEXT_DURATION_MS: u64 = 1000;
const MISSILE_MS_PER_TILE: f32 = 150.0;

/// Magic effect playing on one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    pub id: u8,
    pub started: GameTick,
    pub expires_at: GameTick,
}

impl Effect {
    pub fn new(id: u8, now: GameTick) -> Self {
        Self {
            id,
            started: now,
            expires_at: now.after_millis(EFFECT_DURATION_MS),
        }
    }

    pub fn is_expired(&self, now: GameTick) -> bool {
        now >= self.expires_at
    }
}

/// Projectile travelling between two tiles; lives on the map, not on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Missile {
    pub id: u8,
    pub from: Position,
    pub to: Position,
    pub started: GameTick,
    pub expires_at: GameTick,
}

impl Missile {
    pub fn new(id: u8, from: Position, to: Position, now: GameTick) -> Self {
        let dx = f32::from(from.x.abs_diff(to.x));
        let dy = f32::from(from.y.abs_diff(to.y));
        let duration = (MISSILE_MS_PER_TILE * (dx * dx + dy * dy).sqrt()) as u64;
        Self {
            id,
            from,
            to,
            started: now,
            expires_at: now.after_millis(duration),
        }
    }

    pub fn is_expired(&self, now: GameTick) -> bool {
        now >= self.expires_at
    }
}

/// Floating text such as damage numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimatedText {
    pub position: Position,
    pub color: u8,
    pub text: String,
    pub expires_at: GameTick,
}

impl AnimatedText {
    pub fn new(position: Position, color: u8, text: String, now: GameTick) -> Self {
        Self {
            position,
            color,
            text,
            expires_at: now.after_millis(ANIMATED_TEXT_DURATION_MS),
        }
    }

    pub fn is_expired(&self, now: GameTick) -> bool {
        now >= self.expires_at
    }
}
