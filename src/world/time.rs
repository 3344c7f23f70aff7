use std::time::{Duration, Instant};

/// Light source strength and 8-bit palette colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Light {
    pub level: u8,
    pub color: u8,
}

/// Milliseconds since the session clock started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameTick(pub u64);

impl GameTick {
    pub fn elapsed_since(self, earlier: GameTick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn after_millis(self, millis: u64) -> GameTick {
        GameTick(self.0.saturating_add(millis))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockSource {
    Wall(Instant),
    Manual,
}

/// Session clock. Wall-driven at runtime, stepped by hand in tests and replays.
#[derive(Debug, Clone)]
pub struct GameClock {
    source: ClockSource,
    tick: GameTick,
}

impl GameClock {
    pub fn new() -> Self {
        Self {
            source: ClockSource::Wall(Instant::now()),
            tick: GameTick(0),
        }
    }

    pub fn manual() -> Self {
        Self {
            source: ClockSource::Manual,
            tick: GameTick(0),
        }
    }

    pub fn now(&self) -> GameTick {
        self.tick
    }

    /// Refreshes the tick from the wall clock; a manual clock is unchanged.
    pub fn update(&mut self) -> GameTick {
        if let ClockSource::Wall(start) = self.source {
            let elapsed = start.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
            self.tick = GameTick(elapsed.max(self.tick.0));
        }
        self.tick
    }

    pub fn advance(&mut self, millis: u64) -> GameTick {
        self.tick.0 = self.tick.0.saturating_add(millis);
        self.tick
    }

    pub fn advance_duration(&mut self, duration: Duration) -> GameTick {
        let millis = duration.as_millis().min(u128::from(u64::MAX)) as u64;
        self.advance(millis)
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}
