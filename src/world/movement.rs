use crate::entities::creature::CreatureId;
use crate::events::{EventQueue, GameEvent};
use crate::world::item_types::DEFAULT_GROUND_SPEED;
use crate::world::map::Map;
use crate::world::position::{Direction, Position};
use crate::world::time::GameTick;
use std::collections::VecDeque;
use thiserror::Error;

pub const MIN_STEP_DURATION_MS: u64 = 100;
/// Longest path an auto-walk request searches for.
pub const MAX_AUTO_WALK_DISTANCE: u16 = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalkError {
    #[error("no local player on the map")]
    NoPlayer,
    #[error("a step is already in progress")]
    Busy,
    #[error("invalid direction")]
    InvalidDirection,
    #[error("destination {0} is not walkable")]
    Blocked(Position),
    #[error("no path to {0}")]
    NoPath(Position),
}

/// Milliseconds one step takes: `ground_speed * 1000 / speed`, tripled for
/// diagonals, never below [`MIN_STEP_DURATION_MS`].
pub fn step_duration_ms(ground_speed: u16, creature_speed: u16, direction: Direction) -> u64 {
    let mut ground_speed = u64::from(ground_speed.max(1));
    if direction.is_diagonal() {
        ground_speed = ground_speed.saturating_mul(3);
    }
    let creature_speed = u64::from(creature_speed.max(1));
    (ground_speed.saturating_mul(1000) / creature_speed).max(MIN_STEP_DURATION_MS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkStep {
    pub direction: Direction,
    pub from: Position,
    pub to: Position,
    pub started: GameTick,
    pub duration_ms: u64,
}

impl WalkStep {
    pub fn is_finished(&self, now: GameTick) -> bool {
        now.elapsed_since(self.started) >= self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MovementState {
    #[default]
    Idle,
    /// Moved locally, waiting for the server to agree.
    PreWalking(WalkStep),
    /// Server confirmed; animating until the step duration elapses.
    Walking(WalkStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementPhase {
    Idle,
    PreWalking,
    Walking,
    AutoWalking,
}

/// What the decoder should do with a server move of the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMoveOutcome {
    /// The prediction matched; the creature already stands on the destination.
    Confirmed,
    /// The prediction was undone; apply the server move as usual.
    RolledBack,
    /// Nothing was predicted; apply the server move as usual.
    NotPredicted,
}

/// Pre-walk prediction and the auto-walk queue of the local player.
#[derive(Debug, Default)]
pub struct MovementController {
    state: MovementState,
    queue: VecDeque<Direction>,
    auto_walking: bool,
}

impl MovementController {
    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn phase(&self) -> MovementPhase {
        if self.auto_walking {
            return MovementPhase::AutoWalking;
        }
        match self.state {
            MovementState::Idle => MovementPhase::Idle,
            MovementState::PreWalking(_) => MovementPhase::PreWalking,
            MovementState::Walking(_) => MovementPhase::Walking,
        }
    }

    pub fn is_pre_walking(&self) -> bool {
        matches!(self.state, MovementState::PreWalking(_))
    }

    /// The tile a pending prediction left from.
    pub fn predicted_origin(&self) -> Option<Position> {
        match self.state {
            MovementState::PreWalking(step) => Some(step.from),
            _ => None,
        }
    }

    pub fn queued(&self) -> impl Iterator<Item = &Direction> {
        self.queue.iter()
    }

    pub fn is_auto_walking(&self) -> bool {
        self.auto_walking
    }

    /// Local walk input. Cancels any auto-walk and predicts the step.
    pub fn walk(
        &mut self,
        map: &mut Map,
        player: CreatureId,
        direction: Direction,
        now: GameTick,
    ) -> Result<WalkStep, WalkError> {
        self.stop_auto_walk();
        self.pre_walk(map, player, direction, now)
    }

    /// Moves the local player onto the next tile before the server answers.
    pub fn pre_walk(
        &mut self,
        map: &mut Map,
        player: CreatureId,
        direction: Direction,
        now: GameTick,
    ) -> Result<WalkStep, WalkError> {
        if self.state != MovementState::Idle {
            return Err(WalkError::Busy);
        }
        if direction == Direction::Invalid {
            return Err(WalkError::InvalidDirection);
        }
        let (from, speed) = map
            .creature(player)
            .map(|creature| (creature.position, creature.speed))
            .ok_or(WalkError::NoPlayer)?;
        let to = from.translated(direction);
        if !to.is_valid() || !map.is_walkable(to) {
            return Err(WalkError::Blocked(to));
        }
        let ground_speed = map
            .tile(to)
            .map(|tile| tile.ground_speed())
            .unwrap_or(DEFAULT_GROUND_SPEED);
        let step = WalkStep {
            direction,
            from,
            to,
            started: now,
            duration_ms: step_duration_ms(ground_speed, speed, direction),
        };
        if let Some(creature) = map.creature_mut(player) {
            creature.start_walk(to, now, step.duration_ms);
        }
        map.move_creature(player, to);
        self.state = MovementState::PreWalking(step);
        tracing::trace!(%from, %to, duration_ms = step.duration_ms, "pre-walk");
        Ok(step)
    }

    /// Reconciles a server move of the local player with the prediction.
    pub fn on_server_move(
        &mut self,
        map: &mut Map,
        player: CreatureId,
        from: Position,
        to: Position,
        events: &mut EventQueue,
    ) -> ServerMoveOutcome {
        let MovementState::PreWalking(step) = self.state else {
            return ServerMoveOutcome::NotPredicted;
        };
        if step.from == from && step.to == to {
            self.state = MovementState::Walking(step);
            events.push(GameEvent::WalkConfirmed(to));
            return ServerMoveOutcome::Confirmed;
        }
        tracing::debug!(
            predicted = %step.to,
            server = %to,
            "server move disagrees with prediction"
        );
        self.roll_back(map, player, step);
        ServerMoveOutcome::RolledBack
    }

    /// Server refused the last step: put the player back on the exact tile it
    /// left and face it the way the server says.
    pub fn cancel_walk(
        &mut self,
        map: &mut Map,
        player: CreatureId,
        direction: Direction,
        events: &mut EventQueue,
    ) {
        match self.state {
            MovementState::PreWalking(step) => self.roll_back(map, player, step),
            MovementState::Walking(_) => {
                if let Some(creature) = map.creature_mut(player) {
                    creature.stop_walk();
                }
                self.state = MovementState::Idle;
            }
            MovementState::Idle => {}
        }
        if direction != Direction::Invalid {
            if let Some(creature) = map.creature_mut(player) {
                creature.direction = direction;
            }
        }
        let was_auto_walking = self.auto_walking;
        self.clear_queue();
        events.push(GameEvent::WalkCancelled { direction });
        if was_auto_walking {
            events.push(GameEvent::AutoWalkFinished);
        }
    }

    fn roll_back(&mut self, map: &mut Map, player: CreatureId, step: WalkStep) {
        map.move_creature(player, step.from);
        if let Some(creature) = map.creature_mut(player) {
            creature.stop_walk();
        }
        self.state = MovementState::Idle;
    }

    /// Finishes elapsed steps and, when idle, pre-walks the next queued
    /// direction. Returns the direction the caller must send to the server.
    pub fn update(
        &mut self,
        map: &mut Map,
        player: CreatureId,
        now: GameTick,
        events: &mut EventQueue,
    ) -> Option<Direction> {
        if let MovementState::Walking(step) = self.state {
            if step.is_finished(now) {
                if let Some(creature) = map.creature_mut(player) {
                    creature.stop_walk();
                }
                self.state = MovementState::Idle;
            }
        }
        if self.state != MovementState::Idle || !self.auto_walking {
            return None;
        }
        let Some(direction) = self.queue.pop_front() else {
            self.auto_walking = false;
            events.push(GameEvent::AutoWalkFinished);
            return None;
        };
        match self.pre_walk(map, player, direction, now) {
            Ok(_) => Some(direction),
            Err(err) => {
                tracing::debug!(error = %err, "auto-walk stopped");
                if let WalkError::Blocked(position) = err {
                    events.push(GameEvent::WalkBlocked(position));
                }
                self.clear_queue();
                events.push(GameEvent::AutoWalkFinished);
                None
            }
        }
    }

    pub fn set_auto_walk(&mut self, path: Vec<Direction>) {
        self.queue = path.into_iter().collect();
        self.auto_walking = !self.queue.is_empty();
    }

    /// Plans a path from the player's position to `goal` and queues it.
    pub fn auto_walk_to(
        &mut self,
        map: &Map,
        player: CreatureId,
        goal: Position,
    ) -> Result<usize, WalkError> {
        let start = map
            .creature(player)
            .map(|creature| creature.position)
            .ok_or(WalkError::NoPlayer)?;
        let path = map.find_path(start, goal, MAX_AUTO_WALK_DISTANCE);
        if path.is_empty() {
            return Err(WalkError::NoPath(goal));
        }
        let steps = path.len();
        self.set_auto_walk(path);
        Ok(steps)
    }

    pub fn stop_auto_walk(&mut self) {
        self.clear_queue();
    }

    fn clear_queue(&mut self) {
        self.queue.clear();
        self.auto_walking = false;
    }

    /// Drops the pending step without touching the map, for when the server
    /// re-describes the player's surroundings wholesale.
    pub fn forget_step(&mut self) {
        self.state = MovementState::Idle;
        self.clear_queue();
    }

    pub fn reset(&mut self) {
        self.forget_step();
    }
}
