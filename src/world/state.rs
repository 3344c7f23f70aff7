use crate::entities::container::ContainerRegistry;
use crate::entities::creature::CreatureId;
use crate::entities::item::{Item, ItemTypeId};
use crate::entities::player::LocalPlayer;
use crate::events::{EventQueue, GameEvent};
use crate::world::item_types::ThingTypeProvider;
use crate::world::map::Map;
use crate::world::movement::{WalkError, WalkStep};
use crate::world::position::{Direction, Position};
use crate::world::time::GameClock;
use crate::world::viewport::AwareRange;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A buddy-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VipEntry {
    pub id: u32,
    pub name: String,
    pub online: bool,
}

/// Everything the decoder mutates for one session: the known world, the
/// local player, open containers and the notification queue.
pub struct ClientState {
    pub map: Map,
    pub player: LocalPlayer,
    pub containers: ContainerRegistry,
    pub events: EventQueue,
    pub channels: BTreeMap<u16, String>,
    pub vips: BTreeMap<u32, VipEntry>,
    pub clock: GameClock,
    types: Arc<dyn ThingTypeProvider>,
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("map", &self.map)
            .field("player", &self.player.id)
            .field("containers", &self.containers.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl ClientState {
    pub fn new(types: Arc<dyn ThingTypeProvider>, range: AwareRange, clock: GameClock) -> Self {
        Self {
            map: Map::new(range),
            player: LocalPlayer::default(),
            containers: ContainerRegistry::default(),
            events: EventQueue::default(),
            channels: BTreeMap::new(),
            vips: BTreeMap::new(),
            clock,
            types,
        }
    }

    pub fn types(&self) -> &dyn ThingTypeProvider {
        self.types.as_ref()
    }

    pub fn item(&self, type_id: u16, count: u8) -> Item {
        Item::from_provider(ItemTypeId(type_id), count, self.types.as_ref())
    }

    pub fn player_id(&self) -> Option<CreatureId> {
        self.player.id
    }

    /// Where the local player stands, prediction included.
    pub fn player_position(&self) -> Option<Position> {
        let id = self.player.id?;
        self.map.creature(id).map(|creature| creature.position)
    }

    /// Local walk input; the caller sends the step once this succeeds.
    pub fn walk(&mut self, direction: Direction) -> Result<WalkStep, WalkError> {
        let id = self.player.id.ok_or(WalkError::NoPlayer)?;
        let now = self.clock.now();
        self.player.movement.walk(&mut self.map, id, direction, now)
    }

    /// Plans and queues a walk to `goal`; returns the number of steps.
    pub fn auto_walk_to(&mut self, goal: Position) -> Result<usize, WalkError> {
        let id = self.player.id.ok_or(WalkError::NoPlayer)?;
        self.player.movement.auto_walk_to(&self.map, id, goal)
    }

    /// Advances clocks, animations and the auto-walk queue. Returns the
    /// direction of a newly predicted step that must go to the server.
    pub fn tick(&mut self) -> Option<Direction> {
        let now = self.clock.update();
        self.map.update(now);
        let id = self.player.id?;
        self.player
            .movement
            .update(&mut self.map, id, now, &mut self.events)
    }

    pub fn set_vip(&mut self, entry: VipEntry) {
        self.events.push(GameEvent::VipAdded {
            id: entry.id,
            name: entry.name.clone(),
            online: entry.online,
        });
        self.vips.insert(entry.id, entry);
    }

    pub fn set_vip_online(&mut self, id: u32, online: bool) {
        match self.vips.get_mut(&id) {
            Some(entry) => entry.online = online,
            None => tracing::debug!(vip = id, "state change for unknown vip"),
        }
        self.events.push(GameEvent::VipStateChanged { id, online });
    }

    /// Forgets the world, then the player's data, then any pending movement.
    /// Queued events survive so the caller can still drain them.
    pub fn reset(&mut self) {
        self.map.clear();
        self.containers.clear();
        self.channels.clear();
        self.vips.clear();
        self.player.reset();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::client_state;
    use super::*;
    use crate::world::map::test_support::creature;

    #[test]
    fn walking_needs_a_player() {
        let mut state = client_state();
        assert_eq!(state.walk(Direction::East), Err(WalkError::NoPlayer));
        assert_eq!(
            state.auto_walk_to(Position::new(1, 1, 7)),
            Err(WalkError::NoPlayer)
        );
        assert_eq!(state.tick(), None);
    }

    #[test]
    fn vip_updates_notify() {
        let mut state = client_state();
        state.set_vip(VipEntry {
            id: 7,
            name: "Bubble".to_string(),
            online: false,
        });
        state.set_vip_online(7, true);
        assert!(state.vips.get(&7).map(|entry| entry.online).unwrap_or(false));
        assert_eq!(
            state.events.drain(),
            vec![
                GameEvent::VipAdded {
                    id: 7,
                    name: "Bubble".to_string(),
                    online: false,
                },
                GameEvent::VipStateChanged { id: 7, online: true },
            ]
        );
    }

    #[test]
    fn reset_clears_world_and_player() {
        let mut state = client_state();
        state.player.id = Some(CreatureId(1));
        state.map.add_creature(creature(1, "Knight"), Position::new(100, 100, 7));
        state.channels.insert(4, "Game-Chat".to_string());
        assert_eq!(state.player_position(), Some(Position::new(100, 100, 7)));
        state.reset();
        assert_eq!(state.player_id(), None);
        assert_eq!(state.map.creature_count(), 0);
        assert!(state.channels.is_empty());
        assert_eq!(state.player_position(), None);
    }
}
