use crate::entities::creature::{Creature, CreatureId};
use crate::entities::effects::{AnimatedText, Effect, Missile};
use crate::entities::item::Item;
use crate::events::{EventQueue, GameEvent};
use crate::world::pathfinding;
use crate::world::position::{Direction, Position};
use crate::world::tile::{Thing, ThingRef, Tile};
use crate::world::time::{GameTick, Light};
use crate::world::viewport::{AwareRange, Viewport};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Creatures remembered after their tile was cleared, for later `known` markers.
pub const DEPARTED_CACHE_SIZE: usize = 256;

/// Every tile and creature the client knows about, around one central position.
pub struct Map {
    tiles: HashMap<Position, Tile>,
    creatures: HashMap<CreatureId, Creature>,
    departed: LruCache<CreatureId, Creature>,
    central: Position,
    range: AwareRange,
    light: Light,
    missiles: Vec<Missile>,
    animated_texts: Vec<AnimatedText>,
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("central", &self.central)
            .field("tiles", &self.tiles.len())
            .field("creatures", &self.creatures.len())
            .field("departed", &self.departed.len())
            .finish()
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new(AwareRange::default())
    }
}

impl Map {
    pub fn new(range: AwareRange) -> Self {
        let capacity = NonZeroUsize::new(DEPARTED_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            tiles: HashMap::new(),
            creatures: HashMap::new(),
            departed: LruCache::new(capacity),
            central: Position::INVALID,
            range,
            light: Light::default(),
            missiles: Vec::new(),
            animated_texts: Vec::new(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::from_center(self.central, self.range)
    }

    pub fn aware_range(&self) -> AwareRange {
        self.range
    }

    pub fn central_position(&self) -> Position {
        self.central
    }

    pub fn set_central_position(&mut self, position: Position, events: &mut EventQueue) {
        let old = std::mem::replace(&mut self.central, position);
        if old != position {
            tracing::trace!(%old, new = %position, "central position changed");
            events.push(GameEvent::CentralPositionChanged { old, new: position });
        }
    }

    pub fn is_floor_visible(&self, z: u8) -> bool {
        self.central.is_valid() && self.viewport().is_floor_visible(z)
    }

    pub fn is_aware_of(&self, position: Position) -> bool {
        self.central.is_valid() && self.viewport().contains(position)
    }

    pub fn is_evictable(&self, position: Position) -> bool {
        !self.is_aware_of(position)
    }

    /// Drops tiles that left the aware window. Their creatures go to the
    /// departed cache.
    pub fn evict_unaware_tiles(&mut self) -> usize {
        let viewport = self.viewport();
        let evict: Vec<Position> = self
            .tiles
            .keys()
            .filter(|position| !viewport.contains(**position))
            .copied()
            .collect();
        for position in &evict {
            if let Some(mut tile) = self.tiles.remove(position) {
                for id in tile.clear() {
                    self.depart(id);
                }
            }
        }
        if !evict.is_empty() {
            tracing::debug!(count = evict.len(), "evicted tiles outside aware window");
        }
        evict.len()
    }

    pub fn tile(&self, position: Position) -> Option<&Tile> {
        self.tiles.get(&position)
    }

    pub fn tile_mut(&mut self, position: Position) -> Option<&mut Tile> {
        self.tiles.get_mut(&position)
    }

    pub fn get_or_create_tile(&mut self, position: Position) -> &mut Tile {
        self.tiles
            .entry(position)
            .or_insert_with(|| Tile::new(position))
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Empties a tile ahead of its re-description.
    pub fn clean_tile(&mut self, position: Position) {
        let Some(tile) = self.tiles.get_mut(&position) else {
            return;
        };
        for id in tile.clear() {
            self.depart(id);
        }
    }

    /// Takes a creature out of view but remembers it for a later `known` marker.
    pub fn depart(&mut self, id: CreatureId) {
        let Some(creature) = self.creatures.remove(&id) else {
            return;
        };
        if let Some(tile) = self.tiles.get_mut(&creature.position) {
            tile.remove_creature(id);
        }
        self.departed.put(id, creature);
    }

    pub fn creature(&self, id: CreatureId) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub fn creature_mut(&mut self, id: CreatureId) -> Option<&mut Creature> {
        self.creatures.get_mut(&id)
    }

    pub fn creature_count(&self) -> usize {
        self.creatures.len()
    }

    pub fn creatures(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.values()
    }

    pub fn departed_count(&self) -> usize {
        self.departed.len()
    }

    /// Places `creature` on the tile at `position`, taking it off any tile it
    /// was on. Returns the stack position it landed at.
    pub fn add_creature(&mut self, mut creature: Creature, position: Position) -> usize {
        let id = creature.id;
        if let Some(existing) = self.creatures.remove(&id) {
            if let Some(tile) = self.tiles.get_mut(&existing.position) {
                tile.remove_creature(id);
            }
        }
        self.departed.pop(&id);
        creature.position = position;
        let stack_pos = self.get_or_create_tile(position).add_creature(id);
        self.creatures.insert(id, creature);
        stack_pos
    }

    /// Forgets a creature entirely.
    pub fn remove_creature(&mut self, id: CreatureId) -> Option<Creature> {
        self.departed.pop(&id);
        let creature = self.creatures.remove(&id)?;
        if let Some(tile) = self.tiles.get_mut(&creature.position) {
            tile.remove_creature(id);
        }
        Some(creature)
    }

    /// Takes a creature the server calls known out of the arena or the
    /// departed cache, or makes a stub when the client never saw it.
    pub fn take_known_creature(&mut self, id: CreatureId) -> Creature {
        if let Some(creature) = self.remove_creature_keep_cache(id) {
            return creature;
        }
        if let Some(creature) = self.departed.pop(&id) {
            return creature;
        }
        tracing::debug!(creature = id.0, "known creature missing, using stub");
        Creature::stub(id)
    }

    fn remove_creature_keep_cache(&mut self, id: CreatureId) -> Option<Creature> {
        let creature = self.creatures.remove(&id)?;
        if let Some(tile) = self.tiles.get_mut(&creature.position) {
            tile.remove_creature(id);
        }
        Some(creature)
    }

    /// Transfers a creature onto the exact tile at `to`.
    pub fn move_creature(&mut self, id: CreatureId, to: Position) -> Option<usize> {
        let from = self.creatures.get(&id)?.position;
        if let Some(tile) = self.tiles.get_mut(&from) {
            tile.remove_creature(id);
        }
        let stack_pos = self.get_or_create_tile(to).add_creature(id);
        if let Some(creature) = self.creatures.get_mut(&id) {
            creature.position = to;
        }
        Some(stack_pos)
    }

    pub fn add_item(&mut self, position: Position, item: Item) -> usize {
        self.get_or_create_tile(position).add_item(item)
    }

    /// Adds an item, or moves an arena creature, onto `position`.
    pub fn add_thing(&mut self, position: Position, thing: Thing) -> Option<usize> {
        match thing {
            Thing::Item(item) => Some(self.add_item(position, item)),
            Thing::Creature(id) => self.move_creature(id, position),
        }
    }

    pub fn thing_at(&self, position: Position, stack_pos: usize) -> Option<ThingRef<'_>> {
        self.tiles.get(&position)?.thing_at(stack_pos)
    }

    /// Removes the thing at `stack_pos`; a removed creature leaves view but
    /// stays in the departed cache.
    pub fn remove_thing(&mut self, position: Position, stack_pos: usize) -> Option<Thing> {
        let removed = self.tiles.get_mut(&position)?.remove_thing(stack_pos)?;
        if let Thing::Creature(id) = &removed {
            self.depart(*id);
        }
        Some(removed)
    }

    pub fn transform_thing(&mut self, position: Position, stack_pos: usize, item: Item) -> bool {
        self.tiles
            .get_mut(&position)
            .map(|tile| tile.transform_item(stack_pos, item))
            .unwrap_or(false)
    }

    /// Creatures within `radius` (Chebyshev, same floor) of `position`.
    pub fn creatures_in_range(&self, position: Position, radius: u16) -> Vec<&Creature> {
        let mut found: Vec<&Creature> = self
            .creatures
            .values()
            .filter(|creature| creature.position.is_in_range(position, radius, radius))
            .collect();
        found.sort_by_key(|creature| (creature.position.distance(position), creature.id));
        found
    }

    /// Ground present, nothing unpassable, no blocking creature.
    pub fn is_walkable(&self, position: Position) -> bool {
        let Some(tile) = self.tiles.get(&position) else {
            return false;
        };
        tile.is_walkable()
            && !tile.creatures().iter().any(|id| {
                self.creatures
                    .get(id)
                    .map(|creature| creature.unpassable)
                    .unwrap_or(false)
            })
    }

    pub fn is_pathable(&self, position: Position) -> bool {
        self.is_walkable(position)
            && self
                .tiles
                .get(&position)
                .map(|tile| !tile.flags().blocks_pathfind)
                .unwrap_or(false)
    }

    pub fn find_path(&self, start: Position, goal: Position, max_distance: u16) -> Vec<Direction> {
        pathfinding::find_path(self, start, goal, max_distance)
    }

    pub fn light(&self) -> Light {
        self.light
    }

    pub fn set_light(&mut self, light: Light) {
        self.light = light;
    }

    pub fn add_effect(&mut self, position: Position, effect: u8, now: GameTick) {
        if !self.is_aware_of(position) {
            return;
        }
        self.get_or_create_tile(position)
            .add_effect(Effect::new(effect, now));
    }

    pub fn add_missile(&mut self, missile: Missile) {
        self.missiles.push(missile);
    }

    pub fn missiles(&self) -> &[Missile] {
        &self.missiles
    }

    pub fn add_animated_text(&mut self, text: AnimatedText) {
        self.animated_texts.push(text);
    }

    pub fn animated_texts(&self) -> &[AnimatedText] {
        &self.animated_texts
    }

    /// Drops expired effects and ends finished walk animations.
    pub fn update(&mut self, now: GameTick) {
        for tile in self.tiles.values_mut() {
            tile.expire_effects(now);
        }
        self.missiles.retain(|missile| !missile.is_expired(now));
        self.animated_texts.retain(|text| !text.is_expired(now));
        for creature in self.creatures.values_mut() {
            if creature.walk.map(|walk| walk.is_finished(now)).unwrap_or(false) {
                creature.stop_walk();
            }
        }
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
        self.creatures.clear();
        self.departed.clear();
        self.central = Position::INVALID;
        self.light = Light::default();
        self.missiles.clear();
        self.animated_texts.clear();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::entities::creature::CreatureKind;
    use crate::entities::item::ItemTypeId;
    use crate::world::item_types::test_types::GRASS;
    use crate::world::item_types::ItemTypeIndex;

    /// Map centred on `center` with grass over the whole aware window of its floor.
    pub fn grass_map(types: &ItemTypeIndex, center: Position) -> Map {
        let mut map = Map::default();
        let mut events = EventQueue::default();
        map.set_central_position(center, &mut events);
        let area = map.viewport().full_area();
        for index in 0..area.cell_count() {
            let (dx, dy) = area.cell_offset(index);
            let position = Position::new(area.origin.x + dx, area.origin.y + dy, center.z);
            map.add_item(position, Item::from_provider(ItemTypeId(GRASS), 0, types));
        }
        map
    }

    pub fn creature(id: u32, name: &str) -> Creature {
        let mut creature = Creature::new(CreatureId(id), name.to_string(), CreatureKind::Player);
        creature.speed = 220;
        creature
    }
}
