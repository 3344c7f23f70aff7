use crate::entities::creature::CreatureId;
use crate::entities::effects::Effect;
use crate::entities::item::Item;
use crate::world::item_types::{ZoneFlags, DEFAULT_GROUND_SPEED};
use crate::world::position::Position;
use crate::world::time::GameTick;

/// Things the server describes per tile before a terminating marker is required.
pub const MAX_TILE_THINGS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thing {
    Item(Item),
    Creature(CreatureId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThingRef<'a> {
    Item(&'a Item),
    Creature(CreatureId),
}

/// Flags derived from tile contents; rebuilt on every change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileFlags {
    pub blocking: bool,
    pub blocks_projectile: bool,
    pub blocks_pathfind: bool,
    pub zone: ZoneFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub position: Position,
    ground: Option<Item>,
    items: Vec<Item>,
    creatures: Vec<CreatureId>,
    effects: Vec<Effect>,
    flags: TileFlags,
}

impl Tile {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            ground: None,
            items: Vec::new(),
            creatures: Vec::new(),
            effects: Vec::new(),
            flags: TileFlags::default(),
        }
    }

    pub fn ground(&self) -> Option<&Item> {
        self.ground.as_ref()
    }

    /// Non-ground items, bottom first.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn creatures(&self) -> &[CreatureId] {
        &self.creatures
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn flags(&self) -> TileFlags {
        self.flags
    }

    pub fn thing_count(&self) -> usize {
        usize::from(self.ground.is_some()) + self.items.len() + self.creatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thing_count() == 0 && self.effects.is_empty()
    }

    /// Walkable ignoring creatures: has ground and nothing blocks.
    pub fn is_walkable(&self) -> bool {
        self.ground.is_some() && !self.flags.blocking
    }

    pub fn is_pathable(&self) -> bool {
        self.is_walkable() && !self.flags.blocks_pathfind
    }

    pub fn ground_speed(&self) -> u16 {
        self.ground
            .as_ref()
            .map(|ground| ground.attrs().ground_speed)
            .filter(|speed| *speed > 0)
            .unwrap_or(DEFAULT_GROUND_SPEED)
    }

    pub fn elevation(&self) -> u16 {
        self.items.iter().map(|item| item.attrs().elevation).sum()
    }

    fn items_offset(&self) -> usize {
        usize::from(self.ground.is_some())
    }

    fn creatures_offset(&self) -> usize {
        self.items_offset() + self.items.len()
    }

    pub fn thing_at(&self, stack_pos: usize) -> Option<ThingRef<'_>> {
        if let Some(ground) = self.ground.as_ref() {
            if stack_pos == 0 {
                return Some(ThingRef::Item(ground));
            }
        }
        let index = stack_pos.checked_sub(self.items_offset())?;
        if let Some(item) = self.items.get(index) {
            return Some(ThingRef::Item(item));
        }
        let index = index - self.items.len();
        self.creatures.get(index).copied().map(ThingRef::Creature)
    }

    pub fn creature_at(&self, stack_pos: usize) -> Option<CreatureId> {
        match self.thing_at(stack_pos)? {
            ThingRef::Creature(id) => Some(id),
            ThingRef::Item(_) => None,
        }
    }

    pub fn stack_pos_of(&self, id: CreatureId) -> Option<usize> {
        self.creatures
            .iter()
            .position(|entry| *entry == id)
            .map(|index| self.creatures_offset() + index)
    }

    /// Stack position `id` holds here, or would hold if it stood on this tile.
    pub fn creature_slot(&self, id: CreatureId) -> usize {
        let (Ok(index) | Err(index)) = self.creatures.binary_search(&id);
        self.creatures_offset() + index
    }

    /// Adds an item; ground replaces ground, anything else goes on top of the
    /// item stack. Returns the stack position used.
    pub fn add_item(&mut self, item: Item) -> usize {
        let stack_pos = if item.is_ground() {
            self.ground = Some(item);
            0
        } else {
            self.items.push(item);
            self.creatures_offset() - 1
        };
        self.refresh_flags();
        stack_pos
    }

    /// Creatures stay ordered by id, matching the order peers compute stack positions in.
    pub fn add_creature(&mut self, id: CreatureId) -> usize {
        let index = match self.creatures.binary_search(&id) {
            Ok(index) => return self.creatures_offset() + index,
            Err(index) => index,
        };
        self.creatures.insert(index, id);
        self.creatures_offset() + index
    }

    pub fn remove_creature(&mut self, id: CreatureId) -> bool {
        let before = self.creatures.len();
        self.creatures.retain(|entry| *entry != id);
        before != self.creatures.len()
    }

    pub fn add_thing(&mut self, thing: Thing) -> usize {
        match thing {
            Thing::Item(item) => self.add_item(item),
            Thing::Creature(id) => self.add_creature(id),
        }
    }

    pub fn remove_thing(&mut self, stack_pos: usize) -> Option<Thing> {
        let removed = if self.ground.is_some() && stack_pos == 0 {
            self.ground.take().map(Thing::Item)
        } else {
            let index = stack_pos.checked_sub(self.items_offset())?;
            if index < self.items.len() {
                Some(Thing::Item(self.items.remove(index)))
            } else {
                let index = index - self.items.len();
                (index < self.creatures.len()).then(|| Thing::Creature(self.creatures.remove(index)))
            }
        }?;
        self.refresh_flags();
        Some(removed)
    }

    /// Swaps the item at `stack_pos` for `item`, keeping its layer.
    pub fn transform_item(&mut self, stack_pos: usize, item: Item) -> bool {
        let replaced = if self.ground.is_some() && stack_pos == 0 {
            self.ground = Some(item);
            true
        } else {
            match stack_pos
                .checked_sub(self.items_offset())
                .and_then(|index| self.items.get_mut(index))
            {
                Some(entry) => {
                    *entry = item;
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.refresh_flags();
        }
        replaced
    }

    /// Empties the tile for a fresh description and hands back its creatures.
    pub fn clear(&mut self) -> Vec<CreatureId> {
        self.ground = None;
        self.items.clear();
        self.effects.clear();
        self.flags = TileFlags::default();
        std::mem::take(&mut self.creatures)
    }

    pub fn add_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn expire_effects(&mut self, now: GameTick) -> usize {
        let before = self.effects.len();
        self.effects.retain(|effect| !effect.is_expired(now));
        before - self.effects.len()
    }

    fn refresh_flags(&mut self) {
        let mut flags = TileFlags::default();
        for item in self.ground.iter().chain(self.items.iter()) {
            let attrs = item.attrs();
            flags.blocking |= attrs.unpassable;
            flags.blocks_projectile |= attrs.blocks_projectile;
            flags.blocks_pathfind |= attrs.blocks_pathfind;
            flags.zone = flags.zone.merge(attrs.zone);
        }
        self.flags = flags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::item::ItemTypeId;
    use crate::world::item_types::test_types::*;
    use crate::world::item_types::ItemTypeIndex;

    fn item(types: &ItemTypeIndex, id: u16) -> Item {
        Item::from_provider(ItemTypeId(id), 1, types)
    }

    fn tile_with(types: &ItemTypeIndex, ids: &[u16]) -> Tile {
        let mut tile = Tile::new(Position::new(100, 100, 7));
        for id in ids {
            tile.add_item(item(types, *id));
        }
        tile
    }

    #[test]
    fn stack_positions_run_ground_items_creatures() {
        let types = sample_index();
        let mut tile = tile_with(&types, &[GRASS, GOLD, TORCH]);
        assert_eq!(tile.add_creature(CreatureId(9)), 3);
        assert_eq!(tile.add_creature(CreatureId(4)), 3);
        assert_eq!(tile.stack_pos_of(CreatureId(9)), Some(4));
        assert!(matches!(tile.thing_at(0), Some(ThingRef::Item(item)) if item.is_ground()));
        assert!(matches!(tile.thing_at(2), Some(ThingRef::Item(item)) if item.type_id == ItemTypeId(TORCH)));
        assert_eq!(tile.creature_at(3), Some(CreatureId(4)));
        assert_eq!(tile.thing_at(5), None);
        assert_eq!(tile.thing_count(), 5);
        assert_eq!(tile.creature_slot(CreatureId(9)), 4);
        assert_eq!(tile.creature_slot(CreatureId(6)), 4);
        assert_eq!(tile.creature_slot(CreatureId(12)), 5);
    }

    #[test]
    fn new_ground_replaces_old_ground() {
        let types = sample_index();
        let mut tile = tile_with(&types, &[GRASS, GOLD]);
        assert_eq!(tile.add_item(item(&types, MUD)), 0);
        assert_eq!(tile.thing_count(), 2);
        assert_eq!(tile.ground_speed(), 300);
    }

    #[test]
    fn flags_follow_contents() {
        let types = sample_index();
        let mut tile = tile_with(&types, &[GRASS]);
        assert!(tile.is_walkable());
        let stack_pos = tile.add_item(item(&types, WALL));
        assert!(tile.flags().blocking);
        assert!(tile.flags().blocks_projectile);
        assert!(!tile.is_walkable());
        tile.remove_thing(stack_pos);
        assert_eq!(tile.flags(), TileFlags::default());
        tile.add_item(item(&types, BUSH));
        assert!(tile.is_walkable());
        assert!(!tile.is_pathable());
    }

    #[test]
    fn zone_flags_come_from_ground() {
        let types = sample_index();
        let mut tile = tile_with(&types, &[TEMPLE_FLOOR]);
        assert!(tile.flags().zone.protection_zone);
        assert!(tile.transform_item(0, item(&types, GRASS)));
        assert!(!tile.flags().zone.protection_zone);
    }

    #[test]
    fn tile_without_ground_is_not_walkable() {
        let types = sample_index();
        let tile = tile_with(&types, &[GOLD]);
        assert!(!tile.is_walkable());
        assert_eq!(tile.ground_speed(), DEFAULT_GROUND_SPEED);
    }

    #[test]
    fn clear_returns_creatures_and_resets_flags() {
        let types = sample_index();
        let mut tile = tile_with(&types, &[GRASS, WALL]);
        tile.add_creature(CreatureId(1));
        tile.add_effect(Effect::new(1, GameTick(0)));
        assert_eq!(tile.clear(), vec![CreatureId(1)]);
        assert!(tile.is_empty());
        assert_eq!(tile.flags(), TileFlags::default());
    }

    #[test]
    fn remove_thing_reaches_creatures() {
        let types = sample_index();
        let mut tile = tile_with(&types, &[GRASS]);
        tile.add_creature(CreatureId(3));
        assert_eq!(tile.remove_thing(1), Some(Thing::Creature(CreatureId(3))));
        assert_eq!(tile.remove_thing(1), None);
    }

    #[test]
    fn effects_expire() {
        let mut tile = Tile::new(Position::new(1, 1, 7));
        tile.add_effect(Effect::new(1, GameTick(0)));
        tile.add_effect(Effect::new(2, GameTick(600)));
        assert_eq!(tile.expire_effects(GameTick(1000)), 1);
        assert_eq!(tile.effects().len(), 1);
    }
}
