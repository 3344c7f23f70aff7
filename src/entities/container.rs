use crate::entities::item::Item;
use crate::events::{EventQueue, GameEvent};
use std::collections::BTreeMap;

/// Per-session window id the server assigns.
pub type ContainerId = u8;

/// Paging window for containers larger than one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerPage {
    pub total_size: u16,
    pub first_index: u16,
}

/// An open container window. Slots are 0-based and relative to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: ContainerId,
    pub item: Item,
    pub name: String,
    pub capacity: u8,
    pub has_parent: bool,
    pub unlocked: bool,
    pub page: Option<ContainerPage>,
    items: Vec<Item>,
}

impl Container {
    pub fn new(id: u8, item: Item, name: String, capacity: u8, has_parent: bool) -> Self {
        Self {
            id,
            item,
            name,
            capacity,
            has_parent,
            unlocked: true,
            page: None,
            items: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        self.items = items;
        self.clamp();
        self
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, slot: usize) -> Option<&Item> {
        self.items.get(slot)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= usize::from(self.capacity)
    }

    /// Appends; returns the slot used, `None` when the container is full.
    pub fn add_item(&mut self, item: Item) -> Option<usize> {
        self.insert_item(self.items.len(), item)
    }

    /// Inserts at `slot`, or appends when `slot` is past the end. Items pushed
    /// beyond capacity fall off the end; `None` when that is the new item.
    pub fn insert_item(&mut self, slot: usize, item: Item) -> Option<usize> {
        let slot = slot.min(self.items.len());
        self.items.insert(slot, item);
        self.clamp();
        (slot < self.items.len()).then_some(slot)
    }

    pub fn update_item(&mut self, slot: usize, item: Item) -> bool {
        match self.items.get_mut(slot) {
            Some(entry) => {
                *entry = item;
                true
            }
            None => false,
        }
    }

    pub fn remove_item(&mut self, slot: usize) -> Option<Item> {
        (slot < self.items.len()).then(|| self.items.remove(slot))
    }

    fn clamp(&mut self) {
        let capacity = usize::from(self.capacity);
        if capacity > 0 && self.items.len() > capacity {
            self.items.truncate(capacity);
        }
    }
}

/// Open containers by their per-session id.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    containers: BTreeMap<u8, Container>,
}

impl ContainerRegistry {
    pub fn get(&self, id: u8) -> Option<&Container> {
        self.containers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    /// Opens `container`, replacing any window already using its id.
    pub fn create_container(&mut self, container: Container, events: &mut EventQueue) {
        let id = container.id;
        if self.containers.insert(id, container).is_some() {
            tracing::debug!(container = id, "container reopened in place");
        }
        events.push(GameEvent::ContainerOpened { id });
    }

    pub fn remove_container(&mut self, id: u8, events: &mut EventQueue) -> Option<Container> {
        let removed = self.containers.remove(&id);
        if removed.is_some() {
            events.push(GameEvent::ContainerClosed { id });
        }
        removed
    }

    pub fn add_item(&mut self, id: u8, item: Item, events: &mut EventQueue) -> bool {
        let Some(container) = self.containers.get_mut(&id) else {
            tracing::debug!(container = id, "add to unknown container ignored");
            return false;
        };
        match container.add_item(item) {
            Some(slot) => {
                events.push(GameEvent::ContainerItemAdded { id, slot });
                true
            }
            None => {
                tracing::debug!(container = id, "add to full container dropped");
                false
            }
        }
    }

    pub fn insert_item(&mut self, id: u8, slot: usize, item: Item, events: &mut EventQueue) -> bool {
        let Some(container) = self.containers.get_mut(&id) else {
            tracing::debug!(container = id, slot, "insert into unknown container ignored");
            return false;
        };
        match container.insert_item(slot, item) {
            Some(slot) => {
                events.push(GameEvent::ContainerItemAdded { id, slot });
                true
            }
            None => {
                tracing::debug!(container = id, slot, "insert past full container dropped");
                false
            }
        }
    }

    pub fn update_item(&mut self, id: u8, slot: usize, item: Item, events: &mut EventQueue) -> bool {
        let updated = self
            .containers
            .get_mut(&id)
            .map(|container| container.update_item(slot, item))
            .unwrap_or(false);
        if updated {
            events.push(GameEvent::ContainerItemUpdated { id, slot });
        } else {
            tracing::debug!(container = id, slot, "update of missing container slot ignored");
        }
        updated
    }

    pub fn remove_item(&mut self, id: u8, slot: usize, events: &mut EventQueue) -> Option<Item> {
        let removed = self
            .containers
            .get_mut(&id)
            .and_then(|container| container.remove_item(slot));
        match removed {
            Some(_) => events.push(GameEvent::ContainerItemRemoved { id, slot }),
            None => tracing::debug!(container = id, slot, "remove of missing container slot ignored"),
        }
        removed
    }

    pub fn clear(&mut self) {
        self.containers.clear();
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

    fn bag(types: &ItemTypeIndex, capacity: u8, contents: &[u16]) -> Container {
        Container::new(5, item(types, BAG), "bag".to_string(), capacity, false)
            .with_items(contents.iter().map(|id| item(types, *id)).collect())
    }

    #[test]
    fn remove_shifts_following_slots_down() {
        let types = sample_index();
        let mut events = EventQueue::default();
        let mut registry = ContainerRegistry::default();
        registry.create_container(bag(&types, 8, &[GOLD, TORCH, VIAL]), &mut events);

        let removed = registry.remove_item(5, 1, &mut events).expect("removed");
        assert_eq!(removed.type_id, ItemTypeId(TORCH));
        let container = registry.get(5).expect("open");
        assert_eq!(container.len(), 2);
        assert_eq!(container.item(1).map(|item| item.type_id), Some(ItemTypeId(VIAL)));
        assert_eq!(
            events.drain(),
            vec![
                GameEvent::ContainerOpened { id: 5 },
                GameEvent::ContainerItemRemoved { id: 5, slot: 1 },
            ]
        );
    }

    #[test]
    fn insert_then_remove_restores_list() {
        let types = sample_index();
        let mut container = bag(&types, 8, &[GOLD, TORCH, VIAL]);
        let before = container.items().to_vec();
        for slot in 0..=3 {
            let used = container.insert_item(slot, item(&types, BAG)).expect("kept");
            assert_eq!(used, slot);
            container.remove_item(used);
            assert_eq!(container.items(), before.as_slice());
        }
    }

    #[test]
    fn out_of_range_insert_appends() {
        let types = sample_index();
        let mut container = bag(&types, 8, &[GOLD]);
        assert_eq!(container.insert_item(40, item(&types, TORCH)), Some(1));
        assert_eq!(container.item(1).map(|item| item.type_id), Some(ItemTypeId(TORCH)));
    }

    #[test]
    fn full_container_clamps_instead_of_failing() {
        let types = sample_index();
        let mut container = bag(&types, 2, &[GOLD, TORCH]);
        assert!(container.is_full());
        assert_eq!(container.insert_item(0, item(&types, VIAL)), Some(0));
        assert_eq!(container.len(), 2);
        assert_eq!(
            container.items().iter().map(|item| item.type_id.0).collect::<Vec<_>>(),
            vec![VIAL, GOLD]
        );
    }

    #[test]
    fn full_container_drops_appended_item_silently() {
        let types = sample_index();
        let mut events = EventQueue::default();
        let mut registry = ContainerRegistry::default();
        registry.create_container(bag(&types, 2, &[GOLD, TORCH]), &mut events);
        events.clear();

        assert!(!registry.add_item(5, item(&types, VIAL), &mut events));
        assert!(!registry.insert_item(5, 7, item(&types, VIAL), &mut events));
        let container = registry.get(5).expect("open");
        assert_eq!(
            container.items().iter().map(|item| item.type_id.0).collect::<Vec<_>>(),
            vec![GOLD, TORCH]
        );
        assert!(events.is_empty());

        assert!(registry.insert_item(5, 1, item(&types, VIAL), &mut events));
        assert_eq!(events.drain(), vec![GameEvent::ContainerItemAdded { id: 5, slot: 1 }]);
    }

    #[test]
    fn deltas_for_unknown_containers_are_ignored() {
        let types = sample_index();
        let mut events = EventQueue::default();
        let mut registry = ContainerRegistry::default();
        assert!(!registry.add_item(9, item(&types, GOLD), &mut events));
        assert!(!registry.update_item(9, 0, item(&types, GOLD), &mut events));
        assert!(registry.remove_item(9, 0, &mut events).is_none());
        assert!(registry.remove_container(9, &mut events).is_none());
        assert!(events.is_empty());
    }

    #[test]
    fn reopening_replaces_window() {
        let types = sample_index();
        let mut events = EventQueue::default();
        let mut registry = ContainerRegistry::default();
        registry.create_container(bag(&types, 8, &[GOLD]), &mut events);
        registry.create_container(bag(&types, 8, &[TORCH, VIAL]), &mut events);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(5).map(Container::len), Some(2));
    }
}
