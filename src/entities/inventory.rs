use crate::entities::item::{Item, ItemTypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventorySlot {
    Head,
    Necklace,
    Backpack,
    Armor,
    RightHand,
    LeftHand,
    Legs,
    Feet,
    Ring,
    Ammo,
}

impl InventorySlot {
    const COUNT: usize = 10;

    /// Wire index of the slot, as sent by the server.
    pub fn index(self) -> usize {
        match self {
            InventorySlot::Head => 0,
            InventorySlot::Necklace => 1,
            InventorySlot::Backpack => 2,
            InventorySlot::Armor => 3,
            InventorySlot::RightHand => 4,
            InventorySlot::LeftHand => 5,
            InventorySlot::Legs => 6,
            InventorySlot::Feet => 7,
            InventorySlot::Ring => 8,
            InventorySlot::Ammo => 9,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        INVENTORY_SLOTS.get(index).copied()
    }
}

pub const INVENTORY_SLOTS: [InventorySlot; 10] = [
    InventorySlot::Head,
    InventorySlot::Necklace,
    InventorySlot::Backpack,
    InventorySlot::Armor,
    InventorySlot::RightHand,
    InventorySlot::LeftHand,
    InventorySlot::Legs,
    InventorySlot::Feet,
    InventorySlot::Ring,
    InventorySlot::Ammo,
];

/// Equipment slots of the local player, mirrored from server updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    slots: Vec<Option<Item>>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            slots: vec![None; InventorySlot::COUNT],
        }
    }
}

impl Inventory {
    pub fn slot(&self, slot: InventorySlot) -> Option<&Item> {
        self.slots.get(slot.index()).and_then(|entry| entry.as_ref())
    }

    /// Replaces the slot content, returning what was there.
    pub fn set_slot(&mut self, slot: InventorySlot, item: Option<Item>) -> Option<Item> {
        self.slots
            .get_mut(slot.index())
            .and_then(|entry| std::mem::replace(entry, item))
    }

    pub fn count_type(&self, type_id: ItemTypeId) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|item| item.type_id == type_id)
            .map(|item| u32::from(item.count.max(1)))
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InventorySlot, &Item)> {
        INVENTORY_SLOTS
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(slot, entry)| entry.as_ref().map(|item| (*slot, item)))
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|entry| *entry = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::item_types::test_types::*;

    #[test]
    fn slot_indices_match_wire_order() {
        for (index, slot) in INVENTORY_SLOTS.iter().enumerate() {
            assert_eq!(slot.index(), index);
            assert_eq!(InventorySlot::from_index(index), Some(*slot));
        }
        assert_eq!(InventorySlot::from_index(10), None);
    }

    #[test]
    fn set_and_reset_slots() {
        let types = sample_index();
        let mut inventory = Inventory::default();
        let coins = Item::from_provider(ItemTypeId(GOLD), 40, &types);
        assert_eq!(inventory.set_slot(InventorySlot::Ammo, Some(coins.clone())), None);
        let torch = Item::from_provider(ItemTypeId(TORCH), 0, &types);
        inventory.set_slot(InventorySlot::LeftHand, Some(torch));
        assert_eq!(inventory.count_type(ItemTypeId(GOLD)), 40);
        assert_eq!(inventory.iter().count(), 2);
        assert_eq!(inventory.set_slot(InventorySlot::Ammo, None), Some(coins));
        assert!(inventory.slot(InventorySlot::Ammo).is_none());
        inventory.clear();
        assert_eq!(inventory.iter().count(), 0);
    }
}
