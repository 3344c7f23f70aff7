use crate::world::item_types::{ThingAttrs, ThingTypeProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemTypeId(pub u16);

/// An item as the client sees it: type, count/subtype and the type's attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub type_id: ItemTypeId,
    pub count: u8,
    attrs: ThingAttrs,
}

impl Item {
    pub fn new(type_id: ItemTypeId, count: u8, attrs: ThingAttrs) -> Self {
        Self {
            type_id,
            count,
            attrs,
        }
    }

    pub fn from_provider(type_id: ItemTypeId, count: u8, types: &dyn ThingTypeProvider) -> Self {
        Self::new(type_id, count, types.attrs(type_id))
    }

    pub fn attrs(&self) -> &ThingAttrs {
        &self.attrs
    }

    pub fn is_ground(&self) -> bool {
        self.attrs.ground
    }

    pub fn is_stackable(&self) -> bool {
        self.attrs.stackable
    }

    pub fn blocks_walk(&self) -> bool {
        self.attrs.unpassable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::item_types::test_types::*;

    #[test]
    fn attributes_come_from_the_provider() {
        let types = sample_index();
        let coins = Item::from_provider(ItemTypeId(GOLD), 25, &types);
        assert!(coins.is_stackable());
        assert!(!coins.is_ground());
        assert_eq!(coins.count, 25);
        let grass = Item::from_provider(ItemTypeId(GRASS), 0, &types);
        assert!(grass.is_ground());
        assert_eq!(grass.attrs().ground_speed, 150);
        assert!(Item::from_provider(ItemTypeId(WALL), 0, &types).blocks_walk());
    }
}
