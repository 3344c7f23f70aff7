use crate::entities::item::ItemTypeId;
use crate::world::object_types::{load_object_types, ObjectType, ObjectTypeError, ObjectTypeIndex};
use crate::world::time::Light;
use std::collections::HashMap;
use std::path::Path;

/// Ground speed assumed when a tile has no ground or the ground has none.
pub const DEFAULT_GROUND_SPEED: u16 = 150;

/// Zone flags a tile inherits from any of its items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneFlags {
    pub protection_zone: bool,
    pub no_pvp: bool,
    pub no_logout: bool,
    pub bank_zone: bool,
    pub refresh: bool,
}

impl ZoneFlags {
    pub fn merge(self, other: ZoneFlags) -> ZoneFlags {
        ZoneFlags {
            protection_zone: self.protection_zone || other.protection_zone,
            no_pvp: self.no_pvp || other.no_pvp,
            no_logout: self.no_logout || other.no_logout,
            bank_zone: self.bank_zone || other.bank_zone,
            refresh: self.refresh || other.refresh,
        }
    }
}

/// Per-type attributes the client core needs; copied into every item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThingAttrs {
    pub ground: bool,
    pub ground_speed: u16,
    pub stackable: bool,
    pub fluid: bool,
    pub rune: bool,
    pub unpassable: bool,
    pub blocks_projectile: bool,
    pub blocks_pathfind: bool,
    pub elevation: u16,
    pub light: Light,
    pub zone: ZoneFlags,
}

impl ThingAttrs {
    /// Items of this type carry a count/subtype byte on the wire.
    pub fn has_count(&self) -> bool {
        self.stackable || self.fluid || self.rune
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingType {
    pub id: ItemTypeId,
    pub name: String,
    pub attrs: ThingAttrs,
}

/// Item attribute lookup the decoder and tiles depend on.
pub trait ThingTypeProvider {
    fn thing_type(&self, id: ItemTypeId) -> Option<&ThingType>;

    fn attrs(&self, id: ItemTypeId) -> ThingAttrs {
        self.thing_type(id)
            .map(|thing| thing.attrs)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ItemTypeIndex {
    types: HashMap<ItemTypeId, ThingType>,
}

impl ItemTypeIndex {
    pub fn get(&self, id: ItemTypeId) -> Option<&ThingType> {
        self.types.get(&id)
    }

    pub fn insert(&mut self, thing: ThingType) -> Result<(), String> {
        if self.types.contains_key(&thing.id) {
            return Err(format!("item type {:?} already exists", thing.id));
        }
        self.types.insert(thing.id, thing);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self, ObjectTypeError> {
        Ok(build_item_types(&load_object_types(path)?))
    }
}

impl ThingTypeProvider for ItemTypeIndex {
    fn thing_type(&self, id: ItemTypeId) -> Option<&ThingType> {
        self.types.get(&id)
    }
}

pub fn build_item_types(objects: &ObjectTypeIndex) -> ItemTypeIndex {
    let mut index = ItemTypeIndex::default();
    for (id, object) in objects.iter() {
        index.types.insert(
            *id,
            ThingType {
                id: *id,
                name: object.name.clone(),
                attrs: attrs_from_object(object),
            },
        );
    }
    index
}

fn attrs_from_object(object: &ObjectType) -> ThingAttrs {
    let ground = object.has_flag("Bank");
    let unpassable = object.has_flag("Unpass");
    ThingAttrs {
        ground,
        ground_speed: if ground {
            object.attribute_u16("Waypoints").unwrap_or(DEFAULT_GROUND_SPEED)
        } else {
            0
        },
        stackable: object.has_flag("Cumulative"),
        fluid: object.has_flag("LiquidContainer")
            || object.has_flag("LiquidPool")
            || object.has_flag("LiquidSource"),
        rune: object.has_flag("Rune"),
        unpassable,
        blocks_projectile: object.has_flag("Unthrow"),
        blocks_pathfind: unpassable || object.has_flag("Avoid"),
        elevation: if object.has_flag("Height") {
            object.attribute_u16("Elevation").unwrap_or(8)
        } else {
            0
        },
        light: Light {
            level: object.attribute_u8("Brightness").unwrap_or(0),
            color: object.attribute_u8("LightColor").unwrap_or(0),
        },
        zone: ZoneFlags {
            protection_zone: object.has_flag("ProtectionZone"),
            no_pvp: object.has_flag("NoPvp"),
            no_logout: object.has_flag("NoLogout"),
            bank_zone: object.has_flag("BankZone"),
            refresh: object.has_flag("Refresh"),
        },
    }
}


#[cfg(test)]
mod tests {
    use super::test_types::*;
    use super::*;

    #[test]
    fn object_flags_become_attributes() {
        let index = sample_index();
        let grass = index.attrs(ItemTypeId(GRASS));
        assert!(grass.ground);
        assert_eq!(grass.ground_speed, 150);
        assert!(!grass.has_count());

        let wall = index.attrs(ItemTypeId(WALL));
        assert!(wall.unpassable && wall.blocks_projectile && wall.blocks_pathfind);

        let bush = index.attrs(ItemTypeId(BUSH));
        assert!(!bush.unpassable && bush.blocks_pathfind);

        assert!(index.attrs(ItemTypeId(GOLD)).has_count());
        assert!(index.attrs(ItemTypeId(VIAL)).has_count());
        assert_eq!(index.attrs(ItemTypeId(TORCH)).light, Light { level: 7, color: 206 });

        let temple = index.attrs(ItemTypeId(TEMPLE_FLOOR));
        assert!(temple.zone.protection_zone && temple.zone.no_logout && !temple.zone.no_pvp);
    }

    #[test]
    fn unknown_types_have_plain_attributes() {
        let index = sample_index();
        assert_eq!(index.attrs(ItemTypeId(9999)), ThingAttrs::default());
        assert!(index.get(ItemTypeId(9999)).is_none());
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut index = sample_index();
        let before = index.len();
        let duplicate = ThingType {
            id: ItemTypeId(GRASS),
            name: "grass".to_string(),
            attrs: ThingAttrs::default(),
        };
        assert!(index.insert(duplicate).is_err());
        assert_eq!(index.len(), before);
    }
}
