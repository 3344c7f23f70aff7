use crate::entities::creature::CreatureId;
use crate::entities::inventory::Inventory;
use crate::entities::skills::SkillSet;
use crate::world::movement::MovementController;

/// Character sheet values from the player-data message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub health: u16,
    pub max_health: u16,
    pub capacity: u32,
    pub experience: u32,
    pub level: u16,
    pub level_percent: u8,
    pub mana: u16,
    pub max_mana: u16,
    pub magic_level: u8,
    pub magic_level_percent: u8,
    pub soul: u8,
    pub stamina: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FightModes {
    pub attack_mode: u8,
    pub chase_mode: u8,
    pub secure_mode: bool,
}

impl Default for FightModes {
    fn default() -> Self {
        // Balanced, stand still, secure.
        Self {
            attack_mode: 2,
            chase_mode: 0,
            secure_mode: true,
        }
    }
}

/// What the server tells only the owning client about a player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerData {
    pub stats: PlayerStats,
    pub skills: SkillSet,
    pub inventory: Inventory,
    pub icons: u8,
    pub fight_modes: FightModes,
    pub attack_target: Option<CreatureId>,
    pub follow_target: Option<CreatureId>,
}

/// The player this client controls.
#[derive(Debug, Default)]
pub struct LocalPlayer {
    pub id: Option<CreatureId>,
    pub data: PlayerData,
    pub movement: MovementController,
    pub can_report_bugs: bool,
    pub rights: u8,
}

impl LocalPlayer {
    pub fn is(&self, id: CreatureId) -> bool {
        self.id == Some(id)
    }

    pub fn reset(&mut self) {
        self.id = None;
        self.data = PlayerData::default();
        self.movement.reset();
        self.can_report_bugs = false;
        self.rights = 0;
    }
}
