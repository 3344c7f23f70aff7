use crate::entities::creature::{CreatureId, Outfit};
use crate::entities::inventory::InventorySlot;
use crate::net::login::CharacterEntry;
use crate::world::position::{Direction, Position};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalkTarget {
    Position(Position),
    Channel(u16),
    Private,
    Text { arg: Option<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: u16,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopItem {
    pub type_id: u16,
    pub sub_type: u8,
    pub description: String,
    pub weight: u32,
    pub buy_price: u32,
    pub sell_price: u32,
}

/// Notifications for the presentation layer, drained once per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Connected,
    Disconnected { reason: String },
    LoginError(String),
    LoginAdvice(String),
    LoginWait { message: String, seconds: u8 },
    CharacterList {
        characters: Vec<CharacterEntry>,
        premium_days: u16,
    },
    GameStart { player_id: CreatureId },
    Logout,
    Death,
    Ping,
    RightsChanged(u8),
    CentralPositionChanged { old: Position, new: Position },
    CreatureAppeared(CreatureId),
    CreatureRemoved(CreatureId),
    CreatureMoved {
        id: CreatureId,
        from: Position,
        to: Position,
    },
    CreatureTurned { id: CreatureId, direction: Direction },
    CreatureHealth { id: CreatureId, percent: u8 },
    CreatureOutfit { id: CreatureId, outfit: Outfit },
    CreatureSquare { id: CreatureId, color: u8 },
    WalkConfirmed(Position),
    WalkCancelled { direction: Direction },
    WalkBlocked(Position),
    AutoWalkFinished,
    PlayerStats,
    PlayerSkills,
    PlayerIcons(u8),
    TargetCleared,
    InventoryChanged(InventorySlot),
    ContainerOpened { id: u8 },
    ContainerClosed { id: u8 },
    ContainerItemAdded { id: u8, slot: usize },
    ContainerItemUpdated { id: u8, slot: usize },
    ContainerItemRemoved { id: u8, slot: usize },
    WorldLight { level: u8, color: u8 },
    MagicEffect { position: Position, effect: u8 },
    Missile {
        from: Position,
        to: Position,
        missile: u8,
    },
    AnimatedText {
        position: Position,
        color: u8,
        text: String,
    },
    TextMessage { kind: u8, text: String },
    Talk {
        speaker_id: u32,
        name: String,
        kind: u8,
        target: TalkTarget,
        text: String,
    },
    ChannelList(Vec<ChannelInfo>),
    ChannelOpened { id: u16, name: String, own: bool },
    ChannelClosed(u16),
    PrivateChannelOpened(String),
    RuleViolationChannel(u16),
    RuleViolationRemoved(String),
    RuleViolationCancelled(String),
    RuleViolationLocked,
    OutfitDialog { outfit: Outfit },
    VipAdded {
        id: u32,
        name: String,
        online: bool,
    },
    VipStateChanged { id: u32, online: bool },
    ShopOpened(Vec<ShopItem>),
    ShopSellList { money: u32, items: Vec<(u16, u8)> },
    ShopClosed,
    TradeOffer {
        name: String,
        counter: bool,
        item_count: usize,
    },
    TradeClosed,
    EditText {
        window_id: u32,
        item_type: u16,
        max_len: u16,
        text: String,
        author: String,
        date: String,
    },
    EditList {
        list_type: u8,
        id: u32,
        text: String,
    },
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<GameEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: GameEvent) {
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<GameEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameEvent> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_order_and_empties() {
        let mut queue = EventQueue::default();
        queue.push(GameEvent::Ping);
        queue.push(GameEvent::ContainerClosed { id: 1 });
        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.drain(),
            vec![GameEvent::Ping, GameEvent::ContainerClosed { id: 1 }]
        );
        assert!(queue.is_empty());
    }
}
