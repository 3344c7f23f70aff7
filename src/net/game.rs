use crate::entities::container::{Container, ContainerPage};
use crate::entities::creature::{Creature, CreatureId, CreatureKind, Outfit};
use crate::entities::effects::{AnimatedText, Missile};
use crate::entities::inventory::InventorySlot;
use crate::entities::item::Item;
use crate::entities::player::PlayerStats;
use crate::entities::skills::{SkillLevel, SkillSet};
use crate::events::{ChannelInfo, GameEvent, ShopItem, TalkTarget};
use crate::net::packet::{PacketError, PacketReader, MAX_STRING_LEN};
use crate::world::movement::{step_duration_ms, ServerMoveOutcome};
use crate::world::position::{Direction, Position};
use crate::world::state::{ClientState, VipEntry};
use crate::world::tile::{Thing, MAX_TILE_THINGS};
use crate::world::time::Light;
use crate::world::viewport::{floor_change_floors, Area};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OPCODE_INIT_GAME: u8 = 0x0a;
pub const OPCODE_RIGHTS: u8 = 0x0b;
pub const OPCODE_LOGIN_ERROR: u8 = 0x14;
pub const OPCODE_LOGIN_ADVICE: u8 = 0x15;
pub const OPCODE_LOGIN_WAIT: u8 = 0x16;
pub const OPCODE_PING: u8 = 0x1e;
pub const OPCODE_DEATH: u8 = 0x28;
pub const OPCODE_MAP_DESCRIPTION: u8 = 0x64;
pub const OPCODE_MAP_ROW_NORTH: u8 = 0x65;
pub const OPCODE_MAP_ROW_EAST: u8 = 0x66;
pub const OPCODE_MAP_ROW_SOUTH: u8 = 0x67;
pub const OPCODE_MAP_ROW_WEST: u8 = 0x68;
pub const OPCODE_FIELD_DATA: u8 = 0x69;
pub const OPCODE_TILE_ADD_THING: u8 = 0x6a;
pub const OPCODE_TILE_CHANGE_THING: u8 = 0x6b;
pub const OPCODE_TILE_REMOVE_THING: u8 = 0x6c;
pub const OPCODE_MOVE_CREATURE: u8 = 0x6d;
pub const OPCODE_OPEN_CONTAINER: u8 = 0x6e;
pub const OPCODE_CLOSE_CONTAINER: u8 = 0x6f;
pub const OPCODE_CONTAINER_ADD: u8 = 0x70;
pub const OPCODE_CONTAINER_UPDATE: u8 = 0x71;
pub const OPCODE_CONTAINER_REMOVE: u8 = 0x72;
pub const OPCODE_INVENTORY_SET: u8 = 0x78;
pub const OPCODE_INVENTORY_RESET: u8 = 0x79;
pub const OPCODE_SHOP_OPEN: u8 = 0x7a;
pub const OPCODE_SHOP_SELL_LIST: u8 = 0x7b;
pub const OPCODE_SHOP_CLOSE: u8 = 0x7c;
pub const OPCODE_TRADE_OFFER: u8 = 0x7d;
pub const OPCODE_TRADE_COUNTER: u8 = 0x7e;
pub const OPCODE_TRADE_CLOSE: u8 = 0x7f;
pub const OPCODE_OUTFIT_DIALOG_LEGACY_MALE: u8 = 0x80;
pub const OPCODE_WORLD_LIGHT: u8 = 0x82;
pub const OPCODE_GRAPHICAL_EFFECT: u8 = 0x83;
pub const OPCODE_TEXTUAL_EFFECT: u8 = 0x84;
pub const OPCODE_MISSILE_EFFECT: u8 = 0x85;
pub const OPCODE_CREATURE_MARK: u8 = 0x86;
pub const OPCODE_OUTFIT_DIALOG_LEGACY_FEMALE: u8 = 0x88;
pub const OPCODE_CREATURE_HEALTH: u8 = 0x8c;
pub const OPCODE_CREATURE_LIGHT: u8 = 0x8d;
pub const OPCODE_CREATURE_OUTFIT: u8 = 0x8e;
pub const OPCODE_CREATURE_SPEED: u8 = 0x8f;
pub const OPCODE_CREATURE_SKULL: u8 = 0x90;
pub const OPCODE_CREATURE_PARTY: u8 = 0x91;
pub const OPCODE_EDIT_TEXT: u8 = 0x96;
pub const OPCODE_EDIT_LIST: u8 = 0x97;
pub const OPCODE_PLAYER_DATA: u8 = 0xa0;
pub const OPCODE_PLAYER_SKILLS: u8 = 0xa1;
pub const OPCODE_PLAYER_STATE: u8 = 0xa2;
pub const OPCODE_CLEAR_TARGET: u8 = 0xa3;
pub const OPCODE_TALK: u8 = 0xaa;
pub const OPCODE_CHANNEL_LIST: u8 = 0xab;
pub const OPCODE_OPEN_CHANNEL: u8 = 0xac;
pub const OPCODE_PRIVATE_CHANNEL: u8 = 0xad;
pub const OPCODE_OPEN_REQUEST_QUEUE: u8 = 0xae;
pub const OPCODE_DELETE_REQUEST: u8 = 0xaf;
pub const OPCODE_FINISH_REQUEST: u8 = 0xb0;
pub const OPCODE_CLOSE_REQUEST: u8 = 0xb1;
pub const OPCODE_OPEN_OWN_CHANNEL: u8 = 0xb2;
pub const OPCODE_CLOSE_CHANNEL: u8 = 0xb3;
pub const OPCODE_MESSAGE: u8 = 0xb4;
pub const OPCODE_SNAPBACK: u8 = 0xb5;
pub const OPCODE_FLOOR_CHANGE_UP: u8 = 0xbe;
pub const OPCODE_FLOOR_CHANGE_DOWN: u8 = 0xbf;
pub const OPCODE_OUTFIT_DIALOG: u8 = 0xc8;
pub const OPCODE_BUDDY_DATA: u8 = 0xd2;
pub const OPCODE_BUDDY_STATUS_ONLINE: u8 = 0xd3;
pub const OPCODE_BUDDY_STATUS_OFFLINE: u8 = 0xd4;

const CREATURE_MARKER_NEW: u16 = 0x0061;
const CREATURE_MARKER_KNOWN: u16 = 0x0062;
const CREATURE_MARKER_TURN: u16 = 0x0063;
/// Values from here up end a tile description; the low byte counts skipped cells.
const SKIP_MARKER: u16 = 0xff00;

const TALK_TYPES_POSITION: [u8; 5] = [0x01, 0x02, 0x03, 0x10, 0x11];
const TALK_TYPES_CHANNEL: [u8; 4] = [0x05, 0x0a, 0x0c, 0x0e];
const TALK_TYPES_PRIVATE: [u8; 2] = [0x04, 0x0b];
const TALK_TYPES_TEXT: [u8; 4] = [0x06, 0x07, 0x08, 0x09];
const TALK_TYPE_RULE_VIOLATION: u8 = 0x06;

/// Optional wire fields newer servers add. `legacy()` matches the plain
/// 7.x layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolFeatures {
    /// Game frames after the login message are XTEA sealed.
    pub xtea: bool,
    /// New-creature markers carry a kind byte before the name.
    pub creature_type: bool,
    /// New-creature descriptions end with a guild emblem byte.
    pub creature_emblem: bool,
    /// Creature descriptions end with an unpassable flag.
    pub creature_unpassable: bool,
    pub look_type_u16: bool,
    pub container_pagination: bool,
}

impl ProtocolFeatures {
    pub const fn legacy() -> Self {
        Self {
            xtea: false,
            creature_type: false,
            creature_emblem: false,
            creature_unpassable: false,
            look_type_u16: false,
            container_pagination: false,
        }
    }
}

impl Default for ProtocolFeatures {
    fn default() -> Self {
        Self::legacy()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Packet(#[from] PacketError),
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("tile {0} describes more than 10 things")]
    TooManyThings(Position),
    #[error("opcode 0x{0:02x} needs a central position")]
    NoCentralPosition(u8),
    #[error("unknown talk type 0x{0:02x}")]
    UnknownTalkType(u8),
}

/// Running totals over the life of a decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames: u64,
    pub messages: u64,
    pub unknown_opcodes: u64,
    pub errors: u64,
}

/// Messages the session itself has to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    GameStarted(CreatureId),
    Ping,
    LoginRejected(String),
    Death,
}

/// Outcome of one frame: the messages applied before any error, and the
/// error that cut the frame short.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub messages: usize,
    pub signals: Vec<Signal>,
    pub error: Option<DecodeError>,
}

enum DecodedThing {
    Item(Item),
    Creature(Creature),
}

/// Applies server messages to a [`ClientState`], strictly in arrival order.
#[derive(Debug, Default)]
pub struct ProtocolDecoder {
    features: ProtocolFeatures,
    stats: DecodeStats,
}

impl ProtocolDecoder {
    pub fn new(features: ProtocolFeatures) -> Self {
        Self {
            features,
            stats: DecodeStats::default(),
        }
    }

    pub fn features(&self) -> ProtocolFeatures {
        self.features
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Decodes every message in `frame`. The first failing message ends the
    /// frame; whatever came before it stays applied.
    pub fn decode_frame(&mut self, state: &mut ClientState, frame: &[u8]) -> FrameReport {
        self.stats.frames += 1;
        let mut report = FrameReport::default();
        let mut reader = PacketReader::new(frame);
        while !reader.is_empty() {
            let offset = reader.position();
            let result = reader
                .read_u8()
                .map_err(DecodeError::from)
                .and_then(|opcode| {
                    self.decode_message(state, opcode, &mut reader, &mut report.signals)
                });
            match result {
                Ok(()) => {
                    report.messages += 1;
                    self.stats.messages += 1;
                }
                Err(err) => {
                    if let DecodeError::UnknownOpcode(opcode) = err {
                        self.stats.unknown_opcodes += 1;
                        tracing::warn!(
                            opcode = format_args!("0x{opcode:02x}"),
                            offset,
                            skipped = frame.len() - offset,
                            "unknown opcode, dropping rest of frame"
                        );
                    } else {
                        self.stats.errors += 1;
                        tracing::warn!(error = %err, offset, "message decode failed");
                    }
                    report.error = Some(err);
                    break;
                }
            }
        }
        report
    }

    fn decode_message(
        &mut self,
        state: &mut ClientState,
        opcode: u8,
        reader: &mut PacketReader<'_>,
        signals: &mut Vec<Signal>,
    ) -> Result<(), DecodeError> {
        tracing::trace!(opcode = format_args!("0x{opcode:02x}"), "message");
        match opcode {
            OPCODE_INIT_GAME => {
                let id = CreatureId(reader.read_u32_le()?);
                let _beat = reader.read_u16_le()?;
                state.player.can_report_bugs = reader.read_bool()?;
                state.player.id = Some(id);
                tracing::info!(player = id.0, "entered game world");
                state.events.push(GameEvent::GameStart { player_id: id });
                signals.push(Signal::GameStarted(id));
            }
            OPCODE_RIGHTS => {
                let rights = reader.read_u8()?;
                state.player.rights = rights;
                state.events.push(GameEvent::RightsChanged(rights));
            }
            OPCODE_LOGIN_ERROR => {
                let message = reader.read_string()?;
                tracing::warn!(%message, "game login rejected");
                state.events.push(GameEvent::LoginError(message.clone()));
                signals.push(Signal::LoginRejected(message));
            }
            OPCODE_LOGIN_ADVICE => {
                let message = reader.read_string()?;
                state.events.push(GameEvent::LoginAdvice(message));
            }
            OPCODE_LOGIN_WAIT => {
                let message = reader.read_string()?;
                let seconds = reader.read_u8()?;
                state.events.push(GameEvent::LoginWait {
                    message: message.clone(),
                    seconds,
                });
                signals.push(Signal::LoginRejected(message));
            }
            OPCODE_PING => {
                state.events.push(GameEvent::Ping);
                signals.push(Signal::Ping);
            }
            OPCODE_DEATH => {
                state.events.push(GameEvent::Death);
                signals.push(Signal::Death);
            }
            OPCODE_MAP_DESCRIPTION => {
                let position = reader.read_position()?;
                state.player.movement.forget_step();
                state.map.set_central_position(position, &mut state.events);
                let viewport = state.map.viewport();
                self.decode_area(state, reader, viewport.full_area(), &viewport.floors())?;
            }
            OPCODE_MAP_ROW_NORTH | OPCODE_MAP_ROW_EAST | OPCODE_MAP_ROW_SOUTH
            | OPCODE_MAP_ROW_WEST => {
                let direction = match opcode {
                    OPCODE_MAP_ROW_NORTH => Direction::North,
                    OPCODE_MAP_ROW_EAST => Direction::East,
                    OPCODE_MAP_ROW_SOUTH => Direction::South,
                    _ => Direction::West,
                };
                let center = state.map.central_position().translated(direction);
                if !center.is_valid() {
                    return Err(DecodeError::NoCentralPosition(opcode));
                }
                state.map.set_central_position(center, &mut state.events);
                let viewport = state.map.viewport();
                let Some(area) = viewport.strip(direction) else {
                    return Err(DecodeError::NoCentralPosition(opcode));
                };
                self.decode_area(state, reader, area, &viewport.floors())?;
            }
            OPCODE_FLOOR_CHANGE_UP | OPCODE_FLOOR_CHANGE_DOWN => {
                let moving_up = opcode == OPCODE_FLOOR_CHANGE_UP;
                let center = state.map.central_position();
                if !center.is_valid() {
                    return Err(DecodeError::NoCentralPosition(opcode));
                }
                let center = if moving_up {
                    Position::new(
                        center.x.saturating_add(1),
                        center.y.saturating_add(1),
                        center.z.saturating_sub(1),
                    )
                } else {
                    Position::new(
                        center.x.saturating_sub(1),
                        center.y.saturating_sub(1),
                        center.z.saturating_add(1),
                    )
                };
                state.map.set_central_position(center, &mut state.events);
                let viewport = state.map.viewport();
                let floors = floor_change_floors(center.z, moving_up);
                self.decode_area(state, reader, viewport.full_area(), &floors)?;
            }
            OPCODE_FIELD_DATA => {
                let position = reader.read_position()?;
                state.map.clean_tile(position);
                self.decode_tile(state, reader, Some(position))?;
            }
            OPCODE_TILE_ADD_THING => {
                let position = reader.read_position()?;
                let thing = self.read_thing(state, reader)?;
                self.place_thing(state, position, thing);
            }
            OPCODE_TILE_CHANGE_THING => self.change_thing(state, reader)?,
            OPCODE_TILE_REMOVE_THING => {
                let position = reader.read_position()?;
                let stack_pos = reader.read_u8()?;
                match state.map.remove_thing(position, usize::from(stack_pos)) {
                    Some(Thing::Creature(id)) => state.events.push(GameEvent::CreatureRemoved(id)),
                    Some(Thing::Item(_)) => {}
                    None => tracing::debug!(%position, stack_pos, "remove of missing thing ignored"),
                }
            }
            OPCODE_MOVE_CREATURE => {
                let from = reader.read_position()?;
                let stack_pos = reader.read_u8()?;
                let to = reader.read_position()?;
                self.move_creature(state, from, usize::from(stack_pos), to);
            }
            OPCODE_OPEN_CONTAINER => self.open_container(state, reader)?,
            OPCODE_CLOSE_CONTAINER => {
                let id = reader.read_u8()?;
                if state.containers.remove_container(id, &mut state.events).is_none() {
                    tracing::debug!(container = id, "close of unknown container ignored");
                }
            }
            OPCODE_CONTAINER_ADD => {
                let id = reader.read_u8()?;
                if self.features.container_pagination {
                    let slot = reader.read_u16_le()?;
                    let item = self.read_item(state, reader)?;
                    state
                        .containers
                        .insert_item(id, usize::from(slot), item, &mut state.events);
                } else {
                    let item = self.read_item(state, reader)?;
                    state.containers.insert_item(id, 0, item, &mut state.events);
                }
            }
            OPCODE_CONTAINER_UPDATE => {
                let id = reader.read_u8()?;
                let slot = self.read_container_slot(reader)?;
                let item = self.read_item(state, reader)?;
                if !state.containers.update_item(id, slot, item, &mut state.events) {
                    tracing::debug!(container = id, slot, "update of missing container slot ignored");
                }
            }
            OPCODE_CONTAINER_REMOVE => {
                let id = reader.read_u8()?;
                let slot = self.read_container_slot(reader)?;
                let refill = if self.features.container_pagination {
                    if reader.peek_u16_le()? == 0 {
                        reader.read_u16_le()?;
                        None
                    } else {
                        Some(self.read_item(state, reader)?)
                    }
                } else {
                    None
                };
                if state.containers.remove_item(id, slot, &mut state.events).is_none() {
                    tracing::debug!(container = id, slot, "remove of missing container slot ignored");
                }
                if let Some(item) = refill {
                    state.containers.add_item(id, item, &mut state.events);
                }
            }
            OPCODE_INVENTORY_SET => {
                let index = reader.read_u8()?;
                let item = self.read_item(state, reader)?;
                self.set_inventory(state, index, Some(item));
            }
            OPCODE_INVENTORY_RESET => {
                let index = reader.read_u8()?;
                self.set_inventory(state, index, None);
            }
            OPCODE_SHOP_OPEN => {
                let count = reader.read_u8()?;
                let mut items = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    items.push(ShopItem {
                        type_id: reader.read_u16_le()?,
                        sub_type: reader.read_u8()?,
                        description: reader.read_string()?,
                        weight: reader.read_u32_le()?,
                        buy_price: reader.read_u32_le()?,
                        sell_price: reader.read_u32_le()?,
                    });
                }
                state.events.push(GameEvent::ShopOpened(items));
            }
            OPCODE_SHOP_SELL_LIST => {
                let money = reader.read_u32_le()?;
                let count = reader.read_u8()?;
                let mut items = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    items.push((reader.read_u16_le()?, reader.read_u8()?));
                }
                state.events.push(GameEvent::ShopSellList { money, items });
            }
            OPCODE_SHOP_CLOSE => state.events.push(GameEvent::ShopClosed),
            OPCODE_TRADE_OFFER | OPCODE_TRADE_COUNTER => {
                let name = reader.read_string()?;
                let count = reader.read_u8()?;
                for _ in 0..count {
                    self.read_item(state, reader)?;
                }
                state.events.push(GameEvent::TradeOffer {
                    name,
                    counter: opcode == OPCODE_TRADE_COUNTER,
                    item_count: usize::from(count),
                });
            }
            OPCODE_TRADE_CLOSE => state.events.push(GameEvent::TradeClosed),
            OPCODE_WORLD_LIGHT => {
                let light = self.read_light(reader)?;
                state.map.set_light(light);
                state.events.push(GameEvent::WorldLight {
                    level: light.level,
                    color: light.color,
                });
            }
            OPCODE_GRAPHICAL_EFFECT => {
                let position = reader.read_position()?;
                let effect = reader.read_u8()?;
                state.map.add_effect(position, effect, state.clock.now());
                state.events.push(GameEvent::MagicEffect { position, effect });
            }
            OPCODE_TEXTUAL_EFFECT => {
                let position = reader.read_position()?;
                let color = reader.read_u8()?;
                let text = reader.read_string()?;
                state.map.add_animated_text(AnimatedText::new(
                    position,
                    color,
                    text.clone(),
                    state.clock.now(),
                ));
                state.events.push(GameEvent::AnimatedText {
                    position,
                    color,
                    text,
                });
            }
            OPCODE_MISSILE_EFFECT => {
                let from = reader.read_position()?;
                let to = reader.read_position()?;
                let missile = reader.read_u8()?;
                state
                    .map
                    .add_missile(Missile::new(missile, from, to, state.clock.now()));
                state.events.push(GameEvent::Missile { from, to, missile });
            }
            OPCODE_CREATURE_MARK => {
                let id = CreatureId(reader.read_u32_le()?);
                let color = reader.read_u8()?;
                if let Some(creature) = self.creature_mut(state, id) {
                    creature.square = Some(color);
                }
                state.events.push(GameEvent::CreatureSquare { id, color });
            }
            OPCODE_CREATURE_HEALTH => {
                let id = CreatureId(reader.read_u32_le()?);
                let percent = reader.read_u8()?;
                if let Some(creature) = self.creature_mut(state, id) {
                    creature.health_percent = percent;
                }
                state.events.push(GameEvent::CreatureHealth { id, percent });
            }
            OPCODE_CREATURE_LIGHT => {
                let id = CreatureId(reader.read_u32_le()?);
                let light = self.read_light(reader)?;
                if let Some(creature) = self.creature_mut(state, id) {
                    creature.light = light;
                }
            }
            OPCODE_CREATURE_OUTFIT => {
                let id = CreatureId(reader.read_u32_le()?);
                let outfit = self.read_outfit(reader)?;
                if let Some(creature) = self.creature_mut(state, id) {
                    creature.outfit = outfit;
                }
                state.events.push(GameEvent::CreatureOutfit { id, outfit });
            }
            OPCODE_CREATURE_SPEED => {
                let id = CreatureId(reader.read_u32_le()?);
                let speed = reader.read_u16_le()?;
                if let Some(creature) = self.creature_mut(state, id) {
                    creature.speed = speed;
                }
            }
            OPCODE_CREATURE_SKULL => {
                let id = CreatureId(reader.read_u32_le()?);
                let skull = reader.read_u8()?;
                if let Some(creature) = self.creature_mut(state, id) {
                    creature.skull = skull;
                }
            }
            OPCODE_CREATURE_PARTY => {
                let id = CreatureId(reader.read_u32_le()?);
                let shield = reader.read_u8()?;
                if let Some(creature) = self.creature_mut(state, id) {
                    creature.shield = shield;
                }
            }
            OPCODE_EDIT_TEXT => {
                state.events.push(GameEvent::EditText {
                    window_id: reader.read_u32_le()?,
                    item_type: reader.read_u16_le()?,
                    max_len: reader.read_u16_le()?,
                    text: reader.read_string()?,
                    author: reader.read_string()?,
                    date: reader.read_string()?,
                });
            }
            OPCODE_EDIT_LIST => {
                state.events.push(GameEvent::EditList {
                    list_type: reader.read_u8()?,
                    id: reader.read_u32_le()?,
                    text: reader.read_string()?,
                });
            }
            OPCODE_PLAYER_DATA => {
                state.player.data.stats = PlayerStats {
                    health: reader.read_u16_le()?,
                    max_health: reader.read_u16_le()?,
                    capacity: reader.read_u32_le()?,
                    experience: reader.read_u32_le()?,
                    level: reader.read_u16_le()?,
                    level_percent: reader.read_u8()?,
                    mana: reader.read_u16_le()?,
                    max_mana: reader.read_u16_le()?,
                    magic_level: reader.read_u8()?,
                    magic_level_percent: reader.read_u8()?,
                    soul: reader.read_u8()?,
                    stamina: reader.read_u16_le()?,
                };
                state.events.push(GameEvent::PlayerStats);
            }
            OPCODE_PLAYER_SKILLS => {
                let mut levels = [SkillLevel::default(); 7];
                for entry in levels.iter_mut() {
                    entry.level = reader.read_u8()?;
                    entry.percent = reader.read_u8()?;
                }
                state.player.data.skills = SkillSet::from_wire(levels);
                state.events.push(GameEvent::PlayerSkills);
            }
            OPCODE_PLAYER_STATE => {
                let icons = reader.read_u8()?;
                state.player.data.icons = icons;
                state.events.push(GameEvent::PlayerIcons(icons));
            }
            OPCODE_CLEAR_TARGET => {
                state.player.data.attack_target = None;
                state.player.data.follow_target = None;
                state.events.push(GameEvent::TargetCleared);
            }
            OPCODE_TALK => self.talk(state, reader)?,
            OPCODE_CHANNEL_LIST => {
                let count = reader.read_u16_le()?;
                let mut channels = Vec::with_capacity(usize::from(count.min(0x100)));
                for _ in 0..count {
                    channels.push(ChannelInfo {
                        id: reader.read_u16_le()?,
                        name: reader.read_string()?,
                    });
                }
                state.events.push(GameEvent::ChannelList(channels));
            }
            OPCODE_OPEN_CHANNEL | OPCODE_OPEN_OWN_CHANNEL => {
                let id = reader.read_u16_le()?;
                let name = reader.read_string()?;
                state.channels.insert(id, name.clone());
                state.events.push(GameEvent::ChannelOpened {
                    id,
                    name,
                    own: opcode == OPCODE_OPEN_OWN_CHANNEL,
                });
            }
            OPCODE_PRIVATE_CHANNEL => {
                let name = reader.read_string()?;
                state.events.push(GameEvent::PrivateChannelOpened(name));
            }
            OPCODE_CLOSE_CHANNEL => {
                let id = reader.read_u16_le()?;
                state.channels.remove(&id);
                state.events.push(GameEvent::ChannelClosed(id));
            }
            OPCODE_OPEN_REQUEST_QUEUE => {
                let id = reader.read_u16_le()?;
                state.events.push(GameEvent::RuleViolationChannel(id));
            }
            OPCODE_DELETE_REQUEST => {
                let name = reader.read_string()?;
                state.events.push(GameEvent::RuleViolationRemoved(name));
            }
            OPCODE_FINISH_REQUEST => {
                let name = reader.read_string()?;
                state.events.push(GameEvent::RuleViolationCancelled(name));
            }
            OPCODE_CLOSE_REQUEST => state.events.push(GameEvent::RuleViolationLocked),
            OPCODE_MESSAGE => {
                let kind = reader.read_u8()?;
                let text = reader.read_string()?;
                tracing::debug!(kind, %text, "text message");
                state.events.push(GameEvent::TextMessage { kind, text });
            }
            OPCODE_SNAPBACK => {
                let direction = Direction::from_u8(reader.read_u8()?);
                match state.player.id {
                    Some(id) => state.player.movement.cancel_walk(
                        &mut state.map,
                        id,
                        direction,
                        &mut state.events,
                    ),
                    None => state.events.push(GameEvent::WalkCancelled { direction }),
                }
            }
            OPCODE_OUTFIT_DIALOG => {
                let outfit = Outfit {
                    look_type: reader.read_u16_le()?,
                    head: reader.read_u8()?,
                    body: reader.read_u8()?,
                    legs: reader.read_u8()?,
                    feet: reader.read_u8()?,
                    addons: reader.read_u8()?,
                    look_item: 0,
                };
                state.events.push(GameEvent::OutfitDialog { outfit });
            }
            OPCODE_OUTFIT_DIALOG_LEGACY_MALE | OPCODE_OUTFIT_DIALOG_LEGACY_FEMALE => {
                let _ = reader.read_u8()?;
                let outfit = Outfit {
                    look_type: reader.read_u16_le()?,
                    ..Outfit::default()
                };
                state.events.push(GameEvent::OutfitDialog { outfit });
            }
            OPCODE_BUDDY_DATA => {
                let entry = VipEntry {
                    id: reader.read_u32_le()?,
                    name: reader.read_string()?,
                    online: reader.read_bool()?,
                };
                state.set_vip(entry);
            }
            OPCODE_BUDDY_STATUS_ONLINE | OPCODE_BUDDY_STATUS_OFFLINE => {
                let id = reader.read_u32_le()?;
                state.set_vip_online(id, opcode == OPCODE_BUDDY_STATUS_ONLINE);
            }
            other => return Err(DecodeError::UnknownOpcode(other)),
        }
        Ok(())
    }

    /// Describes `area` on every floor in `floors`, in order. Every cell is
    /// cleaned before it is described; the skip counter runs across floors.
    /// Returns the number of cells consumed.
    fn decode_area(
        &mut self,
        state: &mut ClientState,
        reader: &mut PacketReader<'_>,
        area: Area,
        floors: &[u8],
    ) -> Result<usize, DecodeError> {
        let viewport = state.map.viewport();
        let mut skip = 0usize;
        let mut consumed = 0usize;
        for &z in floors {
            for index in 0..area.cell_count() {
                let (dx, dy) = area.cell_offset(index);
                let position = viewport.cell_position(&area, dx, dy, z);
                if let Some(position) = position {
                    state.map.clean_tile(position);
                }
                consumed += 1;
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                skip = self.decode_tile(state, reader, position)?;
            }
        }
        if skip > 0 {
            tracing::trace!(skip, "skip marker ran past the described area");
        }
        Ok(consumed)
    }

    /// Reads one tile's things up to its terminating marker and returns the
    /// number of following cells the marker skips.
    fn decode_tile(
        &mut self,
        state: &mut ClientState,
        reader: &mut PacketReader<'_>,
        position: Option<Position>,
    ) -> Result<usize, DecodeError> {
        let mut described = 0usize;
        loop {
            let value = reader.peek_u16_le()?;
            if value >= SKIP_MARKER {
                reader.read_u16_le()?;
                return Ok(usize::from(value - SKIP_MARKER));
            }
            if described == MAX_TILE_THINGS {
                return Err(DecodeError::TooManyThings(
                    position.unwrap_or(Position::INVALID),
                ));
            }
            let thing = self.read_thing(state, reader)?;
            match position {
                Some(position) => self.place_thing(state, position, thing),
                None => tracing::debug!("thing outside coordinate space dropped"),
            }
            described += 1;
        }
    }

    fn place_thing(&mut self, state: &mut ClientState, position: Position, thing: DecodedThing) {
        match thing {
            DecodedThing::Item(item) => {
                state.map.add_item(position, item);
            }
            DecodedThing::Creature(creature) => {
                let id = creature.id;
                state.map.add_creature(creature, position);
                state.events.push(GameEvent::CreatureAppeared(id));
            }
        }
    }

    fn read_thing(
        &mut self,
        state: &mut ClientState,
        reader: &mut PacketReader<'_>,
    ) -> Result<DecodedThing, DecodeError> {
        match reader.peek_u16_le()? {
            CREATURE_MARKER_NEW | CREATURE_MARKER_KNOWN | CREATURE_MARKER_TURN => {
                Ok(DecodedThing::Creature(self.read_creature(state, reader)?))
            }
            _ => Ok(DecodedThing::Item(self.read_item(state, reader)?)),
        }
    }

    fn read_item(
        &self,
        state: &ClientState,
        reader: &mut PacketReader<'_>,
    ) -> Result<Item, DecodeError> {
        let type_id = reader.read_u16_le()?;
        let mut item = state.item(type_id, 0);
        if item.attrs().has_count() {
            item.count = reader.read_u8()?;
        }
        Ok(item)
    }

    /// Reads a creature descriptor. The creature is taken out of the arena
    /// (or the departed cache) and must be placed again by the caller.
    fn read_creature(
        &mut self,
        state: &mut ClientState,
        reader: &mut PacketReader<'_>,
    ) -> Result<Creature, DecodeError> {
        let marker = reader.read_u16_le()?;
        let mut creature = match marker {
            CREATURE_MARKER_NEW => {
                let removed = reader.read_u32_le()?;
                let id = CreatureId(reader.read_u32_le()?);
                let kind = if self.features.creature_type {
                    CreatureKind::from_u8(reader.read_u8()?)
                } else if state.player.is(id) {
                    CreatureKind::Player
                } else {
                    CreatureKind::Unknown
                };
                let name = reader.read_string_lossy(MAX_STRING_LEN)?;
                if removed != 0 && removed != id.0 {
                    state.map.remove_creature(CreatureId(removed));
                }
                state.map.remove_creature(id);
                Creature::new(id, name, kind)
            }
            CREATURE_MARKER_KNOWN => {
                let id = CreatureId(reader.read_u32_le()?);
                state.map.take_known_creature(id)
            }
            _ => {
                let id = CreatureId(reader.read_u32_le()?);
                let mut creature = state.map.take_known_creature(id);
                creature.direction = Direction::from_u8(reader.read_u8()?);
                return Ok(creature);
            }
        };
        creature.health_percent = reader.read_u8()?;
        creature.direction = Direction::from_u8(reader.read_u8()?);
        creature.outfit = self.read_outfit(reader)?;
        creature.light = self.read_light(reader)?;
        creature.speed = reader.read_u16_le()?;
        creature.skull = reader.read_u8()?;
        creature.shield = reader.read_u8()?;
        if marker == CREATURE_MARKER_NEW && self.features.creature_emblem {
            creature.emblem = reader.read_u8()?;
        }
        if self.features.creature_unpassable {
            creature.unpassable = reader.read_bool()?;
        }
        Ok(creature)
    }

    fn read_outfit(&self, reader: &mut PacketReader<'_>) -> Result<Outfit, DecodeError> {
        let look_type = if self.features.look_type_u16 {
            reader.read_u16_le()?
        } else {
            u16::from(reader.read_u8()?)
        };
        if look_type != 0 {
            return Ok(Outfit {
                look_type,
                head: reader.read_u8()?,
                body: reader.read_u8()?,
                legs: reader.read_u8()?,
                feet: reader.read_u8()?,
                addons: reader.read_u8()?,
                look_item: 0,
            });
        }
        Ok(Outfit {
            look_item: reader.read_u16_le()?,
            ..Outfit::default()
        })
    }

    fn read_light(&self, reader: &mut PacketReader<'_>) -> Result<Light, DecodeError> {
        Ok(Light {
            level: reader.read_u8()?,
            color: reader.read_u8()?,
        })
    }

    fn read_container_slot(&self, reader: &mut PacketReader<'_>) -> Result<usize, DecodeError> {
        if self.features.container_pagination {
            Ok(usize::from(reader.read_u16_le()?))
        } else {
            Ok(usize::from(reader.read_u8()?))
        }
    }

    fn creature_mut<'s>(&self, state: &'s mut ClientState, id: CreatureId) -> Option<&'s mut Creature> {
        let creature = state.map.creature_mut(id);
        if creature.is_none() {
            tracing::debug!(creature = id.0, "update for unknown creature ignored");
        }
        creature
    }

    fn change_thing(
        &mut self,
        state: &mut ClientState,
        reader: &mut PacketReader<'_>,
    ) -> Result<(), DecodeError> {
        let position = reader.read_position()?;
        let stack_pos = usize::from(reader.read_u8()?);
        match reader.peek_u16_le()? {
            CREATURE_MARKER_TURN => {
                reader.read_u16_le()?;
                let id = CreatureId(reader.read_u32_le()?);
                let direction = Direction::from_u8(reader.read_u8()?);
                match self.creature_mut(state, id) {
                    Some(creature) => creature.direction = direction,
                    None => return Ok(()),
                }
                state.events.push(GameEvent::CreatureTurned { id, direction });
            }
            CREATURE_MARKER_NEW | CREATURE_MARKER_KNOWN => {
                let creature = self.read_creature(state, reader)?;
                if let Some(Thing::Item(_)) = state.map.remove_thing(position, stack_pos) {
                    tracing::debug!(%position, stack_pos, "creature replaced an item");
                }
                self.place_thing(state, position, DecodedThing::Creature(creature));
            }
            _ => {
                let item = self.read_item(state, reader)?;
                if !state.map.transform_thing(position, stack_pos, item) {
                    tracing::debug!(%position, stack_pos, "transform of missing item ignored");
                }
            }
        }
        Ok(())
    }

    /// Applies a server creature move, reconciling it with a pending
    /// prediction of the local player first.
    fn move_creature(&mut self, state: &mut ClientState, from: Position, stack_pos: usize, to: Position) {
        if let Some(player) = state.player.id {
            let predicted = state.player.movement.predicted_origin() == Some(from)
                && state
                    .map
                    .tile(from)
                    .map(|tile| tile.creature_slot(player) == stack_pos)
                    .unwrap_or(false);
            if predicted {
                let outcome = state.player.movement.on_server_move(
                    &mut state.map,
                    player,
                    from,
                    to,
                    &mut state.events,
                );
                if outcome == ServerMoveOutcome::Confirmed {
                    state.events.push(GameEvent::CreatureMoved { id: player, from, to });
                    return;
                }
            }
        }

        let Some(tile) = state.map.tile(from) else {
            tracing::debug!(%from, "move from unknown tile ignored");
            return;
        };
        let Some(id) = tile.creature_at(stack_pos) else {
            tracing::debug!(%from, stack_pos, "move of unknown creature ignored");
            return;
        };

        if state.player.is(id) && state.player.movement.is_pre_walking() {
            state.player.movement.forget_step();
        }
        if !state.map.is_aware_of(to) && !state.player.is(id) {
            state.map.depart(id);
            state.events.push(GameEvent::CreatureRemoved(id));
            return;
        }
        let now = state.clock.now();
        let ground_speed = state.map.tile(to).map(|tile| tile.ground_speed());
        if let Some(creature) = state.map.creature_mut(id) {
            if from.is_neighbour(to) {
                let duration = step_duration_ms(
                    ground_speed.unwrap_or(crate::world::item_types::DEFAULT_GROUND_SPEED),
                    creature.speed,
                    from.direction_to(to),
                );
                creature.start_walk(to, now, duration);
            } else {
                creature.stop_walk();
            }
        }
        state.map.move_creature(id, to);
        state.events.push(GameEvent::CreatureMoved { id, from, to });
    }

    fn open_container(
        &mut self,
        state: &mut ClientState,
        reader: &mut PacketReader<'_>,
    ) -> Result<(), DecodeError> {
        let id = reader.read_u8()?;
        let item_type = reader.read_u16_le()?;
        let name = reader.read_string()?;
        let capacity = reader.read_u8()?;
        let has_parent = reader.read_bool()?;
        let (unlocked, page) = if self.features.container_pagination {
            let unlocked = reader.read_bool()?;
            let has_pages = reader.read_bool()?;
            let total_size = reader.read_u16_le()?;
            let first_index = reader.read_u16_le()?;
            let page = has_pages.then_some(ContainerPage {
                total_size,
                first_index,
            });
            (unlocked, page)
        } else {
            (true, None)
        };
        let count = reader.read_u8()?;
        let mut items = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            items.push(self.read_item(state, reader)?);
        }
        let mut container =
            Container::new(id, state.item(item_type, 0), name, capacity, has_parent).with_items(items);
        container.unlocked = unlocked;
        container.page = page;
        tracing::debug!(container = id, items = container.len(), "container opened");
        state.containers.create_container(container, &mut state.events);
        Ok(())
    }

    fn set_inventory(&mut self, state: &mut ClientState, index: u8, item: Option<Item>) {
        let Some(slot) = InventorySlot::from_index(usize::from(index)) else {
            tracing::debug!(slot = index, "inventory update for unknown slot ignored");
            return;
        };
        state.player.data.inventory.set_slot(slot, item);
        state.events.push(GameEvent::InventoryChanged(slot));
    }

    fn talk(&mut self, state: &mut ClientState, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
        let speaker_id = reader.read_u32_le()?;
        let name = reader.read_string()?;
        let kind = reader.read_u8()?;
        let target = if TALK_TYPES_POSITION.contains(&kind) {
            TalkTarget::Position(reader.read_position()?)
        } else if TALK_TYPES_CHANNEL.contains(&kind) {
            TalkTarget::Channel(reader.read_u16_le()?)
        } else if TALK_TYPES_PRIVATE.contains(&kind) {
            TalkTarget::Private
        } else if kind == TALK_TYPE_RULE_VIOLATION {
            TalkTarget::Text {
                arg: Some(reader.read_u32_le()?),
            }
        } else if TALK_TYPES_TEXT.contains(&kind) {
            TalkTarget::Text { arg: None }
        } else {
            return Err(DecodeError::UnknownTalkType(kind));
        };
        let text = reader.read_string()?;
        state.events.push(GameEvent::Talk {
            speaker_id,
            name,
            kind,
            target,
            text,
        });
        Ok(())
    }
}
