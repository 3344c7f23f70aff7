use crate::entities::container::ContainerId;
use crate::entities::creature::{CreatureId, Outfit};
use crate::entities::inventory::InventorySlot;
use crate::entities::player::FightModes;
use crate::net::packet::PacketWriter;
use crate::world::position::{Direction, Position};

pub const OPCODE_LOGOUT: u8 = 0x14;
pub const OPCODE_PING: u8 = 0x1e;
pub const OPCODE_AUTO_WALK: u8 = 0x64;
pub const OPCODE_MOVE_NORTH: u8 = 0x65;
pub const OPCODE_MOVE_EAST: u8 = 0x66;
pub const OPCODE_MOVE_SOUTH: u8 = 0x67;
pub const OPCODE_MOVE_WEST: u8 = 0x68;
pub const OPCODE_STOP_AUTO_WALK: u8 = 0x69;
pub const OPCODE_MOVE_NORTHEAST: u8 = 0x6a;
pub const OPCODE_MOVE_SOUTHEAST: u8 = 0x6b;
pub const OPCODE_MOVE_SOUTHWEST: u8 = 0x6c;
pub const OPCODE_MOVE_NORTHWEST: u8 = 0x6d;
pub const OPCODE_TURN_NORTH: u8 = 0x6f;
pub const OPCODE_TURN_EAST: u8 = 0x70;
pub const OPCODE_TURN_SOUTH: u8 = 0x71;
pub const OPCODE_TURN_WEST: u8 = 0x72;
pub const OPCODE_MOVE_OBJECT: u8 = 0x78;
pub const OPCODE_USE_OBJECT: u8 = 0x82;
pub const OPCODE_USE_OBJECT_ON: u8 = 0x83;
pub const OPCODE_USE_ON_CREATURE: u8 = 0x84;
pub const OPCODE_ROTATE_ITEM: u8 = 0x85;
pub const OPCODE_CLOSE_CONTAINER: u8 = 0x87;
pub const OPCODE_UP_CONTAINER: u8 = 0x88;
pub const OPCODE_LOOK: u8 = 0x8c;
pub const OPCODE_CTALK: u8 = 0x96;
pub const OPCODE_REQUEST_CHANNELS: u8 = 0x97;
pub const OPCODE_OPEN_CHANNEL: u8 = 0x98;
pub const OPCODE_CLOSE_CHANNEL: u8 = 0x99;
pub const OPCODE_OPEN_PRIVATE_CHANNEL: u8 = 0x9a;
pub const OPCODE_FIGHT_MODES: u8 = 0xa0;
pub const OPCODE_ATTACK: u8 = 0xa1;
pub const OPCODE_FOLLOW: u8 = 0xa2;
pub const OPCODE_CANCEL: u8 = 0xbe;
pub const OPCODE_REFRESH_FIELD: u8 = 0xc9;
pub const OPCODE_REFRESH_CONTAINER: u8 = 0xca;
pub const OPCODE_GET_OUTFIT: u8 = 0xd2;
pub const OPCODE_SET_OUTFIT: u8 = 0xd3;
pub const OPCODE_ADD_BUDDY: u8 = 0xdc;
pub const OPCODE_REMOVE_BUDDY: u8 = 0xdd;

/// Talk types whose payload names a channel instead of a recipient.
const CHANNEL_TALK_TYPES: [u8; 4] = [0x05, 0x0a, 0x0c, 0x0e];
const PRIVATE_TALK_TYPES: [u8; 2] = [0x04, 0x0b];
/// Auto-walk paths longer than this are cut; the count travels as one byte.
const MAX_AUTO_WALK_STEPS: usize = u8::MAX as usize;

/// Where an item sits, encoded as a pseudo-position on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemLocation {
    Position(Position),
    Inventory(InventorySlot),
    Container { container_id: ContainerId, slot: u8 },
}

impl ItemLocation {
    pub fn to_wire(self) -> Position {
        match self {
            ItemLocation::Position(position) => position,
            ItemLocation::Inventory(slot) => Position::new(0xffff, slot.index() as u16, 0),
            ItemLocation::Container { container_id, slot } => {
                Position::new(0xffff, 0x40 + u16::from(container_id), slot)
            }
        }
    }

    pub fn from_wire(position: Position) -> Self {
        if position.x == 0xffff {
            if let Some(slot) = InventorySlot::from_index(usize::from(position.y)) {
                return ItemLocation::Inventory(slot);
            }
            if (0x40..0x50).contains(&position.y) {
                return ItemLocation::Container {
                    container_id: (position.y - 0x40) as u8,
                    slot: position.z,
                };
            }
        }
        ItemLocation::Position(position)
    }
}

/// An item named by location, type and stack position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThingRef {
    pub location: ItemLocation,
    pub type_id: u16,
    pub stack_pos: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalkRecipient {
    None,
    Channel(u16),
    Player(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CTalkMessage {
    pub talk_type: u8,
    pub recipient: TalkRecipient,
    pub message: String,
}

impl CTalkMessage {
    pub fn say(message: impl Into<String>) -> Self {
        Self {
            talk_type: 0x01,
            recipient: TalkRecipient::None,
            message: message.into(),
        }
    }

    pub fn channel(channel_id: u16, message: impl Into<String>) -> Self {
        Self {
            talk_type: 0x05,
            recipient: TalkRecipient::Channel(channel_id),
            message: message.into(),
        }
    }

    pub fn private(recipient: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            talk_type: 0x04,
            recipient: TalkRecipient::Player(recipient.into()),
            message: message.into(),
        }
    }
}

/// Intents the client sends to the game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Logout,
    Ping,
    AutoWalk(Vec<Direction>),
    Walk(Direction),
    StopAutoWalk,
    Turn(Direction),
    MoveThing {
        from: ThingRef,
        to: ItemLocation,
        count: u8,
    },
    Use {
        thing: ThingRef,
        container_index: u8,
    },
    UseWith {
        thing: ThingRef,
        target: ThingRef,
    },
    UseOnCreature {
        thing: ThingRef,
        creature: CreatureId,
    },
    Rotate(ThingRef),
    CloseContainer(ContainerId),
    UpContainer(ContainerId),
    Look(ThingRef),
    Talk(CTalkMessage),
    RequestChannels,
    OpenChannel(u16),
    CloseChannel(u16),
    OpenPrivateChannel(String),
    FightModes(FightModes),
    Attack(Option<CreatureId>),
    Follow(Option<CreatureId>),
    Cancel,
    RefreshTile(Position),
    RefreshContainer(ContainerId),
    RequestOutfit,
    SetOutfit(Outfit),
    AddVip(String),
    RemoveVip(u32),
}

impl ClientCommand {
    pub fn opcode(&self) -> Option<u8> {
        Some(match self {
            ClientCommand::Logout => OPCODE_LOGOUT,
            ClientCommand::Ping => OPCODE_PING,
            ClientCommand::AutoWalk(_) => OPCODE_AUTO_WALK,
            ClientCommand::Walk(direction) => walk_opcode(*direction)?,
            ClientCommand::StopAutoWalk => OPCODE_STOP_AUTO_WALK,
            ClientCommand::Turn(direction) => turn_opcode(*direction)?,
            ClientCommand::MoveThing { .. } => OPCODE_MOVE_OBJECT,
            ClientCommand::Use { .. } => OPCODE_USE_OBJECT,
            ClientCommand::UseWith { .. } => OPCODE_USE_OBJECT_ON,
            ClientCommand::UseOnCreature { .. } => OPCODE_USE_ON_CREATURE,
            ClientCommand::Rotate(_) => OPCODE_ROTATE_ITEM,
            ClientCommand::CloseContainer(_) => OPCODE_CLOSE_CONTAINER,
            ClientCommand::UpContainer(_) => OPCODE_UP_CONTAINER,
            ClientCommand::Look(_) => OPCODE_LOOK,
            ClientCommand::Talk(_) => OPCODE_CTALK,
            ClientCommand::RequestChannels => OPCODE_REQUEST_CHANNELS,
            ClientCommand::OpenChannel(_) => OPCODE_OPEN_CHANNEL,
            ClientCommand::CloseChannel(_) => OPCODE_CLOSE_CHANNEL,
            ClientCommand::OpenPrivateChannel(_) => OPCODE_OPEN_PRIVATE_CHANNEL,
            ClientCommand::FightModes(_) => OPCODE_FIGHT_MODES,
            ClientCommand::Attack(_) => OPCODE_ATTACK,
            ClientCommand::Follow(_) => OPCODE_FOLLOW,
            ClientCommand::Cancel => OPCODE_CANCEL,
            ClientCommand::RefreshTile(_) => OPCODE_REFRESH_FIELD,
            ClientCommand::RefreshContainer(_) => OPCODE_REFRESH_CONTAINER,
            ClientCommand::RequestOutfit => OPCODE_GET_OUTFIT,
            ClientCommand::SetOutfit(_) => OPCODE_SET_OUTFIT,
            ClientCommand::AddVip(_) => OPCODE_ADD_BUDDY,
            ClientCommand::RemoveVip(_) => OPCODE_REMOVE_BUDDY,
        })
    }
}

/// Builds the message body for `command`. Returns `None` for commands with no
/// wire form, such as a walk towards [`Direction::Invalid`].
pub fn encode_command(command: &ClientCommand) -> Option<Vec<u8>> {
    let opcode = command.opcode()?;
    let mut writer = PacketWriter::with_capacity(16);
    writer.write_u8(opcode);
    match command {
        ClientCommand::Logout
        | ClientCommand::Ping
        | ClientCommand::Walk(_)
        | ClientCommand::StopAutoWalk
        | ClientCommand::Turn(_)
        | ClientCommand::RequestChannels
        | ClientCommand::Cancel
        | ClientCommand::RequestOutfit => {}
        ClientCommand::AutoWalk(steps) => {
            let codes: Vec<u8> = steps
                .iter()
                .filter_map(|direction| path_step_code(*direction))
                .take(MAX_AUTO_WALK_STEPS)
                .collect();
            if codes.is_empty() {
                return None;
            }
            writer.write_u8(codes.len() as u8);
            writer.write_bytes(&codes);
        }
        ClientCommand::MoveThing { from, to, count } => {
            write_thing(&mut writer, from);
            writer.write_position(to.to_wire());
            writer.write_u8(*count);
        }
        ClientCommand::Use {
            thing,
            container_index,
        } => {
            write_thing(&mut writer, thing);
            writer.write_u8(*container_index);
        }
        ClientCommand::UseWith { thing, target } => {
            write_thing(&mut writer, thing);
            write_thing(&mut writer, target);
        }
        ClientCommand::UseOnCreature { thing, creature } => {
            write_thing(&mut writer, thing);
            writer.write_u32_le(creature.0);
        }
        ClientCommand::Rotate(thing) | ClientCommand::Look(thing) => write_thing(&mut writer, thing),
        ClientCommand::CloseContainer(id)
        | ClientCommand::UpContainer(id)
        | ClientCommand::RefreshContainer(id) => writer.write_u8(*id),
        ClientCommand::Talk(message) => write_talk(&mut writer, message),
        ClientCommand::OpenChannel(id) | ClientCommand::CloseChannel(id) => {
            writer.write_u16_le(*id)
        }
        ClientCommand::OpenPrivateChannel(name) | ClientCommand::AddVip(name) => {
            writer.write_string_str(name)
        }
        ClientCommand::FightModes(modes) => {
            writer.write_u8(modes.attack_mode);
            writer.write_u8(modes.chase_mode);
            writer.write_bool(modes.secure_mode);
        }
        ClientCommand::Attack(target) | ClientCommand::Follow(target) => {
            writer.write_u32_le(target.map(|id| id.0).unwrap_or(0))
        }
        ClientCommand::RefreshTile(position) => writer.write_position(*position),
        ClientCommand::SetOutfit(outfit) => {
            writer.write_u16_le(outfit.look_type);
            writer.write_u8(outfit.head);
            writer.write_u8(outfit.body);
            writer.write_u8(outfit.legs);
            writer.write_u8(outfit.feet);
            writer.write_u8(outfit.addons);
        }
        ClientCommand::RemoveVip(id) => writer.write_u32_le(*id),
    }
    Some(writer.into_vec())
}

pub fn walk_opcode(direction: Direction) -> Option<u8> {
    match direction {
        Direction::North => Some(OPCODE_MOVE_NORTH),
        Direction::East => Some(OPCODE_MOVE_EAST),
        Direction::South => Some(OPCODE_MOVE_SOUTH),
        Direction::West => Some(OPCODE_MOVE_WEST),
        Direction::Northeast => Some(OPCODE_MOVE_NORTHEAST),
        Direction::Southeast => Some(OPCODE_MOVE_SOUTHEAST),
        Direction::Southwest => Some(OPCODE_MOVE_SOUTHWEST),
        Direction::Northwest => Some(OPCODE_MOVE_NORTHWEST),
        Direction::Invalid => None,
    }
}

fn turn_opcode(direction: Direction) -> Option<u8> {
    match direction {
        Direction::North => Some(OPCODE_TURN_NORTH),
        Direction::East => Some(OPCODE_TURN_EAST),
        Direction::South => Some(OPCODE_TURN_SOUTH),
        Direction::West => Some(OPCODE_TURN_WEST),
        _ => None,
    }
}

/// Auto-walk step codes count counter-clockwise from east.
fn path_step_code(direction: Direction) -> Option<u8> {
    match direction {
        Direction::East => Some(1),
        Direction::Northeast => Some(2),
        Direction::North => Some(3),
        Direction::Northwest => Some(4),
        Direction::West => Some(5),
        Direction::Southwest => Some(6),
        Direction::South => Some(7),
        Direction::Southeast => Some(8),
        Direction::Invalid => None,
    }
}

fn write_thing(writer: &mut PacketWriter, thing: &ThingRef) {
    writer.write_position(thing.location.to_wire());
    writer.write_u16_le(thing.type_id);
    writer.write_u8(thing.stack_pos);
}

fn write_talk(writer: &mut PacketWriter, message: &CTalkMessage) {
    writer.write_u8(message.talk_type);
    match &message.recipient {
        TalkRecipient::Channel(channel) if CHANNEL_TALK_TYPES.contains(&message.talk_type) => {
            writer.write_u16_le(*channel)
        }
        TalkRecipient::Player(name) if PRIVATE_TALK_TYPES.contains(&message.talk_type) => {
            writer.write_string_str(name)
        }
        TalkRecipient::None => {}
        other => tracing::warn!(
            talk_type = message.talk_type,
            recipient = ?other,
            "talk recipient does not match talk type, dropped"
        ),
    }
    writer.write_string_str(&message.message);
}
