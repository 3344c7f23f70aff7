use std::sync::Arc;
use tibia_client::entities::creature::CreatureId;
use tibia_client::net::framing::{FrameDecoder, FrameEncoder};
use tibia_client::net::game::ProtocolFeatures;
use tibia_client::net::packet::PacketWriter;
use tibia_client::net::xtea::XteaKey;
use tibia_client::world::item_types::{build_item_types, ItemTypeIndex};
use tibia_client::world::object_types::parse_object_types;
use tibia_client::world::position::{Direction, Position};
use tibia_client::world::time::GameClock;
use tibia_client::world::viewport::AwareRange;
use tibia_client::{
    ClientState, GameEvent, GameSession, MemoryHandle, MemoryTransport, SessionOptions,
    SessionState,
};

const GRASS: u16 = 102;
const TORCH: u16 = 2050;
const GOLD: u16 = 3031;
const VIAL: u16 = 2874;
const BAG: u16 = 2853;
const SKIP: u16 = 0xff00;
const PLAYER: u32 = 0x1000_0001;
const CENTER: Position = Position::new(100, 100, 7);

fn item_types() -> ItemTypeIndex {
    let objects = parse_object_types(
        "TypeID = 102\nName = \"grass\"\nFlags = {Bank}\nAttributes = {Waypoints=150}\n\n\
         TypeID = 3031\nName = \"gold coin\"\nFlags = {Cumulative, Take}\n\n\
         TypeID = 2874\nName = \"vial\"\nFlags = {LiquidContainer, Take}\n\n\
         TypeID = 2050\nName = \"torch\"\nFlags = {Take}\n\n\
         TypeID = 2853\nName = \"bag\"\nFlags = {Container, Take}\nAttributes = {Capacity=8}\n",
    )
    .expect("objects");
    build_item_types(&objects)
}

fn session(features: ProtocolFeatures) -> (GameSession<MemoryTransport>, MemoryHandle) {
    let (transport, handle) = MemoryTransport::pair();
    let world = ClientState::new(Arc::new(item_types()), AwareRange::default(), GameClock::manual());
    let options = SessionOptions {
        features,
        ..SessionOptions::default()
    };
    (GameSession::new(transport, world, options), handle)
}

fn character_list() -> Vec<u8> {
    let mut writer = PacketWriter::new();
    writer.write_u8(0x64);
    writer.write_u8(1);
    writer.write_string_str("Knight");
    writer.write_string_str("Antica");
    writer.write_u32_le(u32::from_le_bytes([127, 0, 0, 1]));
    writer.write_u16_le(7172);
    writer.write_u16_le(30);
    writer.into_vec()
}

/// Init-game followed by a full description centred on `CENTER` with the
/// player in the middle.
fn enter_game() -> Vec<u8> {
    let mut writer = PacketWriter::new();
    writer.write_u8(0x0a);
    writer.write_u32_le(PLAYER);
    writer.write_u16_le(0);
    writer.write_u8(1);

    writer.write_u8(0x64);
    writer.write_position(CENTER);
    for index in 0..252usize {
        writer.write_u16_le(GRASS);
        if index == 8 * 14 + 6 {
            writer.write_u16_le(0x61);
            writer.write_u32_le(0);
            writer.write_u32_le(PLAYER);
            writer.write_string_str("Knight");
            writer.write_u8(100);
            writer.write_u8(2);
            writer.write_u8(128);
            writer.write_bytes(&[10, 20, 30, 40, 0]);
            writer.write_u8(0);
            writer.write_u8(0);
            writer.write_u16_le(220);
            writer.write_u8(0);
            writer.write_u8(0);
        }
        writer.write_u16_le(SKIP);
    }
    for _ in 0..7 {
        writer.write_u16_le(SKIP | 251);
    }
    writer.into_vec()
}

fn confirm_east_step() -> Vec<u8> {
    let mut writer = PacketWriter::new();
    writer.write_u8(0x6d);
    writer.write_position(CENTER);
    writer.write_u8(1);
    writer.write_position(Position::new(101, 100, 7));
    writer.write_u8(0x66);
    for _ in 0..14 {
        writer.write_u16_le(GRASS);
        writer.write_u16_le(SKIP);
    }
    for _ in 0..7 {
        writer.write_u16_le(SKIP | 13);
    }
    writer.into_vec()
}

fn frame(encoder: &FrameEncoder, message: &[u8]) -> Vec<u8> {
    encoder.encode(message).expect("frame")
}

fn online(features: ProtocolFeatures) -> (GameSession<MemoryTransport>, MemoryHandle) {
    let (mut session, handle) = session(features);
    let plain = FrameEncoder::default();
    session.login("127.0.0.1", 7171, "111111", "tibia").expect("login");
    handle.push_inbound(&frame(&plain, &character_list()));
    session.poll().expect("poll");
    session.enter_world("Knight").expect("enter");
    handle.take_sent();
    handle.push_inbound(&frame(&plain, &enter_game()));
    session.poll().expect("poll");
    assert_eq!(session.state(), SessionState::Online);
    session.drain_events();
    (session, handle)
}

#[test]
fn login_lists_characters_then_enters_their_world() {
    let (mut session, handle) = session(ProtocolFeatures::legacy());
    session.login("127.0.0.1", 7171, "111111", "tibia").expect("login");
    let sent = handle.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][2], 0x0a);

    handle.push_inbound(&frame(&FrameEncoder::default(), &character_list()));
    session.poll().expect("poll");
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.characters().len(), 1);
    assert_eq!(session.premium_days(), 30);
    let events = session.drain_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, GameEvent::CharacterList { premium_days: 30, .. })));

    session.enter_world("knight").expect("enter");
    assert_eq!(session.state(), SessionState::AwaitingWorldEntry);
    assert_eq!(
        handle.connects(),
        vec![
            ("127.0.0.1".to_string(), 7171),
            ("127.0.0.1".to_string(), 7172)
        ]
    );
    let game_login = handle.take_sent();
    assert_eq!(game_login.len(), 1);
    assert_eq!(game_login[0][2], 0x0a);

    handle.push_inbound(&frame(&FrameEncoder::default(), &enter_game()));
    session.poll().expect("poll");
    assert!(session.is_online());
    assert_eq!(session.world().player_position(), Some(CENTER));
    assert_eq!(session.world().player_id(), Some(CreatureId(PLAYER)));
}

#[test]
fn walk_east_is_predicted_sent_and_confirmed() {
    let (mut session, handle) = online(ProtocolFeatures::legacy());

    let step = session.walk(Direction::East).expect("walk");
    assert_eq!(step.to, Position::new(101, 100, 7));
    assert_eq!(handle.take_sent(), vec![vec![0x01, 0x00, 0x66]]);
    assert_eq!(
        session.world().player_position(),
        Some(Position::new(101, 100, 7))
    );

    handle.push_inbound(&frame(&FrameEncoder::default(), &confirm_east_step()));
    session.poll().expect("poll");
    let world = session.world();
    assert_eq!(world.map.central_position(), Position::new(101, 100, 7));
    assert_eq!(world.player_position(), Some(Position::new(101, 100, 7)));
    assert!(world.map.is_evictable(Position::new(91, 100, 7)));
    assert!(world.map.tile(Position::new(92, 100, 7)).is_none());
    assert!(world.map.tile(Position::new(110, 100, 7)).is_some());
    let events = session.drain_events();
    assert!(events.contains(&GameEvent::WalkConfirmed(Position::new(101, 100, 7))));
    assert_eq!(session.decode_stats().errors, 0);
}

#[test]
fn container_remove_shifts_later_slots() {
    let (mut session, handle) = online(ProtocolFeatures::legacy());
    let mut writer = PacketWriter::new();
    writer.write_u8(0x6e);
    writer.write_u8(5);
    writer.write_u16_le(BAG);
    writer.write_string_str("bag");
    writer.write_u8(8);
    writer.write_u8(0);
    writer.write_u8(3);
    writer.write_u16_le(TORCH);
    writer.write_u16_le(GOLD);
    writer.write_u8(10);
    writer.write_u16_le(VIAL);
    writer.write_u8(2);
    writer.write_u8(0x72);
    writer.write_u8(5);
    writer.write_u8(1);
    handle.push_inbound(&frame(&FrameEncoder::default(), writer.as_slice()));
    session.poll().expect("poll");

    let bag = session.world().containers.get(5).expect("open");
    assert_eq!(bag.len(), 2);
    assert_eq!(bag.item(0).map(|item| item.type_id.0), Some(TORCH));
    assert_eq!(bag.item(1).map(|item| item.type_id.0), Some(VIAL));
    let events = session.drain_events();
    assert!(events.contains(&GameEvent::ContainerOpened { id: 5 }));
    assert!(events.contains(&GameEvent::ContainerItemRemoved { id: 5, slot: 1 }));
}

#[test]
fn ping_is_answered() {
    let (mut session, handle) = online(ProtocolFeatures::legacy());
    handle.push_inbound(&frame(&FrameEncoder::default(), &[0x1e]));
    session.poll().expect("poll");
    assert_eq!(handle.take_sent(), vec![vec![0x01, 0x00, 0x1e]]);
}

#[test]
fn server_close_clears_the_world() {
    let (mut session, handle) = online(ProtocolFeatures::legacy());
    handle.close_remote();
    session.poll().expect("poll");
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.world().map.tile_count(), 0);
    assert_eq!(session.world().player_position(), None);
    assert!(session
        .drain_events()
        .iter()
        .any(|event| matches!(event, GameEvent::Disconnected { .. })));
}

#[test]
fn encrypted_login_round_trip() {
    let features = ProtocolFeatures {
        xtea: true,
        ..ProtocolFeatures::legacy()
    };
    let (mut session, handle) = session(features);
    session.login("127.0.0.1", 7171, "111111", "tibia").expect("login");
    let sent = handle.take_sent();
    let mut key_bytes = [0u8; 16];
    key_bytes.copy_from_slice(&sent[0][4..20]);
    let key = XteaKey::from_bytes(key_bytes);

    let mut sealed = FrameEncoder::default();
    sealed.set_cipher(Some(key));
    let reply = frame(&sealed, &character_list());
    let mut clear = FrameDecoder::default();
    let readable = clear.decode(&reply);
    assert_ne!(readable.first().cloned(), Some(Ok(character_list())));

    handle.push_inbound(&reply);
    session.poll().expect("poll");
    assert_eq!(session.characters().len(), 1);
    assert_eq!(session.characters()[0].name, "Knight");
}
