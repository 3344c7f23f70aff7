mod config;
pub mod entities;
pub mod events;
pub mod net;
pub mod telemetry;
pub mod world;

pub use config::{ClientConfig, ConfigError, TransportKind};
pub use events::GameEvent;
pub use net::game::{DecodeError, DecodeStats, ProtocolDecoder, ProtocolFeatures};
pub use net::game_client::{encode_command, ClientCommand};
pub use net::session::{GameSession, SessionError, SessionOptions, SessionState};
pub use net::transport::{MemoryHandle, MemoryTransport, TcpTransport, Transport};
pub use net::ws::WsTransport;
pub use world::state::ClientState;

use net::transport::DEFAULT_CONNECT_TIMEOUT;
use std::sync::Arc;
use std::time::{Duration, Instant};
use world::item_types::ItemTypeIndex;
use world::time::GameClock;

/// Longest wait for a login server or game server to answer.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

pub fn run(args: &[String]) -> Result<(), String> {
    let config = ClientConfig::from_args(args).map_err(|err| err.to_string())?;
    telemetry::logging::init(&config.log_level, config.root.as_deref())?;

    let types = match &config.item_types {
        Some(path) => {
            let types = ItemTypeIndex::load(path).map_err(|err| err.to_string())?;
            tracing::info!(count = types.len(), path = %path.display(), "item types loaded");
            types
        }
        None => {
            tracing::warn!("no item_types configured; every item is treated as plain");
            ItemTypeIndex::default()
        }
    };
    let world = ClientState::new(Arc::new(types), config.aware_range, GameClock::new());
    let options = SessionOptions::from_config(&config).map_err(|err| err.to_string())?;
    let transport: Box<dyn Transport> = match config.transport {
        TransportKind::Tcp => Box::new(TcpTransport::new(DEFAULT_CONNECT_TIMEOUT)),
        TransportKind::WebSocket => Box::new(WsTransport::new(config.ws_path.clone())),
    };
    let mut session = GameSession::new(transport, world, options);
    play(&mut session, &config)
}

/// Logs in, enters the world with the configured character and keeps the
/// session polled until it ends or the configured run time elapses.
pub fn play<T: Transport>(
    session: &mut GameSession<T>,
    config: &ClientConfig,
) -> Result<(), String> {
    let (host, port) = config.login_endpoint().map_err(|err| err.to_string())?;
    let interval = config.frame_interval();
    let deadline = config
        .run_seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));

    session
        .login(&host, port, &config.account, &config.password)
        .map_err(|err| err.to_string())?;
    let handshake_deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    while session.state() != SessionState::Disconnected {
        session.poll().map_err(|err| err.to_string())?;
        report_events(session);
        if Instant::now() >= handshake_deadline {
            session.disconnect("login server did not answer");
            return Err("login server did not answer".to_string());
        }
        std::thread::sleep(interval);
    }
    report_events(session);

    let character = if config.character.is_empty() {
        session
            .characters()
            .first()
            .map(|entry| entry.name.clone())
            .ok_or_else(|| "login refused: no characters".to_string())?
    } else {
        config.character.clone()
    };
    session
        .enter_world(&character)
        .map_err(|err| err.to_string())?;

    let entry_deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    loop {
        session.poll().map_err(|err| err.to_string())?;
        report_events(session);
        match session.state() {
            SessionState::Disconnected => break,
            SessionState::AwaitingWorldEntry if Instant::now() >= entry_deadline => {
                session.disconnect("game server did not answer");
                report_events(session);
                return Err("game server did not answer".to_string());
            }
            _ => {}
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            if session.is_online() {
                if let Err(err) = session.send(&ClientCommand::Logout) {
                    tracing::debug!(error = %err, "logout not sent");
                }
            }
            session.disconnect("run time elapsed");
            report_events(session);
            break;
        }
        std::thread::sleep(interval);
    }

    let stats = session.decode_stats();
    tracing::info!(
        frames = stats.frames,
        messages = stats.messages,
        unknown_opcodes = stats.unknown_opcodes,
        errors = stats.errors,
        "session finished"
    );
    Ok(())
}

fn report_events<T: Transport>(session: &mut GameSession<T>) {
    for event in session.drain_events() {
        match &event {
            GameEvent::Connected => tracing::info!("connected"),
            GameEvent::Disconnected { reason } => tracing::info!(%reason, "disconnected"),
            GameEvent::LoginError(message) => tracing::error!(%message, "login refused"),
            GameEvent::LoginAdvice(message) => tracing::info!(%message, "login advice"),
            GameEvent::LoginWait { message, seconds } => {
                tracing::warn!(%message, seconds, "login queue")
            }
            GameEvent::CharacterList {
                characters,
                premium_days,
            } => {
                for entry in characters {
                    tracing::info!(
                        name = %entry.name,
                        world = %entry.world,
                        host = %entry.host(),
                        port = entry.port,
                        "character"
                    );
                }
                tracing::info!(premium_days, "character list complete");
            }
            GameEvent::TextMessage { kind, text } => tracing::info!(kind, %text, "message"),
            GameEvent::Talk { .. } => tracing::info!(?event, "talk"),
            GameEvent::Death => tracing::warn!("player died"),
            _ => tracing::debug!(?event, "event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::framing::FrameEncoder;
    use crate::net::packet::PacketWriter;
    use crate::world::state::test_support::client_state;

    #[test]
    fn play_stops_when_run_time_elapses() {
        let (transport, handle) = MemoryTransport::pair();
        let mut session = GameSession::new(transport, client_state(), SessionOptions::default());
        let mut writer = PacketWriter::new();
        writer.write_u8(0x64);
        writer.write_u8(1);
        writer.write_string_str("Knight");
        writer.write_string_str("Antica");
        writer.write_u32_le(u32::from_le_bytes([127, 0, 0, 1]));
        writer.write_u16_le(7172);
        writer.write_u16_le(0);
        handle.push_inbound(&FrameEncoder::default().encode(writer.as_slice()).expect("frame"));

        let config = ClientConfig {
            account: "111111".to_string(),
            password: "tibia".to_string(),
            frame_interval_ms: 1,
            run_seconds: Some(0),
            ..ClientConfig::default()
        };
        play(&mut session, &config).expect("play");
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(handle.connects().len(), 2);
        assert!(!handle.is_connected());
    }
}
