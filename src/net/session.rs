use crate::config::ClientConfig;
use crate::events::GameEvent;
use crate::net::framing::{FrameDecoder, FrameEncoder, FrameError};
use crate::net::game::{DecodeStats, ProtocolDecoder, ProtocolFeatures, Signal};
use crate::net::game_client::{encode_command, ClientCommand};
use crate::net::login::{
    build_game_login, build_login_request, parse_login_response, CharacterEntry, GameLoginRequest,
    LoginError, LoginRequest, LoginResponse,
};
use crate::net::transport::{Transport, TransportError};
use crate::net::xtea::XteaKey;
use crate::world::movement::{WalkError, WalkStep};
use crate::world::position::{Direction, Position};
use crate::world::state::ClientState;
use thiserror::Error;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingCharacterList,
    AwaitingWorldEntry,
    Online,
    Disconnected,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("framing: {0}")]
    Frame(#[from] FrameError),
    #[error("login: {0}")]
    Login(#[from] LoginError),
    #[error("walk: {0}")]
    Walk(#[from] WalkError),
    #[error("character '{0}' is not on the character list")]
    UnknownCharacter(String),
    #[error("operation needs {expected}, session is {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: SessionState,
    },
    #[error("command {0:?} has no wire form")]
    Unencodable(ClientCommand),
}

/// Protocol settings fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub client_os: u16,
    pub client_version: u16,
    pub features: ProtocolFeatures,
    /// Connect here instead of the address the character list names.
    pub game_endpoint: Option<(String, u16)>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_os: 2,
            client_version: crate::config::DEFAULT_CLIENT_VERSION,
            features: ProtocolFeatures::legacy(),
            game_endpoint: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &ClientConfig) -> Result<Self, crate::config::ConfigError> {
        Ok(Self {
            client_os: config.client_os,
            client_version: config.client_version,
            features: config.features,
            game_endpoint: config.game_endpoint()?,
        })
    }
}

/// One login-then-play session over a [`Transport`]. Owns the world model
/// and hands it to the decoder frame by frame.
#[derive(Debug)]
pub struct GameSession<T: Transport> {
    transport: T,
    state: SessionState,
    options: SessionOptions,
    decoder: ProtocolDecoder,
    inbound: FrameDecoder,
    outbound: FrameEncoder,
    world: ClientState,
    characters: Vec<CharacterEntry>,
    premium_days: u16,
    account: String,
    password: String,
    read_buf: Vec<u8>,
}

impl<T: Transport> GameSession<T> {
    pub fn new(transport: T, world: ClientState, options: SessionOptions) -> Self {
        Self {
            transport,
            state: SessionState::Disconnected,
            decoder: ProtocolDecoder::new(options.features),
            options,
            inbound: FrameDecoder::default(),
            outbound: FrameEncoder::default(),
            world,
            characters: Vec::new(),
            premium_days: 0,
            account: String::new(),
            password: String::new(),
            read_buf: vec![0u8; READ_CHUNK],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == SessionState::Online
    }

    pub fn world(&self) -> &ClientState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut ClientState {
        &mut self.world
    }

    pub fn characters(&self) -> &[CharacterEntry] {
        &self.characters
    }

    pub fn premium_days(&self) -> u16 {
        self.premium_days
    }

    pub fn decode_stats(&self) -> DecodeStats {
        self.decoder.stats()
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        self.world.events.drain()
    }

    /// Connects to the login server and asks for the character list.
    pub fn login(
        &mut self,
        host: &str,
        port: u16,
        account: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        self.expect_state(SessionState::Disconnected, "a disconnected session")?;
        self.state = SessionState::Connecting;
        self.characters.clear();
        self.account = account.to_string();
        self.password = password.to_string();
        let key = self.open_connection(host, port)?;
        let request = build_login_request(
            &LoginRequest {
                client_type: self.options.client_os,
                client_version: self.options.client_version,
                account,
                password,
            },
            key.as_ref(),
        );
        self.send_handshake(&request, key)?;
        self.state = SessionState::AwaitingCharacterList;
        tracing::info!(host, port, "login request sent");
        Ok(())
    }

    /// Connects to the game server hosting `character`, taken from the last
    /// character list.
    pub fn enter_world(&mut self, character: &str) -> Result<(), SessionError> {
        self.expect_state(SessionState::Disconnected, "a disconnected session")?;
        let entry = self
            .characters
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(character))
            .cloned()
            .ok_or_else(|| SessionError::UnknownCharacter(character.to_string()))?;
        let (host, port) = self
            .options
            .game_endpoint
            .clone()
            .unwrap_or_else(|| (entry.host().to_string(), entry.port));
        self.state = SessionState::Connecting;
        let key = self.open_connection(&host, port)?;
        let request = build_game_login(&GameLoginRequest {
            client_os: self.options.client_os,
            client_version: self.options.client_version,
            key,
            is_gm: false,
            account: &self.account,
            character: &entry.name,
            password: &self.password,
        });
        self.send_handshake(&request, key)?;
        self.state = SessionState::AwaitingWorldEntry;
        tracing::info!(character = %entry.name, host = %host, port, "entering game world");
        Ok(())
    }

    fn open_connection(&mut self, host: &str, port: u16) -> Result<Option<XteaKey>, SessionError> {
        self.inbound.reset();
        self.outbound.reset();
        if let Err(err) = self.transport.connect(host, port) {
            tracing::warn!(host, port, error = %err, "connect failed");
            self.state = SessionState::Disconnected;
            return Err(err.into());
        }
        self.world.events.push(GameEvent::Connected);
        Ok(self
            .options
            .features
            .xtea
            .then(|| XteaKey::generate(&mut rand::thread_rng())))
    }

    /// The handshake goes out in the clear; everything after it is sealed.
    fn send_handshake(&mut self, message: &[u8], key: Option<XteaKey>) -> Result<(), SessionError> {
        let frame = self.outbound.encode(message)?;
        if let Err(err) = self.transport.send(&frame) {
            self.disconnect("handshake send failed");
            return Err(err.into());
        }
        self.outbound.set_cipher(key);
        self.inbound.set_cipher(key);
        Ok(())
    }

    /// Reads whatever arrived, applies it in order, then advances animations
    /// and movement. Returns the number of frames handled.
    pub fn poll(&mut self) -> Result<usize, SessionError> {
        if self.state == SessionState::Disconnected {
            return Ok(0);
        }
        let center = self.world.map.central_position();
        let mut handled = 0;
        loop {
            let read = match self.transport.poll_read(&mut self.read_buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(TransportError::Closed) => {
                    self.disconnect("connection closed by server");
                    return Ok(handled);
                }
                Err(err) => {
                    self.disconnect("transport error");
                    return Err(err.into());
                }
            };
            let bytes = self.read_buf[..read].to_vec();
            for frame in self.inbound.decode(&bytes) {
                handled += 1;
                match frame {
                    Ok(frame) => self.handle_frame(&frame)?,
                    Err(err) if err.is_fatal() => {
                        self.disconnect("framing lost");
                        return Err(err.into());
                    }
                    Err(err) => tracing::warn!(error = %err, "frame dropped"),
                }
                if self.state == SessionState::Disconnected {
                    return Ok(handled);
                }
            }
        }

        if self.state == SessionState::Online {
            if let Some(direction) = self.world.tick() {
                self.send(&ClientCommand::Walk(direction))?;
            }
            if self.world.map.central_position() != center {
                self.world.map.evict_unaware_tiles();
            }
        }
        Ok(handled)
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        match self.state {
            SessionState::AwaitingCharacterList => self.handle_login_frame(frame),
            SessionState::AwaitingWorldEntry | SessionState::Online => {
                let report = self.decoder.decode_frame(&mut self.world, frame);
                for signal in report.signals {
                    match signal {
                        Signal::GameStarted(id) => {
                            self.state = SessionState::Online;
                            tracing::info!(player = id.0, "session online");
                        }
                        Signal::Ping => self.send(&ClientCommand::Ping)?,
                        Signal::LoginRejected(reason) => {
                            self.disconnect(&reason);
                            return Ok(());
                        }
                        Signal::Death => tracing::info!("local player died"),
                    }
                }
                Ok(())
            }
            SessionState::Connecting | SessionState::Disconnected => {
                tracing::debug!(len = frame.len(), "frame outside a connection ignored");
                Ok(())
            }
        }
    }

    fn handle_login_frame(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        let responses = match parse_login_response(frame) {
            Ok(responses) => responses,
            Err(err) => {
                self.disconnect("malformed login response");
                return Err(err.into());
            }
        };
        for response in responses {
            match response {
                LoginResponse::Error(message) => {
                    self.world.events.push(GameEvent::LoginError(message.clone()));
                    self.disconnect(&message);
                    return Ok(());
                }
                LoginResponse::Advice(message) => {
                    self.world.events.push(GameEvent::LoginAdvice(message));
                }
                LoginResponse::Wait { message, seconds } => {
                    self.world.events.push(GameEvent::LoginWait {
                        message: message.clone(),
                        seconds,
                    });
                    self.disconnect(&message);
                    return Ok(());
                }
                LoginResponse::CharacterList {
                    characters,
                    premium_days,
                } => {
                    tracing::info!(count = characters.len(), premium_days, "character list received");
                    self.characters = characters.clone();
                    self.premium_days = premium_days;
                    self.world.events.push(GameEvent::CharacterList {
                        characters,
                        premium_days,
                    });
                    self.disconnect("character list received");
                    return Ok(());
                }
                LoginResponse::Success { player_id, .. } => {
                    tracing::debug!(player_id, "login accepted");
                }
            }
        }
        Ok(())
    }

    /// Local walk: predicts the step, then tells the server.
    pub fn walk(&mut self, direction: Direction) -> Result<WalkStep, SessionError> {
        self.expect_state(SessionState::Online, "an online session")?;
        let step = self.world.walk(direction)?;
        self.send(&ClientCommand::Walk(direction))?;
        Ok(step)
    }

    pub fn turn(&mut self, direction: Direction) -> Result<(), SessionError> {
        self.expect_state(SessionState::Online, "an online session")?;
        self.send(&ClientCommand::Turn(direction))
    }

    /// Plans a path and queues it; steps go out one by one from `poll`.
    pub fn auto_walk_to(&mut self, goal: Position) -> Result<usize, SessionError> {
        self.expect_state(SessionState::Online, "an online session")?;
        Ok(self.world.auto_walk_to(goal)?)
    }

    pub fn stop_auto_walk(&mut self) -> Result<(), SessionError> {
        self.world.player.movement.stop_auto_walk();
        self.send(&ClientCommand::StopAutoWalk)
    }

    pub fn send(&mut self, command: &ClientCommand) -> Result<(), SessionError> {
        if !matches!(
            self.state,
            SessionState::AwaitingWorldEntry | SessionState::Online
        ) {
            return Err(SessionError::InvalidState {
                expected: "a game connection",
                actual: self.state,
            });
        }
        let message =
            encode_command(command).ok_or_else(|| SessionError::Unencodable(command.clone()))?;
        let frame = self.outbound.encode(&message)?;
        tracing::trace!(opcode = message[0], len = message.len(), "command sent");
        if let Err(err) = self.transport.send(&frame) {
            self.disconnect("send failed");
            return Err(err.into());
        }
        Ok(())
    }

    /// Tears down the connection, then the world, then pending movement.
    /// Safe to call in any state.
    pub fn disconnect(&mut self, reason: &str) {
        let was_connected = self.state != SessionState::Disconnected;
        self.transport.close();
        self.inbound.reset();
        self.outbound.reset();
        self.world.reset();
        self.state = SessionState::Disconnected;
        if was_connected {
            tracing::info!(reason, "disconnected");
            self.world.events.push(GameEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
    }

    fn expect_state(&self, expected: SessionState, label: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected: label,
                actual: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::login::OPCODE_LOGIN_ERROR;
    use crate::net::packet::PacketWriter;
    use crate::net::transport::{MemoryHandle, MemoryTransport};
    use crate::world::state::test_support::client_state;

    fn frame(message: &[u8]) -> Vec<u8> {
        FrameEncoder::default().encode(message).expect("frame")
    }

    fn session() -> (GameSession<MemoryTransport>, MemoryHandle) {
        let (transport, handle) = MemoryTransport::pair();
        (
            GameSession::new(transport, client_state(), SessionOptions::default()),
            handle,
        )
    }

    #[test]
    fn login_error_disconnects_with_reason() {
        let (mut session, handle) = session();
        session.login("127.0.0.1", 7171, "1", "pw").expect("login");
        assert_eq!(session.state(), SessionState::AwaitingCharacterList);
        let mut writer = PacketWriter::new();
        writer.write_u8(OPCODE_LOGIN_ERROR);
        writer.write_string_str("Accountnumber or password is not correct.");
        handle.push_inbound(&frame(writer.as_slice()));
        session.poll().expect("poll");
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!handle.is_connected());
        let events = session.drain_events();
        assert_eq!(events[0], GameEvent::Connected);
        assert_eq!(
            events[1],
            GameEvent::LoginError("Accountnumber or password is not correct.".to_string())
        );
        assert!(matches!(events[2], GameEvent::Disconnected { .. }));
    }

    #[test]
    fn operations_check_session_state() {
        let (mut session, _handle) = session();
        assert!(matches!(
            session.walk(Direction::North),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(matches!(
            session.send(&ClientCommand::Ping),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(matches!(
            session.enter_world("Knight"),
            Err(SessionError::UnknownCharacter(_))
        ));
        assert_eq!(session.poll().expect("poll"), 0);
    }

    #[test]
    fn refused_connection_leaves_session_disconnected() {
        let (mut session, handle) = session();
        handle.refuse_connections(true);
        assert!(matches!(
            session.login("127.0.0.1", 7171, "1", "pw"),
            Err(SessionError::Transport(TransportError::Connect { .. }))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
        handle.refuse_connections(false);
        session.login("127.0.0.1", 7171, "1", "pw").expect("retry");
    }

    #[test]
    fn fatal_framing_error_disconnects() {
        let (mut session, handle) = session();
        session.login("127.0.0.1", 7171, "1", "pw").expect("login");
        handle.push_inbound(&[0x00, 0x00, 0x1e]);
        assert!(matches!(
            session.poll(),
            Err(SessionError::Frame(FrameError::ZeroLength))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (mut session, _handle) = session();
        session.disconnect("first");
        session.disconnect("second");
        assert!(session.drain_events().is_empty());
    }
}
