use crate::net::packet::{PacketError, PacketReader, PacketWriter, MAX_STRING_LEN};
use crate::net::xtea::{XteaKey, XTEA_KEY_BYTES};
use std::net::Ipv4Addr;
use thiserror::Error;

pub const OPCODE_LOGIN: u8 = 0x0a;
pub const OPCODE_LOGIN_ERROR: u8 = 0x14;
pub const OPCODE_LOGIN_ADVICE: u8 = 0x15;
pub const OPCODE_LOGIN_WAIT: u8 = 0x16;
pub const OPCODE_CHARACTER_LIST: u8 = 0x64;
pub const OPCODE_LOGIN_SUCCESS: u8 = 0x0b;

const LOGIN_MARKER: u8 = 0x00;
const MAX_LOGIN_TEXT: usize = 0x122;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("login response: {0}")]
    Packet(#[from] PacketError),
    #[error("unexpected login opcode 0x{0:02x}")]
    UnexpectedOpcode(u8),
    #[error("empty login response")]
    Empty,
}

/// One entry of the character list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterEntry {
    pub name: String,
    pub world: String,
    /// Wire order: the first octet is the low byte.
    pub ip: u32,
    pub port: u16,
}

impl CharacterEntry {
    pub fn host(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip.to_le_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResponse {
    Error(String),
    Advice(String),
    Wait { message: String, seconds: u8 },
    CharacterList {
        characters: Vec<CharacterEntry>,
        premium_days: u16,
    },
    Success {
        client_type: u16,
        client_version: u16,
        player_id: u64,
    },
}

#[derive(Debug, Clone)]
pub struct LoginRequest<'a> {
    pub client_type: u16,
    pub client_version: u16,
    pub account: &'a str,
    pub password: &'a str,
}

/// Login-server request. With a key, the fields after it are encrypted.
pub fn build_login_request(request: &LoginRequest<'_>, key: Option<&XteaKey>) -> Vec<u8> {
    let mut fields = PacketWriter::with_capacity(0x40);
    fields.write_u16_le(request.client_type);
    fields.write_u16_le(request.client_version);
    fields.write_u8(0);
    fields.write_u64_le(request.account.trim().parse::<u64>().unwrap_or(0));
    fields.write_string_str(request.account);
    fields.write_string_str(request.password);

    let mut writer = PacketWriter::with_capacity(0x60);
    writer.write_u8(OPCODE_LOGIN);
    writer.write_u8(LOGIN_MARKER);
    match key {
        Some(key) => {
            writer.write_bytes(&key.to_bytes());
            writer.write_bytes(&key.encrypt_padded(fields.as_slice()));
        }
        None => {
            writer.write_bytes(&[0u8; XTEA_KEY_BYTES]);
            writer.write_bytes(fields.as_slice());
        }
    }
    writer.into_vec()
}

#[derive(Debug, Clone)]
pub struct GameLoginRequest<'a> {
    pub client_os: u16,
    pub client_version: u16,
    pub key: Option<XteaKey>,
    pub is_gm: bool,
    pub account: &'a str,
    pub character: &'a str,
    pub password: &'a str,
}

/// Game-server login naming the chosen character.
pub fn build_game_login(request: &GameLoginRequest<'_>) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(0x60);
    writer.write_u8(OPCODE_LOGIN);
    writer.write_u16_le(request.client_os);
    writer.write_u16_le(request.client_version);
    if let Some(key) = request.key.as_ref() {
        writer.write_u8(0);
        for word in key.words() {
            writer.write_u32_le(word);
        }
    }
    writer.write_bool(request.is_gm);
    writer.write_string_str(request.account);
    writer.write_string_str(request.character);
    writer.write_string_str(request.password);
    writer.into_vec()
}

/// Parses every response message in one login-server frame.
pub fn parse_login_response(data: &[u8]) -> Result<Vec<LoginResponse>, LoginError> {
    let mut reader = PacketReader::new(data);
    let mut responses = Vec::new();
    while !reader.is_empty() {
        let opcode = reader.read_u8()?;
        let response = match opcode {
            OPCODE_LOGIN_ERROR => LoginResponse::Error(reader.read_string_lossy(MAX_LOGIN_TEXT)?),
            OPCODE_LOGIN_ADVICE => {
                LoginResponse::Advice(reader.read_string_lossy(MAX_LOGIN_TEXT)?)
            }
            OPCODE_LOGIN_WAIT => LoginResponse::Wait {
                message: reader.read_string_lossy(MAX_LOGIN_TEXT)?,
                seconds: reader.read_u8()?,
            },
            OPCODE_CHARACTER_LIST => {
                let count = reader.read_u8()?;
                let mut characters = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    characters.push(CharacterEntry {
                        name: reader.read_string_lossy(MAX_STRING_LEN)?,
                        world: reader.read_string_lossy(MAX_STRING_LEN)?,
                        ip: reader.read_u32_le()?,
                        port: reader.read_u16_le()?,
                    });
                }
                LoginResponse::CharacterList {
                    characters,
                    premium_days: reader.read_u16_le()?,
                }
            }
            OPCODE_LOGIN_SUCCESS => LoginResponse::Success {
                client_type: reader.read_u16_le()?,
                client_version: reader.read_u16_le()?,
                player_id: reader.read_u64_le()?,
            },
            other => {
                tracing::warn!(opcode = other, "unknown login response opcode");
                return Err(LoginError::UnexpectedOpcode(other));
            }
        };
        responses.push(response);
    }
    if responses.is_empty() {
        return Err(LoginError::Empty);
    }
    Ok(responses)
}
