use crate::net::xtea::{XteaError, XteaKey};
use thiserror::Error;

/// Largest frame body accepted from the server.
pub const MAX_FRAME_LEN: usize = 0xfff0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("packet length is zero")]
    ZeroLength,
    #[error("packet length {len} exceeds max {max}")]
    TooLong { len: usize, max: usize },
    #[error("frame cipher: {0}")]
    Cipher(#[from] XteaError),
    #[error("outgoing message of {0} bytes does not fit a frame")]
    TooLarge(usize),
}

impl FrameError {
    /// Framing is lost and the connection cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::ZeroLength | FrameError::TooLong { .. })
    }
}

/// Splits the inbound byte stream into frame bodies, decrypting each one
/// once a session key is installed.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    cipher: Option<XteaKey>,
    max_len: usize,
    broken: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            cipher: None,
            max_len,
            broken: false,
        }
    }

    pub fn set_cipher(&mut self, cipher: Option<XteaKey>) {
        self.cipher = cipher;
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cipher = None;
        self.broken = false;
    }

    /// Appends `bytes` and returns every frame completed so far, in order.
    /// A frame that fails to decrypt is reported and skipped; a bad length
    /// prefix is reported once and ends decoding for good.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<Result<Vec<u8>, FrameError>> {
        let mut frames = Vec::new();
        if self.broken {
            return frames;
        }
        self.buffer.extend_from_slice(bytes);
        loop {
            if self.buffer.len() < 2 {
                break;
            }
            let len = usize::from(u16::from_le_bytes([self.buffer[0], self.buffer[1]]));
            if len == 0 || len > self.max_len {
                let err = if len == 0 {
                    FrameError::ZeroLength
                } else {
                    FrameError::TooLong {
                        len,
                        max: self.max_len,
                    }
                };
                tracing::warn!(error = %err, "framing lost");
                self.broken = true;
                self.buffer.clear();
                frames.push(Err(err));
                break;
            }
            let total = 2 + len;
            if self.buffer.len() < total {
                break;
            }
            let body: Vec<u8> = self.buffer.drain(..total).skip(2).collect();
            match self.cipher.as_ref() {
                Some(key) => match key.open(&body) {
                    Ok(message) => frames.push(Ok(message)),
                    Err(err) => {
                        tracing::warn!(error = %err, len, "dropping undecryptable frame");
                        frames.push(Err(FrameError::Cipher(err)));
                    }
                },
                None => frames.push(Ok(body)),
            }
        }
        frames
    }
}

/// Wraps outgoing messages in a length prefix, sealing them first when a
/// session key is installed.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    cipher: Option<XteaKey>,
}

impl FrameEncoder {
    pub fn set_cipher(&mut self, cipher: Option<XteaKey>) {
        self.cipher = cipher;
    }

    pub fn reset(&mut self) {
        self.cipher = None;
    }

    pub fn encode(&self, message: &[u8]) -> Result<Vec<u8>, FrameError> {
        let body = match self.cipher.as_ref() {
            Some(key) => {
                if message.len() > usize::from(u16::MAX) {
                    return Err(FrameError::TooLarge(message.len()));
                }
                key.seal(message)
            }
            None => message.to_vec(),
        };
        let len = u16::try_from(body.len()).map_err(|_| FrameError::TooLarge(message.len()))?;
        let mut framed = Vec::with_capacity(2 + body.len());
        framed.extend_from_slice(&len.to_le_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }
}
