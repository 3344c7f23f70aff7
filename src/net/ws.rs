use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha1::{Digest, Sha1};

use crate::net::transport::{
    connect_stream, flush_pending, Transport, TransportError, DEFAULT_CONNECT_TIMEOUT,
};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_HANDSHAKE_BYTES: usize = 8192;
const MAX_FRAME_PAYLOAD: usize = 0x1_0000 + 2;

pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_BINARY: u8 = 0x2;
pub const OPCODE_CLOSE: u8 = 0x8;
pub const OPCODE_PING: u8 = 0x9;
pub const OPCODE_PONG: u8 = 0xA;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsFrame {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// `Sec-WebSocket-Accept` value a server must answer `key` with.
pub fn expected_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.trim().as_bytes());
    sha1.update(WS_GUID.as_bytes());
    BASE64_ENGINE.encode(sha1.finalize())
}

pub fn generate_key<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut nonce = [0u8; 16];
    rng.fill(&mut nonce);
    BASE64_ENGINE.encode(nonce)
}

pub fn handshake_request(host: &str, port: u16, path: &str, key: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
Host: {host}:{port}\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: {key}\r\n\
Sec-WebSocket-Version: 13\r\n\
\r\n"
    )
}

/// Checks the status line and accept header of a handshake response.
pub fn verify_handshake_response(response: &str, key: &str) -> Result<(), TransportError> {
    let mut lines = response.split("\r\n");
    let status = lines
        .next()
        .ok_or_else(|| TransportError::Handshake("empty response".to_string()))?;
    let code = status.split_whitespace().nth(1).unwrap_or("");
    if code != "101" {
        return Err(TransportError::Handshake(format!(
            "unexpected status '{status}'"
        )));
    }
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    if !matches!(
        headers.get("upgrade").map(|value| value.to_ascii_lowercase()),
        Some(value) if value == "websocket"
    ) {
        return Err(TransportError::Handshake("missing Upgrade: websocket".to_string()));
    }
    let accept = headers
        .get("sec-websocket-accept")
        .ok_or_else(|| TransportError::Handshake("missing Sec-WebSocket-Accept".to_string()))?;
    if *accept != expected_accept(key) {
        return Err(TransportError::Handshake("Sec-WebSocket-Accept mismatch".to_string()));
    }
    Ok(())
}

/// Builds one final frame; clients always pass a mask.
pub fn encode_frame(opcode: u8, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(14 + len);
    frame.push(0x80 | (opcode & 0x0f));
    let mask_bit = if mask.is_some() { 0x80 } else { 0 };
    if len < 126 {
        frame.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(mask_bit | 126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(mask_bit | 127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }
    match mask {
        Some(mask) => {
            frame.extend_from_slice(&mask);
            frame.extend(
                payload
                    .iter()
                    .enumerate()
                    .map(|(idx, byte)| byte ^ mask[idx % 4]),
            );
        }
        None => frame.extend_from_slice(payload),
    }
    frame
}

/// Parses one frame from the front of `buf`. Returns the frame and the bytes
/// it used, or `None` when more bytes are needed.
pub fn parse_frame(
    buf: &[u8],
    max_payload: usize,
) -> Result<Option<(WsFrame, usize)>, TransportError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let fin = (buf[0] & 0x80) != 0;
    let opcode = buf[0] & 0x0f;
    if !fin {
        return Err(TransportError::Protocol(
            "fragmented frames not supported".to_string(),
        ));
    }
    let masked = (buf[1] & 0x80) != 0;
    let mut offset = 2;
    let mut len = u64::from(buf[1] & 0x7f);
    if len == 126 {
        if buf.len() < offset + 2 {
            return Ok(None);
        }
        len = u64::from(u16::from_be_bytes([buf[2], buf[3]]));
        offset += 2;
    } else if len == 127 {
        if buf.len() < offset + 8 {
            return Ok(None);
        }
        let mut ext = [0u8; 8];
        ext.copy_from_slice(&buf[2..10]);
        len = u64::from_be_bytes(ext);
        offset += 8;
    }
    if opcode >= 0x8 && len > 125 {
        return Err(TransportError::Protocol(
            "control frame payload too large".to_string(),
        ));
    }
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    if len > max_payload {
        return Err(TransportError::Protocol(format!(
            "websocket payload {len} exceeds max {max_payload}"
        )));
    }
    let mut mask = [0u8; 4];
    if masked {
        if buf.len() < offset + 4 {
            return Ok(None);
        }
        mask.copy_from_slice(&buf[offset..offset + 4]);
        offset += 4;
    }
    if buf.len() < offset + len {
        return Ok(None);
    }
    let mut payload = buf[offset..offset + len].to_vec();
    if masked {
        for (idx, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[idx % 4];
        }
    }
    Ok(Some((WsFrame { opcode, payload }, offset + len)))
}

/// Game stream tunnelled through binary WebSocket frames.
#[derive(Debug)]
pub struct WsTransport {
    stream: Option<TcpStream>,
    path: String,
    raw: Vec<u8>,
    data: VecDeque<u8>,
    outgoing: Vec<u8>,
    rng: StdRng,
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            stream: None,
            path: path.into(),
            raw: Vec::new(),
            data: VecDeque::new(),
            outgoing: Vec::new(),
            rng: StdRng::from_entropy(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    fn handshake(&mut self, stream: &mut TcpStream, host: &str, port: u16) -> Result<(), TransportError> {
        let key = generate_key(&mut self.rng);
        stream.write_all(handshake_request(host, port, &self.path, &key).as_bytes())?;
        let mut response = Vec::new();
        let mut buf = [0u8; 512];
        let header_end = loop {
            let read = stream.read(&mut buf)?;
            if read == 0 {
                return Err(TransportError::Handshake("closed during handshake".to_string()));
            }
            response.extend_from_slice(&buf[..read]);
            if let Some(end) = response.windows(4).position(|chunk| chunk == b"\r\n\r\n") {
                break end + 4;
            }
            if response.len() > MAX_HANDSHAKE_BYTES {
                return Err(TransportError::Handshake("response exceeded max bytes".to_string()));
            }
        };
        verify_handshake_response(&String::from_utf8_lossy(&response[..header_end]), &key)?;
        self.raw.extend_from_slice(&response[header_end..]);
        Ok(())
    }

    fn queue_frame(&mut self, opcode: u8, payload: &[u8]) -> Result<(), TransportError> {
        let mask: [u8; 4] = self.rng.gen();
        self.outgoing
            .extend_from_slice(&encode_frame(opcode, payload, Some(mask)));
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        flush_pending(stream, &mut self.outgoing)
    }

    fn fill_raw(&mut self) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(read) => self.raw.extend_from_slice(&buf[..read]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn drain_frames(&mut self) -> Result<(), TransportError> {
        while let Some((frame, used)) = parse_frame(&self.raw, MAX_FRAME_PAYLOAD)? {
            self.raw.drain(..used);
            match frame.opcode {
                OPCODE_BINARY | OPCODE_TEXT => self.data.extend(frame.payload),
                OPCODE_PING => self.queue_frame(OPCODE_PONG, &frame.payload)?,
                OPCODE_CLOSE => {
                    let _ = self.queue_frame(OPCODE_CLOSE, &[]);
                    return Err(TransportError::Closed);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.close();
        let mut stream = connect_stream(host, port, self.connect_timeout)?;
        stream.set_read_timeout(Some(self.connect_timeout))?;
        self.handshake(&mut stream, host, port)?;
        stream.set_read_timeout(None)?;
        stream.set_nonblocking(true)?;
        tracing::debug!(host, port, path = %self.path, "websocket connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }
        self.queue_frame(OPCODE_BINARY, bytes)
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.data.is_empty() {
            let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
            flush_pending(stream, &mut self.outgoing)?;
            let filled = self.fill_raw();
            self.drain_frames()?;
            if self.data.is_empty() {
                filled?;
            }
        }
        let count = buf.len().min(self.data.len());
        for (slot, byte) in buf.iter_mut().zip(self.data.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.write_all(&encode_frame(OPCODE_CLOSE, &[], Some(self.rng.gen())));
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.raw.clear();
        self.data.clear();
        self.outgoing.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_value_matches_rfc_example() {
        assert_eq!(
            expected_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn handshake_response_is_verified() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let good = "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        assert!(verify_handshake_response(good, key).is_ok());
        let wrong = good.replace("s3pP", "xxxx");
        assert!(matches!(
            verify_handshake_response(&wrong, key),
            Err(TransportError::Handshake(_))
        ));
        assert!(verify_handshake_response("HTTP/1.1 400 Bad Request\r\n\r\n", key).is_err());
    }

    #[test]
    fn parses_rfc_sample_frames() {
        let unmasked = [0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let (frame, used) = parse_frame(&unmasked, 1024).expect("parse").expect("frame");
        assert_eq!(frame.opcode, OPCODE_TEXT);
        assert_eq!(frame.payload, b"Hello");
        assert_eq!(used, 7);

        let masked = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let (frame, _) = parse_frame(&masked, 1024).expect("parse").expect("frame");
        assert_eq!(frame.payload, b"Hello");
        assert_eq!(
            encode_frame(OPCODE_TEXT, b"Hello", Some([0x37, 0xfa, 0x21, 0x3d])),
            masked.to_vec()
        );
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let payload = vec![0xabu8; 300];
        let frame = encode_frame(OPCODE_BINARY, &payload, Some([1, 2, 3, 4]));
        for cut in 0..frame.len() {
            assert!(parse_frame(&frame[..cut], 1024).expect("parse").is_none());
        }
        let (parsed, used) = parse_frame(&frame, 1024).expect("parse").expect("frame");
        assert_eq!(parsed.payload, payload);
        assert_eq!(used, frame.len());
    }

    #[test]
    fn oversized_and_fragmented_frames_are_rejected() {
        let frame = encode_frame(OPCODE_BINARY, &[0u8; 200], None);
        assert!(parse_frame(&frame, 100).is_err());
        assert!(parse_frame(&[0x02, 0x00], 100).is_err());
    }

    #[test]
    fn generated_keys_are_sixteen_bytes() {
        let mut rng = StdRng::seed_from_u64(7);
        let key = generate_key(&mut rng);
        assert_eq!(BASE64_ENGINE.decode(key).expect("base64").len(), 16);
    }
}
