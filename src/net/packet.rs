use crate::world::position::Position;
use thiserror::Error;

/// Longest string the decoder accepts before truncating.
pub const MAX_STRING_LEN: usize = 0x4000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// A read ran past the end of the message.
    #[error("packet truncated at offset {offset}: needed {needed} bytes, {remaining} left")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
}

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<(), PacketError> {
        if self.remaining() < needed {
            return Err(PacketError::Truncated {
                offset: self.pos,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn peek_u8(&self) -> Result<u8, PacketError> {
        self.ensure(1)?;
        Ok(self.data[self.pos])
    }

    pub fn peek_u16_le(&self) -> Result<u16, PacketError> {
        self.ensure(2)?;
        Ok(u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]))
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        let value = self.peek_u8()?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, PacketError> {
        let value = self.peek_u16_le()?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_u32_le(&mut self) -> Result<u32, PacketError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, PacketError> {
        let low = u64::from(self.read_u32_le()?);
        let high = u64::from(self.read_u32_le()?);
        Ok(low | (high << 32))
    }

    pub fn read_len_prefixed(&mut self) -> Result<usize, PacketError> {
        let len = self.read_u16_le()? as usize;
        if len == 0xffff {
            return Ok(self.read_u32_le()? as usize);
        }
        Ok(len)
    }

    /// Reads a length-prefixed string, keeping at most `max_len - 1` bytes
    /// and skipping the rest.
    pub fn read_string_limited(&mut self, max_len: usize) -> Result<Vec<u8>, PacketError> {
        let len = self.read_len_prefixed()?;
        if len == 0 {
            return Ok(Vec::new());
        }

        if max_len > 0 && len >= max_len {
            let take = max_len - 1;
            self.ensure(len)?;
            let kept = self.read_bytes(take)?.to_vec();
            self.skip(len - take)?;
            return Ok(kept);
        }

        Ok(self.read_bytes(len)?.to_vec())
    }

    pub fn read_string_lossy(&mut self, max_len: usize) -> Result<String, PacketError> {
        let bytes = self.read_string_limited(max_len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn read_string(&mut self) -> Result<String, PacketError> {
        self.read_string_lossy(MAX_STRING_LEN)
    }

    pub fn read_position(&mut self) -> Result<Position, PacketError> {
        let x = self.read_u16_le()?;
        let y = self.read_u16_le()?;
        let z = self.read_u8()?;
        Ok(Position { x, y, z })
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        self.ensure(len)?;
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..start + len])
    }

    pub fn read_remaining(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        rest
    }

    pub fn skip(&mut self, len: usize) -> Result<(), PacketError> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    data: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.write_u32_le((value & 0xffff_ffff) as u32);
        self.write_u32_le((value >> 32) as u32);
    }

    pub fn write_len_prefixed(&mut self, len: usize) {
        if len > 0xfffe {
            self.write_u16_le(0xffff);
            self.write_u32_le(len as u32);
        } else {
            self.write_u16_le(len as u16);
        }
    }

    pub fn write_string(&mut self, bytes: &[u8]) {
        self.write_len_prefixed(bytes.len());
        self.write_bytes(bytes);
    }

    pub fn write_string_str(&mut self, value: &str) {
        self.write_string(value.as_bytes());
    }

    pub fn write_position(&mut self, position: Position) {
        self.write_u16_le(position.x);
        self.write_u16_le(position.y);
        self.write_u8(position.z);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_next(state: &mut u64) -> u32 {
        *state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (*state >> 32) as u32
    }

    #[test]
    fn string_survives_varied_lengths() {
        let mut state = 0x1234_5678_9abc_def0;
        for _ in 0..64 {
            let len = (lcg_next(&mut state) % 1024) as usize;
            let bytes: Vec<u8> = (0..len)
                .map(|_| (lcg_next(&mut state) & 0xff) as u8)
                .collect();
            let mut writer = PacketWriter::new();
            writer.write_string(&bytes);
            let mut reader = PacketReader::new(writer.as_slice());
            let decoded = reader.read_string_limited(len + 1).expect("string");
            assert_eq!(decoded, bytes);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn string_truncates_and_skips() {
        let mut writer = PacketWriter::new();
        writer.write_string(b"abcdefghij");
        writer.write_u8(0x42);
        let mut reader = PacketReader::new(writer.as_slice());
        let decoded = reader.read_string_limited(5).expect("string");
        assert_eq!(decoded, b"abcd");
        assert_eq!(reader.read_u8(), Ok(0x42));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn long_len_prefix_is_honoured() {
        let len = 0xffff + 5;
        let bytes = vec![0x7f; len];
        let mut writer = PacketWriter::new();
        writer.write_string(&bytes);
        let mut reader = PacketReader::new(writer.as_slice());
        let decoded = reader.read_string_limited(len + 1).expect("string");
        assert_eq!(decoded.len(), len);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn read_past_end_reports_offset() {
        let mut reader = PacketReader::new(&[0x01, 0x02, 0x03]);
        assert_eq!(reader.read_u16_le(), Ok(0x0201));
        assert_eq!(
            reader.read_u32_le(),
            Err(PacketError::Truncated {
                offset: 2,
                needed: 4,
                remaining: 1,
            })
        );
        assert_eq!(reader.read_u8(), Ok(0x03));
    }

    #[test]
    fn string_longer_than_message_is_truncation() {
        let mut writer = PacketWriter::new();
        writer.write_u16_le(40);
        writer.write_bytes(b"short");
        let mut reader = PacketReader::new(writer.as_slice());
        assert!(matches!(
            reader.read_string_limited(8),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn peek_does_not_advance() {
        let mut writer = PacketWriter::new();
        writer.write_u16_le(0xff03);
        let mut reader = PacketReader::new(writer.as_slice());
        assert_eq!(reader.peek_u16_le(), Ok(0xff03));
        assert_eq!(reader.peek_u8(), Ok(0x03));
        assert_eq!(reader.read_u16_le(), Ok(0xff03));
        assert!(reader.peek_u8().is_err());
    }

    #[test]
    fn position_layout_is_five_bytes() {
        let mut writer = PacketWriter::new();
        writer.write_position(Position { x: 0x0164, y: 0x0102, z: 7 });
        assert_eq!(writer.as_slice(), &[0x64, 0x01, 0x02, 0x01, 0x07]);
        let mut reader = PacketReader::new(writer.as_slice());
        assert_eq!(
            reader.read_position(),
            Ok(Position { x: 0x0164, y: 0x0102, z: 7 })
        );
    }
}
