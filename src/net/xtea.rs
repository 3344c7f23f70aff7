use rand::Rng;
use thiserror::Error;

pub const XTEA_KEY_BYTES: usize = 16;
pub const XTEA_BLOCK_BYTES: usize = 8;
const XTEA_DELTA: u32 = 0x9e3779b9;
const XTEA_ROUNDS: u32 = 32;
const XTEA_PAD_BYTE: u8 = 0x33;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XteaError {
    #[error("xtea payload length {0} is not a multiple of 8")]
    Unaligned(usize),
    #[error("xtea payload too short for inner length")]
    MissingInnerLength,
    #[error("xtea inner length {inner} exceeds decrypted payload of {available} bytes")]
    InnerLength { inner: usize, available: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XteaKey {
    key: [u32; 4],
}

impl XteaKey {
    pub fn from_bytes(bytes: [u8; XTEA_KEY_BYTES]) -> Self {
        let mut key = [0u32; 4];
        for (idx, chunk) in bytes.chunks_exact(4).enumerate() {
            key[idx] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { key }
    }

    pub fn from_words(key: [u32; 4]) -> Self {
        Self { key }
    }

    /// Fresh session key. A zero key is never produced.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let key = Self {
                key: [rng.gen(), rng.gen(), rng.gen(), rng.gen()],
            };
            if !key.is_zero() {
                return key;
            }
        }
    }

    pub fn words(&self) -> [u32; 4] {
        self.key
    }

    pub fn to_bytes(&self) -> [u8; XTEA_KEY_BYTES] {
        let mut bytes = [0u8; XTEA_KEY_BYTES];
        for (idx, word) in self.key.iter().enumerate() {
            bytes[idx * 4..idx * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn is_zero(&self) -> bool {
        self.key.iter().all(|&value| value == 0)
    }

    pub fn decrypt_in_place(&self, data: &mut [u8]) -> Result<(), XteaError> {
        if data.len() % XTEA_BLOCK_BYTES != 0 {
            return Err(XteaError::Unaligned(data.len()));
        }
        for chunk in data.chunks_exact_mut(XTEA_BLOCK_BYTES) {
            let mut v0 = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let mut v1 = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            let mut sum = XTEA_DELTA.wrapping_mul(XTEA_ROUNDS);
            for _ in 0..XTEA_ROUNDS {
                v1 = v1.wrapping_sub(
                    ((v0 << 4) ^ (v0 >> 5))
                        .wrapping_add(v0)
                        .wrapping_add(sum ^ self.key[((sum >> 11) & 3) as usize]),
                );
                sum = sum.wrapping_sub(XTEA_DELTA);
                v0 = v0.wrapping_sub(
                    ((v1 << 4) ^ (v1 >> 5))
                        .wrapping_add(v1)
                        .wrapping_add(sum ^ self.key[(sum & 3) as usize]),
                );
            }
            chunk[..4].copy_from_slice(&v0.to_le_bytes());
            chunk[4..].copy_from_slice(&v1.to_le_bytes());
        }
        Ok(())
    }

    pub fn encrypt_in_place(&self, data: &mut [u8]) -> Result<(), XteaError> {
        if data.len() % XTEA_BLOCK_BYTES != 0 {
            return Err(XteaError::Unaligned(data.len()));
        }
        for chunk in data.chunks_exact_mut(XTEA_BLOCK_BYTES) {
            let mut v0 = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let mut v1 = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            let mut sum = 0u32;
            for _ in 0..XTEA_ROUNDS {
                v0 = v0.wrapping_add(
                    ((v1 << 4) ^ (v1 >> 5))
                        .wrapping_add(v1)
                        .wrapping_add(sum ^ self.key[(sum & 3) as usize]),
                );
                sum = sum.wrapping_add(XTEA_DELTA);
                v1 = v1.wrapping_add(
                    ((v0 << 4) ^ (v0 >> 5))
                        .wrapping_add(v0)
                        .wrapping_add(sum ^ self.key[((sum >> 11) & 3) as usize]),
                );
            }
            chunk[..4].copy_from_slice(&v0.to_le_bytes());
            chunk[4..].copy_from_slice(&v1.to_le_bytes());
        }
        Ok(())
    }

    pub fn encrypt_padded(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = data.to_vec();
        let padding = (XTEA_BLOCK_BYTES - (buf.len() % XTEA_BLOCK_BYTES)) % XTEA_BLOCK_BYTES;
        buf.extend(std::iter::repeat(XTEA_PAD_BYTE).take(padding));
        // Padded to the block size above, so alignment cannot fail.
        let _ = self.encrypt_in_place(&mut buf);
        buf
    }

    /// Encrypts `message` behind its u16 inner length, as carried in a frame body.
    pub fn seal(&self, message: &[u8]) -> Vec<u8> {
        let mut plain = Vec::with_capacity(message.len() + 2 + XTEA_BLOCK_BYTES);
        plain.extend_from_slice(&(message.len().min(usize::from(u16::MAX)) as u16).to_le_bytes());
        plain.extend_from_slice(message);
        self.encrypt_padded(&plain)
    }

    /// Reverses [`XteaKey::seal`], dropping the padding.
    pub fn open(&self, body: &[u8]) -> Result<Vec<u8>, XteaError> {
        let mut buf = body.to_vec();
        self.decrypt_in_place(&mut buf)?;
        if buf.len() < 2 {
            return Err(XteaError::MissingInnerLength);
        }
        let inner = usize::from(u16::from_le_bytes([buf[0], buf[1]]));
        let available = buf.len() - 2;
        if inner > available {
            return Err(XteaError::InnerLength { inner, available });
        }
        buf.truncate(inner + 2);
        buf.drain(..2);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn padded_payload_decrypts_with_pad_bytes() {
        let key = XteaKey::from_bytes([0x11; 16]);
        let payload = b"hello-xtea";
        let mut encrypted = key.encrypt_padded(payload);
        assert_eq!(encrypted.len() % XTEA_BLOCK_BYTES, 0);
        key.decrypt_in_place(&mut encrypted).expect("decrypt");
        assert_eq!(&encrypted[..payload.len()], payload);
        assert!(encrypted[payload.len()..].iter().all(|byte| *byte == XTEA_PAD_BYTE));
    }

    #[test]
    fn known_vector_for_zero_key() {
        // Reference XTEA output for an all-zero key and block.
        let key = XteaKey::from_words([0, 0, 0, 0]);
        let mut block = [0u8; 8];
        key.encrypt_in_place(&mut block).expect("encrypt");
        assert_eq!(
            [
                u32::from_le_bytes([block[0], block[1], block[2], block[3]]),
                u32::from_le_bytes([block[4], block[5], block[6], block[7]]),
            ],
            [0xdee9d4d8, 0xf7131ed9]
        );
    }

    #[test]
    fn sealed_message_opens_to_original() {
        let key = XteaKey::from_words([1, 2, 3, 4]);
        let sealed = key.seal(b"\x1e");
        assert_eq!(sealed.len(), 8);
        assert_eq!(key.open(&sealed).expect("open"), b"\x1e");
    }

    #[test]
    fn open_rejects_wrong_key_or_alignment() {
        let key = XteaKey::from_words([1, 2, 3, 4]);
        let sealed = key.seal(b"some longer payload");
        assert_eq!(
            key.open(&sealed[..sealed.len() - 1]),
            Err(XteaError::Unaligned(sealed.len() - 1))
        );
        let other = XteaKey::from_words([4, 3, 2, 1]);
        assert_ne!(other.open(&sealed), Ok(b"some longer payload".to_vec()));
    }

    #[test]
    fn generated_keys_are_nonzero_and_serialisable() {
        let mut rng = StdRng::seed_from_u64(7);
        let key = XteaKey::generate(&mut rng);
        assert!(!key.is_zero());
        assert_eq!(XteaKey::from_bytes(key.to_bytes()), key);
    }
}
