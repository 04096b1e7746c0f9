//! Fixed-width framing records: header prefix, chunk AAD and footer AAD.
//! All integers are little-endian.

use std::io;

use ceff_core::{CeffError, CeffResult};
use ceff_crypto::{Mode, WrappedKey};
use ceff_storage::FileInput;

use crate::layout::{AAD_LENGTH, HEADER_PREFIX_LENGTH};

/// First four bytes of every CEFF file.
pub const MAGIC: i32 = 846_197_364;

/// Associated data of one chunk: its sequential index and random 128-bit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAad {
    pub index: i64,
    pub id_hi: i64,
    pub id_lo: i64,
}

impl ChunkAad {
    /// Split a 128-bit chunk id into its stored halves.
    pub fn new(index: u64, id: u128) -> Self {
        Self {
            index: index as i64,
            id_hi: (id >> 64) as u64 as i64,
            id_lo: id as u64 as i64,
        }
    }

    pub fn to_bytes(&self) -> [u8; AAD_LENGTH] {
        encode_triple(self.index, self.id_hi, self.id_lo)
    }

    pub fn from_bytes(bytes: &[u8; AAD_LENGTH]) -> Self {
        let (index, id_hi, id_lo) = decode_triple(bytes);
        Self { index, id_hi, id_lo }
    }
}

/// Associated data of the footer signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FooterAad {
    pub chunk_size: i64,
    pub last_chunk_index: i64,
    pub plain_length: i64,
}

impl FooterAad {
    pub fn to_bytes(&self) -> [u8; AAD_LENGTH] {
        encode_triple(self.chunk_size, self.last_chunk_index, self.plain_length)
    }

    pub fn from_bytes(bytes: &[u8; AAD_LENGTH]) -> Self {
        let (chunk_size, last_chunk_index, plain_length) = decode_triple(bytes);
        Self {
            chunk_size,
            last_chunk_index,
            plain_length,
        }
    }
}

fn encode_triple(a: i64, b: i64, c: i64) -> [u8; AAD_LENGTH] {
    let mut out = [0u8; AAD_LENGTH];
    out[0..8].copy_from_slice(&a.to_le_bytes());
    out[8..16].copy_from_slice(&b.to_le_bytes());
    out[16..24].copy_from_slice(&c.to_le_bytes());
    out
}

fn decode_triple(bytes: &[u8; AAD_LENGTH]) -> (i64, i64, i64) {
    let field = |i: usize| {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
        i64::from_le_bytes(word)
    };
    (field(0), field(1), field(2))
}

/// Serialize the full header: magic, mode byte, wrapped content key.
pub fn encode_header(mode: &Mode, wrapped: &WrappedKey) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(HEADER_PREFIX_LENGTH as usize + wrapped.nonce.len() + wrapped.ciphertext.len());
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.push(mode.id());
    out.extend_from_slice(&wrapped.nonce);
    out.extend_from_slice(&wrapped.ciphertext);
    out
}

/// Parse the header prefix, returning the mode byte.
pub fn decode_prefix(prefix: &[u8; HEADER_PREFIX_LENGTH as usize]) -> CeffResult<u8> {
    if !has_magic(prefix) {
        return Err(CeffError::Format(format!(
            "bad magic {:#010x} (expected {MAGIC:#010x})",
            i32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]])
        )));
    }
    Ok(prefix[4])
}

/// Whether `bytes` starts with the CEFF magic.
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == MAGIC.to_le_bytes()
}

/// Peek at the first bytes of `input` and report whether it is a CEFF file.
/// The cursor is restored.
pub fn is_ceff(input: &mut dyn FileInput) -> io::Result<bool> {
    if input.len() < HEADER_PREFIX_LENGTH {
        return Ok(false);
    }
    let saved = input.position();
    input.seek(0)?;
    let mut magic = [0u8; 4];
    input.read_bytes(&mut magic)?;
    input.seek(saved)?;
    Ok(has_magic(&magic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceff_storage::{Directory, MemoryDirectory};

    #[test]
    fn test_magic_bytes() {
        assert_eq!(MAGIC.to_le_bytes(), [0x74, 0xf2, 0x6f, 0x32]);
        assert!(has_magic(&[0x74, 0xf2, 0x6f, 0x32, 1]));
        assert!(!has_magic(&[0x74, 0xf2, 0x6f]));
    }

    #[test]
    fn test_chunk_id_halves() {
        let id = 0x0123_4567_89ab_cdef_fedc_ba98_7654_3210u128;
        let aad = ChunkAad::new(7, id);
        assert_eq!(aad.index, 7);
        assert_eq!(aad.id_hi as u64, 0x0123_4567_89ab_cdef);
        assert_eq!(aad.id_lo as u64, 0xfedc_ba98_7654_3210);

        let bytes = aad.to_bytes();
        assert_eq!(&bytes[..8], &7i64.to_le_bytes());
        assert_eq!(ChunkAad::from_bytes(&bytes), aad);
    }

    #[test]
    fn test_footer_aad_field_order() {
        let aad = FooterAad {
            chunk_size: 16384,
            last_chunk_index: 2,
            plain_length: 40_000,
        };
        let bytes = aad.to_bytes();
        assert_eq!(&bytes[..8], &16384i64.to_le_bytes());
        assert_eq!(&bytes[8..16], &2i64.to_le_bytes());
        assert_eq!(&bytes[16..], &40_000i64.to_le_bytes());
    }

    #[test]
    fn test_header_encoding() {
        let wrapped = WrappedKey {
            nonce: vec![1; 12],
            ciphertext: vec![2; 48],
        };
        let header = encode_header(&Mode::ChaCha20Poly1305, &wrapped);
        assert_eq!(header.len(), 5 + 12 + 48);

        let prefix: [u8; 5] = header[..5].try_into().unwrap();
        assert_eq!(decode_prefix(&prefix).unwrap(), 2);
        assert!(matches!(
            decode_prefix(&[0, 0, 0, 0, 1]),
            Err(CeffError::Format(_))
        ));
    }

    #[test]
    fn test_is_ceff_restores_cursor() {
        let dir = MemoryDirectory::new();
        dir.write_file("enc", &[MAGIC.to_le_bytes().as_slice(), &[1, 9, 9]].concat())
            .unwrap();
        dir.write_file("plain", b"hello world").unwrap();
        dir.write_file("short", &MAGIC.to_le_bytes()).unwrap();

        let mut input = dir.open_input("enc").unwrap();
        input.seek(6).unwrap();
        assert!(is_ceff(input.as_mut()).unwrap());
        assert_eq!(input.position(), 6);

        assert!(!is_ceff(dir.open_input("plain").unwrap().as_mut()).unwrap());
        assert!(!is_ceff(dir.open_input("short").unwrap().as_mut()).unwrap());
    }
}
