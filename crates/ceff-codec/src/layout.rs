//! Byte layout of a CEFF file: the single source of offset arithmetic for
//! both the writer and the reader.
//!
//! ```text
//! HEADER  magic:i32 | mode:u8 | key_nonce | wrapped_key (32 + tag)
//! CHUNK   nonce | aad (24) | ciphertext (<= chunk_size) | tag
//! FOOTER  nonce | aad (24) | signature (64) | tag
//! ```
//!
//! Every chunk but the last holds exactly `chunk_size` plaintext bytes. The
//! writer flushes a chunk as soon as it fills, so the last chunk always holds
//! fewer than `chunk_size` bytes (possibly zero). That makes the plaintext
//! length recoverable from the ciphertext length alone.

use ceff_core::{validate_chunk_size, CeffError, CeffResult};
use ceff_crypto::{Mode, KEY_SIZE};

/// magic (4) + mode byte (1)
pub const HEADER_PREFIX_LENGTH: u64 = 5;

/// chunk index + two id halves, or chunk size + last index + plaintext length
pub const AAD_LENGTH: usize = 24;

/// SHA-512 digest carried in the footer
pub const SIGNATURE_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    chunk_size: u64,
    nonce_length: u64,
    tag_length: u64,
}

impl Layout {
    /// Fix the layout for `mode`. Rejects chunk sizes outside [16 KiB, 1 GiB].
    pub fn new(mode: &Mode, chunk_size: u32) -> CeffResult<Self> {
        let chunk_size = validate_chunk_size(chunk_size as u64)?;
        Ok(Self {
            chunk_size: chunk_size as u64,
            nonce_length: mode.nonce_length() as u64,
            tag_length: mode.tag_length() as u64,
        })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn nonce_length(&self) -> usize {
        self.nonce_length as usize
    }

    pub fn tag_length(&self) -> usize {
        self.tag_length as usize
    }

    pub fn header_length(&self) -> u64 {
        Self::header_length_for(self.nonce_length, self.tag_length)
    }

    /// Header length for `mode`. Needed before the chunk size is known.
    pub fn mode_header_length(mode: &Mode) -> u64 {
        Self::header_length_for(mode.nonce_length() as u64, mode.tag_length() as u64)
    }

    /// Framing bytes around each chunk's ciphertext: nonce, AAD and tag.
    pub fn chunk_overhead(&self) -> u64 {
        self.nonce_length + AAD_LENGTH as u64 + self.tag_length
    }

    /// On-disk size of a full chunk record.
    pub fn chunk_stride(&self) -> u64 {
        self.chunk_size + self.chunk_overhead()
    }

    pub fn footer_length(&self) -> u64 {
        Self::footer_length_for(self.nonce_length, self.tag_length)
    }

    /// Footer length for `mode`. The chunk size is stored inside the footer.
    pub fn mode_footer_length(mode: &Mode) -> u64 {
        Self::footer_length_for(mode.nonce_length() as u64, mode.tag_length() as u64)
    }

    fn header_length_for(nonce_length: u64, tag_length: u64) -> u64 {
        HEADER_PREFIX_LENGTH + nonce_length + KEY_SIZE as u64 + tag_length
    }

    fn footer_length_for(nonce_length: u64, tag_length: u64) -> u64 {
        nonce_length + AAD_LENGTH as u64 + SIGNATURE_LENGTH as u64 + tag_length
    }

    /// Offset of chunk record `index` from the start of the file.
    pub fn chunk_offset(&self, index: u64) -> u64 {
        self.header_length() + index * self.chunk_stride()
    }

    /// Offset of the footer in a file of `cipher_length` bytes.
    pub fn footer_offset(&self, cipher_length: u64) -> CeffResult<u64> {
        self.body_length(cipher_length)?;
        Ok(cipher_length - self.footer_length())
    }

    /// Number of chunk records in a file of `cipher_length` bytes.
    pub fn chunk_count(&self, cipher_length: u64) -> CeffResult<u64> {
        let body = self.body_length(cipher_length)?;
        let count = body / self.chunk_stride() + 1;

        let last_record = body - (count - 1) * self.chunk_stride();
        if last_record < self.chunk_overhead() {
            return Err(CeffError::Format(format!(
                "ciphertext length {cipher_length} does not match chunk framing \
                 (chunk size {}, overhead {})",
                self.chunk_size,
                self.chunk_overhead()
            )));
        }
        Ok(count)
    }

    /// Plaintext length of a file of `cipher_length` bytes.
    pub fn plain_length(&self, cipher_length: u64) -> CeffResult<u64> {
        let count = self.chunk_count(cipher_length)?;
        Ok(self.body_length(cipher_length)? - count * self.chunk_overhead())
    }

    /// Number of chunks the writer emits for `plain_length` bytes.
    pub fn chunks_for(&self, plain_length: u64) -> u64 {
        plain_length / self.chunk_size + 1
    }

    /// Total file size the writer produces for `plain_length` bytes.
    pub fn cipher_length(&self, plain_length: u64) -> u64 {
        self.header_length()
            + self.chunks_for(plain_length) * self.chunk_overhead()
            + plain_length
            + self.footer_length()
    }

    /// Plaintext bytes held by chunk `index` of a `plain_length`-byte file.
    pub fn chunk_plain_length(&self, index: u64, plain_length: u64) -> u64 {
        let last = plain_length / self.chunk_size;
        if index < last {
            self.chunk_size
        } else {
            plain_length - last * self.chunk_size
        }
    }

    /// On-disk size of chunk record `index` of a `plain_length`-byte file.
    pub fn record_length(&self, index: u64, plain_length: u64) -> u64 {
        self.chunk_overhead() + self.chunk_plain_length(index, plain_length)
    }

    fn body_length(&self, cipher_length: u64) -> CeffResult<u64> {
        let framing = self.header_length() + self.footer_length() + self.chunk_overhead();
        if cipher_length < framing {
            return Err(CeffError::Format(format!(
                "file too short: {cipher_length} bytes (minimum {framing})"
            )));
        }
        Ok(cipher_length - self.header_length() - self.footer_length())
    }
}
