//! ceff-core: shared error taxonomy and configuration for the CEFF
//! (chunked encrypted file format) workspace.

pub mod config;
pub mod error;

pub use config::CeffConfig;
pub use error::{CeffError, CeffResult};

/// Smallest accepted plaintext chunk size (16 KiB)
pub const MIN_CHUNK_SIZE: u32 = 16 * 1024;

/// Largest accepted plaintext chunk size (1 GiB)
pub const MAX_CHUNK_SIZE: u32 = 1024 * 1024 * 1024;

/// Default plaintext chunk size (64 KiB)
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Validate a chunk size against `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
pub fn validate_chunk_size(chunk_size: u64) -> CeffResult<u32> {
    if chunk_size < MIN_CHUNK_SIZE as u64 || chunk_size > MAX_CHUNK_SIZE as u64 {
        return Err(CeffError::InvalidConfiguration(format!(
            "chunk size {chunk_size} out of range [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]"
        )));
    }
    Ok(chunk_size as u32)
}
