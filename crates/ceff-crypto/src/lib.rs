//! ceff-crypto: pluggable AEAD primitives for the CEFF file codec
//!
//! Mode bytes (stored in every file header):
//! ```text
//! 0      null passthrough (no nonce, no tag; testing and legacy framing)
//! 1      AES-256-GCM        (12-byte nonce, 16-byte tag)
//! 2      ChaCha20-Poly1305  (12-byte nonce, 16-byte tag)
//! 3..=9  reserved
//! 10..   user-registered via ModeRegistry
//! ```
//!
//! Key hierarchy:
//! ```text
//! Master Key (256-bit, supplied by the caller)
//!   └── Content Key (per-file, 256-bit random, wrapped by master key in the header)
//!       ├── Chunk AEAD (nonce = random per chunk, AAD = chunk_index || chunk_id)
//!       └── Footer signature AEAD (AAD = chunk_size || last_chunk_index || plain_length)
//! ```

pub mod aead;
pub mod keys;
pub mod mode;
pub mod registry;

pub use aead::AeadCipher;
pub use keys::{unwrap_content_key, wrap_content_key, ContentKey, MasterKey, WrappedKey};
pub use mode::Mode;
pub use registry::{ModeRegistry, ModeRegistryBuilder};

/// Size of master and content keys in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Nonce size of the built-in AEAD modes (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Tag size of the built-in AEAD modes
pub const TAG_SIZE: usize = 16;

/// First mode byte available to user-registered modes
pub const FIRST_CUSTOM_MODE: u8 = 10;
