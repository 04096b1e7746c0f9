//! ceff-codec: chunked AEAD encryption for write-once, read-many files
//!
//! File format (little-endian):
//! ```text
//! HEADER := magic:i32 mode:u8 key_nonce wrapped_key
//! CHUNK  := nonce aad(chunk_index:i64 id_hi:i64 id_lo:i64) ciphertext tag
//! FOOTER := nonce aad(chunk_size:i64 last_chunk_index:i64 plain_len:i64) signature tag
//! ```
//!
//! The footer signature is SHA-512 over every chunk's AAD in index order,
//! sealed under the file's content key. Readers verify it on open, so a
//! reordered, truncated or spliced file is rejected before any plaintext is
//! returned. Chunks themselves are decrypted lazily as reads reach them.

pub mod directory;
pub mod format;
pub mod layout;
pub mod reader;
pub mod writer;

pub use directory::{CeffDirectory, DirectoryOptions};
pub use format::{is_ceff, MAGIC};
pub use layout::Layout;
pub use reader::CeffReader;
pub use writer::CeffWriter;
