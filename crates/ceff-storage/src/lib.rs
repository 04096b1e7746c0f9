//! ceff-storage: the synchronous "directory" capability the codec wraps
//!
//! A `Directory` hands out append-only `FileOutput`s and seekable
//! `FileInput`s. Inputs support windowed `slice`s and independent
//! `try_clone`s; both own their own cursor and their own handle.
//!
//! Backends:
//! - `local`: files under a root directory on the local filesystem
//! - `memory`: shared in-process map (tests, tooling)

pub mod local;
pub mod memory;
pub mod traits;

pub use local::FsDirectory;
pub use memory::MemoryDirectory;
pub use traits::{read_remaining, Directory, EmptyInput, FileInput, FileOutput};
