//! Storage trait definitions

use std::fmt;
use std::io::{self, Write};

/// A seekable, length-bounded byte source.
///
/// Positions are relative to the start of this input, so a slice behaves
/// exactly like a file of its own. Implementations are not shared between
/// threads; independent cursors come from `try_clone`.
pub trait FileInput: Send + fmt::Debug {
    /// Human-readable description (file name, or slice description).
    fn name(&self) -> &str;

    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current read position.
    fn position(&self) -> u64;

    /// Move the cursor. Seeking to exactly `len()` is allowed; beyond is
    /// `ErrorKind::UnexpectedEof`.
    fn seek(&mut self, pos: u64) -> io::Result<()>;

    /// Fill `buf` completely or fail with `ErrorKind::UnexpectedEof`.
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()>;

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        self.read_bytes(&mut byte)?;
        Ok(byte[0])
    }

    /// An independent input over `[offset, offset + length)` of this one.
    fn slice(&self, description: &str, offset: u64, length: u64) -> io::Result<Box<dyn FileInput>>;

    /// An independent cursor over the same bytes, positioned where this one is.
    fn try_clone(&self) -> io::Result<Box<dyn FileInput>>;
}

/// An append-only byte sink. Bytes become visible to readers after `close`.
pub trait FileOutput: Write + Send + fmt::Debug {
    fn name(&self) -> &str;

    /// Number of bytes written so far.
    fn position(&self) -> u64;

    fn close(self: Box<Self>) -> io::Result<()>;
}

/// A flat namespace of named files.
pub trait Directory: Send + Sync + fmt::Debug {
    /// Names of all files, sorted.
    fn list_all(&self) -> io::Result<Vec<String>>;

    fn file_length(&self, name: &str) -> io::Result<u64>;

    fn delete_file(&self, name: &str) -> io::Result<()>;

    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Create a new file. Fails with `ErrorKind::AlreadyExists` if `name` exists.
    fn create_output(&self, name: &str) -> io::Result<Box<dyn FileOutput>>;

    /// Create a new file with a unique name built from `prefix` and `suffix`.
    fn create_temp_output(&self, prefix: &str, suffix: &str) -> io::Result<Box<dyn FileOutput>>;

    fn open_input(&self, name: &str) -> io::Result<Box<dyn FileInput>>;

    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Zero-length input. Slicing returns another empty input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyInput;

impl FileInput for EmptyInput {
    fn name(&self) -> &str {
        "empty"
    }

    fn len(&self) -> u64 {
        0
    }

    fn position(&self) -> u64 {
        0
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        if pos != 0 {
            return Err(eof(format!("seek to {pos} in empty input")));
        }
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if !buf.is_empty() {
            return Err(eof("read from empty input"));
        }
        Ok(())
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> io::Result<Box<dyn FileInput>> {
        check_slice(description, 0, offset, length)?;
        Ok(Box::new(EmptyInput))
    }

    fn try_clone(&self) -> io::Result<Box<dyn FileInput>> {
        Ok(Box::new(EmptyInput))
    }
}

/// Read everything from the current position to the end of `input`.
pub fn read_remaining(input: &mut dyn FileInput) -> io::Result<Vec<u8>> {
    let remaining = input.len().saturating_sub(input.position());
    let remaining = usize::try_from(remaining)
        .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "input too large to buffer"))?;
    let mut out = vec![0u8; remaining];
    input.read_bytes(&mut out)?;
    Ok(out)
}

pub(crate) fn eof(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, message.into())
}

/// Validate a slice request against an input of `len` bytes.
pub(crate) fn check_slice(description: &str, len: u64, offset: u64, length: u64) -> io::Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("slice() {description} out of bounds: offset={offset}, length={length}, input length={len}"),
        )),
    }
}
