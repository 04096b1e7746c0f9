//! In-memory storage backend (for testing and tooling)

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::traits::{check_slice, eof, Directory, FileInput, FileOutput};

type Files = Arc<RwLock<HashMap<String, Arc<[u8]>>>>;

/// Names handed out by `create_output` whose outputs are not closed yet.
/// Lock order: `files` before `pending`.
type Pending = Arc<Mutex<HashSet<String>>>;

fn poisoned<T>(_: PoisonError<T>) -> io::Error {
    io::Error::other("memory directory lock poisoned")
}

/// In-memory directory.
///
/// Clones share the same file map. Not persistent: data is lost when the last
/// clone is dropped. A name is reserved from `create_output` until its output
/// is closed or dropped, so a second create of the same name fails.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    files: Files,
    pending: Pending,
    temp_counter: Arc<AtomicU64>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored bytes of `name`.
    pub fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        self.files
            .read()
            .map_err(poisoned)?
            .get(name)
            .map(|data| data.to_vec())
            .ok_or_else(|| not_found(name))
    }

    /// Store raw bytes under `name`, replacing any existing file.
    pub fn write_file(&self, name: &str, data: &[u8]) -> io::Result<()> {
        self.files
            .write()
            .map_err(poisoned)?
            .insert(name.to_string(), Arc::from(data));
        Ok(())
    }

    /// Total bytes stored
    pub fn total_size(&self) -> io::Result<u64> {
        Ok(self
            .files
            .read()
            .map_err(poisoned)?
            .values()
            .map(|data| data.len() as u64)
            .sum())
    }
}

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {name}"))
}

fn already_exists(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("file already exists: {name}"),
    )
}

impl Directory for MemoryDirectory {
    fn list_all(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().map_err(poisoned)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_length(&self, name: &str) -> io::Result<u64> {
        self.files
            .read()
            .map_err(poisoned)?
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| not_found(name))
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        self.files
            .write()
            .map_err(poisoned)?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut files = self.files.write().map_err(poisoned)?;
        let data = files.remove(from).ok_or_else(|| not_found(from))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn create_output(&self, name: &str) -> io::Result<Box<dyn FileOutput>> {
        {
            let files = self.files.read().map_err(poisoned)?;
            let mut pending = self.pending.lock().map_err(poisoned)?;
            if files.contains_key(name) || !pending.insert(name.to_string()) {
                return Err(already_exists(name));
            }
        }
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
            reservation: Reservation {
                name: name.to_string(),
                pending: Arc::clone(&self.pending),
            },
        }))
    }

    fn create_temp_output(&self, prefix: &str, suffix: &str) -> io::Result<Box<dyn FileOutput>> {
        loop {
            let counter = self.temp_counter.fetch_add(1, Ordering::Relaxed);
            let name = format!("{prefix}_{suffix}_{counter:x}.tmp");
            match self.create_output(&name) {
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                result => return result,
            }
        }
    }

    fn open_input(&self, name: &str) -> io::Result<Box<dyn FileInput>> {
        let data = self
            .files
            .read()
            .map_err(poisoned)?
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))?;
        let length = data.len() as u64;
        Ok(Box::new(MemoryInput {
            name: name.to_string(),
            data,
            offset: 0,
            length,
            pos: 0,
        }))
    }
}

#[derive(Debug)]
struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: Files,
    reservation: Reservation,
}

/// Holds a name in `pending` until dropped.
#[derive(Debug)]
struct Reservation {
    name: String,
    pending: Pending,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileOutput for MemoryOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let MemoryOutput {
            name,
            buffer,
            files,
            reservation,
        } = *self;
        let mut stored = files.write().map_err(poisoned)?;
        stored.insert(name, Arc::from(buffer));
        // release under the files lock: a create sees the file or the reservation
        drop(reservation);
        Ok(())
    }
}

/// A window `[offset, offset + length)` over an immutable snapshot.
#[derive(Debug, Clone)]
struct MemoryInput {
    name: String,
    data: Arc<[u8]>,
    offset: u64,
    length: u64,
    pos: u64,
}

impl FileInput for MemoryInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.length {
            return Err(eof(format!(
                "seek past EOF: {pos} > {} ({})",
                self.length, self.name
            )));
        }
        self.pos = pos;
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let end = self.pos + buf.len() as u64;
        if end > self.length {
            return Err(eof(format!(
                "read past EOF: {end} > {} ({})",
                self.length, self.name
            )));
        }
        let start = (self.offset + self.pos) as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        self.pos = end;
        Ok(())
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> io::Result<Box<dyn FileInput>> {
        check_slice(description, self.length, offset, length)?;
        Ok(Box::new(MemoryInput {
            name: format!("{} [slice={description}]", self.name),
            data: Arc::clone(&self.data),
            offset: self.offset + offset,
            length,
            pos: 0,
        }))
    }

    fn try_clone(&self) -> io::Result<Box<dyn FileInput>> {
        Ok(Box::new(self.clone()))
    }
}
