//! Directory facade: wraps a backend `Directory` so that new files are
//! written encrypted and existing files are verified and decrypted on read.
//! Files without the CEFF magic are passed through untouched.

use std::io;

use ceff_core::{CeffConfig, CeffError, CeffResult, DEFAULT_CHUNK_SIZE};
use ceff_crypto::{MasterKey, Mode, ModeRegistry};
use ceff_storage::{Directory, FileInput, FileOutput};

use crate::format::is_ceff;
use crate::layout::Layout;
use crate::reader::CeffReader;
use crate::writer::CeffWriter;

/// How new files are written.
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    /// Plaintext bytes per chunk (default: 65536)
    pub chunk_size: u32,
    /// Mode for new files (default: AES-256-GCM)
    pub mode: Mode,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            mode: ModeRegistry::default().strongest(),
        }
    }
}

#[derive(Debug)]
pub struct CeffDirectory<D: Directory> {
    backend: D,
    master_key: MasterKey,
    options: DirectoryOptions,
    registry: ModeRegistry,
}

impl<D: Directory> CeffDirectory<D> {
    /// Wrap `backend`. Existing files are read with the built-in modes; use
    /// `with_registry` to read files written with registered modes.
    pub fn new(backend: D, master_key: MasterKey, options: DirectoryOptions) -> CeffResult<Self> {
        Layout::new(&options.mode, options.chunk_size)?;
        options.mode.validate_key(master_key.as_bytes())?;
        Ok(Self {
            backend,
            master_key,
            options,
            registry: ModeRegistry::default(),
        })
    }

    /// Build from a loaded config, resolving its mode byte through `registry`.
    pub fn from_config(
        backend: D,
        config: &CeffConfig,
        registry: &ModeRegistry,
        master_key: MasterKey,
    ) -> CeffResult<Self> {
        config.validate()?;
        let mode = registry.get(config.mode).map_err(|_| {
            CeffError::InvalidConfiguration(format!("config names unregistered mode byte {}", config.mode))
        })?;
        let options = DirectoryOptions {
            chunk_size: config.chunk_size,
            mode,
        };
        Ok(Self::new(backend, master_key, options)?.with_registry(registry.clone()))
    }

    /// Resolve mode bytes of existing files through `registry`.
    pub fn with_registry(mut self, registry: ModeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn backend(&self) -> &D {
        &self.backend
    }

    pub fn options(&self) -> &DirectoryOptions {
        &self.options
    }

    pub fn create(&self, name: &str) -> CeffResult<CeffWriter> {
        let output = self.backend.create_output(name)?;
        self.writer(output)
    }

    pub fn create_temp(&self, prefix: &str, suffix: &str) -> CeffResult<CeffWriter> {
        let output = self.backend.create_temp_output(prefix, suffix)?;
        self.writer(output)
    }

    /// Open `name` for reading: a verified `CeffReader` for CEFF files, the
    /// raw backend input for anything else.
    pub fn open_for_read(&self, name: &str) -> CeffResult<Box<dyn FileInput>> {
        let mut input = self.backend.open_input(name)?;
        if !is_ceff(input.as_mut())? {
            tracing::debug!(file = name, length = input.len(), "not a ceff file, passing through");
            return Ok(input);
        }
        Ok(Box::new(CeffReader::open(input, &self.registry, &self.master_key)?))
    }

    /// Open `name` as a CEFF file. Unlike `open_for_read` there is no
    /// passthrough: a missing magic is a `Format` error.
    pub fn open_reader(&self, name: &str) -> CeffResult<CeffReader> {
        CeffReader::open(self.backend.open_input(name)?, &self.registry, &self.master_key)
    }

    /// Plaintext length for CEFF files, raw length for anything else.
    pub fn file_length(&self, name: &str) -> CeffResult<u64> {
        let mut input = self.backend.open_input(name)?;
        if !is_ceff(input.as_mut())? {
            return Ok(input.len());
        }
        CeffReader::probe_length(input.as_mut(), &self.registry, &self.master_key)
    }

    pub fn list_all(&self) -> CeffResult<Vec<String>> {
        Ok(self.backend.list_all()?)
    }

    pub fn delete_file(&self, name: &str) -> CeffResult<()> {
        Ok(self.backend.delete_file(name)?)
    }

    pub fn rename(&self, from: &str, to: &str) -> CeffResult<()> {
        Ok(self.backend.rename(from, to)?)
    }

    /// Close the backend. Handles already issued are owned by their callers.
    pub fn close(&self) -> CeffResult<()> {
        Ok(self.backend.close()?)
    }

    fn writer(&self, output: Box<dyn FileOutput>) -> CeffResult<CeffWriter> {
        CeffWriter::new(
            output,
            self.options.mode.clone(),
            self.options.chunk_size,
            &self.master_key,
        )
    }
}

impl<D: Directory> Directory for CeffDirectory<D> {
    fn list_all(&self) -> io::Result<Vec<String>> {
        Ok(CeffDirectory::list_all(self)?)
    }

    fn file_length(&self, name: &str) -> io::Result<u64> {
        Ok(CeffDirectory::file_length(self, name)?)
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        Ok(CeffDirectory::delete_file(self, name)?)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        Ok(CeffDirectory::rename(self, from, to)?)
    }

    fn create_output(&self, name: &str) -> io::Result<Box<dyn FileOutput>> {
        Ok(Box::new(self.create(name)?))
    }

    fn create_temp_output(&self, prefix: &str, suffix: &str) -> io::Result<Box<dyn FileOutput>> {
        Ok(Box::new(self.create_temp(prefix, suffix)?))
    }

    fn open_input(&self, name: &str) -> io::Result<Box<dyn FileInput>> {
        Ok(self.open_for_read(name)?)
    }

    fn close(&self) -> io::Result<()> {
        Ok(CeffDirectory::close(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use ceff_storage::{read_remaining, MemoryDirectory};

    fn facade(backend: MemoryDirectory) -> CeffDirectory<MemoryDirectory> {
        let options = DirectoryOptions {
            chunk_size: 16 * 1024,
            ..DirectoryOptions::default()
        };
        CeffDirectory::new(backend, MasterKey::from_bytes([5u8; 32]), options).unwrap()
    }

    #[test]
    fn test_defaults() {
        let options = DirectoryOptions::default();
        assert_eq!(options.chunk_size, 65536);
        assert_eq!(options.mode, Mode::Aes256Gcm);
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let options = DirectoryOptions {
            chunk_size: 100,
            ..DirectoryOptions::default()
        };
        let result = CeffDirectory::new(MemoryDirectory::new(), MasterKey::from_bytes([0; 32]), options);
        assert!(matches!(result, Err(CeffError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_file_length_is_plaintext_length() {
        let backend = MemoryDirectory::new();
        let dir = facade(backend.clone());
        let mut w = dir.create("seg").unwrap();
        w.write_all(&[1u8; 20_000]).unwrap();
        w.close().unwrap();

        assert_eq!(dir.file_length("seg").unwrap(), 20_000);
        assert!(backend.file_length("seg").unwrap() > 20_000);

        backend.write_file("legacy", b"plain old bytes").unwrap();
        assert_eq!(dir.file_length("legacy").unwrap(), 15);
    }

    #[test]
    fn test_legacy_passthrough() {
        let backend = MemoryDirectory::new();
        backend.write_file("old", b"not encrypted").unwrap();
        backend.write_file("tiny", b"ab").unwrap();
        let dir = facade(backend);

        let mut input = dir.open_for_read("old").unwrap();
        assert_eq!(read_remaining(input.as_mut()).unwrap(), b"not encrypted");
        let mut input = dir.open_for_read("tiny").unwrap();
        assert_eq!(read_remaining(input.as_mut()).unwrap(), b"ab");

        assert!(matches!(dir.open_reader("old"), Err(CeffError::Format(_))));
    }

    #[test]
    fn test_from_config_unknown_mode() {
        let config = CeffConfig {
            chunk_size: 16 * 1024,
            mode: 42,
        };
        let result = CeffDirectory::from_config(
            MemoryDirectory::new(),
            &config,
            &ModeRegistry::default(),
            MasterKey::from_bytes([0; 32]),
        );
        assert!(matches!(result, Err(CeffError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_null_mode_through_facade() {
        let backend = MemoryDirectory::new();
        let options = DirectoryOptions {
            chunk_size: 16 * 1024,
            mode: Mode::Null,
        };
        let dir = CeffDirectory::new(backend.clone(), MasterKey::from_bytes([5u8; 32]), options).unwrap();
        let mut w = dir.create("dbg").unwrap();
        w.write_all(b"visible framing").unwrap();
        w.close().unwrap();

        // header (5 + 32) then the first chunk's AAD, then the plaintext as-is
        let stored = backend.read_file("dbg").unwrap();
        assert_eq!(&stored[37 + 24..37 + 24 + 15], b"visible framing");

        let mut input = dir.open_for_read("dbg").unwrap();
        assert_eq!(input.len(), 15);
        assert_eq!(read_remaining(input.as_mut()).unwrap(), b"visible framing");
    }

    #[test]
    fn test_rename_delete_list_pass_through() {
        let backend = MemoryDirectory::new();
        let dir = facade(backend.clone());
        dir.create("a").unwrap().close().unwrap();
        dir.rename("a", "b").unwrap();
        assert_eq!(dir.list_all().unwrap(), vec!["b"]);
        dir.delete_file("b").unwrap();
        assert!(backend.list_all().unwrap().is_empty());
        dir.close().unwrap();
    }
}
