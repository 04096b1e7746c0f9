//! Decrypting reader: verifies the whole-file signature on open, then
//! decrypts chunks lazily as reads and seeks touch them.
//!
//! A reader is one cursor. Slices and clones are new readers that share the
//! immutable key material and own their backend handle and buffers, so they
//! can be moved to other threads and used concurrently. An integrity failure
//! seen by any of them disables all of them.

use std::fmt;
use std::io::{self, Read, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ceff_core::{CeffError, CeffResult};
use ceff_crypto::{unwrap_content_key, ContentKey, MasterKey, Mode, ModeRegistry, WrappedKey, KEY_SIZE};
use ceff_storage::{EmptyInput, FileInput};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use crate::format::{decode_prefix, ChunkAad, FooterAad};
use crate::layout::{Layout, AAD_LENGTH, HEADER_PREFIX_LENGTH, SIGNATURE_LENGTH};

/// State shared by a reader and every slice and clone made from it.
struct Shared {
    mode: Mode,
    key: ContentKey,
    layout: Layout,
    /// Chunks in the whole file
    chunk_count: u64,
    /// Plaintext length of the whole file
    plain_length: u64,
    /// Set once any cursor over the file fails a chunk check
    failed: AtomicBool,
}

impl Shared {
    fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

/// Header and footer of a file, decoded and authenticated.
struct Framing {
    shared: Shared,
    signature: Vec<u8>,
}

/// Random-access plaintext view of a CEFF file (or of a range of one).
pub struct CeffReader {
    shared: Arc<Shared>,
    input: Box<dyn FileInput>,
    /// Position in `input` of the record of chunk `start_chunk`
    input_base: u64,
    start_chunk: u64,
    /// Absolute plaintext offset of this reader's position 0
    offset: u64,
    length: u64,
    file_pointer: u64,
    current_chunk: Option<u64>,
    buffer: Vec<u8>,
    record: Vec<u8>,
}

impl CeffReader {
    /// Open and fully verify a CEFF file.
    ///
    /// Checks the magic and mode, unwraps the content key, authenticates the
    /// footer, scans every chunk's AAD against the footer signature and
    /// decrypts chunk 0. Nothing is returned unless all of that succeeds.
    pub fn open(
        mut input: Box<dyn FileInput>,
        registry: &ModeRegistry,
        master_key: &MasterKey,
    ) -> CeffResult<Self> {
        let Framing { shared, signature } = read_framing(input.as_mut(), registry, master_key)?;
        verify_signature(input.as_mut(), &shared, &signature)?;

        tracing::debug!(
            file = input.name(),
            mode = %shared.mode,
            chunk_size = shared.layout.chunk_size(),
            chunks = shared.chunk_count,
            plain_length = shared.plain_length,
            "opened ceff reader"
        );

        let input_base = shared.layout.header_length();
        let length = shared.plain_length;
        let mut reader = Self {
            shared: Arc::new(shared),
            input,
            input_base,
            start_chunk: 0,
            offset: 0,
            length,
            file_pointer: 0,
            current_chunk: None,
            buffer: Vec::new(),
            record: Vec::new(),
        };
        reader.load_chunk(0)?;
        Ok(reader)
    }

    /// Plaintext length of a CEFF file from its header and footer alone.
    pub fn probe_length(
        input: &mut dyn FileInput,
        registry: &ModeRegistry,
        master_key: &MasterKey,
    ) -> CeffResult<u64> {
        Ok(read_framing(input, registry, master_key)?.shared.plain_length)
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn position(&self) -> u64 {
        self.file_pointer
    }

    pub fn mode(&self) -> &Mode {
        &self.shared.mode
    }

    pub fn chunk_size(&self) -> u64 {
        self.shared.layout.chunk_size()
    }

    /// Chunks in the underlying file.
    pub fn chunk_count(&self) -> u64 {
        self.shared.chunk_count
    }

    pub fn name(&self) -> &str {
        self.input.name()
    }

    /// Move the cursor, decrypting the target chunk unless it is already
    /// buffered. Seeking to exactly `len()` is allowed.
    pub fn seek(&mut self, pos: u64) -> CeffResult<()> {
        if pos > self.length {
            return Err(CeffError::UnexpectedEof(format!(
                "seek past EOF: {pos} > {} ({})",
                self.length,
                self.name()
            )));
        }
        self.file_pointer = pos;
        if pos < self.length {
            let chunk = (self.offset + pos) / self.shared.layout.chunk_size();
            self.load_chunk(chunk)?;
        }
        Ok(())
    }

    /// Fill `buf` completely, or fail with `UnexpectedEof` without consuming
    /// anything.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> CeffResult<()> {
        let remaining = self.length - self.file_pointer;
        if buf.len() as u64 > remaining {
            return Err(CeffError::UnexpectedEof(format!(
                "read past EOF: {} bytes requested, {remaining} remaining ({})",
                buf.len(),
                self.name()
            )));
        }
        self.read_available(buf)?;
        Ok(())
    }

    pub fn read_byte(&mut self) -> CeffResult<u8> {
        let mut byte = [0u8; 1];
        self.read_bytes(&mut byte)?;
        Ok(byte[0])
    }

    /// A reader over `[offset, offset + length)` of this one, bound to a
    /// backend slice covering only the chunk records it spans.
    pub fn slice(&self, description: &str, offset: u64, length: u64) -> CeffResult<Box<dyn FileInput>> {
        match offset.checked_add(length) {
            Some(end) if end <= self.length => {}
            _ => {
                return Err(CeffError::InvalidConfiguration(format!(
                    "slice() {description} out of bounds: offset={offset}, length={length}, \
                     input length={} ({})",
                    self.length,
                    self.name()
                )))
            }
        }
        if length == 0 {
            return Ok(Box::new(EmptyInput));
        }

        let layout = self.shared.layout;
        let start = self.offset + offset;
        let first_chunk = start / layout.chunk_size();
        let last_chunk = (start + length - 1) / layout.chunk_size();

        let window_start = self.input_position(first_chunk);
        let window_end =
            self.input_position(last_chunk) + layout.record_length(last_chunk, self.shared.plain_length);
        let input = self
            .input
            .slice(description, window_start, window_end - window_start)?;

        tracing::debug!(
            file = self.name(),
            description,
            offset = start,
            length,
            chunks = last_chunk - first_chunk + 1,
            "sliced ceff reader"
        );

        Ok(Box::new(Self {
            shared: Arc::clone(&self.shared),
            input,
            input_base: 0,
            start_chunk: first_chunk,
            offset: start,
            length,
            file_pointer: 0,
            current_chunk: None,
            buffer: Vec::new(),
            record: Vec::new(),
        }))
    }

    /// An independent cursor at the same position with its own backend
    /// handle and buffers.
    pub fn try_clone(&self) -> CeffResult<Self> {
        Ok(Self {
            shared: Arc::clone(&self.shared),
            input: self.input.try_clone()?,
            input_base: self.input_base,
            start_chunk: self.start_chunk,
            offset: self.offset,
            length: self.length,
            file_pointer: self.file_pointer,
            current_chunk: self.current_chunk,
            buffer: self.buffer.clone(),
            record: Vec::new(),
        })
    }

    /// Release this cursor. Other slices and clones stay usable.
    pub fn close(self) -> CeffResult<()> {
        tracing::trace!(file = self.name(), "closed ceff reader");
        Ok(())
    }

    /// Copy up to `buf.len()` bytes from the cursor, stopping at the end.
    fn read_available(&mut self, buf: &mut [u8]) -> CeffResult<usize> {
        let chunk_size = self.shared.layout.chunk_size();
        let wanted = buf
            .len()
            .min((self.length - self.file_pointer).try_into().unwrap_or(usize::MAX));

        let mut done = 0;
        while done < wanted {
            let absolute = self.offset + self.file_pointer;
            self.load_chunk(absolute / chunk_size)?;

            let within = (absolute % chunk_size) as usize;
            let available = self.buffer.len().saturating_sub(within);
            if available == 0 {
                return Err(CeffError::Integrity(format!(
                    "chunk {} ended early at byte {within} ({})",
                    absolute / chunk_size,
                    self.name()
                )));
            }

            let take = available.min(wanted - done);
            buf[done..done + take].copy_from_slice(&self.buffer[within..within + take]);
            done += take;
            self.file_pointer += take as u64;
        }
        Ok(done)
    }

    /// Position in `self.input` of the record of absolute chunk `index`.
    fn input_position(&self, index: u64) -> u64 {
        self.input_base + (index - self.start_chunk) * self.shared.layout.chunk_stride()
    }

    /// Decrypt absolute chunk `index` into the buffer, unless it is already there.
    fn load_chunk(&mut self, index: u64) -> CeffResult<()> {
        if self.shared.has_failed() {
            self.current_chunk = None;
            return Err(CeffError::Integrity(format!(
                "file disabled by an earlier integrity failure ({})",
                self.name()
            )));
        }
        if self.current_chunk == Some(index) {
            return Ok(());
        }
        self.current_chunk = None;

        let shared = Arc::clone(&self.shared);
        let layout = shared.layout;
        let record_length = layout.record_length(index, shared.plain_length) as usize;
        let position = self.input_position(index);

        self.record.resize(record_length, 0);
        self.input.seek(position)?;
        self.input.read_bytes(&mut self.record)?;

        let (nonce, rest) = self.record.split_at(layout.nonce_length());
        let (aad, sealed) = rest.split_at(AAD_LENGTH);
        let mut aad_bytes = [0u8; AAD_LENGTH];
        aad_bytes.copy_from_slice(aad);

        let stored_index = ChunkAad::from_bytes(&aad_bytes).index;
        if stored_index != index as i64 {
            shared.mark_failed();
            tracing::warn!(file = self.input.name(), chunk = index, stored_index, "chunk index mismatch");
            return Err(CeffError::Integrity(format!(
                "chunk {index} carries index {stored_index} ({})",
                self.input.name()
            )));
        }

        match shared
            .mode
            .decrypt_into(sealed, &aad_bytes, shared.key.as_bytes(), nonce, &mut self.buffer)
        {
            Ok(()) => {
                tracing::trace!(file = self.input.name(), chunk = index, bytes = self.buffer.len(), "decrypted chunk");
                self.current_chunk = Some(index);
                Ok(())
            }
            Err(err) => {
                shared.mark_failed();
                tracing::warn!(file = self.input.name(), chunk = index, error = %err, "chunk authentication failed");
                Err(CeffError::Integrity(format!(
                    "chunk {index} failed authentication ({}): {err}",
                    self.input.name()
                )))
            }
        }
    }
}

/// Read the header and footer, unwrap the content key and authenticate the
/// footer against the ciphertext length.
fn read_framing(
    input: &mut dyn FileInput,
    registry: &ModeRegistry,
    master_key: &MasterKey,
) -> CeffResult<Framing> {
    let cipher_length = input.len();
    if cipher_length < HEADER_PREFIX_LENGTH {
        return Err(CeffError::Format(format!(
            "file too short for a header: {cipher_length} bytes ({})",
            input.name()
        )));
    }

    let mut prefix = [0u8; HEADER_PREFIX_LENGTH as usize];
    input.seek(0)?;
    input.read_bytes(&mut prefix)?;
    let mode = registry.get(decode_prefix(&prefix)?)?;

    let header_length = Layout::mode_header_length(&mode);
    let footer_length = Layout::mode_footer_length(&mode);
    if cipher_length < header_length + footer_length {
        return Err(CeffError::Format(format!(
            "file too short: {cipher_length} bytes, header and footer need {} ({})",
            header_length + footer_length,
            input.name()
        )));
    }

    let mut wrapped = WrappedKey {
        nonce: vec![0u8; mode.nonce_length()],
        ciphertext: vec![0u8; KEY_SIZE + mode.tag_length()],
    };
    input.read_bytes(&mut wrapped.nonce)?;
    input.read_bytes(&mut wrapped.ciphertext)?;
    let key = unwrap_content_key(&mode, master_key, &wrapped)?;

    let mut footer = vec![0u8; footer_length as usize];
    input.seek(cipher_length - footer_length)?;
    input.read_bytes(&mut footer)?;

    let (nonce, rest) = footer.split_at(mode.nonce_length());
    let (aad, sealed) = rest.split_at(AAD_LENGTH);
    let mut aad_bytes = [0u8; AAD_LENGTH];
    aad_bytes.copy_from_slice(aad);

    let signature = mode
        .decrypt(sealed, &aad_bytes, key.as_bytes(), nonce)
        .map_err(|err| {
            tracing::warn!(file = input.name(), error = %err, "footer authentication failed");
            CeffError::Integrity(format!("footer failed authentication ({}): {err}", input.name()))
        })?;
    if signature.len() != SIGNATURE_LENGTH {
        return Err(CeffError::Integrity(format!(
            "footer signature is {} bytes (expected {SIGNATURE_LENGTH})",
            signature.len()
        )));
    }

    let footer = FooterAad::from_bytes(&aad_bytes);
    let layout = u32::try_from(footer.chunk_size)
        .ok()
        .and_then(|chunk_size| Layout::new(&mode, chunk_size).ok())
        .ok_or_else(|| {
            CeffError::Integrity(format!(
                "footer declares invalid chunk size {} ({})",
                footer.chunk_size,
                input.name()
            ))
        })?;

    let chunk_count = layout.chunk_count(cipher_length)?;
    let plain_length = layout.plain_length(cipher_length)?;
    if footer.last_chunk_index != chunk_count as i64 - 1 || footer.plain_length != plain_length as i64 {
        tracing::warn!(
            file = input.name(),
            footer_last_chunk = footer.last_chunk_index,
            footer_plain_length = footer.plain_length,
            chunk_count,
            plain_length,
            "footer disagrees with file length"
        );
        return Err(CeffError::Integrity(format!(
            "footer declares {} chunks / {} bytes, file length implies {chunk_count} / {plain_length} ({})",
            footer.last_chunk_index + 1,
            footer.plain_length,
            input.name()
        )));
    }

    Ok(Framing {
        shared: Shared {
            mode,
            key,
            layout,
            chunk_count,
            plain_length,
            failed: AtomicBool::new(false),
        },
        signature,
    })
}

/// Recompute SHA-512 over every chunk's AAD (reading nothing else) and
/// compare it with the footer signature in constant time.
fn verify_signature(input: &mut dyn FileInput, shared: &Shared, signature: &[u8]) -> CeffResult<()> {
    let layout = shared.layout;
    let mut digest = Sha512::new();
    let mut aad = [0u8; AAD_LENGTH];

    for index in 0..shared.chunk_count {
        input.seek(layout.chunk_offset(index) + layout.nonce_length() as u64)?;
        input.read_bytes(&mut aad)?;

        let stored_index = ChunkAad::from_bytes(&aad).index;
        if stored_index != index as i64 {
            tracing::warn!(file = input.name(), chunk = index, stored_index, "chunk index mismatch");
            return Err(CeffError::Integrity(format!(
                "chunk {index} carries index {stored_index} ({})",
                input.name()
            )));
        }
        digest.update(aad);
    }

    let computed = digest.finalize();
    if !bool::from(computed.as_slice().ct_eq(signature)) {
        tracing::warn!(file = input.name(), "whole-file signature mismatch");
        return Err(CeffError::Integrity(format!(
            "signature mismatch ({})",
            input.name()
        )));
    }
    Ok(())
}

impl fmt::Debug for CeffReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CeffReader")
            .field("name", &self.input.name())
            .field("mode", &self.shared.mode)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("position", &self.file_pointer)
            .field("current_chunk", &self.current_chunk)
            .finish()
    }
}

impl Read for CeffReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_available(buf)?)
    }
}

impl io::Seek for CeffReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(pos) => Some(pos),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.file_pointer.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative or overflowing position")
        })?;
        CeffReader::seek(self, target)?;
        Ok(target)
    }
}

impl FileInput for CeffReader {
    fn name(&self) -> &str {
        self.input.name()
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn position(&self) -> u64 {
        self.file_pointer
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        Ok(CeffReader::seek(self, pos)?)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        Ok(CeffReader::read_bytes(self, buf)?)
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        Ok(CeffReader::read_byte(self)?)
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> io::Result<Box<dyn FileInput>> {
        Ok(CeffReader::slice(self, description, offset, length)?)
    }

    fn try_clone(&self) -> io::Result<Box<dyn FileInput>> {
        Ok(Box::new(CeffReader::try_clone(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use ceff_storage::{read_remaining, Directory, MemoryDirectory};

    use crate::writer::CeffWriter;

    const CHUNK: u32 = 16 * 1024;

    fn master() -> MasterKey {
        MasterKey::from_bytes([0u8; 32])
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8).collect()
    }

    fn encrypt_to(dir: &MemoryDirectory, name: &str, mode: Mode, data: &[u8]) {
        let output = dir.create_output(name).unwrap();
        let mut writer = CeffWriter::new(output, mode, CHUNK, &master()).unwrap();
        writer.write_all(data).unwrap();
        writer.close().unwrap();
    }

    fn open(dir: &MemoryDirectory, name: &str) -> CeffReader {
        CeffReader::open(dir.open_input(name).unwrap(), &ModeRegistry::default(), &master()).unwrap()
    }

    #[test]
    fn test_open_decrypts_first_chunk_eagerly() {
        let dir = MemoryDirectory::new();
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &pattern(40_000));
        let reader = open(&dir, "f");
        assert_eq!(reader.current_chunk, Some(0));
        assert_eq!(reader.buffer.len(), CHUNK as usize);
        assert_eq!(reader.chunk_count(), 3);
        assert_eq!(reader.len(), 40_000);
    }

    #[test]
    fn test_seek_within_buffered_chunk_skips_decrypt() {
        let dir = MemoryDirectory::new();
        let data = pattern(40_000);
        encrypt_to(&dir, "f", Mode::ChaCha20Poly1305, &data);
        let mut reader = open(&dir, "f");

        reader.seek(20_000).unwrap();
        assert_eq!(reader.current_chunk, Some(1));
        // poison the backend cursor: a reload would have to seek it again
        reader.input.seek(0).unwrap();
        reader.seek(17_000).unwrap();
        assert_eq!(reader.current_chunk, Some(1));
        assert_eq!(reader.read_byte().unwrap(), data[17_000]);
    }

    #[test]
    fn test_partial_read_stops_at_eof() {
        let dir = MemoryDirectory::new();
        let data = pattern(100);
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &data);
        let mut reader = open(&dir, "f");

        reader.seek(90).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(Read::read(&mut reader, &mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], &data[90..]);
        assert_eq!(Read::read(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_exact_read_past_eof_consumes_nothing() {
        let dir = MemoryDirectory::new();
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &pattern(10));
        let mut reader = open(&dir, "f");

        let mut buf = [0u8; 11];
        assert!(matches!(
            reader.read_bytes(&mut buf),
            Err(CeffError::UnexpectedEof(_))
        ));
        assert_eq!(reader.position(), 0);
        assert!(matches!(reader.seek(11), Err(CeffError::UnexpectedEof(_))));
        assert!(reader.seek(10).is_ok());
    }

    #[test]
    fn test_io_seek_variants() {
        let dir = MemoryDirectory::new();
        let data = pattern(50_000);
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &data);
        let mut reader = open(&dir, "f");

        assert_eq!(io::Seek::seek(&mut reader, SeekFrom::End(-10)).unwrap(), 49_990);
        assert_eq!(io::Seek::seek(&mut reader, SeekFrom::Current(-90)).unwrap(), 49_900);
        assert_eq!(reader.read_byte().unwrap(), data[49_900]);
        assert!(io::Seek::seek(&mut reader, SeekFrom::Current(-60_000)).is_err());
    }

    #[test]
    fn test_slice_binds_only_spanned_chunks() {
        let dir = MemoryDirectory::new();
        let data = pattern(5 * CHUNK as usize);
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &data);
        let reader = open(&dir, "f");

        let offset = CHUNK as u64 + 100;
        let mut slice = reader.slice("mid", offset, 2 * CHUNK as u64).unwrap();
        assert_eq!(slice.len(), 2 * CHUNK as u64);
        assert_eq!(
            read_remaining(slice.as_mut()).unwrap(),
            &data[offset as usize..offset as usize + 2 * CHUNK as usize]
        );

        // chunks 1..=3 are spanned, so damage to chunk 4 is never read
        let layout = reader.shared.layout;
        let mut stored = dir.read_file("f").unwrap();
        stored[(layout.chunk_offset(4) + layout.chunk_overhead()) as usize] ^= 0xFF;
        dir.write_file("damaged", &stored).unwrap();

        let damaged = open(&dir, "damaged");
        let mut slice = damaged.slice("mid", offset, 2 * CHUNK as u64).unwrap();
        assert_eq!(
            read_remaining(slice.as_mut()).unwrap(),
            &data[offset as usize..offset as usize + 2 * CHUNK as usize]
        );
        let mut tail = damaged.slice("tail", 4 * CHUNK as u64, 10).unwrap();
        assert!(tail.read_byte().is_err());
    }

    #[test]
    fn test_zero_length_slice_is_empty_input() {
        let dir = MemoryDirectory::new();
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &pattern(1000));
        let reader = open(&dir, "f");

        let mut slice = reader.slice("nothing", 1000, 0).unwrap();
        assert!(slice.is_empty());
        assert!(slice.read_byte().is_err());
        assert!(matches!(
            reader.slice("bad", 999, 2),
            Err(CeffError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_clone_copies_cursor_not_buffers() {
        let dir = MemoryDirectory::new();
        let data = pattern(40_000);
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &data);
        let mut reader = open(&dir, "f");
        reader.seek(16_390).unwrap();

        let mut clone = reader.try_clone().unwrap();
        assert_eq!(clone.position(), 16_390);
        assert_ne!(clone.buffer.as_ptr(), reader.buffer.as_ptr());

        clone.seek(39_000).unwrap();
        assert_eq!(reader.current_chunk, Some(1));
        assert_eq!(clone.current_chunk, Some(2));
        assert_eq!(reader.read_byte().unwrap(), data[16_390]);
        assert_eq!(clone.read_byte().unwrap(), data[39_000]);
    }

    #[test]
    fn test_probe_length_reads_only_framing() {
        let dir = MemoryDirectory::new();
        encrypt_to(&dir, "f", Mode::ChaCha20Poly1305, &pattern(12_345));
        let mut input = dir.open_input("f").unwrap();
        let length = CeffReader::probe_length(input.as_mut(), &ModeRegistry::default(), &master()).unwrap();
        assert_eq!(length, 12_345);
    }

    #[test]
    fn test_wrong_master_key_is_crypto_error() {
        let dir = MemoryDirectory::new();
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &pattern(100));
        let result = CeffReader::open(
            dir.open_input("f").unwrap(),
            &ModeRegistry::default(),
            &MasterKey::from_bytes([1u8; 32]),
        );
        assert!(matches!(result, Err(CeffError::Crypto { .. })));
    }

    /// Flip one ciphertext bit of `chunk`, leaving its AAD (and so the
    /// footer signature) intact.
    fn damage_chunk(dir: &MemoryDirectory, name: &str, chunk: u64) {
        let layout = Layout::new(&Mode::Aes256Gcm, CHUNK).unwrap();
        let mut stored = dir.read_file(name).unwrap();
        let at = layout.chunk_offset(chunk) as usize + layout.nonce_length() + AAD_LENGTH + 10;
        stored[at] ^= 0x40;
        dir.write_file(name, &stored).unwrap();
    }

    fn is_integrity(err: io::Error) -> bool {
        matches!(CeffError::from(err), CeffError::Integrity(_))
    }

    #[test]
    fn test_chunk_failure_poisons_reader() {
        let dir = MemoryDirectory::new();
        let data = pattern(3 * CHUNK as usize);
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &data);
        damage_chunk(&dir, "f", 2);

        let mut reader = open(&dir, "f");
        assert!(matches!(
            reader.seek(2 * CHUNK as u64),
            Err(CeffError::Integrity(_))
        ));
        // chunk 1 is intact, but the reader refuses further decryption
        assert!(matches!(reader.seek(CHUNK as u64), Err(CeffError::Integrity(_))));
    }

    #[test]
    fn test_failure_disables_existing_clones_and_slices() {
        let dir = MemoryDirectory::new();
        let data = pattern(4 * CHUNK as usize);
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &data);
        damage_chunk(&dir, "f", 2);

        let mut reader = open(&dir, "f");
        let mut clone = reader.try_clone().unwrap();
        let mut slice = reader.slice("tail", 3 * CHUNK as u64, 100).unwrap();

        assert!(matches!(
            reader.seek(2 * CHUNK as u64),
            Err(CeffError::Integrity(_))
        ));
        // chunk 3 is intact, but the file as a whole is no longer trusted
        assert!(matches!(
            clone.seek(3 * CHUNK as u64),
            Err(CeffError::Integrity(_))
        ));
        assert!(is_integrity(slice.read_byte().unwrap_err()));
    }

    #[test]
    fn test_failure_in_clone_disables_origin() {
        let dir = MemoryDirectory::new();
        let data = pattern(4 * CHUNK as usize);
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &data);
        damage_chunk(&dir, "f", 2);

        let mut reader = open(&dir, "f");
        let mut clone = reader.try_clone().unwrap();
        assert!(matches!(
            clone.seek(2 * CHUNK as u64 + 5),
            Err(CeffError::Integrity(_))
        ));

        // chunk 0 is already buffered by the origin and is refused all the same
        assert!(matches!(reader.read_byte(), Err(CeffError::Integrity(_))));
        assert_eq!(reader.position(), 0);
        assert!(matches!(
            reader.slice("head", 0, 10).unwrap().read_byte().map_err(is_integrity),
            Err(true)
        ));
    }

    #[test]
    fn test_chunk_loads_reuse_buffer() {
        let dir = MemoryDirectory::new();
        let data = pattern(3 * CHUNK as usize);
        encrypt_to(&dir, "f", Mode::Aes256Gcm, &data);

        let mut reader = open(&dir, "f");
        let buffer = reader.buffer.as_ptr();
        reader.seek(CHUNK as u64 + 1).unwrap();
        reader.seek(2 * CHUNK as u64 + 2).unwrap();
        assert_eq!(reader.current_chunk, Some(2));
        assert_eq!(reader.buffer.as_ptr(), buffer);
        assert_eq!(reader.read_byte().unwrap(), data[2 * CHUNK as usize + 2]);
    }
}
