//! Encrypting writer: buffers plaintext into fixed-size chunks, seals each one
//! as it fills, and finishes the file with an encrypted whole-file signature.

use std::fmt;
use std::io::{self, Write};

use ceff_core::{CeffError, CeffResult};
use ceff_crypto::{wrap_content_key, ContentKey, MasterKey, Mode};
use ceff_storage::FileOutput;
use sha2::{Digest, Sha512};

use crate::format::{encode_header, ChunkAad, FooterAad};
use crate::layout::{Layout, AAD_LENGTH, SIGNATURE_LENGTH};

/// Write side of a CEFF file.
///
/// Nothing reaches the backend until a chunk fills or `close` runs. A writer
/// dropped without `close` leaves a file without a footer, which readers
/// reject.
pub struct CeffWriter {
    output: Option<Box<dyn FileOutput>>,
    name: String,
    mode: Mode,
    key: ContentKey,
    layout: Layout,
    buffer: Vec<u8>,
    chunk_index: u64,
    digest: Sha512,
    crc: crc32fast::Hasher,
    plain_length: u64,
}

impl CeffWriter {
    /// Start a new file on `output`: generate a content key, wrap it under
    /// `master_key` and write the header.
    pub fn new(
        mut output: Box<dyn FileOutput>,
        mode: Mode,
        chunk_size: u32,
        master_key: &MasterKey,
    ) -> CeffResult<Self> {
        let layout = Layout::new(&mode, chunk_size)?;
        let key = ContentKey::generate();
        let wrapped = wrap_content_key(&mode, master_key, &key)?;

        let header = encode_header(&mode, &wrapped);
        if header.len() as u64 != layout.header_length() {
            return Err(CeffError::crypto(
                mode.name(),
                format!(
                    "wrapped key is {} bytes, layout expects {}",
                    header.len(),
                    layout.header_length()
                ),
            ));
        }
        output.write_all(&header)?;

        let name = output.name().to_string();
        tracing::debug!(file = %name, mode = %mode, chunk_size, "created ceff writer");

        Ok(Self {
            output: Some(output),
            name,
            mode,
            key,
            layout,
            buffer: Vec::with_capacity(chunk_size as usize),
            chunk_index: 0,
            digest: Sha512::new(),
            crc: crc32fast::Hasher::new(),
            plain_length: 0,
        })
    }

    /// Append plaintext. Each chunk is sealed and written as soon as it fills.
    pub fn write_bytes(&mut self, mut data: &[u8]) -> CeffResult<()> {
        self.ensure_open()?;
        let chunk_size = self.layout.chunk_size() as usize;

        while !data.is_empty() {
            let take = (chunk_size - self.buffer.len()).min(data.len());
            let (head, rest) = data.split_at(take);
            self.buffer.extend_from_slice(head);
            self.crc.update(head);
            self.plain_length += take as u64;
            data = rest;

            if self.buffer.len() == chunk_size {
                self.flush_chunk()?;
            }
        }
        Ok(())
    }

    /// Seal the final (possibly empty) chunk, write the footer and close the
    /// backend output.
    pub fn close(mut self) -> CeffResult<()> {
        self.ensure_open()?;
        self.flush_chunk()?;

        let last_chunk_index = self.chunk_index - 1;
        let signature = std::mem::take(&mut self.digest).finalize();
        let aad = FooterAad {
            chunk_size: self.layout.chunk_size() as i64,
            last_chunk_index: last_chunk_index as i64,
            plain_length: self.plain_length as i64,
        }
        .to_bytes();

        let record = self.seal_record(&signature, &aad)?;
        let mut output = self.output.take().ok_or_else(closed)?;
        output.write_all(&record)?;
        output.close()?;

        tracing::debug!(
            file = %self.name,
            chunks = self.chunk_index,
            plain_length = self.plain_length,
            "closed ceff writer"
        );
        Ok(())
    }

    /// CRC32 of all plaintext written so far.
    pub fn checksum(&self) -> u32 {
        self.crc.clone().finalize()
    }

    /// Plaintext bytes written so far.
    pub fn plain_length(&self) -> u64 {
        self.plain_length
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn chunk_size(&self) -> u64 {
        self.layout.chunk_size()
    }

    fn ensure_open(&self) -> CeffResult<()> {
        if self.output.is_none() {
            return Err(closed());
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> CeffResult<()> {
        let aad = ChunkAad::new(self.chunk_index, rand::random::<u128>()).to_bytes();
        let record = self.seal_record(&self.buffer, &aad)?;

        let output = self.output.as_mut().ok_or_else(closed)?;
        output.write_all(&record)?;
        self.digest.update(aad);

        tracing::trace!(
            file = %self.name,
            chunk = self.chunk_index,
            bytes = self.buffer.len(),
            "sealed chunk"
        );
        self.chunk_index += 1;
        self.buffer.clear();
        Ok(())
    }

    /// `nonce || aad || ciphertext || tag` under the content key.
    fn seal_record(&self, plaintext: &[u8], aad: &[u8; AAD_LENGTH]) -> CeffResult<Vec<u8>> {
        let nonce = self.mode.random_nonce();
        let sealed = self
            .mode
            .encrypt(plaintext, aad, self.key.as_bytes(), &nonce)?;
        if sealed.len() != plaintext.len() + self.layout.tag_length() {
            return Err(CeffError::crypto(
                self.mode.name(),
                format!(
                    "sealed {} bytes into {} (declared tag length {})",
                    plaintext.len(),
                    sealed.len(),
                    self.layout.tag_length()
                ),
            ));
        }

        let mut record = Vec::with_capacity(nonce.len() + AAD_LENGTH + sealed.len());
        record.extend_from_slice(&nonce);
        record.extend_from_slice(aad);
        record.extend_from_slice(&sealed);
        Ok(record)
    }
}

fn closed() -> CeffError {
    CeffError::Io(io::Error::other("ceff writer already closed"))
}

impl Drop for CeffWriter {
    fn drop(&mut self) {
        if self.output.is_some() {
            tracing::warn!(
                file = %self.name,
                plain_length = self.plain_length,
                "ceff writer dropped without close; file has no footer and will fail verification"
            );
        }
    }
}

impl fmt::Debug for CeffWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CeffWriter")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("chunk_size", &self.layout.chunk_size())
            .field("chunk_index", &self.chunk_index)
            .field("plain_length", &self.plain_length)
            .field("open", &self.output.is_some())
            .finish()
    }
}

impl Write for CeffWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.output.as_mut() {
            Some(output) => output.flush(),
            None => Ok(()),
        }
    }
}

impl FileOutput for CeffWriter {
    fn name(&self) -> &str {
        &self.name
    }

    /// Plaintext bytes written so far.
    fn position(&self) -> u64 {
        self.plain_length
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        CeffWriter::close(*self)?;
        Ok(())
    }
}
