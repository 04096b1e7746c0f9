//! Local filesystem storage backend

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::traits::{check_slice, eof, Directory, FileInput, FileOutput};

/// A directory of files under `root`.
///
/// Inputs are windows over a file. Clones and slices reopen the file, so no
/// two cursors ever share an OS file offset.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    root: PathBuf,
    temp_counter: Arc<AtomicU64>,
}

impl FsDirectory {
    /// Open (creating if necessary) a directory rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            temp_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a file name to a path, allowing only a single plain component.
    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(name)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file name: {name:?}"),
            )),
        }
    }
}

impl Directory for FsDirectory {
    fn list_all(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_length(&self, name: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.resolve(name)?)?.len())
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(name)?)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.resolve(from)?, self.resolve(to)?)
    }

    fn create_output(&self, name: &str) -> io::Result<Box<dyn FileOutput>> {
        let path = self.resolve(name)?;
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(Box::new(FsOutput {
            name: name.to_string(),
            writer: BufWriter::new(file),
            written: 0,
        }))
    }

    fn create_temp_output(&self, prefix: &str, suffix: &str) -> io::Result<Box<dyn FileOutput>> {
        loop {
            let counter = self.temp_counter.fetch_add(1, Ordering::Relaxed);
            let name = format!("{prefix}_{suffix}_{counter:x}.tmp");
            match self.create_output(&name) {
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                other => return other,
            }
        }
    }

    fn open_input(&self, name: &str) -> io::Result<Box<dyn FileInput>> {
        let path = Arc::new(self.resolve(name)?);
        let file = File::open(path.as_ref())?;
        let length = file.metadata()?.len();
        Ok(Box::new(FsInput {
            name: name.to_string(),
            path,
            file,
            offset: 0,
            length,
            pos: 0,
        }))
    }

    fn close(&self) -> io::Result<()> {
        tracing::debug!(root = %self.root.display(), "closing filesystem directory");
        Ok(())
    }
}

#[derive(Debug)]
struct FsOutput {
    name: String,
    writer: BufWriter<File>,
    written: u64,
}

impl Write for FsOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl FileOutput for FsOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> u64 {
        self.written
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let FsOutput { writer, .. } = *self;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

/// A window `[offset, offset + length)` over a file on disk.
#[derive(Debug)]
struct FsInput {
    name: String,
    path: Arc<PathBuf>,
    file: File,
    offset: u64,
    length: u64,
    pos: u64,
}

impl FsInput {
    fn reopen(&self, name: String, offset: u64, length: u64, pos: u64) -> io::Result<FsInput> {
        let mut file = File::open(self.path.as_ref())?;
        file.seek(SeekFrom::Start(offset + pos))?;
        Ok(FsInput {
            name,
            path: Arc::clone(&self.path),
            file,
            offset,
            length,
            pos,
        })
    }
}

impl FileInput for FsInput {
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
        self.file.seek(SeekFrom::Start(self.offset + pos))?;
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
        self.file.read_exact(buf)?;
        self.pos = end;
        Ok(())
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> io::Result<Box<dyn FileInput>> {
        check_slice(description, self.length, offset, length)?;
        let name = format!("{} [slice={description}]", self.name);
        Ok(Box::new(self.reopen(name, self.offset + offset, length, 0)?))
    }

    fn try_clone(&self) -> io::Result<Box<dyn FileInput>> {
        Ok(Box::new(self.reopen(
            self.name.clone(),
            self.offset,
            self.length,
            self.pos,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_path_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        for bad in ["../escape", "a/b", "/abs", "", "."] {
            assert!(dir.create_output(bad).is_err(), "{bad:?} must be rejected");
        }
    }

    #[test]
    fn test_output_position_counts_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut out = dir.create_output("f").unwrap();
        out.write_all(&[1u8; 100]).unwrap();
        out.write_all(&[2u8; 28]).unwrap();
        assert_eq!(out.position(), 128);
        out.close().unwrap();
        assert_eq!(dir.file_length("f").unwrap(), 128);
    }
}
