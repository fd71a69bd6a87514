// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Backing stores
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `Storage` is the positional byte-store seam under the log. Two backends
// ship with the crate: `FileStorage` over a `std::fs::File`, and
// `MemoryStorage`, a shared in-memory buffer whose clones observe the same
// bytes (so a reader can follow a writer in tests and tools).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{RbfError, RbfResult};

/// A positional, append-friendly byte store.
///
/// Reads take `&self` so that a scanner can borrow the store while the log
/// façade keeps ownership. Writes, flushes and truncation need `&mut self`.
pub trait Storage: Send {
    /// A human-readable name for this store, used in logging.
    fn name(&self) -> &str;

    /// Current length in bytes.
    fn len(&self) -> RbfResult<u64>;

    fn is_empty(&self) -> RbfResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Read up to `buf.len()` bytes at `offset`. Returns the count read,
    /// which is short only at end of store.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> RbfResult<usize>;

    /// Read exactly `buf.len()` bytes at `offset`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> RbfResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                return Err(RbfError::ShortRead {
                    offset,
                    expected: buf.len(),
                    actual: filled,
                });
            }
            filled += n;
        }
        Ok(())
    }

    /// Write all of `data` at `offset`, extending the store if needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> RbfResult<()>;

    /// Push written bytes to the operating system.
    fn flush(&mut self) -> RbfResult<()>;

    /// Make written bytes durable (fsync or equivalent).
    fn sync(&mut self) -> RbfResult<()>;

    /// Cut the store to `len` bytes.
    fn truncate(&mut self, len: u64) -> RbfResult<()>;
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

/// A store backed by a single file, accessed with positional I/O.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
    path: PathBuf,
    name: String,
}

impl FileStorage {
    /// Create a new, empty file. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>) -> RbfResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        debug!(path = %path.display(), "Created RBF storage file");
        Ok(Self::from_file(file, path))
    }

    /// Open an existing file for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> RbfResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self::from_file(file, path))
    }

    /// Open an existing file read-only, for an independent reader handle.
    pub fn open_read_only(path: impl AsRef<Path>) -> RbfResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).open(&path)?;
        Ok(Self::from_file(file, path))
    }

    fn from_file(file: File, path: PathBuf) -> Self {
        let name = format!("file:{}", path.display());
        Self { file, path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> RbfResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> RbfResult<usize> {
        Ok(positional::read_at(&self.file, offset, buf)?)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> RbfResult<()> {
        Ok(positional::write_all_at(&self.file, offset, data)?)
    }

    fn flush(&mut self) -> RbfResult<()> {
        Ok(self.file.flush()?)
    }

    fn sync(&mut self) -> RbfResult<()> {
        Ok(self.file.sync_data()?)
    }

    fn truncate(&mut self, len: u64) -> RbfResult<()> {
        Ok(self.file.set_len(len)?)
    }
}

#[cfg(unix)]
mod positional {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub(super) fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match file.read_at(buf, offset) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    pub(super) fn write_all_at(file: &File, offset: u64, data: &[u8]) -> io::Result<()> {
        file.write_all_at(data, offset)
    }
}

#[cfg(windows)]
mod positional {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    pub(super) fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        file.seek_read(buf, offset)
    }

    pub(super) fn write_all_at(file: &File, mut offset: u64, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let n = file.seek_write(data, offset)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write frame bytes"));
            }
            data = &data[n..];
            offset += n as u64;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// An in-memory store. Clones share the same bytes and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<Vec<u8>>>,
    syncs: Arc<AtomicU64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(bytes)),
            syncs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Mutate the raw bytes in place. Used to simulate torn writes and
    /// bit rot in tests and tools.
    pub fn modify<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        let mut data = self.data.write();
        f(&mut *data)
    }

    /// Number of `sync` calls observed across all clones.
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn len(&self) -> RbfResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> RbfResult<usize> {
        let data = self.data.read();
        let start = match usize::try_from(offset) {
            Ok(start) if start < data.len() => start,
            _ => return Ok(0),
        };
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> RbfResult<()> {
        let start = usize::try_from(offset).map_err(|_| RbfError::FileTooLarge {
            end: offset,
            max: usize::MAX as u64,
        })?;
        let end = start + bytes.len();
        let mut data = self.data.write();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> RbfResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> RbfResult<()> {
        self.syncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> RbfResult<()> {
        let len = usize::try_from(len).map_err(|_| RbfError::FileTooLarge {
            end: len,
            max: usize::MAX as u64,
        })?;
        self.data.write().resize(len, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_write_read() {
        let mut storage = MemoryStorage::new();
        storage.write_at(0, b"RBF1").unwrap();
        storage.write_at(8, b"tail").unwrap();
        assert_eq!(storage.len().unwrap(), 12);

        let mut buf = [0u8; 12];
        storage.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"RBF1\0\0\0\0tail");
    }

    #[test]
    fn test_memory_short_read() {
        let storage = MemoryStorage::from_bytes(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(storage.read_at(1, &mut buf).unwrap(), 2);
        assert_eq!(storage.read_at(10, &mut buf).unwrap(), 0);
        assert!(matches!(
            storage.read_exact_at(0, &mut buf),
            Err(RbfError::ShortRead { expected: 8, actual: 3, .. })
        ));
    }

    #[test]
    fn test_memory_clones_share_bytes() {
        let mut writer = MemoryStorage::new();
        let reader = writer.clone();
        writer.write_at(0, b"abcd").unwrap();
        writer.sync().unwrap();
        assert_eq!(reader.snapshot(), b"abcd");
        assert_eq!(reader.sync_count(), 1);
    }

    #[test]
    fn test_memory_truncate() {
        let mut storage = MemoryStorage::from_bytes(vec![7; 16]);
        storage.truncate(4).unwrap();
        assert_eq!(storage.snapshot(), vec![7; 4]);
    }

    #[test]
    fn test_file_create_write_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.rbf");
        {
            let mut storage = FileStorage::create(&path).unwrap();
            assert!(storage.is_empty().unwrap());
            storage.write_at(0, b"RBF1").unwrap();
            storage.write_at(4, b"more").unwrap();
            storage.sync().unwrap();
        }
        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.len().unwrap(), 8);
        let mut buf = [0u8; 4];
        storage.read_exact_at(4, &mut buf).unwrap();
        assert_eq!(&buf, b"more");
        assert!(storage.name().contains("log.rbf"));
    }

    #[test]
    fn test_file_create_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.rbf");
        FileStorage::create(&path).unwrap();
        assert!(matches!(FileStorage::create(&path), Err(RbfError::Io(_))));
    }

    #[test]
    fn test_file_truncate() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::create(dir.path().join("t.rbf")).unwrap();
        storage.write_at(0, &[1u8; 32]).unwrap();
        storage.truncate(12).unwrap();
        assert_eq!(storage.len().unwrap(), 12);
    }
}
