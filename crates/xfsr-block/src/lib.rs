#![forbid(unsafe_code)]
//! Backing-store I/O and metadata caching.
//!
//! Provides the read-only `ByteDevice` trait the volume is mounted on, a
//! file-backed and an in-memory implementation, and the generic
//! [`CacheManager`] used for allocation-group headers, inodes and btree
//! blocks.

mod cache;

pub use cache::{CacheManager, CacheRef, CacheStats, DEFAULT_CACHE_BUDGET};

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use xfsr_error::{Result, XfsError};
use xfsr_types::{ByteOffset, XFS_SB_OFFSET, XFS_SB_REGION_SIZE};

/// Byte-addressed, read-only backing store (pread semantics).
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()>;
}

fn check_range(offset: ByteOffset, len: usize, dev_len: u64) -> Result<()> {
    let end = u64::try_from(len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .ok_or_else(|| {
            XfsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "read range overflows u64",
            ))
        })?;
    if end.0 > dev_len {
        return Err(XfsError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("read out of bounds: offset={offset} len={len} device_len={dev_len}"),
        )));
    }
    Ok(())
}

/// File-backed device using `std::os::unix::fs::FileExt`.
///
/// Positional reads do not share a seek cursor, so clones of this device can
/// be used from several handles at once.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
}

impl FileByteDevice {
    /// Open `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len)?;
        self.file.read_exact_at(buf, offset.0)?;
        Ok(())
    }
}

/// In-memory device over an owned image.
///
/// Counts the reads it serves, which lets callers observe whether a code path
/// touched storage at all.
#[derive(Debug)]
pub struct MemoryByteDevice {
    bytes: Vec<u8>,
    reads: AtomicU64,
}

impl MemoryByteDevice {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            reads: AtomicU64::new(0),
        }
    }

    /// Number of `read_exact_at` calls served so far, failed ones included.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl ByteDevice for MemoryByteDevice {
    fn len_bytes(&self) -> u64 {
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        check_range(offset, buf.len(), self.len_bytes())?;
        let start = offset
            .to_usize()
            .map_err(|e| XfsError::Io(std::io::Error::other(e.to_string())))?;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }
}

impl<D: ByteDevice + ?Sized> ByteDevice for Arc<D> {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }
}

/// Read the primary superblock region (512 bytes at offset 0).
pub fn read_superblock_region(dev: &dyn ByteDevice) -> Result<[u8; XFS_SB_REGION_SIZE]> {
    let mut buf = [0_u8; XFS_SB_REGION_SIZE];
    dev.read_exact_at(ByteOffset(XFS_SB_OFFSET), &mut buf)?;
    Ok(buf)
}

/// Allocate a zeroed buffer, reporting allocation failure as `OutOfMemory`
/// instead of aborting.
pub fn try_alloc_zeroed(len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| XfsError::OutOfMemory(format!("{what}: {len} bytes")))?;
    buf.resize(len, 0);
    Ok(buf)
}
