//! File and directory handles.
//!
//! Every handle holds one counted inode reference and a clone of its
//! [`Volume`]; dropping the handle (or calling `close`) gives the inode back
//! to the cache. All mutating operations fail with `WriteProtected`.

use crate::Volume;
use crate::extent::{BlockMapping, resolve};
use crate::inode::{InodeRef, ObjInfo};
use crate::read::{ReadOutcome, read_inode_data};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::time::SystemTime;
use tracing::{debug, trace};
use xfsr_error::{Result, XfsError};
use xfsr_types::{FileBlock, InodeNumber, XFS_MAX_NAME_LEN};

/// What `Directory::open` may do when the name is missing or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpenAction {
    /// Open an existing object.
    Open,
    /// Open if present, otherwise create.
    OpenCreate,
    /// Create; fail if present.
    Create,
    /// Create, replacing anything present.
    CreateReplace,
}

/// An opened object of either kind.
#[derive(Debug)]
pub enum VfsObject {
    File(File),
    Directory(Directory),
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub ino: InodeNumber,
}

// ── File ────────────────────────────────────────────────────────────────────

/// Read-only regular file handle with a byte cursor.
#[derive(Debug)]
pub struct File {
    vol: Volume,
    inode: InodeRef,
    pos: u64,
}

impl File {
    pub(crate) fn new(vol: Volume, inode: InodeRef) -> Self {
        trace!(target: "xfsr::vfs", ino = inode.ino.0, "open file");
        Self { vol, inode, pos: 0 }
    }

    #[must_use]
    pub fn ino(&self) -> InodeNumber {
        self.inode.ino
    }

    /// Read at the cursor; short reads at end of file are flagged, not errors.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        self.read_at(self.pos, buf)
    }

    /// Read at `offset`, leaving the cursor just past the bytes read.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<ReadOutcome> {
        let out = read_inode_data(&self.vol.inner, &self.inode, offset, buf, true)?;
        self.pos = offset.saturating_add(out.bytes as u64);
        Ok(out)
    }

    /// Fill all of `buf` from `offset`, or fail with `EndOfFile`.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let out = read_inode_data(&self.vol.inner, &self.inode, offset, buf, false)?;
        self.pos = offset.saturating_add(out.bytes as u64);
        Ok(())
    }

    /// True when both handles share one cached inode.
    #[must_use]
    pub fn same_inode_as(&self, other: &File) -> bool {
        InodeRef::ptr_eq(&self.inode, &other.inode)
    }

    /// Physical placement of a file block.
    pub fn map_block(&self, block: FileBlock, max_blocks: u64) -> Result<BlockMapping> {
        resolve(&self.vol.inner, &self.inode, block, max_blocks)
    }

    /// Move the cursor; the result may lie past the end of the file.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(off) => i128::from(off),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.inode.core.size) + i128::from(delta),
        };
        if target < 0 {
            return Err(XfsError::NegativeSeek);
        }
        self.pos = u64::try_from(target)
            .map_err(|_| XfsError::InvalidArgument(format!("seek target {target} overflows")))?;
        Ok(self.pos)
    }

    #[must_use]
    pub fn tell(&self) -> u64 {
        self.pos
    }

    #[must_use]
    pub fn query_size(&self) -> u64 {
        self.inode.core.size
    }

    #[must_use]
    pub fn query_max_size(&self) -> i64 {
        i64::MAX
    }

    #[must_use]
    pub fn query_info(&self) -> ObjInfo {
        self.inode.info()
    }

    pub fn write(&mut self, _offset: u64, _buf: &[u8]) -> Result<usize> {
        Err(XfsError::WriteProtected)
    }

    pub fn set_size(&mut self, _size: u64) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    pub fn set_mode(&mut self, _mode: u16) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    pub fn set_times(&mut self, _atime: Option<SystemTime>, _mtime: Option<SystemTime>) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    pub fn set_owner(&mut self, _uid: Option<u32>, _gid: Option<u32>) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    /// Nothing is ever buffered for writing.
    pub fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn close(self) {
        trace!(target: "xfsr::vfs", ino = self.inode.ino.0, "close file");
    }
}

// ── Directory ───────────────────────────────────────────────────────────────

/// Read-only directory handle.
#[derive(Debug)]
pub struct Directory {
    vol: Volume,
    inode: InodeRef,
    cursor: u64,
    no_more_files: bool,
}

impl Directory {
    pub(crate) fn new(vol: Volume, inode: InodeRef) -> Self {
        trace!(target: "xfsr::vfs", ino = inode.ino.0, "open directory");
        Self {
            vol,
            inode,
            cursor: 0,
            no_more_files: false,
        }
    }

    #[must_use]
    pub fn ino(&self) -> InodeNumber {
        self.inode.ino
    }

    /// Entry lookup. Directory entry formats are not decoded, so no name
    /// resolves.
    fn lookup(&self, name: &str) -> Option<InodeNumber> {
        debug!(
            target: "xfsr::vfs",
            event = "lookup",
            dir = self.inode.ino.0,
            format = self.inode.core.data_fork.format_name(),
            name
        );
        None
    }

    /// Open `name` inside this directory.
    pub fn open(&self, name: &str, action: OpenAction) -> Result<VfsObject> {
        if !matches!(action, OpenAction::Open | OpenAction::OpenCreate) {
            return Err(XfsError::WriteProtected);
        }
        if name.len() > XFS_MAX_NAME_LEN {
            return Err(XfsError::FilenameTooLong);
        }
        let ino = self
            .lookup(name)
            .ok_or_else(|| XfsError::NotFound(name.to_owned()))?;
        self.vol.open_by_inode(ino)
    }

    pub fn open_symlink(&self, name: &str) -> Result<VfsObject> {
        Err(XfsError::NotSupported(format!("symlink {name:?}")))
    }

    pub fn create_dir(&self, _name: &str) -> Result<Directory> {
        Err(XfsError::WriteProtected)
    }

    pub fn create_symlink(&self, _name: &str, _target: &str) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    pub fn unlink(&self, _name: &str) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    pub fn rename(&self, _from: &str, _to: &str) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    pub fn set_mode(&mut self, _mode: u16) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    pub fn set_times(&mut self, _atime: Option<SystemTime>, _mtime: Option<SystemTime>) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    pub fn set_owner(&mut self, _uid: Option<u32>, _gid: Option<u32>) -> Result<()> {
        Err(XfsError::WriteProtected)
    }

    /// Restart enumeration from the first entry.
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.no_more_files = false;
    }

    /// Next entry. Enumeration past the end is `NoMoreFiles`; entry decoding
    /// itself is not implemented.
    pub fn read_dir(&mut self) -> Result<DirEntry> {
        if self.no_more_files || self.cursor >= self.inode.core.size {
            self.no_more_files = true;
            return Err(XfsError::NoMoreFiles);
        }
        Err(XfsError::NotImplemented(format!(
            "{} directory entries",
            self.inode.core.data_fork.format_name()
        )))
    }

    #[must_use]
    pub fn query_info(&self) -> ObjInfo {
        self.inode.info()
    }

    pub fn close(self) {
        trace!(target: "xfsr::vfs", ino = self.inode.ino.0, "close directory");
    }
}
