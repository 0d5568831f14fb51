//! Inode loading through the inode cache.

use crate::VolumeInner;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xfsr_block::{CacheRef, try_alloc_zeroed};
use xfsr_error::{Result, XfsError};
use xfsr_ondisk::{FileType, XfsInodeCore, XfsTimestamp};
use xfsr_types::{ByteOffset, InodeNumber};

/// Decoded inode as held by the inode cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XfsInode {
    pub ino: InodeNumber,
    /// Byte offset of the record on the backing store.
    pub offset: ByteOffset,
    pub core: XfsInodeCore,
    /// Allocated bytes (`di_nblocks` × block size).
    pub allocated: u64,
}

/// Counted reference to a cached inode.
pub type InodeRef = CacheRef<InodeNumber, XfsInode>;

/// Object attributes as reported by `query_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjInfo {
    pub ino: InodeNumber,
    pub size: u64,
    pub allocated: u64,
    pub atime: XfsTimestamp,
    pub mtime: XfsTimestamp,
    pub ctime: XfsTimestamp,
    /// Creation time; the change time on inodes older than version 3.
    pub birth_time: XfsTimestamp,
    pub kind: FileType,
    /// Permission bits (lower 12 bits of the mode).
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub generation: u32,
    /// Device number for block and character devices, 0 otherwise.
    pub rdev: u32,
}

impl XfsInode {
    #[must_use]
    pub fn info(&self) -> ObjInfo {
        let core = &self.core;
        ObjInfo {
            ino: self.ino,
            size: core.size,
            allocated: self.allocated,
            atime: core.atime,
            mtime: core.mtime,
            ctime: core.ctime,
            birth_time: core.birth_time(),
            kind: core.file_type,
            perm: core.permissions(),
            nlink: core.nlink,
            uid: core.uid,
            gid: core.gid,
            generation: core.generation,
            rdev: core.rdev(),
        }
    }
}

/// Acquire `ino` from the inode cache, reading and decoding it on a miss.
pub(crate) fn load_inode(vol: &VolumeInner, ino: InodeNumber) -> Result<InodeRef> {
    vol.inodes.acquire(ino, |ino| {
        let geometry = &vol.geometry;
        let offset = geometry.inode_byte_offset(ino)?;
        let mut raw = try_alloc_zeroed(usize::from(geometry.inode_size), "inode record")?;
        vol.dev.read_exact_at(offset, &mut raw)?;

        let core = XfsInodeCore::parse_from_bytes(&raw).map_err(|e| {
            warn!(target: "xfsr::inode", event = "decode_failed", ino = ino.0, error = %e);
            XfsError::BogusFormat(format!("inode {ino}: {e}"))
        })?;
        let allocated = core
            .nblocks
            .saturating_mul(u64::from(geometry.block_size.get()));

        debug!(
            target: "xfsr::inode",
            event = "decoded",
            ino = ino.0,
            offset = offset.0,
            kind = ?core.file_type,
            format = core.data_fork.format_name(),
            size = core.size,
            nextents = core.nextents
        );
        Ok(XfsInode {
            ino,
            offset,
            core,
            allocated,
        })
    })
}
