#![forbid(unsafe_code)]
//! Volume mount, metadata caches and the read-only VFS surface.
//!
//! A [`Volume`] owns the backing store, the geometry derived from the
//! superblock and three independent bounded caches:
//!
//! | Cache | Key | Payload |
//! |-------|-----|---------|
//! | `ags` | `AgNumber` | decoded AGF + AGI |
//! | `inodes` | `InodeNumber` | decoded inode |
//! | `blocks` | `BlockNumber` | one raw filesystem block (bmap btree nodes) |
//!
//! File payload never goes through the block cache; it is read straight from
//! the backing store.

mod extent;
mod geometry;
mod inode;
mod read;
mod vfs;

pub use extent::BlockMapping;
pub use geometry::{VolumeGeometry, load_geometry};
pub use inode::{InodeRef, ObjInfo, XfsInode};
pub use read::ReadOutcome;
pub use vfs::{DirEntry, Directory, File, OpenAction, VfsObject};
pub use xfsr_block::{
    ByteDevice, CacheStats, DEFAULT_CACHE_BUDGET, FileByteDevice, MemoryByteDevice,
};
pub use xfsr_error::{Result, XfsError};
pub use xfsr_ondisk::{AgfHeader, AgiHeader, FileType, XfsSuperblock, XfsTimestamp};
pub use xfsr_types::{AgNumber, BlockNumber, ByteOffset, FileBlock, InodeNumber};

use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use xfsr_block::{CacheManager, CacheRef, try_alloc_zeroed};
use xfsr_types::{ParseError, XFS_SB_MAGIC};

// ── Mount configuration ─────────────────────────────────────────────────────

/// Mount flags accepted by [`Volume::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MountFlags(u32);

impl MountFlags {
    /// The only mode this reader supports; required.
    pub const READ_ONLY: Self = Self(0x1);
    /// Mounted to answer range-in-use queries for the image layer.
    pub const FOR_RANGE_IN_USE: Self = Self(0x2);
    pub const VALID_MASK: u32 = 0x3;

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits; bits outside [`Self::VALID_MASK`] are rejected.
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !Self::VALID_MASK != 0 {
            return Err(XfsError::InvalidFlags(u64::from(bits)));
        }
        Ok(Self(bits))
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parse the optional per-element argument of a filesystem chain.
    ///
    /// `"ro"` and `"rw"` are explicit; an empty argument inherits the mode the
    /// backing file was opened with.
    pub fn from_chain_argument(arg: &str, opened_read_only: bool) -> Result<Self> {
        match arg {
            "ro" => Ok(Self::READ_ONLY),
            "rw" => Ok(Self::empty()),
            "" if opened_read_only => Ok(Self::READ_ONLY),
            "" => Ok(Self::empty()),
            other => Err(XfsError::InvalidArgument(format!(
                "unknown filesystem argument {other:?}, expected \"ro\" or \"rw\""
            ))),
        }
    }
}

impl BitOr for MountFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Options for opening a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOptions {
    /// Byte budget of the allocation-group header cache.
    pub ag_cache_budget: usize,
    /// Byte budget of the inode cache.
    pub inode_cache_budget: usize,
    /// Byte budget of the btree block cache.
    pub block_cache_budget: usize,
    /// Format-specific flags; none are defined, so this must be zero.
    pub format_flags: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            ag_cache_budget: DEFAULT_CACHE_BUDGET,
            inode_cache_budget: DEFAULT_CACHE_BUDGET,
            block_cache_budget: DEFAULT_CACHE_BUDGET,
            format_flags: 0,
        }
    }
}

// ── Error conversion ────────────────────────────────────────────────────────

/// Convert a parse failure into the runtime error taxonomy.
///
/// A superblock magic mismatch means the image is simply not XFS and maps to
/// `UnknownFormat`; every other parse failure is `BogusFormat`.
#[must_use]
pub fn parse_error_to_xfs(e: &ParseError) -> XfsError {
    match e {
        ParseError::InvalidMagic { expected, actual } if *expected == u64::from(XFS_SB_MAGIC) => {
            XfsError::UnknownFormat(format!("superblock magic {actual:#x}"))
        }
        ParseError::InvalidMagic { .. }
        | ParseError::InvalidField { .. }
        | ParseError::InsufficientData { .. }
        | ParseError::IntegerConversion { .. } => XfsError::BogusFormat(e.to_string()),
    }
}

// ── Allocation groups ───────────────────────────────────────────────────────

/// Decoded headers of one allocation group, as held by the AG cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgHeaders {
    pub agf: AgfHeader,
    pub agi: AgiHeader,
}

/// Allocation-group summary returned by [`Volume::allocation_group`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgInfo {
    pub agno: AgNumber,
    pub length: u32,
    pub free_blocks: u32,
    pub longest_free: u32,
    pub inode_count: u32,
    pub free_inodes: u32,
}

/// Counters of the three metadata caches of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeCacheStats {
    pub ags: CacheStats,
    pub inodes: CacheStats,
    pub blocks: CacheStats,
}

pub(crate) type AgRef = CacheRef<AgNumber, AgHeaders>;
pub(crate) type BlockRef = CacheRef<BlockNumber, Vec<u8>>;

// ── Volume ──────────────────────────────────────────────────────────────────

pub(crate) struct VolumeInner {
    pub(crate) dev: Arc<dyn ByteDevice>,
    pub(crate) geometry: VolumeGeometry,
    pub(crate) superblock: XfsSuperblock,
    pub(crate) flags: MountFlags,
    pub(crate) ags: CacheManager<AgNumber, AgHeaders>,
    pub(crate) inodes: CacheManager<InodeNumber, XfsInode>,
    pub(crate) blocks: CacheManager<BlockNumber, Vec<u8>>,
}

impl VolumeInner {
    fn ag_headers(&self, agno: AgNumber) -> Result<AgRef> {
        self.ags.acquire(agno, |agno| {
            let sector = usize::try_from(self.geometry.sector_size)
                .map_err(|_| XfsError::BogusFormat("sector size".into()))?;
            let mut buf = try_alloc_zeroed(sector, "AG header sector")?;

            self.dev
                .read_exact_at(self.geometry.ag_sector_offset(agno, 1)?, &mut buf)?;
            let agf = AgfHeader::parse_from_bytes(&buf)
                .map_err(|e| XfsError::BogusFormat(format!("AGF of AG {agno}: {e}")))?;

            self.dev
                .read_exact_at(self.geometry.ag_sector_offset(agno, 2)?, &mut buf)?;
            let agi = AgiHeader::parse_from_bytes(&buf)
                .map_err(|e| XfsError::BogusFormat(format!("AGI of AG {agno}: {e}")))?;

            debug!(
                target: "xfsr::mount",
                event = "ag_headers",
                agno = agno.0,
                length = agf.length,
                free_blocks = agf.free_blocks,
                inodes = agi.count
            );
            Ok(AgHeaders { agf, agi })
        })
    }

    /// Counted reference to one raw filesystem block.
    pub(crate) fn block(&self, block: BlockNumber) -> Result<BlockRef> {
        self.blocks.acquire(block, |block| {
            let offset = self.geometry.fsblock_to_byte(block)?;
            let mut buf = try_alloc_zeroed(self.geometry.block_len(), "metadata block")?;
            self.dev.read_exact_at(offset, &mut buf)?;
            Ok(buf)
        })
    }
}

/// A mounted, read-only XFS volume.
///
/// Cloning is cheap and shares the caches; file and directory handles keep
/// their own clone, so a handle stays usable after [`Volume::close`].
#[derive(Clone)]
pub struct Volume {
    pub(crate) inner: Arc<VolumeInner>,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("geometry", &self.inner.geometry)
            .field("flags", &self.inner.flags)
            .field("dev_len", &self.inner.dev.len_bytes())
            .finish_non_exhaustive()
    }
}

impl Volume {
    /// Mount `dev` with default options.
    pub fn open(dev: impl ByteDevice + 'static, flags: MountFlags) -> Result<Self> {
        Self::open_with_options(dev, flags, &OpenOptions::default())
    }

    /// Mount the image file at `path` with default options.
    pub fn open_path(path: impl AsRef<Path>, flags: MountFlags) -> Result<Self> {
        Self::open(FileByteDevice::open(path)?, flags)
    }

    /// Mount `dev`.
    ///
    /// Flags are checked before the store is touched. The caches are created
    /// only once the superblock has been accepted, so a non-XFS image costs
    /// exactly one superblock read.
    pub fn open_with_options(
        dev: impl ByteDevice + 'static,
        flags: MountFlags,
        options: &OpenOptions,
    ) -> Result<Self> {
        if options.format_flags != 0 {
            return Err(XfsError::InvalidFlags(u64::from(options.format_flags)));
        }
        let flags = MountFlags::from_bits(flags.bits())?;
        if !flags.contains(MountFlags::READ_ONLY) {
            return Err(XfsError::WriteProtected);
        }

        let dev: Arc<dyn ByteDevice> = Arc::new(dev);
        let (superblock, geometry) = load_geometry(dev.as_ref())?;

        let inode_footprint =
            std::mem::size_of::<XfsInode>() + usize::from(geometry.inode_size);
        let inner = VolumeInner {
            ags: CacheManager::new(
                "ag",
                options.ag_cache_budget,
                std::mem::size_of::<AgHeaders>(),
            ),
            inodes: CacheManager::new("inode", options.inode_cache_budget, inode_footprint),
            blocks: CacheManager::new("block", options.block_cache_budget, geometry.block_len()),
            dev,
            geometry,
            superblock,
            flags,
        };

        // AG 0 must carry sane headers before anything is handed out.
        drop(inner.ag_headers(AgNumber(0))?);

        info!(
            target: "xfsr::mount",
            event = "mounted",
            label = %inner.geometry.label,
            block_size = inner.geometry.block_size.get(),
            ag_count = inner.geometry.ag_count,
            root_ino = inner.geometry.root_ino.0,
            flags = inner.flags.bits()
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    #[must_use]
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.inner.geometry
    }

    #[must_use]
    pub fn superblock(&self) -> &XfsSuperblock {
        &self.inner.superblock
    }

    #[must_use]
    pub fn flags(&self) -> MountFlags {
        self.inner.flags
    }

    /// Open the root directory.
    pub fn open_root(&self) -> Result<Directory> {
        self.open_dir_by_inode(self.inner.geometry.root_ino)
    }

    /// Open a directory by inode number; non-directories are `BogusFormat`.
    pub fn open_dir_by_inode(&self, ino: InodeNumber) -> Result<Directory> {
        let inode = inode::load_inode(&self.inner, ino)?;
        if !inode.core.is_dir() {
            return Err(XfsError::BogusFormat(format!(
                "inode {ino} is a {:?}, not a directory",
                inode.core.file_type
            )));
        }
        Ok(Directory::new(self.clone(), inode))
    }

    /// Open a regular file by inode number; other types are `WrongType`.
    pub fn open_file_by_inode(&self, ino: InodeNumber) -> Result<File> {
        let inode = inode::load_inode(&self.inner, ino)?;
        if !inode.core.is_regular() {
            return Err(XfsError::WrongType);
        }
        Ok(File::new(self.clone(), inode))
    }

    /// Open any inode, dispatching on its type.
    pub fn open_by_inode(&self, ino: InodeNumber) -> Result<VfsObject> {
        let inode = inode::load_inode(&self.inner, ino)?;
        match inode.core.file_type {
            FileType::Directory => Ok(VfsObject::Directory(Directory::new(self.clone(), inode))),
            FileType::RegularFile => Ok(VfsObject::File(File::new(self.clone(), inode))),
            other => Err(XfsError::NotSupported(format!("inode {ino}: {other:?}"))),
        }
    }

    /// Attributes of any inode without opening a handle.
    pub fn inode_info(&self, ino: InodeNumber) -> Result<ObjInfo> {
        let inode = inode::load_inode(&self.inner, ino)?;
        Ok(inode.info())
    }

    /// The volume object itself has no attributes.
    pub fn query_info(&self) -> Result<ObjInfo> {
        Err(XfsError::WrongType)
    }

    /// Which parts of `[offset, offset + len)` the filesystem uses.
    pub fn query_range_state(&self, offset: u64, len: u64) -> Result<Vec<bool>> {
        debug!(target: "xfsr::vfs", event = "range_state", offset, len);
        Err(XfsError::NotImplemented("query_range_state".into()))
    }

    /// Summary of allocation group `agno`.
    pub fn allocation_group(&self, agno: AgNumber) -> Result<AgInfo> {
        if agno.0 >= self.inner.geometry.ag_count {
            return Err(XfsError::InvalidArgument(format!(
                "allocation group {agno} out of range (count {})",
                self.inner.geometry.ag_count
            )));
        }
        let headers = self.inner.ag_headers(agno)?;
        Ok(AgInfo {
            agno,
            length: headers.agf.length,
            free_blocks: headers.agf.free_blocks,
            longest_free: headers.agf.longest_free,
            inode_count: headers.agi.count,
            free_inodes: headers.agi.free_count,
        })
    }

    #[must_use]
    pub fn cache_stats(&self) -> VolumeCacheStats {
        VolumeCacheStats {
            ags: self.inner.ags.stats(),
            inodes: self.inner.inodes.stats(),
            blocks: self.inner.blocks.stats(),
        }
    }

    /// Unmount. Caches are freed once the last open handle is dropped too.
    pub fn close(self) {
        debug!(
            target: "xfsr::mount",
            event = "close",
            handles = Arc::strong_count(&self.inner).saturating_sub(1)
        );
    }
}
