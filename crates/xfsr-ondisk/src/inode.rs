//! Inode core (`xfs_dinode`) and data fork decoding.

use serde::{Deserialize, Serialize};
use xfsr_types::{
    ParseError, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK,
    S_IPERM_MASK, XFS_DINODE_CORE_SIZE_V2, XFS_DINODE_CORE_SIZE_V3, XFS_DINODE_FMT_BTREE,
    XFS_DINODE_FMT_DEV, XFS_DINODE_FMT_EXTENTS, XFS_DINODE_FMT_LOCAL, XFS_DINODE_FMT_UUID,
    XFS_DINODE_MAGIC, XFS_FORKOFF_UNIT, ensure_slice, read_be_u16, read_be_u32, read_be_u64,
    read_u8,
};

/// Object type from the `S_IFMT` bits of `di_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    RegularFile,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl FileType {
    pub fn from_mode(mode: u16) -> Result<Self, ParseError> {
        match mode & S_IFMT {
            S_IFREG => Ok(Self::RegularFile),
            S_IFDIR => Ok(Self::Directory),
            S_IFLNK => Ok(Self::Symlink),
            S_IFBLK => Ok(Self::BlockDevice),
            S_IFCHR => Ok(Self::CharDevice),
            S_IFIFO => Ok(Self::Fifo),
            S_IFSOCK => Ok(Self::Socket),
            _ => Err(ParseError::InvalidField {
                field: "di_mode",
                reason: "unknown file type bits",
            }),
        }
    }
}

/// Classic 32-bit seconds + nanoseconds timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct XfsTimestamp {
    pub sec: i32,
    pub nsec: u32,
}

impl XfsTimestamp {
    /// Convert to `SystemTime`; pre-1970 stamps land before `UNIX_EPOCH`.
    #[must_use]
    pub fn to_system_time(self) -> std::time::SystemTime {
        let nanos = std::time::Duration::from_nanos(u64::from(self.nsec.min(999_999_999)));
        let secs = std::time::Duration::from_secs(u64::from(self.sec.unsigned_abs()));
        if self.sec >= 0 {
            std::time::UNIX_EPOCH + secs + nanos
        } else {
            std::time::UNIX_EPOCH - secs + nanos
        }
    }

    fn parse(bytes: &[u8], offset: usize) -> Result<Self, ParseError> {
        Ok(Self {
            sec: i32::from_be_bytes(read_be_u32(bytes, offset)?.to_be_bytes()),
            nsec: read_be_u32(bytes, offset + 4)?,
        })
    }
}

/// Data fork contents, tagged by `di_format`.
///
/// Extent and btree forks keep their raw bytes; they are decoded lazily by
/// the block resolver so that a bad record count fails the read that needs
/// it, not the inode load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFork {
    /// Character/block device number.
    Device { rdev: u32 },
    /// Content stored inline in the inode.
    Local { bytes: Vec<u8> },
    /// Flat list of `count` packed extent records.
    Extents { count: u32, bytes: Vec<u8> },
    /// In-inode B+Tree root.
    Btree { bytes: Vec<u8> },
    Uuid,
}

impl DataFork {
    /// On-disk format tag.
    #[must_use]
    pub fn format(&self) -> u8 {
        match self {
            Self::Device { .. } => XFS_DINODE_FMT_DEV,
            Self::Local { .. } => XFS_DINODE_FMT_LOCAL,
            Self::Extents { .. } => XFS_DINODE_FMT_EXTENTS,
            Self::Btree { .. } => XFS_DINODE_FMT_BTREE,
            Self::Uuid => XFS_DINODE_FMT_UUID,
        }
    }

    #[must_use]
    pub fn format_name(&self) -> &'static str {
        match self {
            Self::Device { .. } => "dev",
            Self::Local { .. } => "local",
            Self::Extents { .. } => "extents",
            Self::Btree { .. } => "btree",
            Self::Uuid => "uuid",
        }
    }
}

/// Decoded on-disk inode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XfsInodeCore {
    // ── Identity ─────────────────────────────────────────────────────────
    pub mode: u16,
    pub file_type: FileType,
    pub version: u8,
    pub generation: u32,
    /// Self-reference stored by version 3 inodes.
    pub ino: Option<u64>,

    // ── Ownership ────────────────────────────────────────────────────────
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,

    // ── Timestamps ───────────────────────────────────────────────────────
    pub atime: XfsTimestamp,
    pub mtime: XfsTimestamp,
    pub ctime: XfsTimestamp,
    /// Creation time; only version 3 inodes record it.
    pub crtime: Option<XfsTimestamp>,

    // ── Size and layout ──────────────────────────────────────────────────
    pub size: u64,
    /// Filesystem blocks in use, both forks included.
    pub nblocks: u64,
    pub extent_size_hint: u32,
    pub nextents: u32,
    pub attr_nextents: u16,
    pub forkoff: u8,
    pub attr_format: u8,
    pub flags: u16,

    pub data_fork: DataFork,
}

impl XfsInodeCore {
    /// Core header size for an inode version.
    #[must_use]
    pub fn core_size(version: u8) -> usize {
        if version >= 3 {
            XFS_DINODE_CORE_SIZE_V3
        } else {
            XFS_DINODE_CORE_SIZE_V2
        }
    }

    /// Parse one inode record; `bytes` is exactly `sb_inodesize` long.
    #[allow(clippy::similar_names)]
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < XFS_DINODE_CORE_SIZE_V2 {
            return Err(ParseError::InsufficientData {
                needed: XFS_DINODE_CORE_SIZE_V2,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let magic = read_be_u16(bytes, 0x00)?;
        if magic != XFS_DINODE_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u64::from(XFS_DINODE_MAGIC),
                actual: u64::from(magic),
            });
        }

        let mode = read_be_u16(bytes, 0x02)?;
        let version = read_u8(bytes, 0x04)?;
        if !(1..=3).contains(&version) {
            return Err(ParseError::InvalidField {
                field: "di_version",
                reason: "expected 1, 2 or 3",
            });
        }
        let file_type = FileType::from_mode(mode)?;
        let format = read_u8(bytes, 0x05)?;
        let core_size = Self::core_size(version);
        if bytes.len() < core_size {
            return Err(ParseError::InsufficientData {
                needed: core_size,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let forkoff = read_u8(bytes, 0x52)?;
        let nextents = read_be_u32(bytes, 0x4C)?;
        let fork_len = if forkoff == 0 {
            bytes.len() - core_size
        } else {
            usize::from(forkoff) * XFS_FORKOFF_UNIT
        };
        let fork = ensure_slice(bytes, core_size, fork_len).map_err(|_| {
            ParseError::InvalidField {
                field: "di_forkoff",
                reason: "attribute fork offset past end of inode",
            }
        })?;
        let data_fork = parse_data_fork(format, nextents, fork)?;

        // Version 1 inodes keep a 16-bit link count at 0x06.
        let nlink = if version == 1 {
            u32::from(read_be_u16(bytes, 0x06)?)
        } else {
            read_be_u32(bytes, 0x10)?
        };

        let (crtime, ino) = if version >= 3 {
            (
                Some(XfsTimestamp::parse(bytes, 0x90)?),
                Some(read_be_u64(bytes, 0x98)?),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            mode,
            file_type,
            version,
            generation: read_be_u32(bytes, 0x5C)?,
            ino,

            uid: read_be_u32(bytes, 0x08)?,
            gid: read_be_u32(bytes, 0x0C)?,
            nlink,

            atime: XfsTimestamp::parse(bytes, 0x20)?,
            mtime: XfsTimestamp::parse(bytes, 0x28)?,
            ctime: XfsTimestamp::parse(bytes, 0x30)?,
            crtime,

            size: read_be_u64(bytes, 0x38)?,
            nblocks: read_be_u64(bytes, 0x40)?,
            extent_size_hint: read_be_u32(bytes, 0x48)?,
            nextents,
            attr_nextents: read_be_u16(bytes, 0x50)?,
            forkoff,
            attr_format: read_u8(bytes, 0x53)?,
            flags: read_be_u16(bytes, 0x5A)?,

            data_fork,
        })
    }

    /// Permission bits (setuid, setgid, sticky and rwx).
    #[must_use]
    pub fn permissions(&self) -> u16 {
        self.mode & S_IPERM_MASK
    }

    /// Creation time, falling back to the change time before version 3.
    #[must_use]
    pub fn birth_time(&self) -> XfsTimestamp {
        self.crtime.unwrap_or(self.ctime)
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.file_type == FileType::RegularFile
    }

    /// Device number for `DEV` forks, 0 otherwise.
    #[must_use]
    pub fn rdev(&self) -> u32 {
        match self.data_fork {
            DataFork::Device { rdev } => rdev,
            _ => 0,
        }
    }
}

fn parse_data_fork(format: u8, nextents: u32, fork: &[u8]) -> Result<DataFork, ParseError> {
    match format {
        XFS_DINODE_FMT_DEV => Ok(DataFork::Device {
            rdev: read_be_u32(fork, 0)?,
        }),
        XFS_DINODE_FMT_LOCAL => Ok(DataFork::Local {
            bytes: fork.to_vec(),
        }),
        XFS_DINODE_FMT_EXTENTS => Ok(DataFork::Extents {
            count: nextents,
            bytes: fork.to_vec(),
        }),
        XFS_DINODE_FMT_BTREE => Ok(DataFork::Btree {
            bytes: fork.to_vec(),
        }),
        XFS_DINODE_FMT_UUID => Ok(DataFork::Uuid),
        _ => Err(ParseError::InvalidField {
            field: "di_format",
            reason: "unknown data fork format",
        }),
    }
}
