#![forbid(unsafe_code)]
//! Shared vocabulary for the XFSR crates.
//!
//! Everything XFS keeps on disk is big-endian, so the byte helpers here are the
//! `read_be_*` family. The newtypes carry units (filesystem blocks, file blocks,
//! inode numbers, allocation groups, bytes) so that address arithmetic cannot
//! silently mix them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ── Superblock ──────────────────────────────────────────────────────────────

/// Byte offset of the primary superblock.
pub const XFS_SB_OFFSET: u64 = 0;
/// Bytes read for the superblock (one minimum-size sector).
pub const XFS_SB_REGION_SIZE: usize = 512;
/// "XFSB"
pub const XFS_SB_MAGIC: u32 = 0x5846_5342;
/// Low nibble of `sb_versionnum`.
pub const XFS_SB_VERSION_NUMBITS: u16 = 0x000F;
pub const XFS_SB_VERSION_5: u16 = 5;

// ── Allocation group headers ────────────────────────────────────────────────

/// "XAGF"
pub const XFS_AGF_MAGIC: u32 = 0x5841_4746;
/// "XAGI"
pub const XFS_AGI_MAGIC: u32 = 0x5841_4749;

// ── Inodes ──────────────────────────────────────────────────────────────────

/// "IN"
pub const XFS_DINODE_MAGIC: u16 = 0x494E;
/// Core header size for inode versions 1 and 2 (ends before `di_crc`).
pub const XFS_DINODE_CORE_SIZE_V2: usize = 100;
/// Core header size for version 3 inodes.
pub const XFS_DINODE_CORE_SIZE_V3: usize = 176;
/// Fork offsets are stored in units of 8 bytes.
pub const XFS_FORKOFF_UNIT: usize = 8;

pub const XFS_DINODE_FMT_DEV: u8 = 0;
pub const XFS_DINODE_FMT_LOCAL: u8 = 1;
pub const XFS_DINODE_FMT_EXTENTS: u8 = 2;
pub const XFS_DINODE_FMT_BTREE: u8 = 3;
pub const XFS_DINODE_FMT_UUID: u8 = 4;

/// Longest directory entry name.
pub const XFS_MAX_NAME_LEN: usize = 255;

// ── Block mapping B+Tree ────────────────────────────────────────────────────

/// "BMAP"
pub const XFS_BMAP_MAGIC: u32 = 0x424D_4150;
/// "BMA3"
pub const XFS_BMAP_CRC_MAGIC: u32 = 0x424D_4133;
/// In-inode root header: `bb_level` + `bb_numrecs`.
pub const XFS_BMDR_HDR_SIZE: usize = 4;
/// Long-form btree block header without CRC fields.
pub const XFS_BTREE_LBLOCK_SIZE: usize = 24;
/// Long-form btree block header with CRC fields.
pub const XFS_BTREE_LBLOCK_CRC_SIZE: usize = 72;
/// One packed extent record.
pub const XFS_BMBT_REC_SIZE: usize = 16;
/// One key (file offset) or one pointer (filesystem block).
pub const XFS_BMBT_KEY_SIZE: usize = 8;
pub const XFS_BMBT_PTR_SIZE: usize = 8;
/// Deepest bmap btree the resolver will walk.
pub const XFS_BMAP_MAX_LEVELS: u16 = 8;

// ── POSIX file mode constants ────────────────────────────────────────────────

/// File type mask (upper 4 bits of mode).
pub const S_IFMT: u16 = 0o170_000;
/// Named pipe (FIFO).
pub const S_IFIFO: u16 = 0o010_000;
/// Character device.
pub const S_IFCHR: u16 = 0o020_000;
/// Directory.
pub const S_IFDIR: u16 = 0o040_000;
/// Block device.
pub const S_IFBLK: u16 = 0o060_000;
/// Regular file.
pub const S_IFREG: u16 = 0o100_000;
/// Symbolic link.
pub const S_IFLNK: u16 = 0o120_000;
/// Socket.
pub const S_IFSOCK: u16 = 0o140_000;
/// setuid, setgid, sticky and rwx for user/group/other.
pub const S_IPERM_MASK: u16 = 0o7777;

// ── Unit-carrying newtypes ──────────────────────────────────────────────────

/// Filesystem block number as stored in extent records and btree pointers.
///
/// The high bits hold the allocation group, the low `agblklog` bits the block
/// within that group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

/// Block index relative to the start of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileBlock(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u64);

/// Allocation group index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgNumber(pub u32);

/// Byte offset on a `ByteDevice` (pread semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteOffset(pub u64);

impl ByteOffset {
    /// Add a byte count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }

    /// Narrow to `usize`, returning `ParseError::IntegerConversion` on overflow.
    pub fn to_usize(self) -> Result<usize, ParseError> {
        usize::try_from(self.0).map_err(|_| ParseError::IntegerConversion {
            field: "byte_offset",
        })
    }
}

impl BlockNumber {
    /// Add a block count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, count: u64) -> Option<Self> {
        self.0.checked_add(count).map(Self)
    }
}

/// Validated filesystem block size (power of two in 512..=65536).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockSize(u32);

impl BlockSize {
    pub fn new(value: u32) -> Result<Self, ParseError> {
        if !value.is_power_of_two() || !(512..=65536).contains(&value) {
            return Err(ParseError::InvalidField {
                field: "sb_blocksize",
                reason: "must be power of two in 512..=65536",
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Number of bits to shift to convert between bytes and blocks.
    #[must_use]
    pub fn shift(self) -> u32 {
        self.0.trailing_zeros()
    }

    /// File block containing `byte_offset`.
    #[must_use]
    pub fn file_block_of(self, byte_offset: u64) -> FileBlock {
        FileBlock(byte_offset >> self.shift())
    }

    /// Byte offset inside its block.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // masked to < 65536
    pub fn offset_in_block(self, byte_offset: u64) -> usize {
        (byte_offset & u64::from(self.0 - 1)) as usize
    }
}

// ── Parse errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u64, actual: u64 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, ParseError> {
    Ok(ensure_slice(data, offset, 1)?[0])
}

#[inline]
pub fn read_be_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_be_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_be_u64(data: &[u8], offset: usize) -> Result<u64, ParseError> {
    let bytes = ensure_slice(data, offset, 8)?;
    Ok(u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_owned()
}

/// Narrow a `u64` to `usize` with an explicit error path.
pub fn u64_to_usize(value: u64, field: &'static str) -> Result<usize, ParseError> {
    usize::try_from(value).map_err(|_| ParseError::IntegerConversion { field })
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AgNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Address splitting ───────────────────────────────────────────────────────

/// Where an inode number points: allocation group, block inside the group,
/// and slot inside that block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeLocation {
    pub ag: AgNumber,
    pub ag_block: u64,
    pub slot: u64,
}

/// Split an absolute inode number using `sb_inopblog` and `sb_agblklog`.
///
/// Layout, low bits first: `inopblog` bits of slot, `agblklog` bits of
/// AG-relative block, remaining bits of AG number.
pub fn split_inode_number(
    ino: InodeNumber,
    inopblog: u8,
    agblklog: u8,
) -> Result<InodeLocation, ParseError> {
    let inopblog = u32::from(inopblog);
    let agblklog = u32::from(agblklog);
    if inopblog + agblklog >= 64 {
        return Err(ParseError::InvalidField {
            field: "sb_agblklog",
            reason: "inode number split exceeds 64 bits",
        });
    }
    let slot = ino.0 & low_mask(inopblog);
    let ag_block = (ino.0 >> inopblog) & low_mask(agblklog);
    let ag = u32::try_from(ino.0 >> (inopblog + agblklog))
        .map_err(|_| ParseError::IntegerConversion { field: "agno" })?;
    Ok(InodeLocation {
        ag: AgNumber(ag),
        ag_block,
        slot,
    })
}

/// Split a filesystem block number into (AG, block within AG).
pub fn split_fsblock(block: BlockNumber, agblklog: u8) -> Result<(AgNumber, u64), ParseError> {
    let agblklog = u32::from(agblklog);
    if agblklog >= 64 {
        return Err(ParseError::InvalidField {
            field: "sb_agblklog",
            reason: "exceeds 63",
        });
    }
    let ag = u32::try_from(block.0 >> agblklog)
        .map_err(|_| ParseError::IntegerConversion { field: "agno" })?;
    Ok((AgNumber(ag), block.0 & low_mask(agblklog)))
}

#[inline]
fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1_u64 << bits) - 1
    }
}
