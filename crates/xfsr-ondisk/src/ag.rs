//! Allocation-group headers.
//!
//! Each AG starts with the superblock copy in sector 0, the free-space header
//! (AGF) in sector 1 and the inode header (AGI) in sector 2.

use serde::{Deserialize, Serialize};
use xfsr_types::{ParseError, XFS_AGF_MAGIC, XFS_AGI_MAGIC, read_be_u32};

/// Bytes of the AGF/AGI that are decoded; both fit in the smallest sector.
const AG_HEADER_PARSE_LEN: usize = 64;

fn check_header(bytes: &[u8], magic_expected: u32) -> Result<(), ParseError> {
    if bytes.len() < AG_HEADER_PARSE_LEN {
        return Err(ParseError::InsufficientData {
            needed: AG_HEADER_PARSE_LEN,
            offset: 0,
            actual: bytes.len(),
        });
    }
    let magic = read_be_u32(bytes, 0x00)?;
    if magic != magic_expected {
        return Err(ParseError::InvalidMagic {
            expected: u64::from(magic_expected),
            actual: u64::from(magic),
        });
    }
    Ok(())
}

/// Free-space header (`xfs_agf`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgfHeader {
    pub version: u32,
    pub seqno: u32,
    /// Blocks in this AG (the last AG may be short).
    pub length: u32,
    pub bno_root: u32,
    pub cnt_root: u32,
    pub bno_level: u32,
    pub cnt_level: u32,
    pub free_list_count: u32,
    pub free_blocks: u32,
    pub longest_free: u32,
}

impl AgfHeader {
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        check_header(bytes, XFS_AGF_MAGIC)?;
        Ok(Self {
            version: read_be_u32(bytes, 0x04)?,
            seqno: read_be_u32(bytes, 0x08)?,
            length: read_be_u32(bytes, 0x0C)?,
            bno_root: read_be_u32(bytes, 0x10)?,
            cnt_root: read_be_u32(bytes, 0x14)?,
            bno_level: read_be_u32(bytes, 0x1C)?,
            cnt_level: read_be_u32(bytes, 0x20)?,
            free_list_count: read_be_u32(bytes, 0x30)?,
            free_blocks: read_be_u32(bytes, 0x34)?,
            longest_free: read_be_u32(bytes, 0x38)?,
        })
    }
}

/// Inode allocation header (`xfs_agi`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgiHeader {
    pub version: u32,
    pub seqno: u32,
    pub length: u32,
    /// Allocated inodes in this AG.
    pub count: u32,
    pub root: u32,
    pub level: u32,
    pub free_count: u32,
    pub new_ino: u32,
    pub dir_ino: u32,
}

impl AgiHeader {
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        check_header(bytes, XFS_AGI_MAGIC)?;
        Ok(Self {
            version: read_be_u32(bytes, 0x04)?,
            seqno: read_be_u32(bytes, 0x08)?,
            length: read_be_u32(bytes, 0x0C)?,
            count: read_be_u32(bytes, 0x10)?,
            root: read_be_u32(bytes, 0x14)?,
            level: read_be_u32(bytes, 0x18)?,
            free_count: read_be_u32(bytes, 0x1C)?,
            new_ino: read_be_u32(bytes, 0x20)?,
            dir_ino: read_be_u32(bytes, 0x24)?,
        })
    }
}
