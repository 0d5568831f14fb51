//! Block-mapping structures: packed extent records and the bmap B+Tree.
//!
//! # Extent record layout (128 bits, big-endian)
//!
//! | Bits | Field |
//! |------|-------|
//! | 127 | unwritten flag |
//! | 126..73 | logical file offset (54 bits) |
//! | 72..21 | filesystem start block (52 bits) |
//! | 20..0 | block count (21 bits) |
//!
//! # B+Tree layout
//!
//! The root lives in the inode's data fork: a 4-byte header (`level`,
//! `numrecs`), then `maxrecs` key slots, then `maxrecs` pointer slots, where
//! `maxrecs` is what fits in the fork. Node blocks carry a long-form header
//! (`BMAP`, or `BMA3` with CRC fields) and the same key/pointer split sized to
//! the block, or packed extent records at level 0.

use serde::{Deserialize, Serialize};
use xfsr_types::{
    BlockNumber, FileBlock, ParseError, XFS_BMAP_CRC_MAGIC, XFS_BMAP_MAGIC, XFS_BMAP_MAX_LEVELS,
    XFS_BMBT_KEY_SIZE, XFS_BMBT_PTR_SIZE, XFS_BMBT_REC_SIZE, XFS_BMDR_HDR_SIZE,
    XFS_BTREE_LBLOCK_CRC_SIZE, XFS_BTREE_LBLOCK_SIZE, ensure_slice, read_be_u16, read_be_u32,
    read_be_u64,
};

const MASK_21: u64 = (1 << 21) - 1;
const MASK_9: u64 = (1 << 9) - 1;
const MASK_54: u64 = (1 << 54) - 1;

/// One decoded extent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XfsExtent {
    pub file_offset: u64,
    pub start_block: u64,
    pub block_count: u64,
    /// Preallocated but never written; reads as zeros.
    pub unwritten: bool,
}

impl XfsExtent {
    /// Decode the 16-byte record at `offset`.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<Self, ParseError> {
        let l0 = read_be_u64(bytes, offset)?;
        let l1 = read_be_u64(bytes, offset + 8)?;
        Ok(Self {
            unwritten: (l0 >> 63) != 0,
            file_offset: (l0 >> 9) & MASK_54,
            start_block: ((l0 & MASK_9) << 43) | (l1 >> 21),
            block_count: l1 & MASK_21,
        })
    }

    /// Pack back into the on-disk representation.
    #[must_use]
    pub fn encode(&self) -> [u8; XFS_BMBT_REC_SIZE] {
        let l0 = (u64::from(self.unwritten) << 63)
            | ((self.file_offset & MASK_54) << 9)
            | (self.start_block >> 43);
        let l1 = ((self.start_block & ((1 << 43) - 1)) << 21) | (self.block_count & MASK_21);
        let mut out = [0_u8; XFS_BMBT_REC_SIZE];
        out[..8].copy_from_slice(&l0.to_be_bytes());
        out[8..].copy_from_slice(&l1.to_be_bytes());
        out
    }

    #[must_use]
    pub fn contains(&self, block: FileBlock) -> bool {
        block.0 >= self.file_offset && block.0 - self.file_offset < self.block_count
    }

    /// Physical block backing `block` and how many contiguous blocks, at most
    /// `max_blocks`, follow it inside this extent.
    #[must_use]
    pub fn map(&self, block: FileBlock, max_blocks: u64) -> Option<(BlockNumber, u64)> {
        if !self.contains(block) {
            return None;
        }
        let delta = block.0 - self.file_offset;
        let physical = BlockNumber(self.start_block).checked_add(delta)?;
        Some((physical, max_blocks.min(self.block_count - delta)))
    }
}

/// Decode `count` packed extent records from the start of `bytes`.
pub fn parse_extent_list(bytes: &[u8], count: u32) -> Result<Vec<XfsExtent>, ParseError> {
    let count = usize::try_from(count).map_err(|_| ParseError::IntegerConversion {
        field: "di_nextents",
    })?;
    let needed = count
        .checked_mul(XFS_BMBT_REC_SIZE)
        .ok_or(ParseError::InvalidField {
            field: "di_nextents",
            reason: "overflow",
        })?;
    if needed > bytes.len() {
        return Err(ParseError::InsufficientData {
            needed,
            offset: 0,
            actual: bytes.len(),
        });
    }
    (0..count)
        .map(|idx| XfsExtent::decode(bytes, idx * XFS_BMBT_REC_SIZE))
        .collect()
}

/// Keys and child pointers of one intermediate level (root or node block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtreeIndex {
    pub level: u16,
    pub keys: Vec<u64>,
    pub ptrs: Vec<u64>,
}

impl BtreeIndex {
    /// Child covering `block`: the rightmost key not above it, or the last
    /// child when no key qualifies.
    #[must_use]
    pub fn child_for(&self, block: FileBlock) -> Option<BlockNumber> {
        let idx = self
            .keys
            .iter()
            .rposition(|key| *key <= block.0)
            .unwrap_or(self.keys.len().checked_sub(1)?);
        self.ptrs.get(idx).copied().map(BlockNumber)
    }
}

fn parse_index_records(
    bytes: &[u8],
    hdr: usize,
    level: u16,
    numrecs: u16,
) -> Result<BtreeIndex, ParseError> {
    let avail = bytes.len().saturating_sub(hdr);
    let maxrecs = avail / (XFS_BMBT_KEY_SIZE + XFS_BMBT_PTR_SIZE);
    let numrecs = usize::from(numrecs);
    if numrecs == 0 || numrecs > maxrecs {
        return Err(ParseError::InvalidField {
            field: "bb_numrecs",
            reason: "outside 1..=maxrecs",
        });
    }
    let ptr_base = hdr + maxrecs * XFS_BMBT_KEY_SIZE;
    let mut keys = Vec::with_capacity(numrecs);
    let mut ptrs = Vec::with_capacity(numrecs);
    for idx in 0..numrecs {
        keys.push(read_be_u64(bytes, hdr + idx * XFS_BMBT_KEY_SIZE)?);
        ptrs.push(read_be_u64(bytes, ptr_base + idx * XFS_BMBT_PTR_SIZE)?);
    }
    Ok(BtreeIndex { level, keys, ptrs })
}

/// Parse the B+Tree root stored in a `BTREE`-format data fork.
pub fn parse_bmdr_root(fork: &[u8]) -> Result<BtreeIndex, ParseError> {
    ensure_slice(fork, 0, XFS_BMDR_HDR_SIZE)?;
    let level = read_be_u16(fork, 0)?;
    let numrecs = read_be_u16(fork, 2)?;
    if level == 0 || level > XFS_BMAP_MAX_LEVELS {
        return Err(ParseError::InvalidField {
            field: "bb_level",
            reason: "root level outside 1..=8",
        });
    }
    parse_index_records(fork, XFS_BMDR_HDR_SIZE, level, numrecs)
}

/// Decoded bmap B+Tree node block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BmbtNode {
    Index(BtreeIndex),
    Leaf(Vec<XfsExtent>),
}

/// Parse a node block, checking that it sits at `expected_level`.
pub fn parse_bmbt_block(block: &[u8], expected_level: u16) -> Result<BmbtNode, ParseError> {
    let magic = read_be_u32(block, 0)?;
    let hdr = match magic {
        XFS_BMAP_MAGIC => XFS_BTREE_LBLOCK_SIZE,
        XFS_BMAP_CRC_MAGIC => XFS_BTREE_LBLOCK_CRC_SIZE,
        other => {
            return Err(ParseError::InvalidMagic {
                expected: u64::from(XFS_BMAP_MAGIC),
                actual: u64::from(other),
            });
        }
    };
    ensure_slice(block, 0, hdr)?;
    let level = read_be_u16(block, 4)?;
    let numrecs = read_be_u16(block, 6)?;
    if level != expected_level {
        return Err(ParseError::InvalidField {
            field: "bb_level",
            reason: "node level does not match its depth",
        });
    }

    if level > 0 {
        return parse_index_records(block, hdr, level, numrecs).map(BmbtNode::Index);
    }

    let maxrecs = block.len().saturating_sub(hdr) / XFS_BMBT_REC_SIZE;
    if usize::from(numrecs) > maxrecs {
        return Err(ParseError::InvalidField {
            field: "bb_numrecs",
            reason: "more leaf records than fit in the block",
        });
    }
    let records = ensure_slice(block, hdr, usize::from(numrecs) * XFS_BMBT_REC_SIZE)?;
    parse_extent_list(records, u32::from(numrecs)).map(BmbtNode::Leaf)
}
