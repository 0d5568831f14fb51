//! Logical-to-physical block resolution for EXTENTS and BTREE data forks.

use crate::VolumeInner;
use crate::inode::XfsInode;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use xfsr_error::{Result, XfsError};
use xfsr_ondisk::{
    BmbtNode, DataFork, XfsExtent, parse_bmbt_block, parse_bmdr_root, parse_extent_list,
};
use xfsr_types::{BlockNumber, FileBlock, ParseError};

/// Where a run of file blocks lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMapping {
    /// Filesystem block backing the requested file block.
    pub physical: BlockNumber,
    /// Contiguous blocks granted; never above the request and never past the
    /// end of the extent.
    pub blocks: u64,
    /// Unwritten extent: the run reads as zeros.
    pub sparse: bool,
}

fn from_extent(ext: &XfsExtent, block: FileBlock, max_blocks: u64) -> Option<BlockMapping> {
    let (physical, blocks) = ext.map(block, max_blocks)?;
    Some(BlockMapping {
        physical,
        blocks,
        sparse: ext.unwritten,
    })
}

fn unmapped(inode: &XfsInode, block: FileBlock) -> XfsError {
    warn!(target: "xfsr::bmap", event = "unmapped", ino = inode.ino.0, block = block.0);
    XfsError::BogusFormat(format!("inode {}: file block {block} is not mapped", inode.ino))
}

fn bad_node(inode: &XfsInode, what: &str, e: &ParseError) -> XfsError {
    warn!(target: "xfsr::bmap", event = "bad_node", ino = inode.ino.0, what, error = %e);
    XfsError::BogusFormat(format!("inode {}: {what}: {e}", inode.ino))
}

/// Resolve `block` of `inode` to a physical run of at most `max_blocks`.
///
/// A request for zero blocks still locates `block` and grants nothing.
pub(crate) fn resolve(
    vol: &VolumeInner,
    inode: &XfsInode,
    block: FileBlock,
    max_blocks: u64,
) -> Result<BlockMapping> {
    match &inode.core.data_fork {
        DataFork::Extents { count, bytes } => {
            let extents = parse_extent_list(bytes, *count).map_err(|e| {
                XfsError::BogusFormat(format!("inode {}: extent list: {e}", inode.ino))
            })?;
            let mapping = extents
                .iter()
                .find_map(|ext| from_extent(ext, block, max_blocks))
                .ok_or_else(|| unmapped(inode, block))?;
            trace!(
                target: "xfsr::bmap",
                ino = inode.ino.0,
                block = block.0,
                physical = mapping.physical.0,
                granted = mapping.blocks,
                sparse = mapping.sparse,
                "extent list hit"
            );
            Ok(mapping)
        }
        DataFork::Btree { bytes } => resolve_btree(vol, inode, bytes, block, max_blocks),
        other => Err(XfsError::NotSupported(format!(
            "inode {}: block mapping for {} fork",
            inode.ino,
            other.format_name()
        ))),
    }
}

/// Descend from the in-inode root to the leaf covering `block`.
///
/// Every node is released back to the block cache as soon as the next
/// pointer (or the matching extent) has been copied out of it.
fn resolve_btree(
    vol: &VolumeInner,
    inode: &XfsInode,
    fork: &[u8],
    block: FileBlock,
    max_blocks: u64,
) -> Result<BlockMapping> {
    let root = parse_bmdr_root(fork).map_err(|e| bad_node(inode, "bmap root", &e))?;
    let mut child = root.child_for(block).ok_or_else(|| unmapped(inode, block))?;
    let mut level = root.level;

    while level > 0 {
        level -= 1;
        trace!(target: "xfsr::bmap", ino = inode.ino.0, node = child.0, level, "descend");
        let node = {
            let raw = vol.block(child)?;
            parse_bmbt_block(&raw, level).map_err(|e| bad_node(inode, "bmap node", &e))?
        };
        match node {
            BmbtNode::Index(index) => {
                child = index.child_for(block).ok_or_else(|| unmapped(inode, block))?;
            }
            BmbtNode::Leaf(extents) => {
                return extents
                    .iter()
                    .find_map(|ext| from_extent(ext, block, max_blocks))
                    .ok_or_else(|| unmapped(inode, block));
            }
        }
    }
    Err(unmapped(inode, block))
}
