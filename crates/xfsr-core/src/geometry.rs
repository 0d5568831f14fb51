//! Volume geometry: superblock load and address conversion.

use crate::parse_error_to_xfs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xfsr_block::{ByteDevice, read_superblock_region};
use xfsr_error::{Result, XfsError};
use xfsr_ondisk::XfsSuperblock;
use xfsr_types::{
    AgNumber, BlockNumber, BlockSize, ByteOffset, InodeNumber, split_fsblock, split_inode_number,
};

/// Geometry derived from the superblock, immutable after mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGeometry {
    pub sector_size: u32,
    pub block_size: BlockSize,
    pub block_log: u8,
    pub ag_blocks: u32,
    pub ag_block_log: u8,
    pub ag_count: u32,
    pub inode_size: u16,
    pub inodes_per_block: u16,
    pub inopb_log: u8,
    pub root_ino: InodeNumber,
    pub data_blocks: u64,
    pub version: u16,
    pub label: String,
    /// Length of the backing store in bytes.
    pub device_len: u64,
}

/// Read and parse the superblock, then derive the geometry.
///
/// A magic mismatch is reported as `UnknownFormat`; any other defect as
/// `BogusFormat`.
pub fn load_geometry(dev: &dyn ByteDevice) -> Result<(XfsSuperblock, VolumeGeometry)> {
    let device_len = dev.len_bytes();
    let region = read_superblock_region(dev)?;
    let sb = XfsSuperblock::parse_superblock_region(&region).map_err(|err| {
        debug!(target: "xfsr::mount", event = "superblock_rejected", error = %err);
        parse_error_to_xfs(&err)
    })?;
    let geometry = VolumeGeometry::from_superblock(&sb, device_len)?;
    debug!(
        target: "xfsr::mount",
        event = "geometry",
        block_size = geometry.block_size.get(),
        sector_size = geometry.sector_size,
        ag_count = geometry.ag_count,
        ag_blocks = geometry.ag_blocks,
        inode_size = geometry.inode_size,
        root_ino = geometry.root_ino.0,
        version = geometry.version,
        device_len
    );
    Ok((sb, geometry))
}

impl VolumeGeometry {
    pub fn from_superblock(sb: &XfsSuperblock, device_len: u64) -> Result<Self> {
        let block_size = sb.validate_geometry().map_err(|err| {
            warn!(target: "xfsr::mount", event = "geometry_rejected", error = %err);
            parse_error_to_xfs(&err)
        })?;
        Ok(Self {
            sector_size: u32::from(sb.sector_size),
            block_size,
            block_log: sb.block_log,
            ag_blocks: sb.ag_blocks,
            ag_block_log: sb.ag_block_log,
            ag_count: sb.ag_count,
            inode_size: sb.inode_size,
            inodes_per_block: sb.inodes_per_block,
            inopb_log: sb.inopb_log,
            root_ino: InodeNumber(sb.root_ino),
            data_blocks: sb.data_blocks,
            version: sb.version(),
            label: sb.label.clone(),
            device_len,
        })
    }

    /// Block size as a `usize` buffer length.
    #[must_use]
    pub fn block_len(&self) -> usize {
        // BlockSize is at most 64 KiB.
        self.block_size.get() as usize
    }

    fn linear_block(&self, ag: AgNumber, ag_block: u64) -> Result<u64> {
        if ag.0 >= self.ag_count {
            return Err(XfsError::BogusFormat(format!(
                "allocation group {ag} out of range (count {})",
                self.ag_count
            )));
        }
        if ag_block >= u64::from(self.ag_blocks) {
            return Err(XfsError::BogusFormat(format!(
                "block {ag_block} past end of allocation group {ag}"
            )));
        }
        u64::from(ag.0)
            .checked_mul(u64::from(self.ag_blocks))
            .and_then(|base| base.checked_add(ag_block))
            .ok_or_else(|| XfsError::BogusFormat("block address overflow".into()))
    }

    fn block_bytes(&self, linear: u64) -> Result<ByteOffset> {
        linear
            .checked_mul(u64::from(self.block_size.get()))
            .map(ByteOffset)
            .ok_or_else(|| XfsError::BogusFormat(format!("block {linear} byte offset overflows")))
    }

    /// Byte offset of a filesystem block (AG number in the high bits).
    pub fn fsblock_to_byte(&self, block: BlockNumber) -> Result<ByteOffset> {
        let (ag, ag_block) =
            split_fsblock(block, self.ag_block_log).map_err(|e| parse_error_to_xfs(&e))?;
        self.block_bytes(self.linear_block(ag, ag_block)?)
    }

    /// Byte offset of an inode record.
    pub fn inode_byte_offset(&self, ino: InodeNumber) -> Result<ByteOffset> {
        let loc = split_inode_number(ino, self.inopb_log, self.ag_block_log)
            .map_err(|e| parse_error_to_xfs(&e))?;
        if loc.slot >= u64::from(self.inodes_per_block) {
            return Err(XfsError::BogusFormat(format!(
                "inode {ino}: slot {} beyond {} inodes per block",
                loc.slot, self.inodes_per_block
            )));
        }
        let block = self.block_bytes(self.linear_block(loc.ag, loc.ag_block)?)?;
        block
            .checked_add(loc.slot * u64::from(self.inode_size))
            .ok_or_else(|| XfsError::BogusFormat(format!("inode {ino}: offset overflow")))
    }

    /// Byte offset of sector `sector` of allocation group `ag`.
    pub fn ag_sector_offset(&self, ag: AgNumber, sector: u32) -> Result<ByteOffset> {
        let start = self.block_bytes(self.linear_block(ag, 0)?)?;
        start
            .checked_add(u64::from(sector) * u64::from(self.sector_size))
            .ok_or_else(|| XfsError::BogusFormat(format!("AG {ag} header offset overflow")))
    }
}
