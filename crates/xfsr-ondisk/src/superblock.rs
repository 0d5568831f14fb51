use serde::{Deserialize, Serialize};
use xfsr_types::{
    BlockSize, ParseError, XFS_SB_MAGIC, XFS_SB_REGION_SIZE, XFS_SB_VERSION_5,
    XFS_SB_VERSION_NUMBITS, read_be_u16, read_be_u32, read_be_u64, read_fixed, read_u8,
    trim_nul_padded,
};

/// Primary XFS superblock (`xfs_sb`), the fields a reader needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XfsSuperblock {
    // ── Geometry ─────────────────────────────────────────────────────────
    pub block_size: u32,
    pub data_blocks: u64,
    pub root_ino: u64,
    pub ag_blocks: u32,
    pub ag_count: u32,
    pub sector_size: u16,
    pub inode_size: u16,
    pub inodes_per_block: u16,

    // ── log2 companions ──────────────────────────────────────────────────
    pub block_log: u8,
    pub sector_log: u8,
    pub inode_log: u8,
    pub inopb_log: u8,
    pub ag_block_log: u8,

    // ── Identity ─────────────────────────────────────────────────────────
    pub magic: u32,
    pub uuid: [u8; 16],
    pub label: String,
    pub version_num: u16,

    // ── Counters (advisory, not kept in sync on disk) ────────────────────
    pub inode_count: u64,
    pub free_inodes: u64,
    pub free_data_blocks: u64,
}

impl XfsSuperblock {
    /// Parse the superblock from the first sector of the volume.
    ///
    /// Only the magic is checked here. A wrong magic is the one answer that
    /// means "not XFS"; see [`Self::validate_geometry`] for the rest.
    pub fn parse_superblock_region(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < XFS_SB_REGION_SIZE {
            return Err(ParseError::InsufficientData {
                needed: XFS_SB_REGION_SIZE,
                offset: 0,
                actual: region.len(),
            });
        }

        let magic = read_be_u32(region, 0x00)?;
        if magic != XFS_SB_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u64::from(XFS_SB_MAGIC),
                actual: u64::from(magic),
            });
        }

        Ok(Self {
            block_size: read_be_u32(region, 0x04)?,
            data_blocks: read_be_u64(region, 0x08)?,
            root_ino: read_be_u64(region, 0x38)?,
            ag_blocks: read_be_u32(region, 0x54)?,
            ag_count: read_be_u32(region, 0x58)?,
            sector_size: read_be_u16(region, 0x66)?,
            inode_size: read_be_u16(region, 0x68)?,
            inodes_per_block: read_be_u16(region, 0x6A)?,

            block_log: read_u8(region, 0x78)?,
            sector_log: read_u8(region, 0x79)?,
            inode_log: read_u8(region, 0x7A)?,
            inopb_log: read_u8(region, 0x7B)?,
            ag_block_log: read_u8(region, 0x7C)?,

            magic,
            uuid: read_fixed::<16>(region, 0x20)?,
            label: trim_nul_padded(&read_fixed::<12>(region, 0x6C)?),
            version_num: read_be_u16(region, 0x64)?,

            inode_count: read_be_u64(region, 0x80)?,
            free_inodes: read_be_u64(region, 0x88)?,
            free_data_blocks: read_be_u64(region, 0x90)?,
        })
    }

    /// Superblock version (low nibble of `sb_versionnum`).
    #[must_use]
    pub fn version(&self) -> u16 {
        self.version_num & XFS_SB_VERSION_NUMBITS
    }

    /// Version 5 volumes carry CRC'd metadata and v3 inodes.
    #[must_use]
    pub fn is_v5(&self) -> bool {
        self.version() == XFS_SB_VERSION_5
    }

    /// Reject geometry that every later address computation divides or
    /// shifts by.
    pub fn validate_geometry(&self) -> Result<BlockSize, ParseError> {
        let block_size = BlockSize::new(self.block_size)?;
        if u32::from(self.block_log) != block_size.shift() {
            return Err(ParseError::InvalidField {
                field: "sb_blocklog",
                reason: "does not match sb_blocksize",
            });
        }
        if self.sector_size == 0 || !self.sector_size.is_power_of_two() {
            return Err(ParseError::InvalidField {
                field: "sb_sectsize",
                reason: "must be a non-zero power of two",
            });
        }
        if self.inode_size == 0 || u32::from(self.inode_size) > block_size.get() {
            return Err(ParseError::InvalidField {
                field: "sb_inodesize",
                reason: "must be non-zero and fit in one block",
            });
        }
        if self.ag_count == 0 {
            return Err(ParseError::InvalidField {
                field: "sb_agcount",
                reason: "zero allocation groups",
            });
        }
        if self.ag_blocks == 0 {
            return Err(ParseError::InvalidField {
                field: "sb_agblocks",
                reason: "zero blocks per allocation group",
            });
        }
        if self.inodes_per_block == 0 {
            return Err(ParseError::InvalidField {
                field: "sb_inopblock",
                reason: "zero inodes per block",
            });
        }
        if u32::from(self.inode_size) * u32::from(self.inodes_per_block) > block_size.get() {
            return Err(ParseError::InvalidField {
                field: "sb_inopblock",
                reason: "inode records overflow one block",
            });
        }
        if 1_u32.checked_shl(u32::from(self.inopb_log)) != Some(u32::from(self.inodes_per_block)) {
            return Err(ParseError::InvalidField {
                field: "sb_inopblog",
                reason: "does not match sb_inopblock",
            });
        }
        // The inode number packs agbno into ag_block_log bits; every AG block must fit.
        if self.ag_block_log >= 32 || u64::from(self.ag_blocks) > 1_u64 << self.ag_block_log {
            return Err(ParseError::InvalidField {
                field: "sb_agblklog",
                reason: "does not cover sb_agblocks",
            });
        }
        Ok(block_size)
    }
}
