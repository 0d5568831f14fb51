#![forbid(unsafe_code)]
//! On-disk format parsing for XFS structures.
//!
//! Pure parsing crate: no I/O, no side effects. Parses big-endian byte slices
//! into typed Rust structures for the superblock, allocation-group headers,
//! inode cores and data forks, packed extent records, and the block-mapping
//! B+Tree (in-inode root and on-disk node blocks).

pub mod ag;
pub mod bmap;
pub mod inode;
pub mod superblock;

pub use ag::{AgfHeader, AgiHeader};
pub use bmap::{BmbtNode, BtreeIndex, XfsExtent, parse_bmbt_block, parse_bmdr_root, parse_extent_list};
pub use inode::{DataFork, FileType, XfsInodeCore, XfsTimestamp};
pub use superblock::XfsSuperblock;
