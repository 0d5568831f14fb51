#![forbid(unsafe_code)]
//! Whole-volume tests over images assembled byte by byte.
//!
//! Layout of the standard image (1 KiB blocks, one AG of 64 blocks, 256-byte
//! v3 inodes, 4 per block):
//!
//! | Block | Content |
//! |-------|---------|
//! | 0 | superblock, AGF (sector 1) |
//! | 1 | AGI (sector 2) |
//! | 8 | inodes 32 (root dir), 33 (inline file), 34 (extent file), 35 (symlink) |
//! | 9 | inodes 36 (btree file), 37 (char device), 38 (empty dir) |
//! | 20..24 | extent file payload |
//! | 30..35 | bmap btree nodes of inode 36 |
//! | 40..44 | btree file payload |

use std::io::SeekFrom;
use std::sync::Arc;
use xfsr_block::MemoryByteDevice;
use xfsr_core::{
    AgNumber, BlockNumber, FileBlock, FileType, InodeNumber, MountFlags, OpenAction, OpenOptions,
    VfsObject, Volume, XfsError,
};
use xfsr_types::{
    S_IFCHR, S_IFDIR, S_IFLNK, S_IFREG, XFS_AGF_MAGIC, XFS_AGI_MAGIC, XFS_BMAP_CRC_MAGIC,
    XFS_BMAP_MAGIC, XFS_DINODE_FMT_BTREE, XFS_DINODE_FMT_DEV, XFS_DINODE_FMT_EXTENTS,
    XFS_DINODE_FMT_LOCAL, XFS_DINODE_MAGIC, XFS_SB_MAGIC,
};

const BS: usize = 1024;
const INODE_SIZE: usize = 256;
const ROOT: u64 = 32;
const INLINE_FILE: u64 = 33;
const EXTENT_FILE: u64 = 34;
const SYMLINK: u64 = 35;
const BTREE_FILE: u64 = 36;
const CHAR_DEV: u64 = 37;
const EMPTY_DIR: u64 = 38;
const EXTENT_FILE_SIZE: u64 = 3996;

// ── Image builder ───────────────────────────────────────────────────────────

struct Image(Vec<u8>);

impl Image {
    fn new(blocks: usize) -> Self {
        Self(vec![0_u8; blocks * BS])
    }

    fn put16(&mut self, off: usize, v: u16) {
        self.0[off..off + 2].copy_from_slice(&v.to_be_bytes());
    }

    fn put32(&mut self, off: usize, v: u32) {
        self.0[off..off + 4].copy_from_slice(&v.to_be_bytes());
    }

    fn put64(&mut self, off: usize, v: u64) {
        self.0[off..off + 8].copy_from_slice(&v.to_be_bytes());
    }

    fn fill_block(&mut self, block: usize, byte: u8) {
        self.0[block * BS..(block + 1) * BS].fill(byte);
    }

    fn superblock(&mut self, magic: u32) {
        self.put32(0x00, magic);
        self.put32(0x04, 1024);
        self.put64(0x08, 64);
        self.put64(0x38, ROOT);
        self.put32(0x54, 64);
        self.put32(0x58, 1);
        self.put16(0x64, 5);
        self.put16(0x66, 512);
        self.put16(0x68, 256);
        self.put16(0x6A, 4);
        self.0[0x6C..0x6C + 7].copy_from_slice(b"scratch");
        self.0[0x78] = 10;
        self.0[0x79] = 9;
        self.0[0x7A] = 8;
        self.0[0x7B] = 2;
        self.0[0x7C] = 6;
        self.put64(0x80, 64);
        self.put64(0x88, 58);
        self.put64(0x90, 30);
    }

    fn ag_headers(&mut self) {
        self.put32(512, XFS_AGF_MAGIC);
        self.put32(512 + 0x04, 1);
        self.put32(512 + 0x0C, 64);
        self.put32(512 + 0x34, 30);
        self.put32(512 + 0x38, 20);
        self.put32(1024, XFS_AGI_MAGIC);
        self.put32(1024 + 0x0C, 64);
        self.put32(1024 + 0x10, 64);
        self.put32(1024 + 0x1C, 58);
    }

    fn inode(&mut self, ino: u64, mode: u16, format: u8, size: u64, nextents: u32, fork: &[u8]) {
        let ino_usize = usize::try_from(ino).expect("ino");
        let base = (ino_usize >> 2) * BS + (ino_usize & 3) * INODE_SIZE;
        self.put16(base, XFS_DINODE_MAGIC);
        self.put16(base + 0x02, mode);
        self.0[base + 0x04] = 3;
        self.0[base + 0x05] = format;
        self.put32(base + 0x08, 1000);
        self.put32(base + 0x0C, 100);
        self.put32(base + 0x10, 1);
        self.put32(base + 0x20, 1_700_000_000);
        self.put32(base + 0x28, 1_700_000_100);
        self.put32(base + 0x30, 1_700_000_200);
        self.put64(base + 0x38, size);
        self.put64(base + 0x40, size.div_ceil(1024));
        self.put32(base + 0x4C, nextents);
        self.put32(base + 0x5C, 7);
        self.put32(base + 0x90, 1_600_000_000);
        self.put64(base + 0x98, ino);
        self.0[base + 176..base + 176 + fork.len()].copy_from_slice(fork);
    }

    fn bmbt_node(&mut self, block: usize, crc: bool, level: u16, body: &[u8]) {
        let base = block * BS;
        self.put32(base, if crc { XFS_BMAP_CRC_MAGIC } else { XFS_BMAP_MAGIC });
        self.put16(base + 4, level);
        let hdr = if crc { 72 } else { 24 };
        self.0[base + hdr..base + hdr + body.len()].copy_from_slice(body);
    }

    fn bmbt_index(&mut self, block: usize, crc: bool, level: u16, keys: &[u64], ptrs: &[u64]) {
        let hdr = if crc { 72 } else { 24 };
        let maxrecs = (BS - hdr) / 16;
        let mut body = vec![0_u8; BS - hdr];
        for (i, (k, p)) in keys.iter().zip(ptrs).enumerate() {
            body[i * 8..i * 8 + 8].copy_from_slice(&k.to_be_bytes());
            body[maxrecs * 8 + i * 8..maxrecs * 8 + i * 8 + 8].copy_from_slice(&p.to_be_bytes());
        }
        self.bmbt_node(block, crc, level, &body);
        self.put16(block * BS + 6, u16::try_from(keys.len()).expect("numrecs"));
    }

    fn bmbt_leaf(&mut self, block: usize, extents: &[(u64, u64, u64, bool)]) {
        self.bmbt_node(block, false, 0, &records(extents));
        self.put16(block * BS + 6, u16::try_from(extents.len()).expect("numrecs"));
    }
}

fn records(extents: &[(u64, u64, u64, bool)]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(file_offset, start_block, block_count, unwritten) in extents {
        let l0 = (u64::from(unwritten) << 63) | (file_offset << 9) | (start_block >> 43);
        let l1 = ((start_block & ((1 << 43) - 1)) << 21) | block_count;
        out.extend_from_slice(&l0.to_be_bytes());
        out.extend_from_slice(&l1.to_be_bytes());
    }
    out
}

/// Root of a 2-level bmap btree in an 80-byte fork (4 key slots).
fn btree_root(level: u16, keys: &[u64], ptrs: &[u64]) -> Vec<u8> {
    let mut fork = vec![0_u8; 80];
    fork[0..2].copy_from_slice(&level.to_be_bytes());
    fork[2..4].copy_from_slice(&u16::try_from(keys.len()).expect("n").to_be_bytes());
    for (i, (k, p)) in keys.iter().zip(ptrs).enumerate() {
        fork[4 + i * 8..12 + i * 8].copy_from_slice(&k.to_be_bytes());
        fork[36 + i * 8..44 + i * 8].copy_from_slice(&p.to_be_bytes());
    }
    fork
}

fn standard_image() -> Vec<u8> {
    let mut img = Image::new(64);
    img.superblock(XFS_SB_MAGIC);
    img.ag_headers();

    img.inode(ROOT, S_IFDIR | 0o755, XFS_DINODE_FMT_LOCAL, 6, 0, &[0, 0, 0, 0, 0, 32]);
    img.inode(INLINE_FILE, S_IFREG | 0o644, XFS_DINODE_FMT_LOCAL, 5, 0, b"hello");
    img.inode(
        EXTENT_FILE,
        S_IFREG | 0o600,
        XFS_DINODE_FMT_EXTENTS,
        EXTENT_FILE_SIZE,
        3,
        &records(&[(0, 20, 1, false), (1, 21, 1, true), (2, 22, 2, false)]),
    );
    img.inode(SYMLINK, S_IFLNK | 0o777, XFS_DINODE_FMT_LOCAL, 4, 0, b"/tmp");
    img.inode(
        BTREE_FILE,
        S_IFREG | 0o644,
        XFS_DINODE_FMT_BTREE,
        101 * 1024,
        3,
        &btree_root(2, &[0, 100], &[30, 31]),
    );
    img.inode(CHAR_DEV, S_IFCHR | 0o620, XFS_DINODE_FMT_DEV, 0, 0, &0x0401_u32.to_be_bytes());
    img.inode(EMPTY_DIR, S_IFDIR | 0o700, XFS_DINODE_FMT_LOCAL, 0, 0, &[]);

    img.fill_block(20, b'a');
    img.fill_block(21, b'b');
    img.fill_block(22, b'c');
    img.fill_block(23, b'd');

    img.bmbt_index(30, false, 1, &[0, 50], &[32, 33]);
    img.bmbt_index(31, true, 1, &[100], &[34]);
    img.bmbt_leaf(32, &[(0, 40, 2, false)]);
    img.bmbt_leaf(33, &[(50, 42, 1, false)]);
    img.bmbt_leaf(34, &[(100, 43, 1, false)]);
    img.fill_block(40, b'e');
    img.fill_block(41, b'e');
    img.fill_block(42, b'f');
    img.fill_block(43, b'g');
    img.0
}

fn mount() -> (Volume, Arc<MemoryByteDevice>) {
    mount_with(&OpenOptions::default())
}

fn mount_with(options: &OpenOptions) -> (Volume, Arc<MemoryByteDevice>) {
    let dev = Arc::new(MemoryByteDevice::new(standard_image()));
    let vol = Volume::open_with_options(Arc::clone(&dev), MountFlags::READ_ONLY, options)
        .expect("mount");
    (vol, dev)
}

fn open_file(vol: &Volume, ino: u64) -> xfsr_core::File {
    vol.open_file_by_inode(InodeNumber(ino)).expect("open file")
}

// ── Mount ───────────────────────────────────────────────────────────────────

#[test]
fn mount_derives_geometry_and_ag_zero() {
    let (vol, _dev) = mount();
    let g = vol.geometry();
    assert_eq!(g.block_size.get(), 1024);
    assert_eq!(g.sector_size, 512);
    assert_eq!(g.ag_blocks, 64);
    assert_eq!(g.ag_count, 1);
    assert_eq!(g.inode_size, 256);
    assert_eq!(g.inodes_per_block, 4);
    assert_eq!(g.root_ino, InodeNumber(ROOT));
    assert_eq!(g.label, "scratch");
    assert_eq!(g.version, 5);
    assert!(vol.superblock().is_v5());

    let stats = vol.cache_stats();
    assert_eq!(stats.ags.entries, 1);
    assert_eq!(stats.ags.lru_len, 1);

    let ag = vol.allocation_group(AgNumber(0)).expect("ag 0");
    assert_eq!(ag.length, 64);
    assert_eq!(ag.free_blocks, 30);
    assert_eq!(ag.longest_free, 20);
    assert_eq!(ag.inode_count, 64);
    assert_eq!(ag.free_inodes, 58);
    assert_eq!(vol.cache_stats().ags.misses, 1);
    assert!(matches!(
        vol.allocation_group(AgNumber(1)),
        Err(XfsError::InvalidArgument(_))
    ));
}

#[test]
fn foreign_image_costs_one_read() {
    let mut img = Image::new(64);
    img.superblock(0x4546_5342);
    let dev = Arc::new(MemoryByteDevice::new(img.0));
    let err = Volume::open(Arc::clone(&dev), MountFlags::READ_ONLY).expect_err("foreign");
    assert!(err.is_unknown_format(), "{err:?}");
    assert_eq!(err.to_errno(), libc::EINVAL);
    assert_eq!(dev.reads(), 1);
}

#[test]
fn damaged_ag_header_fails_mount() {
    let mut img = standard_image();
    img[512..516].copy_from_slice(b"XXXX");
    let err = Volume::open(MemoryByteDevice::new(img), MountFlags::READ_ONLY).expect_err("agf");
    assert!(matches!(err, XfsError::BogusFormat(ref m) if m.contains("AGF")));
}

#[test]
fn truncated_backing_store_propagates_io() {
    let img = standard_image();
    let dev = MemoryByteDevice::new(img[..BS].to_vec());
    let err = Volume::open(dev, MountFlags::READ_ONLY).expect_err("short");
    assert!(matches!(err, XfsError::Io(_)));
}

#[test]
fn mount_flag_validation() {
    let dev = Arc::new(MemoryByteDevice::new(standard_image()));
    assert!(matches!(
        Volume::open(Arc::clone(&dev), MountFlags::empty()),
        Err(XfsError::WriteProtected)
    ));
    assert!(matches!(
        MountFlags::from_bits(0x80),
        Err(XfsError::InvalidFlags(0x80))
    ));
    let options = OpenOptions {
        format_flags: 1,
        ..OpenOptions::default()
    };
    assert!(matches!(
        Volume::open_with_options(Arc::clone(&dev), MountFlags::READ_ONLY, &options),
        Err(XfsError::InvalidFlags(1))
    ));
    assert_eq!(dev.reads(), 0);

    let flags = MountFlags::from_chain_argument("", true).expect("inherit");
    let vol = Volume::open(
        Arc::clone(&dev),
        flags | MountFlags::FOR_RANGE_IN_USE,
    )
    .expect("mount");
    assert!(vol.flags().contains(MountFlags::FOR_RANGE_IN_USE));
}

#[test]
fn open_path_reads_an_image_file() {
    let path = std::env::temp_dir().join(format!("xfsr-core-{}.img", std::process::id()));
    std::fs::write(&path, standard_image()).expect("write image");
    let vol = Volume::open_path(&path, MountFlags::READ_ONLY).expect("mount");
    let mut f = open_file(&vol, INLINE_FILE);
    let mut buf = [0_u8; 5];
    f.read_exact_at(0, &mut buf).expect("read");
    assert_eq!(&buf, b"hello");
    drop(f);
    vol.close();
    std::fs::remove_file(&path).expect("cleanup");
}

// ── Opening objects ─────────────────────────────────────────────────────────

#[test]
fn open_dispatch_by_type() {
    let (vol, _dev) = mount();
    let root = vol.open_root().expect("root");
    assert_eq!(root.ino(), InodeNumber(ROOT));
    assert_eq!(root.query_info().kind, FileType::Directory);

    assert!(matches!(
        vol.open_by_inode(InodeNumber(EXTENT_FILE)),
        Ok(VfsObject::File(_))
    ));
    assert!(matches!(
        vol.open_by_inode(InodeNumber(EMPTY_DIR)),
        Ok(VfsObject::Directory(_))
    ));
    assert!(matches!(
        vol.open_by_inode(InodeNumber(SYMLINK)),
        Err(XfsError::NotSupported(_))
    ));
    assert!(matches!(
        vol.open_file_by_inode(InodeNumber(SYMLINK)),
        Err(XfsError::WrongType)
    ));
    assert!(matches!(
        vol.open_dir_by_inode(InodeNumber(INLINE_FILE)),
        Err(XfsError::BogusFormat(_))
    ));
}

#[test]
fn root_that_is_not_a_directory_is_bogus() {
    let mut img = standard_image();
    img[0x38..0x40].copy_from_slice(&INLINE_FILE.to_be_bytes());
    let vol = Volume::open(MemoryByteDevice::new(img), MountFlags::READ_ONLY).expect("mount");
    assert!(matches!(vol.open_root(), Err(XfsError::BogusFormat(_))));
}

#[test]
fn inode_outside_any_ag_is_bogus() {
    let (vol, _dev) = mount();
    let past_last_ag = InodeNumber(1 << 8);
    assert!(matches!(
        vol.inode_info(past_last_ag),
        Err(XfsError::BogusFormat(_))
    ));
    // An unwritten inode slot has no "IN" magic.
    assert!(matches!(
        vol.inode_info(InodeNumber(39)),
        Err(XfsError::BogusFormat(_))
    ));
    assert_eq!(vol.cache_stats().inodes.entries, 0);
}

#[test]
fn object_info_fields() {
    let (vol, _dev) = mount();
    let info = open_file(&vol, EXTENT_FILE).query_info();
    assert_eq!(info.ino, InodeNumber(EXTENT_FILE));
    assert_eq!(info.size, EXTENT_FILE_SIZE);
    assert_eq!(info.allocated, 4 * 1024);
    assert_eq!(info.kind, FileType::RegularFile);
    assert_eq!(info.perm, 0o600);
    assert_eq!((info.uid, info.gid, info.nlink), (1000, 100, 1));
    assert_eq!(info.generation, 7);
    assert_eq!(info.atime.sec, 1_700_000_000);
    assert_eq!(info.mtime.sec, 1_700_000_100);
    assert_eq!(info.ctime.sec, 1_700_000_200);
    assert_eq!(info.birth_time.sec, 1_600_000_000);

    let dev = vol.inode_info(InodeNumber(CHAR_DEV)).expect("chr");
    assert_eq!(dev.kind, FileType::CharDevice);
    assert_eq!(dev.rdev, 0x0401);

    let json = serde_json::to_value(&info).expect("serialize");
    assert_eq!(json["size"], EXTENT_FILE_SIZE);
    assert_eq!(json["kind"], "RegularFile");
}

#[test]
fn volume_level_queries() {
    let (vol, _dev) = mount();
    assert!(matches!(vol.query_info(), Err(XfsError::WrongType)));
    assert!(matches!(
        vol.query_range_state(0, 4096),
        Err(XfsError::NotImplemented(_))
    ));
    let json = serde_json::to_value(vol.cache_stats()).expect("stats");
    assert!(json["inodes"]["budget"].as_u64().expect("budget") > 0);
}

// ── Reading ─────────────────────────────────────────────────────────────────

#[test]
fn inline_file_short_read() {
    let (vol, _dev) = mount();
    let mut f = open_file(&vol, INLINE_FILE);
    let mut buf = [0_u8; 10];
    let out = f.read(&mut buf).expect("read");
    assert_eq!((out.bytes, out.eof), (5, true));
    assert_eq!(&buf[..5], b"hello");
    assert_eq!(f.tell(), 5);

    let out = f.read(&mut buf).expect("at eof");
    assert_eq!((out.bytes, out.eof), (0, true));
    assert!(matches!(f.read_exact_at(0, &mut buf), Err(XfsError::EndOfFile)));
}

#[test]
fn extent_file_reads_unwritten_run_as_zeros() {
    let (vol, _dev) = mount();
    let mut f = open_file(&vol, EXTENT_FILE);
    let mut all = vec![0xFF_u8; 4096];
    let out = f.read(&mut all).expect("read");
    assert_eq!(out.bytes, 3996);
    assert!(out.eof);
    assert!(all[..1024].iter().all(|b| *b == b'a'));
    assert!(all[1024..2048].iter().all(|b| *b == 0));
    assert!(all[2048..3072].iter().all(|b| *b == b'c'));
    assert!(all[3072..3996].iter().all(|b| *b == b'd'));

    let mut window = [0xFF_u8; 8];
    f.read_exact_at(1020, &mut window).expect("written to unwritten");
    assert_eq!(window, [b'a', b'a', b'a', b'a', 0, 0, 0, 0]);
    f.read_exact_at(2044, &mut window).expect("unwritten to written");
    assert_eq!(window, [0, 0, 0, 0, b'c', b'c', b'c', b'c']);
    assert_eq!(f.tell(), 2052);

    let m = f.map_block(FileBlock(2), 10).expect("map");
    assert_eq!((m.physical, m.blocks, m.sparse), (BlockNumber(22), 2, false));
    assert!(f.map_block(FileBlock(1), 1).expect("map").sparse);

    // A zero-block request locates the block but grants nothing.
    let m = f.map_block(FileBlock(2), 0).expect("map zero");
    assert_eq!((m.physical, m.blocks), (BlockNumber(22), 0));
}

#[test]
fn strict_read_past_end_touches_no_storage() {
    let (vol, dev) = mount();
    let mut f = open_file(&vol, EXTENT_FILE);
    let before = dev.reads();
    let mut buf = [0_u8; 64];
    assert!(matches!(
        f.read_exact_at(EXTENT_FILE_SIZE - 10, &mut buf),
        Err(XfsError::EndOfFile)
    ));
    assert_eq!(dev.reads(), before);
}

#[test]
fn btree_file_descends_two_levels_and_releases_nodes() {
    let (vol, _dev) = mount();
    let mut f = open_file(&vol, BTREE_FILE);
    let mut buf = vec![0_u8; 2048];
    f.read_exact_at(0, &mut buf).expect("leaf 32");
    assert!(buf.iter().all(|b| *b == b'e'));
    f.read_exact_at(50 * 1024, &mut buf[..1024]).expect("leaf 33");
    assert!(buf[..1024].iter().all(|b| *b == b'f'));
    f.read_exact_at(100 * 1024, &mut buf[..1024]).expect("crc node 31, leaf 34");
    assert!(buf[..1024].iter().all(|b| *b == b'g'));

    let blocks = vol.cache_stats().blocks;
    assert_eq!(blocks.entries, 5);
    assert_eq!(blocks.lru_len, 5);
    // Node 30 was reused for the second lookup.
    assert_eq!(blocks.hits, 1);

    // A hole between mapped ranges is malformed metadata for this reader.
    assert!(matches!(
        f.read_exact_at(10 * 1024, &mut buf[..16]),
        Err(XfsError::BogusFormat(_))
    ));
    assert_eq!(vol.cache_stats().blocks.lru_len, vol.cache_stats().blocks.entries);
}

// ── Cache behaviour through the volume ──────────────────────────────────────

#[test]
fn reopening_a_held_inode_reuses_the_decode() {
    let (vol, dev) = mount();
    let first = open_file(&vol, INLINE_FILE);
    let reads = dev.reads();
    let misses = vol.cache_stats().inodes.misses;

    let second = open_file(&vol, INLINE_FILE);
    assert_eq!(dev.reads(), reads);
    assert_eq!(vol.cache_stats().inodes.misses, misses);
    assert_eq!(vol.cache_stats().inodes.hits, 1);
    assert!(first.same_inode_as(&second));
    assert_eq!(first.query_info(), second.query_info());

    let other = open_file(&vol, EXTENT_FILE);
    assert!(!first.same_inode_as(&other));
}

#[test]
fn zero_budget_drops_inodes_on_close() {
    let options = OpenOptions {
        inode_cache_budget: 0,
        ..OpenOptions::default()
    };
    let (vol, _dev) = mount_with(&options);

    let f = open_file(&vol, INLINE_FILE);
    assert_eq!(vol.cache_stats().inodes.entries, 1);
    f.close();
    assert_eq!(vol.cache_stats().inodes.entries, 0);

    let f = open_file(&vol, INLINE_FILE);
    assert_eq!(vol.cache_stats().inodes.misses, 2);
    drop(f);
    assert_eq!(vol.cache_stats().inodes.evictions, 2);
}

#[test]
fn handles_outlive_volume_close() {
    let (vol, _dev) = mount();
    let mut f = open_file(&vol, INLINE_FILE);
    vol.close();
    let mut buf = [0_u8; 5];
    f.read_exact_at(0, &mut buf).expect("read after close");
    assert_eq!(&buf, b"hello");
}

// ── Cursor ──────────────────────────────────────────────────────────────────

#[test]
fn seek_semantics() {
    let (vol, _dev) = mount();
    let mut f = open_file(&vol, EXTENT_FILE);
    assert_eq!(f.query_size(), EXTENT_FILE_SIZE);
    assert_eq!(f.query_max_size(), i64::MAX);

    assert_eq!(f.seek(SeekFrom::End(-6)).expect("end"), 3990);
    let mut buf = [0_u8; 100];
    let out = f.read(&mut buf).expect("tail");
    assert_eq!((out.bytes, out.eof), (6, true));
    assert_eq!(f.tell(), EXTENT_FILE_SIZE);

    assert!(matches!(
        f.seek(SeekFrom::Current(-5000)),
        Err(XfsError::NegativeSeek)
    ));
    assert_eq!(f.tell(), EXTENT_FILE_SIZE);
    assert_eq!(f.seek(SeekFrom::Current(-996)).expect("back"), 3000);

    assert_eq!(f.seek(SeekFrom::Start(10_000)).expect("past end"), 10_000);
    let out = f.read(&mut buf).expect("past end");
    assert_eq!((out.bytes, out.eof), (0, true));

    let out = f.read_at(2048, &mut buf[..4]).expect("read_at");
    assert_eq!(out.bytes, 4);
    assert_eq!(f.tell(), 2052);
    assert!(f.seek(SeekFrom::End(i64::MAX)).is_ok());
}

// ── Read-only surface ───────────────────────────────────────────────────────

#[test]
fn write_class_operations_are_refused() {
    let (vol, _dev) = mount();
    let mut f = open_file(&vol, EXTENT_FILE);
    assert!(matches!(f.write(0, b"x"), Err(XfsError::WriteProtected)));
    assert!(matches!(f.set_size(0), Err(XfsError::WriteProtected)));
    assert!(matches!(f.set_mode(0o777), Err(XfsError::WriteProtected)));
    assert!(matches!(
        f.set_times(None, Some(std::time::SystemTime::now())),
        Err(XfsError::WriteProtected)
    ));
    assert!(matches!(f.set_owner(Some(0), None), Err(XfsError::WriteProtected)));
    f.flush().expect("flush");

    let mut root = vol.open_root().expect("root");
    assert!(matches!(root.create_dir("d"), Err(XfsError::WriteProtected)));
    assert!(matches!(
        root.create_symlink("l", "/tmp"),
        Err(XfsError::WriteProtected)
    ));
    assert!(matches!(root.unlink("a"), Err(XfsError::WriteProtected)));
    assert!(matches!(root.rename("a", "b"), Err(XfsError::WriteProtected)));
    assert!(matches!(root.set_mode(0o700), Err(XfsError::WriteProtected)));
    assert!(matches!(root.set_times(None, None), Err(XfsError::WriteProtected)));
    assert!(matches!(root.set_owner(None, Some(0)), Err(XfsError::WriteProtected)));
    for action in [OpenAction::Create, OpenAction::CreateReplace] {
        assert!(matches!(root.open("a", action), Err(XfsError::WriteProtected)));
    }
    assert_eq!(XfsError::WriteProtected.to_errno(), libc::EROFS);
}

#[test]
fn directory_lookup_and_enumeration() {
    let (vol, _dev) = mount();
    let mut root = vol.open_root().expect("root");

    let long = "n".repeat(256);
    assert!(matches!(
        root.open(&long, OpenAction::Open),
        Err(XfsError::FilenameTooLong)
    ));
    assert!(matches!(
        root.open(&"n".repeat(255), OpenAction::OpenCreate),
        Err(XfsError::NotFound(_))
    ));
    assert!(matches!(
        root.open_symlink("link"),
        Err(XfsError::NotSupported(_))
    ));

    assert!(matches!(root.read_dir(), Err(XfsError::NotImplemented(_))));

    let mut empty = vol.open_dir_by_inode(InodeNumber(EMPTY_DIR)).expect("empty");
    assert!(matches!(empty.read_dir(), Err(XfsError::NoMoreFiles)));
    assert!(matches!(empty.read_dir(), Err(XfsError::NoMoreFiles)));
    empty.rewind();
    assert!(matches!(empty.read_dir(), Err(XfsError::NoMoreFiles)));
    root.rewind();
    assert!(matches!(root.read_dir(), Err(XfsError::NotImplemented(_))));
    empty.close();
    root.close();
}
