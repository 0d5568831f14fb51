#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use xfsr_ondisk::{
    AgfHeader, AgiHeader, XfsExtent, XfsInodeCore, XfsSuperblock, parse_bmbt_block,
    parse_bmdr_root, parse_extent_list,
};
use xfsr_types::{
    ParseError, S_IFREG, XFS_AGF_MAGIC, XFS_AGI_MAGIC, XFS_BMAP_CRC_MAGIC, XFS_BMAP_MAGIC,
    XFS_DINODE_FMT_BTREE, XFS_DINODE_FMT_EXTENTS, XFS_DINODE_MAGIC, XFS_SB_MAGIC,
};

#[derive(Debug, Default)]
struct ErrorCoverage {
    insufficient_data: u32,
    invalid_magic: u32,
    invalid_field: u32,
    integer_conversion: u32,
}

impl ErrorCoverage {
    fn observe(&mut self, err: &ParseError) {
        match err {
            ParseError::InsufficientData { .. } => self.insufficient_data += 1,
            ParseError::InvalidMagic { .. } => self.invalid_magic += 1,
            ParseError::InvalidField { .. } => self.invalid_field += 1,
            ParseError::IntegerConversion { .. } => self.integer_conversion += 1,
        }
    }
}

/// xorshift64*: deterministic bytes without a fixture directory.
struct Noise(u64);

impl Noise {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn fill(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(8) {
            let word = self.next().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}

/// Random payloads with a valid magic stamped on, at assorted lengths.
fn generate_samples() -> Vec<(String, Vec<u8>)> {
    let magics: [(&str, &[u8]); 7] = [
        ("raw", &[]),
        ("sb", &XFS_SB_MAGIC.to_be_bytes()),
        ("agf", &XFS_AGF_MAGIC.to_be_bytes()),
        ("agi", &XFS_AGI_MAGIC.to_be_bytes()),
        ("inode", &XFS_DINODE_MAGIC.to_be_bytes()),
        ("bmap", &XFS_BMAP_MAGIC.to_be_bytes()),
        ("bma3", &XFS_BMAP_CRC_MAGIC.to_be_bytes()),
    ];
    let lengths = [0_usize, 1, 3, 15, 63, 64, 99, 100, 175, 176, 256, 511, 512, 1024, 4096];
    let mut noise = Noise(0x9E37_79B9_7F4A_7C15);
    let mut out = Vec::new();
    for (name, magic) in magics {
        for len in lengths {
            let mut data = vec![0_u8; len];
            noise.fill(&mut data);
            let stamp = magic.len().min(len);
            data[..stamp].copy_from_slice(&magic[..stamp]);
            out.push((format!("{name}-{len}"), data));
        }
    }
    out
}

fn run_parser<T, F>(
    sample_name: &str,
    parser_name: &'static str,
    parser_hits: &mut BTreeMap<&'static str, u32>,
    coverage: &mut ErrorCoverage,
    parser: F,
) -> bool
where
    F: FnOnce() -> Result<T, ParseError>,
{
    *parser_hits.entry(parser_name).or_default() += 1;
    match catch_unwind(AssertUnwindSafe(parser)) {
        Ok(Ok(_)) => false,
        Ok(Err(err)) => {
            coverage.observe(&err);
            true
        }
        Err(_) => panic!("parser `{parser_name}` panicked on sample `{sample_name}`"),
    }
}

#[test]
fn parsers_return_errors_instead_of_panicking() {
    let samples = generate_samples();
    assert!(samples.len() >= 100, "expected a sizeable corpus");

    let mut hits = BTreeMap::new();
    let mut coverage = ErrorCoverage::default();
    let mut rejected = 0_u32;

    for (name, data) in &samples {
        let mut r = 0;
        r += u32::from(run_parser(name, "superblock", &mut hits, &mut coverage, || {
            XfsSuperblock::parse_superblock_region(data).and_then(|sb| sb.validate_geometry())
        }));
        r += u32::from(run_parser(name, "agf", &mut hits, &mut coverage, || {
            AgfHeader::parse_from_bytes(data)
        }));
        r += u32::from(run_parser(name, "agi", &mut hits, &mut coverage, || {
            AgiHeader::parse_from_bytes(data)
        }));
        r += u32::from(run_parser(name, "inode", &mut hits, &mut coverage, || {
            XfsInodeCore::parse_from_bytes(data)
        }));
        r += u32::from(run_parser(name, "extent_list", &mut hits, &mut coverage, || {
            parse_extent_list(data, u32::MAX)
        }));
        r += u32::from(run_parser(name, "bmdr_root", &mut hits, &mut coverage, || {
            parse_bmdr_root(data)
        }));
        r += u32::from(run_parser(name, "bmbt_leaf", &mut hits, &mut coverage, || {
            parse_bmbt_block(data, 0)
        }));
        r += u32::from(run_parser(name, "bmbt_index", &mut hits, &mut coverage, || {
            parse_bmbt_block(data, 1)
        }));
        rejected += r;
    }

    assert_eq!(hits.len(), 8);
    assert!(hits.values().all(|n| usize::try_from(*n).expect("count") == samples.len()));
    assert!(rejected > 0);
    assert!(coverage.insufficient_data > 0, "{coverage:?}");
    assert!(coverage.invalid_magic > 0, "{coverage:?}");
    assert!(coverage.invalid_field > 0, "{coverage:?}");
}

// ── Targeted corruptions ────────────────────────────────────────────────────

fn inode_with(format: u8, nextents: u32, forkoff: u8) -> Vec<u8> {
    let mut b = vec![0_u8; 512];
    b[0x00..0x02].copy_from_slice(&XFS_DINODE_MAGIC.to_be_bytes());
    b[0x02..0x04].copy_from_slice(&(S_IFREG | 0o644).to_be_bytes());
    b[0x04] = 3;
    b[0x05] = format;
    b[0x4C..0x50].copy_from_slice(&nextents.to_be_bytes());
    b[0x52] = forkoff;
    b
}

#[test]
fn inflated_extent_count_fails_at_decode_of_the_list() {
    let b = inode_with(XFS_DINODE_FMT_EXTENTS, 1_000_000, 0);
    let inode = XfsInodeCore::parse_from_bytes(&b).expect("inode itself is fine");
    let xfsr_ondisk::DataFork::Extents { count, bytes } = &inode.data_fork else {
        panic!("expected extents fork");
    };
    assert!(matches!(
        parse_extent_list(bytes, *count),
        Err(ParseError::InsufficientData { .. })
    ));
}

#[test]
fn btree_root_with_numrecs_past_fork_is_rejected() {
    let mut b = inode_with(XFS_DINODE_FMT_BTREE, 0, 0);
    b[176..178].copy_from_slice(&1_u16.to_be_bytes());
    b[178..180].copy_from_slice(&u16::MAX.to_be_bytes());
    let inode = XfsInodeCore::parse_from_bytes(&b).expect("inode");
    let xfsr_ondisk::DataFork::Btree { bytes } = &inode.data_fork else {
        panic!("expected btree fork");
    };
    assert!(parse_bmdr_root(bytes).is_err());
}

#[test]
fn truncated_records_are_reported_not_read() {
    let e = XfsExtent {
        file_offset: 0,
        start_block: 1,
        block_count: 1,
        unwritten: false,
    };
    let raw = e.encode();
    for cut in 0..raw.len() {
        assert!(XfsExtent::decode(&raw[..cut], 0).is_err(), "cut at {cut}");
    }
}
