#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::env;
use std::io::Write;
use std::path::Path;
use xfsr::{AgInfo, InodeNumber, MountFlags, ObjInfo, Volume, VolumeCacheStats, VolumeGeometry};

/// Bytes copied per read by `cat`.
const CAT_CHUNK: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct InspectOutput {
    geometry: VolumeGeometry,
    uuid: String,
    inode_count: u64,
    free_inodes: u64,
    free_data_blocks: u64,
    ag0: AgInfo,
    caches: VolumeCacheStats,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "inspect" => {
            let Some(path) = args.next() else {
                bail!("inspect requires a path argument");
            };
            let json = args.any(|arg| arg == "--json");
            inspect(Path::new(&path), json)
        }
        "stat" => {
            let (Some(path), Some(ino)) = (args.next(), args.next()) else {
                bail!("stat requires <image-path> <inode>");
            };
            let json = args.any(|arg| arg == "--json");
            stat(Path::new(&path), parse_ino(&ino)?, json)
        }
        "cat" => {
            let (Some(path), Some(ino)) = (args.next(), args.next()) else {
                bail!("cat requires <image-path> <inode>");
            };
            cat(Path::new(&path), parse_ino(&ino)?)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("xfsr-cli\n");
    println!("USAGE:");
    println!("  xfsr-cli inspect <image-path> [--json]");
    println!("  xfsr-cli stat <image-path> <inode> [--json]");
    println!("  xfsr-cli cat <image-path> <inode>");
}

fn parse_ino(arg: &str) -> Result<InodeNumber> {
    let ino = arg
        .parse::<u64>()
        .with_context(|| format!("invalid inode number: {arg}"))?;
    Ok(InodeNumber(ino))
}

fn open_volume(path: &Path) -> Result<Volume> {
    Volume::open_path(path, MountFlags::READ_ONLY)
        .with_context(|| format!("failed to open XFS image: {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serialize output")?
    );
    Ok(())
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let vol = open_volume(path)?;
    let sb = vol.superblock();
    let output = InspectOutput {
        geometry: vol.geometry().clone(),
        uuid: sb.uuid.iter().map(|b| format!("{b:02x}")).collect(),
        inode_count: sb.inode_count,
        free_inodes: sb.free_inodes,
        free_data_blocks: sb.free_data_blocks,
        ag0: vol
            .allocation_group(xfsr::AgNumber(0))
            .context("read allocation group 0")?,
        caches: vol.cache_stats(),
    };

    if json {
        return print_json(&output);
    }
    let g = &output.geometry;
    println!("XFSR Inspector");
    println!("label: {}", g.label);
    println!("uuid: {}", output.uuid);
    println!("version: {}", g.version);
    println!("block_size: {}", g.block_size);
    println!("sector_size: {}", g.sector_size);
    println!("data_blocks: {}", g.data_blocks);
    println!("ag_count: {}", g.ag_count);
    println!("ag_blocks: {}", g.ag_blocks);
    println!("inode_size: {}", g.inode_size);
    println!("root_ino: {}", g.root_ino);
    println!("inodes: {} ({} free)", output.inode_count, output.free_inodes);
    println!("free_data_blocks: {}", output.free_data_blocks);
    println!(
        "ag0: length={} free_blocks={} inodes={}",
        output.ag0.length, output.ag0.free_blocks, output.ag0.inode_count
    );
    Ok(())
}

fn stat(path: &Path, ino: InodeNumber, json: bool) -> Result<()> {
    let vol = open_volume(path)?;
    let info: ObjInfo = vol
        .inode_info(ino)
        .with_context(|| format!("failed to read inode {ino}"))?;

    if json {
        return print_json(&info);
    }
    println!("inode: {}", info.ino);
    println!("type: {:?}", info.kind);
    println!("mode: {:04o}", info.perm);
    println!("size: {}", info.size);
    println!("allocated: {}", info.allocated);
    println!("links: {}", info.nlink);
    println!("uid: {} gid: {}", info.uid, info.gid);
    println!("atime: {}.{:09}", info.atime.sec, info.atime.nsec);
    println!("mtime: {}.{:09}", info.mtime.sec, info.mtime.nsec);
    println!("ctime: {}.{:09}", info.ctime.sec, info.ctime.nsec);
    println!("birth: {}.{:09}", info.birth_time.sec, info.birth_time.nsec);
    if info.rdev != 0 {
        println!("rdev: {:#x}", info.rdev);
    }
    Ok(())
}

fn cat(path: &Path, ino: InodeNumber) -> Result<()> {
    let vol = open_volume(path)?;
    let mut file = vol
        .open_file_by_inode(ino)
        .with_context(|| format!("failed to open inode {ino} as a regular file"))?;

    let mut buf = vec![0_u8; CAT_CHUNK];
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        let read = file
            .read(&mut buf)
            .with_context(|| format!("read failed at offset {}", file.tell()))?;
        out.write_all(&buf[..read.bytes]).context("write to stdout")?;
        if read.eof || read.bytes == 0 {
            break;
        }
    }
    out.flush().context("flush stdout")?;
    file.close();
    Ok(())
}
