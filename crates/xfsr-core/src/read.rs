//! Reading file content into caller buffers.

use crate::VolumeInner;
use crate::extent::resolve;
use crate::inode::XfsInode;
use serde::{Deserialize, Serialize};
use tracing::trace;
use xfsr_error::{Result, XfsError};
use xfsr_ondisk::DataFork;
use xfsr_types::{ByteOffset, u64_to_usize};

/// Result of one read call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadOutcome {
    /// Bytes written to the front of the caller's buffer.
    pub bytes: usize,
    /// The request ran into the end of the object and was shortened.
    pub eof: bool,
}

fn to_usize(value: u64) -> Result<usize> {
    u64_to_usize(value, "read length").map_err(|e| XfsError::InvalidArgument(e.to_string()))
}

/// Copy object bytes starting at `offset` into `buf`.
///
/// The request is clipped to the object size first. A clipped request fails
/// with `EndOfFile` unless `allow_partial` is set, and in that case nothing
/// is read from storage.
pub(crate) fn read_inode_data(
    vol: &VolumeInner,
    inode: &XfsInode,
    offset: u64,
    buf: &mut [u8],
    allow_partial: bool,
) -> Result<ReadOutcome> {
    let size = inode.core.size;
    let wanted = u64::try_from(buf.len()).unwrap_or(u64::MAX);
    let available = size.saturating_sub(offset);
    let len = wanted.min(available);
    let eof = len < wanted;
    if eof && !allow_partial {
        return Err(XfsError::EndOfFile);
    }
    if len == 0 {
        return Ok(ReadOutcome { bytes: 0, eof });
    }
    let len = to_usize(len)?;
    let out = &mut buf[..len];

    match &inode.core.data_fork {
        DataFork::Local { bytes } => {
            if size > u64::try_from(bytes.len()).unwrap_or(u64::MAX) {
                return Err(XfsError::BogusFormat(format!(
                    "inode {}: inline size {size} exceeds fork of {} bytes",
                    inode.ino,
                    bytes.len()
                )));
            }
            let start = to_usize(offset)?;
            out.copy_from_slice(&bytes[start..start + len]);
        }
        _ => read_mapped(vol, inode, offset, out)?,
    }

    trace!(target: "xfsr::read", ino = inode.ino.0, offset, bytes = len, eof, "read");
    Ok(ReadOutcome { bytes: len, eof })
}

/// Fill `out` from block-mapped content, one mapped run at a time.
fn read_mapped(vol: &VolumeInner, inode: &XfsInode, offset: u64, out: &mut [u8]) -> Result<()> {
    let block_size = vol.geometry.block_size;
    let bs = u64::from(block_size.get());
    let mut done = 0_usize;
    let mut pos = offset;

    while done < out.len() {
        let in_block = block_size.offset_in_block(pos);
        let remaining = out.len() - done;
        let remaining_u64 = u64::try_from(remaining).unwrap_or(u64::MAX);
        let want_blocks = (remaining_u64 + in_block as u64).div_ceil(bs);

        let mapping = resolve(vol, inode, block_size.file_block_of(pos), want_blocks)?;
        let run_bytes = mapping
            .blocks
            .saturating_mul(bs)
            .saturating_sub(in_block as u64);
        let chunk = to_usize(run_bytes.min(remaining_u64))?;
        let dst = &mut out[done..done + chunk];

        if mapping.sparse {
            dst.fill(0);
        } else {
            let base = vol.geometry.fsblock_to_byte(mapping.physical)?;
            let src = base
                .checked_add(in_block as u64)
                .ok_or_else(|| XfsError::BogusFormat("data offset overflow".into()))?;
            vol.dev.read_exact_at(src, dst)?;
        }

        done += chunk;
        pos += chunk as u64;
    }
    Ok(())
}
