//! Fixed-size inode records (component G). Each record is read or written
//! by ordinal within the inode-table region via a read-modify-write of its
//! containing block.

use alloc::vec;

use bytemuck::{Pod, Zeroable};

use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::superblock::{INODE_RECORD_SIZE, N_DIRECT, RawSuperBlock};

pub const INODE_FREE: u8 = 0;
pub const INODE_FILE: u8 = 1;
pub const INODE_DIR: u8 = 2;

/// `1 (type) + 3 (reserved=0) + 4 (size) + 4 * N_DIRECT (direct blocks)` =
/// 40 bytes, no implicit padding on any platform since every field after
/// the leading byte triple is 4-byte aligned and the struct itself is
/// `repr(C)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct RawInode {
    pub kind: u8,
    pub reserved: [u8; 3],
    pub size: u32,
    pub direct: [u32; N_DIRECT],
}

impl RawInode {
    pub fn free() -> Self {
        Self::zeroed()
    }

    pub fn new_dir() -> Self {
        Self {
            kind: INODE_DIR,
            ..Self::zeroed()
        }
    }

    pub fn new_file() -> Self {
        Self {
            kind: INODE_FILE,
            ..Self::zeroed()
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == INODE_DIR
    }

    pub fn is_file(&self) -> bool {
        self.kind == INODE_FILE
    }

    /// Number of direct block slots that currently hold a block number.
    pub fn blocks_in_use(&self) -> usize {
        self.direct.iter().filter(|&&b| b != 0).count()
    }
}

const _: () = assert!(core::mem::size_of::<RawInode>() == INODE_RECORD_SIZE);

fn inode_location(sb: &RawSuperBlock, id: u32) -> FsResult<(u32, usize)> {
    if id == 0 || id >= sb.inode_count {
        return Err(FsError::NotFound);
    }
    let offset = id as usize * INODE_RECORD_SIZE;
    let block = sb.inode_table_start + (offset / sb.block_size as usize) as u32;
    let within = offset % sb.block_size as usize;
    Ok((block, within))
}

pub fn read_inode(dev: &mut dyn BlockDevice, sb: &RawSuperBlock, id: u32) -> FsResult<RawInode> {
    let (block, within) = inode_location(sb, id)?;
    let mut buf = vec![0u8; sb.block_size as usize];
    dev.read(block, &mut buf)?;
    // `within` is a byte offset into a `vec![0u8; _]` buffer, which the
    // allocator only guarantees to align-1, not align-4: use the
    // unaligned reader rather than `from_bytes`, which requires the slice
    // to already be aligned for `RawInode` and panics otherwise.
    Ok(bytemuck::pod_read_unaligned(&buf[within..within + INODE_RECORD_SIZE]))
}

pub fn write_inode(dev: &mut dyn BlockDevice, sb: &RawSuperBlock, id: u32, record: &RawInode) -> FsResult<()> {
    let (block, within) = inode_location(sb, id)?;
    let mut buf = vec![0u8; sb.block_size as usize];
    dev.read(block, &mut buf)?;
    buf[within..within + INODE_RECORD_SIZE].copy_from_slice(bytemuck::bytes_of(record));
    dev.write(block, &buf)
}
