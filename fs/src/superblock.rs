//! The on-disk superblock (block 0) and the inode record layout constants it
//! is defined in terms of.

use bytemuck::{Pod, Zeroable};

use crate::error::{FsError, FsResult};

/// "AIOS" packed little-endian.
pub const SUPERBLOCK_MAGIC: u32 = 0x4149_4F53;

pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const N_DIRECT: usize = 8;
pub const NAME_MAX: usize = 32;
pub const MAX_PATH: usize = 512;

/// `1 (type) + 3 (reserved) + 4 (size) + 4 * N_DIRECT` = 40 bytes.
pub const INODE_RECORD_SIZE: usize = 4 + 4 + 4 * N_DIRECT;

/// `4 (inode) + 1 (type) + NAME_MAX (name)` = 37 bytes, no trailing padding.
pub const DIRENT_SIZE: usize = 4 + 1 + NAME_MAX;

/// Bit-exact superblock record. All fields are little-endian `u32`s in
/// declared order with natural alignment, so on a little-endian host the
/// raw byte representation of this struct already matches the on-disk
/// contract: no implicit padding appears between any of the fields.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct RawSuperBlock {
    pub magic: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_count: u32,
    pub inode_bitmap_start: u32,
    pub inode_bitmap_blocks: u32,
    pub inode_table_start: u32,
    pub inode_table_blocks: u32,
    pub data_bitmap_start: u32,
    pub data_bitmap_blocks: u32,
    pub data_region_start: u32,
    pub data_region_blocks: u32,
    pub root_inode: u32,
}

impl RawSuperBlock {
    pub fn to_block_bytes(&self, block_size: usize) -> FsResult<alloc::vec::Vec<u8>> {
        if block_size < core::mem::size_of::<Self>() {
            return Err(FsError::InvalidArgument);
        }
        let mut buf = alloc::vec![0u8; block_size];
        buf[..core::mem::size_of::<Self>()].copy_from_slice(bytemuck::bytes_of(self));
        Ok(buf)
    }

    pub fn from_block_bytes(buf: &[u8]) -> FsResult<Self> {
        if buf.len() < core::mem::size_of::<Self>() {
            return Err(FsError::InvalidImage);
        }
        // `buf` is a block read into a `vec![0u8; _]`, only guaranteed
        // align-1: `pod_read_unaligned` copies rather than requiring the
        // slice to already be aligned for `Self`.
        let sb: Self = bytemuck::pod_read_unaligned(&buf[..core::mem::size_of::<Self>()]);
        if sb.magic != SUPERBLOCK_MAGIC {
            return Err(FsError::InvalidImage);
        }
        if sb.block_size == 0 || sb.data_region_start >= sb.total_blocks || sb.root_inode != 1 {
            return Err(FsError::InvalidImage);
        }
        Ok(sb)
    }
}
