//! Layout calculator (component E): turns `(total_blocks, inode_count,
//! block_size)` into the six region offsets that make up a superblock.

use crate::error::{FsError, FsResult};
use crate::superblock::{INODE_RECORD_SIZE, RawSuperBlock, SUPERBLOCK_MAGIC};

fn div_ceil(x: u32, y: u32) -> u32 {
    (x + y - 1) / y
}

/// Computes a fully-populated superblock for a fresh image. Fails if the
/// requested geometry leaves no room for a data region.
pub fn compute_layout(total_blocks: u32, inode_count: u32, block_size: u32) -> FsResult<RawSuperBlock> {
    if block_size == 0 || total_blocks == 0 || inode_count == 0 {
        return Err(FsError::InvalidArgument);
    }

    let bits_per_block = block_size * 8;

    let inode_bitmap_start = 1u32;
    let inode_bitmap_blocks = div_ceil(inode_count, bits_per_block).max(1);

    let inode_table_start = inode_bitmap_start + inode_bitmap_blocks;
    let inode_bytes = inode_count
        .checked_mul(INODE_RECORD_SIZE as u32)
        .ok_or(FsError::InvalidArgument)?;
    let inode_table_blocks = div_ceil(inode_bytes, block_size);

    let data_bitmap_start = inode_table_start + inode_table_blocks;
    // Over-provisioned deliberately: indexed by relative data-region block
    // number, which is always <= total_blocks, so sizing off total_blocks
    // keeps the math simple at the cost of a few wasted bitmap bits.
    let data_bitmap_blocks = div_ceil(total_blocks, bits_per_block).max(1);

    let data_region_start = data_bitmap_start + data_bitmap_blocks;
    if data_region_start >= total_blocks {
        return Err(FsError::InvalidArgument);
    }
    let data_region_blocks = total_blocks - data_region_start;

    Ok(RawSuperBlock {
        magic: SUPERBLOCK_MAGIC,
        block_size,
        total_blocks,
        inode_count,
        inode_bitmap_start,
        inode_bitmap_blocks,
        inode_table_start,
        inode_table_blocks,
        data_bitmap_start,
        data_bitmap_blocks,
        data_region_start,
        data_region_blocks,
        root_inode: 1,
    })
}
