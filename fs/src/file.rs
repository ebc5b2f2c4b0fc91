//! Byte-addressable file I/O against a direct-block inode (component J),
//! with lazy block allocation on write. Shared by both file contents and
//! (indirectly, through the directory engine) directory slots.

use alloc::vec;

use crate::bitmap::BitmapCache;
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::inode::RawInode;
use crate::superblock::{N_DIRECT, RawSuperBlock};

fn div_ceil(x: u32, y: u32) -> u32 {
    (x + y - 1) / y
}

pub fn max_file_size(block_size: u32) -> u32 {
    N_DIRECT as u32 * block_size
}

fn ensure_capacity(
    dev: &mut dyn BlockDevice,
    sb: &RawSuperBlock,
    data_bitmap: &mut BitmapCache,
    inode: &mut RawInode,
    new_size: u32,
) -> FsResult<()> {
    let needed_blocks = div_ceil(new_size, sb.block_size);
    if needed_blocks as usize > N_DIRECT {
        return Err(FsError::NoSpace);
    }

    for i in 0..needed_blocks as usize {
        if inode.direct[i] == 0 {
            let idx = data_bitmap.alloc_first_fit(dev, 0, sb.data_region_blocks)?;
            let block = sb.data_region_start + idx;
            inode.direct[i] = block;
            let zeros = vec![0u8; sb.block_size as usize];
            dev.write(block, &zeros)?;
        }
    }
    Ok(())
}

/// Writes `bytes` at `offset`, allocating direct blocks as needed. Updates
/// `inode.size`; the caller is responsible for persisting the inode record.
pub fn write(
    dev: &mut dyn BlockDevice,
    sb: &RawSuperBlock,
    data_bitmap: &mut BitmapCache,
    inode: &mut RawInode,
    offset: u32,
    bytes: &[u8],
) -> FsResult<()> {
    let new_end = offset
        .checked_add(bytes.len() as u32)
        .ok_or(FsError::InvalidArgument)?;

    if new_end > inode.size {
        ensure_capacity(dev, sb, data_bitmap, inode, new_end)?;
    }

    let bs = sb.block_size;
    let mut done = 0usize;
    while done < bytes.len() {
        let pos = offset as usize + done;
        let block_idx = pos / bs as usize;
        let block_off = pos % bs as usize;
        let abs_block = inode.direct[block_idx];

        let mut buf = vec![0u8; bs as usize];
        dev.read(abs_block, &mut buf)?;

        let chunk = core::cmp::min(bs as usize - block_off, bytes.len() - done);
        buf[block_off..block_off + chunk].copy_from_slice(&bytes[done..done + chunk]);
        dev.write(abs_block, &buf)?;

        done += chunk;
    }

    if new_end > inode.size {
        inode.size = new_end;
    }
    Ok(())
}

/// Reads up to `out.len()` bytes starting at `offset`, clamped to EOF.
/// Returns the number of bytes actually read.
pub fn read(dev: &mut dyn BlockDevice, sb: &RawSuperBlock, inode: &RawInode, offset: u32, out: &mut [u8]) -> FsResult<usize> {
    if offset >= inode.size {
        return Ok(0);
    }

    let remaining = (inode.size - offset) as usize;
    let to_read = core::cmp::min(out.len(), remaining);

    let bs = sb.block_size;
    let mut done = 0usize;
    while done < to_read {
        let pos = offset as usize + done;
        let block_idx = pos / bs as usize;
        let block_off = pos % bs as usize;
        let abs_block = inode.direct[block_idx];
        if abs_block == 0 {
            return Err(FsError::IoFailure);
        }

        let mut buf = vec![0u8; bs as usize];
        dev.read(abs_block, &mut buf)?;

        let chunk = core::cmp::min(bs as usize - block_off, to_read - done);
        out[done..done + chunk].copy_from_slice(&buf[block_off..block_off + chunk]);
        done += chunk;
    }

    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RamDisk;
    use crate::superblock::RawSuperBlock;

    const BLOCK_SIZE: u32 = 512;

    fn fixture() -> (RamDisk, RawSuperBlock, BitmapCache, RawInode) {
        let dev = RamDisk::new(BLOCK_SIZE, 32);
        let sb = RawSuperBlock {
            block_size: BLOCK_SIZE,
            data_region_start: 0,
            data_region_blocks: 32,
            ..RawSuperBlock::zeroed()
        };
        let bitmap = BitmapCache::zeroed(0, 1, BLOCK_SIZE);
        (dev, sb, bitmap, RawInode::new_file())
    }

    #[test]
    fn write_then_read_round_trips_within_one_block() {
        let (mut dev, sb, mut bitmap, mut inode) = fixture();
        write(&mut dev, &sb, &mut bitmap, &mut inode, 0, b"hello").unwrap();
        assert_eq!(inode.size, 5);

        let mut out = [0u8; 5];
        let n = read(&mut dev, &sb, &inode, 0, &mut out).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn write_spanning_a_block_boundary_allocates_a_second_block() {
        let (mut dev, sb, mut bitmap, mut inode) = fixture();
        let payload = alloc::vec![0x42u8; BLOCK_SIZE as usize + 10];
        write(&mut dev, &sb, &mut bitmap, &mut inode, 0, &payload).unwrap();

        assert_eq!(inode.blocks_in_use(), 2);
        let mut out = alloc::vec![0u8; payload.len()];
        let n = read(&mut dev, &sb, &inode, 0, &mut out).unwrap();
        assert_eq!(n, payload.len());
        assert_eq!(out, payload);
    }

    #[test]
    fn read_past_eof_returns_zero() {
        let (mut dev, sb, mut bitmap, mut inode) = fixture();
        write(&mut dev, &sb, &mut bitmap, &mut inode, 0, b"abc").unwrap();

        let mut out = [0u8; 4];
        let n = read(&mut dev, &sb, &inode, 3, &mut out).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn read_clamps_to_the_bytes_actually_available() {
        let (mut dev, sb, mut bitmap, mut inode) = fixture();
        write(&mut dev, &sb, &mut bitmap, &mut inode, 0, b"abcdef").unwrap();

        let mut out = [0u8; 10];
        let n = read(&mut dev, &sb, &inode, 2, &mut out).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&out[..4], b"cdef");
    }

    #[test]
    fn writing_beyond_max_file_size_fails_with_no_space() {
        let (mut dev, sb, mut bitmap, mut inode) = fixture();
        let max = max_file_size(BLOCK_SIZE);
        let one_past = alloc::vec![0u8; 1];
        assert!(matches!(
            write(&mut dev, &sb, &mut bitmap, &mut inode, max, &one_past),
            Err(FsError::NoSpace)
        ));
    }

    #[test]
    fn overwriting_a_middle_region_leaves_the_rest_intact() {
        let (mut dev, sb, mut bitmap, mut inode) = fixture();
        write(&mut dev, &sb, &mut bitmap, &mut inode, 0, b"0123456789").unwrap();
        write(&mut dev, &sb, &mut bitmap, &mut inode, 3, b"XYZ").unwrap();

        let mut out = [0u8; 10];
        read(&mut dev, &sb, &inode, 0, &mut out).unwrap();
        assert_eq!(&out, b"012XYZ6789");
    }
}
