//! Directory engine (component H). Directory contents live entirely in
//! `direct[0]`; `size` counts entry slots ever appended (tombstones
//! included), never shrinking on removal.

use alloc::vec;
use alloc::vec::Vec;

use bytemuck::{Pod, Zeroable};

use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::inode::RawInode;
use crate::superblock::{DIRENT_SIZE, NAME_MAX, RawSuperBlock};

/// `4 (inode) + 1 (type) + NAME_MAX (name)` = 37 bytes, no trailing
/// padding. `inode` is stored as raw little-endian bytes rather than a
/// `u32`: every field of a `repr(C)` struct must have an alignment that
/// divides the struct's size evenly, and 37 isn't a multiple of 4, so a
/// `u32` field here would force the compiler to round the struct up to 40
/// bytes. Byte-array fields are alignment-1, so the struct's natural size
/// already is 37 with no padding to strip.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct RawDirEntry {
    inode_le: [u8; 4],
    pub kind: u8,
    pub name: [u8; NAME_MAX],
}

const _: () = assert!(core::mem::size_of::<RawDirEntry>() == DIRENT_SIZE);

impl RawDirEntry {
    pub fn new(inode: u32, kind: u8, name: &str) -> FsResult<Self> {
        let bytes = name.as_bytes();
        // NUL-terminated, so the name itself may be at most NAME_MAX - 1.
        if bytes.is_empty() || bytes.len() >= NAME_MAX || bytes.contains(&0) {
            return Err(FsError::InvalidArgument);
        }
        let mut buf = [0u8; NAME_MAX];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            inode_le: inode.to_le_bytes(),
            kind,
            name: buf,
        })
    }

    pub fn inode(&self) -> u32 {
        u32::from_le_bytes(self.inode_le)
    }

    pub fn is_tombstone(&self) -> bool {
        self.inode() == 0
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    fn name_matches(&self, other: &str) -> bool {
        self.name_str().as_bytes() == other.as_bytes()
    }
}

fn slot_count(dir_inode: &RawInode) -> usize {
    dir_inode.size as usize / DIRENT_SIZE
}

fn read_dir_block(dev: &mut dyn BlockDevice, sb: &RawSuperBlock, dir_inode: &RawInode) -> FsResult<Vec<u8>> {
    let mut buf = vec![0u8; sb.block_size as usize];
    let block = dir_inode.direct[0];
    if block != 0 {
        dev.read(block, &mut buf)?;
    }
    Ok(buf)
}

fn read_slot(buf: &[u8], slot: usize) -> RawDirEntry {
    let start = slot * DIRENT_SIZE;
    *bytemuck::from_bytes(&buf[start..start + DIRENT_SIZE])
}

fn write_slot(buf: &mut [u8], slot: usize, entry: &RawDirEntry) {
    let start = slot * DIRENT_SIZE;
    buf[start..start + DIRENT_SIZE].copy_from_slice(bytemuck::bytes_of(entry));
}

pub fn max_slots(block_size: u32) -> usize {
    block_size as usize / DIRENT_SIZE
}

/// Appends `entry` to `dir_inode`, reusing the first tombstone slot if one
/// exists. `dir_inode.size` is updated; the caller persists the inode
/// record.
pub fn add_entry(
    dev: &mut dyn BlockDevice,
    sb: &RawSuperBlock,
    dir_inode: &mut RawInode,
    entry: RawDirEntry,
) -> FsResult<()> {
    let mut buf = read_dir_block(dev, sb, dir_inode)?;
    let count = slot_count(dir_inode);

    for slot in 0..count {
        if read_slot(&buf, slot).is_tombstone() {
            write_slot(&mut buf, slot, &entry);
            dev.write(dir_inode.direct[0], &buf)?;
            return Ok(());
        }
    }

    if count >= max_slots(sb.block_size) {
        return Err(FsError::NoSpace);
    }

    write_slot(&mut buf, count, &entry);
    dev.write(dir_inode.direct[0], &buf)?;
    dir_inode.size += DIRENT_SIZE as u32;
    Ok(())
}

/// Linear scan by byte-wise name compare, skipping tombstones. Returns the
/// entry and its slot index.
pub fn find_entry(
    dev: &mut dyn BlockDevice,
    sb: &RawSuperBlock,
    dir_inode: &RawInode,
    name: &str,
) -> FsResult<(RawDirEntry, usize)> {
    let buf = read_dir_block(dev, sb, dir_inode)?;
    let count = slot_count(dir_inode);
    for slot in 0..count {
        let entry = read_slot(&buf, slot);
        if !entry.is_tombstone() && entry.name_matches(name) {
            return Ok((entry, slot));
        }
    }
    Err(FsError::NotFound)
}

/// Zeroes the slot in place. Does not shrink `dir_inode.size`.
pub fn remove_entry(
    dev: &mut dyn BlockDevice,
    sb: &RawSuperBlock,
    dir_inode: &RawInode,
    slot: usize,
) -> FsResult<()> {
    let mut buf = read_dir_block(dev, sb, dir_inode)?;
    write_slot(&mut buf, slot, &RawDirEntry::zeroed());
    dev.write(dir_inode.direct[0], &buf)
}

/// True iff every non-tombstone entry names `"."` or `".."`.
pub fn is_empty(dev: &mut dyn BlockDevice, sb: &RawSuperBlock, dir_inode: &RawInode) -> FsResult<bool> {
    let buf = read_dir_block(dev, sb, dir_inode)?;
    let count = slot_count(dir_inode);
    for slot in 0..count {
        let entry = read_slot(&buf, slot);
        if !entry.is_tombstone() && entry.name_str() != "." && entry.name_str() != ".." {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Non-tombstone entries in storage order.
pub fn list_entries(
    dev: &mut dyn BlockDevice,
    sb: &RawSuperBlock,
    dir_inode: &RawInode,
) -> FsResult<Vec<RawDirEntry>> {
    let buf = read_dir_block(dev, sb, dir_inode)?;
    let count = slot_count(dir_inode);
    let mut out = Vec::new();
    for slot in 0..count {
        let entry = read_slot(&buf, slot);
        if !entry.is_tombstone() {
            out.push(entry);
        }
    }
    Ok(out)
}
