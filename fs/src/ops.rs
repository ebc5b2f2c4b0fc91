//! High-level filesystem operations (component K): `format`, `mount`,
//! `unmount`, `lookup`, `make_dir`, `create_file`, `write_file`,
//! `read_file`, `list_dir`, `delete`.

use alloc::vec;
use alloc::vec::Vec;

use crate::bitmap::BitmapCache;
use crate::device::BlockDevice;
use crate::dir::{self, RawDirEntry};
use crate::error::{FsError, FsResult};
use crate::file;
use crate::inode::{self, INODE_DIR, INODE_FILE, RawInode};
use crate::layout::compute_layout;
use crate::path;
use crate::superblock::RawSuperBlock;

/// A mounted filesystem. Owns the block device exclusively and caches both
/// bitmaps in memory until `unmount` flushes and releases them.
pub struct Filesystem<D: BlockDevice> {
    device: D,
    sb: RawSuperBlock,
    inode_bitmap: BitmapCache,
    data_bitmap: BitmapCache,
}

impl<D: BlockDevice> Filesystem<D> {
    pub fn root_inode(&self) -> u32 {
        self.sb.root_inode
    }

    pub fn superblock(&self) -> &RawSuperBlock {
        &self.sb
    }

    /// Lays out a fresh image on `device`: superblock, zeroed bitmaps, a
    /// reserved root inode bit, a zeroed inode table, and a root directory
    /// containing `.` and `..`.
    pub fn format(mut device: D, inode_count: u32) -> FsResult<Self> {
        let total_blocks = device.block_count();
        let block_size = device.block_size();
        let sb = compute_layout(total_blocks, inode_count, block_size)?;

        let mut inode_bitmap = BitmapCache::zeroed(sb.inode_bitmap_start, sb.inode_bitmap_blocks, block_size);
        let mut data_bitmap = BitmapCache::zeroed(sb.data_bitmap_start, sb.data_bitmap_blocks, block_size);

        inode_bitmap.reserve(&mut device, sb.root_inode)?;
        data_bitmap.flush(&mut device)?;

        let zero_block = vec![0u8; block_size as usize];
        for b in 0..sb.inode_table_blocks {
            device.write(sb.inode_table_start + b, &zero_block)?;
        }

        let root_block_idx = data_bitmap.alloc_first_fit(&mut device, 0, sb.data_region_blocks)?;
        let root_block = sb.data_region_start + root_block_idx;

        let mut root = RawInode::new_dir();
        root.direct[0] = root_block;
        inode::write_inode(&mut device, &sb, sb.root_inode, &root)?;

        let dot = RawDirEntry::new(sb.root_inode, INODE_DIR, ".")?;
        let dotdot = RawDirEntry::new(sb.root_inode, INODE_DIR, "..")?;
        dir::add_entry(&mut device, &sb, &mut root, dot)?;
        dir::add_entry(&mut device, &sb, &mut root, dotdot)?;
        inode::write_inode(&mut device, &sb, sb.root_inode, &root)?;

        let sb_bytes = sb.to_block_bytes(block_size as usize)?;
        device.write(0, &sb_bytes)?;

        Ok(Self {
            device,
            sb,
            inode_bitmap,
            data_bitmap,
        })
    }

    /// Reads block 0, validates magic and block size, and loads both
    /// bitmap caches.
    pub fn mount(mut device: D) -> FsResult<Self> {
        let mut block0 = vec![0u8; device.block_size() as usize];
        device.read(0, &mut block0)?;
        let sb = RawSuperBlock::from_block_bytes(&block0)?;
        if sb.block_size != device.block_size() {
            return Err(FsError::InvalidImage);
        }

        let inode_bitmap = BitmapCache::load(&mut device, sb.inode_bitmap_start, sb.inode_bitmap_blocks, sb.block_size)?;
        let data_bitmap = BitmapCache::load(&mut device, sb.data_bitmap_start, sb.data_bitmap_blocks, sb.block_size)?;

        Ok(Self {
            device,
            sb,
            inode_bitmap,
            data_bitmap,
        })
    }

    /// Flushes both bitmaps and hands the device back to the caller.
    pub fn unmount(mut self) -> FsResult<D> {
        self.inode_bitmap.flush(&mut self.device)?;
        self.data_bitmap.flush(&mut self.device)?;
        Ok(self.device)
    }

    pub fn lookup(&mut self, cwd: u32, path: &str) -> FsResult<(u32, RawInode)> {
        path::resolve(&mut self.device, &self.sb, cwd, path)
    }

    fn resolve_parent_and_leaf<'p>(&mut self, cwd: u32, path: &'p str) -> FsResult<(u32, RawInode, &'p str)> {
        let (parent_path, leaf) = path::split_parent(path)?;
        let (parent_id, parent_inode) = path::resolve(&mut self.device, &self.sb, cwd, parent_path)?;
        if !parent_inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok((parent_id, parent_inode, leaf))
    }

    fn create_entry(&mut self, cwd: u32, path: &str, mut new_inode: RawInode, kind: u8) -> FsResult<u32> {
        let (parent_id, mut parent_inode, leaf) = self.resolve_parent_and_leaf(cwd, path)?;

        if dir::find_entry(&mut self.device, &self.sb, &parent_inode, leaf).is_ok() {
            return Err(FsError::AlreadyExists);
        }

        let new_id = self
            .inode_bitmap
            .alloc_first_fit(&mut self.device, 1, self.sb.inode_count)?;

        if kind == INODE_DIR {
            let block_idx = self
                .data_bitmap
                .alloc_first_fit(&mut self.device, 0, self.sb.data_region_blocks)?;
            new_inode.direct[0] = self.sb.data_region_start + block_idx;

            let dot = RawDirEntry::new(new_id, INODE_DIR, ".")?;
            let dotdot = RawDirEntry::new(parent_id, INODE_DIR, "..")?;
            dir::add_entry(&mut self.device, &self.sb, &mut new_inode, dot)?;
            dir::add_entry(&mut self.device, &self.sb, &mut new_inode, dotdot)?;
        }

        inode::write_inode(&mut self.device, &self.sb, new_id, &new_inode)?;

        let entry = RawDirEntry::new(new_id, kind, leaf)?;
        dir::add_entry(&mut self.device, &self.sb, &mut parent_inode, entry)?;
        inode::write_inode(&mut self.device, &self.sb, parent_id, &parent_inode)?;

        Ok(new_id)
    }

    pub fn make_dir(&mut self, cwd: u32, path: &str) -> FsResult<u32> {
        self.create_entry(cwd, path, RawInode::new_dir(), INODE_DIR)
    }

    pub fn create_file(&mut self, cwd: u32, path: &str) -> FsResult<u32> {
        self.create_entry(cwd, path, RawInode::new_file(), INODE_FILE)
    }

    pub fn write_file(&mut self, cwd: u32, path: &str, bytes: &[u8], offset: u32) -> FsResult<()> {
        let (id, mut node) = path::resolve(&mut self.device, &self.sb, cwd, path)?;
        if !node.is_file() {
            return Err(FsError::NotAFile);
        }
        file::write(&mut self.device, &self.sb, &mut self.data_bitmap, &mut node, offset, bytes)?;
        inode::write_inode(&mut self.device, &self.sb, id, &node)
    }

    pub fn read_file(&mut self, cwd: u32, path: &str, offset: u32, out: &mut [u8]) -> FsResult<usize> {
        let (_, node) = path::resolve(&mut self.device, &self.sb, cwd, path)?;
        if !node.is_file() {
            return Err(FsError::NotAFile);
        }
        file::read(&mut self.device, &self.sb, &node, offset, out)
    }

    pub fn list_dir(&mut self, cwd: u32, path: &str) -> FsResult<Vec<RawDirEntry>> {
        let (_, node) = path::resolve(&mut self.device, &self.sb, cwd, path)?;
        if !node.is_dir() {
            return Err(FsError::NotADirectory);
        }
        dir::list_entries(&mut self.device, &self.sb, &node)
    }

    pub fn delete(&mut self, cwd: u32, path: &str) -> FsResult<()> {
        let (parent_id, mut parent_inode, leaf) = self.resolve_parent_and_leaf(cwd, path)?;
        let (entry, slot) = dir::find_entry(&mut self.device, &self.sb, &parent_inode, leaf)?;

        if entry.inode() == self.sb.root_inode {
            return Err(FsError::InvalidArgument);
        }

        let victim = inode::read_inode(&mut self.device, &self.sb, entry.inode())?;
        if victim.is_dir() && !dir::is_empty(&mut self.device, &self.sb, &victim)? {
            return Err(FsError::DirectoryNotEmpty);
        }

        for &block in victim.direct.iter() {
            if block != 0 {
                let idx = block - self.sb.data_region_start;
                self.data_bitmap.free(&mut self.device, idx)?;
            }
        }
        self.inode_bitmap.free(&mut self.device, entry.inode())?;

        dir::remove_entry(&mut self.device, &self.sb, &parent_inode, slot)?;
        inode::write_inode(&mut self.device, &self.sb, parent_id, &parent_inode)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use super::*;
    use crate::device::RamDisk;
    use crate::dir::max_slots;
    use crate::file::max_file_size;
    use crate::path;

    const BLOCK_SIZE: u32 = 512;
    const TOTAL_BLOCKS: u32 = 128;
    const INODE_COUNT: u32 = 32;

    fn fresh() -> Filesystem<RamDisk> {
        let dev = RamDisk::new(BLOCK_SIZE, TOTAL_BLOCKS);
        Filesystem::format(dev, INODE_COUNT).unwrap()
    }

    #[test]
    fn format_seeds_a_root_with_dot_and_dotdot() {
        let mut fs = fresh();
        let root = fs.root_inode();
        let entries = fs.list_dir(root, "/").unwrap();
        let names: alloc::vec::Vec<&str> = entries.iter().map(|e| e.name_str()).collect();
        assert!(names.contains(&"."));
        assert!(names.contains(&".."));
    }

    #[test]
    fn make_dir_and_create_file_are_listable_with_the_right_kind() {
        let mut fs = fresh();
        let root = fs.root_inode();
        fs.make_dir(root, "/docs").unwrap();
        fs.create_file(root, "/readme").unwrap();

        let entries = fs.list_dir(root, "/").unwrap();
        let docs = entries.iter().find(|e| e.name_str() == "docs").unwrap();
        let readme = entries.iter().find(|e| e.name_str() == "readme").unwrap();
        assert_eq!(docs.kind, INODE_DIR);
        assert_eq!(readme.kind, INODE_FILE);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut fs = fresh();
        let root = fs.root_inode();
        fs.create_file(root, "/note").unwrap();
        fs.write_file(root, "/note", b"hello, aios", 0).unwrap();

        let mut buf = [0u8; 32];
        let n = fs.read_file(root, "/note", 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello, aios");
    }

    #[test]
    fn write_at_an_offset_extends_the_file_and_leaves_the_gap_zeroed() {
        let mut fs = fresh();
        let root = fs.root_inode();
        fs.create_file(root, "/sparse").unwrap();
        fs.write_file(root, "/sparse", b"end", 10).unwrap();

        let mut buf = [0xFFu8; 13];
        let n = fs.read_file(root, "/sparse", 0, &mut buf).unwrap();
        assert_eq!(n, 13);
        assert_eq!(&buf[..10], &[0u8; 10]);
        assert_eq!(&buf[10..], b"end");
    }

    #[test]
    fn zero_byte_write_is_a_no_op() {
        let mut fs = fresh();
        let root = fs.root_inode();
        fs.create_file(root, "/empty").unwrap();
        fs.write_file(root, "/empty", b"", 0).unwrap();
        let (_, node) = fs.lookup(root, "/empty").unwrap();
        assert_eq!(node.size, 0);
    }

    #[test]
    fn write_exactly_fills_all_direct_blocks_one_byte_further_runs_out_of_space() {
        let mut fs = fresh();
        let root = fs.root_inode();
        fs.create_file(root, "/big").unwrap();

        let max = max_file_size(BLOCK_SIZE);
        let full = alloc::vec![0xABu8; max as usize];
        fs.write_file(root, "/big", &full, 0).unwrap();

        let (_, node) = fs.lookup(root, "/big").unwrap();
        assert_eq!(node.size, max);

        let one_more = [0x01u8];
        assert!(matches!(
            fs.write_file(root, "/big", &one_more, max),
            Err(FsError::NoSpace)
        ));
    }

    #[test]
    fn directory_fills_to_capacity_then_rejects_one_more_entry() {
        let mut fs = fresh();
        let root = fs.root_inode();
        let capacity = max_slots(BLOCK_SIZE);
        // root already holds "." and "..".
        let remaining = capacity - 2;

        for i in 0..remaining {
            let name = alloc::format!("/f{i}");
            fs.create_file(root, &name).unwrap();
        }

        assert!(matches!(
            fs.create_file(root, "/overflow"),
            Err(FsError::NoSpace)
        ));
    }

    #[test]
    fn delete_requires_an_empty_directory() {
        let mut fs = fresh();
        let root = fs.root_inode();
        fs.make_dir(root, "/docs").unwrap();
        fs.create_file(root, "/docs/a").unwrap();

        assert!(matches!(
            fs.delete(root, "/docs"),
            Err(FsError::DirectoryNotEmpty)
        ));

        fs.delete(root, "/docs/a").unwrap();
        fs.delete(root, "/docs").unwrap();
        assert!(fs.lookup(root, "/docs").is_err());
    }

    #[test]
    fn root_cannot_be_deleted() {
        let mut fs = fresh();
        let root = fs.root_inode();
        assert!(matches!(
            fs.delete(root, "/"),
            Err(FsError::InvalidArgument)
        ));
    }

    #[test]
    fn deleted_name_can_be_recreated() {
        let mut fs = fresh();
        let root = fs.root_inode();
        fs.create_file(root, "/note").unwrap();
        fs.write_file(root, "/note", b"v1", 0).unwrap();
        fs.delete(root, "/note").unwrap();

        fs.create_file(root, "/note").unwrap();
        let mut buf = [0u8; 8];
        let n = fs.read_file(root, "/note", 0, &mut buf).unwrap();
        assert_eq!(n, 0, "a freshly recreated file must not see the old contents");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut fs = fresh();
        let root = fs.root_inode();
        fs.create_file(root, "/note").unwrap();
        assert!(matches!(
            fs.create_file(root, "/note"),
            Err(FsError::AlreadyExists)
        ));
        assert!(matches!(
            fs.make_dir(root, "/note"),
            Err(FsError::AlreadyExists)
        ));
    }

    #[test]
    fn lookup_of_a_missing_path_fails() {
        let mut fs = fresh();
        let root = fs.root_inode();
        assert!(matches!(
            fs.lookup(root, "/nope"),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn normalized_paths_with_dotdot_and_repeated_slashes_resolve_correctly() {
        let mut fs = fresh();
        let root = fs.root_inode();
        fs.make_dir(root, "/a").unwrap();
        fs.make_dir(root, "/a/b").unwrap();
        fs.create_file(root, "/a/b/leaf").unwrap();

        let resolved: String = path::normalize("/a/b", "..//../a///b/./leaf");
        assert_eq!(resolved, "/a/b/leaf");
        assert!(fs.lookup(root, &resolved).is_ok());
    }

    #[test]
    fn dotdot_at_root_stays_at_root() {
        let mut fs = fresh();
        let root = fs.root_inode();
        let (id, node) = fs.lookup(root, "..").unwrap();
        assert_eq!(id, root);
        assert!(node.is_dir());
    }

    #[test]
    fn unmount_then_mount_preserves_every_entry_and_byte() {
        let dev = RamDisk::new(BLOCK_SIZE, TOTAL_BLOCKS);
        let mut fs = Filesystem::format(dev, INODE_COUNT).unwrap();
        let root = fs.root_inode();
        fs.make_dir(root, "/docs").unwrap();
        fs.create_file(root, "/docs/note").unwrap();
        fs.write_file(root, "/docs/note", b"persisted", 0).unwrap();

        let dev = fs.unmount().unwrap();
        let mut remounted = Filesystem::mount(dev).unwrap();
        let root = remounted.root_inode();

        let mut buf = [0u8; 16];
        let n = remounted.read_file(root, "/docs/note", 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"persisted");
    }

    #[test]
    fn format_is_deterministic_given_the_same_geometry() {
        let dev_a = RamDisk::new(BLOCK_SIZE, TOTAL_BLOCKS);
        let dev_b = RamDisk::new(BLOCK_SIZE, TOTAL_BLOCKS);
        let fs_a = Filesystem::format(dev_a, INODE_COUNT).unwrap();
        let fs_b = Filesystem::format(dev_b, INODE_COUNT).unwrap();
        assert_eq!(fs_a.superblock(), fs_b.superblock());
    }
}
