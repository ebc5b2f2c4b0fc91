//! Bitmap allocator (component F). A `BitmapCache` owns the in-memory copy
//! of one on-disk bitmap (inode or data) and flushes it block-at-a-time on
//! every set/clear.

use alloc::vec;
use alloc::vec::Vec;

use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};

pub struct BitmapCache {
    buffer: Vec<u8>,
    start_block: u32,
    block_count: u32,
    block_size: u32,
}

impl BitmapCache {
    /// Allocates a zeroed cache of `block_count` blocks, without touching
    /// the device. Used by `format`.
    pub fn zeroed(start_block: u32, block_count: u32, block_size: u32) -> Self {
        Self {
            buffer: vec![0u8; block_count as usize * block_size as usize],
            start_block,
            block_count,
            block_size,
        }
    }

    /// Reads `block_count` blocks starting at `start_block` into a fresh
    /// cache. Used by `mount`.
    pub fn load(
        dev: &mut dyn BlockDevice,
        start_block: u32,
        block_count: u32,
        block_size: u32,
    ) -> FsResult<Self> {
        let mut buffer = vec![0u8; block_count as usize * block_size as usize];
        for i in 0..block_count {
            let bs = block_size as usize;
            dev.read(start_block + i, &mut buffer[i as usize * bs..(i as usize + 1) * bs])?;
        }
        Ok(Self {
            buffer,
            start_block,
            block_count,
            block_size,
        })
    }

    /// Rewrites the entire cached bitmap to disk, one block at a time.
    pub fn flush(&self, dev: &mut dyn BlockDevice) -> FsResult<()> {
        let bs = self.block_size as usize;
        for i in 0..self.block_count {
            dev.write(self.start_block + i, &self.buffer[i as usize * bs..(i as usize + 1) * bs])?;
        }
        Ok(())
    }

    fn test(&self, idx: u32) -> bool {
        let byte = self.buffer[(idx / 8) as usize];
        (byte >> (idx % 8)) & 1 != 0
    }

    fn set(&mut self, idx: u32) {
        self.buffer[(idx / 8) as usize] |= 1 << (idx % 8);
    }

    fn clear(&mut self, idx: u32) {
        self.buffer[(idx / 8) as usize] &= !(1 << (idx % 8));
    }

    pub fn is_set(&self, idx: u32) -> bool {
        self.test(idx)
    }

    /// Marks `idx` used without scanning (used to reserve the root inode at
    /// format time) and flushes.
    pub fn reserve(&mut self, dev: &mut dyn BlockDevice, idx: u32) -> FsResult<()> {
        self.set(idx);
        self.flush(dev)
    }

    /// First-fit scan over `[start, limit)`, sets the winning bit and
    /// flushes before returning it.
    pub fn alloc_first_fit(&mut self, dev: &mut dyn BlockDevice, start: u32, limit: u32) -> FsResult<u32> {
        for idx in start..limit {
            if !self.test(idx) {
                self.set(idx);
                self.flush(dev)?;
                return Ok(idx);
            }
        }
        Err(FsError::NoSpace)
    }

    /// Clears `idx` and flushes. Clearing an already-free bit is tolerated
    /// but still flushes, matching the spec's "tolerated but MUST still
    /// flush" wording.
    pub fn free(&mut self, dev: &mut dyn BlockDevice, idx: u32) -> FsResult<()> {
        self.clear(idx);
        self.flush(dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RamDisk;

    fn disk() -> RamDisk {
        RamDisk::new(512, 4)
    }

    #[test]
    fn fresh_cache_is_all_free() {
        let cache = BitmapCache::zeroed(0, 4, 512);
        for idx in 0..64 {
            assert!(!cache.is_set(idx));
        }
    }

    #[test]
    fn alloc_first_fit_picks_lowest_free_bit() {
        let mut dev = disk();
        let mut cache = BitmapCache::zeroed(0, 4, 512);
        let first = cache.alloc_first_fit(&mut dev, 0, 16).unwrap();
        let second = cache.alloc_first_fit(&mut dev, 0, 16).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert!(cache.is_set(0));
        assert!(cache.is_set(1));
    }

    #[test]
    fn alloc_first_fit_fails_when_range_is_exhausted() {
        let mut dev = disk();
        let mut cache = BitmapCache::zeroed(0, 4, 512);
        for _ in 0..4 {
            cache.alloc_first_fit(&mut dev, 0, 4).unwrap();
        }
        assert!(matches!(
            cache.alloc_first_fit(&mut dev, 0, 4),
            Err(FsError::NoSpace)
        ));
    }

    #[test]
    fn free_clears_the_bit_and_allows_reuse() {
        let mut dev = disk();
        let mut cache = BitmapCache::zeroed(0, 4, 512);
        let idx = cache.alloc_first_fit(&mut dev, 0, 8).unwrap();
        cache.free(&mut dev, idx).unwrap();
        assert!(!cache.is_set(idx));
        let reused = cache.alloc_first_fit(&mut dev, 0, 8).unwrap();
        assert_eq!(reused, idx);
    }

    #[test]
    fn freeing_an_already_free_bit_is_tolerated() {
        let mut dev = disk();
        let mut cache = BitmapCache::zeroed(0, 4, 512);
        assert!(cache.free(&mut dev, 5).is_ok());
        assert!(!cache.is_set(5));
    }

    #[test]
    fn load_round_trips_through_flush() {
        let mut dev = disk();
        let mut cache = BitmapCache::zeroed(0, 4, 512);
        cache.alloc_first_fit(&mut dev, 0, 8).unwrap();
        cache.alloc_first_fit(&mut dev, 0, 8).unwrap();

        let loaded = BitmapCache::load(&mut dev, 0, 4, 512).unwrap();
        assert!(loaded.is_set(0));
        assert!(loaded.is_set(1));
        assert!(!loaded.is_set(2));
    }
}
