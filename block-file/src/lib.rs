//! File-backed block device (component C): a flat on-disk image accessed
//! with positional reads and writes, one block at a time.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use aios_fs::{BlockDevice, FsError, FsResult};

/// An `aios_fs::BlockDevice` backed by a regular file. The file's length is
/// always exactly `block_size * block_count` bytes.
pub struct FileBackend {
    file: File,
    block_size: u32,
    block_count: u32,
}

impl FileBackend {
    /// Creates (or truncates) `path` and sizes it to hold exactly
    /// `block_count` blocks of `block_size` bytes.
    pub fn create(path: impl AsRef<Path>, block_size: u32, block_count: u32) -> FsResult<Self> {
        if block_size == 0 || block_count == 0 {
            return Err(FsError::InvalidArgument);
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| FsError::IoFailure)?;

        let len = block_size as u64 * block_count as u64;
        file.set_len(len).map_err(|_| FsError::IoFailure)?;

        Ok(Self {
            file,
            block_size,
            block_count,
        })
    }

    /// Opens an existing image file. `block_size` must match what the file
    /// was created with; `block_count` is derived from the file's length.
    pub fn open(path: impl AsRef<Path>, block_size: u32) -> FsResult<Self> {
        if block_size == 0 {
            return Err(FsError::InvalidArgument);
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| FsError::IoFailure)?;

        let len = file.metadata().map_err(|_| FsError::IoFailure)?.len();
        if len % block_size as u64 != 0 {
            return Err(FsError::InvalidImage);
        }
        let block_count = (len / block_size as u64) as u32;

        Ok(Self {
            file,
            block_size,
            block_count,
        })
    }
}

fn full_pread(file: &File, buf: &mut [u8], offset: u64) -> FsResult<()> {
    let mut done = 0usize;
    while done < buf.len() {
        let n = file
            .read_at(&mut buf[done..], offset + done as u64)
            .map_err(|_| FsError::IoFailure)?;
        if n == 0 {
            return Err(FsError::IoFailure);
        }
        done += n;
    }
    Ok(())
}

fn full_pwrite(file: &File, buf: &[u8], offset: u64) -> FsResult<()> {
    let mut done = 0usize;
    while done < buf.len() {
        let n = file
            .write_at(&buf[done..], offset + done as u64)
            .map_err(|_| FsError::IoFailure)?;
        if n == 0 {
            return Err(FsError::IoFailure);
        }
        done += n;
    }
    Ok(())
}

impl BlockDevice for FileBackend {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u32 {
        self.block_count
    }

    fn read(&mut self, block: u32, buf: &mut [u8]) -> FsResult<()> {
        self.check_bounds(block, buf.len())?;
        let offset = block as u64 * self.block_size as u64;
        full_pread(&self.file, buf, offset)
    }

    fn write(&mut self, block: u32, buf: &[u8]) -> FsResult<()> {
        self.check_bounds(block, buf.len())?;
        let offset = block as u64 * self.block_size as u64;
        full_pwrite(&self.file, buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("aios-block-file-test-{name}-{n}.img"))
    }

    #[test]
    fn create_sizes_exactly() {
        let path = scratch_path("create");
        let dev = FileBackend::create(&path, 512, 10).unwrap();
        assert_eq!(dev.block_count(), 10);
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, 512 * 10);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn write_then_read_round_trips() {
        let path = scratch_path("roundtrip");
        let mut dev = FileBackend::create(&path, 512, 4).unwrap();
        let payload = vec![0xABu8; 512];
        dev.write(2, &payload).unwrap();
        drop(dev);

        let mut reopened = FileBackend::open(&path, 512).unwrap();
        assert_eq!(reopened.block_count(), 4);
        let mut out = vec![0u8; 512];
        reopened.read(2, &mut out).unwrap();
        assert_eq!(out, payload);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn open_rejects_mismatched_block_size() {
        let path = scratch_path("mismatch");
        FileBackend::create(&path, 512, 3).unwrap();
        assert!(matches!(FileBackend::open(&path, 400), Err(FsError::InvalidImage)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn out_of_bounds_block_is_rejected() {
        let path = scratch_path("bounds");
        let mut dev = FileBackend::create(&path, 512, 2).unwrap();
        let buf = vec![0u8; 512];
        assert!(matches!(dev.write(5, &buf), Err(FsError::InvalidArgument)));
        std::fs::remove_file(&path).ok();
    }
}
