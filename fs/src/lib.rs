//! On-disk format, block device abstraction and filesystem engine shared by
//! the hosted tool and the in-kernel driver.
//!
//! No allocator, no threads, no interior mutability: callers provide a
//! `BlockDevice` and drive every operation through `ops::Filesystem`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bitmap;
pub mod device;
pub mod dir;
pub mod error;
pub mod file;
pub mod inode;
pub mod layout;
pub mod ops;
pub mod path;
pub mod superblock;

pub use device::{BlockDevice, RamDisk};
pub use error::{FsError, FsResult};
pub use ops::Filesystem;
pub use superblock::RawSuperBlock;
