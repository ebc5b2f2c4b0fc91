use thiserror::Error;

/// Error kinds raised by the block device, layout calculator and filesystem
/// engine. Every public operation either succeeds with no partially-visible
/// on-disk state change, or fails with one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("path component not found")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("not a file")]
    NotAFile,
    #[error("already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("no space left")]
    NoSpace,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid filesystem image")]
    InvalidImage,
    #[error("device i/o failure")]
    IoFailure,
}

pub type FsResult<T> = Result<T, FsError>;
