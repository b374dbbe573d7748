//! Error types for array operations.

use thiserror::Error;

/// Errors that can occur when opening or mutating a persistent array.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// The record type has zero size.
    #[error("item must be at least 1 byte")]
    InvalidItemSize,

    /// Creating a new file without a capacity.
    #[error("capacity is mandatory when creating a new file")]
    CapacityRequired,

    /// Reopen parameters disagree with the stored header.
    #[error("stored length/capacity mismatch (stored {stored}, requested {requested})")]
    SizeMismatch {
        /// The value recorded in the file header.
        stored: u64,
        /// The value supplied by the caller.
        requested: u64,
    },

    /// The file is smaller than its own header.
    #[error("file too small")]
    FileTooSmall,

    /// The file size disagrees with the header's layout.
    #[error("invalid file size (expected {expected}, found {found})")]
    InvalidFileSize {
        /// Size the header says the file should have.
        expected: u64,
        /// Actual file size.
        found: u64,
    },

    /// Underlying filesystem or mapping error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
