//! Error types for hash-file operations.

use thiserror::Error;

/// Errors that can occur when opening or mutating a hash file.
#[derive(Debug, Error)]
pub enum HashError {
    /// The value type has zero size.
    #[error("value must be at least 1 byte")]
    InvalidValueSize,

    /// Creating a new file without a capacity.
    #[error("capacity is mandatory when creating a new file")]
    CapacityRequired,

    /// Stored key/value/link sizes disagree with the compile-time layout.
    #[error("stored {what} size mismatch (stored {stored}, expected {expected})")]
    SizeMismatch {
        /// Which layout dimension disagreed.
        what: &'static str,
        /// The value recorded in the file header.
        stored: u64,
        /// The value derived from the type parameters.
        expected: u64,
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

    /// The file cannot be addressed by the chosen key type.
    #[error("file of {size} bytes exceeds the {key_bits}-bit offset space")]
    FileTooLarge {
        /// Required file size in bytes.
        size: u64,
        /// Width of the key/offset type.
        key_bits: u32,
    },

    /// All link slots are in use; the file never reclaims space.
    #[error("link capacity exhausted")]
    CapacityExhausted,

    /// Underlying filesystem or mapping error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
