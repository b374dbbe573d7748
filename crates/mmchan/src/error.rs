//! Error types for channel operations.

use thiserror::Error;

/// Errors that can occur when opening or operating a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Creating a new file with capacity 0.
    #[error("capacity is mandatory when creating a new file")]
    CapacityRequired,

    /// Item size 0, or the stored item size cannot be interpreted.
    #[error("item size must be at least 1 byte")]
    InvalidItemSize,

    /// Stored capacity or item size differ from the requested shape and
    /// resizing was not allowed.
    #[error(
        "capacity and/or item size mismatch (stored {stored_capacity}x{stored_item_size}, \
         requested {requested_capacity}x{requested_item_size})"
    )]
    SizeMismatch {
        stored_capacity: u64,
        stored_item_size: u64,
        requested_capacity: u64,
        requested_item_size: u64,
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

    /// A stored index or counter is out of bounds.
    #[error("invalid stored index: {0}")]
    InvalidIndex(&'static str),

    /// Read attempted on an empty channel.
    #[error("channel is empty")]
    Empty,

    /// Operation attempted on a closed channel.
    #[error("channel is closed")]
    Closed,

    /// Underlying filesystem or mapping error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
