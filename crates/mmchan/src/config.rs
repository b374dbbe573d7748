//! Open parameters for persistent channels.

/// Shape and open policy for a channel file.
///
/// `capacity` is the maximum number of live records, `item_size` the fixed
/// record stride in bytes. Both are written into the file header on create
/// and validated against it on reopen; a mismatch is fatal unless
/// [`allow_resize`](Self::allow_resize) opts into copy-migration.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub(crate) capacity: u64,
    pub(crate) item_size: u64,
    pub(crate) allow_resize: bool,
}

impl ChannelConfig {
    pub fn new(capacity: u64, item_size: u64) -> Self {
        Self {
            capacity,
            item_size,
            allow_resize: false,
        }
    }

    /// Permit copy-migration when the stored shape differs: records are
    /// replayed into a fresh sibling file which then replaces the original.
    /// Requires exclusive access to the file.
    pub fn allow_resize(mut self) -> Self {
        self.allow_resize = true;
        self
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn item_size(&self) -> u64 {
        self.item_size
    }
}
