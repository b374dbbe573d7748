//! On-disk ring headers and the in-memory counter view.
//!
//! The header is the first bytes of the file and is reinterpreted in place
//! through the mapping, so every counter mutation by the running process is
//! automatically persisted. Integers are `u64` in host byte order; files
//! are not portable across endiannesses.
//!
//! Both header layouts load into a single [`Counters`] value that carries
//! the triple-index math, so the ring engine is written once. The plain
//! layout simply has no `awaiting_ack` field on disk.

use crate::error::ChannelError;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;
use std::ops::Range;

/// Snapshot of a ring's counters, independent of the on-disk layout.
///
/// Operations load a snapshot, mutate it, and store it back; the store
/// path re-checks the accounting invariants in debug builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Counters {
    pub head_size: u64,
    pub item_size: u64,
    /// Slot index of the oldest live (unacknowledged) record.
    pub start_index: u64,
    /// Records read but not yet acknowledged. Always 0 for plain rings.
    pub awaiting_ack: u64,
    /// Records currently occupying slots.
    pub length: u64,
    pub capacity: u64,
    pub items_written: u64,
    pub items_read: u64,
}

impl Counters {
    /// Records produced but not yet read.
    #[inline]
    pub fn unread(&self) -> u64 {
        self.length - self.awaiting_ack
    }

    #[inline]
    pub fn space_left(&self) -> u64 {
        self.capacity - self.length
    }

    /// Next slot a reader will consume.
    #[inline]
    pub fn read_index(&self) -> u64 {
        self.wrap(self.start_index + self.awaiting_ack)
    }

    /// Next slot a writer will fill.
    #[inline]
    pub fn end_index(&self) -> u64 {
        self.wrap(self.start_index + self.length)
    }

    #[inline]
    pub fn wrap(&self, index: u64) -> u64 {
        index % self.capacity
    }

    #[inline]
    pub fn file_size(&self) -> u64 {
        self.head_size + self.item_size * self.capacity
    }

    /// Byte range of slot `index` within the mapping.
    #[inline]
    pub fn slot_range(&self, index: u64) -> Range<usize> {
        let off = (self.head_size + index * self.item_size) as usize;
        off..off + self.item_size as usize
    }
}

/// An on-disk header layout that a ring engine can drive.
pub(crate) trait RingHeader: Pod {
    const SIZE: usize;

    fn new(capacity: u64, item_size: u64) -> Self;

    fn load(&self) -> Counters;

    /// Write a counter snapshot back. Plain headers require
    /// `awaiting_ack == 0` (their operations never set it).
    fn store(&mut self, c: Counters);

    fn validate(&self, file_size: u64) -> Result<(), ChannelError>;
}

/// Header of the acknowledgement-cursor ring variant (64 bytes).
///
/// Field order: `head_size item_size start_index awaiting_ack length
/// capacity items_written items_read`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct AckHeader {
    head_size: u64,
    item_size: u64,
    start_index: u64,
    awaiting_ack: u64,
    length: u64,
    capacity: u64,
    items_written: u64,
    items_read: u64,
}

impl RingHeader for AckHeader {
    const SIZE: usize = size_of::<Self>();

    fn new(capacity: u64, item_size: u64) -> Self {
        Self {
            head_size: Self::SIZE as u64,
            item_size,
            start_index: 0,
            awaiting_ack: 0,
            length: 0,
            capacity,
            items_written: 0,
            items_read: 0,
        }
    }

    fn load(&self) -> Counters {
        Counters {
            head_size: self.head_size,
            item_size: self.item_size,
            start_index: self.start_index,
            awaiting_ack: self.awaiting_ack,
            length: self.length,
            capacity: self.capacity,
            items_written: self.items_written,
            items_read: self.items_read,
        }
    }

    fn store(&mut self, c: Counters) {
        self.start_index = c.start_index;
        self.awaiting_ack = c.awaiting_ack;
        self.length = c.length;
        self.items_written = c.items_written;
        self.items_read = c.items_read;
    }

    fn validate(&self, file_size: u64) -> Result<(), ChannelError> {
        if self.item_size < 1 {
            return Err(ChannelError::InvalidItemSize);
        }

        if self.head_size != Self::SIZE as u64 {
            return Err(ChannelError::InvalidFileSize {
                expected: Self::SIZE as u64,
                found: self.head_size,
            });
        }

        if self.start_index >= self.capacity {
            return Err(ChannelError::InvalidIndex("start index >= capacity"));
        }

        if self.awaiting_ack > self.length {
            return Err(ChannelError::InvalidIndex("awaiting-ack > length"));
        }

        if self.length > self.capacity {
            return Err(ChannelError::InvalidIndex("length > capacity"));
        }

        let expected = self.load().file_size();
        if file_size != expected {
            return Err(ChannelError::InvalidFileSize {
                expected,
                found: file_size,
            });
        }

        Ok(())
    }
}

/// Header of the plain ring variant (56 bytes): same fields minus
/// `awaiting_ack`; reads consume in place.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct PlainHeader {
    head_size: u64,
    item_size: u64,
    start_index: u64,
    length: u64,
    capacity: u64,
    items_written: u64,
    items_read: u64,
}

impl RingHeader for PlainHeader {
    const SIZE: usize = size_of::<Self>();

    fn new(capacity: u64, item_size: u64) -> Self {
        Self {
            head_size: Self::SIZE as u64,
            item_size,
            start_index: 0,
            length: 0,
            capacity,
            items_written: 0,
            items_read: 0,
        }
    }

    fn load(&self) -> Counters {
        Counters {
            head_size: self.head_size,
            item_size: self.item_size,
            start_index: self.start_index,
            awaiting_ack: 0,
            length: self.length,
            capacity: self.capacity,
            items_written: self.items_written,
            items_read: self.items_read,
        }
    }

    fn store(&mut self, c: Counters) {
        debug_assert!(c.awaiting_ack == 0, "plain ring cannot hold awaiting-ack records");
        self.start_index = c.start_index;
        self.length = c.length;
        self.items_written = c.items_written;
        self.items_read = c.items_read;
    }

    fn validate(&self, file_size: u64) -> Result<(), ChannelError> {
        if self.item_size < 1 {
            return Err(ChannelError::InvalidItemSize);
        }

        if self.head_size != Self::SIZE as u64 {
            return Err(ChannelError::InvalidFileSize {
                expected: Self::SIZE as u64,
                found: self.head_size,
            });
        }

        if self.start_index >= self.capacity {
            return Err(ChannelError::InvalidIndex("start index >= capacity"));
        }

        if self.length > self.capacity {
            return Err(ChannelError::InvalidIndex("length > capacity"));
        }

        let expected = self.load().file_size();
        if file_size != expected {
            return Err(ChannelError::InvalidFileSize {
                expected,
                found: file_size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sizes_are_fixed() {
        assert_eq!(AckHeader::SIZE, 64);
        assert_eq!(PlainHeader::SIZE, 56);
    }

    #[test]
    fn derived_indices() {
        let c = Counters {
            head_size: 64,
            item_size: 8,
            start_index: 2,
            awaiting_ack: 1,
            length: 3,
            capacity: 4,
            items_written: 3,
            items_read: 1,
        };

        assert_eq!(c.unread(), 2);
        assert_eq!(c.space_left(), 1);
        assert_eq!(c.read_index(), 3);
        assert_eq!(c.end_index(), 1);
        assert_eq!(c.file_size(), 64 + 8 * 4);
        assert_eq!(c.slot_range(3), 88..96);
    }

    #[test]
    fn validate_rejects_bad_indices() {
        let mut head = AckHeader::new(4, 8);
        head.start_index = 4;
        assert!(matches!(
            head.validate(96),
            Err(ChannelError::InvalidIndex(_))
        ));

        let mut head = AckHeader::new(4, 8);
        head.length = 2;
        head.awaiting_ack = 3;
        assert!(matches!(
            head.validate(96),
            Err(ChannelError::InvalidIndex(_))
        ));

        let head = AckHeader::new(4, 8);
        assert!(matches!(
            head.validate(95),
            Err(ChannelError::InvalidFileSize { expected: 96, found: 95 })
        ));
        assert!(head.validate(96).is_ok());
    }
}
