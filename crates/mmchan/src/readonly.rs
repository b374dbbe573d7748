//! Read-only view of an ack-ring file, for inspection tooling.
//!
//! The counters are read live through the mapping, so a view opened next
//! to a running producer observes its progress without taking any lock.

use crate::error::ChannelError;
use crate::header::{AckHeader, Counters, RingHeader};
use mmfile::ReadonlyMapped;
use std::path::Path;

/// Read-only handle over an acknowledgement-cursor channel file.
pub struct ReadonlyChannel {
    map: ReadonlyMapped,
}

impl ReadonlyChannel {
    /// Open and validate `path` with a read-only mapping.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ChannelError> {
        let map = ReadonlyMapped::open(path)?;

        if map.len() < AckHeader::SIZE {
            return Err(ChannelError::FileTooSmall);
        }

        let head: &AckHeader = bytemuck::from_bytes(&map.bytes()[..AckHeader::SIZE]);
        head.validate(map.len() as u64)?;

        Ok(Self { map })
    }

    fn counters(&self) -> Counters {
        bytemuck::from_bytes::<AckHeader>(&self.map.bytes()[..AckHeader::SIZE]).load()
    }

    pub fn capacity(&self) -> u64 {
        self.counters().capacity
    }

    pub fn item_size(&self) -> u64 {
        self.counters().item_size
    }

    pub fn start_index(&self) -> u64 {
        self.counters().start_index
    }

    pub fn len(&self) -> u64 {
        self.counters().length
    }

    pub fn is_empty(&self) -> bool {
        self.counters().length == 0
    }

    pub fn unread(&self) -> u64 {
        self.counters().unread()
    }

    pub fn awaiting_ack(&self) -> u64 {
        self.counters().awaiting_ack
    }

    pub fn items_written(&self) -> u64 {
        self.counters().items_written
    }

    pub fn items_read(&self) -> u64 {
        self.counters().items_read
    }

    /// Borrow the raw bytes of an absolute slot index.
    pub fn peek(&self, index: u64) -> &[u8] {
        let c = self.counters();
        assert!(index < c.capacity, "slot index out of bounds");
        &self.map.bytes()[c.slot_range(index)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AckChannel, ChannelConfig};
    use tempfile::TempDir;

    #[test]
    fn observes_live_counters() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chan.ring");
        let ch = AckChannel::open(&path, ChannelConfig::new(4, 8)).unwrap();

        let view = ReadonlyChannel::open(&path).unwrap();
        assert_eq!(view.len(), 0);

        ch.write_or_fail(|slot| slot[0] = 7);
        ch.read_or_fail().unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view.unread(), 0);
        assert_eq!(view.awaiting_ack(), 1);
        assert_eq!(view.peek(0)[0], 7);
    }

    #[test]
    fn rejects_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            ReadonlyChannel::open(tmp.path().join("missing.ring")),
            Err(ChannelError::Io(_))
        ));
    }
}
