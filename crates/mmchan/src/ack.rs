//! The acknowledgement-cursor channel variant.
//!
//! Records move through three states: produced (unread), read but
//! unacknowledged (the awaiting-ack window), and acknowledged (gone from
//! the ring). A plain read only advances the read cursor, pinning the
//! record until it is acknowledged; this is what makes redelivery after a
//! crash or a [`rewind`](AckChannel::rewind) possible.

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::header::AckHeader;
use crate::raw::{self, RawRing};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::path::Path;

/// Persistent bounded SPSC channel with at-least-once delivery.
///
/// One mutex, two condition variables: writers wait on `write_cond` for
/// space, readers wait on `read_cond` for data. Fill and drain callbacks
/// run with the lock held and must not block or re-enter the channel.
pub struct AckChannel {
    ring: Mutex<RawRing<AckHeader>>,
    read_cond: Condvar,
    write_cond: Condvar,
}

impl std::fmt::Debug for AckChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckChannel").finish_non_exhaustive()
    }
}

impl AckChannel {
    /// Open `path`, creating the file if missing. Statistics counters are
    /// reset on every open except the reopen after a migration.
    pub fn open<P: AsRef<Path>>(path: P, config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::open_inner(path.as_ref(), config, true)
    }

    fn open_inner(
        path: &Path,
        config: ChannelConfig,
        reset_stats: bool,
    ) -> Result<Self, ChannelError> {
        let mut ring = RawRing::<AckHeader>::open(path, &config)?;
        let c = ring.counters();

        if c.capacity != config.capacity || c.item_size != config.item_size {
            if !config.allow_resize {
                return Err(ChannelError::SizeMismatch {
                    stored_capacity: c.capacity,
                    stored_item_size: c.item_size,
                    requested_capacity: config.capacity,
                    requested_item_size: config.item_size,
                });
            }

            raw::migrate(ring, path, &config)?;
            return Self::open_inner(path, config, false);
        }

        if reset_stats {
            ring.reset_stats();
        }

        tracing::debug!(
            path = %path.display(),
            capacity = c.capacity,
            item_size = c.item_size,
            length = c.length,
            awaiting_ack = c.awaiting_ack,
            "opened ack channel"
        );

        Ok(Self {
            ring: Mutex::new(ring),
            read_cond: Condvar::new(),
            write_cond: Condvar::new(),
        })
    }

    // ---------------------------------------------------------------------
    // WRITERS
    // ---------------------------------------------------------------------

    /// Fill the next slot, waiting for space while the ring is full.
    /// Returns `false` once the channel is closed for writing.
    pub fn write_or_block(&self, fill: impl FnOnce(&mut [u8])) -> bool {
        let mut ring = self.ring.lock();

        if ring.closed_writing {
            return false;
        }

        while ring.counters().space_left() == 0 {
            if ring.closed_writing {
                return false;
            }
            self.write_cond.wait(&mut ring);
        }

        ring.write_record(fill);
        self.read_cond.notify_one();
        true
    }

    /// Fill the next slot, or return `false` when full or closed for
    /// writing.
    pub fn write_or_fail(&self, fill: impl FnOnce(&mut [u8])) -> bool {
        let mut ring = self.ring.lock();

        if ring.closed_writing || ring.counters().space_left() == 0 {
            return false;
        }

        ring.write_record(fill);
        self.read_cond.notify_one();
        true
    }

    /// Fill the next slot, replacing the oldest record when full. A
    /// replaced record that was awaiting acknowledgement gives its ack
    /// back. Returns `false` when closed for writing.
    pub fn write_or_replace(&self, fill: impl FnOnce(&mut [u8])) -> bool {
        let mut ring = self.ring.lock();

        if ring.closed_writing {
            return false;
        }

        ring.write_record(fill);
        self.read_cond.notify_one();
        true
    }

    // ---------------------------------------------------------------------
    // READERS
    // ---------------------------------------------------------------------

    /// Copy out the next unread record, waiting for data. The record stays
    /// in the ring until acknowledged. Returns `None` once the channel is
    /// closed for writing and drained, or fully closed.
    pub fn read_or_block(&self) -> Option<Vec<u8>> {
        let mut ring = self.ring.lock();

        loop {
            if ring.closed {
                return None;
            }
            if ring.counters().unread() > 0 {
                break;
            }
            if ring.closed_writing {
                return None;
            }
            self.read_cond.wait(&mut ring);
        }

        Some(self.read_locked(&mut ring))
    }

    /// Copy out the next unread record, or `None` when there is nothing
    /// to read right now.
    pub fn read_or_fail(&self) -> Option<Vec<u8>> {
        let mut ring = self.ring.lock();

        if ring.closed || ring.counters().unread() == 0 {
            return None;
        }

        Some(self.read_locked(&mut ring))
    }

    /// Read and acknowledge in one step: the record never enters the
    /// awaiting-ack window. Blocks while empty.
    pub fn read_and_ack_or_block(&self) -> Option<Vec<u8>> {
        let mut ring = self.ring.lock();

        loop {
            if ring.closed {
                return None;
            }
            if ring.counters().unread() > 0 {
                break;
            }
            if ring.closed_writing {
                return None;
            }
            self.read_cond.wait(&mut ring);
        }

        Some(self.read_and_ack_locked(&mut ring))
    }

    /// Read and acknowledge in one step, or `None` when empty.
    pub fn read_and_ack_or_fail(&self) -> Option<Vec<u8>> {
        let mut ring = self.ring.lock();

        if ring.closed || ring.counters().unread() == 0 {
            return None;
        }

        Some(self.read_and_ack_locked(&mut ring))
    }

    /// Hand the next unread record to `cb` under the lock. When `cb` fails
    /// and `undo_on_error` is set, the read is undone and rereaders are
    /// woken; otherwise the record counts as consumed.
    ///
    /// The undo restores the exact pre-read counters, which is sound
    /// because the lock is held across read, callback, and undo.
    pub fn read_to_callback<E>(
        &self,
        cb: impl FnOnce(&[u8]) -> Result<(), E>,
        undo_on_error: bool,
    ) -> Result<Result<(), E>, ChannelError> {
        let mut ring = self.ring.lock();

        if ring.closed {
            return Err(ChannelError::Closed);
        }

        let before = ring.counters();
        if before.unread() == 0 {
            return Err(ChannelError::Empty);
        }

        let mut c = before;
        let index = c.read_index();
        c.awaiting_ack += 1;
        c.items_read += 1;
        ring.update(c);

        let result = cb(ring.slot(&before, index));

        if undo_on_error && result.is_err() {
            ring.update(before);
            self.read_cond.notify_all();
        } else {
            self.write_cond.notify_all();
        }

        Ok(result)
    }

    fn read_locked(&self, ring: &mut MutexGuard<'_, RawRing<AckHeader>>) -> Vec<u8> {
        let mut c = ring.counters();
        let index = c.read_index();
        let data = ring.slot(&c, index).to_vec();

        c.awaiting_ack += 1;
        c.items_read += 1;
        let drained = c.unread() == 0;
        ring.update(c);

        // No slot was freed, but wait_until_read watches for this.
        if drained {
            self.write_cond.notify_all();
        }

        data
    }

    fn read_and_ack_locked(&self, ring: &mut MutexGuard<'_, RawRing<AckHeader>>) -> Vec<u8> {
        let mut c = ring.counters();
        let index = c.read_index();
        let data = ring.slot(&c, index).to_vec();

        c.start_index = c.wrap(c.start_index + 1);
        c.length -= 1;
        c.items_read += 1;
        ring.update(c);

        self.write_cond.notify_all();
        data
    }

    // ---------------------------------------------------------------------
    // ACKNOWLEDGEMENT
    // ---------------------------------------------------------------------

    /// Acknowledge the oldest read-but-unacknowledged record. Returns
    /// `false` when the awaiting-ack window is empty.
    pub fn ack(&self) -> bool {
        let mut ring = self.ring.lock();
        let mut c = ring.counters();

        if c.awaiting_ack == 0 {
            return false;
        }

        c.awaiting_ack -= 1;
        c.length -= 1;
        if c.length > 0 {
            c.start_index = c.wrap(c.start_index + 1);
        }
        ring.update(c);

        self.write_cond.notify_all();
        true
    }

    /// Acknowledge every read-but-unacknowledged record at once. Returns
    /// the number acknowledged.
    pub fn ack_all(&self) -> u64 {
        let mut ring = self.ring.lock();
        let mut c = ring.counters();

        let count = c.awaiting_ack;
        if count == 0 {
            return 0;
        }

        c.start_index = c.wrap(c.start_index + count);
        c.length -= count;
        c.awaiting_ack = 0;
        ring.update(c);

        self.write_cond.notify_all();
        count
    }

    /// Scan the awaiting-ack window for the first record matching `pred`.
    ///
    /// On a match at offset `k`, the scanned prefix and the matched record
    /// are both dropped from the ring and `(true, k)` is returned: the
    /// prefix was lost by the downstream and must be redelivered by the
    /// caller from its own copy. Without a match nothing changes.
    pub fn ack_match(&self, mut pred: impl FnMut(&[u8]) -> bool) -> (bool, u64) {
        let mut ring = self.ring.lock();
        let mut c = ring.counters();

        for k in 0..c.awaiting_ack {
            let index = c.wrap(c.start_index + k);
            if !pred(ring.slot(&c, index)) {
                continue;
            }

            let removed = k + 1;
            c.start_index = c.wrap(c.start_index + k);
            c.length -= removed;
            c.awaiting_ack -= removed;
            if c.length > 0 {
                c.start_index = c.wrap(c.start_index + 1);
            }
            ring.update(c);

            self.write_cond.notify_all();
            return (true, k);
        }

        (false, 0)
    }

    /// Make every read-but-unacknowledged record re-readable. Returns the
    /// number of records re-exposed.
    pub fn rewind(&self) -> u64 {
        let mut ring = self.ring.lock();
        let mut c = ring.counters();

        let count = c.awaiting_ack;
        c.awaiting_ack = 0;
        ring.update(c);

        self.read_cond.notify_all();
        count
    }

    /// Wipe the ring. The underlying bytes are left in place.
    pub fn reset(&self) {
        let mut ring = self.ring.lock();
        let mut c = ring.counters();

        c.start_index = 0;
        c.awaiting_ack = 0;
        c.length = 0;
        ring.update(c);

        self.write_cond.notify_all();
    }

    // ---------------------------------------------------------------------
    // ORCHESTRATION
    // ---------------------------------------------------------------------

    /// Block until there is data to read (`true`) or no data will ever
    /// arrive (`false`).
    pub fn wait(&self) -> bool {
        let mut ring = self.ring.lock();

        loop {
            if ring.closed {
                return false;
            }
            if ring.counters().unread() > 0 {
                return true;
            }
            if ring.closed_writing {
                return false;
            }
            self.read_cond.wait(&mut ring);
        }
    }

    /// Block until every produced record has been read at least once.
    pub fn wait_until_read(&self) -> bool {
        let mut ring = self.ring.lock();

        while ring.counters().unread() > 0 {
            if ring.closed {
                return false;
            }
            self.write_cond.wait(&mut ring);
        }

        true
    }

    /// Block until every record has been acknowledged.
    pub fn wait_until_empty(&self) -> bool {
        let mut ring = self.ring.lock();

        while ring.counters().length > 0 {
            if ring.closed {
                return false;
            }
            self.write_cond.wait(&mut ring);
        }

        true
    }

    // ---------------------------------------------------------------------
    // LIFECYCLE
    // ---------------------------------------------------------------------

    /// Signal end-of-stream to readers. Idempotent; readers keep draining
    /// whatever is already in the ring.
    pub fn close_writing(&self) {
        let mut ring = self.ring.lock();

        if !ring.closed_writing {
            ring.closed_writing = true;
            self.read_cond.notify_all();
        }
    }

    /// Close the channel: unblock every waiter, flush, and release the
    /// file. Further operations return `false`/`None`/[`ChannelError::Closed`].
    pub fn close(&self) -> Result<(), ChannelError> {
        let mut ring = self.ring.lock();

        ring.closed_writing = true;
        ring.closed = true;
        self.read_cond.notify_all();
        self.write_cond.notify_all();

        ring.close_file()
    }

    /// Write dirty pages back to the file.
    pub fn flush(&self) -> Result<(), ChannelError> {
        let ring = self.ring.lock();
        if ring.closed {
            return Err(ChannelError::Closed);
        }
        ring.flush()
    }

    // ---------------------------------------------------------------------
    // ACCESSORS
    // ---------------------------------------------------------------------

    /// Records currently occupying slots (read-but-unacknowledged included).
    pub fn len(&self) -> u64 {
        self.ring.lock().counters().length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u64 {
        self.ring.lock().counters().capacity
    }

    pub fn item_size(&self) -> u64 {
        self.ring.lock().counters().item_size
    }

    /// Records produced but not yet read.
    pub fn unread(&self) -> u64 {
        self.ring.lock().counters().unread()
    }

    /// Records read but not yet acknowledged.
    pub fn awaiting_ack(&self) -> u64 {
        self.ring.lock().counters().awaiting_ack
    }

    pub fn space_left(&self) -> u64 {
        self.ring.lock().counters().space_left()
    }

    pub fn items_written(&self) -> u64 {
        self.ring.lock().counters().items_written
    }

    pub fn items_read(&self) -> u64 {
        self.ring.lock().counters().items_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(tmp: &TempDir, capacity: u64) -> AckChannel {
        AckChannel::open(
            tmp.path().join("chan.ring"),
            ChannelConfig::new(capacity, 8),
        )
        .unwrap()
    }

    fn write(ch: &AckChannel, byte: u8) -> bool {
        ch.write_or_fail(|slot| slot[0] = byte)
    }

    #[test]
    fn read_pins_until_ack() {
        let tmp = TempDir::new().unwrap();
        let ch = open(&tmp, 4);

        assert!(write(&ch, b'a'));
        assert!(write(&ch, b'b'));

        let rec = ch.read_or_fail().unwrap();
        assert_eq!(rec[0], b'a');
        assert_eq!(ch.len(), 2);
        assert_eq!(ch.unread(), 1);
        assert_eq!(ch.awaiting_ack(), 1);

        assert!(ch.ack());
        assert_eq!(ch.len(), 1);
        assert_eq!(ch.awaiting_ack(), 0);
    }

    #[test]
    fn rewind_re_exposes_reads() {
        let tmp = TempDir::new().unwrap();
        let ch = open(&tmp, 4);

        write(&ch, b'a');
        write(&ch, b'b');
        ch.read_or_fail().unwrap();
        ch.read_or_fail().unwrap();
        assert!(ch.read_or_fail().is_none());

        assert_eq!(ch.rewind(), 2);
        assert_eq!(ch.read_or_fail().unwrap()[0], b'a');
        assert_eq!(ch.read_or_fail().unwrap()[0], b'b');
    }

    #[test]
    fn replace_returns_ack_of_replaced_record() {
        let tmp = TempDir::new().unwrap();
        let ch = open(&tmp, 2);

        write(&ch, b'a');
        write(&ch, b'b');
        ch.read_or_fail().unwrap(); // "a" now awaiting ack

        assert!(ch.write_or_replace(|slot| slot[0] = b'c'));
        assert_eq!(ch.len(), 2);
        assert_eq!(ch.awaiting_ack(), 0);
        assert_eq!(ch.read_or_fail().unwrap()[0], b'b');
        assert_eq!(ch.read_or_fail().unwrap()[0], b'c');
    }

    #[test]
    fn read_to_callback_undo_restores_state() {
        let tmp = TempDir::new().unwrap();
        let ch = open(&tmp, 4);
        write(&ch, b'a');

        let result = ch
            .read_to_callback(|_| Err::<(), &str>("downstream refused"), true)
            .unwrap();
        assert!(result.is_err());
        assert_eq!(ch.awaiting_ack(), 0);
        assert_eq!(ch.unread(), 1);
        assert_eq!(ch.items_read(), 0);

        let result = ch.read_to_callback(|rec| {
            assert_eq!(rec[0], b'a');
            Ok::<(), &str>(())
        }, true);
        assert!(result.unwrap().is_ok());
        assert_eq!(ch.awaiting_ack(), 1);
    }

    #[test]
    fn read_to_callback_on_empty_fails() {
        let tmp = TempDir::new().unwrap();
        let ch = open(&tmp, 4);

        let err = ch
            .read_to_callback(|_| Ok::<(), ()>(()), true)
            .unwrap_err();
        assert!(matches!(err, ChannelError::Empty));
    }

    #[test]
    fn closed_channel_is_benign() {
        let tmp = TempDir::new().unwrap();
        let ch = open(&tmp, 4);
        write(&ch, b'a');

        ch.close().unwrap();
        assert!(!write(&ch, b'b'));
        assert!(ch.read_or_fail().is_none());
        assert!(ch.read_and_ack_or_block().is_none());
        assert!(matches!(ch.flush(), Err(ChannelError::Closed)));
    }
}
