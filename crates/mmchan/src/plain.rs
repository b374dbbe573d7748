//! The plain channel variant: reads consume in place.
//!
//! Same monitor protocol and file lifecycle as the ack variant, with a
//! 56-byte header and no awaiting-ack window; once read, a record is gone.

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::header::PlainHeader;
use crate::raw::{self, RawRing};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::path::Path;

/// Persistent bounded SPSC channel without acknowledgements.
pub struct Channel {
    ring: Mutex<RawRing<PlainHeader>>,
    read_cond: Condvar,
    write_cond: Condvar,
}

impl Channel {
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
        let mut ring = RawRing::<PlainHeader>::open(path, &config)?;
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
            "opened channel"
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

    /// Fill the next slot, replacing the oldest record when full. Returns
    /// `false` when closed for writing.
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

    /// Copy out and consume the oldest record, waiting for data. Returns
    /// `None` once the channel is closed for writing and drained, or fully
    /// closed.
    pub fn read_or_block(&self) -> Option<Vec<u8>> {
        let mut ring = self.ring.lock();

        loop {
            if ring.closed {
                return None;
            }
            if ring.counters().length > 0 {
                break;
            }
            if ring.closed_writing {
                return None;
            }
            self.read_cond.wait(&mut ring);
        }

        Some(self.read_locked(&mut ring))
    }

    /// Copy out and consume the oldest record, or `None` when empty.
    pub fn read_or_fail(&self) -> Option<Vec<u8>> {
        let mut ring = self.ring.lock();

        if ring.closed || ring.counters().length == 0 {
            return None;
        }

        Some(self.read_locked(&mut ring))
    }

    /// Hand the oldest record to `cb` under the lock, consuming it. When
    /// `cb` fails and `undo_on_error` is set, the exact pre-read counters
    /// are restored (including `start_index`, only if it had moved) and
    /// rereaders are woken.
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
        if before.length == 0 {
            return Err(ChannelError::Empty);
        }

        let mut c = before;
        let index = c.start_index;
        c.length -= 1;
        c.items_read += 1;
        if c.length > 0 {
            c.start_index = c.wrap(c.start_index + 1);
        }
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

    fn read_locked(&self, ring: &mut MutexGuard<'_, RawRing<PlainHeader>>) -> Vec<u8> {
        let mut c = ring.counters();
        let index = c.start_index;
        let data = ring.slot(&c, index).to_vec();

        c.length -= 1;
        c.items_read += 1;
        if c.length > 0 {
            c.start_index = c.wrap(c.start_index + 1);
        }
        ring.update(c);

        self.write_cond.notify_all();
        data
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
            if ring.counters().length > 0 {
                return true;
            }
            if ring.closed_writing {
                return false;
            }
            self.read_cond.wait(&mut ring);
        }
    }

    /// Block until every record has been consumed.
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

    /// Wipe the ring. The underlying bytes are left in place.
    pub fn reset(&self) {
        let mut ring = self.ring.lock();
        let mut c = ring.counters();

        c.start_index = 0;
        c.length = 0;
        ring.update(c);

        self.write_cond.notify_all();
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
    /// file.
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
