//! Heap-backed channel with the same ring semantics, for hand-offs that
//! do not need to survive a restart. Also serves as the reference model
//! for the property tests.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::ChannelError;

struct MemInner {
    data: Vec<u8>,
    item_size: u64,
    start_index: u64,
    length: u64,
    capacity: u64,
    items_written: u64,
    items_read: u64,
    closed_writing: bool,
}

impl MemInner {
    #[inline]
    fn wrap(&self, index: u64) -> u64 {
        index % self.capacity
    }

    #[inline]
    fn end_index(&self) -> u64 {
        self.wrap(self.start_index + self.length)
    }

    #[inline]
    fn space_left(&self) -> u64 {
        self.capacity - self.length
    }

    fn slot(&self, index: u64) -> &[u8] {
        let off = (index * self.item_size) as usize;
        &self.data[off..off + self.item_size as usize]
    }

    fn slot_mut(&mut self, index: u64) -> &mut [u8] {
        let off = (index * self.item_size) as usize;
        let item = self.item_size as usize;
        &mut self.data[off..off + item]
    }

    fn write_record(&mut self, fill: impl FnOnce(&mut [u8])) {
        let index = self.end_index();
        fill(self.slot_mut(index));

        if self.space_left() > 0 {
            self.length += 1;
        } else {
            self.start_index = self.wrap(self.start_index + 1);
        }

        self.items_written += 1;
    }

    fn read_record(&mut self) -> Vec<u8> {
        let data = self.slot(self.start_index).to_vec();
        self.length -= 1;
        self.items_read += 1;
        if self.length > 0 {
            self.start_index = self.wrap(self.start_index + 1);
        }
        data
    }
}

/// Bounded in-memory SPSC channel; the plain ring contract minus file,
/// mapping, and migration.
pub struct MemoryChannel {
    inner: Mutex<MemInner>,
    read_cond: Condvar,
    write_cond: Condvar,
}

impl MemoryChannel {
    /// A ring of `capacity` records of `item_size` bytes each.
    pub fn new(capacity: u64, item_size: u64) -> Self {
        assert!(capacity >= 1, "capacity must be at least 1");
        assert!(item_size >= 1, "item size must be at least 1 byte");

        Self {
            inner: Mutex::new(MemInner {
                data: vec![0; (capacity * item_size) as usize],
                item_size,
                start_index: 0,
                length: 0,
                capacity,
                items_written: 0,
                items_read: 0,
                closed_writing: false,
            }),
            read_cond: Condvar::new(),
            write_cond: Condvar::new(),
        }
    }

    /// Replay every live record into `dst` in logical order. When `dst`
    /// is smaller, the first records win. Locks self then dst; concurrent
    /// copies in opposite directions would deadlock.
    pub fn copy_to(&self, dst: &MemoryChannel) {
        let src = self.inner.lock();
        let mut target = dst.inner.lock();

        let count = src.length.min(target.capacity);
        let copy_len = src.item_size.min(target.item_size) as usize;

        for i in 0..count {
            let from = src.wrap(src.start_index + i);
            let record = src.slot(from);
            target.write_record(|slot| slot[..copy_len].copy_from_slice(&record[..copy_len]));
        }

        drop(target);
        dst.read_cond.notify_all();
    }

    pub fn write_or_block(&self, fill: impl FnOnce(&mut [u8])) -> bool {
        let mut inner = self.inner.lock();

        if inner.closed_writing {
            return false;
        }

        while inner.space_left() == 0 {
            if inner.closed_writing {
                return false;
            }
            self.write_cond.wait(&mut inner);
        }

        inner.write_record(fill);
        self.read_cond.notify_one();
        true
    }

    pub fn write_or_fail(&self, fill: impl FnOnce(&mut [u8])) -> bool {
        let mut inner = self.inner.lock();

        if inner.closed_writing || inner.space_left() == 0 {
            return false;
        }

        inner.write_record(fill);
        self.read_cond.notify_one();
        true
    }

    pub fn write_or_replace(&self, fill: impl FnOnce(&mut [u8])) -> bool {
        let mut inner = self.inner.lock();

        if inner.closed_writing {
            return false;
        }

        inner.write_record(fill);
        self.read_cond.notify_one();
        true
    }

    pub fn read_or_block(&self) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();

        loop {
            if inner.length > 0 {
                break;
            }
            if inner.closed_writing {
                return None;
            }
            self.read_cond.wait(&mut inner);
        }

        Some(self.read_locked(&mut inner))
    }

    pub fn read_or_fail(&self) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();

        if inner.length == 0 {
            return None;
        }

        Some(self.read_locked(&mut inner))
    }

    /// Hand the oldest record to `cb` under the lock, consuming it; see
    /// the persistent variants for the undo contract.
    pub fn read_to_callback<E>(
        &self,
        cb: impl FnOnce(&[u8]) -> Result<(), E>,
        undo_on_error: bool,
    ) -> Result<Result<(), E>, ChannelError> {
        let mut inner = self.inner.lock();

        if inner.length == 0 {
            return Err(ChannelError::Empty);
        }

        let index = inner.start_index;
        let moved_start;
        {
            inner.length -= 1;
            inner.items_read += 1;
            moved_start = inner.length > 0;
            if moved_start {
                inner.start_index = inner.wrap(inner.start_index + 1);
            }
        }

        let result = cb(inner.slot(index));

        if undo_on_error && result.is_err() {
            if moved_start {
                inner.start_index = index;
            }
            inner.length += 1;
            inner.items_read -= 1;
            self.read_cond.notify_all();
        } else {
            self.write_cond.notify_all();
        }

        Ok(result)
    }

    fn read_locked(&self, inner: &mut MutexGuard<'_, MemInner>) -> Vec<u8> {
        let data = inner.read_record();
        self.write_cond.notify_all();
        data
    }

    /// Block until there is data to read (`true`) or no data will ever
    /// arrive (`false`).
    pub fn wait(&self) -> bool {
        let mut inner = self.inner.lock();

        loop {
            if inner.length > 0 {
                return true;
            }
            if inner.closed_writing {
                return false;
            }
            self.read_cond.wait(&mut inner);
        }
    }

    /// Block until the ring drains or `timeout` passes. Returns `true`
    /// when the ring is empty.
    pub fn wait_for_sync(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        while inner.length > 0 {
            if self.write_cond.wait_until(&mut inner, deadline).timed_out() {
                return inner.length == 0;
            }
        }

        true
    }

    /// Wipe the ring. The underlying bytes are left in place.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.start_index = 0;
        inner.length = 0;
        self.write_cond.notify_all();
    }

    /// Signal end-of-stream to readers. Idempotent.
    pub fn close_writing(&self) {
        let mut inner = self.inner.lock();

        if !inner.closed_writing {
            inner.closed_writing = true;
            self.read_cond.notify_all();
        }
    }

    /// There is no file to release; closing just ends the stream and
    /// unblocks every waiter.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed_writing = true;
        self.read_cond.notify_all();
        self.write_cond.notify_all();
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u64 {
        self.inner.lock().capacity
    }

    pub fn item_size(&self) -> u64 {
        self.inner.lock().item_size
    }

    pub fn space_left(&self) -> u64 {
        self.inner.lock().space_left()
    }

    pub fn items_written(&self) -> u64 {
        self.inner.lock().items_written
    }

    pub fn items_read(&self) -> u64 {
        self.inner.lock().items_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn write(ch: &MemoryChannel, byte: u8) -> bool {
        ch.write_or_fail(|slot| slot[0] = byte)
    }

    #[test]
    fn fifo_order() {
        let ch = MemoryChannel::new(4, 8);

        write(&ch, 1);
        write(&ch, 2);
        write(&ch, 3);

        assert_eq!(ch.read_or_fail().unwrap()[0], 1);
        assert_eq!(ch.read_or_fail().unwrap()[0], 2);
        assert_eq!(ch.read_or_fail().unwrap()[0], 3);
        assert!(ch.read_or_fail().is_none());
    }

    #[test]
    fn copy_to_preserves_order_and_clamps() {
        let src = MemoryChannel::new(4, 8);
        for b in 1..=4 {
            write(&src, b);
        }

        let dst = MemoryChannel::new(2, 8);
        src.copy_to(&dst);

        assert_eq!(dst.len(), 2);
        assert_eq!(dst.read_or_fail().unwrap()[0], 1);
        assert_eq!(dst.read_or_fail().unwrap()[0], 2);
    }

    #[test]
    fn blocked_reader_wakes_on_close_writing() {
        let ch = Arc::new(MemoryChannel::new(2, 8));

        let reader = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.read_or_block())
        };

        thread::sleep(Duration::from_millis(20));
        ch.close_writing();
        assert!(reader.join().unwrap().is_none());
    }

    #[test]
    fn wait_for_sync_drains_or_times_out() {
        let ch = Arc::new(MemoryChannel::new(2, 8));
        write(&ch, 1);

        assert!(!ch.wait_for_sync(Duration::from_millis(10)));

        let drainer = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ch.read_or_fail();
            })
        };

        assert!(ch.wait_for_sync(Duration::from_secs(5)));
        drainer.join().unwrap();
    }

    #[test]
    fn producer_consumer_threads() {
        let ch = Arc::new(MemoryChannel::new(8, 8));
        const COUNT: u64 = 1_000;

        let producer = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                for i in 0..COUNT {
                    assert!(ch.write_or_block(|slot| {
                        slot.copy_from_slice(&i.to_ne_bytes());
                    }));
                }
                ch.close_writing();
            })
        };

        let mut expected = 0u64;
        while let Some(record) = ch.read_or_block() {
            assert_eq!(u64::from_ne_bytes(record.try_into().unwrap()), expected);
            expected += 1;
        }

        producer.join().unwrap();
        assert_eq!(expected, COUNT);
        assert_eq!(ch.items_written(), COUNT);
        assert_eq!(ch.items_read(), COUNT);
    }
}
