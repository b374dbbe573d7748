//! The ring engine shared by both persistent variants.
//!
//! [`RawRing`] owns the mapping and the closed flags and implements the
//! wrap-around accounting over whichever header layout `H` provides. It
//! knows nothing about locking or signaling; the public channel types wrap
//! it in a mutex and drive the condition variables.

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::header::{Counters, RingHeader};
use crate::invariants::{debug_assert_ring_counts, debug_assert_stats_ordered};
use mmfile::MappedFile;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

pub(crate) struct RawRing<H> {
    map: MappedFile,
    pub closed_writing: bool,
    pub closed: bool,
    _marker: PhantomData<H>,
}

impl<H: RingHeader> RawRing<H> {
    /// Open `path`, creating it with `config`'s shape if missing. An
    /// existing file is validated but its stored shape is kept; the caller
    /// decides whether a shape mismatch triggers migration.
    pub fn open(path: &Path, config: &ChannelConfig) -> Result<Self, ChannelError> {
        if config.item_size == 0 {
            return Err(ChannelError::InvalidItemSize);
        }

        if path.exists() {
            let map = MappedFile::open_rw(path)?;
            if map.len() < H::SIZE {
                return Err(ChannelError::FileTooSmall);
            }

            let head: &H = bytemuck::from_bytes(&map.bytes()[..H::SIZE]);
            head.validate(map.len() as u64)?;

            Ok(Self {
                map,
                closed_writing: false,
                closed: false,
                _marker: PhantomData,
            })
        } else {
            if config.capacity == 0 {
                return Err(ChannelError::CapacityRequired);
            }

            let head = H::new(config.capacity, config.item_size);
            let (mut map, created) = MappedFile::open_or_create(path, head.load().file_size())?;
            debug_assert!(created);
            map.bytes_mut()[..H::SIZE].copy_from_slice(bytemuck::bytes_of(&head));
            map.flush()?;

            Ok(Self {
                map,
                closed_writing: false,
                closed: false,
                _marker: PhantomData,
            })
        }
    }

    #[inline]
    pub fn counters(&self) -> Counters {
        bytemuck::from_bytes::<H>(&self.map.bytes()[..H::SIZE]).load()
    }

    /// Write a counter snapshot back through the mapping.
    pub fn update(&mut self, c: Counters) {
        debug_assert_ring_counts!(c);
        debug_assert_stats_ordered!(c);
        bytemuck::from_bytes_mut::<H>(&mut self.map.bytes_mut()[..H::SIZE]).store(c);
    }

    #[inline]
    pub fn slot(&self, c: &Counters, index: u64) -> &[u8] {
        &self.map.bytes()[c.slot_range(index)]
    }

    #[inline]
    pub fn slot_mut(&mut self, c: &Counters, index: u64) -> &mut [u8] {
        let range = c.slot_range(index);
        &mut self.map.bytes_mut()[range]
    }

    /// Fill the end slot and advance the counters. When the ring is full
    /// the oldest record is replaced: `start_index` advances, and a
    /// consumed awaiting-ack slot gives its ack back.
    pub fn write_record(&mut self, fill: impl FnOnce(&mut [u8])) {
        let mut c = self.counters();
        let index = c.end_index();
        fill(self.slot_mut(&c, index));

        if c.space_left() > 0 {
            c.length += 1;
        } else {
            c.start_index = c.wrap(c.start_index + 1);
            if c.awaiting_ack > 0 {
                c.awaiting_ack -= 1;
            }
        }

        c.items_written += 1;
        self.update(c);
    }

    pub fn reset_stats(&mut self) {
        let mut c = self.counters();
        c.items_written = 0;
        c.items_read = 0;
        self.update(c);
    }

    pub fn flush(&self) -> Result<(), ChannelError> {
        self.map.flush()?;
        Ok(())
    }

    /// Flush and release the file descriptor; the mapping stays readable.
    pub fn close_file(&mut self) -> Result<(), ChannelError> {
        self.map.close()?;
        Ok(())
    }
}

/// Copy-migrate `src` into a fresh sibling file with `config`'s shape,
/// then atomically replace the original. Records are replayed in logical
/// order; when the target is smaller, the first records win. The target
/// starts with a clean acknowledgement cursor but keeps the statistics.
pub(crate) fn migrate<H: RingHeader>(
    mut src: RawRing<H>,
    path: &Path,
    config: &ChannelConfig,
) -> Result<(), ChannelError> {
    let new_path = sibling_path(path);
    if new_path.exists() {
        std::fs::remove_file(&new_path)?;
    }

    let mut dst = RawRing::<H>::open(&new_path, config)?;

    let sc = src.counters();
    let count = sc.length.min(config.capacity);
    let copy_len = sc.item_size.min(config.item_size) as usize;

    tracing::info!(
        path = %path.display(),
        from_capacity = sc.capacity,
        from_item_size = sc.item_size,
        to_capacity = config.capacity,
        to_item_size = config.item_size,
        records = count,
        "migrating channel file"
    );

    let mut dc = dst.counters();
    for i in 0..count {
        let from = sc.wrap(sc.start_index + i);
        let range = dc.slot_range(i);
        dst.map.bytes_mut()[range.start..range.start + copy_len]
            .copy_from_slice(&src.slot(&sc, from)[..copy_len]);
    }

    dc.start_index = 0;
    dc.awaiting_ack = 0;
    dc.length = count;
    dc.items_written = sc.items_written;
    dc.items_read = sc.items_read;
    dst.update(dc);

    dst.close_file()?;
    src.close_file()?;
    drop(dst);
    drop(src);

    std::fs::remove_file(path)?;
    std::fs::rename(&new_path, path)?;
    Ok(())
}

/// `<path>.new`, appended to the full file name.
fn sibling_path(path: &Path) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(".new");
    PathBuf::from(os)
}
