//! Persistent, append-only hash multimap backed by a memory-mapped file.
//!
//! A [`HashFile<K, V>`] stores fixed-size values under unsigned integer
//! keys using separate chaining: a fixed region of bucket head slots is
//! followed by a packed, append-only array of links. Links are claimed in
//! file order and hooked onto the tail of their bucket's chain, so values
//! for one key come back in insertion order. Nothing is ever removed,
//! resized, or rehashed; when the link region is full, [`HashFile::add`]
//! fails with [`HashError::CapacityExhausted`].
//!
//! # File format
//!
//! ```text
//! [ 56-byte header ][ buckets × key_size head slots ][ capacity × link_size links ]
//! ```
//!
//! Header fields (`u64`, host byte order, so files are not portable
//! across endiannesses): `head_size key_size val_size link_size capacity
//! length buckets`. A link is `{ next: K, key: K, val: V }`, packed with no
//! padding (`link_size = 2 × key_size + val_size`). Bucket head slots and
//! `next` fields store absolute byte offsets typed `K`; 0 terminates a
//! chain, which is unambiguous because offset 0 is the header. Since
//! offsets live in `K`, the whole file must fit in `K::MAX` bytes.

mod error;
mod iter;
mod key;

pub use error::HashError;
pub use iter::{Finder, Iter};
pub use key::{Keyed, LinkKey};

use bytemuck::{Pod, Zeroable};
use mmfile::{MappedFile, ReadonlyMapped};
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::Path;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct HashHeader {
    head_size: u64,
    key_size: u64,
    val_size: u64,
    link_size: u64,
    capacity: u64,
    length: u64,
    buckets: u64,
}

const HEAD_SIZE: usize = size_of::<HashHeader>();

/// Default number of bucket head slots; raised to `capacity` when the
/// capacity is larger.
const DEFAULT_BUCKETS: u64 = 255;

impl HashHeader {
    fn file_size(&self) -> u64 {
        self.head_size + self.buckets * self.key_size + self.capacity * self.link_size
    }

    fn bucket_slot(&self, key: u64) -> u64 {
        self.head_size + (key % self.buckets) * self.key_size
    }

    fn next_free_link(&self) -> u64 {
        self.head_size + self.buckets * self.key_size + self.length * self.link_size
    }
}

pub(crate) fn read_key<K: LinkKey>(bytes: &[u8], off: u64) -> K {
    let off = off as usize;
    bytemuck::pod_read_unaligned(&bytes[off..off + size_of::<K>()])
}

fn write_key<K: LinkKey>(bytes: &mut [u8], off: u64, key: K) {
    let off = off as usize;
    bytes[off..off + size_of::<K>()].copy_from_slice(bytemuck::bytes_of(&key));
}

pub(crate) fn read_val<V: Pod>(bytes: &[u8], off: u64) -> V {
    let off = off as usize;
    bytemuck::pod_read_unaligned(&bytes[off..off + size_of::<V>()])
}

/// Persistent hash multimap. One process, one open handle.
pub struct HashFile<K, V> {
    map: MappedFile,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> std::fmt::Debug for HashFile<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashFile").finish_non_exhaustive()
    }
}

impl<K: LinkKey, V: Pod> HashFile<K, V> {
    /// Open `path` read-write, creating it if missing. `capacity` bounds
    /// the number of links that can ever be appended; it is only consulted
    /// on create (an existing file keeps its stored shape).
    pub fn open<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Self, HashError> {
        if size_of::<V>() == 0 {
            return Err(HashError::InvalidValueSize);
        }

        let path = path.as_ref();

        if path.exists() {
            let map = MappedFile::open_rw(path)?;
            validate::<K, V>(map.bytes(), map.len() as u64)?;
            return Ok(Self {
                map,
                _marker: PhantomData,
            });
        }

        if capacity == 0 {
            return Err(HashError::CapacityRequired);
        }

        let key_size = size_of::<K>() as u64;
        let head = HashHeader {
            head_size: HEAD_SIZE as u64,
            key_size,
            val_size: size_of::<V>() as u64,
            link_size: 2 * key_size + size_of::<V>() as u64,
            capacity,
            length: 0,
            buckets: DEFAULT_BUCKETS.max(capacity),
        };
        check_addressable::<K>(head.file_size())?;

        let (mut map, created) = MappedFile::open_or_create(path, head.file_size())?;
        debug_assert!(created);
        map.bytes_mut()[..HEAD_SIZE].copy_from_slice(bytemuck::bytes_of(&head));
        map.flush()?;

        Ok(Self {
            map,
            _marker: PhantomData,
        })
    }

    /// Open `path` with a read-only mapping.
    pub fn open_readonly<P: AsRef<Path>>(path: P) -> Result<HashView<K, V>, HashError> {
        HashView::open(path)
    }

    fn header(&self) -> &HashHeader {
        bytemuck::from_bytes(&self.map.bytes()[..HEAD_SIZE])
    }

    fn header_mut(&mut self) -> &mut HashHeader {
        bytemuck::from_bytes_mut(&mut self.map.bytes_mut()[..HEAD_SIZE])
    }

    /// Append `val` under `key`: claim the next free link, then hook it
    /// onto the tail of the bucket chain so insertion order is preserved.
    pub fn add(&mut self, key: K, val: &V) -> Result<(), HashError> {
        let head = *self.header();
        if head.length >= head.capacity {
            return Err(HashError::CapacityExhausted);
        }

        let link = head.next_free_link();
        let bytes = self.map.bytes_mut();

        write_key::<K>(bytes, link, K::from_u64(0));
        write_key::<K>(bytes, link + head.key_size, key);
        let val_off = (link + 2 * head.key_size) as usize;
        bytes[val_off..val_off + size_of::<V>()].copy_from_slice(bytemuck::bytes_of(val));

        // Walk to the chain terminator and point it at the new link.
        let mut slot = head.bucket_slot(key.to_u64());
        loop {
            let ptr: K = read_key(bytes, slot);
            if ptr.to_u64() == 0 {
                break;
            }
            slot = ptr.to_u64();
        }
        write_key::<K>(bytes, slot, K::from_u64(link));

        self.header_mut().length += 1;
        Ok(())
    }

    /// Iterate the values stored under `key`, in insertion order.
    pub fn find(&self, key: K) -> Finder<'_, K, V> {
        let head = *self.header();
        let next = read_key::<K>(self.map.bytes(), head.bucket_slot(key.to_u64())).to_u64();
        Finder::new(self.map.bytes(), head, key, next)
    }

    /// Iterate every entry in bucket order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let head = *self.header();
        let next = read_key::<K>(self.map.bytes(), head.bucket_slot(0)).to_u64();
        Iter::new(self.map.bytes(), head, next)
    }

    /// Number of values stored under `key`.
    pub fn count(&self, key: K) -> usize {
        self.find(key).count()
    }

    pub fn len(&self) -> u64 {
        self.header().length
    }

    pub fn is_empty(&self) -> bool {
        self.header().length == 0
    }

    pub fn capacity(&self) -> u64 {
        self.header().capacity
    }

    /// Write dirty pages back to the file.
    pub fn flush(&self) -> Result<(), HashError> {
        self.map.flush()?;
        Ok(())
    }

    /// Flush and release the file descriptor.
    pub fn close(&mut self) -> Result<(), HashError> {
        self.map.close()?;
        Ok(())
    }
}

impl<K: LinkKey, V: Pod + Keyed<K>> HashFile<K, V> {
    /// First value whose [`Keyed::key`] projection equals `key`.
    pub fn get(&self, key: K) -> Option<V> {
        self.find(key).find(|val| val.key() == key)
    }
}

/// Read-only view over a hash file.
pub struct HashView<K, V> {
    map: ReadonlyMapped,
    _marker: PhantomData<(K, V)>,
}

impl<K: LinkKey, V: Pod> HashView<K, V> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HashError> {
        if size_of::<V>() == 0 {
            return Err(HashError::InvalidValueSize);
        }

        let map = ReadonlyMapped::open(path)?;
        validate::<K, V>(map.bytes(), map.len() as u64)?;

        Ok(Self {
            map,
            _marker: PhantomData,
        })
    }

    fn header(&self) -> &HashHeader {
        bytemuck::from_bytes(&self.map.bytes()[..HEAD_SIZE])
    }

    pub fn find(&self, key: K) -> Finder<'_, K, V> {
        let head = *self.header();
        let next = read_key::<K>(self.map.bytes(), head.bucket_slot(key.to_u64())).to_u64();
        Finder::new(self.map.bytes(), head, key, next)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        let head = *self.header();
        let next = read_key::<K>(self.map.bytes(), head.bucket_slot(0)).to_u64();
        Iter::new(self.map.bytes(), head, next)
    }

    pub fn count(&self, key: K) -> usize {
        self.find(key).count()
    }

    pub fn len(&self) -> u64 {
        self.header().length
    }

    pub fn is_empty(&self) -> bool {
        self.header().length == 0
    }

    pub fn capacity(&self) -> u64 {
        self.header().capacity
    }
}

impl<K: LinkKey, V: Pod + Keyed<K>> HashView<K, V> {
    pub fn get(&self, key: K) -> Option<V> {
        self.find(key).find(|val| val.key() == key)
    }
}

fn check_addressable<K: LinkKey>(file_size: u64) -> Result<(), HashError> {
    if K::BITS < 64 && file_size > (1u64 << K::BITS) - 1 {
        return Err(HashError::FileTooLarge {
            size: file_size,
            key_bits: K::BITS,
        });
    }
    Ok(())
}

fn validate<K: LinkKey, V: Pod>(bytes: &[u8], file_size: u64) -> Result<HashHeader, HashError> {
    if (bytes.len() as u64) < HEAD_SIZE as u64 {
        return Err(HashError::FileTooSmall);
    }

    let head: HashHeader = *bytemuck::from_bytes(&bytes[..HEAD_SIZE]);
    let key_size = size_of::<K>() as u64;
    let val_size = size_of::<V>() as u64;

    if head.key_size != key_size {
        return Err(HashError::SizeMismatch {
            what: "key",
            stored: head.key_size,
            expected: key_size,
        });
    }

    if head.val_size != val_size {
        return Err(HashError::SizeMismatch {
            what: "value",
            stored: head.val_size,
            expected: val_size,
        });
    }

    if head.link_size != 2 * key_size + val_size {
        return Err(HashError::SizeMismatch {
            what: "link",
            stored: head.link_size,
            expected: 2 * key_size + val_size,
        });
    }

    if head.buckets == 0 {
        return Err(HashError::SizeMismatch {
            what: "bucket",
            stored: 0,
            expected: DEFAULT_BUCKETS,
        });
    }

    if head.capacity < head.length {
        return Err(HashError::InvalidFileSize {
            expected: head.capacity,
            found: head.length,
        });
    }

    if file_size != head.file_size() {
        return Err(HashError::InvalidFileSize {
            expected: head.file_size(),
            found: file_size,
        });
    }

    check_addressable::<K>(file_size)?;

    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn colliding_keys_chain_in_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let mut map: HashFile<u64, u64> = HashFile::open(tmp.path().join("h.map"), 3).unwrap();

        // With 255 buckets, keys 1 and 256 land in bucket 1.
        map.add(1, &111).unwrap();
        map.add(1, &222).unwrap();
        map.add(256, &333).unwrap();

        assert_eq!(map.find(1).collect::<Vec<_>>(), vec![111, 222]);
        assert_eq!(map.find(256).collect::<Vec<_>>(), vec![333]);
        assert_eq!(map.count(1), 2);
        assert_eq!(map.count(256), 1);
        assert_eq!(map.count(2), 0);
        assert_eq!(map.iter().count(), 3);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn capacity_exhaustion_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut map: HashFile<u64, u64> = HashFile::open(tmp.path().join("h.map"), 2).unwrap();

        map.add(1, &1).unwrap();
        map.add(2, &2).unwrap();
        assert!(matches!(
            map.add(3, &3),
            Err(HashError::CapacityExhausted)
        ));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn reopen_recovers_chains() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("h.map");

        {
            let mut map: HashFile<u64, u64> = HashFile::open(&path, 4).unwrap();
            map.add(7, &70).unwrap();
            map.add(7, &71).unwrap();
            map.close().unwrap();
        }

        let map: HashFile<u64, u64> = HashFile::open(&path, 0).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.find(7).collect::<Vec<_>>(), vec![70, 71]);
    }

    #[test]
    fn layout_mismatch_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("h.map");
        HashFile::<u64, u64>::open(&path, 4).unwrap();

        let err = HashFile::<u64, u32>::open(&path, 4).unwrap_err();
        assert!(matches!(err, HashError::SizeMismatch { what: "value", .. }));

        let err = HashFile::<u32, u64>::open(&path, 4).unwrap_err();
        assert!(matches!(err, HashError::SizeMismatch { what: "key", .. }));
    }

    #[test]
    fn readonly_view_finds_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("h.map");

        {
            let mut map: HashFile<u64, u64> = HashFile::open(&path, 4).unwrap();
            map.add(5, &50).unwrap();
        }

        let view: HashView<u64, u64> = HashFile::open_readonly(&path).unwrap();
        assert_eq!(view.find(5).collect::<Vec<_>>(), vec![50]);
        assert_eq!(view.len(), 1);
        assert_eq!(view.capacity(), 4);
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Session {
        id: u64,
        peer: u64,
    }

    impl Keyed<u64> for Session {
        fn key(&self) -> u64 {
            self.id
        }
    }

    #[test]
    fn keyed_get_returns_first_projection_match() {
        let tmp = TempDir::new().unwrap();
        let mut map: HashFile<u64, Session> = HashFile::open(tmp.path().join("s.map"), 8).unwrap();

        map.add(1, &Session { id: 1, peer: 10 }).unwrap();
        map.add(1, &Session { id: 1, peer: 11 }).unwrap();
        map.add(2, &Session { id: 2, peer: 20 }).unwrap();

        assert_eq!(map.get(1), Some(Session { id: 1, peer: 10 }));
        assert_eq!(map.get(2), Some(Session { id: 2, peer: 20 }));
        assert_eq!(map.get(3), None);
    }

    #[test]
    fn small_key_type_rejects_oversized_layout() {
        let tmp = TempDir::new().unwrap();
        // 40k links of 12 bytes plus buckets blows past 16-bit offsets.
        let err = HashFile::<u16, u64>::open(tmp.path().join("h.map"), 40_000).unwrap_err();
        assert!(matches!(err, HashError::FileTooLarge { key_bits: 16, .. }));
    }
}
