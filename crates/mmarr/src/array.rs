use crate::error::ArrayError;
use crate::header::{head_size, ArrayHeader, FIXED_HEAD_SIZE};
use bytemuck::Pod;
use mmfile::{MappedFile, ReadonlyMapped};
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::Path;

/// Open parameters for [`Array::open`].
///
/// On create, `capacity` is mandatory and `length` defaults to 0. On
/// reopen, any supplied value must match what the file stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayOptions {
    length: Option<u64>,
    capacity: Option<u64>,
}

impl ArrayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial length on create, or the expected length on reopen.
    pub fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Capacity on create, or the expected capacity on reopen.
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Persistent fixed-stride array of `T` records with a caller-defined
/// header block `H` stored inside the file header.
pub struct Array<T, H = ()> {
    map: MappedFile,
    _marker: PhantomData<(T, H)>,
}

impl<T, H> std::fmt::Debug for Array<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array").finish_non_exhaustive()
    }
}

impl<T: Pod, H: Pod> Array<T, H> {
    /// Open `path` read-write, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P, opts: ArrayOptions) -> Result<Self, ArrayError> {
        let item_size = size_of::<T>() as u64;
        if item_size == 0 {
            return Err(ArrayError::InvalidItemSize);
        }

        let hs = head_size::<T, H>() as u64;
        let path = path.as_ref();

        if path.exists() {
            let map = MappedFile::open_rw(path)?;
            let head = validate::<T, H>(map.bytes(), map.len() as u64)?;

            if let Some(length) = opts.length {
                if length != head.length {
                    return Err(ArrayError::SizeMismatch {
                        stored: head.length,
                        requested: length,
                    });
                }
            }

            if let Some(capacity) = opts.capacity {
                if capacity != head.capacity {
                    return Err(ArrayError::SizeMismatch {
                        stored: head.capacity,
                        requested: capacity,
                    });
                }
            }

            Ok(Self {
                map,
                _marker: PhantomData,
            })
        } else {
            let Some(capacity) = opts.capacity else {
                return Err(ArrayError::CapacityRequired);
            };
            if capacity == 0 {
                return Err(ArrayError::CapacityRequired);
            }

            let length = opts.length.unwrap_or(0);
            let capacity = capacity.max(length);
            let head = ArrayHeader {
                head_size: hs,
                item_size,
                length,
                capacity,
            };

            let (mut map, created) = MappedFile::open_or_create(path, head.file_size())?;
            debug_assert!(created);
            map.bytes_mut()[..FIXED_HEAD_SIZE].copy_from_slice(bytemuck::bytes_of(&head));
            map.flush()?;

            Ok(Self {
                map,
                _marker: PhantomData,
            })
        }
    }

    /// Open `path` with a read-only mapping.
    pub fn open_readonly<P: AsRef<Path>>(path: P) -> Result<ArrayView<T, H>, ArrayError> {
        ArrayView::open(path)
    }

    fn header(&self) -> &ArrayHeader {
        bytemuck::from_bytes(&self.map.bytes()[..FIXED_HEAD_SIZE])
    }

    fn header_mut(&mut self) -> &mut ArrayHeader {
        bytemuck::from_bytes_mut(&mut self.map.bytes_mut()[..FIXED_HEAD_SIZE])
    }

    /// Store `val` at slot `length` and grow by one. Returns the 0-based
    /// position, or `None` when the array is at capacity.
    pub fn append(&mut self, val: &T) -> Option<u64> {
        let head = *self.header();
        if head.length >= head.capacity {
            return None;
        }

        self.write_slot(head.length, val);
        self.header_mut().length += 1;
        Some(head.length)
    }

    /// Overwrite the record at `pos`. The position is taken modulo the
    /// current length; callers pass positions in `[0, len)`.
    pub fn set(&mut self, pos: u64, val: &T) {
        let length = self.header().length;
        assert!(length > 0, "set on an empty array");
        self.write_slot(pos % length, val);
    }

    /// Borrow the record at `pos` (modulo the current length).
    pub fn get(&self, pos: u64) -> &T {
        let head = self.header();
        assert!(head.length > 0, "get on an empty array");
        let off = slot_offset::<T>(head, pos % head.length);
        bytemuck::from_bytes(&self.map.bytes()[off..off + size_of::<T>()])
    }

    /// Borrow the live prefix `[0, len)`.
    pub fn items(&self) -> &[T] {
        let head = self.header();
        let start = head.head_size as usize;
        let end = start + head.length as usize * size_of::<T>();
        bytemuck::cast_slice(&self.map.bytes()[start..end])
    }

    /// Borrow the custom header block.
    pub fn head(&self) -> &H {
        bytemuck::from_bytes(&self.map.bytes()[FIXED_HEAD_SIZE..FIXED_HEAD_SIZE + size_of::<H>()])
    }

    /// Mutably borrow the custom header block.
    pub fn head_mut(&mut self) -> &mut H {
        bytemuck::from_bytes_mut(
            &mut self.map.bytes_mut()[FIXED_HEAD_SIZE..FIXED_HEAD_SIZE + size_of::<H>()],
        )
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

    pub fn item_size(&self) -> u64 {
        self.header().item_size
    }

    /// Write dirty pages back to the file.
    pub fn flush(&self) -> Result<(), ArrayError> {
        self.map.flush()?;
        Ok(())
    }

    /// Flush and release the file descriptor.
    pub fn close(&mut self) -> Result<(), ArrayError> {
        self.map.close()?;
        Ok(())
    }

    fn write_slot(&mut self, pos: u64, val: &T) {
        let off = slot_offset::<T>(self.header(), pos);
        self.map.bytes_mut()[off..off + size_of::<T>()].copy_from_slice(bytemuck::bytes_of(val));
    }
}

/// Read-only view over an array file.
pub struct ArrayView<T, H = ()> {
    map: ReadonlyMapped,
    _marker: PhantomData<(T, H)>,
}

impl<T: Pod, H: Pod> ArrayView<T, H> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArrayError> {
        if size_of::<T>() == 0 {
            return Err(ArrayError::InvalidItemSize);
        }

        let map = ReadonlyMapped::open(path)?;
        validate::<T, H>(map.bytes(), map.len() as u64)?;

        Ok(Self {
            map,
            _marker: PhantomData,
        })
    }

    fn header(&self) -> &ArrayHeader {
        bytemuck::from_bytes(&self.map.bytes()[..FIXED_HEAD_SIZE])
    }

    pub fn get(&self, pos: u64) -> &T {
        let head = self.header();
        assert!(head.length > 0, "get on an empty array");
        let off = slot_offset::<T>(head, pos % head.length);
        bytemuck::from_bytes(&self.map.bytes()[off..off + size_of::<T>()])
    }

    pub fn items(&self) -> &[T] {
        let head = self.header();
        let start = head.head_size as usize;
        let end = start + head.length as usize * size_of::<T>();
        bytemuck::cast_slice(&self.map.bytes()[start..end])
    }

    pub fn head(&self) -> &H {
        bytemuck::from_bytes(&self.map.bytes()[FIXED_HEAD_SIZE..FIXED_HEAD_SIZE + size_of::<H>()])
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

    pub fn item_size(&self) -> u64 {
        self.header().item_size
    }
}

fn slot_offset<T>(head: &ArrayHeader, pos: u64) -> usize {
    head.head_size as usize + pos as usize * size_of::<T>()
}

/// Validate the stored header against the compile-time layout of `T`/`H`
/// and the actual file size.
fn validate<T: Pod, H: Pod>(bytes: &[u8], file_size: u64) -> Result<ArrayHeader, ArrayError> {
    let hs = head_size::<T, H>() as u64;

    if (bytes.len() as u64) < hs {
        return Err(ArrayError::FileTooSmall);
    }

    let head: ArrayHeader = *bytemuck::from_bytes(&bytes[..FIXED_HEAD_SIZE]);

    if head.item_size != size_of::<T>() as u64 {
        return Err(ArrayError::InvalidItemSize);
    }

    if head.head_size != hs {
        return Err(ArrayError::SizeMismatch {
            stored: head.head_size,
            requested: hs,
        });
    }

    if head.capacity < head.length {
        return Err(ArrayError::InvalidFileSize {
            expected: head.capacity,
            found: head.length,
        });
    }

    if file_size != head.file_size() {
        return Err(ArrayError::InvalidFileSize {
            expected: head.file_size(),
            found: file_size,
        });
    }

    Ok(head)
}
