//! Memory-mapped file plumbing for the mm* storage crates.
//!
//! Every persistent structure in this workspace shares the same on-disk
//! shape: a fixed header followed by a packed payload region, accessed
//! through a single mapping. This crate owns the open/create/truncate/map
//! mechanics so the storage crates never construct a mapping themselves.
//!
//! Mutations go directly through the mapping; [`MappedFile::flush`] writes
//! dirty pages back. The file handle is kept alive alongside the mapping
//! and can be released early with [`MappedFile::close`]; the mapping
//! itself stays valid until drop.

use memmap2::{Mmap, MmapMut};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A read-write memory-mapped file.
pub struct MappedFile {
    /// File handle kept alive to maintain the memory map validity.
    /// `None` after [`close`](Self::close).
    file: Option<File>,
    map: MmapMut,
}

impl MappedFile {
    /// Open `path` read-write if it exists, or create it truncated to
    /// `size_if_new` bytes. Returns the mapping and whether the file was
    /// created by this call.
    ///
    /// An error between opening the file and establishing the mapping
    /// drops the file handle before returning.
    pub fn open_or_create<P: AsRef<Path>>(path: P, size_if_new: u64) -> io::Result<(Self, bool)> {
        let path = path.as_ref();

        if path.exists() {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            let map = unsafe { MmapMut::map_mut(&file)? };
            Ok((Self { file: Some(file), map }, false))
        } else {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(path)?;
            file.set_len(size_if_new)?;
            let map = unsafe { MmapMut::map_mut(&file)? };
            Ok((Self { file: Some(file), map }, true))
        }
    }

    /// Open an existing file read-write and map it.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { file: Some(file), map })
    }

    /// Mapped length in bytes (equals the file size at map time).
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Write dirty pages back to the file.
    pub fn flush(&self) -> io::Result<()> {
        self.map.flush()
    }

    /// Flush, then release the file descriptor. The mapping stays valid,
    /// so read accessors remain usable after close; only the descriptor
    /// is gone. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        if self.file.is_some() {
            self.map.flush()?;
            self.file = None;
        }
        Ok(())
    }
}

/// A read-only memory-mapped file.
pub struct ReadonlyMapped {
    /// File handle kept alive to maintain the memory map validity.
    _file: File,
    map: Mmap,
}

impl ReadonlyMapped {
    /// Open an existing file and map it read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { _file: file, map })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }
}
