//! Persistent memory-mapped array of fixed-stride records.
//!
//! An [`Array<T, H>`] stores up to `capacity` records of type `T` in a file,
//! preceded by a fixed header and an optional caller-defined header block
//! `H` that lives inside the file header. Both `T` and `H` must be plain
//! old data ([`bytemuck::Pod`]): no pointers, no references, no padding
//! surprises.
//!
//! All mutations happen directly on the memory mapping, so the state of a
//! cleanly closed array is recovered verbatim on reopen.
//!
//! # File format
//!
//! ```text
//! [ head_size | item_size | length | capacity | H bytes | pad ][ records ... ]
//! ```
//!
//! Integers are `u64` in host byte order; the file is not portable across
//! endiannesses. `head_size` stores the full header size including `H` and
//! any padding needed to align the record region.
//!
//! # Example
//!
//! ```no_run
//! use mmarr::{Array, ArrayOptions};
//!
//! let mut arr: Array<u64> = Array::open("counts.arr", ArrayOptions::new().capacity(1024))?;
//! let pos = arr.append(&42).unwrap();
//! assert_eq!(*arr.get(pos), 42);
//! # Ok::<(), mmarr::ArrayError>(())
//! ```

mod array;
mod error;
mod header;

pub use array::{Array, ArrayOptions, ArrayView};
pub use error::ArrayError;
