use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

/// Fixed part of the on-disk header. The caller's custom header block `H`
/// follows immediately after, then padding up to [`head_size`](Self::head_size).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct ArrayHeader {
    pub head_size: u64,
    pub item_size: u64,
    pub length: u64,
    pub capacity: u64,
}

pub(crate) const FIXED_HEAD_SIZE: usize = size_of::<ArrayHeader>();

impl ArrayHeader {
    pub fn file_size(&self) -> u64 {
        self.head_size + self.item_size * self.capacity
    }
}

/// Full header size for a given record type `T` and custom block `H`:
/// the fixed fields, then `H`, padded so the record region starts aligned
/// for both `T` and `H`.
pub(crate) fn head_size<T, H>() -> usize {
    let align = align_of::<T>().max(align_of::<H>()).max(align_of::<u64>());
    (FIXED_HEAD_SIZE + size_of::<H>()).next_multiple_of(align)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_size_is_aligned() {
        assert_eq!(head_size::<u64, ()>(), 32);
        assert_eq!(head_size::<u8, ()>(), 32);
        // 3-byte custom block pads up to the next u64 boundary
        assert_eq!(head_size::<u64, [u8; 3]>(), 40);
        assert_eq!(head_size::<u64, [u64; 2]>(), 48);
    }
}
