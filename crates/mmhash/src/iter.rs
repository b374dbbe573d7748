//! Chain-walking iterators over the link region.

use crate::key::LinkKey;
use crate::{read_key, read_val, HashHeader};
use bytemuck::Pod;
use std::marker::PhantomData;

/// Iterator over the values stored under one key, in insertion order.
pub struct Finder<'a, K, V> {
    bytes: &'a [u8],
    head: HashHeader,
    key: K,
    next: u64,
    _marker: PhantomData<V>,
}

impl<'a, K: LinkKey, V: Pod> Finder<'a, K, V> {
    pub(crate) fn new(bytes: &'a [u8], head: HashHeader, key: K, next: u64) -> Self {
        Self {
            bytes,
            head,
            key,
            next,
            _marker: PhantomData,
        }
    }
}

impl<K: LinkKey, V: Pod> Iterator for Finder<'_, K, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        // Chains may interleave keys that share a bucket; skip the others.
        while self.next != 0 {
            let link = self.next;
            let next: K = read_key(self.bytes, link);
            let key: K = read_key(self.bytes, link + self.head.key_size);
            self.next = next.to_u64();

            if key == self.key {
                return Some(read_val(self.bytes, link + 2 * self.head.key_size));
            }
        }

        None
    }
}

/// Iterator over every `(key, value)` entry, in bucket order.
pub struct Iter<'a, K, V> {
    bytes: &'a [u8],
    head: HashHeader,
    bucket: u64,
    next: u64,
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: LinkKey, V: Pod> Iter<'a, K, V> {
    pub(crate) fn new(bytes: &'a [u8], head: HashHeader, next: u64) -> Self {
        Self {
            bytes,
            head,
            bucket: 0,
            next,
            _marker: PhantomData,
        }
    }
}

impl<K: LinkKey, V: Pod> Iterator for Iter<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        loop {
            if self.next == 0 {
                if self.bucket + 1 >= self.head.buckets {
                    return None;
                }

                self.bucket += 1;
                let slot = self.head.head_size + self.bucket * self.head.key_size;
                self.next = read_key::<K>(self.bytes, slot).to_u64();
                continue;
            }

            let link = self.next;
            let next: K = read_key(self.bytes, link);
            let key: K = read_key(self.bytes, link + self.head.key_size);
            self.next = next.to_u64();

            return Some((key, read_val(self.bytes, link + 2 * self.head.key_size)));
        }
    }
}
