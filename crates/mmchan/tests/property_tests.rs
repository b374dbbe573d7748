//! Property tests for the triple-index accounting.
//!
//! The persistent ack channel is driven against an in-process reference
//! model: a vector whose first `awaiting` entries mirror the awaiting-ack
//! window. After every operation the channel's accessors must agree with
//! the model, which pins down the accounting identities (length tracks
//! writes minus full acks, awaiting-ack tracks reads minus full acks) for
//! arbitrary operation sequences.

use mmchan::{AckChannel, ChannelConfig};
use proptest::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Write(u8),
    Replace(u8),
    Read,
    ReadAndAck,
    Ack,
    AckAll,
    Rewind,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u8>().prop_map(Op::Write),
        any::<u8>().prop_map(Op::Replace),
        Just(Op::Read),
        Just(Op::ReadAndAck),
        Just(Op::Ack),
        Just(Op::AckAll),
        Just(Op::Rewind),
    ]
}

/// Reference model: `ring` holds live records oldest-first; the first
/// `awaiting` entries are read but not acknowledged.
struct Model {
    ring: Vec<u8>,
    awaiting: usize,
    capacity: usize,
    written: u64,
    read: u64,
}

impl Model {
    fn new(capacity: usize) -> Self {
        Self {
            ring: Vec::new(),
            awaiting: 0,
            capacity,
            written: 0,
            read: 0,
        }
    }

    fn unread(&self) -> usize {
        self.ring.len() - self.awaiting
    }

    fn write(&mut self, v: u8) -> bool {
        if self.ring.len() == self.capacity {
            return false;
        }
        self.ring.push(v);
        self.written += 1;
        true
    }

    fn replace(&mut self, v: u8) -> bool {
        if self.ring.len() == self.capacity {
            self.ring.remove(0);
            if self.awaiting > 0 {
                self.awaiting -= 1;
            }
        }
        self.ring.push(v);
        self.written += 1;
        true
    }

    fn read(&mut self) -> Option<u8> {
        if self.unread() == 0 {
            return None;
        }
        let v = self.ring[self.awaiting];
        self.awaiting += 1;
        self.read += 1;
        Some(v)
    }

    fn read_and_ack(&mut self) -> Option<u8> {
        if self.unread() == 0 {
            return None;
        }
        let v = self.ring[self.awaiting];
        self.ring.remove(0);
        self.read += 1;
        Some(v)
    }

    fn ack(&mut self) -> bool {
        if self.awaiting == 0 {
            return false;
        }
        self.awaiting -= 1;
        self.ring.remove(0);
        true
    }

    fn ack_all(&mut self) -> u64 {
        let n = self.awaiting;
        self.ring.drain(..n);
        self.awaiting = 0;
        n as u64
    }

    fn rewind(&mut self) -> u64 {
        let n = self.awaiting;
        self.awaiting = 0;
        n as u64
    }
}

fn assert_agrees(ch: &AckChannel, model: &Model) {
    assert_eq!(ch.len(), model.ring.len() as u64);
    assert_eq!(ch.awaiting_ack(), model.awaiting as u64);
    assert_eq!(ch.unread(), model.unread() as u64);
    assert_eq!(ch.items_written(), model.written);
    assert_eq!(ch.items_read(), model.read);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary operation sequences keep the channel and the reference
    /// model in lockstep, record values included.
    #[test]
    fn prop_accounting_matches_model(
        capacity in 1u64..8,
        ops in prop::collection::vec(op_strategy(), 0..60),
    ) {
        let tmp = TempDir::new().unwrap();
        let ch = AckChannel::open(
            tmp.path().join("chan.ring"),
            ChannelConfig::new(capacity, 8),
        ).unwrap();
        let mut model = Model::new(capacity as usize);

        for op in ops {
            match op {
                Op::Write(v) => {
                    let expected = model.write(v);
                    prop_assert_eq!(ch.write_or_fail(|slot| slot[0] = v), expected);
                }
                Op::Replace(v) => {
                    let expected = model.replace(v);
                    prop_assert_eq!(ch.write_or_replace(|slot| slot[0] = v), expected);
                }
                Op::Read => {
                    let expected = model.read();
                    prop_assert_eq!(ch.read_or_fail().map(|r| r[0]), expected);
                }
                Op::ReadAndAck => {
                    let expected = model.read_and_ack();
                    prop_assert_eq!(ch.read_and_ack_or_fail().map(|r| r[0]), expected);
                }
                Op::Ack => {
                    prop_assert_eq!(ch.ack(), model.ack());
                }
                Op::AckAll => {
                    prop_assert_eq!(ch.ack_all(), model.ack_all());
                }
                Op::Rewind => {
                    prop_assert_eq!(ch.rewind(), model.rewind());
                }
            }

            assert_agrees(&ch, &model);
        }

        // Drain what's left: the surviving records come back in order.
        ch.rewind();
        model.rewind();
        for expected in model.ring {
            prop_assert_eq!(ch.read_and_ack_or_fail().map(|r| r[0]), Some(expected));
        }
        prop_assert!(ch.read_or_fail().is_none());
    }

    /// Closing cleanly and reopening with the same shape recovers every
    /// counter and every record, in order.
    #[test]
    fn prop_reopen_roundtrip(
        values in prop::collection::vec(any::<u8>(), 1..8),
        reads in 0usize..8,
    ) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chan.ring");
        let config = ChannelConfig::new(8, 8);
        let reads = reads.min(values.len());

        {
            let ch = AckChannel::open(&path, config).unwrap();
            for v in &values {
                prop_assert!(ch.write_or_fail(|slot| slot[0] = *v));
            }
            for _ in 0..reads {
                ch.read_or_fail().unwrap();
            }
            ch.close().unwrap();
        }

        let ch = AckChannel::open(&path, config).unwrap();
        prop_assert_eq!(ch.len(), values.len() as u64);
        prop_assert_eq!(ch.awaiting_ack(), reads as u64);
        prop_assert_eq!(ch.unread(), (values.len() - reads) as u64);

        // Re-expose the already-read prefix and drain everything.
        ch.rewind();
        for v in &values {
            prop_assert_eq!(ch.read_and_ack_or_fail().map(|r| r[0]), Some(*v));
        }
        prop_assert!(ch.read_or_fail().is_none());
    }

    /// Acknowledging the k-th record of the awaiting window reports k
    /// records to redeliver and drops exactly the scanned prefix plus the
    /// match from the ring.
    #[test]
    fn prop_ack_match_post_state(
        window in 1u64..7,
        k in 0u64..7,
    ) {
        prop_assume!(k < window);

        let tmp = TempDir::new().unwrap();
        let ch = AckChannel::open(
            tmp.path().join("chan.ring"),
            ChannelConfig::new(8, 8),
        ).unwrap();

        for v in 0..window {
            prop_assert!(ch.write_or_fail(|slot| slot[0] = v as u8));
        }
        for _ in 0..window {
            ch.read_or_fail().unwrap();
        }

        let (matched, resent) = ch.ack_match(|rec| u64::from(rec[0]) == k);
        prop_assert!(matched);
        prop_assert_eq!(resent, k);
        prop_assert_eq!(ch.awaiting_ack(), window - k - 1);
        prop_assert_eq!(ch.len(), window - k - 1);

        // Only the records after the match survive.
        ch.rewind();
        for v in (k + 1)..window {
            prop_assert_eq!(ch.read_and_ack_or_fail().map(|r| r[0]), Some(v as u8));
        }
        prop_assert!(ch.read_or_fail().is_none());
    }

    /// Copy-migration to a different capacity keeps the first
    /// `min(length, new_capacity)` records in logical order and clears
    /// the acknowledgement cursor.
    #[test]
    fn prop_migration_preserves_prefix(
        values in prop::collection::vec(any::<u8>(), 0..10),
        new_capacity in 1u64..12,
        reads in 0usize..10,
    ) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chan.ring");
        let reads = reads.min(values.len());

        {
            let ch = AckChannel::open(&path, ChannelConfig::new(10, 8)).unwrap();
            for v in &values {
                prop_assert!(ch.write_or_fail(|slot| slot[0] = *v));
            }
            for _ in 0..reads {
                ch.read_or_fail().unwrap();
            }
            ch.close().unwrap();
        }

        let ch = AckChannel::open(
            &path,
            ChannelConfig::new(new_capacity, 8).allow_resize(),
        ).unwrap();

        let kept = values.len().min(new_capacity as usize);
        prop_assert_eq!(ch.capacity(), new_capacity);
        prop_assert_eq!(ch.len(), kept as u64);
        prop_assert_eq!(ch.awaiting_ack(), 0);

        for v in &values[..kept] {
            prop_assert_eq!(ch.read_and_ack_or_fail().map(|r| r[0]), Some(*v));
        }
        prop_assert!(ch.read_or_fail().is_none());
    }
}
