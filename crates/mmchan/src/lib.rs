//! Persistent, memory-mapped, bounded SPSC ring channels.
//!
//! A channel is a durable hand-off between one producer and one consumer
//! in the same process: the ring's counters and payload live in a file
//! mapped into the address space, so a cleanly closed channel resumes
//! exactly where it left off after a restart.
//!
//! Two persistent variants share one engine:
//!
//! - [`AckChannel`]: reads leave records pinned in an awaiting-ack window
//!   until acknowledged, giving at-least-once delivery across crashes,
//!   [`rewind`](AckChannel::rewind), and out-of-order
//!   [`ack_match`](AckChannel::ack_match) acknowledgement.
//! - [`Channel`]: reads consume in place; smaller header, no redelivery.
//!
//! [`MemoryChannel`] offers the same semantics over a heap buffer when
//! durability is not needed, and [`ReadonlyChannel`] is the inspection
//! view used by the `chan-inspect` binary.
//!
//! # Concurrency
//!
//! Each channel is a monitor: one mutex and two condition variables. Only
//! the `*_or_block` and `wait*` operations suspend; every wake re-checks
//! its predicate and the closed flags. Fill and drain callbacks run with
//! the lock held; do not block or re-enter the channel inside one.
//!
//! # Shutdown
//!
//! The producer calls [`close_writing`](AckChannel::close_writing); the
//! consumer drains until reads return `None`, then calls
//! [`close`](AckChannel::close). Every operation on a closed channel
//! returns an error or a benign "no more" result.
//!
//! # Example
//!
//! ```no_run
//! use mmchan::{AckChannel, ChannelConfig};
//!
//! let ch = AckChannel::open("handoff.ring", ChannelConfig::new(1024, 64))?;
//!
//! ch.write_or_block(|slot| slot[..5].copy_from_slice(b"hello"));
//! let record = ch.read_or_block().unwrap();
//! // ... forward the record downstream ...
//! ch.ack_all();
//! ch.close()?;
//! # Ok::<(), mmchan::ChannelError>(())
//! ```

mod ack;
mod config;
mod error;
mod header;
mod invariants;
mod memory;
mod plain;
mod raw;
mod readonly;

pub use ack::AckChannel;
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use memory::MemoryChannel;
pub use plain::Channel;
pub use readonly::ReadonlyChannel;
