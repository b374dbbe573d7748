//! Hot-path benchmarks: single-record hand-off through the persistent
//! ack channel and the heap-backed channel.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use mmchan::{AckChannel, ChannelConfig, MemoryChannel};
use std::hint::black_box;
use tempfile::TempDir;

fn bench_ack_channel(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let ch = AckChannel::open(
        tmp.path().join("bench.ring"),
        ChannelConfig::new(1024, 8),
    )
    .unwrap();

    let mut group = c.benchmark_group("ack_channel");
    group.throughput(Throughput::Elements(1));

    group.bench_function("write_read_and_ack", |b| {
        b.iter(|| {
            ch.write_or_fail(|slot| slot[0] = 1);
            black_box(ch.read_and_ack_or_fail());
        });
    });

    group.bench_function("write_read_ack_all", |b| {
        b.iter(|| {
            ch.write_or_fail(|slot| slot[0] = 1);
            black_box(ch.read_or_fail());
            ch.ack_all();
        });
    });

    group.finish();
}

fn bench_memory_channel(c: &mut Criterion) {
    let ch = MemoryChannel::new(1024, 8);

    let mut group = c.benchmark_group("memory_channel");
    group.throughput(Throughput::Elements(1));

    group.bench_function("write_read", |b| {
        b.iter(|| {
            ch.write_or_fail(|slot| slot[0] = 1);
            black_box(ch.read_or_fail());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ack_channel, bench_memory_channel);
criterion_main!(benches);
