use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use matchgate::{
    DedupeKey, MatchDeduper, NullSomTracker, ReportDescriptor, ReportTableBuilder, ScanSession,
    SomStart,
};
use std::ops::ControlFlow;

const EVENTS_PER_ITER: u64 = 10_000;

// Simple xorshift for reproducible random keys.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

fn keyed_report(dkey: u32) -> ReportDescriptor {
    ReportDescriptor {
        dkey: Some(DedupeKey(dkey)),
        ..ReportDescriptor::external(dkey)
    }
}

// ============================================================================
// 1. Deduper advance cost
// ============================================================================

fn bench_deduper_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedupe/advance");
    group.throughput(Throughput::Elements(EVENTS_PER_ITER));

    for &key_count in &[64u32, 1024, 16384] {
        let mut rng = XorShift64::new(0x5eed_cafe);
        let events: Vec<(u64, u32)> = (0..EVENTS_PER_ITER)
            .map(|i| (i, (rng.next_u64() % u64::from(key_count)) as u32))
            .collect();

        // One event per byte: the contiguous-step fast path.
        group.bench_with_input(
            BenchmarkId::new("contiguous", key_count),
            &events,
            |b, events| {
                b.iter(|| {
                    let mut deduper = MatchDeduper::new(key_count);
                    let mut som = NullSomTracker;
                    for &(offset, dkey) in events {
                        let report = keyed_report(dkey);
                        black_box(deduper.advance_and_check(
                            black_box(offset),
                            SomStart::At(0),
                            offset,
                            &report,
                            false,
                            &mut som,
                        ));
                    }
                })
            },
        );

        // Bursts at one offset: the dupe-suppression path dominates.
        group.bench_with_input(
            BenchmarkId::new("bursty", key_count),
            &events,
            |b, events| {
                b.iter(|| {
                    let mut deduper = MatchDeduper::new(key_count);
                    let mut som = NullSomTracker;
                    for &(offset, dkey) in events {
                        let offset = offset / 16;
                        let report = keyed_report(dkey);
                        black_box(deduper.advance_and_check(
                            black_box(offset),
                            SomStart::At(0),
                            offset,
                            &report,
                            false,
                            &mut som,
                        ));
                    }
                })
            },
        );
    }

    group.finish();
}

// ============================================================================
// 2. Full pipeline acceptance cost
// ============================================================================

fn bench_pipeline_accept(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/accept");
    group.throughput(Throughput::Elements(EVENTS_PER_ITER));

    let mut builder = ReportTableBuilder::new();
    let checkless = builder.push(ReportDescriptor::external(0));
    let dkey = builder.dedupe_key(0);
    let keyed = builder.push(ReportDescriptor {
        dkey: Some(dkey),
        ..ReportDescriptor::external(1)
    });
    let table = builder.build();

    for (name, id, fast) in [
        ("checkless_fast", checkless, true),
        ("checkless_checked", checkless, false),
        ("deduped", keyed, false),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut cb = |user_id: u32, _: u64, to: u64, _: u32| {
                    black_box((user_id, to));
                    ControlFlow::Continue(())
                };
                let mut session = ScanSession::new(&table, &mut cb);
                let mut som = NullSomTracker;
                for offset in 0..EVENTS_PER_ITER {
                    black_box(session.accept_match(
                        &mut som,
                        black_box(offset),
                        id,
                        fast,
                        false,
                    ));
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_deduper_advance, bench_pipeline_accept);
criterion_main!(benches);
