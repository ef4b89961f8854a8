//! Benchmarks for snapshot application and decoding
//!
//! Run with: cargo bench --bench store_apply

use std::hint::black_box;

use battle_sync::network::codec::{self, WireFormat};
use battle_sync::store::{BattleStore, BattleStoreHandle};
use battle_sync::{Battle, BattleId, Participant, Phase, StreamId, UserId, WireSnapshot};
use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn snapshot(score_a: u64, score_b: u64) -> Battle {
    let participant = |id: &str, score| Participant {
        user_id: UserId::new(id),
        username: id.to_owned(),
        avatar: None,
        score,
        gift_value: 0.0,
    };
    Battle {
        id: BattleId::new("bench"),
        stream_id: StreamId::new("s1"),
        phase: Phase::Active,
        participant_a: participant("alice", score_a),
        participant_b: participant("bob", score_b),
        duration_secs: 120,
        started_at: Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).single(),
        ended_at: None,
        winner_id: None,
        sequence: None,
    }
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("BattleStore::apply");

    group.bench_function("score_update", |b| {
        let mut store = BattleStore::new();
        let mut score = 0;
        b.iter(|| {
            score += 1;
            black_box(store.apply(snapshot(score, 0)))
        });
    });

    group.bench_function("duplicate", |b| {
        let mut store = BattleStore::new();
        let _ = store.apply(snapshot(5, 5));
        b.iter(|| black_box(store.apply(snapshot(5, 5))));
    });

    group.bench_function("rejected_regression", |b| {
        let mut store = BattleStore::new();
        let _ = store.apply(snapshot(50, 50));
        b.iter(|| black_box(store.apply(snapshot(1, 1))));
    });

    group.finish();
}

fn bench_handle_listeners(c: &mut Criterion) {
    let mut group = c.benchmark_group("BattleStoreHandle::apply");

    for listeners in [0usize, 1, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("listeners", listeners),
            &listeners,
            |b, &listeners| {
                let store = BattleStoreHandle::new();
                let _guards: Vec<_> = (0..listeners)
                    .map(|_| store.subscribe(|change| {
                        black_box(change);
                    }))
                    .collect();
                let mut score = 0;
                b.iter(|| {
                    score += 1;
                    black_box(store.apply(snapshot(score, 0)))
                });
            },
        );
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_snapshot");
    let wire = WireSnapshot::from(&snapshot(10, 20));

    for format in [WireFormat::Json, WireFormat::Binary] {
        let bytes = codec::encode_snapshot(format, &wire).unwrap_or_default();
        group.bench_with_input(
            BenchmarkId::new("format", format!("{format:?}")),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    let wire = codec::decode_snapshot(format, black_box(bytes));
                    black_box(wire.ok().map(Battle::try_from))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_apply, bench_handle_listeners, bench_decode);
criterion_main!(benches);
