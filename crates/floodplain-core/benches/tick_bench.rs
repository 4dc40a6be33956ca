//! Criterion benchmarks for the basin tick.
//!
//! Benchmark groups:
//! - `long_river`: one 500-segment chain under 20 stewards.
//! - `delta`: 200 short tributaries joining a 50-segment trunk.
//! - `snapshot`: serialize / deserialize of the long river.

use criterion::{Criterion, criterion_group, criterion_main};
use floodplain_core::basin::Basin;
use floodplain_core::config::BasinConfig;
use floodplain_core::rng::SimRng;
use floodplain_core::test_utils::*;

/// 200 tributaries of 3 segments each, every one draining into a trunk of
/// 50 segments (cycling through the trunk).
fn build_delta() -> Basin {
    let mut basin = Basin::new(BasinConfig::default()).unwrap();
    let owners: Vec<_> = (0..10)
        .map(|i| basin.add_steward(format!("board-{i}"), 5_000_000))
        .collect();

    let mut trunk = Vec::with_capacity(50);
    for i in 0..50 {
        let node = basin
            .add_segment(format!("trunk-{i:02}"), segment_params(4_000, 200))
            .unwrap();
        if let Some(&prev) = trunk.last() {
            basin.connect(prev, node).unwrap();
        }
        basin.assign_owner(node, owners[i % owners.len()]).unwrap();
        trunk.push(node);
    }

    for t in 0..200 {
        let mut upstream = basin
            .add_source(format!("spring-{t:03}"), 30.0, 10.0)
            .unwrap();
        for k in 0..3 {
            let node = basin
                .add_segment(format!("trib-{t:03}-{k}"), segment_params(500, 0))
                .unwrap();
            basin.connect(upstream, node).unwrap();
            basin.assign_owner(node, owners[t % owners.len()]).unwrap();
            upstream = node;
        }
        basin.connect(upstream, trunk[t % trunk.len()]).unwrap();
    }
    basin
}

fn bench_long_river(c: &mut Criterion) {
    let mut group = c.benchmark_group("long_river");

    group.bench_function("flow_tick_500_segments", |b| {
        let mut basin = river(500, 20, BasinConfig::default());
        let mut rng = SimRng::new(1);
        b.iter(|| basin.flow_tick(&mut rng).unwrap());
    });

    group.bench_function("step_500_segments_raise_everywhere", |b| {
        let mut basin = river(500, 20, BasinConfig::default());
        let mut rng = SimRng::new(2);
        let mut policy = RaiseEverywhere::new(1);
        b.iter(|| basin.step(&mut rng, &mut policy).unwrap());
    });

    group.finish();
}

fn bench_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta");

    group.bench_function("step_850_nodes", |b| {
        let mut basin = build_delta();
        let mut rng = SimRng::new(3);
        b.iter(|| basin.step(&mut rng, &mut DoNothing).unwrap());
    });

    group.bench_function("build_and_order_850_nodes", |b| {
        b.iter(build_delta);
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let mut basin = river(500, 20, BasinConfig::default());
    let mut rng = SimRng::new(4);
    for _ in 0..20 {
        basin.step(&mut rng, &mut DoNothing).unwrap();
    }

    group.bench_function("serialize_500_segments", |b| {
        b.iter(|| basin.serialize().unwrap());
    });

    let data = basin.serialize().unwrap();
    group.bench_function("deserialize_500_segments", |b| {
        b.iter(|| Basin::deserialize(&data).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_long_river, bench_delta, bench_snapshot);
criterion_main!(benches);
