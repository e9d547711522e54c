use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use healthcheck::{HealthState, Thresholds};
use std::hint::black_box;
use turn_balancer::types::Algorithm;
use turn_balancer::{EndpointSnapshot, Selector, StatusView};

fn pool(size: usize) -> Vec<EndpointSnapshot> {
    (0..size)
        .map(|i| EndpointSnapshot {
            index: i,
            private_address: format!("10.0.{}.{}", i / 256, i % 256),
            public_address: format!("turn{}.example.com", i),
            // Every third endpoint down, every fifth unscored
            state: if i % 3 == 0 {
                HealthState::Unhealthy
            } else {
                HealthState::Healthy
            },
            consecutive_successes: 3,
            consecutive_failures: 0,
            thresholds: Thresholds {
                success: 3,
                failure: 3,
            },
            total_probes: 10,
            successful_probes: 10,
            load_score: (i % 5 != 0).then(|| ((i * 7919) % 1000) as f64 / 10.0),
            last_probe: None,
            last_metrics: None,
        })
        .collect()
}

fn selection_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    for size in [3usize, 30, 300].iter() {
        let snapshot = pool(*size);
        for algorithm in [Algorithm::Metrics, Algorithm::Random] {
            let selector = Selector::new(algorithm);
            group.bench_with_input(
                BenchmarkId::new(algorithm.as_str(), size),
                &snapshot,
                |b, snapshot| b.iter(|| black_box(selector.select(snapshot))),
            );
        }
    }

    group.finish();
}

fn status_view_benchmark(c: &mut Criterion) {
    let snapshot = pool(30);
    let selection = Selector::new(Algorithm::Metrics).select(&snapshot);

    c.bench_function("status_view_json", |b| {
        b.iter(|| {
            let view = StatusView::build(&snapshot, &selection);
            black_box(serde_json::to_string(&view))
        })
    });
}

criterion_group!(benches, selection_benchmark, status_view_benchmark);
criterion_main!(benches);
