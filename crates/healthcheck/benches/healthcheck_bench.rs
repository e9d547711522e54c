use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use healthcheck::{HealthProbe, HealthTracker, ProbeOutcome, TcpProbe, Thresholds};
use std::hint::black_box;
use std::time::Duration;

fn tcp_probe_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tcp_probe");

    // Connection refused path
    let probe = TcpProbe::new();

    group.bench_function("tcp_connection_refused", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            rt.block_on(async {
                black_box(probe.probe("127.0.0.1", 1, Duration::from_millis(100)).await)
            })
        });
    });

    group.finish();
}

fn tracker_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker");

    for flap_every in [2usize, 5, 50].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(flap_every),
            flap_every,
            |b, &flap_every| {
                b.iter(|| {
                    let mut tracker = HealthTracker::new(Thresholds {
                        success: 3,
                        failure: 3,
                    });
                    for i in 0..1_000 {
                        let outcome = if i % flap_every == 0 {
                            ProbeOutcome::Failure
                        } else {
                            ProbeOutcome::Success
                        };
                        black_box(tracker.record(outcome));
                    }
                    tracker
                })
            },
        );
    }

    group.finish();
}

fn concurrent_probes_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_probes");
    group.sample_size(10);

    for count in [1, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            b.iter(|| {
                rt.block_on(async move {
                    let mut handles = vec![];

                    for _ in 0..count {
                        handles.push(tokio::spawn(async move {
                            TcpProbe::new()
                                .probe("127.0.0.1", 1, Duration::from_millis(100))
                                .await
                        }));
                    }

                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                })
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    tcp_probe_benchmark,
    tracker_benchmark,
    concurrent_probes_benchmark,
);

criterion_main!(benches);
