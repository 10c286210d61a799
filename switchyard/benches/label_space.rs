use criterion::{black_box, BatchSize, Criterion};

use switchyard::metrics::{LabelValues, Space};

pub fn label_space(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("label_space");

    let unlabelled = LabelValues::new();
    group.bench_function("observe unlabelled", |bencher| {
        let space = Space::default();
        bencher.iter(|| space.observe("latency", &unlabelled, black_box(1.5)))
    });

    let labelled = LabelValues::new().with(&["method", "checkout", "outcome", "success"]);
    group.bench_function("observe labelled", |bencher| {
        let space = Space::default();
        bencher.iter(|| space.observe("latency", &labelled, black_box(1.5)))
    });

    group.bench_function("walk 1000 series", |bencher| {
        bencher.iter_batched(
            || {
                let space = Space::default();
                for i in 0..1000 {
                    let shard = i.to_string();
                    space.add("requests", &LabelValues::new().with(&["shard", &shard]), 1.0);
                }
                space
            },
            |space| {
                let mut series = 0;
                space.walk(|_name: &str, _labels: &LabelValues, _values: &[f64]| {
                    series += 1;
                    true
                });
                black_box(series)
            },
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion::criterion_group!(benches, label_space);
criterion::criterion_main! {
    benches,
}
