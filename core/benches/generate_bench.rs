use criterion::{Criterion, criterion_group, criterion_main};
use ctbench_core::operation::Operation;
use std::hint::black_box;

// Generation has to stay negligible next to the builds it feeds.
fn bench_generate(c: &mut Criterion) {
    for op in Operation::ALL {
        c.bench_function(&format!("generate_{}_100", op), |b| {
            b.iter(|| {
                let text = op.generate(black_box(100)).render();
                black_box(text);
            })
        });
    }
}

criterion_group!(generate, bench_generate);
criterion_main!(generate);
