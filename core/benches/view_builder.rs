//! Benchmarks for view derivation on snapshot delivery.

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use shared_todos_core::batch::TodoBatches;
use shared_todos_core::todo::{Deadline, Todo, TodoId};
use shared_todos_core::view::TodoViews;

fn snapshot(size: usize) -> Vec<Todo> {
    (0..size)
        .map(|i| {
            let todo = Todo::new(TodoId::new(), format!("todo {i}"), 0).with_done(i % 3 == 0);
            let day = u32::try_from(i % 28).unwrap_or(0) + 1;
            match Deadline::from_ymd(2025, 6, day) {
                Some(deadline) if i % 2 == 0 => todo.with_deadline(deadline),
                _ => todo,
            }
        })
        .collect()
}

fn bench_build_views(c: &mut Criterion) {
    let mut group = c.benchmark_group("views");
    for size in [10, 100, 1_000] {
        let todos = snapshot(size);
        group.bench_with_input(BenchmarkId::new("build", size), &todos, |b, todos| {
            b.iter(|| TodoViews::build(black_box(todos)));
        });
    }
    group.finish();
}

fn bench_bulk_batches(c: &mut Criterion) {
    let todos = snapshot(1_000);
    c.bench_function("batches/toggle_all_1000", |b| {
        b.iter(|| TodoBatches::toggle_all(black_box(&todos)));
    });
    c.bench_function("batches/delete_completed_1000", |b| {
        b.iter(|| TodoBatches::delete_completed(black_box(&todos)));
    });
}

criterion_group!(benches, bench_build_views, bench_bulk_batches);
criterion_main!(benches);
