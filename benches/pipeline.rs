//! Pipeline benchmarks

use arrow::array::{ArrayRef, Int64Array, StringArray};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use vector_engine::planner::{JoinType, SortExpr};
use vector_engine::{ExecutionContext, Expr, LogicalOperator, LogicalType, MemoryTable};

fn create_table(name: &str, rows: usize) -> Arc<MemoryTable> {
    let mut rng = StdRng::seed_from_u64(7);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(0..rows as i64)),
        Arc::new(Int64Array::from_iter_values(
            (0..rows).map(|_| rng.gen_range(0..1000)),
        )),
        Arc::new(StringArray::from_iter_values(
            (0..rows).map(|i| format!("k{}", i % 97)),
        )),
    ];
    Arc::new(MemoryTable::try_new(name, columns).unwrap())
}

fn benchmark_sort(c: &mut Criterion) {
    let ctx = ExecutionContext::new();
    let mut group = c.benchmark_group("prune_order_prune");
    group.sample_size(10);

    for rows in [10_000, 100_000] {
        let plan = LogicalOperator::scan(create_table("t", rows))
            .unwrap()
            .order(vec![SortExpr::new(Expr::column(1, LogicalType::BigInt))])
            .unwrap()
            .prune_columns(2)
            .unwrap();
        group.bench_with_input(BenchmarkId::new("rows", rows), &plan, |b, plan| {
            b.iter(|| {
                let result = ctx.execute(plan).unwrap();
                black_box(result.row_count);
            });
        });
    }

    group.finish();
}

fn benchmark_mark_join(c: &mut Criterion) {
    let ctx = ExecutionContext::new();
    let key = Expr::column(2, LogicalType::Varchar);
    let plan = LogicalOperator::scan(create_table("probe", 100_000))
        .unwrap()
        .join(
            LogicalOperator::scan(create_table("build", 50)).unwrap(),
            JoinType::Mark,
            vec![(key.clone(), key)],
        )
        .unwrap();

    c.bench_function("mark_join", |b| {
        b.iter(|| {
            let result = ctx.execute(&plan).unwrap();
            black_box(result.row_count);
        });
    });
}

criterion_group!(benches, benchmark_sort, benchmark_mark_join);
criterion_main!(benches);
