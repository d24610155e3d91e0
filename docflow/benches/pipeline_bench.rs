//! Benchmarks for the ingestion pipeline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docflow::pipeline::ProcessingOrchestrator;
use docflow::resilience::{CircuitBreaker, CircuitBreakerConfig};
use docflow::testing::{
    fast_config, invoice_fields, invoice_request, invoice_schema, ScriptedExtractor,
    ScriptedParser, ScriptedStore,
};
use std::sync::Arc;
use std::time::Duration;

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    let orchestrator = ProcessingOrchestrator::builder(
        Arc::new(ScriptedExtractor::returning("Invoice INV-1001 from Acme Corp")),
        Arc::new(ScriptedParser::returning(invoice_fields())),
        Arc::new(ScriptedStore::new()),
    )
    .config(fast_config(3, 5))
    .schema(invoice_schema())
    .build()
    .unwrap();

    c.bench_function("happy_path_job", |b| {
        b.iter(|| runtime.block_on(orchestrator.submit(black_box(invoice_request()))));
    });

    let breaker = CircuitBreaker::new(
        "bench",
        CircuitBreakerConfig::new(5, Duration::from_secs(60)),
    )
    .unwrap();
    c.bench_function("breaker_acquire_complete", |b| {
        b.iter(|| {
            let permit = breaker.acquire().unwrap();
            permit.complete(black_box(true));
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
