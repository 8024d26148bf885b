//! Context Building Benchmarks
//!
//! Measures the per-request cost of assembling a context and of dispatching
//! a tool call with and without context injection.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use solidctx::{
    Context, ContextEngineBuilder, ContextFactory, LifespanState, PeerCapabilities, RequestMeta,
    ServerIdentity,
};
use std::sync::Arc;

fn benchmark_build_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_context");

    let factory = ContextFactory::initialize(
        ServerIdentity::new("bench", "1.0.0"),
        Arc::new(LifespanState::new()),
    );
    factory.record_peer_capabilities(PeerCapabilities::with_sampling());

    group.bench_function("without_meta", |b| {
        b.iter(|| black_box(factory.build_context(None)))
    });

    let meta = RequestMeta::with_progress_token("bench-token");
    group.bench_function("with_meta", |b| {
        b.iter(|| black_box(factory.build_context(Some(meta.clone()))))
    });

    group.finish();
}

fn benchmark_tool_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("tool_dispatch");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let engine = runtime.block_on(
        ContextEngineBuilder::new("bench", "1.0.0")
            .with_tool("args_only", |args: Value| async move {
                Ok::<Value, anyhow::Error>(args)
            })
            .with_tool("with_context", |args: Value, ctx: Context| async move {
                Ok::<Value, anyhow::Error>(json!({
                    "args": args,
                    "request_id": ctx.request_id().to_string(),
                }))
            })
            .build(),
    );

    for name in ["args_only", "with_context"] {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": name, "arguments": {"message": "hello world"}}
        });
        group.bench_function(name, |b| {
            b.iter(|| runtime.block_on(engine.handle_message(black_box(message.clone()))))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_build_context, benchmark_tool_dispatch);
criterion_main!(benches);
