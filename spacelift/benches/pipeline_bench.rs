//! Benchmarks for chain processing and execution round trips.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spacelift::execution::{ExecutionService, TaskContext};
use spacelift::tasks::{DynChain, ErasedTask, FnTask, Task, TaskExt};
use spacelift::testing::{LengthTool, UppercaseTool};

fn chain_benchmark(c: &mut Criterion) {
    let ctx = TaskContext::detached();

    c.bench_function("typed_chain_process", |b| {
        let mut chain = UppercaseTool::default()
            .then_with(LengthTool)
            .then_with(FnTask::new(|n: usize, _: &TaskContext| Ok(n * 2)));
        b.iter(|| chain.process(black_box("spacelift".to_string()), &ctx));
    });

    c.bench_function("dyn_chain_process", |b| {
        let mut chain = DynChain::new(Box::new(ErasedTask::new(UppercaseTool::default())))
            .then(Box::new(ErasedTask::new(LengthTool)))
            .expect("shapes match");
        b.iter(|| chain.run::<String, usize>(black_box("spacelift".to_string()), &ctx));
    });
}

fn execution_benchmark(c: &mut Criterion) {
    let service = ExecutionService::new().expect("service starts");

    c.bench_function("execute_and_wait", |b| {
        b.iter(|| {
            service
                .execute(|_ctx: &TaskContext| Ok(black_box(42)))
                .wait()
        });
    });

    service.shutdown();
}

criterion_group!(benches, chain_benchmark, execution_benchmark);
criterion_main!(benches);
