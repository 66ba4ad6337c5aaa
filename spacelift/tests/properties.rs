//! End-to-end behavior of executions, chains, the registry and shutdown hooks.

use pretty_assertions::assert_eq;
use spacelift::cancellation::ShutdownHooks;
use spacelift::errors::SpaceliftError;
use spacelift::execution::{Execution, ExecutionService, ExecutionState, TaskContext};
use spacelift::tasks::{DynTask, FnTask, Task, TaskExt};
use spacelift::testing::{
    assert_finished_with, assert_running, assert_terminated, BrokenTool, LengthTool, SlowTask,
    UppercaseTool,
};
use spacelift::tools::{Tool, ToolRegistry};
use spacelift::{Pipeline, Spacelift};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

fn registry() -> ToolRegistry {
    let registry = ToolRegistry::new();
    registry
        .register::<UppercaseTool>()
        .unwrap()
        .register::<LengthTool>()
        .unwrap();
    registry
}

fn spacelift() -> Spacelift {
    Spacelift::new(ExecutionService::new().unwrap(), Arc::new(registry()))
}

#[test]
fn every_lookup_builds_a_fresh_instance() {
    let registry = registry();

    let by_type = [
        registry.find::<UppercaseTool>().unwrap(),
        registry.find::<UppercaseTool>().unwrap(),
    ];
    assert_ne!(by_type[0].instance(), by_type[1].instance());

    for alias in UppercaseTool::aliases() {
        let first = registry.find_alias(alias).unwrap();
        let second = registry.find_alias(alias).unwrap();
        assert_eq!(first.name(), "UppercaseTool");
        assert!(!std::ptr::eq(
            std::ptr::addr_of!(*first).cast::<u8>(),
            std::ptr::addr_of!(*second).cast::<u8>()
        ));
    }
}

#[test]
fn tool_without_aliases_is_rejected_and_leaves_registry_untouched() {
    let registry = registry();
    let before = registry.all_tools();

    assert!(registry.register::<BrokenTool>().is_err());
    assert!(!registry.contains::<BrokenTool>());
    assert_eq!(registry.all_tools().len(), before.len());
}

#[test]
fn unknown_lookups_are_absent() {
    let registry = ToolRegistry::new();
    assert!(registry.find::<LengthTool>().is_none());
    assert!(registry.find_alias("len").is_none());
    assert!(registry.find_typed::<String, usize>("len").is_none());
}

#[test]
fn finished_execution_keeps_its_value() {
    let service = ExecutionService::new().unwrap();
    let (release, gate) = mpsc::channel::<()>();

    let execution = service.execute(move |_ctx: &TaskContext| {
        gate.recv().ok();
        Ok(vec![1, 2, 3])
    });
    assert_running(&execution);

    release.send(()).unwrap();
    assert_eq!(execution.wait().unwrap(), vec![1, 2, 3]);
    assert!(execution.is_finished());
    assert_eq!(execution.wait().unwrap(), vec![1, 2, 3]);
    assert_eq!(execution.state(), ExecutionState::Finished);

    service.shutdown();
}

#[test]
fn wait_timeout_leaves_work_running() {
    let service = ExecutionService::new().unwrap();
    let execution = service.execute(|ctx: &TaskContext| SlowTask::with_delay_ms(300).process(7, ctx));

    let err = execution.wait_timeout(Duration::from_millis(20)).unwrap_err();
    assert!(err.is_timeout());
    assert!(!execution.is_finished());

    assert_finished_with(&execution, &7);
    service.shutdown();
}

#[test]
fn terminate_after_finish_is_a_no_op() {
    let service = ExecutionService::new().unwrap();
    let execution = service.execute(|_ctx: &TaskContext| Ok("done".to_string()));
    assert_finished_with(&execution, &"done".to_string());

    execution.terminate();
    assert_eq!(execution.state(), ExecutionState::Finished);
    assert_eq!(execution.wait().unwrap(), "done");

    service.shutdown();
}

#[test]
fn terminate_interrupts_cooperative_work() {
    let service = ExecutionService::new().unwrap();
    let execution = service.execute(|ctx: &TaskContext| SlowTask::with_delay_ms(10_000).process((), ctx));

    execution.terminate();
    assert_terminated(&execution);
    service.shutdown();
}

#[test]
fn chain_equals_sequential_processing() {
    let registry = registry();
    let ctx = TaskContext::detached();

    for input in ["", "abc", "Grüße", "mixed Case 42"] {
        let mut chain = registry
            .find::<UppercaseTool>()
            .unwrap()
            .then_with(registry.find::<LengthTool>().unwrap());
        let chained = chain.process(input.to_string(), &ctx).unwrap();

        let upper = registry
            .find::<UppercaseTool>()
            .unwrap()
            .process(input.to_string(), &ctx)
            .unwrap();
        let sequential = registry.find::<LengthTool>().unwrap().process(upper, &ctx).unwrap();

        assert_eq!(chained, sequential, "input {input:?}");
    }
}

#[test]
fn schedule_never_starts_early() {
    let service = ExecutionService::new().unwrap();
    let delay = Duration::from_millis(100);
    let submitted = Instant::now();

    let scheduled = service.schedule(move |_ctx: &TaskContext| Ok(submitted.elapsed()), delay);
    let immediate = service.schedule(|_ctx: &TaskContext| Ok(1), Duration::ZERO);
    let direct = service.execute(|_ctx: &TaskContext| Ok(2));

    assert!(scheduled.wait().unwrap() >= delay);
    assert_eq!(immediate.wait().unwrap(), 1);
    assert_eq!(direct.wait().unwrap(), 2);

    service.shutdown();
}

#[test]
fn unbounded_delays_and_waits_do_not_panic() {
    let service = ExecutionService::new().unwrap();
    let never = service.schedule(|_ctx: &TaskContext| Ok(1), Duration::MAX);
    assert_running(&never);
    assert_eq!(service.pending_scheduled(), 1);

    let quick = service.execute(|_ctx: &TaskContext| Ok(2));
    assert_eq!(quick.wait_timeout(Duration::MAX).unwrap(), 2);

    service.shutdown();
    let err = never.wait_timeout(Duration::MAX).unwrap_err();
    assert!(!err.is_timeout());
    assert_eq!(never.state(), ExecutionState::Failed);
}

#[test]
fn missing_working_directory_is_rejected() {
    let service = ExecutionService::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    service.set_working_directory(Some(dir.path())).unwrap();

    let err = service
        .set_working_directory(Some(dir.path().join("missing")))
        .unwrap_err();
    assert!(matches!(err, SpaceliftError::InvalidArgument { .. }));
    assert_eq!(service.working_directory().as_deref(), Some(dir.path()));

    service.shutdown();
}

#[test]
fn guarded_finished_execution_is_never_terminated() {
    let service = ExecutionService::new().unwrap();
    let hooks = ShutdownHooks::new();
    let observed_cancel = Arc::new(AtomicBool::new(false));

    let flag = observed_cancel.clone();
    let execution = service.execute(move |ctx: &TaskContext| {
        ctx.token().on_cancel(move || flag.store(true, Ordering::SeqCst));
        Ok(1)
    });
    hooks.guard(&execution);
    assert_finished_with(&execution, &1);

    assert_eq!(hooks.run(), 0);
    assert_eq!(execution.state(), ExecutionState::Finished);
    assert!(!observed_cancel.load(Ordering::SeqCst));

    service.shutdown();
}

#[test]
fn guarded_running_execution_is_terminated_when_hooks_drop() {
    let service = ExecutionService::new().unwrap();
    let running: Execution<()>;
    let marked: Execution<()>;
    {
        let hooks = ShutdownHooks::new();
        running = service.execute(|ctx: &TaskContext| SlowTask::with_delay_ms(10_000).process((), ctx));
        marked = service.execute(|ctx: &TaskContext| SlowTask::with_delay_ms(200).process((), ctx));
        marked.mark_as_finished();
        hooks.guard(&running);
        hooks.guard(&marked);
    }

    assert_terminated(&running);
    assert_finished_with(&marked, &());
    service.shutdown();
}

#[test]
fn pipeline_from_value_through_aliases() {
    let spacelift = spacelift();
    let pipeline: Pipeline<_> = spacelift
        .task_from::<_, UppercaseTool>("spacelift".to_string())
        .unwrap()
        .then_alias::<usize>("length")
        .unwrap();

    assert_finished_with(&pipeline.execute(), &9);
    spacelift.shutdown();
}

#[test]
fn shutdown_fails_pending_scheduled_work() {
    let service = ExecutionService::new().unwrap();
    let execution = service.schedule(|_ctx: &TaskContext| Ok(1), Duration::from_secs(60));

    service.shutdown();
    assert!(execution.wait_timeout(Duration::from_secs(5)).is_err());
    assert!(execution.is_finished());
}

#[tokio::test]
async fn executions_complete_asynchronously() {
    let service = ExecutionService::new().unwrap();
    let executions: Vec<Execution<u64>> = (0..8u64)
        .map(|n| {
            let mut double = FnTask::new(|x: u64, _: &TaskContext| Ok(x * 2));
            service.execute(move |ctx: &TaskContext| double.process(n, ctx))
        })
        .collect();

    let results = futures::future::join_all(executions.iter().map(Execution::completion)).await;
    let values: Vec<u64> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, vec![0, 2, 4, 6, 8, 10, 12, 14]);

    service.shutdown();
}
