//! Testing utilities for spacelift pipelines.
//!
//! This module provides:
//! - Mock tasks and tools
//! - Assertions on execution outcomes

mod assertions;
mod mocks;

pub use assertions::{
    assert_failed_with, assert_finished_with, assert_running, assert_terminated,
    ASSERTION_TIMEOUT,
};
pub use mocks::{BrokenTool, FailingTask, LengthTool, RecordingTask, SlowTask, UppercaseTool};
