//! Test assertions for executions.

use std::time::Duration;

use crate::execution::{Execution, ExecutionState};

/// Upper bound used by the assertions that wait.
pub const ASSERTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Asserts that the execution finishes with `expected`.
pub fn assert_finished_with<T>(execution: &Execution<T>, expected: &T)
where
    T: Clone + PartialEq + std::fmt::Debug,
{
    match execution.wait_timeout(ASSERTION_TIMEOUT) {
        Ok(actual) => assert_eq!(
            &actual, expected,
            "Expected value {expected:?}, got {actual:?}"
        ),
        Err(e) => panic!("Expected success, got error: {e}"),
    }
}

/// Asserts that the execution fails with a message containing `fragment`.
pub fn assert_failed_with<T>(execution: &Execution<T>, fragment: &str)
where
    T: Clone + std::fmt::Debug,
{
    match execution.wait_timeout(ASSERTION_TIMEOUT) {
        Ok(value) => panic!("Expected failure, got value: {value:?}"),
        Err(e) => {
            assert!(!e.is_timeout(), "Execution did not finish: {e}");
            assert!(
                e.to_string().contains(fragment),
                "Expected error containing '{fragment}', got '{e}'"
            );
            assert_eq!(execution.state(), ExecutionState::Failed);
        }
    }
}

/// Asserts that the execution was terminated.
pub fn assert_terminated<T>(execution: &Execution<T>)
where
    T: Clone + std::fmt::Debug,
{
    match execution.wait_timeout(ASSERTION_TIMEOUT) {
        Ok(value) => panic!("Expected termination, got value: {value:?}"),
        Err(e) => assert!(e.is_termination(), "Expected termination, got '{e}'"),
    }
    assert_eq!(execution.state(), ExecutionState::Terminated);
}

/// Asserts that the execution has not reached a terminal state.
pub fn assert_running<T>(execution: &Execution<T>) {
    assert!(
        !execution.is_finished(),
        "Expected running execution, got state: {:?}",
        execution.state()
    );
}
