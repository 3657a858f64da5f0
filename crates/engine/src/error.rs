//! The module contains the errors the engine can return.
//!
//! - [`TaskError`] a budget computation could not run on its input.
//! - [`DispatchError`] a request to the background worker did not produce a
//!   result.
//!
//! [`TaskError`]: TaskError
//! [`DispatchError`]: DispatchError
use api_types::worker::TaskKind;
use thiserror::Error;

/// Errors raised by the pure budget computations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Invalid date: \"{0}\"")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Errors returned by [`Dispatcher`](crate::Dispatcher) calls.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// The worker thread never started or has exited.
    #[error("Background worker unavailable")]
    WorkerUnavailable,
    /// The task ran and failed; carries the worker's error message.
    #[error("{0}")]
    Compute(String),
    #[error("A {0} request is already in flight")]
    Busy(TaskKind),
    #[error("Expected a {expected} result, got {got}")]
    UnexpectedResponse { expected: TaskKind, got: TaskKind },
}
