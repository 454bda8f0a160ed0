//! Error types for laneq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The task was rejected before it reached a lane.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no tokio runtime available to drain lanes")]
    NoRuntime,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a submitted task did not produce a value.
///
/// Delivered only to the caller holding that task's completion handle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError<E> {
    /// The action ran and returned its own failure, passed through as-is.
    #[error("task failed: {0:?}")]
    Failed(E),

    #[error("task panicked: {0}")]
    Panicked(String),

    /// The drain was torn down (runtime shutdown) before the task settled.
    #[error("task abandoned before it settled")]
    Abandoned,
}

impl<E> TaskError<E> {
    /// The action's own failure, if that is what happened.
    pub fn into_failure(self) -> Option<E> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }
}
