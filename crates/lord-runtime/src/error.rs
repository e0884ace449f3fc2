//! Container runtime error types.

use std::time::Duration;

use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("unexpected {operation} output: {output:?}")]
    MalformedOutput {
        operation: &'static str,
        output: String,
    },

    #[error("container {0} not found")]
    ContainerNotFound(String),
}
