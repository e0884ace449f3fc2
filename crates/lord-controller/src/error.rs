//! Controller error types.

use thiserror::Error;

use lord_runtime::RuntimeError;
use lord_state::EntityError;

pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error("container runtime: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("instance {instance_id} still running after {attempts} stop attempts")]
    TeardownTimeout { instance_id: String, attempts: u32 },
}

impl ControllerError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::Entity(err) => err.kind(),
            ControllerError::Runtime(_) => "runtime",
            ControllerError::TeardownTimeout { .. } => "teardown_timeout",
        }
    }
}
