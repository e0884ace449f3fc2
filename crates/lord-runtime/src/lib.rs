//! lord-runtime — the container engine seen from the control plane.
//!
//! The control plane never runs containers itself. It drives an engine
//! through [`ContainerRuntime`]:
//!
//! - [`DockerCli`] shells out to the docker CLI, bounding every call with a
//!   timeout
//! - [`FakeRuntime`] keeps containers in memory and can be scripted to
//!   linger after `stop` or to fail a given operation
//!
//! Engine output is turned into identifiers by the helpers in [`output`].

pub mod docker;
pub mod error;
pub mod fake;
pub mod output;

use std::collections::BTreeSet;
use std::net::IpAddr;

use async_trait::async_trait;

pub use docker::DockerCli;
pub use error::{RuntimeError, RuntimeResult};
pub use fake::{FakeRuntime, RuntimeCall, RuntimeOp};

/// Metadata reported by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMetadata {
    pub id: String,
    pub ip_address: Option<IpAddr>,
}

/// Operations the control plane needs from a container engine.
///
/// Every call may block on engine I/O; implementations are expected to
/// bound that time themselves.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build an image and return the engine's raw build output.
    async fn build(&self, image_reference: &str) -> RuntimeResult<String>;

    /// Start a detached container and return the engine's raw output
    /// (the container id).
    async fn run(&self, image_reference: &str) -> RuntimeResult<String>;

    async fn stop(&self, container_id: &str) -> RuntimeResult<()>;

    async fn remove(&self, container_id: &str) -> RuntimeResult<()>;

    /// Short ids of the containers currently running.
    async fn list_running(&self) -> RuntimeResult<BTreeSet<String>>;

    async fn inspect(&self, resource_id: &str) -> RuntimeResult<ContainerMetadata>;
}
