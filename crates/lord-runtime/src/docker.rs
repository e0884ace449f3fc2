//! Docker CLI adapter.
//!
//! Each operation spawns one engine command and waits for it, bounded by
//! the configured call timeout. A timed-out child is killed on drop.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use lord_core::RuntimeSettings;

use crate::error::{RuntimeError, RuntimeResult};
use crate::output::{parse_ip, parse_running};
use crate::{ContainerMetadata, ContainerRuntime};

const INSPECT_IP_FORMAT: &str = "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}";

/// Drives a docker-compatible CLI (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    build_context: PathBuf,
    call_timeout: Duration,
}

impl DockerCli {
    pub fn new(settings: &RuntimeSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            build_context: settings.build_context.clone(),
            call_timeout: settings.call_timeout(),
        }
    }

    /// Directory holding the build context for an image.
    pub fn context_dir(&self, image_reference: &str) -> PathBuf {
        self.build_context.join(image_reference)
    }

    /// Run the CLI with `args` and return its stdout.
    async fn exec(&self, args: &[&str]) -> RuntimeResult<String> {
        let command = format!("{} {}", self.binary, args.join(" "));
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);

        debug!(%command, "running engine command");
        let output = tokio::time::timeout(self.call_timeout, cmd.output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                command: command.clone(),
                after: self.call_timeout,
            })?
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build(&self, image_reference: &str) -> RuntimeResult<String> {
        let context = self.context_dir(image_reference);
        let context = context.to_string_lossy();
        self.exec(&["build", "-q", "-t", image_reference, &*context])
            .await
    }

    async fn run(&self, image_reference: &str) -> RuntimeResult<String> {
        self.exec(&["run", "-d", image_reference]).await
    }

    async fn stop(&self, container_id: &str) -> RuntimeResult<()> {
        self.exec(&["stop", container_id]).await?;
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> RuntimeResult<()> {
        self.exec(&["rm", container_id]).await?;
        Ok(())
    }

    async fn list_running(&self) -> RuntimeResult<BTreeSet<String>> {
        let output = self.exec(&["ps", "-q"]).await?;
        Ok(parse_running(&output))
    }

    async fn inspect(&self, resource_id: &str) -> RuntimeResult<ContainerMetadata> {
        let output = self
            .exec(&["inspect", "--format", INSPECT_IP_FORMAT, resource_id])
            .await?;
        Ok(ContainerMetadata {
            id: resource_id.to_string(),
            ip_address: parse_ip(&output),
        })
    }
}
