//! In-memory container engine for tests and dry runs.
//!
//! Containers live in a map. `stop` does not take effect at once: a stopped
//! container keeps showing up in `list_running` for a configurable number of
//! polls, which is how a slow engine looks to the teardown loop.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{RuntimeError, RuntimeResult};
use crate::output::SHORT_ID_LEN;
use crate::{ContainerMetadata, ContainerRuntime};

/// Runtime operation kinds, for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    Build,
    Run,
    Stop,
    Remove,
    ListRunning,
    Inspect,
}

/// One recorded call and its argument (empty for `ListRunning`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    pub op: RuntimeOp,
    pub arg: String,
}

#[derive(Debug)]
struct FakeContainer {
    image: String,
    running: bool,
    /// Polls left before a stopped container drops out of the listing.
    linger: Option<u32>,
    ip: Ipv4Addr,
}

#[derive(Debug, Default)]
struct FakeState {
    builds: u64,
    runs: u64,
    containers: BTreeMap<String, FakeContainer>,
    calls: Vec<RuntimeCall>,
    stop_linger: u32,
    failures: HashMap<RuntimeOp, u32>,
}

impl FakeState {
    fn record(&mut self, op: RuntimeOp, arg: &str) -> RuntimeResult<()> {
        self.calls.push(RuntimeCall {
            op,
            arg: arg.to_string(),
        });
        if let Some(left) = self.failures.get_mut(&op) {
            if *left > 0 {
                *left -= 1;
                return Err(RuntimeError::CommandFailed {
                    command: format!("fake {op:?} {arg}"),
                    status: "exit status: 1".to_string(),
                    stderr: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A scriptable [`ContainerRuntime`] that never leaves the process.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stopped containers stay listed as running for `polls` listings.
    pub fn with_stop_linger(self, polls: u32) -> Self {
        self.lock().stop_linger = polls;
        self
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: RuntimeOp, times: u32) {
        self.lock().failures.insert(op, times);
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, op: RuntimeOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Whether a container (running or not) still exists.
    pub fn container_exists(&self, short_id: &str) -> bool {
        self.lock().containers.contains_key(short_id)
    }

    pub fn is_running(&self, short_id: &str) -> bool {
        self.lock()
            .containers
            .get(short_id)
            .is_some_and(|c| c.running)
    }

    pub fn image_of(&self, short_id: &str) -> Option<String> {
        self.lock().containers.get(short_id).map(|c| c.image.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build(&self, image_reference: &str) -> RuntimeResult<String> {
        let mut state = self.lock();
        state.record(RuntimeOp::Build, image_reference)?;
        state.builds += 1;
        Ok(format!("sha256:{:012x}{}\n", state.builds, "0".repeat(52)))
    }

    async fn run(&self, image_reference: &str) -> RuntimeResult<String> {
        let mut state = self.lock();
        state.record(RuntimeOp::Run, image_reference)?;
        state.runs += 1;
        let seq = state.runs;
        let full_id = format!("{:012x}{}", 0xc0ffee000000_u64 + seq, "f".repeat(52));
        let octet = (seq % 250) as u8 + 2;
        state.containers.insert(
            full_id[..SHORT_ID_LEN].to_string(),
            FakeContainer {
                image: image_reference.to_string(),
                running: true,
                linger: None,
                ip: Ipv4Addr::new(172, 17, 0, octet),
            },
        );
        Ok(format!("{full_id}\n"))
    }

    async fn stop(&self, container_id: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record(RuntimeOp::Stop, container_id)?;
        let linger = state.stop_linger;
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(container_id.to_string()))?;
        if container.running && container.linger.is_none() {
            container.linger = Some(linger);
        }
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record(RuntimeOp::Remove, container_id)?;
        let running = state.containers.get(container_id).map(|c| c.running);
        match running {
            None => Err(RuntimeError::ContainerNotFound(container_id.to_string())),
            Some(true) => Err(RuntimeError::CommandFailed {
                command: format!("fake rm {container_id}"),
                status: "exit status: 1".to_string(),
                stderr: "cannot remove a running container".to_string(),
            }),
            Some(false) => {
                state.containers.remove(container_id);
                Ok(())
            }
        }
    }

    async fn list_running(&self) -> RuntimeResult<BTreeSet<String>> {
        let mut state = self.lock();
        state.record(RuntimeOp::ListRunning, "")?;
        for container in state.containers.values_mut() {
            match container.linger {
                Some(0) => {
                    container.running = false;
                    container.linger = None;
                }
                Some(ref mut left) => *left -= 1,
                None => {}
            }
        }
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| c.running)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn inspect(&self, resource_id: &str) -> RuntimeResult<ContainerMetadata> {
        let mut state = self.lock();
        state.record(RuntimeOp::Inspect, resource_id)?;
        let container = state
            .containers
            .get(resource_id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(resource_id.to_string()))?;
        Ok(ContainerMetadata {
            id: resource_id.to_string(),
            ip_address: Some(IpAddr::V4(container.ip)),
        })
    }
}
