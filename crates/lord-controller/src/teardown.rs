//! Bounded container teardown.
//!
//! `stop` returns before the engine has actually stopped the container, so
//! the listing is polled until the container is gone, re-issuing `stop`
//! after each backoff. Only then is the container removed.

use tracing::{debug, info};

use lord_core::TeardownPolicy;
use lord_runtime::ContainerRuntime;

use crate::error::{ControllerError, ControllerResult};

/// Stop and remove a container. Returns the number of `stop` calls issued.
pub async fn teardown(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    policy: &TeardownPolicy,
) -> ControllerResult<u32> {
    runtime.stop(container_id).await?;
    let mut attempts: u32 = 1;

    while runtime.list_running().await?.contains(container_id) {
        if attempts >= policy.max_attempts {
            return Err(ControllerError::TeardownTimeout {
                instance_id: container_id.to_string(),
                attempts,
            });
        }
        debug!(container_id, attempts, "container still running, retrying stop");
        tokio::time::sleep(policy.backoff()).await;
        runtime.stop(container_id).await?;
        attempts += 1;
    }

    runtime.remove(container_id).await?;
    info!(container_id, attempts, "container torn down");
    Ok(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lord_runtime::output::instance_identifier;
    use lord_runtime::{FakeRuntime, RuntimeOp};

    fn policy(max_attempts: u32) -> TeardownPolicy {
        TeardownPolicy {
            backoff_ms: 1,
            max_attempts,
        }
    }

    async fn started(rt: &FakeRuntime) -> String {
        instance_identifier(&rt.run("web").await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn prompt_stop_needs_one_attempt() {
        let rt = FakeRuntime::new();
        let id = started(&rt).await;

        let attempts = teardown(&rt, &id, &policy(5)).await.unwrap();
        assert_eq!(attempts, 1);
        assert!(!rt.container_exists(&id));
    }

    #[tokio::test]
    async fn lingering_container_is_retried_until_gone() {
        let rt = FakeRuntime::new().with_stop_linger(2);
        let id = started(&rt).await;

        let attempts = teardown(&rt, &id, &policy(5)).await.unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(rt.count_calls(RuntimeOp::Stop), 3);
        assert_eq!(rt.count_calls(RuntimeOp::Remove), 1);
        assert!(!rt.container_exists(&id));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let rt = FakeRuntime::new().with_stop_linger(10);
        let id = started(&rt).await;

        let err = teardown(&rt, &id, &policy(3)).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::TeardownTimeout { attempts: 3, .. }
        ));
        assert_eq!(rt.count_calls(RuntimeOp::Remove), 0);
        assert!(rt.container_exists(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_slept_between_rounds() {
        let rt = FakeRuntime::new().with_stop_linger(2);
        let id = started(&rt).await;
        let policy = TeardownPolicy {
            backoff_ms: 1_000,
            max_attempts: 5,
        };

        let before = tokio::time::Instant::now();
        teardown(&rt, &id, &policy).await.unwrap();
        assert!(before.elapsed() >= std::time::Duration::from_secs(2));
    }

    #[tokio::test]
    async fn runtime_failure_is_returned() {
        let rt = FakeRuntime::new();
        let id = started(&rt).await;
        rt.fail_next(RuntimeOp::Stop, 1);

        let err = teardown(&rt, &id, &policy(5)).await.unwrap_err();
        assert_eq!(err.kind(), "runtime");
    }
}
