//! Command dispatch — one reply for every command.
//!
//! Commands and replies are plain serde types. A transport (the `lordd`
//! JSON-lines loop, or a test) wraps them in [`Envelope`] /
//! [`ReplyEnvelope`] so a caller can match replies to requests.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use lord_core::ResourceId;
use lord_state::{EntityError, LoadBalancer, Node, NodeNetwork, Service};

use crate::controller::ServiceController;
use crate::error::ControllerError;

/// A control-plane request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CreateService {
        image_reference: String,
    },
    /// `service` is an id, or failing that a name.
    RemoveService {
        service: String,
    },
    AddInstance {
        service_id: String,
    },
    RemoveInstance {
        instance_id: String,
        service_id: String,
    },
    AddNode {
        service_id: String,
        node_id: String,
        name: String,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    },
    RemoveNode {
        service_id: String,
        node_id: String,
    },
    AddLoadBalancer {
        service_id: String,
        load_balancer_id: String,
        name: String,
        /// Range-checked against the configured port limit.
        ports: Option<Vec<i64>>,
    },
    RemoveLoadBalancer {
        service_id: String,
        load_balancer_id: String,
    },
    AttachInstance {
        service_id: String,
        load_balancer_id: String,
        instance_id: String,
    },
    DescribeService {
        service_id: String,
    },
    InstanceAddresses {
        service_id: String,
    },
    ListServices,
}

impl Command {
    /// The wire name of this command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateService { .. } => "create_service",
            Command::RemoveService { .. } => "remove_service",
            Command::AddInstance { .. } => "add_instance",
            Command::RemoveInstance { .. } => "remove_instance",
            Command::AddNode { .. } => "add_node",
            Command::RemoveNode { .. } => "remove_node",
            Command::AddLoadBalancer { .. } => "add_load_balancer",
            Command::RemoveLoadBalancer { .. } => "remove_load_balancer",
            Command::AttachInstance { .. } => "attach_instance",
            Command::DescribeService { .. } => "describe_service",
            Command::InstanceAddresses { .. } => "instance_addresses",
            Command::ListServices => "list_services",
        }
    }
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok { value: Value },
    Error { kind: String, message: String },
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Reply::Ok { value }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Reply::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok { .. })
    }
}

/// A command tagged with a caller-chosen correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub command: Command,
}

/// A reply carrying the correlation id of its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub reply: Reply,
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("encoding reply: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DispatchError {
    fn kind(&self) -> &'static str {
        match self {
            DispatchError::Controller(err) => err.kind(),
            DispatchError::Encode(_) => "encode",
        }
    }
}

impl From<EntityError> for DispatchError {
    fn from(err: EntityError) -> Self {
        DispatchError::Controller(err.into())
    }
}

/// Executes commands against a [`ServiceController`].
#[derive(Clone)]
pub struct ControlPlane {
    controller: Arc<ServiceController>,
}

impl ControlPlane {
    pub fn new(controller: Arc<ServiceController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &ServiceController {
        &self.controller
    }

    /// Execute one command. Failures become error replies.
    pub async fn handle(&self, command: Command) -> Reply {
        let name = command.name();
        match self.execute(command).await {
            Ok(value) => {
                debug!(command = name, "command succeeded");
                Reply::ok(value)
            }
            Err(err) => {
                warn!(command = name, kind = err.kind(), error = %err, "command failed");
                Reply::error(err.kind(), err.to_string())
            }
        }
    }

    pub async fn handle_envelope(&self, envelope: Envelope) -> ReplyEnvelope {
        ReplyEnvelope {
            correlation_id: envelope.correlation_id,
            reply: self.handle(envelope.command).await,
        }
    }

    /// Decode one JSON request line and encode its reply as one JSON line
    /// (without the trailing newline).
    pub async fn handle_line(&self, line: &str) -> String {
        let reply = match decode_envelope(line) {
            Ok(envelope) => self.handle_envelope(envelope).await,
            Err(malformed) => {
                warn!(error = %malformed.source, "malformed request");
                ReplyEnvelope {
                    correlation_id: malformed.correlation_id,
                    reply: Reply::error("invalid_request", malformed.source.to_string()),
                }
            }
        };
        serde_json::to_string(&reply).unwrap_or_else(|err| {
            json!({
                "correlation_id": reply.correlation_id,
                "status": "error",
                "kind": "encode",
                "message": err.to_string(),
            })
            .to_string()
        })
    }

    async fn execute(&self, command: Command) -> Result<Value, DispatchError> {
        let ctl = &self.controller;
        let value = match command {
            Command::CreateService { image_reference } => {
                let service = Service::create(image_reference)?;
                Value::from(ctl.add_service(service).await?)
            }
            Command::RemoveService { service } => Value::from(ctl.remove_service(&service).await?),
            Command::AddInstance { service_id } => {
                serde_json::to_value(ctl.add_instance_to_service(&service_id).await?)?
            }
            Command::RemoveInstance {
                instance_id,
                service_id,
            } => Value::from(
                ctl.remove_instance_from_service(&instance_id, &service_id)
                    .await?,
            ),
            Command::AddNode {
                service_id,
                node_id,
                name,
                ipv4,
                ipv6,
            } => {
                let node = Node::new(parse_id("node id", node_id)?, name, NodeNetwork { ipv4, ipv6 })?;
                ctl.add_node_to_service(&service_id, node).await?;
                Value::Null
            }
            Command::RemoveNode {
                service_id,
                node_id,
            } => Value::from(ctl.remove_node_from_service(&service_id, &node_id).await?),
            Command::AddLoadBalancer {
                service_id,
                load_balancer_id,
                name,
                ports,
            } => {
                let lb = LoadBalancer::new(
                    parse_id("load balancer id", load_balancer_id)?,
                    name,
                    ports,
                    ctl.limits().max_port,
                )?;
                ctl.add_load_balancer_to_service(&service_id, lb).await?;
                Value::Null
            }
            Command::RemoveLoadBalancer {
                service_id,
                load_balancer_id,
            } => Value::from(
                ctl.remove_load_balancer_from_service(&service_id, &load_balancer_id)
                    .await?,
            ),
            Command::AttachInstance {
                service_id,
                load_balancer_id,
                instance_id,
            } => {
                ctl.attach_instance_to_load_balancer(&service_id, &load_balancer_id, &instance_id)
                    .await?;
                Value::Null
            }
            Command::DescribeService { service_id } => {
                serde_json::to_value(ctl.service_snapshot(&service_id).await?)?
            }
            Command::InstanceAddresses { service_id } => {
                serde_json::to_value(ctl.instance_addresses(&service_id).await?)?
            }
            Command::ListServices => serde_json::to_value(ctl.list_services().await)?,
        };
        Ok(value)
    }
}

/// A request line that did not decode into an [`Envelope`].
struct MalformedRequest {
    /// Recovered when the line is a JSON object with a string `correlation_id`.
    correlation_id: Option<String>,
    source: serde_json::Error,
}

fn decode_envelope(line: &str) -> Result<Envelope, MalformedRequest> {
    let raw: Value = serde_json::from_str(line).map_err(|source| MalformedRequest {
        correlation_id: None,
        source,
    })?;
    let correlation_id = raw
        .get("correlation_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    serde_json::from_value(raw).map_err(|source| MalformedRequest {
        correlation_id,
        source,
    })
}

fn parse_id(field: &'static str, raw: String) -> Result<ResourceId, EntityError> {
    ResourceId::new(raw).map_err(|err| EntityError::invalid_id(field, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lord_core::{Limits, TeardownPolicy};
    use lord_runtime::FakeRuntime;

    fn plane() -> ControlPlane {
        let limits = Limits {
            max_instances: 4,
            max_nodes: 4,
            max_load_balancers: 2,
            max_port: 1024,
        };
        let teardown = TeardownPolicy {
            backoff_ms: 1,
            max_attempts: 5,
        };
        let controller = ServiceController::new(Arc::new(FakeRuntime::new()), limits, teardown);
        ControlPlane::new(Arc::new(controller))
    }

    fn value(reply: Reply) -> Value {
        match reply {
            Reply::Ok { value } => value,
            Reply::Error { kind, message } => panic!("unexpected {kind}: {message}"),
        }
    }

    fn kind(reply: Reply) -> String {
        match reply {
            Reply::Error { kind, .. } => kind,
            Reply::Ok { value } => panic!("unexpected success: {value}"),
        }
    }

    async fn create(plane: &ControlPlane) -> String {
        value(
            plane
                .handle(Command::CreateService {
                    image_reference: "web".into(),
                })
                .await,
        );
        let ids = value(plane.handle(Command::ListServices).await);
        ids[0].as_str().unwrap().to_string()
    }

    #[test]
    fn commands_use_snake_case_tags() {
        let cmd: Command = serde_json::from_str(
            r#"{"command":"add_node","service_id":"s1","node_id":"n1","name":"edge","ipv4":"10.0.0.7"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::AddNode {
                service_id: "s1".into(),
                node_id: "n1".into(),
                name: "edge".into(),
                ipv4: Some(Ipv4Addr::new(10, 0, 0, 7)),
                ipv6: None,
            }
        );
        assert_eq!(cmd.name(), "add_node");
    }

    #[test]
    fn reply_envelope_is_flat() {
        let envelope = ReplyEnvelope {
            correlation_id: Some("7".into()),
            reply: Reply::error("not_found", "service s1 not found"),
        };
        let encoded = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            encoded,
            json!({
                "correlation_id": "7",
                "status": "error",
                "kind": "not_found",
                "message": "service s1 not found",
            })
        );
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let plane = plane();
        let service_id = create(&plane).await;

        value(
            plane
                .handle(Command::AddNode {
                    service_id: service_id.clone(),
                    node_id: "n1".into(),
                    name: "edge".into(),
                    ipv4: None,
                    ipv6: None,
                })
                .await,
        );
        let instance = value(
            plane
                .handle(Command::AddInstance {
                    service_id: service_id.clone(),
                })
                .await,
        );
        let instance_id = instance.as_str().unwrap().to_string();

        let described = value(
            plane
                .handle(Command::DescribeService {
                    service_id: service_id.clone(),
                })
                .await,
        );
        assert_eq!(
            described["nodes"]["n1"]["instances"],
            json!([instance_id.clone()])
        );

        let removed = value(
            plane
                .handle(Command::RemoveInstance {
                    instance_id,
                    service_id: service_id.clone(),
                })
                .await,
        );
        assert_eq!(removed, json!(true));

        let removed = value(plane.handle(Command::RemoveService { service: service_id }).await);
        assert_eq!(removed, json!(true));
        assert_eq!(value(plane.handle(Command::ListServices).await), json!([]));
    }

    #[tokio::test]
    async fn entity_errors_become_error_replies() {
        let plane = plane();
        let service_id = create(&plane).await;

        let reply = plane
            .handle(Command::AddInstance {
                service_id: service_id.clone(),
            })
            .await;
        assert_eq!(kind(reply), "no_available_nodes");

        let reply = plane
            .handle(Command::AddLoadBalancer {
                service_id: service_id.clone(),
                load_balancer_id: "lb1".into(),
                name: "front".into(),
                ports: Some(vec![8080]),
            })
            .await;
        assert_eq!(kind(reply), "invalid_field");

        let reply = plane
            .handle(Command::AddNode {
                service_id,
                node_id: "bad id".into(),
                name: "edge".into(),
                ipv4: None,
                ipv6: None,
            })
            .await;
        assert_eq!(kind(reply), "invalid_field");
    }

    #[tokio::test]
    async fn lines_carry_correlation_ids() {
        let plane = plane();
        let line = plane
            .handle_line(r#"{"correlation_id":"42","command":"list_services"}"#)
            .await;
        let reply: ReplyEnvelope = serde_json::from_str(&line).unwrap();
        assert_eq!(reply.correlation_id.as_deref(), Some("42"));
        assert_eq!(reply.reply, Reply::ok(json!([])));
    }

    #[tokio::test]
    async fn out_of_range_ports_are_invalid_fields() {
        let plane = plane();
        let service_id = create(&plane).await;
        for ports in ["[70000]", "[-1]"] {
            let line = format!(
                r#"{{"correlation_id":"lb-{ports}","command":"add_load_balancer","service_id":"{service_id}","load_balancer_id":"lb1","name":"front","ports":{ports}}}"#
            );
            let reply: ReplyEnvelope = serde_json::from_str(&plane.handle_line(&line).await).unwrap();
            assert_eq!(reply.correlation_id, Some(format!("lb-{ports}")));
            assert_eq!(kind(reply.reply), "invalid_field");
        }
        let snapshot = plane.controller().service_snapshot(&service_id).await.unwrap();
        assert!(snapshot.load_balancers().is_empty());
    }

    #[tokio::test]
    async fn undecodable_command_keeps_correlation_id() {
        let plane = plane();
        let line = r#"{"correlation_id":"9","command":"add_instance","service_id":7}"#;
        let reply: ReplyEnvelope = serde_json::from_str(&plane.handle_line(line).await).unwrap();
        assert_eq!(reply.correlation_id.as_deref(), Some("9"));
        assert_eq!(kind(reply.reply), "invalid_request");
    }

    #[tokio::test]
    async fn malformed_line_is_invalid_request() {
        let plane = plane();
        for line in ["not json", r#"{"command":"launch_rockets"}"#] {
            let reply: ReplyEnvelope =
                serde_json::from_str(&plane.handle_line(line).await).unwrap();
            assert_eq!(reply.correlation_id, None);
            assert_eq!(kind(reply.reply), "invalid_request");
        }
    }
}
