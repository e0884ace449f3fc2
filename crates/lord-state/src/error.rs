//! Error types for entity model mutations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lord_core::IdError;

/// Result type alias for entity model operations.
pub type EntityResult<T> = Result<T, EntityError>;

/// Which kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Service,
    Node,
    Instance,
    LoadBalancer,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Service => "service",
            EntityKind::Node => "node",
            EntityKind::Instance => "instance",
            EntityKind::LoadBalancer => "load balancer",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("{kind} {id} already exists")]
    DuplicateEntity { kind: EntityKind, id: String },

    #[error("{owner} has the maximum {kind} count ({limit})")]
    CapacityExceeded {
        kind: EntityKind,
        owner: String,
        limit: usize,
    },

    #[error("there are no {kind}s to remove from {owner}")]
    EmptyCollection { kind: EntityKind, owner: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("service {service} has no nodes to schedule onto")]
    NoAvailableNodes { service: String },

    #[error("node {node_id} still hosts {instances} instance(s)")]
    NodeInUse { node_id: String, instances: usize },
}

impl EntityError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EntityError::DuplicateEntity { .. } => "duplicate_entity",
            EntityError::CapacityExceeded { .. } => "capacity_exceeded",
            EntityError::EmptyCollection { .. } => "empty_collection",
            EntityError::NotFound { .. } => "not_found",
            EntityError::InvalidField { .. } => "invalid_field",
            EntityError::NoAvailableNodes { .. } => "no_available_nodes",
            EntityError::NodeInUse { .. } => "node_in_use",
        }
    }

    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        EntityError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn duplicate(kind: EntityKind, id: impl fmt::Display) -> Self {
        EntityError::DuplicateEntity {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_id(field: &'static str, err: IdError) -> Self {
        EntityError::InvalidField {
            field,
            reason: err.to_string(),
        }
    }
}

/// Reject blank display names and image references.
pub(crate) fn require_non_blank(field: &'static str, value: &str) -> EntityResult<()> {
    if value.trim().is_empty() {
        return Err(EntityError::InvalidField {
            field,
            reason: "must not be blank".to_string(),
        });
    }
    Ok(())
}
