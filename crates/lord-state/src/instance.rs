//! A scheduled running copy of a service's application.

use std::hash::{Hash, Hasher};

use serde::Serialize;

use lord_core::ResourceId;

use crate::error::{EntityResult, require_non_blank};

/// An application instance, placed on exactly one node.
///
/// Immutable once built. Equality and hashing look only at the id, so the
/// display name never affects set or map membership.
#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    id: ResourceId,
    name: String,
    node_id: ResourceId,
}

impl Instance {
    pub fn new(id: ResourceId, name: impl Into<String>, node_id: ResourceId) -> EntityResult<Self> {
        let name = name.into();
        require_non_blank("instance name", &name)?;
        Ok(Self { id, name, node_id })
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_id(&self) -> &ResourceId {
        &self.node_id
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
