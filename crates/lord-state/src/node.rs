//! Hosts that instances are scheduled onto.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use lord_core::ResourceId;

use crate::error::{EntityError, EntityKind, EntityResult, require_non_blank};

/// Addresses a node is reachable on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeNetwork {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

/// A host within a service.
///
/// Tracks which instances are placed on it by id only. The instance records
/// themselves live in the owning [`Service`](crate::Service), which is the
/// only code allowed to change this membership.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    id: ResourceId,
    name: String,
    network: NodeNetwork,
    instances: BTreeSet<ResourceId>,
}

impl Node {
    pub fn new(id: ResourceId, name: impl Into<String>, network: NodeNetwork) -> EntityResult<Self> {
        let name = name.into();
        require_non_blank("node name", &name)?;
        Ok(Self {
            id,
            name,
            network,
            instances: BTreeSet::new(),
        })
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &NodeNetwork {
        &self.network
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.instances.iter()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn hosts(&self, instance_id: &str) -> bool {
        self.instances.contains(instance_id)
    }

    pub(crate) fn add_instance(
        &mut self,
        instance_id: ResourceId,
        max_instances: usize,
    ) -> EntityResult<()> {
        if self.instances.len() >= max_instances {
            return Err(EntityError::CapacityExceeded {
                kind: EntityKind::Instance,
                owner: format!("node {}", self.name),
                limit: max_instances,
            });
        }
        if self.instances.contains(&instance_id) {
            return Err(EntityError::duplicate(EntityKind::Instance, instance_id));
        }
        self.instances.insert(instance_id);
        Ok(())
    }

    /// Returns whether the instance was on this node.
    pub(crate) fn remove_instance(&mut self, instance_id: &str) -> EntityResult<bool> {
        if self.instances.is_empty() {
            return Err(EntityError::EmptyCollection {
                kind: EntityKind::Instance,
                owner: format!("node {}", self.name),
            });
        }
        Ok(self.instances.remove(instance_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn node() -> Node {
        Node::new(id("n1"), "rack-a", NodeNetwork::default()).unwrap()
    }

    #[test]
    fn membership_add_and_remove() {
        let mut node = node();
        node.add_instance(id("i1"), 4).unwrap();
        node.add_instance(id("i2"), 4).unwrap();
        assert_eq!(node.instance_count(), 2);
        assert!(node.hosts("i1"));

        assert!(node.remove_instance("i1").unwrap());
        assert!(!node.remove_instance("i1").unwrap());
        assert_eq!(node.instance_count(), 1);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut node = node();
        node.add_instance(id("i1"), 1).unwrap();
        let err = node.add_instance(id("i2"), 1).unwrap_err();
        assert_eq!(err.kind(), "capacity_exceeded");
        assert_eq!(node.instance_count(), 1);
    }

    #[test]
    fn duplicate_membership_is_rejected() {
        let mut node = node();
        node.add_instance(id("i1"), 4).unwrap();
        let err = node.add_instance(id("i1"), 4).unwrap_err();
        assert_eq!(err.kind(), "duplicate_entity");
    }

    #[test]
    fn removing_from_empty_node_fails() {
        let mut node = node();
        let err = node.remove_instance("i1").unwrap_err();
        assert!(matches!(err, EntityError::EmptyCollection { .. }));
    }

    #[test]
    fn network_is_kept() {
        let network = NodeNetwork {
            ipv4: Some(Ipv4Addr::new(10, 0, 0, 7)),
            ipv6: None,
        };
        let node = Node::new(id("n1"), "rack-a", network.clone()).unwrap();
        assert_eq!(node.network(), &network);
    }
}
