//! Service — the root aggregate.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use lord_core::{Limits, ResourceId, names};
use lord_placement::{NodeLoad, get_next};

use crate::error::{EntityError, EntityKind, EntityResult, require_non_blank};
use crate::instance::Instance;
use crate::load_balancer::LoadBalancer;
use crate::node::Node;

/// A deployed application: its nodes, the instances placed on them, and
/// the load balancers in front of them.
///
/// Nodes keep registration order, so placement ties go to the node that
/// was added first. Instances and load balancers are ordered by id.
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    id: ResourceId,
    name: String,
    image_reference: String,
    instances: BTreeMap<ResourceId, Instance>,
    nodes: IndexMap<ResourceId, Node>,
    load_balancers: BTreeMap<ResourceId, LoadBalancer>,
}

impl Service {
    /// Build an empty service. Blank names and image references are rejected.
    pub fn new(
        id: ResourceId,
        name: impl Into<String>,
        image_reference: impl Into<String>,
    ) -> EntityResult<Self> {
        let name = name.into();
        let image_reference = image_reference.into();
        require_non_blank("service name", &name)?;
        require_non_blank("image reference", &image_reference)?;
        Ok(Self {
            id,
            name,
            image_reference,
            instances: BTreeMap::new(),
            nodes: IndexMap::new(),
            load_balancers: BTreeMap::new(),
        })
    }

    /// Build a service with a random id and a generated display name.
    pub fn create(image_reference: impl Into<String>) -> EntityResult<Self> {
        Self::new(ResourceId::generate(), names::generate(), image_reference)
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image_reference(&self) -> &str {
        &self.image_reference
    }

    pub fn instances(&self) -> &BTreeMap<ResourceId, Instance> {
        &self.instances
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> &IndexMap<ResourceId, Node> {
        &self.nodes
    }

    pub fn load_balancers(&self) -> &BTreeMap<ResourceId, LoadBalancer> {
        &self.load_balancers
    }

    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Current per-node load, in node registration order.
    pub fn node_loads(&self) -> Vec<NodeLoad> {
        self.nodes
            .values()
            .map(|node| NodeLoad::new(node.id().clone(), node.instance_count()))
            .collect()
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Check that one more instance could be scheduled right now.
    pub fn ensure_schedulable(&self, limits: &Limits) -> EntityResult<()> {
        self.ensure_instance_capacity(limits)?;
        if self.nodes.is_empty() {
            return Err(EntityError::NoAvailableNodes {
                service: self.name.clone(),
            });
        }
        Ok(())
    }

    fn ensure_instance_capacity(&self, limits: &Limits) -> EntityResult<()> {
        if self.instances.len() >= limits.max_instances {
            return Err(EntityError::CapacityExceeded {
                kind: EntityKind::Instance,
                owner: format!("service {}", self.name),
                limit: limits.max_instances,
            });
        }
        Ok(())
    }

    /// Register an instance on its node and in this service.
    ///
    /// The instance's node must already belong to this service.
    pub fn add_instance(&mut self, instance: Instance, limits: &Limits) -> EntityResult<()> {
        self.ensure_instance_capacity(limits)?;
        if self.instances.contains_key(instance.id()) {
            return Err(EntityError::duplicate(EntityKind::Instance, instance.id()));
        }
        let node = self
            .nodes
            .get_mut(instance.node_id())
            .ok_or_else(|| EntityError::not_found(EntityKind::Node, instance.node_id()))?;
        node.add_instance(instance.id().clone(), limits.max_instances)?;

        debug!(
            service = %self.id,
            instance = %instance.id(),
            node = %instance.node_id(),
            "instance registered"
        );
        self.instances.insert(instance.id().clone(), instance);
        Ok(())
    }

    /// Place a new instance on the least-loaded node and register it.
    pub fn schedule_instance(
        &mut self,
        instance_id: ResourceId,
        limits: &Limits,
    ) -> EntityResult<ResourceId> {
        self.ensure_instance_capacity(limits)?;
        let node_id = get_next(&self.node_loads()).map_err(|_| EntityError::NoAvailableNodes {
            service: self.name.clone(),
        })?;
        let instance = Instance::new(instance_id.clone(), names::generate(), node_id)?;
        self.add_instance(instance, limits)?;
        Ok(instance_id)
    }

    /// Drop an instance from this service, its node, and any load balancer.
    ///
    /// Returns whether the instance existed.
    pub fn remove_instance(&mut self, instance_id: &str) -> EntityResult<bool> {
        if self.instances.is_empty() {
            return Err(EntityError::EmptyCollection {
                kind: EntityKind::Instance,
                owner: format!("service {}", self.name),
            });
        }
        if self.instances.remove(instance_id).is_none() {
            return Ok(false);
        }
        for node in self.nodes.values_mut().filter(|n| n.hosts(instance_id)) {
            node.remove_instance(instance_id)?;
        }
        for lb in self.load_balancers.values_mut() {
            lb.detach(instance_id);
        }
        debug!(service = %self.id, instance = instance_id, "instance removed");
        Ok(true)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Register a node, up to `limits.max_nodes`.
    pub fn add_node(&mut self, node: Node, limits: &Limits) -> EntityResult<()> {
        if self.nodes.len() >= limits.max_nodes {
            return Err(EntityError::CapacityExceeded {
                kind: EntityKind::Node,
                owner: format!("service {}", self.name),
                limit: limits.max_nodes,
            });
        }
        if self.nodes.contains_key(node.id()) {
            return Err(EntityError::duplicate(EntityKind::Node, node.id()));
        }
        self.nodes.insert(node.id().clone(), node);
        Ok(())
    }

    /// Remove a node that hosts no instances. Returns whether it existed.
    pub fn remove_node(&mut self, node_id: &str) -> EntityResult<bool> {
        if self.nodes.is_empty() {
            return Err(EntityError::EmptyCollection {
                kind: EntityKind::Node,
                owner: format!("service {}", self.name),
            });
        }
        if let Some(node) = self.nodes.get(node_id) {
            if node.instance_count() > 0 {
                return Err(EntityError::NodeInUse {
                    node_id: node_id.to_string(),
                    instances: node.instance_count(),
                });
            }
        }
        Ok(self.nodes.shift_remove(node_id).is_some())
    }

    // ── Load balancers ─────────────────────────────────────────────

    /// Register a load balancer, up to `limits.max_load_balancers`.
    pub fn add_load_balancer(&mut self, lb: LoadBalancer, limits: &Limits) -> EntityResult<()> {
        if self.load_balancers.len() >= limits.max_load_balancers {
            return Err(EntityError::CapacityExceeded {
                kind: EntityKind::LoadBalancer,
                owner: format!("service {}", self.name),
                limit: limits.max_load_balancers,
            });
        }
        if self.load_balancers.contains_key(lb.id()) {
            return Err(EntityError::duplicate(EntityKind::LoadBalancer, lb.id()));
        }
        self.load_balancers.insert(lb.id().clone(), lb);
        Ok(())
    }

    /// Returns whether the load balancer existed.
    pub fn remove_load_balancer(&mut self, lb_id: &str) -> EntityResult<bool> {
        if self.load_balancers.is_empty() {
            return Err(EntityError::EmptyCollection {
                kind: EntityKind::LoadBalancer,
                owner: format!("service {}", self.name),
            });
        }
        Ok(self.load_balancers.remove(lb_id).is_some())
    }

    /// Route a load balancer's traffic to one more of this service's instances.
    pub fn attach_to_load_balancer(&mut self, lb_id: &str, instance_id: &str) -> EntityResult<()> {
        let instance = self
            .instances
            .get(instance_id)
            .ok_or_else(|| EntityError::not_found(EntityKind::Instance, instance_id))?;
        let lb = self
            .load_balancers
            .get_mut(lb_id)
            .ok_or_else(|| EntityError::not_found(EntityKind::LoadBalancer, lb_id))?;
        lb.attach(instance.id().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeNetwork;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn limits() -> Limits {
        Limits {
            max_instances: 4,
            max_nodes: 2,
            max_load_balancers: 1,
            max_port: 65535,
        }
    }

    fn service_with_nodes(node_ids: &[&str]) -> Service {
        let mut svc = Service::new(id("svc-1"), "web", "nginx").unwrap();
        for node_id in node_ids {
            let node = Node::new(id(node_id), format!("host-{node_id}"), NodeNetwork::default())
                .unwrap();
            svc.add_node(node, &limits()).unwrap();
        }
        svc
    }

    /// Every instance sits on exactly one node, and every node member exists.
    fn assert_membership_consistent(svc: &Service) {
        for instance in svc.instances().values() {
            let holders = svc
                .nodes()
                .values()
                .filter(|n| n.hosts(instance.id().as_str()))
                .count();
            assert_eq!(holders, 1, "instance {} on {holders} nodes", instance.id());
            assert!(svc.node(instance.node_id().as_str()).unwrap().hosts(instance.id().as_str()));
        }
        for node in svc.nodes().values() {
            for member in node.instance_ids() {
                assert!(svc.instance(member.as_str()).is_some());
            }
        }
    }

    #[test]
    fn create_generates_id_and_name() {
        let svc = Service::create("nginx:latest").unwrap();
        assert!(!svc.name().is_empty());
        assert_eq!(svc.image_reference(), "nginx:latest");
        assert!(svc.instances().is_empty());
        assert!(svc.nodes().is_empty());
        assert!(svc.load_balancers().is_empty());
    }

    #[test]
    fn blank_image_is_rejected() {
        let err = Service::create("").unwrap_err();
        assert!(matches!(err, EntityError::InvalidField { field: "image reference", .. }));
    }

    #[test]
    fn add_instance_writes_both_maps() {
        let mut svc = service_with_nodes(&["n1", "n2"]);
        let instance = Instance::new(id("i1"), "brave_ada", id("n2")).unwrap();
        svc.add_instance(instance, &limits()).unwrap();

        assert!(svc.instance("i1").is_some());
        assert!(svc.node("n2").unwrap().hosts("i1"));
        assert!(!svc.node("n1").unwrap().hosts("i1"));
        assert_membership_consistent(&svc);
    }

    #[test]
    fn add_instance_on_unknown_node_is_rejected() {
        let mut svc = service_with_nodes(&["n1"]);
        let instance = Instance::new(id("i1"), "brave_ada", id("ghost")).unwrap();
        let err = svc.add_instance(instance, &limits()).unwrap_err();
        assert_eq!(err, EntityError::not_found(EntityKind::Node, "ghost"));
        assert!(svc.instances().is_empty());
    }

    #[test]
    fn duplicate_instance_is_rejected() {
        let mut svc = service_with_nodes(&["n1"]);
        let a = Instance::new(id("i1"), "brave_ada", id("n1")).unwrap();
        svc.add_instance(a.clone(), &limits()).unwrap();
        let err = svc.add_instance(a, &limits()).unwrap_err();
        assert_eq!(err.kind(), "duplicate_entity");
        assert_eq!(svc.instance_count(), 1);
    }

    #[test]
    fn schedule_alternates_between_nodes() {
        let mut svc = service_with_nodes(&["n1", "n2"]);
        let mut placements = Vec::new();
        for raw in ["i1", "i2", "i3"] {
            let instance_id = svc.schedule_instance(id(raw), &limits()).unwrap();
            placements.push(svc.instance(instance_id.as_str()).unwrap().node_id().to_string());
        }
        assert_eq!(placements, vec!["n1", "n2", "n1"]);
        assert_membership_consistent(&svc);
    }

    #[test]
    fn ties_go_to_the_first_registered_node() {
        let mut svc = service_with_nodes(&["zeta", "alpha"]);
        let loads: Vec<String> = svc.node_loads().iter().map(|l| l.node_id.to_string()).collect();
        assert_eq!(loads, vec!["zeta", "alpha"]);

        let instance_id = svc.schedule_instance(id("i1"), &limits()).unwrap();
        assert_eq!(svc.instance(instance_id.as_str()).unwrap().node_id().as_str(), "zeta");
    }

    #[test]
    fn removing_a_node_keeps_the_others_in_order() {
        let limits = Limits {
            max_nodes: 3,
            ..limits()
        };
        let mut svc = Service::new(id("svc-1"), "web", "nginx").unwrap();
        for node_id in ["c", "a", "b"] {
            let node = Node::new(id(node_id), node_id, NodeNetwork::default()).unwrap();
            svc.add_node(node, &limits).unwrap();
        }
        assert!(svc.remove_node("c").unwrap());
        let order: Vec<&str> = svc.nodes().keys().map(|k| k.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn schedule_without_nodes_fails() {
        let mut svc = service_with_nodes(&[]);
        let err = svc.schedule_instance(id("i1"), &limits()).unwrap_err();
        assert_eq!(err.kind(), "no_available_nodes");
        assert!(svc.ensure_schedulable(&limits()).is_err());
    }

    #[test]
    fn schedule_at_capacity_fails_and_leaves_state() {
        let mut svc = service_with_nodes(&["n1", "n2"]);
        for i in 0..4 {
            svc.schedule_instance(id(&format!("i{i}")), &limits()).unwrap();
        }
        for _ in 0..3 {
            let err = svc.schedule_instance(id("extra"), &limits()).unwrap_err();
            assert_eq!(err.kind(), "capacity_exceeded");
            assert_eq!(svc.instance_count(), 4);
        }
        assert_membership_consistent(&svc);
    }

    #[test]
    fn remove_instance_clears_node_and_load_balancer() {
        let mut svc = service_with_nodes(&["n1"]);
        svc.schedule_instance(id("i1"), &limits()).unwrap();
        let lb = LoadBalancer::new(id("lb1"), "edge", Some(vec![80]), 65535).unwrap();
        svc.add_load_balancer(lb, &limits()).unwrap();
        svc.attach_to_load_balancer("lb1", "i1").unwrap();

        assert!(svc.remove_instance("i1").unwrap());
        assert!(svc.instance("i1").is_none());
        assert!(!svc.node("n1").unwrap().hosts("i1"));
        assert!(svc.load_balancers()["lb1"].instance_ids().is_empty());
    }

    #[test]
    fn remove_instance_from_empty_service_fails() {
        let mut svc = service_with_nodes(&["n1"]);
        let err = svc.remove_instance("i1").unwrap_err();
        assert_eq!(err.kind(), "empty_collection");
    }

    #[test]
    fn remove_unknown_instance_returns_false() {
        let mut svc = service_with_nodes(&["n1"]);
        svc.schedule_instance(id("i1"), &limits()).unwrap();
        assert!(!svc.remove_instance("i2").unwrap());
        assert_eq!(svc.instance_count(), 1);
    }

    #[test]
    fn node_capacity_and_duplicates() {
        let mut svc = service_with_nodes(&["n1"]);
        let dup = Node::new(id("n1"), "again", NodeNetwork::default()).unwrap();
        assert_eq!(svc.add_node(dup, &limits()).unwrap_err().kind(), "duplicate_entity");

        let n2 = Node::new(id("n2"), "two", NodeNetwork::default()).unwrap();
        svc.add_node(n2, &limits()).unwrap();
        let n3 = Node::new(id("n3"), "three", NodeNetwork::default()).unwrap();
        assert_eq!(svc.add_node(n3, &limits()).unwrap_err().kind(), "capacity_exceeded");
    }

    #[test]
    fn occupied_node_cannot_be_removed() {
        let mut svc = service_with_nodes(&["n1", "n2"]);
        svc.schedule_instance(id("i1"), &limits()).unwrap();

        let err = svc.remove_node("n1").unwrap_err();
        assert!(matches!(err, EntityError::NodeInUse { instances: 1, .. }));
        assert!(svc.remove_node("n2").unwrap());
        assert!(!svc.remove_node("n9").unwrap());
    }

    #[test]
    fn remove_node_from_empty_service_fails() {
        let mut svc = service_with_nodes(&[]);
        assert_eq!(svc.remove_node("n1").unwrap_err().kind(), "empty_collection");
    }

    #[test]
    fn load_balancer_lifecycle() {
        let mut svc = service_with_nodes(&["n1"]);
        assert_eq!(
            svc.remove_load_balancer("lb1").unwrap_err().kind(),
            "empty_collection"
        );

        let lb = LoadBalancer::new(id("lb1"), "edge", None, 65535).unwrap();
        svc.add_load_balancer(lb, &limits()).unwrap();
        let lb2 = LoadBalancer::new(id("lb2"), "internal", None, 65535).unwrap();
        assert_eq!(
            svc.add_load_balancer(lb2, &limits()).unwrap_err().kind(),
            "capacity_exceeded"
        );

        assert!(!svc.remove_load_balancer("lb9").unwrap());
        assert!(svc.remove_load_balancer("lb1").unwrap());
    }

    #[test]
    fn attach_requires_existing_instance_and_balancer() {
        let mut svc = service_with_nodes(&["n1"]);
        svc.schedule_instance(id("i1"), &limits()).unwrap();
        assert_eq!(
            svc.attach_to_load_balancer("lb1", "i1").unwrap_err(),
            EntityError::not_found(EntityKind::LoadBalancer, "lb1")
        );
        assert_eq!(
            svc.attach_to_load_balancer("lb1", "i9").unwrap_err(),
            EntityError::not_found(EntityKind::Instance, "i9")
        );
    }

    #[test]
    fn snapshot_serializes() {
        let mut svc = service_with_nodes(&["n1"]);
        svc.schedule_instance(id("i1"), &limits()).unwrap();
        let json = serde_json::to_value(&svc).unwrap();
        assert_eq!(json["name"], "web");
        assert_eq!(json["instances"]["i1"]["node_id"], "n1");
        assert_eq!(json["nodes"]["n1"]["instances"][0], "i1");
    }
}
