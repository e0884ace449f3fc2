//! Traffic-distribution configuration attached to a service.

use serde::Serialize;

use lord_core::ResourceId;

use crate::error::{EntityError, EntityKind, EntityResult, require_non_blank};

/// A load balancer spreading traffic over some of a service's instances.
///
/// `ports` of `None` means not configured yet, which is valid.
#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancer {
    id: ResourceId,
    name: String,
    ports: Option<Vec<u16>>,
    instances: Vec<ResourceId>,
}

impl LoadBalancer {
    /// Every port must lie in `1..=max_port`. Ports arrive as raw integers
    /// so negative and oversized values are reported as invalid fields.
    pub fn new(
        id: ResourceId,
        name: impl Into<String>,
        ports: Option<Vec<i64>>,
        max_port: u16,
    ) -> EntityResult<Self> {
        let name = name.into();
        require_non_blank("load balancer name", &name)?;
        let ports = ports
            .map(|ports| {
                ports
                    .into_iter()
                    .map(|port| checked_port(port, max_port, &name))
                    .collect::<EntityResult<Vec<u16>>>()
            })
            .transpose()?;
        Ok(Self {
            id,
            name,
            ports,
            instances: Vec::new(),
        })
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> Option<&[u16]> {
        self.ports.as_deref()
    }

    pub fn instance_ids(&self) -> &[ResourceId] {
        &self.instances
    }

    pub(crate) fn attach(&mut self, instance_id: ResourceId) -> EntityResult<()> {
        if self.instances.contains(&instance_id) {
            return Err(EntityError::duplicate(EntityKind::Instance, instance_id));
        }
        self.instances.push(instance_id);
        Ok(())
    }

    /// Returns whether the instance was attached.
    pub(crate) fn detach(&mut self, instance_id: &str) -> bool {
        let before = self.instances.len();
        self.instances.retain(|id| id.as_str() != instance_id);
        self.instances.len() != before
    }
}

fn checked_port(port: i64, max_port: u16, lb_name: &str) -> EntityResult<u16> {
    u16::try_from(port)
        .ok()
        .filter(|&p| p != 0 && p <= max_port)
        .ok_or_else(|| EntityError::InvalidField {
            field: "ports",
            reason: format!("port {port} on load balancer {lb_name} is outside 1..={max_port}"),
        })
}
