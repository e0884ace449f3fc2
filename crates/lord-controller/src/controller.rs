//! Service controller — the registry of services and the only entry point
//! for mutating them.
//!
//! Every mutation of a service runs while holding that service's lock, so
//! commands against one service are applied in sequence while different
//! services proceed independently. The registry lock is never held across
//! a runtime call.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use lord_core::{Limits, ResourceId, TeardownPolicy};
use lord_runtime::ContainerRuntime;
use lord_runtime::output::{build_identifier, instance_identifier};
use lord_state::{EntityError, EntityKind, LoadBalancer, Node, Service};

use crate::error::ControllerResult;
use crate::teardown::teardown;

const REGISTRY_OWNER: &str = "the controller";

/// Registry entry for one service.
struct ServiceSlot {
    /// Copy of the service's name, for lookups without taking its lock.
    name: String,
    service: Arc<Mutex<Service>>,
}

/// Owns all services and drives the container runtime on their behalf.
pub struct ServiceController {
    runtime: Arc<dyn ContainerRuntime>,
    limits: Limits,
    teardown: TeardownPolicy,
    /// Active services: service_id → slot.
    services: RwLock<BTreeMap<ResourceId, ServiceSlot>>,
}

impl ServiceController {
    /// Create a controller with an empty registry.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, limits: Limits, teardown: TeardownPolicy) -> Self {
        Self {
            runtime,
            limits,
            teardown,
            services: RwLock::new(BTreeMap::new()),
        }
    }

    /// Capacity limits applied to every service.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    // ── Services ───────────────────────────────────────────────────

    /// Build the service's image and register the service.
    ///
    /// Returns the short build identifier. Nothing is registered if the
    /// build fails.
    pub async fn add_service(&self, service: Service) -> ControllerResult<String> {
        let service_id = service.id().clone();
        if self.services.read().await.contains_key(&service_id) {
            return Err(EntityError::duplicate(EntityKind::Service, &service_id).into());
        }

        let output = self.runtime.build(service.image_reference()).await?;
        let build_id = build_identifier(&output)?;

        let mut services = self.services.write().await;
        // Another caller may have registered the same id while we built.
        if services.contains_key(&service_id) {
            return Err(EntityError::duplicate(EntityKind::Service, &service_id).into());
        }
        info!(
            %service_id,
            name = service.name(),
            image = service.image_reference(),
            %build_id,
            "service registered"
        );
        services.insert(
            service_id,
            ServiceSlot {
                name: service.name().to_string(),
                service: Arc::new(Mutex::new(service)),
            },
        );
        Ok(build_id)
    }

    /// Unregister a service by id, or failing that by name.
    ///
    /// When several services share the name, the one with the smallest id
    /// is removed. Containers of the removed service's instances are left
    /// running. Returns whether anything was removed.
    pub async fn remove_service(&self, identifier: &str) -> ControllerResult<bool> {
        let mut services = self.services.write().await;
        if services.is_empty() {
            return Err(EntityError::EmptyCollection {
                kind: EntityKind::Service,
                owner: REGISTRY_OWNER.to_string(),
            }
            .into());
        }

        if services.remove(identifier).is_some() {
            info!(service_id = identifier, "service removed");
            return Ok(true);
        }

        let matches: Vec<ResourceId> = services
            .iter()
            .filter(|(_, slot)| slot.name == identifier)
            .map(|(id, _)| id.clone())
            .collect();
        let Some(service_id) = matches.first() else {
            return Ok(false);
        };
        if matches.len() > 1 {
            warn!(
                name = identifier,
                candidates = matches.len(),
                %service_id,
                "service name is ambiguous, removing the smallest id"
            );
        }
        services.remove(service_id);
        info!(%service_id, name = identifier, "service removed");
        Ok(true)
    }

    /// Ids of all registered services, sorted.
    pub async fn list_services(&self) -> BTreeSet<ResourceId> {
        self.services.read().await.keys().cloned().collect()
    }

    /// Number of registered services.
    pub async fn service_count(&self) -> usize {
        self.services.read().await.len()
    }

    /// A point-in-time copy of a service.
    pub async fn service_snapshot(&self, service_id: &str) -> ControllerResult<Service> {
        let handle = self.service_handle(service_id).await?;
        let service = handle.lock().await;
        Ok(service.clone())
    }

    async fn service_handle(&self, service_id: &str) -> ControllerResult<Arc<Mutex<Service>>> {
        self.services
            .read()
            .await
            .get(service_id)
            .map(|slot| Arc::clone(&slot.service))
            .ok_or_else(|| EntityError::not_found(EntityKind::Service, service_id).into())
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Start a container from the service's image and place it as a new
    /// instance on the least-loaded node.
    ///
    /// Capacity and node availability are checked before the container is
    /// started. If registration still fails the container is torn down
    /// again.
    pub async fn add_instance_to_service(&self, service_id: &str) -> ControllerResult<ResourceId> {
        let handle = self.service_handle(service_id).await?;
        let mut service = handle.lock().await;
        service.ensure_schedulable(&self.limits)?;

        let output = self.runtime.run(service.image_reference()).await?;
        let container_id = instance_identifier(&output)?;

        let placed = ResourceId::new(container_id.clone())
            .map_err(|err| EntityError::invalid_id("instance id", err))
            .and_then(|instance_id| service.schedule_instance(instance_id, &self.limits));

        match placed {
            Ok(instance_id) => {
                let node_id = service
                    .instance(instance_id.as_str())
                    .map(|instance| instance.node_id().to_string())
                    .unwrap_or_default();
                info!(
                    %service_id,
                    %instance_id,
                    %node_id,
                    "instance scheduled"
                );
                Ok(instance_id)
            }
            Err(err) => {
                warn!(
                    %service_id,
                    %container_id,
                    error = %err,
                    "instance registration failed, discarding container"
                );
                if let Err(rollback) = teardown(&*self.runtime, &container_id, &self.teardown).await {
                    warn!(%container_id, error = %rollback, "container rollback failed");
                }
                Err(err.into())
            }
        }
    }

    /// Unregister an instance and tear down its container.
    ///
    /// Returns `false` (and touches no container) if the service has no
    /// such instance. The instance is unregistered before teardown starts,
    /// so a teardown failure leaves only an orphaned container behind.
    pub async fn remove_instance_from_service(
        &self,
        instance_id: &str,
        service_id: &str,
    ) -> ControllerResult<bool> {
        if self.services.read().await.is_empty() {
            return Err(EntityError::EmptyCollection {
                kind: EntityKind::Service,
                owner: REGISTRY_OWNER.to_string(),
            }
            .into());
        }
        let handle = self.service_handle(service_id).await?;
        let mut service = handle.lock().await;

        if !service.remove_instance(instance_id)? {
            return Ok(false);
        }
        info!(%service_id, instance_id, "instance unregistered, tearing down");

        match teardown(&*self.runtime, instance_id, &self.teardown).await {
            Ok(_) => Ok(true),
            Err(err) => {
                warn!(%service_id, instance_id, error = %err, "container teardown failed");
                Err(err)
            }
        }
    }

    /// Addresses of a service's instance containers, as the runtime reports them.
    pub async fn instance_addresses(
        &self,
        service_id: &str,
    ) -> ControllerResult<BTreeMap<ResourceId, Option<IpAddr>>> {
        let handle = self.service_handle(service_id).await?;
        let instance_ids: Vec<ResourceId> = handle.lock().await.instances().keys().cloned().collect();

        let mut addresses = BTreeMap::new();
        for instance_id in instance_ids {
            let metadata = self.runtime.inspect(instance_id.as_str()).await?;
            addresses.insert(instance_id, metadata.ip_address);
        }
        Ok(addresses)
    }

    // ── Nodes and load balancers ───────────────────────────────────

    /// Register a node with a service.
    pub async fn add_node_to_service(&self, service_id: &str, node: Node) -> ControllerResult<()> {
        let handle = self.service_handle(service_id).await?;
        let node_id = node.id().clone();
        handle.lock().await.add_node(node, &self.limits)?;
        info!(%service_id, %node_id, "node added");
        Ok(())
    }

    /// Remove an empty node. Returns whether it existed.
    pub async fn remove_node_from_service(&self, service_id: &str, node_id: &str) -> ControllerResult<bool> {
        let handle = self.service_handle(service_id).await?;
        let removed = handle.lock().await.remove_node(node_id)?;
        if removed {
            info!(%service_id, node_id, "node removed");
        }
        Ok(removed)
    }

    /// Register a load balancer with a service.
    pub async fn add_load_balancer_to_service(
        &self,
        service_id: &str,
        load_balancer: LoadBalancer,
    ) -> ControllerResult<()> {
        let handle = self.service_handle(service_id).await?;
        let load_balancer_id = load_balancer.id().clone();
        handle.lock().await.add_load_balancer(load_balancer, &self.limits)?;
        info!(%service_id, %load_balancer_id, "load balancer added");
        Ok(())
    }

    /// Returns whether the load balancer existed.
    pub async fn remove_load_balancer_from_service(
        &self,
        service_id: &str,
        load_balancer_id: &str,
    ) -> ControllerResult<bool> {
        let handle = self.service_handle(service_id).await?;
        let removed = handle.lock().await.remove_load_balancer(load_balancer_id)?;
        if removed {
            info!(%service_id, load_balancer_id, "load balancer removed");
        }
        Ok(removed)
    }

    /// Route a load balancer to one of the service's instances.
    pub async fn attach_instance_to_load_balancer(
        &self,
        service_id: &str,
        load_balancer_id: &str,
        instance_id: &str,
    ) -> ControllerResult<()> {
        let handle = self.service_handle(service_id).await?;
        handle
            .lock()
            .await
            .attach_to_load_balancer(load_balancer_id, instance_id)?;
        info!(%service_id, load_balancer_id, instance_id, "instance attached to load balancer");
        Ok(())
    }
}
