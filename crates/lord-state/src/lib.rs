//! lord-state — in-memory entity model for the Lord control plane.
//!
//! A [`Service`] is the root aggregate. It exclusively owns its
//! [`Instance`] records; [`Node`]s and [`LoadBalancer`]s only hold instance
//! ids. All membership changes go through `Service` so the instance map and
//! the per-node membership sets never drift apart.
//!
//! # Layout
//!
//! ```text
//! Service
//!   ├── instances: id → Instance (owned records)
//!   ├── nodes: id → Node
//!   │     └── instances: {id}  (membership only)
//!   └── load_balancers: id → LoadBalancer
//!         └── instances: [id]
//! ```

pub mod error;
pub mod instance;
pub mod load_balancer;
pub mod node;
pub mod service;

pub use error::{EntityError, EntityKind, EntityResult};
pub use instance::Instance;
pub use load_balancer::LoadBalancer;
pub use node::{Node, NodeNetwork};
pub use service::Service;
