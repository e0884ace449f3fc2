//! lord-controller — the stateful core of the Lord control plane.
//!
//! [`ServiceController`] owns the service registry and is the only place
//! where entity mutations, placement, and container runtime calls meet.
//! [`ControlPlane`] turns transport-level commands into controller calls
//! and produces exactly one reply per command.
//!
//! # Architecture
//!
//! ```text
//! ControlPlane (Command → Reply)
//!   └── ServiceController
//!       ├── registry: id → slot (name + Mutex<Service>)
//!       ├── Limits (capacity checks)
//!       ├── ContainerRuntime (build / run / stop / rm / ps / inspect)
//!       └── teardown (bounded stop → poll → rm)
//! ```

pub mod control_plane;
pub mod controller;
pub mod error;
pub mod teardown;

pub use control_plane::{Command, ControlPlane, Envelope, Reply, ReplyEnvelope};
pub use controller::ServiceController;
pub use error::{ControllerError, ControllerResult};
