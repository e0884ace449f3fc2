pub mod config;
pub mod id;
pub mod names;

pub use config::{Limits, LordConfig, RuntimeSettings, TeardownPolicy};
pub use id::{IdError, ResourceId};
