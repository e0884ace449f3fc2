//! lord-placement — decides which node receives a new instance.
//!
//! Placement is a pure function over a snapshot of node loads. It keeps no
//! state between calls; callers must take a fresh snapshot every time, since
//! loads change as instances come and go.

pub mod placer;

pub use placer::{NodeLoad, PlacementError, get_next};
