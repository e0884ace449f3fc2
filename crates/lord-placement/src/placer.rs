//! Greedy least-loaded placement.

use thiserror::Error;
use tracing::debug;

use lord_core::ResourceId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("no nodes available for placement")]
    NoAvailableNodes,
}

/// One node's current load, as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLoad {
    pub node_id: ResourceId,
    pub instance_count: usize,
}

impl NodeLoad {
    pub fn new(node_id: ResourceId, instance_count: usize) -> Self {
        Self {
            node_id,
            instance_count,
        }
    }
}

/// Pick the node with the fewest instances.
///
/// Ties go to the first node in snapshot order.
pub fn get_next(nodes: &[NodeLoad]) -> Result<ResourceId, PlacementError> {
    // `min_by_key` returns the first of equal minima.
    let chosen = nodes
        .iter()
        .min_by_key(|node| node.instance_count)
        .ok_or(PlacementError::NoAvailableNodes)?;

    debug!(
        node = %chosen.node_id,
        load = chosen.instance_count,
        candidates = nodes.len(),
        "placement decided"
    );
    Ok(chosen.node_id.clone())
}
