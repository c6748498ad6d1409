//! Epoch-stamped network map and the top-level resolution entry points.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::Context;
use crate::error::{PlacementError, Result};
use crate::node::NodeInfo;
use crate::policy::{PlacementPolicy, Selector, MAX_EC_PARTS};
use crate::weight::WeightFunc;

/// An epoch-stamped, ordered collection of storage nodes.
///
/// Node order is significant: it keeps iteration stable and breaks
/// rendezvous ties, so two maps with the same nodes in a different order
/// are not interchangeable. The map is treated as an immutable snapshot
/// for the duration of a resolution call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetMap {
    epoch: u64,
    nodes: Vec<NodeInfo>,
}

impl NetMap {
    /// Creates a map for the given epoch.
    #[must_use]
    pub fn new(epoch: u64, nodes: Vec<NodeInfo>) -> Self {
        Self { epoch, nodes }
    }

    /// Returns the epoch this snapshot was taken at.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the nodes in their caller-significant order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    /// Resolves which nodes must hold a container's data.
    ///
    /// Compiles the policy's filters and selectors against this map, then
    /// assembles one ordered node list per replica descriptor and per EC
    /// rule, in declaration order. A non-empty `pivot` (the container
    /// identifier) switches bucket ordering to weighted rendezvous hashing;
    /// an empty pivot falls back to hash/attribute sorting so the result is
    /// still deterministic.
    ///
    /// Neither the map nor the policy is mutated; the call either returns
    /// the full matrix or the first error encountered.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed policy, or a resolution
    /// error when a selector cannot be satisfied by this map.
    pub fn container_nodes(
        &self,
        policy: &PlacementPolicy,
        pivot: &[u8],
    ) -> Result<Vec<Vec<NodeInfo>>> {
        debug!(
            epoch = self.epoch,
            replicas = policy.replicas().len(),
            ec_rules = policy.ec_rules().len(),
            "resolving container nodes"
        );

        policy.validate_ec()?;

        let mut ctx = Context::new(self, policy);
        ctx.set_pivot(pivot);
        ctx.process_filters()?;
        ctx.process_selectors()?;

        let mut result = Vec::with_capacity(policy.replicas().len() + policy.ec_rules().len());

        for replica in policy.replicas() {
            let name = replica.selector();
            if name.is_empty() {
                if policy.selectors().is_empty() {
                    // No selectors declared at all: synthesize an ad-hoc
                    // selector of the requested size over the whole map.
                    let s = Selector::wildcard(replica.count());
                    let buckets = ctx.get_selection(&s)?;
                    result.push(ctx.flatten(&buckets));
                } else {
                    // Implicit selector: the union of every declared
                    // selector's resolution.
                    let mut nodes = Vec::new();
                    for s in policy.selectors() {
                        if let Some(buckets) = ctx.selections.get(s.name()) {
                            nodes.extend(ctx.flatten(buckets));
                        }
                    }
                    result.push(nodes);
                }
            } else {
                let buckets = ctx
                    .selections
                    .get(name)
                    .ok_or_else(|| PlacementError::ReplicaSelectorNotFound(name.to_string()))?;
                result.push(ctx.flatten(buckets));
            }
        }

        for rule in policy.ec_rules() {
            let name = rule.selector();
            let buckets = if name.is_empty() {
                ctx.get_selection(&Selector::wildcard(rule.total_parts()))?
            } else {
                ctx.selections
                    .get(name)
                    .ok_or_else(|| PlacementError::EcSelectorNotFound(name.to_string()))?
                    .clone()
            };
            for bucket in &buckets {
                if bucket.len() > MAX_EC_PARTS as usize {
                    return Err(PlacementError::EcBucketTooLarge(name.to_string()));
                }
            }
            result.push(ctx.flatten(&buckets));
        }

        Ok(result)
    }

    /// Re-sorts an already-resolved node matrix for a specific object.
    ///
    /// Applies weighted rendezvous ordering to each vector using the
    /// object identifier as pivot and the capacity/price weight function
    /// recomputed over this map. Pure re-ordering: membership never
    /// changes, and the result is deterministic for a fixed map, matrix,
    /// and pivot.
    #[must_use]
    pub fn placement_vectors(
        &self,
        vectors: &[Vec<NodeInfo>],
        pivot: &[u8],
    ) -> Vec<Vec<NodeInfo>> {
        let wf = WeightFunc::from_netmap(self);
        let pivot_hash = quay_hrw::hash(pivot);

        vectors
            .iter()
            .map(|vector| {
                let mut vector = vector.clone();
                let weights: Vec<f64> = vector.iter().map(|n| wf.weight(n)).collect();
                quay_hrw::sort_by_weight(&mut vector, &weights, pivot_hash);
                vector
            })
            .collect()
    }
}
