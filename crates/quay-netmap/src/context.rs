//! Per-call placement resolution state.

use std::collections::HashMap;

use crate::netmap::NetMap;
use crate::node::NodeInfo;
use crate::policy::{Filter, PlacementPolicy, DEFAULT_BACKUP_FACTOR};
use crate::weight::WeightFunc;

/// Single-threaded evaluation state for one resolution call.
///
/// Holds the compiled filter/selector caches and the pivot hash for exactly
/// one `container_nodes` invocation and is discarded afterward; nothing is
/// cached across calls. The network map and policy are borrowed read-only
/// for the lifetime of the context.
pub(crate) struct Context<'a> {
    pub(crate) netmap: &'a NetMap,
    pub(crate) policy: &'a PlacementPolicy,
    /// Pivot byte string; empty means no rendezvous ordering.
    pub(crate) pivot: Vec<u8>,
    pub(crate) pivot_hash: u64,
    /// Effective container backup factor.
    pub(crate) cbf: u32,
    /// Compiled top-level filters by name.
    pub(crate) filters: HashMap<&'a str, &'a Filter>,
    /// Resolved node-bucket sets by selector name. Buckets hold indices
    /// into the network map's node list.
    pub(crate) selections: HashMap<&'a str, Vec<Vec<usize>>>,
    /// Numeric comparison literals, parsed once at compile time.
    pub(crate) num_cache: HashMap<&'a str, u64>,
    pub(crate) weight: WeightFunc,
}

impl<'a> Context<'a> {
    pub(crate) fn new(netmap: &'a NetMap, policy: &'a PlacementPolicy) -> Self {
        let cbf = match policy.backup_factor() {
            0 => DEFAULT_BACKUP_FACTOR,
            cbf => cbf,
        };
        Self {
            netmap,
            policy,
            pivot: Vec::new(),
            pivot_hash: 0,
            cbf,
            filters: HashMap::new(),
            selections: HashMap::new(),
            num_cache: HashMap::new(),
            weight: WeightFunc::from_netmap(netmap),
        }
    }

    pub(crate) fn set_pivot(&mut self, pivot: &[u8]) {
        if !pivot.is_empty() {
            self.pivot = pivot.to_vec();
            self.pivot_hash = quay_hrw::hash(pivot);
        }
    }

    /// Clones the nodes of the given buckets into one flat list,
    /// preserving bucket order.
    pub(crate) fn flatten(&self, buckets: &[Vec<usize>]) -> Vec<NodeInfo> {
        buckets
            .iter()
            .flat_map(|b| b.iter().map(|&i| self.netmap.nodes()[i].clone()))
            .collect()
    }
}
