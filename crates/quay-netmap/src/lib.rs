//! Deterministic data placement for a distributed object store.
//!
//! A [`NetMap`] is an epoch-stamped snapshot of the storage nodes known to
//! the network. A [`PlacementPolicy`] declares how many replicas or
//! erasure-coded parts a container needs and constrains which nodes may
//! hold them through filters (attribute predicates) and selectors
//! (bucketing rules). Resolution is a pure function of the map, the policy,
//! and a pivot identifier: every party that shares those inputs computes
//! the same node lists without coordination.
//!
//! [`NetMap::container_nodes`] resolves a policy into per-rule node
//! vectors for a container; [`NetMap::placement_vectors`] re-orders those
//! vectors for an individual object. Ordering uses weighted rendezvous
//! hashing from the `quay-hrw` crate, with node weights derived from the
//! declared `Capacity` and `Price` attributes.
//!
//! Policies can be built programmatically or parsed from the textual
//! grammar:
//!
//! ```
//! use quay_netmap::PlacementPolicy;
//!
//! let policy: PlacementPolicy = "\
//!     REP 2 IN CityNodes\n\
//!     SELECT 2 IN City FROM Trusted AS CityNodes\n\
//!     FILTER Rating GT 5 AS Trusted"
//!     .parse()?;
//! assert_eq!(policy.replicas()[0].count(), 2);
//! # Ok::<(), quay_netmap::ParseError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod context;
pub mod error;
mod filter;
pub mod netmap;
pub mod node;
pub mod parser;
pub mod policy;
mod selector;
mod weight;

pub use error::{PlacementError, Result};
pub use netmap::NetMap;
pub use node::{AttributeError, Attributes, NodeInfo, NodeState};
pub use parser::ParseError;
pub use policy::{
    Clause, EcRule, Filter, Op, PlacementPolicy, ReplicaDescriptor, Selector,
    DEFAULT_BACKUP_FACTOR, MAX_EC_PARTS, MAX_EC_RULES, WILDCARD_FILTER,
};
