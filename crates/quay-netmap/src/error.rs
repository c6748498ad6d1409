//! Error types for policy validation and placement resolution.

use thiserror::Error;

use crate::policy::Op;

/// A specialized `Result` type for placement operations.
pub type Result<T> = std::result::Result<T, PlacementError>;

/// Errors that can occur while compiling a placement policy or resolving
/// it against a network map.
///
/// Validation errors are detected while compiling the policy's filters and
/// selectors; resolution errors are detected while selecting nodes from an
/// otherwise valid policy. Neither is retried internally: the caller decides
/// whether to re-resolve against a refreshed map.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// A declared filter uses the reserved wildcard name.
    #[error("invalid filter name: '{0}' is reserved")]
    ReservedFilterName(String),

    /// A top-level filter has no name.
    #[error("unnamed top-level filter")]
    UnnamedTopLevelFilter,

    /// A comparison filter carries sub-filters.
    #[error("leaf filter must not have sub-filters")]
    LeafWithSubFilters,

    /// An AND/OR filter has no sub-filters to combine.
    #[error("empty sub-filter list for AND/OR filter")]
    EmptySubFilters,

    /// A filter uses an operation outside the supported set.
    #[error("invalid filter operation: {0}")]
    InvalidFilterOp(Op),

    /// An ordering comparison's literal does not parse as an unsigned
    /// 64-bit integer.
    #[error("invalid numeric literal: '{0}'")]
    InvalidNumericLiteral(String),

    /// A named sub-filter does not refer to a declared top-level filter.
    #[error("filter not found: '{0}'")]
    FilterNotFound(String),

    /// A selector references an undeclared filter.
    #[error("filter not found: SELECT FROM '{0}'")]
    SelectorFilterNotFound(String),

    /// Context wrapper for a top-level filter that failed validation.
    #[error("process filter #{index} ({name}): {source}")]
    ProcessFilter {
        /// Position of the filter in the policy.
        index: usize,
        /// Declared filter name.
        name: String,
        /// The underlying violation.
        #[source]
        source: Box<PlacementError>,
    },

    /// Context wrapper for a sub-filter that failed validation.
    #[error("process inner filter #{index}: {source}")]
    ProcessInnerFilter {
        /// Position of the sub-filter within its parent.
        index: usize,
        /// The underlying violation.
        #[source]
        source: Box<PlacementError>,
    },

    /// A selector cannot be satisfied by the current network map, even
    /// after degrading the backup factor to the declared minimum.
    #[error("not enough nodes to SELECT from '{0}'")]
    NotEnoughNodes(String),

    /// A replica descriptor references an undeclared selector.
    #[error("selector not found: REPLICA '{0}'")]
    ReplicaSelectorNotFound(String),

    /// An EC rule references an undeclared selector.
    #[error("selector not found: EC '{0}'")]
    EcSelectorNotFound(String),

    /// An EC rule declares a zero data or parity part count.
    #[error("invalid EC rule #{0}: zero data or parity parts")]
    EcZeroParts(usize),

    /// An EC rule declares more total parts than a single bucket may hold.
    #[error("invalid EC rule #{0}: more than 64 total parts")]
    EcTooManyParts(usize),

    /// The policy declares more EC rules than supported.
    #[error("more than 4 EC rules in policy")]
    TooManyEcRules,

    /// The selector backing an EC rule resolved to an oversized bucket.
    #[error("EC rule over selector '{0}': more than 64 nodes in bucket")]
    EcBucketTooLarge(String),
}
