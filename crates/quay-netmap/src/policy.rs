//! Declarative placement policy model.
//!
//! A placement policy describes how many object copies (or erasure-coded
//! parts) a container needs and which nodes are eligible to hold them:
//! replica descriptors and EC rules reference selectors, selectors group
//! filtered nodes into buckets, and filters are boolean predicate trees
//! over node attributes.

use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, Result};

/// Reserved filter name meaning "all nodes, unfiltered".
pub const WILDCARD_FILTER: &str = "*";

/// Backup factor applied when the policy leaves it unset.
pub const DEFAULT_BACKUP_FACTOR: u32 = 3;

/// Maximum number of EC rules in one policy.
pub const MAX_EC_RULES: usize = 4;

/// Maximum total part count (data + parity) of an EC rule, and the maximum
/// number of nodes an EC bucket may resolve to.
pub const MAX_EC_PARTS: u32 = 64;

/// Filter comparison / composition operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Op {
    /// Operation is not set; rejected at compile time.
    #[default]
    Unspecified,
    /// String equality on an attribute value.
    Eq,
    /// String inequality on an attribute value.
    Ne,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-or-equal.
    Ge,
    /// Numeric less-than.
    Lt,
    /// Numeric less-or-equal.
    Le,
    /// All sub-filters must match.
    And,
    /// At least one sub-filter must match.
    Or,
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::And => "AND",
            Self::Or => "OR",
        };
        write!(f, "{s}")
    }
}

/// Selector bucket-count clause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Clause {
    /// Not set; treated as [`Clause::Distinct`].
    #[default]
    Unspecified,
    /// One bucket holding `count` nodes.
    Same,
    /// `count` distinct buckets holding at least one node each.
    Distinct,
}

/// A named or anonymous predicate over node attributes.
///
/// Leaf filters compare one attribute; `AND`/`OR` filters compose
/// sub-filters, which may be inline or references (by name) to previously
/// declared top-level filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    name: String,
    key: String,
    op: Op,
    value: String,
    sub_filters: Vec<Filter>,
}

impl Filter {
    fn leaf(op: Op, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { op, key: key.into(), value: value.into(), ..Self::default() }
    }

    /// Attribute equals value.
    #[must_use]
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::leaf(Op::Eq, key, value)
    }

    /// Attribute differs from value.
    #[must_use]
    pub fn ne(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::leaf(Op::Ne, key, value)
    }

    /// Numeric attribute greater than value.
    #[must_use]
    pub fn gt(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::leaf(Op::Gt, key, value)
    }

    /// Numeric attribute greater than or equal to value.
    #[must_use]
    pub fn ge(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::leaf(Op::Ge, key, value)
    }

    /// Numeric attribute less than value.
    #[must_use]
    pub fn lt(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::leaf(Op::Lt, key, value)
    }

    /// Numeric attribute less than or equal to value.
    #[must_use]
    pub fn le(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::leaf(Op::Le, key, value)
    }

    /// Conjunction of sub-filters.
    #[must_use]
    pub fn and(sub_filters: Vec<Filter>) -> Self {
        Self { op: Op::And, sub_filters, ..Self::default() }
    }

    /// Disjunction of sub-filters.
    #[must_use]
    pub fn or(sub_filters: Vec<Filter>) -> Self {
        Self { op: Op::Or, sub_filters, ..Self::default() }
    }

    /// Reference to a previously declared top-level filter.
    ///
    /// References resolve through the compiled-filter cache during
    /// resolution, so a filter declared once can back several parents
    /// without duplicating its sub-tree.
    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Names this filter, making it referenceable.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the filter name (empty for anonymous filters).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the attribute key of a leaf filter.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the operation.
    #[must_use]
    pub fn op(&self) -> Op {
        self.op
    }

    /// Returns the comparison literal of a leaf filter.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the sub-filters of an AND/OR filter.
    #[must_use]
    pub fn sub_filters(&self) -> &[Filter] {
        &self.sub_filters
    }
}

/// A rule grouping matching nodes into buckets and picking a required
/// number of buckets or nodes per bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    name: String,
    attribute: String,
    count: u32,
    clause: Clause,
    filter: String,
}

impl Selector {
    /// Creates a selector over the wildcard filter with the given count.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self { count, filter: WILDCARD_FILTER.to_string(), ..Self::default() }
    }

    /// Ad-hoc unnamed-replica selector: `count` singleton buckets over the
    /// whole map.
    pub(crate) fn wildcard(count: u32) -> Self {
        Self::new(count).named(WILDCARD_FILTER)
    }

    /// Names the selector so replica descriptors and EC rules can
    /// reference it.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the bucketing attribute. An empty attribute (the default)
    /// makes every matching node its own bucket.
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    /// Sets the bucket-count clause.
    #[must_use]
    pub fn with_clause(mut self, clause: Clause) -> Self {
        self.clause = clause;
        self
    }

    /// Restricts the selector to nodes matching a declared filter.
    #[must_use]
    pub fn from_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Returns the selector name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bucketing attribute.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Returns the declared count of buckets (or nodes, under
    /// [`Clause::Same`]).
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns the clause.
    #[must_use]
    pub fn clause(&self) -> Clause {
        self.clause
    }

    /// Returns the referenced filter name.
    #[must_use]
    pub fn filter_name(&self) -> &str {
        &self.filter
    }
}

/// A requirement for a number of full object copies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaDescriptor {
    count: u32,
    selector: String,
}

impl ReplicaDescriptor {
    /// Requires `count` copies over the implicit selector.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self { count, selector: String::new() }
    }

    /// Binds the requirement to a named selector.
    #[must_use]
    pub fn in_selector(mut self, name: impl Into<String>) -> Self {
        self.selector = name.into();
        self
    }

    /// Returns the copy count.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns the referenced selector name (empty for the implicit
    /// selector).
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }
}

/// A requirement for erasure-coded object parts.
///
/// Only the part-count rule lives here; the coding transform itself is a
/// separate concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcRule {
    data_parts: u32,
    parity_parts: u32,
    selector: String,
}

impl EcRule {
    /// Requires `data` data parts and `parity` parity parts.
    #[must_use]
    pub fn new(data: u32, parity: u32) -> Self {
        Self { data_parts: data, parity_parts: parity, selector: String::new() }
    }

    /// Binds the rule to a named selector.
    #[must_use]
    pub fn in_selector(mut self, name: impl Into<String>) -> Self {
        self.selector = name.into();
        self
    }

    /// Returns the data part count.
    #[must_use]
    pub fn data_parts(&self) -> u32 {
        self.data_parts
    }

    /// Returns the parity part count.
    #[must_use]
    pub fn parity_parts(&self) -> u32 {
        self.parity_parts
    }

    /// Returns the total part count.
    #[must_use]
    pub fn total_parts(&self) -> u32 {
        self.data_parts + self.parity_parts
    }

    /// Returns the referenced selector name (empty for the wildcard
    /// selector).
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }
}

/// The aggregate placement policy for a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    replicas: Vec<ReplicaDescriptor>,
    ec_rules: Vec<EcRule>,
    backup_factor: u32,
    selectors: Vec<Selector>,
    filters: Vec<Filter>,
    subnet: Option<u32>,
}

impl PlacementPolicy {
    /// Creates an empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a replica descriptor.
    #[must_use]
    pub fn with_replica(mut self, replica: ReplicaDescriptor) -> Self {
        self.replicas.push(replica);
        self
    }

    /// Appends an EC rule.
    #[must_use]
    pub fn with_ec_rule(mut self, rule: EcRule) -> Self {
        self.ec_rules.push(rule);
        self
    }

    /// Sets the container backup factor. Zero falls back to
    /// [`DEFAULT_BACKUP_FACTOR`] during resolution.
    #[must_use]
    pub fn with_backup_factor(mut self, cbf: u32) -> Self {
        self.backup_factor = cbf;
        self
    }

    /// Appends a selector declaration.
    #[must_use]
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Appends a top-level filter declaration.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Restricts the policy to nodes belonging to the given subnet.
    #[must_use]
    pub fn with_subnet(mut self, subnet: u32) -> Self {
        self.subnet = Some(subnet);
        self
    }

    /// Returns the replica descriptors.
    #[must_use]
    pub fn replicas(&self) -> &[ReplicaDescriptor] {
        &self.replicas
    }

    /// Returns the EC rules.
    #[must_use]
    pub fn ec_rules(&self) -> &[EcRule] {
        &self.ec_rules
    }

    /// Returns the declared backup factor (0 when unset).
    #[must_use]
    pub fn backup_factor(&self) -> u32 {
        self.backup_factor
    }

    /// Returns the selector declarations.
    #[must_use]
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// Returns the top-level filter declarations.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns the subnet scope, if any.
    #[must_use]
    pub fn subnet(&self) -> Option<u32> {
        self.subnet
    }

    /// Validates the EC rules of this policy.
    ///
    /// # Errors
    ///
    /// Returns an error when a rule declares a zero part count, more than
    /// [`MAX_EC_PARTS`] total parts, or when the policy holds more than
    /// [`MAX_EC_RULES`] rules.
    pub fn validate_ec(&self) -> Result<()> {
        if self.ec_rules.len() > MAX_EC_RULES {
            return Err(PlacementError::TooManyEcRules);
        }
        for (i, rule) in self.ec_rules.iter().enumerate() {
            if rule.data_parts == 0 || rule.parity_parts == 0 {
                return Err(PlacementError::EcZeroParts(i));
            }
            if rule.total_parts() > MAX_EC_PARTS {
                return Err(PlacementError::EcTooManyParts(i));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ec_rule_part_limit() {
        let ok = PlacementPolicy::new().with_ec_rule(EcRule::new(60, 4));
        assert!(ok.validate_ec().is_ok());

        let over = PlacementPolicy::new().with_ec_rule(EcRule::new(60, 5));
        let err = over.validate_ec().unwrap_err();
        assert!(err.to_string().contains("more than 64 total parts"));
    }

    #[test]
    fn test_ec_rule_zero_parts() {
        let policy = PlacementPolicy::new().with_ec_rule(EcRule::new(0, 4));
        assert!(matches!(policy.validate_ec(), Err(PlacementError::EcZeroParts(0))));

        let policy = PlacementPolicy::new().with_ec_rule(EcRule::new(4, 0));
        assert!(matches!(policy.validate_ec(), Err(PlacementError::EcZeroParts(0))));
    }

    #[test]
    fn test_ec_rule_count_limit() {
        let mut policy = PlacementPolicy::new();
        for _ in 0..4 {
            policy = policy.with_ec_rule(EcRule::new(3, 1));
        }
        assert!(policy.validate_ec().is_ok());

        let policy = policy.with_ec_rule(EcRule::new(3, 1));
        assert!(matches!(policy.validate_ec(), Err(PlacementError::TooManyEcRules)));
    }

    #[test]
    fn test_filter_builders() {
        let f = Filter::and(vec![
            Filter::eq("Country", "Russia"),
            Filter::reference("Rated"),
        ])
        .named("FromRU");

        assert_eq!(f.name(), "FromRU");
        assert_eq!(f.op(), Op::And);
        assert_eq!(f.sub_filters().len(), 2);
        assert_eq!(f.sub_filters()[1].name(), "Rated");
        assert_eq!(f.sub_filters()[1].op(), Op::Unspecified);
    }

    #[test]
    fn test_policy_serde_round_trip() {
        let policy = PlacementPolicy::new()
            .with_replica(ReplicaDescriptor::new(2).in_selector("S"))
            .with_backup_factor(2)
            .with_selector(
                Selector::new(2).named("S").with_attribute("City").from_filter("F"),
            )
            .with_filter(Filter::eq("Country", "Russia").named("F"));

        let json = serde_json::to_string(&policy).unwrap();
        let back: PlacementPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }
}
