//! Filter compilation and per-node matching.

use crate::context::Context;
use crate::error::{PlacementError, Result};
use crate::node::{NodeInfo, ATTR_CAPACITY, ATTR_PRICE};
use crate::policy::{Filter, Op, WILDCARD_FILTER};

impl<'a> Context<'a> {
    /// Compiles every top-level filter of the policy.
    ///
    /// Validation is all-or-nothing: the first violation aborts with its
    /// position and filter name, and no partial filter cache survives into
    /// selection.
    pub(crate) fn process_filters(&mut self) -> Result<()> {
        let policy = self.policy;
        for (i, f) in policy.filters().iter().enumerate() {
            self.process_filter(f, true).map_err(|e| PlacementError::ProcessFilter {
                index: i,
                name: f.name().to_string(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    fn process_filter(&mut self, f: &'a Filter, top: bool) -> Result<()> {
        let name = f.name();
        if name == WILDCARD_FILTER {
            return Err(PlacementError::ReservedFilterName(name.to_string()));
        }
        if top && name.is_empty() {
            return Err(PlacementError::UnnamedTopLevelFilter);
        }
        if !top && !name.is_empty() && !self.filters.contains_key(name) {
            // Named references must resolve to an already-compiled
            // top-level filter; forward references are rejected.
            return Err(PlacementError::FilterNotFound(name.to_string()));
        }

        match f.op() {
            Op::And | Op::Or => {
                if f.sub_filters().is_empty() {
                    return Err(PlacementError::EmptySubFilters);
                }
                for (i, inner) in f.sub_filters().iter().enumerate() {
                    self.process_filter(inner, false).map_err(|e| {
                        PlacementError::ProcessInnerFilter { index: i, source: Box::new(e) }
                    })?;
                }
            }
            op => {
                if !f.sub_filters().is_empty() {
                    return Err(PlacementError::LeafWithSubFilters);
                }
                if !top && !name.is_empty() {
                    // Resolved reference: the target was validated when it
                    // was declared.
                } else {
                    match op {
                        Op::Eq | Op::Ne => {}
                        Op::Gt | Op::Ge | Op::Lt | Op::Le => {
                            let n = f.value().parse::<u64>().map_err(|_| {
                                PlacementError::InvalidNumericLiteral(f.value().to_string())
                            })?;
                            self.num_cache.insert(f.value(), n);
                        }
                        _ => return Err(PlacementError::InvalidFilterOp(op)),
                    }
                }
            }
        }

        if top {
            self.filters.insert(name, f);
        }
        Ok(())
    }

    /// Evaluates a compiled filter against one node.
    pub(crate) fn match_filter(&self, f: &Filter, node: &NodeInfo) -> bool {
        match f.op() {
            Op::And => f.sub_filters().iter().all(|sub| self.match_resolved(sub, node)),
            Op::Or => f.sub_filters().iter().any(|sub| self.match_resolved(sub, node)),
            _ => self.match_leaf(f, node),
        }
    }

    /// Resolves a named sub-filter through the compiled cache, then
    /// matches.
    fn match_resolved(&self, f: &Filter, node: &NodeInfo) -> bool {
        if !f.name().is_empty() {
            match self.filters.get(f.name()) {
                Some(resolved) => self.match_filter(resolved, node),
                None => false,
            }
        } else {
            self.match_filter(f, node)
        }
    }

    fn match_leaf(&self, f: &Filter, node: &NodeInfo) -> bool {
        match f.op() {
            Op::Eq => node.attribute(f.key()).unwrap_or("") == f.value(),
            Op::Ne => node.attribute(f.key()).unwrap_or("") != f.value(),
            Op::Gt => self.match_numeric(f, node, |attr, lit| attr > lit),
            Op::Ge => self.match_numeric(f, node, |attr, lit| attr >= lit),
            Op::Lt => self.match_numeric(f, node, |attr, lit| attr < lit),
            Op::Le => self.match_numeric(f, node, |attr, lit| attr <= lit),
            Op::Unspecified | Op::And | Op::Or => false,
        }
    }

    fn match_numeric(
        &self,
        f: &Filter,
        node: &NodeInfo,
        cmp: impl Fn(u64, u64) -> bool,
    ) -> bool {
        let attr = match f.key() {
            ATTR_PRICE => node.price(),
            ATTR_CAPACITY => node.capacity(),
            key => match node.attribute(key).and_then(|v| v.parse::<u64>().ok()) {
                Some(v) => v,
                // A missing or unparseable attribute fails the comparison
                // silently; heterogeneous nodes must not abort selection.
                None => return false,
            },
        };
        let lit = self.num_cache.get(f.value()).copied().unwrap_or_default();
        cmp(attr, lit)
    }
}
