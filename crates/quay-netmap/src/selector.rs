//! Selector compilation: bucketing, backup-factor scaling, and rendezvous
//! ordering of candidate buckets.

use quay_hrw::HrwKey;
use tracing::trace;

use crate::context::Context;
use crate::error::{PlacementError, Result};
use crate::policy::{Clause, Selector, WILDCARD_FILTER};
use crate::weight::{Aggregator, MeanIqrAgg};

/// Required shape of a selection: `(bucket count, nodes per bucket)`.
///
/// `SAME` asks for one bucket holding `count` nodes; `DISTINCT` (and the
/// unspecified default) asks for `count` buckets holding at least one node
/// each. The backup factor scales the per-bucket minimum up, best effort.
fn calc_nodes_count(s: &Selector) -> (usize, usize) {
    match s.clause() {
        Clause::Same => (1, s.count() as usize),
        Clause::Distinct | Clause::Unspecified => (s.count() as usize, 1),
    }
}

impl<'a> Context<'a> {
    /// Compiles every selector of the policy and records its resolved
    /// bucket set by name.
    pub(crate) fn process_selectors(&mut self) -> Result<()> {
        let policy = self.policy;
        for s in policy.selectors() {
            if s.filter_name() != WILDCARD_FILTER && !self.filters.contains_key(s.filter_name())
            {
                return Err(PlacementError::SelectorFilterNotFound(
                    s.filter_name().to_string(),
                ));
            }
            let selection = self.get_selection(s)?;
            self.selections.insert(s.name(), selection);
        }
        Ok(())
    }

    /// Groups eligible nodes into candidate buckets for the selector.
    ///
    /// Nodes outside the policy's subnet scope are excluded outright. With
    /// an empty bucketing attribute every matching node becomes its own
    /// singleton bucket; otherwise nodes group by the attribute's string
    /// value, so only values actually present produce buckets.
    ///
    /// Without a pivot the buckets are sorted (by representative node hash,
    /// or by attribute value) so that pivot-less resolution is reproducible.
    fn selection_base(&self, s: &Selector) -> Vec<Vec<usize>> {
        let filter = self.filters.get(s.filter_name()).copied();
        let wildcard = s.filter_name() == WILDCARD_FILTER;
        let attr = s.attribute();

        let mut singletons: Vec<Vec<usize>> = Vec::new();
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();

        for (i, node) in self.netmap.nodes().iter().enumerate() {
            if let Some(subnet) = self.policy.subnet() {
                if !node.belongs_to_subnet(subnet) {
                    continue;
                }
            }
            let matched = wildcard || filter.is_some_and(|f| self.match_filter(f, node));
            if !matched {
                continue;
            }
            if attr.is_empty() {
                singletons.push(vec![i]);
            } else {
                let value = node.attribute(attr).unwrap_or("");
                match groups.iter_mut().find(|(v, _)| *v == value) {
                    Some((_, bucket)) => bucket.push(i),
                    None => groups.push((value, vec![i])),
                }
            }
        }

        if attr.is_empty() {
            if self.pivot.is_empty() {
                singletons.sort_by_key(|b| self.bucket_key(b));
            }
            singletons
        } else {
            if self.pivot.is_empty() {
                groups.sort_by(|a, b| a.0.cmp(b.0));
            }
            groups.into_iter().map(|(_, bucket)| bucket).collect()
        }
    }

    /// Resolves one selector into exactly the required number of buckets.
    pub(crate) fn get_selection(&self, s: &Selector) -> Result<Vec<Vec<usize>>> {
        let (bucket_count, nodes_in_bucket) = calc_nodes_count(s);
        if bucket_count == 0 || nodes_in_bucket == 0 {
            return Ok(Vec::new());
        }

        let buckets = self.selection_base(s);
        if buckets.len() < bucket_count {
            return Err(PlacementError::NotEnoughNodes(s.name().to_string()));
        }

        // Scale per-bucket size by the backup factor. Buckets that satisfy
        // the scaled size are truncated to it; buckets that only satisfy
        // the declared minimum are kept whole as fallback.
        let max_nodes_in_bucket = nodes_in_bucket * self.cbf as usize;
        let mut res: Vec<Vec<usize>> = Vec::with_capacity(buckets.len());
        let mut fallback: Vec<Vec<usize>> = Vec::new();
        for mut bucket in buckets {
            if bucket.len() >= max_nodes_in_bucket {
                bucket.truncate(max_nodes_in_bucket);
                res.push(bucket);
            } else if bucket.len() >= nodes_in_bucket {
                fallback.push(bucket);
            }
        }

        if res.len() < bucket_count {
            // The full backup factor is a best-effort target: degrade to
            // the declared minimum before giving up.
            res.append(&mut fallback);
            if res.len() < bucket_count {
                return Err(PlacementError::NotEnoughNodes(s.name().to_string()));
            }
        }

        if !self.pivot.is_empty() {
            let weights: Vec<f64> = res.iter().map(|b| self.bucket_weight(b)).collect();
            let pivot_hash = self.pivot_hash;
            quay_hrw::sort_by_weight_with(&mut res, &weights, pivot_hash, |b| {
                self.bucket_key(b)
            });
        }

        if s.attribute().is_empty() {
            // Singleton-bucket selectors may round-robin leftover accepted
            // buckets into the chosen ones, up to the scaled size.
            let spare = res.split_off(bucket_count);
            for (i, extra) in spare.into_iter().enumerate() {
                let index = i % bucket_count;
                if res[index].len() >= max_nodes_in_bucket {
                    break;
                }
                res[index].extend(extra);
            }
        }

        res.truncate(bucket_count);
        trace!(
            selector = s.name(),
            buckets = res.len(),
            nodes = res.iter().map(Vec::len).sum::<usize>(),
            "resolved selection"
        );
        Ok(res)
    }

    /// Rendezvous identity of a bucket: the hash of its first node.
    fn bucket_key(&self, bucket: &[usize]) -> u64 {
        bucket.first().map_or(0, |&i| self.netmap.nodes()[i].hrw_key())
    }

    /// Aggregate bucket weight: interquartile-trimmed mean of the member
    /// node weights.
    fn bucket_weight(&self, bucket: &[usize]) -> f64 {
        let mut agg = MeanIqrAgg::new();
        for &i in bucket {
            agg.add(self.weight.weight(&self.netmap.nodes()[i]));
        }
        agg.compute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netmap::NetMap;
    use crate::node::NodeInfo;
    use crate::policy::{Filter, PlacementPolicy};

    fn node(key: &[u8], attrs: &[(&str, &str)]) -> NodeInfo {
        let mut n = NodeInfo::new(key);
        for (k, v) in attrs {
            n.set_attribute(*k, *v).unwrap();
        }
        n
    }

    fn city_map() -> NetMap {
        NetMap::new(
            1,
            vec![
                node(b"n0", &[("City", "Moscow")]),
                node(b"n1", &[("City", "Moscow")]),
                node(b"n2", &[("City", "Berlin")]),
                node(b"n3", &[("City", "Berlin")]),
                node(b"n4", &[("City", "Paris")]),
            ],
        )
    }

    fn resolve(
        netmap: &NetMap,
        policy: &PlacementPolicy,
        selector: &Selector,
        pivot: &[u8],
    ) -> Result<Vec<Vec<usize>>> {
        let mut ctx = Context::new(netmap, policy);
        ctx.set_pivot(pivot);
        ctx.process_filters()?;
        ctx.get_selection(selector)
    }

    #[test]
    fn test_attribute_bucketing() {
        let netmap = city_map();
        let policy = PlacementPolicy::new().with_backup_factor(1);
        let selector = Selector::new(3).named("S").with_attribute("City");

        let buckets = resolve(&netmap, &policy, &selector, b"").unwrap();
        assert_eq!(buckets.len(), 3);

        // Every bucket holds nodes of exactly one city.
        for bucket in &buckets {
            let city = netmap.nodes()[bucket[0]].attribute("City");
            assert!(bucket.iter().all(|&i| netmap.nodes()[i].attribute("City") == city));
        }
    }

    #[test]
    fn test_not_enough_buckets() {
        let netmap = city_map();
        let policy = PlacementPolicy::new();
        let selector = Selector::new(4).named("S").with_attribute("City");

        let err = resolve(&netmap, &policy, &selector, b"").unwrap_err();
        assert!(matches!(err, PlacementError::NotEnoughNodes(name) if name == "S"));
    }

    #[test]
    fn test_same_clause_single_bucket() {
        let netmap = city_map();
        let policy = PlacementPolicy::new().with_backup_factor(1);
        let selector = Selector::new(2)
            .named("S")
            .with_attribute("City")
            .with_clause(Clause::Same);

        let buckets = resolve(&netmap, &policy, &selector, b"").unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].len(), 2);
    }

    #[test]
    fn test_same_clause_needs_enough_members() {
        let netmap = city_map();
        let policy = PlacementPolicy::new().with_backup_factor(1);
        let selector = Selector::new(3)
            .named("S")
            .with_attribute("City")
            .with_clause(Clause::Same);

        // No city has three nodes.
        assert!(resolve(&netmap, &policy, &selector, b"").is_err());
    }

    #[test]
    fn test_backup_factor_scales_buckets() {
        let netmap = city_map();
        let selector = Selector::new(2).named("S").with_attribute("City");

        let one = PlacementPolicy::new().with_backup_factor(1);
        let two = PlacementPolicy::new().with_backup_factor(2);

        let lean: usize = resolve(&netmap, &one, &selector, b"")
            .unwrap()
            .iter()
            .map(Vec::len)
            .sum();
        let full: usize = resolve(&netmap, &two, &selector, b"")
            .unwrap()
            .iter()
            .map(Vec::len)
            .sum();

        assert_eq!(lean, 2);
        assert_eq!(full, 4);
    }

    #[test]
    fn test_backup_factor_degrades_gracefully() {
        // CBF 3 wants 3 nodes per city bucket; no city has 3 nodes, so the
        // fallback keeps the whole buckets at their actual size.
        let netmap = city_map();
        let policy = PlacementPolicy::new().with_backup_factor(3);
        let selector = Selector::new(2).named("S").with_attribute("City");

        let buckets = resolve(&netmap, &policy, &selector, b"").unwrap();
        assert_eq!(buckets.len(), 2);
        for bucket in &buckets {
            assert!(!bucket.is_empty() && bucket.len() <= 3);
        }
    }

    #[test]
    fn test_singleton_buckets_redistribute_leftovers() {
        let netmap = city_map();
        let policy = PlacementPolicy::new().with_backup_factor(2);
        let selector = Selector::new(2).named("S");

        // 5 singleton buckets, 2 requested, scaled size 2: the chosen two
        // buckets absorb spare nodes round-robin.
        let buckets = resolve(&netmap, &policy, &selector, b"pivot").unwrap();
        assert_eq!(buckets.len(), 2);
        let total: usize = buckets.iter().map(Vec::len).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_filtered_selection() {
        let netmap = NetMap::new(
            1,
            vec![
                node(b"n0", &[("Country", "Russia"), ("City", "Moscow")]),
                node(b"n1", &[("Country", "Russia"), ("City", "SPB")]),
                node(b"n2", &[("Country", "Germany"), ("City", "Berlin")]),
            ],
        );
        let policy = PlacementPolicy::new()
            .with_backup_factor(1)
            .with_filter(Filter::eq("Country", "Russia").named("FromRU"));
        let selector = Selector::new(2)
            .named("S")
            .with_attribute("City")
            .from_filter("FromRU");

        let buckets = resolve(&netmap, &policy, &selector, b"").unwrap();
        assert_eq!(buckets.len(), 2);
        for bucket in &buckets {
            for &i in bucket {
                assert_eq!(netmap.nodes()[i].attribute("Country"), Some("Russia"));
            }
        }
    }

    #[test]
    fn test_subnet_scope_excludes_nodes() {
        let mut in_subnet = node(b"n0", &[]);
        in_subnet.set_attribute("Subnet:3", "True").unwrap();
        let outside = node(b"n1", &[]);

        let netmap = NetMap::new(1, vec![in_subnet, outside]);
        let policy = PlacementPolicy::new().with_subnet(3).with_backup_factor(1);
        let selector = Selector::new(1).named("S");

        let buckets = resolve(&netmap, &policy, &selector, b"").unwrap();
        assert_eq!(buckets, vec![vec![0]]);
    }

    #[test]
    fn test_no_pivot_order_is_reproducible() {
        let netmap = city_map();
        let policy = PlacementPolicy::new().with_backup_factor(1);
        let selector = Selector::new(3).named("S").with_attribute("City");

        let a = resolve(&netmap, &policy, &selector, b"").unwrap();
        let b = resolve(&netmap, &policy, &selector, b"").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_selector_dangling_filter_reference() {
        let netmap = city_map();
        let policy = PlacementPolicy::new()
            .with_selector(Selector::new(1).named("S").from_filter("Nope"));

        let mut ctx = Context::new(&netmap, &policy);
        ctx.process_filters().unwrap();
        let err = ctx.process_selectors().unwrap_err();
        assert_eq!(err.to_string(), "filter not found: SELECT FROM 'Nope'");
    }

    #[test]
    fn test_zero_count_selector_is_empty() {
        let netmap = city_map();
        let policy = PlacementPolicy::new();
        let selector = Selector::new(0).named("S");

        assert!(resolve(&netmap, &policy, &selector, b"").unwrap().is_empty());
    }
}
