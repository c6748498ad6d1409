//! Node and bucket weighting.
//!
//! A node's relative weight combines its declared capacity and price:
//! capacity is normalized with a sigmoid scaled to the map-wide mean, price
//! with the map-wide minimum divided by the node's own price. Bucket
//! weights aggregate per-node weights; the trimmed-mean aggregator feeds
//! rendezvous bucket ordering so that one anomalous node does not dominate
//! a bucket's attractiveness.

use crate::netmap::NetMap;
use crate::node::NodeInfo;

/// Scaling coefficient for the trimmed-mean inlier band.
const IQR_BAND_SCALE: f64 = 1.5;

/// Summarizes a stream of per-node weights into one value.
pub(crate) trait Aggregator {
    /// Feeds one weight into the aggregate.
    fn add(&mut self, v: f64);
    /// Returns the aggregate over everything added so far.
    fn compute(&self) -> f64;
}

/// Running incremental mean, O(1) per addition.
#[derive(Debug, Default)]
pub(crate) struct MeanAgg {
    mean: f64,
    count: usize,
}

impl Aggregator for MeanAgg {
    fn add(&mut self, v: f64) {
        self.count += 1;
        self.mean += (v - self.mean) / self.count as f64;
    }

    fn compute(&self) -> f64 {
        self.mean
    }
}

/// Running minimum.
#[derive(Debug, Default)]
pub(crate) struct MinAgg {
    min: Option<f64>,
}

impl Aggregator for MinAgg {
    fn add(&mut self, v: f64) {
        self.min = Some(match self.min {
            Some(m) => m.min(v),
            None => v,
        });
    }

    fn compute(&self) -> f64 {
        self.min.unwrap_or_default()
    }
}

/// Interquartile-trimmed mean.
///
/// For populations of at least four, averages only the values inside
/// `[Q1 - k*IQR, Q3 + k*IQR]`; smaller populations use their full range.
#[derive(Debug)]
pub(crate) struct MeanIqrAgg {
    k: f64,
    values: Vec<f64>,
}

impl MeanIqrAgg {
    pub(crate) fn new() -> Self {
        Self { k: IQR_BAND_SCALE, values: Vec::new() }
    }
}

impl Aggregator for MeanIqrAgg {
    fn add(&mut self, v: f64) {
        self.values.push(v);
    }

    fn compute(&self) -> f64 {
        let len = self.values.len();
        if len == 0 {
            return 0.0;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);

        let (lo, hi) = if len < 4 {
            (sorted[0], sorted[len - 1])
        } else {
            let q1 = sorted[len / 4];
            let q3 = sorted[len * 3 / 4 - 1];
            let iqr = self.k * (q3 - q1);
            (q1 - iqr, q3 + iqr)
        };

        let mut sum = 0.0;
        let mut count = 0usize;
        for &v in &sorted {
            if v >= lo && v <= hi {
                sum += v;
                count += 1;
            }
        }
        sum / count as f64
    }
}

/// Maps a raw attribute value onto a relative weight.
pub(crate) trait Normalizer {
    /// Normalizes one value.
    fn normalize(&self, v: f64) -> f64;
}

/// Sigmoid normalization: `x / (1 + x)` with `x = v / scale`.
///
/// Grows monotonically toward 1, so a node with twice the mean capacity is
/// favored without letting huge nodes swamp the map.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SigmoidNorm {
    scale: f64,
}

impl Normalizer for SigmoidNorm {
    fn normalize(&self, v: f64) -> f64 {
        if self.scale == 0.0 {
            return 0.0;
        }
        v / (v + self.scale)
    }
}

/// Reverse-minimum normalization: `min / v`.
///
/// Cheaper nodes get higher weight. A zero price normalizes to 0, and a
/// zero map-wide minimum collapses every weight to 0, degrading rendezvous
/// ordering to the underlying hash alone.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReverseMinNorm {
    min: f64,
}

impl Normalizer for ReverseMinNorm {
    fn normalize(&self, v: f64) -> f64 {
        if v == 0.0 {
            return 0.0;
        }
        self.min / v
    }
}

/// Per-node weight function, fixed over one network map snapshot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WeightFunc {
    capacity: SigmoidNorm,
    price: ReverseMinNorm,
}

impl WeightFunc {
    /// Derives the weight function from map-wide capacity and price
    /// statistics.
    pub(crate) fn from_netmap(netmap: &NetMap) -> Self {
        let mut mean_capacity = MeanAgg::default();
        let mut min_price = MinAgg::default();
        for node in netmap.nodes() {
            mean_capacity.add(node.capacity() as f64);
            min_price.add(node.price() as f64);
        }
        Self {
            capacity: SigmoidNorm { scale: mean_capacity.compute() },
            price: ReverseMinNorm { min: min_price.compute() },
        }
    }

    /// Returns the node's relative weight.
    pub(crate) fn weight(&self, node: &NodeInfo) -> f64 {
        self.capacity.normalize(node.capacity() as f64)
            * self.price.normalize(node.price() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_agg_incremental() {
        let mut agg = MeanAgg::default();
        for v in [1.0, 2.0, 3.0, 4.0] {
            agg.add(v);
        }
        assert!((agg.compute() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_mean_agg_empty() {
        assert_eq!(MeanAgg::default().compute(), 0.0);
    }

    #[test]
    fn test_min_agg() {
        let mut agg = MinAgg::default();
        for v in [5.0, 2.0, 9.0] {
            agg.add(v);
        }
        assert_eq!(agg.compute(), 2.0);
        assert_eq!(MinAgg::default().compute(), 0.0);
    }

    #[test]
    fn test_trimmed_mean_small_population_uses_full_range() {
        let mut agg = MeanIqrAgg::new();
        for v in [1.0, 100.0, 2.0] {
            agg.add(v);
        }
        assert!((agg.compute() - 103.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_trimmed_mean_discards_outlier() {
        let mut agg = MeanIqrAgg::new();
        for v in [10.0, 11.0, 9.0, 10.0, 12.0, 8.0, 10.0, 1000.0] {
            agg.add(v);
        }
        let mean = agg.compute();
        assert!(mean < 20.0, "outlier not trimmed: {mean}");
    }

    #[test]
    fn test_sigmoid_norm() {
        let norm = SigmoidNorm { scale: 100.0 };
        assert_eq!(norm.normalize(0.0), 0.0);
        assert!((norm.normalize(100.0) - 0.5).abs() < 1e-9);
        assert!(norm.normalize(10_000.0) > 0.9);

        let degenerate = SigmoidNorm { scale: 0.0 };
        assert_eq!(degenerate.normalize(42.0), 0.0);
    }

    #[test]
    fn test_reverse_min_norm() {
        let norm = ReverseMinNorm { min: 10.0 };
        assert_eq!(norm.normalize(10.0), 1.0);
        assert_eq!(norm.normalize(20.0), 0.5);
        assert_eq!(norm.normalize(0.0), 0.0);

        // A zero map-wide minimum collapses everything to zero.
        let collapsed = ReverseMinNorm { min: 0.0 };
        assert_eq!(collapsed.normalize(20.0), 0.0);
    }

    #[test]
    fn test_weight_func_favors_cheap_large_nodes() {
        let mut cheap_large = crate::node::NodeInfo::new(*b"a");
        cheap_large.set_attribute("Price", "10").unwrap();
        cheap_large.set_attribute("Capacity", "200").unwrap();

        let mut pricey_small = crate::node::NodeInfo::new(*b"b");
        pricey_small.set_attribute("Price", "40").unwrap();
        pricey_small.set_attribute("Capacity", "50").unwrap();

        let netmap = NetMap::new(1, vec![cheap_large.clone(), pricey_small.clone()]);
        let wf = WeightFunc::from_netmap(&netmap);

        assert!(wf.weight(&cheap_large) > wf.weight(&pricey_small));
    }
}
