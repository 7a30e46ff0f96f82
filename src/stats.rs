//! Derived statistics over a node's raw samples.
//!
//! `Stats` is computed once from the sample list and cached by the owning
//! node until the next sample is appended. All values are seconds; an empty
//! sample list yields zeros everywhere.

/// Aggregates of one node's elapsed-time samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    sorted: Vec<f64>,
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub standard_deviation: f64,
    pub min: f64,
    pub max: f64,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let total: f64 = sorted.iter().sum();
        let mean = total / count as f64;
        let variance = sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count as f64;

        Self {
            count,
            total,
            mean,
            standard_deviation: variance.sqrt(),
            min: sorted[0],
            max: sorted[count - 1],
            sorted,
        }
    }

    /// Nearest-rank percentile: the sorted sample at `floor(p / 100 * count)`.
    ///
    /// No interpolation. The index is clamped into range, so `tail(100.0)`
    /// yields the maximum and negative or NaN `p` yields the minimum.
    pub fn tail(&self, percentile: f64) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        // Float-to-int `as` saturates: negatives and NaN become 0.
        let rank = (percentile * 0.01 * self.count as f64).floor() as usize;
        self.sorted[rank.min(self.count - 1)]
    }

    pub fn sorted(&self) -> &[f64] {
        &self.sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn empty_samples_are_all_zero() {
        let stats = Stats::from_samples(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.total, 0.0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.standard_deviation, 0.0);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 0.0);
        assert_eq!(stats.tail(50.0), 0.0);
        assert_eq!(stats.tail(100.0), 0.0);
    }

    #[test]
    fn aggregates_match_hand_computed_values() {
        let stats = Stats::from_samples(&[0.12, 0.08, 0.10, 0.09, 0.11]);
        assert_eq!(stats.count, 5);
        assert!(close(stats.total, 0.50), "total was {}", stats.total);
        assert!(close(stats.mean, 0.10), "mean was {}", stats.mean);
        // Population std of an evenly spaced run with step 0.01: sqrt(0.0002).
        assert!(close(stats.standard_deviation, 0.0002f64.sqrt()));
        assert_eq!(stats.min, 0.08);
        assert_eq!(stats.max, 0.12);
        assert_eq!(stats.sorted(), &[0.08, 0.09, 0.10, 0.11, 0.12]);
    }

    #[test]
    fn tail_uses_nearest_rank_without_interpolation() {
        let stats = Stats::from_samples(&[0.12, 0.08, 0.10, 0.09, 0.11]);
        // floor(0.5 * 5) = 2 -> third smallest.
        assert_eq!(stats.tail(50.0), 0.10);
        assert_eq!(stats.tail(0.0), 0.08);
        // floor(0.9 * 5) = 4
        assert_eq!(stats.tail(90.0), 0.12);
        // floor(0.3 * 5) = 1
        assert_eq!(stats.tail(30.0), 0.09);
    }

    #[test]
    fn tail_clamps_out_of_range_percentiles() {
        let stats = Stats::from_samples(&[3.0, 1.0, 2.0]);
        assert_eq!(stats.tail(100.0), 3.0);
        assert_eq!(stats.tail(250.0), 3.0);
        assert_eq!(stats.tail(-10.0), 1.0);
        assert_eq!(stats.tail(f64::NAN), 1.0);
    }

    #[test]
    fn single_sample_has_zero_deviation() {
        let stats = Stats::from_samples(&[0.25]);
        assert_eq!(stats.standard_deviation, 0.0);
        assert_eq!(stats.min, 0.25);
        assert_eq!(stats.max, 0.25);
        assert_eq!(stats.tail(99.0), 0.25);
    }
}
