use std::path::PathBuf;

/// Env var overriding [`ReportOptions::min_total_percent`].
pub const MIN_TOTAL_PERCENT_ENV: &str = "CALLTREE_MIN_TOTAL_PERCENT";
/// Env var overriding [`ReportOptions::min_parent_percent`].
pub const MIN_PARENT_PERCENT_ENV: &str = "CALLTREE_MIN_PARENT_PERCENT";
/// Env var naming the directory snapshots are saved to.
pub const RUNS_DIR_ENV: &str = "CALLTREE_RUNS_DIR";

/// Row filters for rendered reports.
///
/// Both thresholds are fractions: `0.5` hides rows below 50%. Rows that are
/// hidden still have their descendants considered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportOptions {
    /// Minimum share of the tree's total time.
    pub min_total_percent: f64,
    /// Minimum share of the parent's total time.
    pub min_parent_percent: f64,
}

impl ReportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_total_percent(mut self, fraction: f64) -> Self {
        self.min_total_percent = fraction;
        self
    }

    pub fn with_min_parent_percent(mut self, fraction: f64) -> Self {
        self.min_parent_percent = fraction;
        self
    }

    /// Defaults overridden by `CALLTREE_MIN_TOTAL_PERCENT` and
    /// `CALLTREE_MIN_PARENT_PERCENT` when they are set.
    pub fn from_env() -> Self {
        Self::default().merge_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Unparseable values are logged and skipped.
    pub fn merge_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_fraction(&lookup, MIN_TOTAL_PERCENT_ENV) {
            self.min_total_percent = v;
        }
        if let Some(v) = parse_fraction(&lookup, MIN_PARENT_PERCENT_ENV) {
            self.min_parent_percent = v;
        }
        self
    }
}

fn parse_fraction(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<f64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid report threshold");
            None
        }
    }
}

/// Directory for saved snapshots, from `CALLTREE_RUNS_DIR`.
pub fn snapshot_dir() -> Option<PathBuf> {
    std::env::var_os(RUNS_DIR_ENV).map(PathBuf::from)
}
