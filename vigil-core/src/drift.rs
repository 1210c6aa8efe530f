//! Column-wise data drift detection.
//!
//! [`DriftDetector`] runs a two-sample Kolmogorov-Smirnov test on every column of a
//! baseline dataset against the same column of a candidate dataset. A column is
//! drifted when the p-value falls strictly below the threshold; a p-value equal to the
//! threshold is treated as the same distribution.
use crate::{
    dataset::{Column, Dataset},
    error::PipelineError,
    util,
};
use anyhow::Result;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

/// Default p-value threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.05;

/// Result of the KS test on a single column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    /// p-value of the test.
    pub p_value: f64,

    /// KS statistic, the largest distance between the empirical distributions.
    pub statistic: f64,

    /// `true` if `p_value < threshold`.
    pub drift_status: bool,
}

/// Per-column drift verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Threshold used for the verdicts.
    pub threshold: f64,

    /// `true` if any column drifted.
    pub any_drifted: bool,

    /// Names of the drifted columns, sorted.
    pub drifted_columns: Vec<String>,

    /// Verdict of each compared column.
    pub columns: BTreeMap<String, ColumnDrift>,
}

impl DriftReport {
    /// Verdict of the given column.
    pub fn column(&self, name: &str) -> Option<&ColumnDrift> {
        self.columns.get(name)
    }
}

/// Compares the distributions of two datasets column by column.
#[derive(Debug, Clone, Copy)]
pub struct DriftDetector {
    threshold: f64,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl DriftDetector {
    /// Constructs a detector with the given p-value threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// The p-value threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Tests every column of `baseline` except `target_column` against `candidate`.
    ///
    /// A column of the baseline missing from the candidate is a
    /// [`PipelineError::Validation`].
    pub fn compare(
        &self,
        baseline: &Dataset,
        candidate: &Dataset,
        target_column: &str,
    ) -> Result<DriftReport> {
        let names: Vec<&String> = baseline
            .column_names()
            .iter()
            .filter(|name| *name != target_column)
            .collect();

        let columns = names
            .par_iter()
            .map(|name| {
                let base = baseline.column(name).ok_or_else(|| {
                    PipelineError::Validation(format!("baseline has no column {:?}", name))
                })?;
                let cand = candidate.column(name).ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "column {:?} is missing from the candidate dataset",
                        name
                    ))
                })?;
                let (xs, ys) = comparable_values(name, base, cand)?;
                let drift = if xs.is_empty() || ys.is_empty() {
                    warn!("No observed values in column {:?}, skipped the KS test", name);
                    ColumnDrift {
                        p_value: 1.0,
                        statistic: 0.0,
                        drift_status: false,
                    }
                } else {
                    let (statistic, p_value) = ks_2samp(xs, ys);
                    ColumnDrift {
                        p_value,
                        statistic,
                        drift_status: p_value < self.threshold,
                    }
                };
                Ok(((*name).clone(), drift))
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let columns: BTreeMap<String, ColumnDrift> = columns.into_iter().collect();
        let drifted_columns: Vec<String> = columns
            .iter()
            .filter(|(_, c)| c.drift_status)
            .map(|(name, _)| name.clone())
            .collect();
        info!(
            "Drift check: {} of {} columns drifted",
            drifted_columns.len(),
            columns.len()
        );

        Ok(DriftReport {
            threshold: self.threshold,
            any_drifted: !drifted_columns.is_empty(),
            drifted_columns,
            columns,
        })
    }

    /// Writes the report as YAML, creating the parent directory.
    pub fn write_report(report: &DriftReport, path: impl AsRef<Path>) -> Result<()> {
        util::write_yaml(path.as_ref(), report)
    }
}

/// Observed values of both columns as numbers.
///
/// Labels are replaced by their rank in the sorted union of the labels of both sides.
fn comparable_values(
    name: &str,
    base: &Column,
    cand: &Column,
) -> Result<(Vec<f64>, Vec<f64>), PipelineError> {
    match (base, cand) {
        (Column::Numeric(xs), Column::Numeric(ys)) => Ok((
            xs.iter().flatten().copied().filter(|v| !v.is_nan()).collect(),
            ys.iter().flatten().copied().filter(|v| !v.is_nan()).collect(),
        )),
        (Column::Categorical(xs), Column::Categorical(ys)) => {
            let labels: BTreeSet<&String> = xs.iter().chain(ys.iter()).flatten().collect();
            let rank: BTreeMap<&String, f64> = labels
                .into_iter()
                .enumerate()
                .map(|(i, label)| (label, i as f64))
                .collect();
            let ranks = |vs: &[Option<String>]| -> Vec<f64> {
                vs.iter().flatten().map(|v| rank[v]).collect()
            };
            Ok((ranks(xs), ranks(ys)))
        }
        _ => Err(PipelineError::Validation(format!(
            "column {:?} is {:?} in the baseline but {:?} in the candidate",
            name,
            base.kind(),
            cand.kind()
        ))),
    }
}

/// Samples up to this size get the exact p-value.
const EXACT_MAX_N: usize = 10_000;

/// Two-sample Kolmogorov-Smirnov test; returns `(statistic, p_value)`.
///
/// The two-sided p-value is exact when neither sample exceeds 10000 values, and
/// otherwise uses the asymptotic Kolmogorov distribution with Stephens' correction.
/// Both samples must be non-empty and free of NaN.
pub fn ks_2samp(mut xs: Vec<f64>, mut ys: Vec<f64>) -> (f64, f64) {
    let cmp = |a: &f64, b: &f64| a.partial_cmp(b).unwrap_or(Ordering::Equal);
    xs.sort_by(cmp);
    ys.sort_by(cmp);
    let (n1, n2) = (xs.len(), ys.len());

    // The statistic scaled by n1 * n2, so that it stays an integer.
    let (mut i, mut j, mut gap) = (0, 0, 0usize);
    while i < n1 && j < n2 {
        let (x, y) = (xs[i], ys[j]);
        if x <= y {
            while i < n1 && xs[i] == x {
                i += 1;
            }
        }
        if y <= x {
            while j < n2 && ys[j] == y {
                j += 1;
            }
        }
        gap = gap.max((i * n2).abs_diff(j * n1));
    }

    if gap == 0 {
        return (0.0, 1.0);
    }
    let d = gap as f64 / (n1 * n2) as f64;
    let p = if n1.max(n2) <= EXACT_MAX_N {
        1.0 - prob_inside(n1, n2, gap)
    } else {
        let ne = (n1 * n2) as f64 / (n1 + n2) as f64;
        let sqrt_ne = ne.sqrt();
        kolmogorov_survival((sqrt_ne + 0.12 + 0.11 / sqrt_ne) * d)
    };
    (d, p.clamp(0.0, 1.0))
}

/// Probability that a uniformly random lattice path from `(0, 0)` to `(n1, n2)`
/// keeps `|i * n2 - j * n1| < gap` at every point.
///
/// Along such a path, the step from `(i, j)` goes right with probability
/// `(n1 - i) / (n1 + n2 - i - j)`, so the probabilities are propagated directly and
/// never overflow.
fn prob_inside(n1: usize, n2: usize, gap: usize) -> f64 {
    let n = n1 + n2;
    let mut row = vec![0.0f64; n2 + 1];
    for i in 0..=n1 {
        for j in 0..=n2 {
            let p = if i == 0 && j == 0 {
                1.0
            } else {
                let mut p = 0.0;
                if i > 0 {
                    p += row[j] * (n1 - i + 1) as f64 / (n - i + 1 - j) as f64;
                }
                if j > 0 {
                    p += row[j - 1] * (n2 - j + 1) as f64 / (n - i - j + 1) as f64;
                }
                p
            };
            row[j] = if (i * n2).abs_diff(j * n1) < gap { p } else { 0.0 };
        }
    }
    row[n2]
}

/// Survival function of the Kolmogorov distribution,
/// `2 * sum_{k>=1} (-1)^(k-1) exp(-2 k^2 lambda^2)`.
fn kolmogorov_survival(lambda: f64) -> f64 {
    const EPS_TERM: f64 = 1e-3;
    const EPS_SUM: f64 = 1e-8;

    let a2 = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut prev = 0.0f64;
    for k in 1..=100 {
        let kf = k as f64;
        let term = sign * (a2 * kf * kf).exp();
        sum += term;
        if term.abs() <= EPS_TERM * prev || term.abs() <= EPS_SUM * sum {
            return sum;
        }
        sign = -sign;
        prev = term.abs();
    }
    // The series does not converge for very small lambda, where p is 1.
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(columns: Vec<(&str, Column)>) -> Dataset {
        Dataset::from_columns(
            columns
                .into_iter()
                .map(|(n, c)| (n.to_string(), c))
                .collect(),
        )
        .unwrap()
    }

    fn numeric(range: std::ops::Range<i32>) -> Column {
        Column::Numeric(range.map(|v| Some(v as f64)).collect())
    }

    #[test]
    fn identical_samples() {
        let (d, p) = ks_2samp(vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 1.0]);
        assert_eq!(d, 0.0);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn disjoint_samples() {
        let xs = (0..100).map(|v| v as f64).collect();
        let ys = (1000..1100).map(|v| v as f64).collect();
        let (d, p) = ks_2samp(xs, ys);
        assert_eq!(d, 1.0);
        assert!(p < 1e-10);
    }

    #[test]
    fn small_samples_use_the_exact_distribution() {
        // Two of the 20 orderings of 3 + 3 values are fully separated.
        let (d, p) = ks_2samp(vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]);
        assert_eq!(d, 1.0);
        assert!((p - 0.1).abs() < 1e-12);

        // Two of the 10 orderings of 2 + 3 values.
        let (d, p) = ks_2samp(vec![1.0, 2.0], vec![3.0, 4.0, 5.0]);
        assert_eq!(d, 1.0);
        assert!((p - 0.2).abs() < 1e-12);
    }

    #[test]
    fn large_samples_use_the_asymptotic_distribution() {
        let xs: Vec<f64> = (0..20_000).map(|v| v as f64).collect();
        let ys: Vec<f64> = (0..20_000).map(|v| v as f64 + 200.0).collect();
        let (d, p) = ks_2samp(xs, ys);
        assert!((d - 0.01).abs() < 1e-12);
        // lambda = (sqrt(10000) + 0.12 + 0.0011) * 0.01
        let expected = kolmogorov_survival((100.0 + 0.12 + 0.0011) * 0.01);
        assert!((p - expected).abs() < 1e-12);
        assert!(p > 0.05 && p < 1.0);
    }

    #[test]
    fn statistic_handles_ties() {
        let (d, _) = ks_2samp(vec![1.0, 1.0, 2.0, 2.0], vec![1.0, 2.0, 2.0, 2.0]);
        assert!((d - 0.25).abs() < 1e-12);
    }

    #[test]
    fn only_the_shifted_column_drifts() -> Result<()> {
        let baseline = dataset(vec![
            ("class", Column::Categorical(vec![Some("neg".into()); 200])),
            ("stable", numeric(0..200)),
            ("shifted", numeric(0..200)),
        ]);
        let candidate = dataset(vec![
            ("class", Column::Categorical(vec![Some("pos".into()); 200])),
            ("stable", numeric(0..200)),
            ("shifted", numeric(150..350)),
        ]);
        let report = DriftDetector::default().compare(&baseline, &candidate, "class")?;

        assert!(report.any_drifted);
        assert_eq!(report.drifted_columns, vec!["shifted".to_string()]);
        assert!(report.column("class").is_none());
        assert_eq!(report.column("stable").unwrap().p_value, 1.0);
        Ok(())
    }

    #[test]
    fn p_value_equal_to_threshold_is_not_drift() -> Result<()> {
        let ds = dataset(vec![("a", numeric(0..10))]);
        let report = DriftDetector::new(1.0).compare(&ds, &ds, "class")?;
        assert!(!report.any_drifted);
        Ok(())
    }

    #[test]
    fn missing_candidate_column_is_a_validation_error() {
        let baseline = dataset(vec![("a", numeric(0..10)), ("b", numeric(0..10))]);
        let candidate = dataset(vec![("a", numeric(0..10))]);
        let err = DriftDetector::default()
            .compare(&baseline, &candidate, "class")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn empty_columns_are_not_drift() -> Result<()> {
        let baseline = dataset(vec![("a", Column::Numeric(vec![None, None]))]);
        let candidate = dataset(vec![("a", numeric(0..2))]);
        let report = DriftDetector::default().compare(&baseline, &candidate, "class")?;
        assert_eq!(report.column("a").unwrap().p_value, 1.0);
        assert!(!report.any_drifted);
        Ok(())
    }

    #[test]
    fn categorical_columns_are_ranked() -> Result<()> {
        let labels = |s: &[&str]| {
            Column::Categorical(s.iter().map(|v| Some(v.to_string())).collect())
        };
        let baseline = dataset(vec![("c", labels(&["a", "b", "a", "b"]))]);
        let candidate = dataset(vec![("c", labels(&["b", "a", "b", "a"]))]);
        let report = DriftDetector::default().compare(&baseline, &candidate, "class")?;
        assert_eq!(report.column("c").unwrap().statistic, 0.0);
        Ok(())
    }
}
