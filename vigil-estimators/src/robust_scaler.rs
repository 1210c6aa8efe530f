//! Median imputation followed by robust scaling.
use anyhow::{bail, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use vigil_core::Transform;

/// Replaces missing values with the column median, then centers each column on its
/// median and divides it by its interquartile range.
///
/// A column with zero interquartile range is only centered. A column without any
/// observed value is left at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScalerImputer {
    medians: Vec<f64>,
    scales: Vec<f64>,
}

impl RobustScalerImputer {
    /// Fits the medians and interquartile ranges of the columns.
    pub fn fit(x: &Array2<f64>) -> Self {
        let (medians, scales): (Vec<f64>, Vec<f64>) = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mut vs: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                if vs.is_empty() {
                    return (0.0, 1.0);
                }
                vs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                let median = quantile(&vs, 0.5);
                let iqr = quantile(&vs, 0.75) - quantile(&vs, 0.25);
                (median, if iqr > 0.0 { iqr } else { 1.0 })
            })
            .unzip();
        Self { medians, scales }
    }

    /// Column medians.
    pub fn medians(&self) -> &[f64] {
        &self.medians
    }

    /// Column scales.
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}

impl Transform for RobustScalerImputer {
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.medians.len() {
            bail!(
                "Expected {} feature columns, got {}",
                self.medians.len(),
                x.ncols()
            );
        }
        let mut y = x.clone();
        let params = self.medians.iter().zip(self.scales.iter());
        for (mut col, (&median, &scale)) in y.axis_iter_mut(Axis(1)).zip(params) {
            col.mapv_inplace(|v| {
                let v = if v.is_nan() { median } else { v };
                (v - median) / scale
            });
        }
        Ok(y)
    }
}

/// Quantile of sorted values with linear interpolation between the closest ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
