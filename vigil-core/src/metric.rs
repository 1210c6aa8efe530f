//! Classification metrics.
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Precision, recall and F1 of the positive class (index 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetric {
    /// Precision of the positive class.
    pub precision: f64,
    /// Recall of the positive class.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// The number of scored samples.
    pub support: usize,
}

impl ClassificationMetric {
    /// Scores predictions against ground truth.
    ///
    /// A ratio whose denominator is zero is 0.0.
    pub fn score(y_true: &[usize], y_pred: &[usize]) -> Result<Self, PipelineError> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::Validation(format!(
                "{} labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == 1, p == 1) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let ratio = |a: usize, b: usize| if b == 0 { 0.0 } else { a as f64 / b as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Ok(Self {
            precision,
            recall,
            f1,
            support: y_true.len(),
        })
    }
}
