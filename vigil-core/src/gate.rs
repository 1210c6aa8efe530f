//! Model acceptance gate.
use crate::{
    error::PipelineError,
    metric::ClassificationMetric,
    resolver::{ModelResolver, ModelVersion},
};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default minimum F1 on the training split.
pub const DEFAULT_EXPECTED_ACCURACY: f64 = 0.6;

/// Default maximum gap between training and test F1.
pub const DEFAULT_OVERFIT_THRESHOLD: f64 = 0.05;

/// Why a candidate model was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Training F1 did not exceed the floor.
    BelowAccuracyFloor {
        /// Training F1.
        f1: f64,
        /// The floor.
        expected_accuracy: f64,
    },

    /// Training and test F1 are too far apart.
    OverfitGapExceeded {
        /// `|train F1 - test F1|`.
        gap: f64,
        /// The largest accepted gap.
        overfit_threshold: f64,
    },

    /// The candidate scored lower than the deployed model on the same test split.
    WorseThanChampion {
        /// Test F1 of the candidate.
        candidate_f1: f64,
        /// Test F1 of the deployed model.
        champion_f1: f64,
        /// Version of the deployed model.
        champion_version: u64,
    },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowAccuracyFloor { f1, expected_accuracy } => write!(
                f,
                "train F1 {:.4} is not above the expected accuracy {:.4}",
                f1, expected_accuracy
            ),
            Self::OverfitGapExceeded { gap, overfit_threshold } => write!(
                f,
                "train/test F1 gap {:.4} exceeds the overfit threshold {:.4}",
                gap, overfit_threshold
            ),
            Self::WorseThanChampion {
                candidate_f1,
                champion_f1,
                champion_version,
            } => write!(
                f,
                "test F1 {:.4} is below {:.4} of model version {}",
                candidate_f1, champion_f1, champion_version
            ),
        }
    }
}

/// The deployed model and its score on the candidate's test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Champion {
    /// The deployed model.
    pub model: ModelVersion,
    /// Its metric on the test split.
    pub metric: ClassificationMetric,
}

/// An accepted candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    /// Candidate metric on the training split.
    pub train_metric: ClassificationMetric,
    /// Candidate metric on the test split.
    pub test_metric: ClassificationMetric,
    /// The model the candidate was compared against, if any.
    pub champion: Option<Champion>,
    /// Test F1 of the candidate minus that of the champion.
    pub improvement: Option<f64>,
    /// Version the candidate is promoted under.
    pub version: u64,
}

/// Decides whether a candidate replaces the deployed model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationGate {
    expected_accuracy: f64,
    overfit_threshold: f64,
}

impl Default for EvaluationGate {
    fn default() -> Self {
        Self::new(DEFAULT_EXPECTED_ACCURACY, DEFAULT_OVERFIT_THRESHOLD)
    }
}

impl EvaluationGate {
    /// Constructs a gate.
    pub fn new(expected_accuracy: f64, overfit_threshold: f64) -> Self {
        Self {
            expected_accuracy,
            overfit_threshold,
        }
    }

    /// Checks the candidate's own metrics: the training F1 must be above the floor and
    /// the train/test gap must not exceed the threshold.
    pub fn check_candidate(
        &self,
        train: &ClassificationMetric,
        test: &ClassificationMetric,
    ) -> Result<(), RejectionReason> {
        if train.f1 <= self.expected_accuracy {
            return Err(RejectionReason::BelowAccuracyFloor {
                f1: train.f1,
                expected_accuracy: self.expected_accuracy,
            });
        }
        let gap = (train.f1 - test.f1).abs();
        if gap > self.overfit_threshold {
            return Err(RejectionReason::OverfitGapExceeded {
                gap,
                overfit_threshold: self.overfit_threshold,
            });
        }
        Ok(())
    }

    /// Checks the candidate against the champion on the same test split.
    pub fn check_champion(
        test: &ClassificationMetric,
        champion: &Champion,
    ) -> Result<(), RejectionReason> {
        if test.f1 >= champion.metric.f1 {
            Ok(())
        } else {
            Err(RejectionReason::WorseThanChampion {
                candidate_f1: test.f1,
                champion_f1: champion.metric.f1,
                champion_version: champion.model.version,
            })
        }
    }

    /// Runs all checks.
    ///
    /// `score_champion` computes the metric of the deployed model on the candidate's
    /// test split; it is called only when the store holds a model. A rejection is
    /// returned as [`PipelineError::Rejected`].
    pub fn accept<F>(
        &self,
        train: &ClassificationMetric,
        test: &ClassificationMetric,
        resolver: &ModelResolver,
        score_champion: F,
    ) -> Result<EvaluationVerdict>
    where
        F: FnOnce(&ModelVersion) -> Result<ClassificationMetric>,
    {
        self.check_candidate(train, test)
            .map_err(PipelineError::Rejected)?;

        let champion = match resolver.latest_version()? {
            Some(model) => {
                let metric = score_champion(&model)?;
                let champion = Champion { model, metric };
                Self::check_champion(test, &champion).map_err(PipelineError::Rejected)?;
                Some(champion)
            }
            None => {
                info!("No deployed model, accepting the candidate");
                None
            }
        };

        let improvement = champion.as_ref().map(|c| test.f1 - c.metric.f1);
        Ok(EvaluationVerdict {
            train_metric: *train,
            test_metric: *test,
            champion,
            improvement,
            version: resolver.next_version()?,
        })
    }
}
