//! Traits of the trainable model.
//!
//! The pipelines do not know how features are transformed or how a classifier is
//! fitted. They only see an [`Estimator`] that fits a [`Transform`] on the training
//! features and a [`Classifier`] on the transformed features. The fitted pair is
//! bundled as a [`TrainedModel`], which is what the model store holds.
use crate::{dataset::Dataset, error::PipelineError, util};
use anyhow::Result;
use ndarray::Array2;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

/// A fitted feature transform.
pub trait Transform: Serialize + DeserializeOwned {
    /// Transforms a feature matrix. The number of rows is preserved.
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// A fitted classifier.
pub trait Classifier: Serialize + DeserializeOwned {
    /// Predicts class indices, one per row.
    fn predict(&self, x: &Array2<f64>) -> Vec<usize>;
}

/// Fits transforms and classifiers.
pub trait Estimator {
    /// Fitted transform.
    type Transform: Transform;

    /// Fitted classifier.
    type Classifier: Classifier;

    /// Fits the feature transform on raw training features.
    fn fit_transform(&self, x: &Array2<f64>) -> Result<Self::Transform>;

    /// Fits the classifier on transformed features and class indices.
    fn fit_classifier(&self, x: &Array2<f64>, y: &[usize]) -> Result<Self::Classifier>;
}

/// A fitted transform and classifier with the feature columns they consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize, C: Serialize",
    deserialize = "T: DeserializeOwned, C: DeserializeOwned"
))]
pub struct TrainedModel<T, C> {
    transform: T,
    classifier: C,
    feature_columns: Vec<String>,
}

impl<T: Transform, C: Classifier> TrainedModel<T, C> {
    /// Bundles a fitted transform and classifier.
    pub fn new(transform: T, classifier: C, feature_columns: Vec<String>) -> Self {
        Self {
            transform,
            classifier,
            feature_columns,
        }
    }

    /// Feature columns, in the order the transform expects them.
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// Predicts class indices from an already extracted feature matrix.
    ///
    /// Fails with [`PipelineError::Validation`] unless there is one prediction per row.
    pub fn predict_matrix(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let y = self.classifier.predict(&self.transform.transform(x)?);
        if y.len() != x.nrows() {
            return Err(PipelineError::Validation(format!(
                "{} predictions for {} rows",
                y.len(),
                x.nrows()
            ))
            .into());
        }
        Ok(y)
    }

    /// Predicts class indices, one per row of the dataset.
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<usize>> {
        let x = dataset.feature_matrix(&self.feature_columns)?;
        self.predict_matrix(&x)
    }

    /// Saves the model.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        util::save_object(path.as_ref(), self)
    }

    /// Loads a model saved with [`TrainedModel::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        util::load_object(path.as_ref())
    }
}
