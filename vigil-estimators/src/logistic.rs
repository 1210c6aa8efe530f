//! Binary logistic regression fitted by mini-batch gradient descent.
use anyhow::{bail, Result};
use log::debug;
use ndarray::{Array1, Array2, Axis};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use vigil_core::Classifier;

/// Configuration of [`LogisticRegression`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct LogisticRegressionConfig {
    /// Step size.
    pub learning_rate: f64,

    /// Passes over the training data.
    pub epochs: usize,

    /// Rows per gradient step.
    pub batch_size: usize,

    /// L2 penalty on the weights.
    pub l2: f64,

    /// Weights classes inversely to their frequency.
    pub balanced: bool,

    /// Probability above which a row is positive.
    pub threshold: f64,

    /// Seed of the row shuffling.
    pub seed: u64,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 100,
            batch_size: 32,
            l2: 1e-4,
            balanced: true,
            threshold: 0.5,
            seed: 42,
        }
    }
}

impl LogisticRegressionConfig {
    /// Sets the step size.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.learning_rate = v;
        self
    }

    /// Sets the number of passes over the training data.
    pub fn epochs(mut self, v: usize) -> Self {
        self.epochs = v;
        self
    }

    /// Sets the number of rows per gradient step.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the L2 penalty.
    pub fn l2(mut self, v: f64) -> Self {
        self.l2 = v;
        self
    }

    /// Enables or disables class balancing.
    pub fn balanced(mut self, v: bool) -> Self {
        self.balanced = v;
        self
    }

    /// Sets the decision threshold.
    pub fn threshold(mut self, v: f64) -> Self {
        self.threshold = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }
}

/// Fitted binary logistic regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    weights: Array1<f64>,
    bias: f64,
    threshold: f64,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LogisticRegression {
    /// Fits the model on features `x` and class indices `y` in `{0, 1}`.
    pub fn fit(config: &LogisticRegressionConfig, x: &Array2<f64>, y: &[usize]) -> Result<Self> {
        if x.nrows() != y.len() {
            bail!("{} rows of features but {} labels", x.nrows(), y.len());
        }
        if let Some(c) = y.iter().find(|&&c| c > 1) {
            bail!("Logistic regression is binary, got class {}", c);
        }
        if x.nrows() == 0 {
            bail!("No training rows");
        }

        let n = y.len() as f64;
        let n_pos = y.iter().filter(|&&c| c == 1).count() as f64;
        let class_weight = |c: usize| -> f64 {
            if !config.balanced {
                return 1.0;
            }
            let n_c = if c == 1 { n_pos } else { n - n_pos };
            if n_c == 0.0 {
                1.0
            } else {
                n / (2.0 * n_c)
            }
        };

        let mut rng = SmallRng::seed_from_u64(config.seed);
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let mut ixs: Vec<usize> = (0..x.nrows()).collect();
        let batch_size = config.batch_size.max(1);

        for epoch in 0..config.epochs {
            ixs.shuffle(&mut rng);
            let mut loss = 0.0;
            for batch in ixs.chunks(batch_size) {
                let mut grad_w = Array1::<f64>::zeros(weights.len());
                let mut grad_b = 0.0;
                for &i in batch.iter() {
                    let row = x.row(i);
                    let p = sigmoid(row.dot(&weights) + bias);
                    let target = y[i] as f64;
                    let w = class_weight(y[i]);
                    let err = w * (p - target);
                    grad_w.scaled_add(err, &row);
                    grad_b += err;
                    loss -= w
                        * (target * p.max(1e-12).ln()
                            + (1.0 - target) * (1.0 - p).max(1e-12).ln());
                }
                let m = batch.len() as f64;
                weights.zip_mut_with(&grad_w, |w, g| {
                    *w -= config.learning_rate * (g / m + config.l2 * *w);
                });
                bias -= config.learning_rate * grad_b / m;
            }
            if epoch % 10 == 0 {
                debug!("epoch {}, loss {:.6}", epoch, loss / n);
            }
        }

        Ok(Self {
            weights,
            bias,
            threshold: config.threshold,
        })
    }

    /// Probability of the positive class for each row.
    ///
    /// Features beyond the fitted weights are ignored.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        x.axis_iter(Axis(0))
            .map(|row| {
                let z: f64 = row.iter().zip(self.weights.iter()).map(|(v, w)| v * w).sum();
                sigmoid(z + self.bias)
            })
            .collect()
    }

    /// Fitted weights.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }
}

impl Classifier for LogisticRegression {
    fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        self.predict_proba(x)
            .into_iter()
            .map(|p| (p > self.threshold) as usize)
            .collect()
    }
}
