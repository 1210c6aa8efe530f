#![warn(missing_docs)]
//! Command line and HTTP entry points of the vigil pipelines.
//!
//! The `vigil` binary reads a [`VigilConfig`] (by default from `vigil.yaml`) and
//! runs the training pipeline, scores a batch, or serves both over HTTP:
//!
//! ```text
//! vigil init-config vigil.yaml
//! vigil train
//! vigil predict data/batch.csv
//! vigil serve --addr 0.0.0.0:8080
//! ```
mod app;
pub mod config;
pub mod util;

pub use app::App;
pub use config::{SyncBackend, VigilConfig};
