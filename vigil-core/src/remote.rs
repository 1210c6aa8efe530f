//! Layout of the remote store.
//!
//! ```text
//! s3://<training_bucket>/artifact/<run_id>/...
//! s3://<training_bucket>/saved_models/<version>/model.bin
//! s3://<prediction_bucket>/artifact/<run_id>/prediction_output/<file>
//! ```
use crate::error::PipelineError;

const SCHEME: &str = "s3://";

/// URI of the artifacts of a training run.
pub fn artifact_uri(training_bucket: &str, run_id: &str) -> String {
    format!("{}{}/artifact/{}", SCHEME, training_bucket, run_id)
}

/// URI of the model store.
pub fn model_store_uri(training_bucket: &str) -> String {
    format!("{}{}/saved_models", SCHEME, training_bucket)
}

/// URI of a prediction run.
pub fn prediction_run_uri(prediction_bucket: &str, run_id: &str) -> String {
    format!("{}{}/artifact/{}", SCHEME, prediction_bucket, run_id)
}

/// URI of the output file of a prediction run.
pub fn prediction_output_uri(prediction_bucket: &str, run_id: &str, file_name: &str) -> String {
    format!(
        "{}/prediction_output/{}",
        prediction_run_uri(prediction_bucket, run_id),
        file_name
    )
}

/// Splits `s3://bucket/key` into `(bucket, key)`; the key may be empty.
pub fn split_uri(uri: &str) -> Result<(&str, &str), PipelineError> {
    let rest = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| PipelineError::Configuration(format!("not an s3 URI: {:?}", uri)))?;
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "no bucket in URI {:?}",
            uri
        )));
    }
    Ok((bucket, key.trim_end_matches('/')))
}
