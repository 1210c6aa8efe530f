#![warn(missing_docs)]
//! HTTP surface of the vigil pipelines.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /` | a banner listing the routes |
//! | `GET /train` | runs the training pipeline |
//! | `GET /predict/<path..>` | scores the batch at `<path..>`, percent-decoded |
//!
//! Every response is `200 OK` with a plain text message; failures are reported as
//! `Error Occurred! <message>`. Pipeline runs are blocking and execute on
//! [`tokio::task::spawn_blocking`].
use log::{info, warn};
use percent_encoding::percent_decode_str;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use vigil_core::{pipeline::PredictionOutcome, PipelineError};
use warp::{path::Tail, Filter, Rejection, Reply};

/// Text served on `GET /`.
pub const BANNER: &str =
    "vigil: GET /train runs the training pipeline, GET /predict/<path> scores a batch";

/// The pipelines behind the routes.
pub trait PipelineService: Send + Sync + 'static {
    /// Runs the training pipeline to completion.
    fn train(&self) -> anyhow::Result<()>;

    /// Runs the prediction pipeline on the batch at `source`.
    fn predict(&self, source: &str) -> anyhow::Result<PredictionOutcome>;
}

fn error_message(e: &anyhow::Error) -> String {
    format!("Error Occurred! {:#}", e)
}

async fn train_handler<S: PipelineService>(service: Arc<S>) -> Result<String, Infallible> {
    let msg = match tokio::task::spawn_blocking(move || service.train()).await {
        Ok(Ok(())) => "Training successful !!".to_string(),
        Ok(Err(e)) => match e.downcast_ref::<PipelineError>() {
            Some(PipelineError::AlreadyRunning) => {
                info!("Refused a training request, a run is in progress");
                "Training pipeline is already running.".to_string()
            }
            _ => {
                warn!("Training failed: {:#}", e);
                error_message(&e)
            }
        },
        Err(e) => error_message(&anyhow::Error::new(e)),
    };
    Ok(msg)
}

async fn predict_handler<S: PipelineService>(
    tail: Tail,
    service: Arc<S>,
) -> Result<String, Infallible> {
    let source = match percent_decode_str(tail.as_str()).decode_utf8() {
        Ok(source) => source.into_owned(),
        Err(_) => {
            let e = PipelineError::Validation(format!(
                "path {:?} is not UTF-8 once decoded",
                tail.as_str()
            ));
            return Ok(error_message(&anyhow::Error::new(e)));
        }
    };
    let msg = match tokio::task::spawn_blocking(move || service.predict(&source)).await {
        Ok(Ok(outcome)) => outcome.message(),
        Ok(Err(e)) => {
            warn!("Prediction failed: {:#}", e);
            error_message(&e)
        }
        Err(e) => error_message(&anyhow::Error::new(e)),
    };
    Ok(msg)
}

/// Routes of the server.
pub fn routes<S: PipelineService>(
    service: Arc<S>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let service = warp::any().map(move || service.clone());

    let index = warp::path::end().and(warp::get()).map(|| BANNER);

    let train = warp::path!("train")
        .and(warp::get())
        .and(service.clone())
        .and_then(train_handler::<S>);

    let predict = warp::path("predict")
        .and(warp::get())
        .and(warp::path::tail())
        .and(service)
        .and_then(predict_handler::<S>);

    index.or(train).or(predict).with(warp::log("vigil_server"))
}

/// Serves the routes on `addr` until the process is stopped.
pub async fn serve<S: PipelineService>(addr: impl Into<SocketAddr>, service: Arc<S>) {
    let addr = addr.into();
    info!("Serving on http://{}", addr);
    warp::serve(routes(service)).run(addr).await;
}
