use aws_embedded_metrics::{lambda::handler::run, DimensionSet, MetricsLogger, Unit};
use lambda_runtime::{Error, LambdaEvent};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct Request {
    method: Option<String>,
}

#[derive(Serialize)]
struct Response {
    req_id: String,
}

async fn function_handler(metrics: &MetricsLogger, event: LambdaEvent<Request>) -> Result<Response, Error> {
    let resp = Response {
        req_id: event.context.request_id.clone(),
    };

    let method = event.payload.method.unwrap_or_else(|| "Default".to_owned());
    metrics
        .put_dimensions(DimensionSet::from([("Method".to_owned(), method)]))?
        .put_metric("requests", 1.0, Unit::Count)?;

    Ok(resp)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .compact()
        .init();

    let metrics = aws_embedded_metrics::Builder::new()
        .namespace("MetricsTest")
        .lambda_cold_start_metric("ColdStart")
        .with_lambda_request_id("RequestId")
        .init()?;

    run(metrics, |event| function_handler(metrics, event)).await
}
