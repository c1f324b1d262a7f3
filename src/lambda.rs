//! Additional functionality for integration with [lambda_runtime] and [lambda_http]
//!
//! Inspired by Lambda Power Tools
//!
//! *this module requires the `lambda` feature flag*
//!
//! # Simple Example
//! ```ignore
//!
//! use aws_embedded_metrics::{MetricsLogger, Unit};
//! // This replaces lambda_runtime::run and lambda_runtime::service_fn
//! use aws_embedded_metrics::lambda::handler::run;
//! use lambda_runtime::{Error, LambdaEvent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Request {}
//!
//! #[derive(Serialize)]
//! struct Response {}
//!
//! async fn function_handler(metrics: &MetricsLogger, event: LambdaEvent<Request>) -> Result<Response, Error> {
//!
//!     // Do something important
//!
//!     metrics.put_metric("requests", 1.0, Unit::Count)?;
//!
//!     Ok(Response {})
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     tracing_subscriber::fmt()
//!         .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
//!         .with_target(false)
//!         .without_time()
//!         .compact()
//!         .init();
//!
//!     let metrics = aws_embedded_metrics::Builder::new()
//!         .namespace("MetricsExample")
//!         .lambda_cold_start_metric("ColdStart")
//!         .with_lambda_request_id("RequestId")
//!         .init()?;
//!
//!     run(metrics, |event| function_handler(metrics, event)).await
//! }
//! ```
//!
//! # Output
//!
//! ```plaintext
//! START RequestId: 4bd2d365-3792-46c8-9b6c-6132f9630fbb Version: $LATEST
//! {"_aws":{"Timestamp":1687947426188,"CloudWatchMetrics":[{"Namespace":"MetricsExample","Dimensions":[["LogGroup","ServiceName","ServiceType"]],"Metrics":[{"Name":"ColdStart","Unit":"Count"}]}]},"LogGroup":"MetricsTest","ServiceName":"MetricsTest","ServiceType":"AWS::Lambda::Function","RequestId":"4bd2d365-3792-46c8-9b6c-6132f9630fbb","executionEnvironment":"AWS_Lambda_rust","ColdStart":1.0}
//! {"_aws":{"Timestamp":1687947426190,"CloudWatchMetrics":[{"Namespace":"MetricsExample","Dimensions":[["LogGroup","ServiceName","ServiceType"]],"Metrics":[{"Name":"requests","Unit":"Count"}]}]},"LogGroup":"MetricsTest","ServiceName":"MetricsTest","ServiceType":"AWS::Lambda::Function","RequestId":"4bd2d365-3792-46c8-9b6c-6132f9630fbb","executionEnvironment":"AWS_Lambda_rust","requests":1.0}
//! END RequestId: 4bd2d365-3792-46c8-9b6c-6132f9630fbb
//! ```
//! # Advanced Usage
//!
//! If you're building a more sophisticated [tower] stack, use [MetricsService] instead
//!

use super::logger::MetricsLogger;
use super::units::Unit;
use lambda_runtime::LambdaEvent;
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Once;
use std::task::{ready, Context, Poll};
use tracing::error;

/// Lambda behaviour configured through [Builder](super::Builder)
#[derive(Debug, Default, Clone)]
pub(crate) struct LambdaOptions {
    pub(crate) cold_start_metric: Option<&'static str>,
    pub(crate) request_id_property: Option<&'static str>,
    pub(crate) xray_trace_id_property: Option<&'static str>,
}

static COLD_START: Once = Once::new();

/// [tower::Service] for automatically [flushing](super::MetricsLogger::flush()) after each request and
/// enabling `lambda` features in [Builder](super::Builder)
///
/// For composing your own [tower] stacks to input into the Rust Lambda Runtime
pub struct MetricsService<S> {
    metrics: &'static MetricsLogger,
    inner: S,
}

impl<S> MetricsService<S> {
    /// Constructs a new [MetricsService] with the given [MetricsLogger] and inner
    /// [`tower::Service<LambdaEvent<Request>>`] to wrap
    pub fn new<Request>(metrics: &'static MetricsLogger, inner: S) -> MetricsService<S>
    where
        S: tower::Service<LambdaEvent<Request>>,
    {
        Self { metrics, inner }
    }

    /// Properties from the invocation context, they are cleared by every flush
    fn decorate(&self, context: &lambda_runtime::Context) {
        let options = &self.metrics.lambda;
        if let Some(property) = options.request_id_property {
            self.metrics.set_property(property, context.request_id.as_str());
        }
        if let (Some(property), Some(trace_id)) = (options.xray_trace_id_property, &context.xray_trace_id) {
            self.metrics.set_property(property, trace_id.as_str());
        }
    }
}

impl<S, Request> tower::Service<LambdaEvent<Request>> for MetricsService<S>
where
    S: tower::Service<LambdaEvent<Request>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = MetricsServiceFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: LambdaEvent<Request>) -> Self::Future {
        self.decorate(&req.context);

        if let Some(metric_name) = self.metrics.lambda.cold_start_metric {
            COLD_START.call_once(|| {
                let result = self
                    .metrics
                    .put_metric(metric_name, 1.0, Unit::Count)
                    .map_err(Into::into)
                    .and_then(|metrics| metrics.flush());
                if let Err(error) = result {
                    error!(%error, "Failed to emit the cold start metric");
                }
                // The flush cleared this invocation's properties
                self.decorate(&req.context);
            });
        }

        // Wrap the inner Future so we can flush after it's done
        MetricsServiceFuture {
            metrics: self.metrics,
            inner: self.inner.call(req),
        }
    }
}

#[pin_project]
#[doc(hidden)]
pub struct MetricsServiceFuture<F> {
    metrics: &'static MetricsLogger,
    #[pin]
    inner: F,
}

impl<F, Response, Error> Future for MetricsServiceFuture<F>
where
    F: Future<Output = Result<Response, Error>>,
{
    type Output = Result<Response, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));

        // Flush our metrics after the inner service is finished, never failing the invocation
        if let Err(error) = this.metrics.flush() {
            error!(%error, "Failed to flush metrics");
        }

        Poll::Ready(result)
    }
}

/// Helpers for starting the Lambda Rust runtime with a [tower::Service] wrapped by a [MetricsService]
///
/// Reduces the amount of ceremony needed in `main()` for simple use cases
///
pub mod service {

    use super::*;

    /// Start the Lambda Rust runtime with a given [`tower::Service<LambdaEvent<Request>>`]
    /// which is then wrapped by new [MetricsService] with a given [MetricsLogger]
    pub async fn run<S, Request, Response>(
        metrics: &'static MetricsLogger,
        inner: S,
    ) -> Result<(), lambda_runtime::Error>
    where
        S: tower::Service<LambdaEvent<Request>, Response = Response>,
        S::Future: std::future::Future<Output = Result<Response, S::Error>>,
        S::Error: Into<lambda_runtime::Diagnostic> + std::fmt::Debug + std::fmt::Display,
        Request: for<'de> serde::Deserialize<'de>,
        Response: serde::Serialize,
    {
        lambda_runtime::run(MetricsService::new::<Request>(metrics, inner)).await
    }

    /// Start the Lambda Rust runtime with a given [tower::Service<lambda_http::Request>]
    /// which is then wrapped by new [MetricsService] with a given [MetricsLogger]
    pub async fn run_http<'a, R, S, E>(metrics: &'static MetricsLogger, inner: S) -> Result<(), lambda_runtime::Error>
    where
        S: tower::Service<lambda_http::Request, Response = R, Error = E>,
        S::Future: Send + 'a,
        S::Error: std::fmt::Debug + std::fmt::Display,
        R: lambda_http::IntoResponse,
        E: Into<lambda_runtime::Diagnostic> + std::fmt::Debug + std::fmt::Display,
    {
        run(metrics, lambda_http::Adapter::from(inner)).await
    }
}

/// Helpers for starting the Lambda Rust runtime with a handler function wrapped by the [MetricsService]
///
/// Reduces the amount of ceremony needed in `main()` for simple use cases
///
pub mod handler {

    use super::*;

    /// Start the Lambda Rust runtime with a given [LambdaEvent] handler function
    /// which is then wrapped by a new [MetricsService] with a given [MetricsLogger]
    pub async fn run<T, F, Request, Response>(
        metrics: &'static MetricsLogger,
        handler: T,
    ) -> Result<(), lambda_runtime::Error>
    where
        T: FnMut(LambdaEvent<Request>) -> F,
        F: Future<Output = Result<Response, lambda_runtime::Error>>,
        Request: for<'de> serde::Deserialize<'de>,
        Response: serde::Serialize,
    {
        lambda_runtime::run(MetricsService::new::<Request>(
            metrics,
            lambda_runtime::service_fn(handler),
        ))
        .await
    }

    /// Start the Lambda Rust runtime with a given [lambda_http::Request] handler function
    /// which is then wrapped by a new [MetricsService] with a given [MetricsLogger]
    pub async fn run_http<'a, T, F, Response>(
        metrics: &'static MetricsLogger,
        handler: T,
    ) -> Result<(), lambda_runtime::Error>
    where
        T: FnMut(lambda_http::Request) -> F,
        F: Future<Output = Result<Response, lambda_runtime::Error>> + Send + 'a,
        Response: lambda_http::IntoResponse,
    {
        super::service::run(metrics, lambda_http::Adapter::from(lambda_http::service_fn(handler))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::environment::{Environment, EnvironmentResolver, LambdaEnvironment};
    use crate::sink::{ConsoleSink, Sink};
    use crate::test::SharedBuffer;
    use crate::Builder;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::Service;

    #[tokio::test]
    async fn flushes_after_each_invocation() {
        let buffer = SharedBuffer::default();
        let config = Arc::new(Config::default());
        let sink = Sink::Console(ConsoleSink::with_writer(buffer.clone()));
        let environment = Environment::Lambda(LambdaEnvironment::with_sink(sink));
        let resolver = EnvironmentResolver::fixed(config.clone(), environment);

        let metrics = Builder::with_config(Config::default())
            .resolver(Arc::new(resolver))
            .lambda_cold_start_metric("ColdStart")
            .with_lambda_request_id("RequestId")
            .with_lambda_xray_trace_id("TraceId")
            .init()
            .unwrap();

        let mut service = MetricsService::new::<Value>(
            metrics,
            lambda_runtime::service_fn(move |_event: LambdaEvent<Value>| async move {
                metrics.put_metric("requests", 1.0, Unit::Count)?;
                Ok::<_, lambda_runtime::Error>("done")
            }),
        );

        for request_id in ["first", "second"] {
            let mut context = lambda_runtime::Context::default();
            context.request_id = request_id.to_owned();
            context.xray_trace_id = Some(format!("Root=1-{request_id}"));
            let response = service.call(LambdaEvent::new(Value::Null, context)).await.unwrap();
            assert_eq!(response, "done");
        }

        let documents: Vec<Value> = buffer
            .contents()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(documents.len(), 3);

        assert_eq!(documents[0]["ColdStart"], 1.0);
        assert_eq!(documents[0]["RequestId"], "first");
        assert!(documents[0].get("requests").is_none());

        assert_eq!(documents[1]["requests"], 1.0);
        assert_eq!(documents[1]["RequestId"], "first");
        assert_eq!(documents[1]["TraceId"], "Root=1-first");
        assert_eq!(documents[1]["ServiceType"], "AWS::Lambda::Function");

        assert!(documents[2].get("ColdStart").is_none());
        assert_eq!(documents[2]["RequestId"], "second");
    }
}
