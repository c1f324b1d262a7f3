//! # Sinks
//!
//! Destinations a flushed [MetricsContext] is serialized to

use super::context::MetricsContext;
use super::error::Error;
use super::serializer;
use super::transport::{Endpoint, SocketClient};
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub enum Sink {
    /// CloudWatch agent (or a compatible sidecar) over TCP or UDP
    Agent(AgentSink),
    /// Standard output, picked up by the platform's log shipping
    Console(ConsoleSink),
}

impl Sink {
    pub fn name(&self) -> &'static str {
        match self {
            Sink::Agent(_) => "AgentSink",
            Sink::Console(_) => "ConsoleSink",
        }
    }

    pub fn log_group_name(&self) -> Option<&str> {
        match self {
            Sink::Agent(sink) => sink.log_group_name.as_deref(),
            Sink::Console(_) => None,
        }
    }

    /// Serialize the context and deliver every document in order
    ///
    /// Stops at the first failed delivery, nothing is retried at the document level
    pub fn accept(&self, context: &mut MetricsContext) -> Result<(), Error> {
        match self {
            Sink::Agent(sink) => sink.accept(context),
            Sink::Console(sink) => sink.accept(context),
        }
    }
}

pub struct AgentSink {
    log_group_name: Option<String>,
    log_stream_name: Option<String>,
    client: SocketClient,
}

impl AgentSink {
    pub fn new(log_group_name: Option<String>, log_stream_name: Option<String>, endpoint: Endpoint) -> Self {
        Self::with_client(log_group_name, log_stream_name, SocketClient::for_endpoint(endpoint))
    }

    pub fn with_client(log_group_name: Option<String>, log_stream_name: Option<String>, client: SocketClient) -> Self {
        Self {
            log_group_name: log_group_name.filter(|name| !name.is_empty()),
            log_stream_name: log_stream_name.filter(|name| !name.is_empty()),
            client,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.client.endpoint()
    }

    fn accept(&self, context: &mut MetricsContext) -> Result<(), Error> {
        if let Some(log_group_name) = &self.log_group_name {
            context.set_meta("LogGroupName", log_group_name.as_str())?;
        }
        if let Some(log_stream_name) = &self.log_stream_name {
            context.set_meta("LogStreamName", log_stream_name.as_str())?;
        }

        let events = serializer::serialize(context)?;
        debug!(count = events.len(), endpoint = %self.endpoint().address(), "Sending events to socket");

        for event in events {
            let mut message = event.into_bytes();
            message.push(b'\n');
            self.client.send_message(&message)?;
        }
        Ok(())
    }
}

pub struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write documents somewhere other than stdout
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    fn accept(&self, context: &MetricsContext) -> Result<(), Error> {
        let events = serializer::serialize(context)?;

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for event in events {
            writeln!(writer, "{event}")?;
        }
        writer.flush()?;
        Ok(())
    }
}
