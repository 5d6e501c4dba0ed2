use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::middleware::{MessageContext, Middleware, Outcome};

pub const TELEMETRY_ENV: &str = "DATAHUB_TELEMETRY_ENABLED";
pub const TOOL_CALL_EVENT: &str = "mcp-server-tool-call";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub properties: Map<String, Value>,
}

pub trait TelemetrySink: Send + Sync + 'static {
    fn capture(&self, event: TelemetryEvent);
}

/// Emits telemetry as structured tracing events on the `telemetry` target.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    enabled: bool,
}

impl TracingSink {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn from_env() -> Self {
        Self::new(telemetry_enabled(std::env::var(TELEMETRY_ENV).ok().as_deref()))
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl TelemetrySink for TracingSink {
    fn capture(&self, event: TelemetryEvent) {
        if !self.enabled {
            return;
        }
        let properties = Value::Object(event.properties);
        tracing::info!(
            target: "telemetry",
            event = %event.name,
            properties = %properties,
        );
    }
}

fn telemetry_enabled(value: Option<&str>) -> bool {
    match value.map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) => !matches!(value.as_str(), "false" | "0" | "off"),
        None => true,
    }
}

#[derive(Clone)]
pub struct TelemetryMiddleware {
    sink: Arc<dyn TelemetrySink>,
}

impl TelemetryMiddleware {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink::from_env()))
    }

    pub fn with_sink(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }
}

impl Default for TelemetryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for TelemetryMiddleware {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn on_response(&self, message: &MessageContext, outcome: &Outcome<'_>) {
        let Some(tool) = message.tool_name() else {
            return;
        };

        let mut properties = Map::new();
        properties.insert("tool".to_string(), Value::from(tool));
        properties.insert(
            "duration_ms".to_string(),
            Value::from(message.elapsed().as_millis() as u64),
        );
        properties.insert("is_error".to_string(), Value::from(outcome.is_error()));

        self.sink.capture(TelemetryEvent {
            name: TOOL_CALL_EVENT.to_string(),
            properties,
        });
    }
}

/// Runs `future` and records a single event describing how it ended.
pub async fn track_command<F, T, E>(
    sink: &dyn TelemetrySink,
    name: &str,
    mut properties: Map<String, Value>,
    future: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let started = Instant::now();
    let result = future.await;

    properties.insert(
        "duration_ms".to_string(),
        Value::from(started.elapsed().as_millis() as u64),
    );
    properties.insert("success".to_string(), Value::from(result.is_ok()));
    if let Err(error) = &result {
        properties.insert("error".to_string(), Value::from(error.to_string()));
    }

    sink.capture(TelemetryEvent {
        name: name.to_string(),
        properties,
    });
    result
}
