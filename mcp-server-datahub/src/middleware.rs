//! Hooks that observe every MCP message passing through the server.
//!
//! A [`MiddlewareStack`] wraps a server handler in a [`LayeredService`], which
//! implements the rmcp service seam directly. Requests are shown to each
//! middleware in insertion order and responses in reverse order.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rmcp::ErrorData as McpError;
use rmcp::model::{ClientNotification, ClientRequest, ServerInfo, ServerResult};
use rmcp::service::{NotificationContext, RequestContext, RoleServer, Service};
use serde::Serialize;
use serde_json::Value;

/// A single inbound message as seen by middleware.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub method: String,
    pub params: Value,
    started: Instant,
}

impl MessageContext {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            started: Instant::now(),
        }
    }

    fn from_message<T: Serialize>(message: &T) -> Self {
        let mut encoded = serde_json::to_value(message).unwrap_or(Value::Null);
        let method = encoded
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let params = encoded
            .get_mut("params")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Self::new(method, params)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Tool name for `tools/call` requests.
    pub fn tool_name(&self) -> Option<&str> {
        if self.method != "tools/call" {
            return None;
        }
        self.params.get("name").and_then(Value::as_str)
    }
}

/// Result of a request, borrowed for the duration of the response hooks.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Response(&'a ServerResult),
    Error(&'a McpError),
}

impl<'a> Outcome<'a> {
    fn from_result(result: &'a Result<ServerResult, McpError>) -> Self {
        match result {
            Ok(response) => Outcome::Response(response),
            Err(error) => Outcome::Error(error),
        }
    }

    /// Protocol errors and tool results flagged `isError` both count.
    pub fn is_error(&self) -> bool {
        match self {
            Outcome::Error(_) => true,
            Outcome::Response(ServerResult::CallToolResult(result)) => {
                result.is_error.unwrap_or(false)
            }
            Outcome::Response(_) => false,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Outcome::Response(response) => serde_json::to_value(response).unwrap_or(Value::Null),
            Outcome::Error(error) => serde_json::to_value(error).unwrap_or(Value::Null),
        }
    }
}

pub trait Middleware: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn on_request(&self, _message: &MessageContext) {}

    fn on_response(&self, _message: &MessageContext, _outcome: &Outcome<'_>) {}

    fn on_notification(&self, _message: &MessageContext) {}
}

#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, middleware: impl Middleware) -> &mut Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn wrap<S>(&self, inner: S) -> LayeredService<S>
    where
        S: Service<RoleServer>,
    {
        LayeredService {
            inner,
            stack: self.clone(),
        }
    }

    fn before(&self, message: &MessageContext) {
        for layer in &self.layers {
            layer.on_request(message);
        }
    }

    fn after(&self, message: &MessageContext, outcome: &Outcome<'_>) {
        for layer in self.layers.iter().rev() {
            layer.on_response(message, outcome);
        }
    }

    fn notify(&self, message: &MessageContext) {
        for layer in &self.layers {
            layer.on_notification(message);
        }
    }
}

impl std::fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

pub struct LayeredService<S> {
    inner: S,
    stack: MiddlewareStack,
}

impl<S> Service<RoleServer> for LayeredService<S>
where
    S: Service<RoleServer>,
{
    fn handle_request(
        &self,
        request: ClientRequest,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ServerResult, McpError>> + Send + '_ {
        async move {
            if self.stack.is_empty() {
                return self.inner.handle_request(request, context).await;
            }

            let message = MessageContext::from_message(&request);
            self.stack.before(&message);
            let result = self.inner.handle_request(request, context).await;
            self.stack.after(&message, &Outcome::from_result(&result));
            result
        }
    }

    fn handle_notification(
        &self,
        notification: ClientNotification,
        context: NotificationContext<RoleServer>,
    ) -> impl Future<Output = Result<(), McpError>> + Send + '_ {
        async move {
            if !self.stack.is_empty() {
                self.stack.notify(&MessageContext::from_message(&notification));
            }
            self.inner.handle_notification(notification, context).await
        }
    }

    fn get_info(&self) -> ServerInfo {
        self.inner.get_info()
    }
}

/// Logs each request with its outcome and latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware {
    pub include_payloads: bool,
}

impl LoggingMiddleware {
    pub fn new(include_payloads: bool) -> Self {
        Self { include_payloads }
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn on_request(&self, message: &MessageContext) {
        if self.include_payloads {
            tracing::info!(method = %message.method, params = %message.params, "mcp request");
        } else {
            tracing::info!(method = %message.method, "mcp request");
        }
    }

    fn on_response(&self, message: &MessageContext, outcome: &Outcome<'_>) {
        let elapsed_ms = message.elapsed().as_millis() as u64;
        let is_error = outcome.is_error();
        if self.include_payloads {
            tracing::info!(
                method = %message.method,
                elapsed_ms,
                is_error,
                result = %outcome.payload(),
                "mcp response",
            );
        } else {
            tracing::info!(method = %message.method, elapsed_ms, is_error, "mcp response");
        }
    }

    fn on_notification(&self, message: &MessageContext) {
        tracing::debug!(method = %message.method, "mcp notification");
    }
}
