use std::sync::Arc;

use axum::Router;
use axum::routing::any_service;
use rmcp::ServiceExt;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::{StreamableHttpServerConfig, StreamableHttpService};
use thiserror::Error;

use crate::cli::RunOptions;
use crate::client::DataHubClient;
use crate::middleware::MiddlewareStack;
use crate::tools::DataHubServer;

pub const SSE_BIND_ADDR: &str = "127.0.0.1:8000";
pub const SSE_PATH: &str = "/sse";
pub const HTTP_PATH: &str = "/mcp";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("MCP session failed to initialize: {0}")]
    Initialize(String),
    #[error("MCP session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("server I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Streamable HTTP router. Stateful mode keeps per-session SSE streams open;
/// stateless mode answers every POST independently.
pub fn build_app(
    client: DataHubClient,
    middleware: MiddlewareStack,
    path: &str,
    stateful_mode: bool,
) -> Router {
    let session_manager = Arc::new(LocalSessionManager::default());
    let mcp_service = StreamableHttpService::new(
        move || Ok(middleware.wrap(DataHubServer::new(client.clone()))),
        session_manager,
        StreamableHttpServerConfig {
            stateful_mode,
            ..Default::default()
        },
    );

    Router::new().route_service(path, any_service(mcp_service))
}

pub async fn serve(
    options: RunOptions,
    client: DataHubClient,
    middleware: MiddlewareStack,
) -> Result<(), ServerError> {
    tracing::info!(
        transport = options.transport().as_str(),
        server = %client.config().server,
        middleware = ?middleware,
        "starting DataHub MCP server",
    );

    match http_plan(&options) {
        None => serve_stdio(client, middleware).await,
        Some(plan) => {
            let app = build_app(client, middleware, plan.path, plan.stateful_mode);
            serve_http(app, plan.addr, plan.path).await
        }
    }
}

/// Bind address, route and session mode for the HTTP-based transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPlan {
    pub addr: String,
    pub path: &'static str,
    pub stateful_mode: bool,
}

/// `None` means stdio. Only `http` uses the caller's host and port.
pub fn http_plan(options: &RunOptions) -> Option<HttpPlan> {
    match options {
        RunOptions::Stdio => None,
        RunOptions::Sse => Some(HttpPlan {
            addr: SSE_BIND_ADDR.to_string(),
            path: SSE_PATH,
            stateful_mode: true,
        }),
        RunOptions::Http {
            host,
            port,
            stateless_http,
        } => Some(HttpPlan {
            addr: format!("{host}:{port}"),
            path: HTTP_PATH,
            stateful_mode: !stateless_http,
        }),
    }
}

async fn serve_stdio(client: DataHubClient, middleware: MiddlewareStack) -> Result<(), ServerError> {
    let service = middleware
        .wrap(DataHubServer::new(client))
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|error| ServerError::Initialize(error.to_string()))?;

    let reason = service.waiting().await?;
    tracing::info!(reason = ?reason, "stdio session closed");
    Ok(())
}

async fn serve_http(app: Router, addr: String, path: &str) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr.as_str())
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(addr = %addr, path, "listening for MCP clients");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
