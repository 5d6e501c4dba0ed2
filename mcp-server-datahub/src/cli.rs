use clap::{Parser, ValueEnum};
use serde_json::{Map, Value};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::client::DataHubClient;
use crate::config::ClientMode;
use crate::error::{AppError, Result};
use crate::middleware::{LoggingMiddleware, MiddlewareStack};
use crate::server::serve;
use crate::telemetry::{TelemetryMiddleware, TracingSink, track_command};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const START_EVENT: &str = "mcp-server-start";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Stdio,
    Sse,
    Http,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Sse => "sse",
            Transport::Http => "http",
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "mcp-server-datahub", version, about = "DataHub MCP server")]
pub struct Cli {
    /// Transport mode. `sse` serves stateful streamable HTTP at /sse on
    /// 127.0.0.1:8000; legacy SSE clients (GET /sse + POST /messages) cannot connect
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    pub transport: Transport,
    /// Log full request and response payloads
    #[arg(long)]
    pub debug: bool,
    /// Host to bind the server to (default: 0.0.0.0 for all interfaces)
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,
    /// Port to bind the server to (default: 8000)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

/// What the server is asked to run. Only HTTP carries a bind address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOptions {
    Stdio,
    Sse,
    Http {
        host: String,
        port: u16,
        stateless_http: bool,
    },
}

impl RunOptions {
    pub fn transport(&self) -> Transport {
        match self {
            RunOptions::Stdio => Transport::Stdio,
            RunOptions::Sse => Transport::Sse,
            RunOptions::Http { .. } => Transport::Http,
        }
    }
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        match self.transport {
            Transport::Stdio => RunOptions::Stdio,
            Transport::Sse => RunOptions::Sse,
            Transport::Http => RunOptions::Http {
                host: self.host.clone(),
                port: self.port,
                stateless_http: true,
            },
        }
    }
}

pub fn middleware_for(debug: bool) -> MiddlewareStack {
    let mut stack = MiddlewareStack::new();
    if debug {
        stack.add(LoggingMiddleware::new(true));
    }
    stack.add(TelemetryMiddleware::new());
    stack
}

pub fn component() -> String {
    format!("mcp-server-datahub/{}", env!("CARGO_PKG_VERSION"))
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let sink = TracingSink::from_env();
    let mut properties = Map::new();
    properties.insert("transport".to_string(), Value::from(cli.transport.as_str()));

    track_command(&sink, START_EVENT, properties, launch(cli)).await
}

pub async fn launch(cli: Cli) -> Result<()> {
    let client = DataHubClient::from_env(ClientMode::Sdk, component())?;
    let middleware = middleware_for(cli.debug);
    serve(cli.run_options(), client, middleware)
        .await
        .map_err(AppError::from)
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

pub fn print_error_and_exit(err: AppError) -> ! {
    eprintln!("error: {err}");
    std::process::exit(err.exit_code());
}
