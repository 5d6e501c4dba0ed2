pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod server;
pub mod telemetry;
pub mod tools;

pub use cli::{Cli, RunOptions, Transport};
pub use client::DataHubClient;
pub use middleware::{LoggingMiddleware, Middleware, MiddlewareStack};
pub use server::serve;
pub use telemetry::TelemetryMiddleware;
