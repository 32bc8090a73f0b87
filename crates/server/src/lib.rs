use tracing_subscriber::{EnvFilter, prelude::*};

pub mod config;
pub mod error;
pub mod mcp;
pub mod middleware;
pub mod response;
pub mod routes;

/// Install the global subscriber. Logs go to stderr so the MCP binary keeps
/// stdout for the protocol.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
