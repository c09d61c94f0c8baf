//! logsmith: a concurrent TCP log collection server
//!
//! Clients connect, send one newline-terminated JSON payload with optional
//! `logLevel` and `logMessage` fields, and receive a single plain-text
//! response. Accepted entries are rendered through a configurable template
//! and appended to a shared log file.
//!
//! Features:
//! - Per-client rate limiting over a rolling one-second window
//! - Timeout-bounded reads with malformed-input recovery
//! - Serialized, non-interleaved appends from any number of connections
//! - Configuration via CLI arguments or TOML file

mod appender;
mod config;
mod framing;
mod limiter;
mod protocol;
mod server;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        log_file = %config.log_file.display(),
        max_per_second = config.max_per_second,
        read_timeout_secs = config.read_timeout.as_secs(),
        "Starting logsmith server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(async { Server::new(config).run().await })
}
