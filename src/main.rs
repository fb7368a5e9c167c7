//! http-echo: a tiny HTTP server that echoes a configured value
//!
//! The server answers every request on its root path with either a literal
//! string or the value of a named environment variable, and exposes a
//! `/health` liveness endpoint.
//!
//! Features:
//! - One access-log line per request on stdout
//! - Lifecycle logging on stderr via tracing
//! - Configuration via CLI arguments or TOML file
//! - Graceful shutdown on interrupt, bounded to five seconds

mod access_log;
mod config;
mod handlers;
mod server;

use config::Config;
use server::Server;
use std::process;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    // Invalid configuration must not bind a listener: report and exit 127.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(127);
        }
    };

    // Initialize logging. Lifecycle messages go to stderr; stdout carries
    // the per-request access log.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    process::exit(run(config));
}

#[tokio::main]
async fn run(config: Config) -> i32 {
    let listen = config.listen.clone();
    let server = Server::new(config);

    let listener = match server.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, address = %listen, "Failed to bind listener");
            return 1;
        }
    };
    info!(address = %listen, "Server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

    // Wait for interrupt
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to wait for interrupt signal");
        return 1;
    }

    info!("Received interrupt, shutting down");
    let _ = shutdown_tx.send(true);

    match server_task.await {
        // A stop triggered from outside exits non-zero so supervisors can
        // tell it apart from the process finishing on its own.
        Ok(Ok(())) => 2,
        Ok(Err(e)) => {
            error!(error = %e, "Failed to shut down server");
            1
        }
        Err(e) => {
            error!(error = %e, "Server task failed");
            1
        }
    }
}
