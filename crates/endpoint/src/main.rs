//! `flow-endpoint` - endpoint binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing, optional OTLP export).
//! 3. Load the private key into a [`KeyStore`](envelope::KeyStore); a bad key
//!    or passphrase stops the process here.
//! 4. Spawn the key file reload task.
//! 5. Build the Axum router and start the HTTP server.

mod config;
mod keys;
mod responder;
mod server;
mod telemetry;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Result;
use envelope::ProtocolHandler;
use tracing::info;

use config::Config;
use responder::EchoResponder;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otlp_endpoint(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "flow-endpoint starting"
    );

    // -----------------------------------------------------------------------
    // 3. Private key
    // -----------------------------------------------------------------------
    let key_store = keys::load(&cfg)?;

    // -----------------------------------------------------------------------
    // 4. Background tasks
    // -----------------------------------------------------------------------
    let _key_reload = keys::reload_task(cfg.clone(), key_store.clone());

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let protocol = ProtocolHandler::new(key_store, Arc::new(EchoResponder), cfg.business_timeout());
    let router = server::router::build(AppState::new(protocol));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
