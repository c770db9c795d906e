//! Edge agent binary.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use edgewire_agent::{Agent, AgentConfig, Args, Error, Result, UbusCaller, tls};
use edgewire_transport_ws::WebSocketDialer;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let config = AgentConfig::load(Args::parse())?;
    init_logging(&config.log_filter)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting edgewire agent");
    match &config.source {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found, using defaults"),
    }

    let tls = if config.enable_ssl {
        Some(tls::client_config(config.verify_tls)?)
    } else {
        None
    };

    let dialer = WebSocketDialer::new().with_connect_timeout(CONNECT_TIMEOUT);
    let agent = Arc::new(Agent::new(
        config,
        Arc::new(dialer),
        Arc::new(UbusCaller::new()),
        tls,
    ));

    let runner = tokio::spawn({
        let agent = Arc::clone(&agent);
        async move { agent.run().await }
    });

    let received = wait_for_signal().await?;
    warn!(signal = received, "shutting down");
    agent.shutdown();

    if let Err(e) = runner.await {
        error!("agent task failed: {}", e);
    }

    Ok(())
}

fn init_logging(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

async fn wait_for_signal() -> Result<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())
        .map_err(|e| Error::Io("failed to create SIGINT signal", e))?;
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| Error::Io("failed to create SIGTERM signal", e))?;
    let mut hangup = signal(SignalKind::hangup())
        .map_err(|e| Error::Io("failed to create SIGHUP signal", e))?;
    let mut quit =
        signal(SignalKind::quit()).map_err(|e| Error::Io("failed to create SIGQUIT signal", e))?;

    let received = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
        _ = quit.recv() => "SIGQUIT",
    };

    Ok(received)
}
