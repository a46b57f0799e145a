//! Fortumo Demo - receiver injected into an existing HTTP server.
//!
//! The host server answers every request with a JSON dump of the remote
//! service configuration (`FORTUMO_CONFIG_URL`). The receiver is injected in
//! front of it and claims only `/_incoming_sms`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fortumo::{
    Config, Exchange, HttpServer, InboundRequest, ListenTarget, ResponseTicket, SmsReceiver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("demo_server_starting");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        config_url_set = config.receiver.config_url.is_some(),
        "config_loaded"
    );

    let receiver = SmsReceiver::new(config.receiver).context("Failed to create receiver")?;

    // 1. The existing server: dumps the service configuration for every request
    let server = HttpServer::new();
    let config_source = receiver.clone();
    server.add_listener(move |exchange: &Exchange| {
        let exchange = exchange.clone();
        let receiver = config_source.clone();
        tokio::spawn(async move {
            let body = match receiver.get_config().await {
                Ok(document) => format!(
                    "This service is set up with the following params (JSON dump):\n{}",
                    serde_json::to_string(&document).unwrap_or_default()
                ),
                Err(e) => {
                    error!(error = %e, "config_dump_failed");
                    "Error occured while loading data\n".to_string()
                }
            };
            exchange.response().reply(body);
        });
    });

    // 2. Inject the receiver into the existing server
    receiver
        .listen(ListenTarget::Server(&server))
        .await
        .context("Failed to inject receiver")?;

    receiver.on_sms(|sms: InboundRequest, reply: ResponseTicket| {
        let fields = serde_json::to_string(&sms).unwrap_or_default();
        info!(sms = %fields, "sms_message");
        reply.reply("received!");
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    server
        .serve_with_shutdown(listener, shutdown_signal())
        .await
        .context("Server error")?;

    info!("demo_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("demo_server_shutting_down");
}
