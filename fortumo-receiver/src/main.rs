//! Fortumo Receiver - standalone SMS payment notification receiver.
//!
//! Listens on `PORT` for `/_incoming_sms`, logs every accepted notification
//! and replies "received!" to the sender.

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fortumo::{Attachment, Config, InboundRequest, ListenTarget, ResponseTicket, SmsReceiver};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("receiver_starting");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        charset = %config.receiver.charset,
        allowed_addresses = config.receiver.allowed_addresses.len(),
        config_url_set = config.receiver.config_url.is_some(),
        "config_loaded"
    );

    let receiver = SmsReceiver::new(config.receiver).context("Failed to create receiver")?;
    receiver.on_sms(|sms: InboundRequest, reply: ResponseTicket| {
        let fields = serde_json::to_string(&sms).unwrap_or_default();
        info!(sms = %fields, "sms_message");
        reply.reply("received!");
    });

    let Attachment::Spawned(handle) = receiver
        .listen(ListenTarget::Port(config.port))
        .await
        .context("Failed to start receiver")?
    else {
        anyhow::bail!("receiver did not start its own server");
    };

    shutdown_signal().await;

    handle.shutdown().await.context("Server error")?;

    info!("receiver_shutdown_complete");

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

    info!("receiver_shutting_down");
}
