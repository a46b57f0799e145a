//! The SMS receiver: handler registration, request dispatch and route
//! injection.
//!
//! ```text
//! request → path match → validate → Rejected: "Error: <reason>"
//!                                  → Accepted: handlers(sms, ticket)
//! ```
//!
//! The receiver either runs its own server on a port, or is injected into an
//! existing [`HttpServer`] in front of that server's listeners. Requests it
//! does not claim fall through to the original listeners untouched.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::http::{HeaderMap, HeaderValue};
use thiserror::Error;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{info, warn};

use super::gate::ResponseTicket;
use super::server::{Exchange, HttpServer, RequestListener};
use crate::config::{ConfigError, ReceiverConfig, SourceAddressPolicy};
use crate::remote::{self, ConfigFetchError, RemoteConfigDocument};
use crate::sms::{validate, InboundRequest, ValidationOutcome};

/// Path the provider posts notifications to.
pub const INCOMING_SMS_PATH: &str = "/_incoming_sms";

/// Header consulted under [`SourceAddressPolicy::TrustedProxies`].
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Receiver errors.
#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("invalid receiver configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("server error: {0}")]
    Serve(#[from] io::Error),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Application callback for accepted notifications.
///
/// `reply` delivers a message back to the SMS sender. Only the first reply
/// for a request is sent; later calls are ignored. If the handler never
/// replies while holding the ticket, the HTTP exchange stays open.
pub trait SmsHandler: Send + Sync + 'static {
    fn on_sms(&self, sms: InboundRequest, reply: ResponseTicket);
}

impl<F> SmsHandler for F
where
    F: Fn(InboundRequest, ResponseTicket) + Send + Sync + 'static,
{
    fn on_sms(&self, sms: InboundRequest, reply: ResponseTicket) {
        self(sms, reply)
    }
}

/// Where to attach the receiver.
pub enum ListenTarget<'a> {
    /// Start a new server on this port (all interfaces).
    Port(u16),
    /// Inject into a server owned by the caller.
    Server(&'a HttpServer),
}

/// Result of [`SmsReceiver::attach`].
#[derive(Debug)]
pub enum Attachment {
    Spawned(ServerHandle),
    Injected,
}

/// A server started by the receiver.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) -> Result<(), ReceiverError> {
        let _ = self.shutdown.send(());
        self.task.await??;
        Ok(())
    }
}

/// Receives, authenticates and dispatches provider notifications.
#[derive(Clone)]
pub struct SmsReceiver {
    inner: Arc<ReceiverInner>,
}

struct ReceiverInner {
    config: ReceiverConfig,
    content_type: HeaderValue,
    handlers: RwLock<Vec<Arc<dyn SmsHandler>>>,
    client: reqwest::Client,
}

impl SmsReceiver {
    pub fn new(config: ReceiverConfig) -> Result<Self, ReceiverError> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Use a caller-provided HTTP client for remote config fetches.
    pub fn with_client(config: ReceiverConfig, client: reqwest::Client) -> Result<Self, ReceiverError> {
        config.validate()?;
        let content_type = HeaderValue::from_str(&config.content_type())
            .map_err(|_| ConfigError::InvalidCharset(config.charset.clone()))?;

        Ok(Self {
            inner: Arc::new(ReceiverInner {
                config,
                content_type,
                handlers: RwLock::new(Vec::new()),
                client,
            }),
        })
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.inner.config
    }

    /// Register a handler for accepted notifications.
    ///
    /// Handlers run in registration order and share one reply ticket.
    pub fn on_sms(&self, handler: impl SmsHandler) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(handler));
    }

    /// Attach at [`INCOMING_SMS_PATH`].
    pub async fn listen(&self, target: ListenTarget<'_>) -> Result<Attachment, ReceiverError> {
        self.attach(target, INCOMING_SMS_PATH).await
    }

    /// Attach at `path` on a new or an existing server.
    pub async fn attach(
        &self,
        target: ListenTarget<'_>,
        path: &str,
    ) -> Result<Attachment, ReceiverError> {
        match target {
            ListenTarget::Port(port) => self
                .listen_on_port(port, path)
                .await
                .map(Attachment::Spawned),
            ListenTarget::Server(server) => {
                self.inject(server, path);
                Ok(Attachment::Injected)
            }
        }
    }

    /// Start a server on `port` whose only behavior is the receiver route.
    pub async fn listen_on_port(&self, port: u16, path: &str) -> Result<ServerHandle, ReceiverError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ReceiverError::Bind { port, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ReceiverError::Bind { port, source })?;

        let server = HttpServer::with_content_type(self.inner.content_type.clone());
        server.add_listener(self.route(path, Vec::new()));

        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_with_shutdown(listener, async move {
            let _ = signal.await;
        }));

        info!(address = %local_addr, path = %path, "sms_receiver_listening");

        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }

    /// Put the receiver route in front of `server`'s existing listeners.
    ///
    /// Requests for `path` are handled by the receiver alone. Every other
    /// request is passed to the original listeners, in their original order.
    /// Call once during setup, before the server takes traffic.
    pub fn inject(&self, server: &HttpServer, path: &str) {
        server.replace_listeners(|existing| {
            info!(
                path = %path,
                existing_listeners = existing.len(),
                "route_injected"
            );
            let route: Arc<dyn RequestListener> = Arc::new(self.route(path, existing));
            vec![route]
        });
    }

    /// Fetch and parse the remote service configuration.
    pub async fn get_config(&self) -> Result<RemoteConfigDocument, ConfigFetchError> {
        let url = self
            .inner
            .config
            .config_url
            .as_deref()
            .ok_or(ConfigFetchError::NotConfigured)?;
        remote::fetch_config(&self.inner.client, url, &self.inner.config.charset).await
    }

    /// Authenticate one claimed exchange and either reject it or hand it to
    /// the registered handlers.
    pub fn dispatch(&self, exchange: &Exchange) {
        let config = &self.inner.config;
        let ticket = exchange.response();
        ticket.set_content_type(self.inner.content_type.clone());

        let request = InboundRequest::from_query(exchange.query().unwrap_or(""));
        let source_address = resolve_source_address(
            exchange.remote_addr(),
            exchange.headers(),
            &config.source_policy,
        );

        info!(
            source_address = %source_address,
            field_count = request.len(),
            "sms_received"
        );

        match validate(request, &source_address, config) {
            ValidationOutcome::Rejected(rejection) => {
                warn!(
                    source_address = %source_address,
                    reason = %rejection,
                    "sms_rejected"
                );
                ticket.reply(rejection.reply_message());
            }
            ValidationOutcome::Accepted(sms) => {
                let handlers = self
                    .inner
                    .handlers
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();

                info!(
                    source_address = %source_address,
                    has_sender = sms.get("sender").is_some(),
                    handler_count = handlers.len(),
                    "sms_accepted"
                );
                if handlers.is_empty() {
                    warn!("sms_no_handlers_registered");
                }

                for handler in handlers {
                    handler.on_sms(sms.clone(), ticket.clone());
                }
            }
        }
    }

    fn route(&self, path: &str, fallthrough: Vec<Arc<dyn RequestListener>>) -> SmsRoute {
        SmsRoute {
            path: path.to_string(),
            receiver: self.clone(),
            fallthrough,
        }
    }
}

/// Listener that claims one path and passes everything else on.
struct SmsRoute {
    path: String,
    receiver: SmsReceiver,
    fallthrough: Vec<Arc<dyn RequestListener>>,
}

impl RequestListener for SmsRoute {
    fn on_request(&self, exchange: &Exchange) {
        if exchange.path() == self.path {
            self.receiver.dispatch(exchange);
            return;
        }
        for listener in &self.fallthrough {
            listener.on_request(exchange);
        }
    }
}

/// Determine the address the allowlist is checked against.
pub fn resolve_source_address(
    peer: SocketAddr,
    headers: &HeaderMap,
    policy: &SourceAddressPolicy,
) -> String {
    let peer_address = peer.ip().to_canonical().to_string();

    match policy {
        SourceAddressPolicy::Peer => peer_address,
        SourceAddressPolicy::TrustedProxies(proxies) => {
            if !proxies.contains(&peer_address) {
                return peer_address;
            }
            headers
                .get(FORWARDED_FOR_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.rsplit(',').map(str::trim).find(|s| !s.is_empty()))
                .map(str::to_string)
                .unwrap_or(peer_address)
        }
    }
}
