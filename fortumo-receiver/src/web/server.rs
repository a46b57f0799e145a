//! Host HTTP server with an ordered list of request listeners.
//!
//! Each request becomes an `Exchange` that is handed to every registered
//! listener in registration order. Listeners answer through the exchange's
//! `ResponseTicket`; the first reply wins. Serving runs on axum, one task per
//! request.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method, Uri},
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::gate::{PendingResponse, ResponseTicket};

/// Something that reacts to every request the server receives.
pub trait RequestListener: Send + Sync + 'static {
    fn on_request(&self, exchange: &Exchange);
}

impl<F> RequestListener for F
where
    F: Fn(&Exchange) + Send + Sync + 'static,
{
    fn on_request(&self, exchange: &Exchange) {
        self(exchange)
    }
}

/// One HTTP request and the ticket for its reply.
///
/// Cheap to clone; listeners may move a clone into a task and reply later.
#[derive(Clone)]
pub struct Exchange {
    inner: Arc<ExchangeInner>,
}

struct ExchangeInner {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: SocketAddr,
    response: ResponseTicket,
}

impl Exchange {
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        remote_addr: SocketAddr,
        response: ResponseTicket,
    ) -> Self {
        Self {
            inner: Arc::new(ExchangeInner {
                method,
                uri,
                headers,
                remote_addr,
                response,
            }),
        }
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    /// Raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.inner.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    pub fn response(&self) -> &ResponseTicket {
        &self.inner.response
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .field("remote_addr", &self.inner.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Shared handle to a listener-based HTTP server.
#[derive(Clone)]
pub struct HttpServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    listeners: RwLock<Vec<Arc<dyn RequestListener>>>,
    content_type: HeaderValue,
}

impl Default for HttpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpServer {
    /// Create a server with no listeners. Replies default to UTF-8 plain text.
    pub fn new() -> Self {
        Self::with_content_type(HeaderValue::from_static("text/plain; charset=utf-8"))
    }

    /// Create a server whose replies default to `content_type`.
    pub fn with_content_type(content_type: HeaderValue) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                listeners: RwLock::new(Vec::new()),
                content_type,
            }),
        }
    }

    /// Register a listener after the existing ones.
    pub fn add_listener(&self, listener: impl RequestListener) {
        self.add_shared_listener(Arc::new(listener));
    }

    pub fn add_shared_listener(&self, listener: Arc<dyn RequestListener>) {
        self.write_listeners().push(listener);
    }

    /// Snapshot of the registered listeners, in order.
    pub fn listeners(&self) -> Vec<Arc<dyn RequestListener>> {
        self.read_listeners().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.read_listeners().len()
    }

    /// Replace the listener list in one step.
    ///
    /// `splice` receives the current listeners and returns the new list. The
    /// write lock is held for the whole swap, so no request observes a
    /// partially replaced list. Meant for setup, before traffic is served.
    pub fn replace_listeners<F>(&self, splice: F)
    where
        F: FnOnce(Vec<Arc<dyn RequestListener>>) -> Vec<Arc<dyn RequestListener>>,
    {
        let mut listeners = self.write_listeners();
        let current = std::mem::take(&mut *listeners);
        *listeners = splice(current);
    }

    /// Hand one request to every listener and return its pending reply.
    pub fn dispatch(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        remote_addr: SocketAddr,
    ) -> PendingResponse {
        let (ticket, pending) = ResponseTicket::open(self.inner.content_type.clone());
        let exchange = Exchange::new(method, uri, headers, remote_addr, ticket);

        let listeners = self.listeners();
        debug!(
            path = %exchange.path(),
            listener_count = listeners.len(),
            "http_request_dispatch"
        );
        for listener in &listeners {
            listener.on_request(&exchange);
        }

        pending
    }

    /// Axum router that feeds every request through the listener list.
    ///
    /// Requires `ConnectInfo<SocketAddr>`; see [`HttpServer::serve`].
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(handle_request)
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Serve until the listener fails.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve until `signal` completes, then drain in-flight requests.
    pub async fn serve_with_shutdown<S>(self, listener: TcpListener, signal: S) -> io::Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "http_server_listening");
        }

        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
    }

    fn read_listeners(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn RequestListener>>> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_listeners(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn RequestListener>>> {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn handle_request(
    State(server): State<HttpServer>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, _body) = request.into_parts();
    server
        .dispatch(parts.method, parts.uri, parts.headers, remote_addr)
        .wait()
        .await
}
