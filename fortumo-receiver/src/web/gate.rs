//! Single-use reply tickets.
//!
//! Every HTTP exchange gets exactly one `ResponseTicket`. Clones of the ticket
//! share state, so no matter how many handlers hold a copy or how often
//! `reply` is called, only the first reply reaches the caller.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A reply written through a ticket.
#[derive(Debug)]
struct Reply {
    content_type: HeaderValue,
    body: String,
}

#[derive(Debug)]
struct TicketState {
    sender: Option<oneshot::Sender<Reply>>,
    content_type: HeaderValue,
}

/// Permission to write the one reply of an exchange.
#[derive(Debug, Clone)]
pub struct ResponseTicket {
    state: Arc<Mutex<TicketState>>,
}

/// The exchange side of a ticket; resolves once a reply is written.
#[derive(Debug)]
pub struct PendingResponse {
    receiver: oneshot::Receiver<Reply>,
    content_type: HeaderValue,
}

impl ResponseTicket {
    /// Open a ticket for one exchange. Replies default to `content_type`.
    pub fn open(content_type: HeaderValue) -> (ResponseTicket, PendingResponse) {
        let (sender, receiver) = oneshot::channel();
        let ticket = ResponseTicket {
            state: Arc::new(Mutex::new(TicketState {
                sender: Some(sender),
                content_type: content_type.clone(),
            })),
        };
        (
            ticket,
            PendingResponse {
                receiver,
                content_type,
            },
        )
    }

    /// Set the content type used by the eventual reply. Ignored once replied.
    pub fn set_content_type(&self, content_type: HeaderValue) {
        let mut state = self.lock();
        if state.sender.is_some() {
            state.content_type = content_type;
        }
    }

    /// Write `message` as the full response body and complete the exchange.
    ///
    /// Only the first call has an effect.
    pub fn reply(&self, message: impl Into<String>) {
        let (sender, content_type) = {
            let mut state = self.lock();
            match state.sender.take() {
                Some(sender) => (sender, state.content_type.clone()),
                None => {
                    debug!("sms_reply_ignored");
                    return;
                }
            }
        };

        let body = message.into();
        let body_length = body.len();
        if sender.send(Reply { content_type, body }).is_err() {
            warn!("sms_reply_client_gone");
            return;
        }
        debug!(body_length = body_length, "sms_reply_sent");
    }

    /// Whether a reply has already been written.
    pub fn is_responded(&self) -> bool {
        self.lock().sender.is_none()
    }

    fn lock(&self) -> MutexGuard<'_, TicketState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PendingResponse {
    /// Wait for the reply and turn it into an HTTP response.
    ///
    /// There is no timeout: while any ticket clone is alive the exchange stays
    /// open. If every clone is dropped without replying, an empty body is sent.
    pub async fn wait(self) -> Response {
        match self.receiver.await {
            Ok(reply) => plain_text(reply.content_type, reply.body),
            Err(_) => {
                warn!("exchange_closed_without_reply");
                plain_text(self.content_type, String::new())
            }
        }
    }
}

fn plain_text(content_type: HeaderValue, body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(body),
    )
        .into_response()
}
