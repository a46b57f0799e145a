//! Web layer for receiving provider notifications.
//!
//! This module provides:
//! - A listener-based host server (`HttpServer`) running on axum
//! - Single-use reply tickets (`ResponseTicket`)
//! - The SMS receiver, which claims one path on a new or existing server

pub mod gate;
pub mod receiver;
pub mod server;

pub use gate::{PendingResponse, ResponseTicket};
pub use receiver::{
    resolve_source_address, Attachment, ListenTarget, ReceiverError, ServerHandle, SmsHandler,
    SmsReceiver, FORWARDED_FOR_HEADER, INCOMING_SMS_PATH,
};
pub use server::{Exchange, HttpServer, RequestListener};
