//! Fortumo - authenticating receiver for SMS payment notifications.
//!
//! This library provides the pieces shared by the two binaries:
//! - `fortumo-receiver`: standalone receiver on its own port
//! - `fortumo-demo`: receiver injected into an existing server
//!
//! ## Architecture
//!
//! ```text
//! Provider → /_incoming_sms → allowlist → service id → signature → handler → reply
//! ```
//!
//! Every accepted notification is handed to the registered handlers together
//! with a `ResponseTicket`; the first reply written through it is sent back to
//! the provider, which forwards it to the SMS sender.

pub mod config;
pub mod remote;
pub mod sms;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError, ReceiverConfig, SourceAddressPolicy};
pub use remote::{fetch_config, ConfigFetchError, RemoteConfigDocument};
pub use sms::{InboundRequest, Rejection, ValidationOutcome};
pub use web::{
    Attachment, Exchange, HttpServer, ListenTarget, ReceiverError, ResponseTicket, SmsReceiver,
    INCOMING_SMS_PATH,
};
