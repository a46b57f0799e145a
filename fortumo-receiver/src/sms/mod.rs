//! Authentication of inbound SMS notifications.
//!
//! ```text
//! query string → InboundRequest → validate() → Accepted | Rejected(reason)
//! ```

pub mod allowlist;
pub mod request;
pub mod signature;
pub mod validator;

pub use allowlist::{is_allowed, Allowlist, DEFAULT_ALLOWED_ADDRESSES};
pub use request::{InboundRequest, SERVICE_ID_KEY, SIGNATURE_KEY};
pub use signature::{canonicalize, digest, verify};
pub use validator::{validate, Rejection, ValidationOutcome};
