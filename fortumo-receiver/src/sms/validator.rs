//! Request validation.
//!
//! Checks run cheapest first and stop at the first failure:
//! source address, service id, then the secret-bearing signature check.

use std::fmt;

use tracing::warn;

use super::request::InboundRequest;
use super::signature;
use crate::config::ReceiverConfig;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidSourceAddress,
    InvalidService,
    InvalidSignature,
}

impl Rejection {
    /// Reason text reported back to the caller.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::InvalidSourceAddress => "Invalid source IP",
            Rejection::InvalidService => "Invalid service",
            Rejection::InvalidSignature => "Invalid signature",
        }
    }

    /// Full reply body for a rejected request.
    pub fn reply_message(&self) -> String {
        format!("Error: {}", self.reason())
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Result of validating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted(InboundRequest),
    Rejected(Rejection),
}

/// Classify a request as accepted or rejected.
pub fn validate(
    request: InboundRequest,
    source_address: &str,
    config: &ReceiverConfig,
) -> ValidationOutcome {
    if !config.allowed_addresses.is_allowed(source_address) {
        warn!(source_address = %source_address, "sms_invalid_source_address");
        return ValidationOutcome::Rejected(Rejection::InvalidSourceAddress);
    }

    if request.service_id() != Some(config.service_id.as_str()) {
        warn!(
            source_address = %source_address,
            service_id = ?request.service_id(),
            "sms_invalid_service"
        );
        return ValidationOutcome::Rejected(Rejection::InvalidService);
    }

    if !signature::verify(&request, config.secret.expose()) {
        return ValidationOutcome::Rejected(Rejection::InvalidSignature);
    }

    ValidationOutcome::Accepted(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "81.20.151.38";

    fn config() -> ReceiverConfig {
        ReceiverConfig::new("S", "X")
    }

    fn signed(pairs: &[(&str, &str)], secret: &str) -> InboundRequest {
        let unsigned: InboundRequest = pairs.iter().copied().collect();
        let sig = signature::digest(&signature::canonicalize(&unsigned), secret);
        unsigned
            .iter()
            .chain(std::iter::once(("sig", sig.as_str())))
            .collect()
    }

    #[test]
    fn test_accepts_valid_request() {
        let sms = signed(&[("service_id", "S"), ("foo", "1"), ("bar", "2")], "X");
        assert_eq!(sms.signature(), Some("e3777b42e5037f2583f2cd54da6b632a"));

        let outcome = validate(sms.clone(), SOURCE, &config());
        assert_eq!(outcome, ValidationOutcome::Accepted(sms));
    }

    #[test]
    fn test_rejects_unknown_source() {
        let sms = signed(&[("service_id", "S"), ("foo", "1")], "X");
        assert_eq!(
            validate(sms, "10.0.0.1", &config()),
            ValidationOutcome::Rejected(Rejection::InvalidSourceAddress)
        );
    }

    #[test]
    fn test_rejects_wrong_or_missing_service() {
        let wrong = signed(&[("service_id", "T"), ("foo", "1")], "X");
        assert_eq!(
            validate(wrong, SOURCE, &config()),
            ValidationOutcome::Rejected(Rejection::InvalidService)
        );

        let missing = signed(&[("foo", "1")], "X");
        assert_eq!(
            validate(missing, SOURCE, &config()),
            ValidationOutcome::Rejected(Rejection::InvalidService)
        );
    }

    #[test]
    fn test_rejects_bad_signature() {
        let sms = signed(&[("service_id", "S"), ("foo", "1")], "wrong-secret");
        assert_eq!(
            validate(sms, SOURCE, &config()),
            ValidationOutcome::Rejected(Rejection::InvalidSignature)
        );
    }

    #[test]
    fn test_source_check_wins_over_other_failures() {
        let sms: InboundRequest = [("service_id", "other"), ("sig", "bogus")].into_iter().collect();
        assert_eq!(
            validate(sms, "127.0.0.1", &config()),
            ValidationOutcome::Rejected(Rejection::InvalidSourceAddress)
        );
    }

    #[test]
    fn test_service_check_wins_over_signature() {
        let sms: InboundRequest = [("service_id", "other"), ("sig", "bogus")].into_iter().collect();
        assert_eq!(
            validate(sms, SOURCE, &config()),
            ValidationOutcome::Rejected(Rejection::InvalidService)
        );
    }

    #[test]
    fn test_reply_messages() {
        assert_eq!(
            Rejection::InvalidSourceAddress.reply_message(),
            "Error: Invalid source IP"
        );
        assert_eq!(Rejection::InvalidService.reply_message(), "Error: Invalid service");
        assert_eq!(
            Rejection::InvalidSignature.reply_message(),
            "Error: Invalid signature"
        );
        assert_eq!(Rejection::InvalidSignature.to_string(), "Invalid signature");
    }
}
