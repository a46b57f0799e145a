//! Source address allowlist.
//!
//! A coarse origin check: the address string must equal one of the configured
//! entries exactly. No normalization, CIDR matching or DNS lookups.

use std::collections::HashSet;

/// Addresses the provider publishes for its notification infrastructure.
/// These are subject to change.
pub const DEFAULT_ALLOWED_ADDRESSES: [&str; 3] = ["81.20.151.38", "81.20.148.122", "209.20.83.207"];

/// Set of permitted source addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowlist {
    addresses: HashSet<String>,
}

impl Allowlist {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, source_address: &str) -> bool {
        is_allowed(source_address, &self.addresses)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_ADDRESSES)
    }
}

/// Exact membership test.
pub fn is_allowed(source_address: &str, allowlist: &HashSet<String>) -> bool {
    allowlist.contains(source_address)
}
