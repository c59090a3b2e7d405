//! Request identity resolution
//!
//! Derives a throttling identity from a forwarded-for header or the remote
//! socket address, falling back to a fixed default when neither is present.

use std::net::SocketAddr;

/// Identity used when the request context carries no usable source
pub const FALLBACK_IDENTITY: &str = "127.0.0.1";

/// Per-request context supplied by the caller
///
/// Resolution never fails: an absent or unusable context degrades to
/// [`FALLBACK_IDENTITY`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw value of a forwarded-for header, if present
    pub forwarded_for: Option<String>,
    /// Remote socket address, if known
    pub remote_addr: Option<SocketAddr>,
}

impl RequestContext {
    pub fn from_remote_addr(addr: SocketAddr) -> Self {
        Self {
            forwarded_for: None,
            remote_addr: Some(addr),
        }
    }

    pub fn from_forwarded_for(header: impl Into<String>) -> Self {
        Self {
            forwarded_for: Some(header.into()),
            remote_addr: None,
        }
    }

    /// Resolve the throttling identity for this context
    ///
    /// A forwarded-for header wins over the socket address; only its first
    /// (client-most) entry is used.
    pub fn resolve_identity(&self) -> String {
        if let Some(forwarded) = &self.forwarded_for {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }

        match self.remote_addr {
            Some(addr) => addr.ip().to_string(),
            None => FALLBACK_IDENTITY.to_string(),
        }
    }
}
