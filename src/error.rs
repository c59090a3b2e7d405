use thiserror::Error;

/// Unified error type for the Trawl crate
#[derive(Error, Debug)]
pub enum TrawlError {
    // Throttle
    #[error("Access denied for {identity}")]
    AccessDenied { identity: String },

    // Proxy pool errors
    #[error("No proxies available")]
    NoProxiesAvailable,

    #[error("Proxy not found: {proxy}")]
    ProxyNotFound { proxy: String },

    #[error("Invalid proxy or already exists: {0}")]
    InvalidProxy(String),

    // Queue errors
    #[error("Queue is closed")]
    QueueClosed,

    #[error("Operation timed out")]
    Timeout,

    // Fetch errors
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request failed with status code {0}")]
    StatusError(u16),

    #[error("Redirect ignored: {0}")]
    RedirectIgnored(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // URL errors
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias for Trawl operations
pub type Result<T> = std::result::Result<T, TrawlError>;

impl TrawlError {
    /// Check if this is a caller mistake that surfaces synchronously from the
    /// called operation (as opposed to a job-level failure)
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            TrawlError::NoProxiesAvailable
                | TrawlError::ProxyNotFound { .. }
                | TrawlError::InvalidProxy(_)
                | TrawlError::QueueClosed
                | TrawlError::InvalidConfig(_)
                | TrawlError::InvalidUrl(_)
        )
    }

    /// Check if this error settles a fetch job rather than aborting the queue
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            TrawlError::AccessDenied { .. }
                | TrawlError::Timeout
                | TrawlError::NetworkError(_)
                | TrawlError::StatusError(_)
                | TrawlError::RedirectIgnored(_)
        )
    }
}

// Convert from reqwest errors
impl From<reqwest::Error> for TrawlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TrawlError::Timeout
        } else {
            TrawlError::NetworkError(err.to_string())
        }
    }
}
