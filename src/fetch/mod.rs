//! Page fetching capability
//!
//! One HTTP GET per call, optionally through an upstream proxy. The body is
//! returned raw and never interpreted here.

pub mod pipeline;

pub use pipeline::{PageFetcher, PageSink};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use crate::error::{Result, TrawlError};

/// User agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Fetch capability: one GET in, body or error out
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch `url`, optionally through `proxy`, and return the raw body
    async fn fetch(&self, url: &Url, proxy: Option<&str>) -> Result<String>;
}

/// HTTP fetcher backed by reqwest
///
/// Redirects are not followed: a 3xx response settles as
/// [`TrawlError::RedirectIgnored`]. Non-2xx responses settle as
/// [`TrawlError::StatusError`].
pub struct HttpFetcher {
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }

    // A client is built per call because the upstream proxy changes between jobs.
    fn build_client(&self, proxy: Option<&str>) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.config.user_agent)
            .timeout(self.config.request_timeout)
            .redirect(Policy::none());

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| TrawlError::InvalidProxy(format!("{}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(TrawlError::from)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url, proxy: Option<&str>) -> Result<String> {
        let client = self.build_client(proxy)?;

        debug!(%url, proxy = proxy.unwrap_or("direct"), "Fetching page");
        let response = client.get(url.clone()).send().await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            debug!("Ignoring redirect from {} to {}", url, location);
            return Err(TrawlError::RedirectIgnored(location));
        }

        if !status.is_success() {
            return Err(TrawlError::StatusError(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}
