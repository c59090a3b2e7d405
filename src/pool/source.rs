//! Bulk proxy loading
//!
//! Loaders append to the pool without deduplicating against existing entries;
//! only [`ProxyPool::add`](super::ProxyPool::add) enforces uniqueness.

use std::path::Path;

use tracing::{debug, info};
use url::Url;

use super::ProxyPool;
use crate::error::{Result, TrawlError};
use crate::fetch::Fetch;

impl ProxyPool {
    /// Append proxies from newline-delimited text, skipping blank lines
    ///
    /// Returns the number of entries appended.
    pub fn extend_from_text(&self, text: &str) -> usize {
        let mut inner = self.inner.lock();
        let mut added = 0;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            inner.proxies.push(line.to_string());
            added += 1;
        }

        debug!("Loaded {} proxies from text (pool size {})", added, inner.proxies.len());
        added
    }

    /// Append proxies from a newline-delimited file
    pub async fn load_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let data = tokio::fs::read_to_string(path.as_ref()).await?;
        let added = self.extend_from_text(&data);
        info!("Loaded {} proxies from {}", added, path.as_ref().display());
        Ok(added)
    }

    /// Append proxies from a remote source returning a JSON array of strings
    pub async fn load_from_url(&self, fetcher: &dyn Fetch, url: &Url) -> Result<usize> {
        let body = fetcher.fetch(url, None).await?;
        let proxies: Vec<String> = serde_json::from_str(&body)
            .map_err(|e| TrawlError::InvalidProxy(format!("malformed proxy list: {}", e)))?;

        let mut added = 0;
        {
            let mut inner = self.inner.lock();
            for proxy in proxies {
                let proxy = proxy.trim();
                if proxy.is_empty() {
                    continue;
                }
                inner.proxies.push(proxy.to_string());
                added += 1;
            }
        }

        info!("Loaded {} proxies from {}", added, url);
        Ok(added)
    }
}
