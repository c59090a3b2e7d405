//! Fetch job pipeline
//!
//! Wires one fetch job end to end: throttle admission, proxy selection,
//! the GET itself, and hand-off of the raw body to the page sink.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use url::Url;

use super::Fetch;
use crate::error::{Result, TrawlError};
use crate::guard::{AccessGuard, RequestContext};
use crate::pool::{ProxyPool, SelectionStrategy};
use crate::queue::JobRunner;

/// Receives fetched page bodies; parsing lives behind this seam
#[async_trait]
pub trait PageSink: Send + Sync {
    async fn page_loaded(&self, url: &Url, body: String);
}

/// The per-job fetch body given to the task queue
///
/// Each job asks the guard for admission, draws a proxy, performs the GET and
/// hands the body to the sink. A denied or failed job settles on its own and
/// never affects sibling jobs.
pub struct PageFetcher {
    guard: Arc<AccessGuard>,
    pool: Arc<ProxyPool>,
    fetcher: Arc<dyn Fetch>,
    sink: Arc<dyn PageSink>,
    strategy: SelectionStrategy,
    /// Identity context for this fetching domain
    context: RequestContext,
}

impl PageFetcher {
    pub fn new(
        guard: Arc<AccessGuard>,
        pool: Arc<ProxyPool>,
        fetcher: Arc<dyn Fetch>,
        sink: Arc<dyn PageSink>,
        strategy: SelectionStrategy,
        context: RequestContext,
    ) -> Self {
        Self {
            guard,
            pool,
            fetcher,
            sink,
            strategy,
            context,
        }
    }
}

#[async_trait]
impl JobRunner<Url> for PageFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn run(&self, url: Url) -> Result<()> {
        if !self.guard.admit(&self.context) {
            let identity = self.context.resolve_identity();
            warn!("Fetch denied by throttle for {}", identity);
            return Err(TrawlError::AccessDenied { identity });
        }

        // An empty pool is not fatal: fetch directly, as when no proxies
        // have been loaded yet.
        let proxy = match self.pool.select(self.strategy).await {
            Ok(proxy) => Some(proxy),
            Err(TrawlError::NoProxiesAvailable) => None,
            Err(e) => return Err(e),
        };

        let body = self.fetcher.fetch(&url, proxy.as_deref()).await?;
        debug!(bytes = body.len(), "Page fetched");

        self.sink.page_loaded(&url, body).await;
        Ok(())
    }
}
