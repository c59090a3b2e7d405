//! Health checking for pooled proxies
//!
//! Probes proxies through the fetch capability and prunes the ones that fail,
//! either on demand or periodically.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::{interval, timeout};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::ProxyPool;
use crate::fetch::Fetch;

/// Health checker configuration
#[derive(Debug, Clone)]
pub struct HealthCheckerConfig {
    /// URL to probe through each candidate proxy
    pub probe_url: String,
    /// Timeout for each probe; an elapsed probe counts as unhealthy
    pub probe_timeout: Duration,
    /// How many probes run at once during a prune
    pub workers: usize,
    /// Interval between periodic prunes (run loop only)
    pub check_interval: Duration,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            probe_url: "http://www.google.com".to_string(),
            probe_timeout: Duration::from_secs(5),
            workers: 4,
            check_interval: Duration::from_secs(30),
        }
    }
}

/// Health checker for pooled proxies
pub struct HealthChecker {
    fetcher: Arc<dyn Fetch>,
    config: HealthCheckerConfig,
}

impl HealthChecker {
    pub fn new(fetcher: Arc<dyn Fetch>, config: HealthCheckerConfig) -> Self {
        Self { fetcher, config }
    }

    /// Probe a single proxy
    ///
    /// Timeouts and fetch failures both count as unhealthy; this never errors.
    #[instrument(skip(self), fields(proxy = %proxy))]
    pub async fn check(&self, proxy: &str) -> bool {
        let url = match Url::parse(&self.config.probe_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid health check URL {}: {}", self.config.probe_url, e);
                return false;
            }
        };

        match timeout(self.config.probe_timeout, self.fetcher.fetch(&url, Some(proxy))).await {
            Ok(Ok(_)) => {
                debug!("Proxy {} is healthy", proxy);
                true
            }
            Ok(Err(e)) => {
                warn!("Proxy {} is unhealthy: {}", proxy, e);
                false
            }
            Err(_) => {
                warn!("Proxy {} health probe timed out", proxy);
                false
            }
        }
    }

    /// Probe every pooled proxy and drop the ones that fail
    ///
    /// Survivors keep their relative order. Pruning is not atomic with respect
    /// to concurrent selection: callers may briefly observe a shrinking pool.
    /// Returns the number of proxies removed.
    pub async fn prune(&self, pool: &ProxyPool) -> usize {
        let candidates = pool.snapshot();
        info!("Checking health of {} proxies", candidates.len());

        let results: Vec<(String, bool)> = futures::stream::iter(candidates)
            .map(|proxy| async move {
                let healthy = self.check(&proxy).await;
                (proxy, healthy)
            })
            .buffered(self.config.workers.max(1))
            .collect()
            .await;

        let mut removed = 0;
        for (proxy, healthy) in results {
            if !healthy {
                // The proxy may have been removed while we probed; that's fine
                if pool.remove(&proxy).is_ok() {
                    removed += 1;
                }
            }
        }

        info!(
            "Health check complete: {} removed, {} remaining",
            removed,
            pool.len()
        );
        removed
    }

    /// Run periodic pruning (call in a spawned task)
    #[instrument(skip(self, pool, shutdown))]
    pub async fn run(&self, pool: Arc<ProxyPool>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting health checker with {}s interval",
            self.config.check_interval.as_secs()
        );

        let mut check_interval = interval(self.config.check_interval);
        check_interval.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = check_interval.tick() => {
                    self.prune(&pool).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Guard for managing health checker lifecycle
pub struct HealthCheckerHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl HealthCheckerHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for HealthCheckerHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TrawlError};
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Fails probes through proxies in `bad`, hangs on proxies in `slow`
    struct FakeProbeTarget {
        bad: HashSet<String>,
        slow: HashSet<String>,
    }

    impl FakeProbeTarget {
        fn new(bad: &[&str], slow: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                bad: bad.iter().map(|s| s.to_string()).collect(),
                slow: slow.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl Fetch for FakeProbeTarget {
        async fn fetch(&self, _url: &Url, proxy: Option<&str>) -> Result<String> {
            let proxy = proxy.unwrap_or_default();
            if self.slow.contains(proxy) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.bad.contains(proxy) {
                return Err(TrawlError::StatusError(502));
            }
            Ok("ok".to_string())
        }
    }

    fn config() -> HealthCheckerConfig {
        HealthCheckerConfig {
            probe_url: "http://probe.example".to_string(),
            probe_timeout: Duration::from_millis(50),
            workers: 2,
            check_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_check_healthy_and_unhealthy() {
        let checker = HealthChecker::new(FakeProbeTarget::new(&["bad1"], &[]), config());

        assert!(checker.check("good1").await);
        assert!(!checker.check("bad1").await);
    }

    #[tokio::test]
    async fn test_check_treats_timeout_as_unhealthy() {
        let checker = HealthChecker::new(FakeProbeTarget::new(&[], &["slow1"]), config());
        assert!(!checker.check("slow1").await);
    }

    #[tokio::test]
    async fn test_prune_keeps_survivors_in_order() {
        let pool = ProxyPool::new();
        for proxy in ["proxy1", "bad1", "proxy2", "slow1", "proxy3"] {
            pool.add(proxy).unwrap();
        }

        let checker = HealthChecker::new(FakeProbeTarget::new(&["bad1"], &["slow1"]), config());
        let removed = checker.prune(&pool).await;

        assert_eq!(removed, 2);
        assert_eq!(pool.snapshot(), vec!["proxy1", "proxy2", "proxy3"]);
    }

    #[tokio::test]
    async fn test_run_prunes_periodically_and_shuts_down() {
        let pool = Arc::new(ProxyPool::new());
        pool.add("proxy1").unwrap();
        pool.add("bad1").unwrap();

        let checker = HealthChecker::new(FakeProbeTarget::new(&["bad1"], &[]), config());
        let (handle, shutdown) = HealthCheckerHandle::new();

        let pool_for_task = pool.clone();
        let task = tokio::spawn(async move { checker.run(pool_for_task, shutdown).await });

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(pool.snapshot(), vec!["proxy1"]);

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("health checker did not shut down")
            .unwrap();
    }
}
