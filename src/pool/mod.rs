//! Rotating pool of upstream proxies
//!
//! This module provides the proxy pool, including:
//! - Multiple selection strategies (random, round-robin, exclusion-based)
//! - Bulk loading from text, files, and remote lists
//! - Health checking with unhealthy-proxy pruning

pub mod health;
pub mod source;

pub use health::{HealthChecker, HealthCheckerConfig, HealthCheckerHandle};

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrawlError};

/// Strategy types for proxy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    Random,
    RoundRobin,
    ExcludingUsed,
}

impl SelectionStrategy {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "round_robin" | "roundrobin" | "round-robin" => Self::RoundRobin,
            "excluding_used" | "excludingused" | "excluding-used" | "exclusion" => {
                Self::ExcludingUsed
            }
            _ => Self::Random,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
            Self::ExcludingUsed => "excluding_used",
        }
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    /// Ordered proxy addresses
    proxies: Vec<String>,
    /// Addresses handed out since the last full exclusion cycle
    used: HashSet<String>,
    /// Round-robin position, always in [0, proxies.len()) when non-empty
    cursor: usize,
}

/// Pool of upstream proxy addresses with rotation strategies
///
/// One instance per fetching domain; all selection and mutation goes through
/// an internal lock, so concurrent jobs can share the pool freely.
pub struct ProxyPool {
    inner: Mutex<PoolInner>,
    /// Cool-down taken before every selection returns
    rotation_delay: Duration,
}

impl ProxyPool {
    pub fn new() -> Self {
        Self::with_rotation_delay(Duration::ZERO)
    }

    /// Create a pool that pauses for `delay` before every selection
    ///
    /// The pause suspends only the selecting caller; the pool itself stays
    /// available to others.
    pub fn with_rotation_delay(delay: Duration) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            rotation_delay: delay,
        }
    }

    /// Add a single proxy address
    pub fn add(&self, proxy: &str) -> Result<()> {
        let proxy = proxy.trim();
        if proxy.is_empty() {
            return Err(TrawlError::InvalidProxy("empty address".to_string()));
        }

        let mut inner = self.inner.lock();
        if inner.proxies.iter().any(|p| p == proxy) {
            return Err(TrawlError::InvalidProxy(proxy.to_string()));
        }

        inner.proxies.push(proxy.to_string());
        debug!("Added proxy {} (pool size {})", proxy, inner.proxies.len());
        Ok(())
    }

    /// Remove a proxy address
    pub fn remove(&self, proxy: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = inner
            .proxies
            .iter()
            .position(|p| p == proxy)
            .ok_or_else(|| TrawlError::ProxyNotFound {
                proxy: proxy.to_string(),
            })?;

        inner.proxies.remove(idx);
        inner.used.remove(proxy);

        // Keep the cursor pointing at the proxy that would have come next
        if idx < inner.cursor {
            inner.cursor -= 1;
        }
        if inner.proxies.is_empty() {
            inner.cursor = 0;
        } else {
            inner.cursor %= inner.proxies.len();
        }

        debug!("Removed proxy {} (pool size {})", proxy, inner.proxies.len());
        Ok(())
    }

    /// Select a proxy using the given strategy
    pub async fn select(&self, strategy: SelectionStrategy) -> Result<String> {
        match strategy {
            SelectionStrategy::Random => self.select_random().await,
            SelectionStrategy::RoundRobin => self.select_round_robin().await,
            SelectionStrategy::ExcludingUsed => self.select_excluding_used().await,
        }
    }

    /// Select proxies in insertion order, cycling indefinitely
    pub async fn select_round_robin(&self) -> Result<String> {
        self.cool_down().await;

        let mut inner = self.inner.lock();
        if inner.proxies.is_empty() {
            return Err(TrawlError::NoProxiesAvailable);
        }

        let proxy = inner.proxies[inner.cursor].clone();
        inner.cursor = (inner.cursor + 1) % inner.proxies.len();
        Ok(proxy)
    }

    /// Select a uniformly random proxy
    pub async fn select_random(&self) -> Result<String> {
        self.cool_down().await;

        let inner = self.inner.lock();
        inner
            .proxies
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(TrawlError::NoProxiesAvailable)
    }

    /// Select a random proxy not yet handed out this cycle
    ///
    /// Once every proxy has been handed out, the cycle restarts: every proxy
    /// is revisited once per full cycle, in no particular order within it.
    pub async fn select_excluding_used(&self) -> Result<String> {
        self.cool_down().await;

        let mut inner = self.inner.lock();
        if inner.proxies.is_empty() {
            return Err(TrawlError::NoProxiesAvailable);
        }

        if inner.used.len() == inner.proxies.len() {
            inner.used.clear();
        }

        let PoolInner { proxies, used, .. } = &mut *inner;
        let available: Vec<String> = proxies
            .iter()
            .filter(|p| !used.contains(p.as_str()))
            .cloned()
            .collect();

        let selected = available
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(TrawlError::NoProxiesAvailable)?;

        used.insert(selected.clone());
        Ok(selected)
    }

    /// Number of pooled proxies
    pub fn len(&self) -> usize {
        self.inner.lock().proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().proxies.is_empty()
    }

    /// Ordered copy of the pooled addresses
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().proxies.clone()
    }

    async fn cool_down(&self) {
        if !self.rotation_delay.is_zero() {
            tokio::time::sleep(self.rotation_delay).await;
        }
    }
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new()
    }
}
