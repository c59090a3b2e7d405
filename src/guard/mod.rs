//! Per-identity request throttling with escalating blocks
//!
//! Each identity gets a fixed request budget per time window. Exceeding the
//! budget blocks the identity for a duration that grows geometrically with
//! every repeat offense and never decays.

pub mod identity;
pub mod sweep;

pub use identity::{RequestContext, FALLBACK_IDENTITY};
pub use sweep::{RecordSweeper, RecordSweeperConfig, RecordSweeperHandle};

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

/// Wall-clock time source, injectable for tests
pub trait Clock: Send + Sync {
    /// Current time as seconds since the Unix epoch
    fn now_secs(&self) -> u64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Access guard configuration
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Requests an identity may make per window
    pub max_requests_per_window: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Base block duration in seconds
    pub base_block_secs: u64,
    /// Multiplier applied per consecutive block
    pub penalty_factor: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 4,
            window_secs: 3600,
            base_block_secs: 3600,
            penalty_factor: 2,
        }
    }
}

/// Per-identity throttle state
#[derive(Debug, Clone)]
struct ClientRecord {
    /// Requests seen in the current window
    count: u32,
    /// When counting for the current window began
    window_start: u64,
    /// When the identity becomes eligible again (0 = not blocked)
    blocked_until: u64,
    /// Consecutive blocks so far; drives the block duration and never decays
    block_level: u32,
}

/// Admission guard, one instance per throttling domain
///
/// Decides admit/deny per identity and owns no I/O. Concurrent calls for the
/// same identity serialize on its record; different identities do not contend.
pub struct AccessGuard {
    config: GuardConfig,
    records: DashMap<String, ClientRecord>,
    clock: Arc<dyn Clock>,
}

impl AccessGuard {
    /// Create a guard backed by the system clock
    pub fn new(config: GuardConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a guard with an explicit time source
    pub fn with_clock(config: GuardConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            records: DashMap::new(),
            clock,
        }
    }

    /// Decide whether a request from this context is admitted
    ///
    /// Both "budget exhausted" and "still blocked" come back as `false`; use
    /// [`remaining_block`](Self::remaining_block) to tell them apart.
    pub fn admit(&self, ctx: &RequestContext) -> bool {
        self.admit_identity(&ctx.resolve_identity())
    }

    /// Decide whether a request from this identity is admitted
    pub fn admit_identity(&self, identity: &str) -> bool {
        let now = self.clock.now_secs();

        match self.records.entry(identity.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(ClientRecord {
                    count: 1,
                    window_start: now,
                    blocked_until: 0,
                    block_level: 0,
                });
                debug!("First request from {}", identity);
                true
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();

                if record.blocked_until != 0 {
                    if now < record.blocked_until {
                        debug!(
                            "Identity {} blocked for {}s more",
                            identity,
                            record.blocked_until - now
                        );
                        return false;
                    }
                    // Block expired: clear it and start a fresh window.
                    // block_level is kept, so the next block is at least as long.
                    record.blocked_until = 0;
                    record.count = 1;
                    record.window_start = now;
                    debug!("Block expired for {}", identity);
                    return true;
                }

                if now.saturating_sub(record.window_start) > self.config.window_secs {
                    record.count = 0;
                    record.window_start = now;
                }

                if record.count >= self.config.max_requests_per_window {
                    record.block_level += 1;
                    let block_secs = self.block_duration_secs(record.block_level);
                    record.blocked_until = now.saturating_add(block_secs);
                    warn!(
                        "Request limit exceeded for {}: blocking for {}s (level {})",
                        identity, block_secs, record.block_level
                    );
                    return false;
                }

                record.count += 1;
                true
            }
        }
    }

    /// How long this identity remains blocked, if it is
    pub fn remaining_block(&self, identity: &str) -> Option<Duration> {
        let record = self.records.get(identity)?;
        let now = self.clock.now_secs();
        if record.blocked_until > now {
            Some(Duration::from_secs(record.blocked_until - now))
        } else {
            None
        }
    }

    /// Number of tracked identities
    pub fn client_count(&self) -> usize {
        self.records.len()
    }

    /// Number of identities currently blocked
    pub fn blocked_count(&self) -> usize {
        let now = self.clock.now_secs();
        self.records
            .iter()
            .filter(|r| r.blocked_until > now)
            .count()
    }

    /// Drop records whose window and block have both expired
    ///
    /// Returns the number of records removed. Call periodically (see
    /// [`RecordSweeper`]) to bound memory for long-running guards.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_secs();
        let before = self.records.len();

        self.records.retain(|_, record| {
            let block_active = record.blocked_until > now;
            let window_active =
                now.saturating_sub(record.window_start) <= self.config.window_secs;
            block_active || window_active
        });

        before.saturating_sub(self.records.len())
    }

    fn block_duration_secs(&self, block_level: u32) -> u64 {
        let factor = (self.config.penalty_factor as u64).saturating_pow(block_level);
        self.config.base_block_secs.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn new(start: u64) -> Self {
            Self(AtomicU64::new(start))
        }

        fn advance(&self, secs: u64) {
            self.0.fetch_add(secs, Ordering::Relaxed);
        }
    }

    impl Clock for ManualClock {
        fn now_secs(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn guard_with_clock(max_requests: u32) -> (AccessGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = GuardConfig {
            max_requests_per_window: max_requests,
            window_secs: 3600,
            base_block_secs: 3600,
            penalty_factor: 2,
        };
        (AccessGuard::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn test_admits_up_to_limit_then_denies() {
        let (guard, _clock) = guard_with_clock(2);

        assert!(guard.admit_identity("10.0.0.1"));
        assert!(guard.admit_identity("10.0.0.1"));
        assert!(!guard.admit_identity("10.0.0.1"));
    }

    #[test]
    fn test_identities_are_independent() {
        let (guard, _clock) = guard_with_clock(1);

        assert!(guard.admit_identity("10.0.0.1"));
        assert!(guard.admit_identity("10.0.0.2"));
        assert!(guard.admit_identity("10.0.0.3"));
        assert!(!guard.admit_identity("10.0.0.1"));
    }

    #[test]
    fn test_denies_consistently_until_block_expires() {
        let (guard, clock) = guard_with_clock(1);

        assert!(guard.admit_identity("10.0.0.1"));
        // Triggers the first block: 3600 * 2^1 = 7200s
        assert!(!guard.admit_identity("10.0.0.1"));
        assert_eq!(
            guard.remaining_block("10.0.0.1"),
            Some(Duration::from_secs(7200))
        );

        clock.advance(7199);
        assert!(!guard.admit_identity("10.0.0.1"));

        // First call at the unblock time admits and resets the window
        clock.advance(1);
        assert!(guard.admit_identity("10.0.0.1"));
        assert_eq!(guard.remaining_block("10.0.0.1"), None);
        assert!(!guard.admit_identity("10.0.0.1"));
    }

    #[test]
    fn test_block_duration_escalates_across_blocks() {
        let (guard, clock) = guard_with_clock(1);

        assert!(guard.admit_identity("10.0.0.1"));
        assert!(!guard.admit_identity("10.0.0.1"));
        assert_eq!(
            guard.remaining_block("10.0.0.1"),
            Some(Duration::from_secs(7200))
        );

        // Sit out the block, re-offend: the second block doubles
        clock.advance(7200);
        assert!(guard.admit_identity("10.0.0.1"));
        assert!(!guard.admit_identity("10.0.0.1"));
        assert_eq!(
            guard.remaining_block("10.0.0.1"),
            Some(Duration::from_secs(14400))
        );
    }

    #[test]
    fn test_window_expiry_resets_count() {
        let (guard, clock) = guard_with_clock(2);

        assert!(guard.admit_identity("10.0.0.1"));
        assert!(guard.admit_identity("10.0.0.1"));

        clock.advance(3601);
        assert!(guard.admit_identity("10.0.0.1"));
        assert!(guard.admit_identity("10.0.0.1"));
        assert!(!guard.admit_identity("10.0.0.1"));
    }

    #[test]
    fn test_admit_resolves_context_with_fallback() {
        let (guard, _clock) = guard_with_clock(1);

        assert!(guard.admit(&RequestContext::default()));
        // Same fallback identity, so the budget is shared
        assert!(!guard.admit(&RequestContext::default()));
        assert_eq!(guard.client_count(), 1);
    }

    #[test]
    fn test_blocked_count() {
        let (guard, _clock) = guard_with_clock(1);

        guard.admit_identity("10.0.0.1");
        guard.admit_identity("10.0.0.1");
        guard.admit_identity("10.0.0.2");

        assert_eq!(guard.client_count(), 2);
        assert_eq!(guard.blocked_count(), 1);
    }

    #[test]
    fn test_sweep_removes_only_fully_expired_records() {
        let (guard, clock) = guard_with_clock(1);

        // 10.0.0.1 ends up blocked for 7200s, 10.0.0.2 just has a window
        guard.admit_identity("10.0.0.1");
        guard.admit_identity("10.0.0.1");
        guard.admit_identity("10.0.0.2");
        assert_eq!(guard.client_count(), 2);

        // Past both windows but within 10.0.0.1's block
        clock.advance(3700);
        assert_eq!(guard.sweep(), 1);
        assert_eq!(guard.client_count(), 1);
        assert!(guard.remaining_block("10.0.0.1").is_some());

        // Past the block as well
        clock.advance(7200);
        assert_eq!(guard.sweep(), 1);
        assert_eq!(guard.client_count(), 0);
    }

    #[test]
    fn test_concurrent_admits_never_exceed_limit() {
        let (guard, _clock) = guard_with_clock(50);
        let guard = Arc::new(guard);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| guard.admit_identity("10.0.0.1"))
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
