use std::env;
use std::time::Duration;

use crate::error::{Result, TrawlError};
use crate::fetch::FetchConfig;
use crate::guard::{GuardConfig, RecordSweeperConfig};
use crate::pool::{HealthCheckerConfig, SelectionStrategy};
use crate::queue::QueueConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Throttle configuration
    pub guard: GuardConfig,
    /// Throttle record eviction configuration
    pub sweeper: RecordSweeperConfig,
    /// Task queue configuration
    pub queue: QueueConfig,
    /// Proxy pool configuration
    pub pool: PoolConfig,
    /// Proxy health check configuration
    pub health: HealthCheckerConfig,
    /// Fetcher configuration
    pub fetch: FetchConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Selection strategy (random, round_robin, excluding_used)
    pub strategy: SelectionStrategy,
    /// Cool-down before each selection returns
    pub rotation_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            guard: GuardConfig {
                max_requests_per_window: get_env_or("THROTTLE_MAX_REQUESTS", "4")
                    .parse()
                    .map_err(|_| {
                        TrawlError::InvalidConfig(
                            "THROTTLE_MAX_REQUESTS must be a valid number".into(),
                        )
                    })?,
                window_secs: get_env_or("THROTTLE_WINDOW_SECS", "3600")
                    .parse()
                    .unwrap_or(3600),
                base_block_secs: get_env_or("THROTTLE_BASE_BLOCK_SECS", "3600")
                    .parse()
                    .unwrap_or(3600),
                penalty_factor: get_env_or("THROTTLE_PENALTY_FACTOR", "2")
                    .parse()
                    .unwrap_or(2),
            },
            sweeper: RecordSweeperConfig {
                sweep_interval: secs_env_or("THROTTLE_SWEEP_INTERVAL_SECS", 600),
            },
            queue: QueueConfig {
                concurrency: get_env_or("QUEUE_CONCURRENCY", "2").parse().map_err(|_| {
                    TrawlError::InvalidConfig("QUEUE_CONCURRENCY must be a valid number".into())
                })?,
                wait: millis_env_or("QUEUE_WAIT_MS", 5000),
                timeout: millis_env_or("QUEUE_TIMEOUT_MS", 10_000),
            },
            pool: PoolConfig {
                strategy: SelectionStrategy::from_str(&get_env_or("POOL_STRATEGY", "random")),
                rotation_delay: millis_env_or("POOL_ROTATION_DELAY_MS", 0),
            },
            health: HealthCheckerConfig {
                probe_url: get_env_or("HEALTHCHECK_URL", "http://www.google.com"),
                probe_timeout: secs_env_or("HEALTHCHECK_TIMEOUT_SECS", 5),
                workers: get_env_or("HEALTHCHECK_WORKERS", "4").parse().unwrap_or(4),
                check_interval: secs_env_or("HEALTHCHECK_INTERVAL_SECS", 30),
            },
            fetch: FetchConfig {
                request_timeout: secs_env_or("FETCH_TIMEOUT_SECS", 30),
                user_agent: get_env_or("FETCH_USER_AGENT", crate::fetch::DEFAULT_USER_AGENT),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn secs_env_or(key: &str, default: u64) -> Duration {
    Duration::from_secs(get_env_or(key, &default.to_string()).parse().unwrap_or(default))
}

fn millis_env_or(key: &str, default: u64) -> Duration {
    Duration::from_millis(get_env_or(key, &default.to_string()).parse().unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "THROTTLE_MAX_REQUESTS",
        "THROTTLE_WINDOW_SECS",
        "THROTTLE_BASE_BLOCK_SECS",
        "THROTTLE_PENALTY_FACTOR",
        "THROTTLE_SWEEP_INTERVAL_SECS",
        "QUEUE_CONCURRENCY",
        "QUEUE_WAIT_MS",
        "QUEUE_TIMEOUT_MS",
        "POOL_STRATEGY",
        "POOL_ROTATION_DELAY_MS",
        "HEALTHCHECK_URL",
        "HEALTHCHECK_TIMEOUT_SECS",
        "HEALTHCHECK_WORKERS",
        "HEALTHCHECK_INTERVAL_SECS",
        "FETCH_TIMEOUT_SECS",
        "FETCH_USER_AGENT",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.guard.max_requests_per_window, 4);
        assert_eq!(config.guard.window_secs, 3600);
        assert_eq!(config.guard.penalty_factor, 2);

        assert_eq!(config.queue.concurrency, 2);
        assert_eq!(config.queue.wait, Duration::from_secs(5));
        assert_eq!(config.queue.timeout, Duration::from_secs(10));

        assert_eq!(config.pool.strategy, SelectionStrategy::Random);
        assert_eq!(config.pool.rotation_delay, Duration::ZERO);

        assert_eq!(config.health.probe_url, "http://www.google.com");
        assert_eq!(config.health.workers, 4);

        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("THROTTLE_MAX_REQUESTS", "10");
        env::set_var("QUEUE_CONCURRENCY", "8");
        env::set_var("QUEUE_WAIT_MS", "250");
        env::set_var("POOL_STRATEGY", "round_robin");
        env::set_var("POOL_ROTATION_DELAY_MS", "500");
        env::set_var("HEALTHCHECK_URL", "http://probe.example");

        let config = Config::from_env().unwrap();

        assert_eq!(config.guard.max_requests_per_window, 10);
        assert_eq!(config.queue.concurrency, 8);
        assert_eq!(config.queue.wait, Duration::from_millis(250));
        assert_eq!(config.pool.strategy, SelectionStrategy::RoundRobin);
        assert_eq!(config.pool.rotation_delay, Duration::from_millis(500));
        assert_eq!(config.health.probe_url, "http://probe.example");
    }

    #[test]
    fn test_config_from_env_invalid_numbers() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("THROTTLE_MAX_REQUESTS", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, TrawlError::InvalidConfig(_)));
    }
}
