/// Configuration management for Interaction Service
///
/// Loads configuration from environment variables.
use anyhow::{bail, Context, Result};
use collection_cache::{TtlWindow, DEFAULT_TTL_MAX_MINUTES, DEFAULT_TTL_MIN_MINUTES};
use counter_propagation::PropagationConfig;
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Collection cache settings
    pub cache: CacheConfig,
    /// Background task pool settings
    pub tasks: TaskPoolConfig,
    /// Counter delta channel; `None` when KAFKA_BROKERS is unset
    pub kafka: Option<PropagationConfig>,
    /// Counter aggregator settings
    pub aggregator: AggregatorConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port for health checks and metrics
    pub http_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
}

/// Collection cache settings
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Window the per-collection TTL is drawn from
    pub ttl: TtlWindow,
}

/// Background task pool settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskPoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

/// Counter aggregator settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// How long applied delta ids are remembered
    pub dedup_retention_hours: i64,
    /// Interval between ledger cleanups
    pub cleanup_interval_secs: u64,
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_or("PORT", 8010),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", default_max_connections()),
            min_connections: env_or("DB_MIN_CONNECTIONS", default_min_connections()),
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL").context("REDIS_URL environment variable not set")?,
        };

        let ttl = TtlWindow::from_minutes(
            env_or("CACHE_TTL_MIN_MINUTES", DEFAULT_TTL_MIN_MINUTES),
            env_or("CACHE_TTL_MAX_MINUTES", DEFAULT_TTL_MAX_MINUTES),
        )
        .context("Invalid cache TTL window")?;

        let tasks = TaskPoolConfig {
            workers: env_or("TASK_POOL_WORKERS", 8),
            queue_capacity: env_or("TASK_POOL_QUEUE_CAPACITY", 1024),
        };
        if tasks.workers == 0 || tasks.queue_capacity == 0 {
            bail!("TASK_POOL_WORKERS and TASK_POOL_QUEUE_CAPACITY must be positive");
        }

        let aggregator = AggregatorConfig {
            dedup_retention_hours: env_or("DELTA_DEDUP_RETENTION_HOURS", 168),
            cleanup_interval_secs: env_or("DELTA_DEDUP_CLEANUP_INTERVAL_SECS", 3600),
        };

        Ok(Config {
            app,
            database,
            redis,
            cache: CacheConfig { ttl },
            tasks,
            kafka: PropagationConfig::from_env(),
            aggregator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    // Environment variables are process-wide
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn base_env() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("REDIS_URL", "redis://localhost");
        for name in [
            "CACHE_TTL_MIN_MINUTES",
            "CACHE_TTL_MAX_MINUTES",
            "TASK_POOL_WORKERS",
            "KAFKA_BROKERS",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_default_values() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        base_env();

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.host, "0.0.0.0");
        assert_eq!(config.app.http_port, 8010);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.cache.ttl.min(), Duration::from_secs(360 * 60));
        assert_eq!(config.cache.ttl.max(), Duration::from_secs(720 * 60));
        assert_eq!(config.tasks.workers, 8);
        assert_eq!(config.tasks.queue_capacity, 1024);
        assert_eq!(config.aggregator.dedup_retention_hours, 168);
        assert!(config.kafka.is_none());
    }

    #[test]
    fn test_inverted_ttl_window_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        base_env();
        std::env::set_var("CACHE_TTL_MIN_MINUTES", "90");
        std::env::set_var("CACHE_TTL_MAX_MINUTES", "30");

        assert!(Config::from_env().is_err());

        std::env::remove_var("CACHE_TTL_MIN_MINUTES");
        std::env::remove_var("CACHE_TTL_MAX_MINUTES");
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        base_env();
        std::env::set_var("TASK_POOL_WORKERS", "0");

        assert!(Config::from_env().is_err());

        std::env::remove_var("TASK_POOL_WORKERS");
    }
}
