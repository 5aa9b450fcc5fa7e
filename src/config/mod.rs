/// Configuration management for the SkillStack step-ordering service
///
/// Handles server configuration, database locations, and normalization runtime parameters.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Normalization engine, lock, and job scheduling configuration
    pub normalization: NormalizationConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Base directory for database files (default: "data")
    pub data_dir: String,
    /// Application database (roadmaps, steps, lease rows)
    pub app_db_path: PathBuf,
    /// Durable job queue database, consumed by `skillstack worker`
    pub queue_db_path: PathBuf,
}

/// Normalization runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Hand passes to the durable queue instead of spawning them in-process
    pub use_queue: bool,
    /// Lease duration of the per-roadmap lock
    pub lock_ttl: Duration,
    /// Fixed wait between lock acquisition attempts
    pub lock_retry_interval: Duration,
    /// Worker poll interval when the queue is empty
    pub queue_poll_interval: Duration,
    /// Delivery attempts before a job is parked as failed
    pub job_max_attempts: u32,
    /// Delay before a nacked job becomes claimable again
    pub job_retry_delay: Duration,
    /// How long a claimed job stays invisible before it is reclaimed
    pub job_visibility_timeout: Duration,
    /// Cron expression for queue reclaim and lease cleanup
    pub maintenance_schedule: String,
    /// Cron expression for the full-roadmap sweep (None disables it)
    pub sweep_schedule: Option<String>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            use_queue: false,
            lock_ttl: Duration::from_secs(15),
            lock_retry_interval: Duration::from_millis(200),
            queue_poll_interval: Duration::from_millis(500),
            job_max_attempts: 3,
            job_retry_delay: Duration::from_secs(5),
            job_visibility_timeout: Duration::from_secs(600),
            maintenance_schedule: "0 */1 * * * *".to_string(),
            sweep_schedule: None,
        }
    }
}

impl DatabaseConfig {
    /// Database layout rooted at `data_dir`: skillstack.db and queue.db
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            data_dir: dir.display().to_string(),
            app_db_path: dir.join("skillstack.db"),
            queue_db_path: dir.join("queue.db"),
        }
    }
}

impl Config {
    /// Configuration for a self-contained data directory, everything else default
    pub fn for_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig::in_dir(data_dir),
            normalization: NormalizationConfig::default(),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        let defaults = NormalizationConfig::default();
        let data_dir = std::env::var("SKILLSTACK_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let mut database = DatabaseConfig::in_dir(&data_dir);
        if let Ok(path) = std::env::var("SKILLSTACK_DATABASE_PATH") {
            database.app_db_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("SKILLSTACK_QUEUE_PATH") {
            database.queue_db_path = PathBuf::from(path);
        }

        Self {
            server: ServerConfig {
                host: std::env::var("SKILLSTACK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SKILLSTACK_PORT", 8000),
            },
            database,
            normalization: NormalizationConfig {
                use_queue: std::env::var("SKILLSTACK_USE_QUEUE")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(defaults.use_queue),
                lock_ttl: Duration::from_secs(env_or("SKILLSTACK_LOCK_TTL_SECS", 15)),
                lock_retry_interval: Duration::from_millis(env_or("SKILLSTACK_LOCK_RETRY_MS", 200)),
                queue_poll_interval: Duration::from_millis(env_or("SKILLSTACK_QUEUE_POLL_MS", 500)),
                job_max_attempts: env_or("SKILLSTACK_JOB_MAX_ATTEMPTS", defaults.job_max_attempts),
                job_retry_delay: Duration::from_secs(env_or("SKILLSTACK_JOB_RETRY_DELAY_SECS", 5)),
                job_visibility_timeout: Duration::from_secs(env_or("SKILLSTACK_JOB_VISIBILITY_SECS", 600)),
                maintenance_schedule: std::env::var("SKILLSTACK_MAINTENANCE_SCHEDULE")
                    .unwrap_or(defaults.maintenance_schedule),
                sweep_schedule: std::env::var("SKILLSTACK_SWEEP_SCHEDULE")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
            },
        }
    }
}

/// Read an environment variable, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Boolean flags accept true/1/yes in any case
fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing_accepts_common_truthy_values() {
        for value in ["true", "TRUE", "1", "yes", " Yes "] {
            assert!(parse_flag(value), "{value} should be truthy");
        }
        for value in ["false", "0", "no", "", "on"] {
            assert!(!parse_flag(value), "{value} should be falsy");
        }
    }

    #[test]
    fn data_dir_layout_places_both_databases() {
        let db = DatabaseConfig::in_dir("/tmp/skillstack");
        assert_eq!(db.app_db_path, PathBuf::from("/tmp/skillstack/skillstack.db"));
        assert_eq!(db.queue_db_path, PathBuf::from("/tmp/skillstack/queue.db"));
    }

    #[test]
    fn normalization_defaults_match_lock_contract() {
        let cfg = NormalizationConfig::default();
        assert!(!cfg.use_queue);
        assert_eq!(cfg.lock_ttl, Duration::from_secs(15));
        assert_eq!(cfg.lock_retry_interval, Duration::from_millis(200));
        assert!(cfg.sweep_schedule.is_none());
    }
}
