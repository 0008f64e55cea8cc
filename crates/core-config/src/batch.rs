use crate::{env_or_default, ConfigError, FromEnv};

/// Tunables for the batch workflow execution platform.
///
/// All fields have defaults matching the upstream behavior this platform
/// reimplements; only `upstream_base_url` has no sane default and is
/// required.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Default worker-pool capacity, clamped to `[1, 20]`.
    pub workers: u32,
    /// Base URL of the upstream workflow/completion API.
    pub upstream_base_url: String,
    /// Filesystem root used to resolve tenant private keys and local-dev
    /// fallbacks.
    pub storage_path: String,
    /// Cumulative batch error count at which a user's base allocation is
    /// reduced by one worker.
    pub error_penalty_threshold: u32,
    /// Number of retries a task gets before it is marked terminally failed.
    pub max_retry_count: u32,
}

const DEFAULT_WORKERS: &str = "4";
const DEFAULT_ERROR_PENALTY_THRESHOLD: &str = "50";
const DEFAULT_MAX_RETRY_COUNT: &str = "3";
const MIN_WORKERS: u32 = 1;
const MAX_WORKERS: u32 = 20;

impl BatchConfig {
    /// Clamp `workers` into the documented `[1, 20]` range.
    fn clamp_workers(workers: u32) -> u32 {
        workers.clamp(MIN_WORKERS, MAX_WORKERS)
    }
}

impl FromEnv for BatchConfig {
    /// Environment variables:
    /// - `BATCH_WORKERS` (optional, default: 4, clamped to 1..20)
    /// - `UPSTREAM_BASE_URL` (required)
    /// - `BATCH_STORAGE_PATH` (optional, default: "./storage")
    /// - `ERROR_PENALTY_THRESHOLD` (optional, default: 50)
    /// - `MAX_RETRY_COUNT` (optional, default: 3)
    fn from_env() -> Result<Self, ConfigError> {
        let upstream_base_url = crate::env_required("UPSTREAM_BASE_URL")?;

        let workers: u32 =
            env_or_default("BATCH_WORKERS", DEFAULT_WORKERS)
                .parse()
                .map_err(|e| ConfigError::ParseError {
                    key: "BATCH_WORKERS".to_string(),
                    details: format!("{}", e),
                })?;

        let storage_path = env_or_default("BATCH_STORAGE_PATH", "./storage");

        let error_penalty_threshold = env_or_default(
            "ERROR_PENALTY_THRESHOLD",
            DEFAULT_ERROR_PENALTY_THRESHOLD,
        )
        .parse()
        .map_err(|e| ConfigError::ParseError {
            key: "ERROR_PENALTY_THRESHOLD".to_string(),
            details: format!("{}", e),
        })?;

        let max_retry_count = env_or_default("MAX_RETRY_COUNT", DEFAULT_MAX_RETRY_COUNT)
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "MAX_RETRY_COUNT".to_string(),
                details: format!("{}", e),
            })?;

        Ok(Self {
            workers: Self::clamp_workers(workers),
            upstream_base_url,
            storage_path,
            error_penalty_threshold,
            max_retry_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_from_env_minimal() {
        temp_env::with_var(
            "UPSTREAM_BASE_URL",
            Some("https://upstream.example.com"),
            || {
                let config = BatchConfig::from_env().unwrap();
                assert_eq!(config.workers, 4);
                assert_eq!(config.error_penalty_threshold, 50);
                assert_eq!(config.max_retry_count, 3);
            },
        );
    }

    #[test]
    fn test_batch_config_clamps_workers_above_max() {
        temp_env::with_vars(
            [
                ("UPSTREAM_BASE_URL", Some("https://upstream.example.com")),
                ("BATCH_WORKERS", Some("500")),
            ],
            || {
                let config = BatchConfig::from_env().unwrap();
                assert_eq!(config.workers, MAX_WORKERS);
            },
        );
    }

    #[test]
    fn test_batch_config_clamps_workers_below_min() {
        temp_env::with_vars(
            [
                ("UPSTREAM_BASE_URL", Some("https://upstream.example.com")),
                ("BATCH_WORKERS", Some("0")),
            ],
            || {
                let config = BatchConfig::from_env().unwrap();
                assert_eq!(config.workers, MIN_WORKERS);
            },
        );
    }

    #[test]
    fn test_batch_config_requires_upstream_base_url() {
        temp_env::with_var_unset("UPSTREAM_BASE_URL", || {
            let err = BatchConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("UPSTREAM_BASE_URL"));
        });
    }
}
