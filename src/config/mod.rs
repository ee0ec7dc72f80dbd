//! Environment-backed configuration.
//!
//! Most settings have defaults. The two cache policy knobs use the unprefixed
//! `CACHE_USAGE_RATE` / `SIMILARITY_THRESHOLD` names; everything else is `QBANK_*`.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DimConfig, DEFAULT_CACHE_USAGE_RATE, DEFAULT_EMBEDDING_DIM, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_STALE_JOB_SECS,
};

/// Engine configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Probability that a slot may be served from cache. Default: `0.9`.
    pub cache_usage_rate: f64,

    /// Novelty threshold for cosine similarity. Default: `0.9`.
    pub similarity_threshold: f32,

    /// Directory for the file-backed store. Default: `./.data`.
    pub storage_path: PathBuf,

    /// Reconciliation queue depth. Default: `1024`.
    pub queue_capacity: usize,

    /// Per-job reconciliation timeout. Default: disabled.
    pub job_timeout: Option<Duration>,

    /// Age after which an in-progress job is reported as stale. Default: 15 minutes.
    pub stale_job_after: Duration,

    /// Fixed seed for cache sampling (replayable runs). Default: OS entropy.
    pub rng_seed: Option<u64>,

    /// Dimension of stub embeddings. Default: `384`.
    pub embedding_dim: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_usage_rate: DEFAULT_CACHE_USAGE_RATE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            storage_path: PathBuf::from("./.data"),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            job_timeout: None,
            stale_job_after: Duration::from_secs(DEFAULT_STALE_JOB_SECS),
            rng_seed: None,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

impl Config {
    const ENV_CACHE_USAGE_RATE: &'static str = "CACHE_USAGE_RATE";
    const ENV_SIMILARITY_THRESHOLD: &'static str = "SIMILARITY_THRESHOLD";
    const ENV_STORAGE_PATH: &'static str = "QBANK_STORAGE_PATH";
    const ENV_QUEUE_CAPACITY: &'static str = "QBANK_QUEUE_CAPACITY";
    const ENV_JOB_TIMEOUT_SECS: &'static str = "QBANK_JOB_TIMEOUT_SECS";
    const ENV_STALE_JOB_SECS: &'static str = "QBANK_STALE_JOB_SECS";
    const ENV_RNG_SEED: &'static str = "QBANK_RNG_SEED";
    const ENV_EMBEDDING_DIM: &'static str = "QBANK_EMBEDDING_DIM";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cache_usage_rate =
            Self::parse_rate_from_env(Self::ENV_CACHE_USAGE_RATE, defaults.cache_usage_rate)?;
        let similarity_threshold = Self::parse_rate_from_env(
            Self::ENV_SIMILARITY_THRESHOLD,
            defaults.similarity_threshold as f64,
        )? as f32;
        let storage_path = Self::parse_path_from_env(Self::ENV_STORAGE_PATH, defaults.storage_path);
        let queue_capacity =
            Self::parse_u64_from_env(Self::ENV_QUEUE_CAPACITY, defaults.queue_capacity as u64)
                as usize;
        let job_timeout = Self::parse_optional_u64_from_env(Self::ENV_JOB_TIMEOUT_SECS)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let stale_job_after = Duration::from_secs(Self::parse_u64_from_env(
            Self::ENV_STALE_JOB_SECS,
            defaults.stale_job_after.as_secs(),
        ));
        let rng_seed = Self::parse_optional_u64_from_env(Self::ENV_RNG_SEED);
        let embedding_dim =
            Self::parse_u64_from_env(Self::ENV_EMBEDDING_DIM, defaults.embedding_dim as u64)
                as usize;

        Ok(Self {
            cache_usage_rate,
            similarity_threshold,
            storage_path,
            queue_capacity,
            job_timeout,
            stale_job_after,
            rng_seed,
            embedding_dim,
        })
    }

    /// Validates ranges and paths (does not create directories).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.cache_usage_rate) {
            return Err(ConfigError::OutOfRange {
                name: Self::ENV_CACHE_USAGE_RATE,
                value: self.cache_usage_rate,
            });
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::OutOfRange {
                name: Self::ENV_SIMILARITY_THRESHOLD,
                value: self.similarity_threshold as f64,
            });
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        DimConfig::new(self.embedding_dim)
            .validate()
            .map_err(|_| ConfigError::ZeroEmbeddingDim)?;

        if self.storage_path.exists() && !self.storage_path.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.storage_path.clone(),
            });
        }

        Ok(())
    }

    fn parse_rate_from_env(var_name: &'static str, default: f64) -> Result<f64, ConfigError> {
        match env::var(var_name) {
            Ok(value) => {
                let rate: f64 =
                    value
                        .trim()
                        .parse()
                        .map_err(|e| ConfigError::FloatParseError {
                            name: var_name,
                            value: value.clone(),
                            source: e,
                        })?;

                if !(0.0..=1.0).contains(&rate) {
                    return Err(ConfigError::OutOfRange {
                        name: var_name,
                        value: rate,
                    });
                }

                Ok(rate)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(default)
    }

    fn parse_u64_from_env(var_name: &str, default: u64) -> u64 {
        Self::parse_optional_u64_from_env(var_name).unwrap_or(default)
    }

    fn parse_optional_u64_from_env(var_name: &str) -> Option<u64> {
        env::var(var_name).ok().and_then(|v| v.trim().parse().ok())
    }
}
