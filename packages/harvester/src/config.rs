use dotenvy::dotenv;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{HarvestError, Result};
use crate::types::config::{CrawlConfig, PoolConfig, QueryConfig, ValidatorConfig};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub crawl: CrawlConfig,
    pub validator: ValidatorConfig,
    pub pool: PoolConfig,
    pub query: QueryConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::with_data_dir("database")
    }
}

impl HarvestConfig {
    /// Defaults with every file placed under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            database_url: format!(
                "sqlite://{}?mode=rwc",
                data_dir.join("scraped_data.db").display()
            ),
            crawl: CrawlConfig::default(),
            validator: ValidatorConfig::default(),
            pool: PoolConfig::new(data_dir.join("working_proxies.txt")),
            query: QueryConfig::default().with_audit_dir(data_dir.join("scraped_results")),
            data_dir,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let data_dir = env::var("HARVEST_DATA_DIR").unwrap_or_else(|_| "database".to_string());
        let mut config = Self::with_data_dir(data_dir);

        if let Ok(url) = env::var("HARVEST_DATABASE_URL") {
            config.database_url = url;
        }

        config.crawl.global_concurrency =
            env_or("HARVEST_GLOBAL_CONCURRENCY", config.crawl.global_concurrency)?;
        config.crawl.domain_concurrency =
            env_or("HARVEST_DOMAIN_CONCURRENCY", config.crawl.domain_concurrency)?;
        config.crawl.max_retries = env_or("HARVEST_MAX_RETRIES", config.crawl.max_retries)?;
        config.crawl.batch_retries = env_or("HARVEST_BATCH_RETRIES", config.crawl.batch_retries)?;
        config.crawl.request_timeout_secs =
            env_or("HARVEST_REQUEST_TIMEOUT_SECS", config.crawl.request_timeout_secs)?;
        config.crawl.requests_per_second =
            env_or("HARVEST_REQUESTS_PER_SECOND", config.crawl.requests_per_second)?;

        config.validator.workers = env_or("HARVEST_VALIDATION_WORKERS", config.validator.workers)?;
        config.validator.timeout_secs =
            env_or("HARVEST_PROXY_TIMEOUT_SECS", config.validator.timeout_secs)?;

        config.pool.candidate_limit =
            env_or("HARVEST_CANDIDATE_LIMIT", config.pool.candidate_limit)?;
        config.pool.exhaustion = env_or("HARVEST_ON_PROXY_EXHAUSTION", config.pool.exhaustion)?;
        config.pool.scheme_policy =
            env_or("HARVEST_PROXY_SCHEME_POLICY", config.pool.scheme_policy)?;

        config.query.default_limit = env_or("HARVEST_RESULT_LIMIT", config.query.default_limit)?;

        Ok(config)
    }

    /// Candidate proxy file written by the external proxy source.
    pub fn candidate_proxy_path(&self) -> PathBuf {
        self.data_dir.join("proxies.txt")
    }

    /// JSON history of URLs discovered by search.
    pub fn discovery_history_path(&self) -> PathBuf {
        self.data_dir.join("output.json")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| HarvestError::Config(format!("{name} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}
