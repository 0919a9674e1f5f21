use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OUTPUT_DIR: &str = "data";

/// Webhook delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Max records per POST. Must be > 0.
    pub batch_size: usize,
    /// Pause between consecutive POSTs (not after the last).
    pub inter_batch_delay: Duration,
    /// Per-POST timeout.
    pub request_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            inter_batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be non-zero");
        }
        Ok(())
    }
}

/// Per-run scrape settings shared by every marketplace.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Max apps to scrape; `None` means unlimited.
    pub limit: Option<usize>,
    pub output_dir: PathBuf,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            limit: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl ScrapeOptions {
    /// `SCRAPE_LIMIT=0` has always meant "no limit".
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|&n| n > 0);
        self
    }

    pub fn limit_reached(&self, count: usize) -> bool {
        self.limit.is_some_and(|n| count >= n)
    }

    pub fn truncate<T>(&self, items: &mut Vec<T>) {
        if let Some(n) = self.limit {
            items.truncate(n);
        }
    }
}

/// Treat unset, empty and whitespace-only endpoints alike.
pub fn normalize_endpoint(endpoint: Option<&str>) -> Option<&str> {
    endpoint.map(str::trim).filter(|e| !e.is_empty())
}
