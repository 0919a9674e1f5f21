use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{normalize_endpoint, PublisherConfig};

/// Why a single batch was not delivered. Only ever logged; never returned
/// from `deliver`.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("could not encode batch: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("timed out after {0:.1?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("endpoint responded {status}")]
    Status { status: StatusCode },
}

impl BatchError {
    /// Whether a later attempt could plausibly succeed. Logging only.
    pub fn is_retryable(&self) -> bool {
        match self {
            BatchError::Timeout(_) | BatchError::Transport(_) => true,
            BatchError::Status { status } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            BatchError::Encode(_) => false,
        }
    }
}

/// Best-effort webhook delivery in fixed-size batches.
///
/// Batches go out strictly one after another: each POST and each pause is
/// awaited before the next batch starts. A failed batch is logged and skipped.
pub struct Publisher {
    client: reqwest::Client,
    config: PublisherConfig,
}

impl Publisher {
    pub fn new(config: PublisherConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { client, config })
    }

    /// POST `records` to `endpoint` as JSON arrays of at most `batch_size`
    /// records and return how many records were in batches that got a 2xx.
    ///
    /// Returns 0 without touching the network when `records` is empty or
    /// `endpoint` is blank.
    pub async fn deliver<T: Serialize>(&self, records: &[T], endpoint: &str) -> usize {
        if records.is_empty() {
            info!("No records to deliver");
            return 0;
        }
        let Some(endpoint) = normalize_endpoint(Some(endpoint)) else {
            warn!("No webhook URL configured, skipping delivery");
            return 0;
        };

        let batches: Vec<&[T]> = records.chunks(self.config.batch_size).collect();
        let total_batches = batches.len();
        info!(
            "Delivering {} records in {} batches",
            records.len(),
            total_batches
        );

        let t0 = Instant::now();
        let mut delivered = 0usize;

        for (i, batch) in batches.into_iter().enumerate() {
            let batch_num = i + 1;
            match self.send_batch(endpoint, batch).await {
                Ok(()) => {
                    delivered += batch.len();
                    info!(
                        "Batch {}/{}: delivered {} records",
                        batch_num,
                        total_batches,
                        batch.len()
                    );
                }
                Err(e) => {
                    error!(
                        retryable = e.is_retryable(),
                        "Batch {}/{} failed: {}",
                        batch_num,
                        total_batches,
                        e
                    );
                }
            }

            if batch_num < total_batches {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        info!(
            "Delivered {}/{} records in {:.1}s",
            delivered,
            records.len(),
            t0.elapsed().as_secs_f64()
        );
        delivered
    }

    async fn send_batch<T: Serialize>(&self, endpoint: &str, batch: &[T]) -> Result<(), BatchError> {
        let body = serde_json::to_vec(batch)?;

        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BatchError::Timeout(self.config.request_timeout)
                } else {
                    BatchError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BatchError::Status { status });
        }
        Ok(())
    }
}
