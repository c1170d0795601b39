//! Cover art download
//!
//! Covers are an optional enrichment: [`CoverArtFetcher::fetch`] never fails
//! a job, it logs and returns `None` instead.

use crate::error::{MetadataError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches album covers through the host HTTP client.
#[derive(Clone)]
pub struct CoverArtFetcher {
    http_client: Arc<dyn HttpClient>,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl CoverArtFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self {
            http_client,
            timeout,
            retry_policy: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(2),
                use_exponential_backoff: true,
            },
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Download the cover at `url`; `None` when there is no URL or the
    /// download fails.
    pub async fn fetch(&self, url: Option<&str>) -> Option<Bytes> {
        let url = url.filter(|u| !u.trim().is_empty())?;

        match self.try_fetch(url).await {
            Ok(bytes) => {
                debug!(size = bytes.len(), "Cover art downloaded");
                Some(bytes)
            }
            Err(e) => {
                warn!(error = %e, "Cover art unavailable, tagging without picture");
                None
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Bytes> {
        let request = HttpRequest::get(url).timeout(self.timeout);
        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;

        if !response.is_success() {
            return Err(MetadataError::ArtworkError(format!(
                "HTTP {}",
                response.status
            )));
        }
        if response.body.is_empty() {
            return Err(MetadataError::ArtworkError("empty body".to_string()));
        }

        Ok(response.body)
    }
}

impl std::fmt::Debug for CoverArtFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverArtFetcher")
            .field("timeout", &self.timeout)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}
