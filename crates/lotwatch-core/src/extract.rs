use std::time::Duration;

use crate::assemble::{AssemblyRules, assemble_listing};
use crate::config::RetryPolicy;
use crate::error::AppError;
use crate::listing::Listing;
use crate::models::{ExtractionFailure, FailureKind};
use crate::traits::{Fetcher, ListingParser};

/// Fetch `url` through `fetcher`, turning an elapsed deadline into [`AppError::Timeout`].
pub(crate) async fn fetch_with_timeout<F: Fetcher>(
    fetcher: &F,
    url: &str,
    timeout: Duration,
) -> Result<String, AppError> {
    match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(timeout)),
    }
}

/// Turns one listing URL into a [`Listing`] or an [`ExtractionFailure`].
///
/// Transient errors are retried with backoff; anything else fails the
/// listing straight away. A failure never escapes as an `Err` that could
/// abort other listings.
#[derive(Clone)]
pub struct DetailExtractor<F, P> {
    fetcher: F,
    parser: P,
    rules: AssemblyRules,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<F: Fetcher, P: ListingParser> DetailExtractor<F, P> {
    pub fn new(
        fetcher: F,
        parser: P,
        rules: AssemblyRules,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            parser,
            rules,
            retry,
            timeout,
        }
    }

    async fn attempt(&self, url: &str) -> Result<Listing, AppError> {
        let html = fetch_with_timeout(&self.fetcher, url, self.timeout).await?;
        let raw = self.parser.parse_detail(&html)?;
        assemble_listing(url, &raw, &self.rules)
    }

    /// Extract one listing, calling `on_retry(attempt, error)` before each backoff.
    pub async fn extract_with<R>(
        &self,
        url: &str,
        mut on_retry: R,
    ) -> Result<Listing, ExtractionFailure>
    where
        R: FnMut(u32, &AppError),
    {
        let mut attempt = 1;
        loop {
            let err = match self.attempt(url).await {
                Ok(listing) => return Ok(listing),
                Err(err) => err,
            };

            let retryable = err.is_retryable();
            if !retryable || !self.retry.has_attempts_left(attempt) {
                return Err(ExtractionFailure {
                    url: url.to_string(),
                    kind: FailureKind::from(&err),
                    message: err.to_string(),
                    attempts: attempt,
                    retries_exhausted: retryable,
                });
            }

            on_retry(attempt, &err);
            let delay = self.retry.delay_after(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    #[cfg(test)]
    pub async fn extract(&self, url: &str) -> Result<Listing, ExtractionFailure> {
        self.extract_with(url, |attempt, err| {
            tracing::debug!(%url, attempt, error = %err, "Listing attempt failed, retrying");
        })
        .await
    }
}
