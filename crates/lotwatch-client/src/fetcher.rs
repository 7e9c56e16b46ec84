use std::time::Duration;

use lotwatch_core::error::AppError;
use lotwatch_core::traits::Fetcher;
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};

/// Browser-like User-Agent; some classifieds sites reject obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// HTTP fetcher using reqwest.
///
/// Downloads raw HTML without running scripts. Sites that render their
/// listings client-side need the `browser` feature's `BrowserFetcher`.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read response body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_custom_timeout() {
        let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(7)).unwrap();
        assert_eq!(fetcher.timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn unreachable_host_is_retryable() {
        let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:9/listing").await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }
}
