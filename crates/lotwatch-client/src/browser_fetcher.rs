use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use lotwatch_core::error::AppError;
use lotwatch_core::traits::Fetcher;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(400);
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Headless-browser fetcher using Chromium via the Chrome DevTools Protocol.
///
/// Classifieds front-ends render their tiles and spec tables client-side, so
/// after navigation this polls the configured readiness selectors until one
/// matches (or the wait runs out) and then returns the rendered DOM. An
/// unready page is still returned; the parser decides whether it is usable.
///
/// A single Chromium process is shared across all clones; each fetch opens
/// its own tab and closes it afterwards.
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    ready: Arc<Vec<String>>,
    wait: Duration,
}

impl BrowserFetcher {
    /// Launch headless Chromium. `ready` lists selectors signalling that a
    /// page has rendered; `wait` bounds the polling per page.
    pub async fn launch(ready: Vec<String>, wait: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--window-size=1920,1080")
            .build()
            .map_err(|e| AppError::ConfigError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::ConfigError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            ready: Arc::new(ready),
            wait,
        })
    }

    /// Real Chrome/Chromium binary, preferring `CHROME_BIN`.
    ///
    /// The snap wrapper at `/snap/bin/chromium` strips headless flags, so the
    /// binary inside the snap is tried before system paths.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    async fn wait_until_ready(&self, page: &Page) -> bool {
        if self.ready.is_empty() {
            return true;
        }
        let deadline = Instant::now() + self.wait;
        loop {
            for selector in self.ready.iter() {
                if page.find_element(selector.as_str()).await.is_ok() {
                    tokio::time::sleep(SETTLE_DELAY).await;
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn render(&self, page: &Page, url: &str) -> Result<String, AppError> {
        page.wait_for_navigation()
            .await
            .map_err(|e| AppError::NetworkError(format!("Navigation to {url} failed: {e}")))?;

        if !self.wait_until_ready(page).await {
            tracing::debug!(%url, "Page not ready before deadline, returning as-is");
        }

        page.content()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read page content: {e}")))
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to open {url}: {e}")))?;

        let result = self.render(&page, url).await;
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "Failed to close browser tab");
        }
        result
    }
}
