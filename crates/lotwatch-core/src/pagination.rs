//! Index enumeration.
//!
//! Pages are fetched strictly in order starting from page 0. A [`Frontier`]
//! value carries the identities seen so far from one page step to the next;
//! the first page that adds nothing new ends the enumeration. This copes with
//! catalogs that have no page count and with sites that keep serving the last
//! page (or wrap around) past the end.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::error::AppError;
use crate::extract::fetch_with_timeout;
use crate::listing::canonical_identity;
use crate::models::IndexSource;
use crate::traits::{Fetcher, ListingParser};

/// Accumulated pagination state, threaded through each page step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontier {
    next_page: u32,
    seen: HashSet<String>,
}

impl Frontier {
    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    pub fn seen(&self) -> usize {
        self.seen.len()
    }

    /// Fold one page's identities into the frontier.
    ///
    /// Returns the advanced frontier and the identities not seen before, in
    /// page order.
    pub fn absorb(mut self, identities: impl IntoIterator<Item = String>) -> (Self, Vec<String>) {
        let mut fresh = Vec::new();
        for id in identities {
            if self.seen.insert(id.clone()) {
                fresh.push(id);
            }
        }
        self.next_page += 1;
        (self, fresh)
    }
}

/// Result of one page step.
#[derive(Debug)]
pub enum PageStep {
    /// The page contributed new identities; keep going.
    Advanced { frontier: Frontier, fresh: Vec<String> },
    /// The page contributed nothing new; enumeration is complete.
    Exhausted { frontier: Frontier },
}

/// Totals of a finished enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationSummary {
    pub pages_fetched: u32,
    pub identities: usize,
}

/// Walks the listing index page by page.
#[derive(Clone)]
pub struct PaginationDriver<F, P> {
    fetcher: F,
    parser: P,
    source: IndexSource,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<F: Fetcher, P: ListingParser> PaginationDriver<F, P> {
    pub fn new(
        fetcher: F,
        parser: P,
        source: IndexSource,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            parser,
            source,
            retry,
            timeout,
        }
    }

    /// Fetch and parse a page's links, retrying transient errors. Exhaustion
    /// is fatal.
    async fn fetch_links(&self, page: u32) -> Result<Vec<String>, AppError> {
        let url = self.source.page_url(page);
        let mut attempt = 1;
        loop {
            tracing::info!(page, %url, attempt, "Fetching index page");
            let fetched = fetch_with_timeout(&self.fetcher, &url, self.timeout).await;
            let err = match fetched.and_then(|html| self.parser.index_links(&html)) {
                Ok(links) => return Ok(links),
                Err(err) => err,
            };

            if !err.is_retryable() || !self.retry.has_attempts_left(attempt) {
                tracing::error!(page, %url, attempt, error = %err, "Index page failed");
                return Err(AppError::PaginationFailed {
                    page,
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }

            tracing::warn!(page, attempt, error = %err, "Index page attempt failed, retrying");
            let delay = self.retry.delay_after(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    /// Fetch the frontier's next page and fold its identities in.
    pub async fn step(&self, frontier: Frontier) -> Result<PageStep, AppError> {
        let page = frontier.next_page();
        let links = self.fetch_links(page).await?;
        let identities = links
            .iter()
            .filter_map(|href| canonical_identity(&self.source.base_url, href));

        let (frontier, fresh) = frontier.absorb(identities);
        tracing::info!(
            page,
            new = fresh.len(),
            total = frontier.seen(),
            "Index page collected"
        );

        if fresh.is_empty() {
            tracing::info!(page, "No new listings on page, stopping");
            Ok(PageStep::Exhausted { frontier })
        } else {
            Ok(PageStep::Advanced { frontier, fresh })
        }
    }

    /// Stream identities into `tx` as pages are discovered.
    ///
    /// On a fatal error `cancel` is triggered so that queued-but-undispatched
    /// extractions are dropped. Stops early, without error, if the receiving
    /// side has gone away or `cancel` fires.
    pub async fn drive(
        &self,
        tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<PaginationSummary, AppError> {
        let mut frontier = Frontier::default();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.step(frontier).await {
                Ok(PageStep::Exhausted { frontier: done }) => {
                    frontier = done;
                    break;
                }
                Ok(PageStep::Advanced {
                    frontier: advanced,
                    fresh,
                }) => {
                    frontier = advanced;
                    for id in fresh {
                        if tx.send(id).await.is_err() {
                            tracing::warn!("Listing queue closed, stopping pagination");
                            return Ok(summary_of(&frontier));
                        }
                    }
                }
                Err(err) => {
                    cancel.cancel();
                    return Err(err);
                }
            }
        }
        Ok(summary_of(&frontier))
    }

    /// Enumerate the whole index and return identities in discovery order.
    #[cfg(test)]
    pub async fn collect(&self) -> Result<Vec<String>, AppError> {
        let mut frontier = Frontier::default();
        let mut all = Vec::new();
        loop {
            match self.step(frontier).await? {
                PageStep::Exhausted { .. } => return Ok(all),
                PageStep::Advanced {
                    frontier: advanced,
                    fresh,
                } => {
                    frontier = advanced;
                    all.extend(fresh);
                }
            }
        }
    }
}

fn summary_of(frontier: &Frontier) -> PaginationSummary {
    PaginationSummary {
        pages_fetched: frontier.next_page(),
        identities: frontier.seen(),
    }
}
