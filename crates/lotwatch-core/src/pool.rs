use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::extract::DetailExtractor;
use crate::listing::{Field, Listing};
use crate::models::ExtractionFailure;
use crate::traits::{Fetcher, ListingParser};

/// Events emitted by the pool for monitoring/logging.
///
/// `task_id` is the dispatch order of the listing within the run.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    PoolStarted {
        concurrency: usize,
    },
    ListingStarted {
        task_id: usize,
        url: &'a str,
    },
    ListingExtracted {
        task_id: usize,
        listing: &'a Listing,
    },
    AttemptFailed {
        task_id: usize,
        url: &'a str,
        attempt: u32,
        error: &'a AppError,
    },
    ListingAbandoned {
        task_id: usize,
        failure: &'a ExtractionFailure,
    },
    PoolDrained {
        dispatched: usize,
    },
}

/// Trait for receiving pool events (decoupled logging).
pub trait HarvestReporter: Send + Sync + 'static {
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHarvestReporter;

impl HarvestReporter for TracingHarvestReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::PoolStarted { concurrency } => {
                tracing::info!(concurrency, "Extraction pool started");
            }
            HarvestEvent::ListingStarted { task_id, url } => {
                tracing::debug!(task_id, %url, "Extracting listing");
            }
            HarvestEvent::ListingExtracted { task_id, listing } => {
                tracing::info!(
                    task_id,
                    url = %listing.url(),
                    make = %listing.get(Field::Make),
                    model = %listing.get(Field::Model),
                    price = %listing.get(Field::Price),
                    mileage = %listing.get(Field::Mileage),
                    "Listing extracted"
                );
            }
            HarvestEvent::AttemptFailed {
                task_id,
                url,
                attempt,
                error,
            } => {
                tracing::warn!(task_id, %url, attempt, %error, "Attempt failed, will retry");
            }
            HarvestEvent::ListingAbandoned { task_id, failure } => {
                tracing::warn!(
                    task_id,
                    url = %failure.url,
                    attempts = failure.attempts,
                    error = %failure.message,
                    "Listing failed"
                );
            }
            HarvestEvent::PoolDrained { dispatched } => {
                tracing::info!(dispatched, "Extraction pool drained");
            }
        }
    }
}

/// Everything the extraction phase produced.
#[derive(Debug, Default)]
pub struct Harvest {
    pub listings: Vec<Listing>,
    pub failures: Vec<ExtractionFailure>,
}

enum Outcome {
    Extracted(Listing),
    Failed(ExtractionFailure),
}

/// Runs listing extractions with at most `concurrency` in flight.
///
/// A single dispatcher owns the queue. Each identity waits for a semaphore
/// permit, then runs as its own task and pushes its outcome into a channel;
/// [`HarvestPool::run`] returns only after every dispatched task has finished.
pub struct HarvestPool<F, P> {
    extractor: Arc<DetailExtractor<F, P>>,
    concurrency: usize,
}

impl<F: Fetcher, P: ListingParser> HarvestPool<F, P> {
    pub fn new(extractor: DetailExtractor<F, P>, concurrency: usize) -> Self {
        Self {
            extractor: Arc::new(extractor),
            concurrency: concurrency.max(1),
        }
    }

    /// Extract every identity received on `queue` until it closes.
    ///
    /// Once `cancel` fires, nothing new is dispatched; extractions already in
    /// flight run to completion.
    pub async fn run<R: HarvestReporter>(
        &self,
        mut queue: mpsc::Receiver<String>,
        cancel: CancellationToken,
        reporter: Arc<R>,
    ) -> Harvest {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let (sink, mut outcomes) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        let mut dispatched = 0;

        reporter.report(HarvestEvent::PoolStarted {
            concurrency: self.concurrency,
        });

        loop {
            // Take a permit before the identity so nothing is dequeued that
            // cannot run yet.
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let url = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                url = queue.recv() => match url {
                    Some(url) => url,
                    None => break,
                },
            };

            let task_id = dispatched;
            dispatched += 1;
            let sink = sink.clone();
            let reporter = Arc::clone(&reporter);
            let extractor = Arc::clone(&self.extractor);

            tasks.spawn(async move {
                let _permit = permit;
                reporter.report(HarvestEvent::ListingStarted {
                    task_id,
                    url: &url,
                });
                let result = extractor
                    .extract_with(&url, |attempt, error| {
                        reporter.report(HarvestEvent::AttemptFailed {
                            task_id,
                            url: &url,
                            attempt,
                            error,
                        });
                    })
                    .await;

                let outcome = match result {
                    Ok(listing) => {
                        reporter.report(HarvestEvent::ListingExtracted {
                            task_id,
                            listing: &listing,
                        });
                        Outcome::Extracted(listing)
                    }
                    Err(failure) => {
                        reporter.report(HarvestEvent::ListingAbandoned {
                            task_id,
                            failure: &failure,
                        });
                        Outcome::Failed(failure)
                    }
                };
                let _ = sink.send(outcome);
            });

            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }
        }
        drop(sink);

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        reporter.report(HarvestEvent::PoolDrained { dispatched });

        let mut harvest = Harvest::default();
        while let Some(outcome) = outcomes.recv().await {
            match outcome {
                Outcome::Extracted(listing) => harvest.listings.push(listing),
                Outcome::Failed(failure) => harvest.failures.push(failure),
            }
        }
        harvest
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Extraction task panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::assemble::AssemblyRules;
    use crate::config::RetryPolicy;
    use crate::testutil::*;

    fn pool(
        fetcher: MockFetcher,
        parser: MockParser,
        concurrency: usize,
    ) -> HarvestPool<MockFetcher, MockParser> {
        let extractor = DetailExtractor::new(
            fetcher,
            parser,
            AssemblyRules::default(),
            RetryPolicy::immediate(2),
            Duration::from_secs(5),
        );
        HarvestPool::new(extractor, concurrency)
    }

    async fn feed(urls: &[String]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(urls.len().max(1));
        for url in urls {
            tx.send(url.clone()).await.unwrap();
        }
        rx
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://cars.example/ad/{i}")).collect()
    }

    #[tokio::test]
    async fn extracts_everything_and_isolates_failures() {
        let all = urls(6);
        let fetcher = MockFetcher::new();
        let mut parser = MockParser::new();
        for url in &all {
            parser = parser.with_car(url, "100", "10 km");
        }
        fetcher.respond(&all[2], Err(AppError::Timeout(Duration::from_secs(15))));
        fetcher.respond(&all[2], Err(AppError::Timeout(Duration::from_secs(15))));

        let reporter = Arc::new(RecordingReporter::default());
        let harvest = pool(fetcher, parser, 3)
            .run(feed(&all).await, CancellationToken::new(), Arc::clone(&reporter))
            .await;

        assert_eq!(harvest.listings.len(), 5);
        assert_eq!(harvest.failures.len(), 1);
        assert_eq!(harvest.failures[0].url, all[2]);
        assert_eq!(reporter.count("pool_started"), 1);
        assert_eq!(reporter.count("listing"), 6);
        assert_eq!(reporter.count("drained"), 1);
        assert_eq!(reporter.count("retry"), 1);
        assert_eq!(reporter.count("abandoned"), 1);
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_limit() {
        let all = urls(12);
        let fetcher = MockFetcher::new().with_delay(Duration::from_millis(20));
        let mut parser = MockParser::new();
        for url in &all {
            parser = parser.with_car(url, "1", "1");
        }

        let harvest = pool(fetcher.clone(), parser, 3)
            .run(
                feed(&all).await,
                CancellationToken::new(),
                Arc::new(TracingHarvestReporter),
            )
            .await;

        assert_eq!(harvest.listings.len(), 12);
        assert!(fetcher.peak_in_flight() <= 3);
        assert!(fetcher.peak_in_flight() >= 2);
    }

    #[tokio::test]
    async fn cancelled_pool_dispatches_nothing_new() {
        let all = urls(4);
        let fetcher = MockFetcher::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let harvest = pool(fetcher.clone(), MockParser::new(), 2)
            .run(feed(&all).await, cancel, Arc::new(TracingHarvestReporter))
            .await;

        assert!(harvest.listings.is_empty());
        assert!(harvest.failures.is_empty());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_run_lets_in_flight_finish() {
        let all = urls(4);
        let fetcher = MockFetcher::new().with_delay(Duration::from_millis(50));
        let mut parser = MockParser::new();
        for url in &all {
            parser = parser.with_car(url, "1", "1");
        }
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let harvest = pool(fetcher.clone(), parser, 1)
            .run(feed(&all).await, cancel, Arc::new(TracingHarvestReporter))
            .await;

        assert_eq!(harvest.listings.len(), 1);
        assert_eq!(harvest.listings[0].url(), all[0]);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_completes() {
        let (tx, rx) = mpsc::channel::<String>(1);
        drop(tx);

        let harvest = pool(MockFetcher::new(), MockParser::new(), 4)
            .run(rx, CancellationToken::new(), Arc::new(TracingHarvestReporter))
            .await;

        assert!(harvest.listings.is_empty());
        assert!(harvest.failures.is_empty());
    }
}
