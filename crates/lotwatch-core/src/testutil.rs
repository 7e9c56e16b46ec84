//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;

use crate::diff::ChangeRecord;
use crate::error::AppError;
use crate::models::RawListing;
use crate::pool::{HarvestEvent, HarvestReporter};
use crate::snapshot::Snapshot;
use crate::traits::{Fetcher, ListingParser, SnapshotStore};

/// HTML the [`MockParser`] reads as an index page linking to `links`.
pub fn index_html(links: &[&str]) -> String {
    links.iter().map(|l| format!("link:{l}\n")).collect()
}

/// HTML the [`MockParser`] reads as the detail page of `url`.
pub fn detail_html(url: &str) -> String {
    format!("detail:{url}")
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher with per-URL scripted responses.
///
/// Each call pops the next queued response for the URL; once the queue is
/// empty it answers with [`detail_html`] for that URL.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<String, AppError>>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a response for `url`.
    pub fn respond(&self, url: &str, response: Result<String, AppError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    /// Highest number of fetches observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|q| q.pop_front());
        next.unwrap_or_else(|| Ok(detail_html(url)))
    }
}

// ---------------------------------------------------------------------------
// MockParser
// ---------------------------------------------------------------------------

/// Mock parser understanding the [`index_html`] / [`detail_html`] formats.
///
/// Detail pages of unregistered URLs, or anything not in the detail format,
/// parse to an empty [`RawListing`] (a page that has not rendered).
#[derive(Clone, Default)]
pub struct MockParser {
    details: Arc<Mutex<HashMap<String, RawListing>>>,
}

impl MockParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detail(self, url: &str, raw: RawListing) -> Self {
        self.details.lock().unwrap().insert(url.to_string(), raw);
        self
    }

    /// Register a Jetour T2 with the given price and mileage.
    pub fn with_car(self, url: &str, price: &str, mileage: &str) -> Self {
        self.with_detail(
            url,
            RawListing {
                make: "Jetour".into(),
                model: "Jetour T2".into(),
                price: price.into(),
                specs: vec![("mileage".into(), mileage.into())],
                ..Default::default()
            },
        )
    }
}

impl ListingParser for MockParser {
    fn index_links(&self, html: &str) -> Result<Vec<String>, AppError> {
        Ok(html
            .lines()
            .filter_map(|line| line.strip_prefix("link:"))
            .map(str::to_string)
            .collect())
    }

    fn parse_detail(&self, html: &str) -> Result<RawListing, AppError> {
        let Some(url) = html.strip_prefix("detail:") else {
            return Ok(RawListing::default());
        };
        Ok(self
            .details
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Recorded save: (current snapshot, change records).
pub type SavedRun = (Snapshot, Vec<ChangeRecord>);

/// Mock store that records saves and returns a configurable prior snapshot.
#[derive(Clone)]
pub struct MockStore {
    pub saved: Arc<Mutex<Vec<SavedRun>>>,
    prior: Arc<Mutex<Option<Snapshot>>>,
    load_error: Arc<Mutex<Option<AppError>>>,
    save_error: Arc<Mutex<Option<AppError>>>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl MockStore {
    /// Empty store — first run, no previous data.
    pub fn empty() -> Self {
        Self {
            saved: Arc::new(Mutex::new(Vec::new())),
            prior: Arc::new(Mutex::new(None)),
            load_error: Arc::new(Mutex::new(None)),
            save_error: Arc::new(Mutex::new(None)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_prior(prior: Snapshot) -> Self {
        let store = Self::empty();
        *store.prior.lock().unwrap() = Some(prior);
        store
    }

    pub fn with_load_error(error: AppError) -> Self {
        let store = Self::empty();
        *store.load_error.lock().unwrap() = Some(error);
        store
    }

    pub fn with_save_error(error: AppError) -> Self {
        let store = Self::empty();
        *store.save_error.lock().unwrap() = Some(error);
        store
    }

    /// Order in which store operations were invoked.
    pub fn log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

impl SnapshotStore for MockStore {
    async fn load_prior(&self, today: NaiveDate) -> Result<Option<Snapshot>, AppError> {
        self.log.lock().unwrap().push("load_prior");
        if let Some(e) = self.load_error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(self
            .prior
            .lock()
            .unwrap()
            .clone()
            .filter(|p| p.captured_on() < today))
    }

    async fn save(
        &self,
        current: &Snapshot,
        records: &[ChangeRecord],
    ) -> Result<Option<PathBuf>, AppError> {
        self.log.lock().unwrap().push("save");
        if let Some(e) = self.save_error.lock().unwrap().take() {
            return Err(e);
        }
        self.saved
            .lock()
            .unwrap()
            .push((current.clone(), records.to_vec()));
        Ok(Some(PathBuf::from(format!("{}.csv", current.captured_on()))))
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that records the kind of every event it receives.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<&'static str>>,
}

impl RecordingReporter {
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|k| **k == kind)
            .count()
    }
}

impl HarvestReporter for RecordingReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        let kind = match event {
            HarvestEvent::PoolStarted { .. } => "pool_started",
            HarvestEvent::ListingStarted { .. } => "listing",
            HarvestEvent::ListingExtracted { .. } => "extracted",
            HarvestEvent::AttemptFailed { .. } => "retry",
            HarvestEvent::ListingAbandoned { .. } => "abandoned",
            HarvestEvent::PoolDrained { .. } => "drained",
        };
        self.events.lock().unwrap().push(kind);
    }
}
