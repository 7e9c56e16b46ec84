use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::assemble::AssemblyRules;
use crate::config::HarvestConfig;
use crate::diff::{ChangeRecord, ChangeSummary, diff_snapshots};
use crate::error::AppError;
use crate::extract::DetailExtractor;
use crate::models::{ExtractionFailure, IndexSource};
use crate::pagination::PaginationDriver;
use crate::pool::{HarvestPool, HarvestReporter};
use crate::snapshot::Snapshot;
use crate::traits::{Fetcher, ListingParser, SnapshotStore};

/// Outcome of a successful run, handed to the report emitter.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_date: NaiveDate,
    /// Date of the prior snapshot compared against, if any.
    pub prior_date: Option<NaiveDate>,
    pub pages_fetched: u32,
    pub discovered: usize,
    pub summary: ChangeSummary,
    pub failures: Vec<ExtractionFailure>,
    pub artifact: Option<PathBuf>,
    #[serde(skip)]
    pub records: Vec<ChangeRecord>,
}

impl RunReport {
    pub fn total_rows(&self) -> usize {
        self.records.len()
    }
}

/// Orchestrates one run: paginate → extract → diff → save.
///
/// Generic over all external dependencies via traits, enabling dependency
/// injection and testability without real HTTP or disk access.
pub struct HarvestService<F, P, S>
where
    F: Fetcher,
    P: ListingParser,
    S: SnapshotStore,
{
    pagination: PaginationDriver<F, P>,
    pool: HarvestPool<F, P>,
    store: S,
    config: HarvestConfig,
}

impl<F, P, S> HarvestService<F, P, S>
where
    F: Fetcher,
    P: ListingParser,
    S: SnapshotStore,
{
    pub fn new(
        fetcher: F,
        parser: P,
        source: IndexSource,
        rules: AssemblyRules,
        store: S,
        config: HarvestConfig,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let retry = config.retry_policy();
        let pagination = PaginationDriver::new(
            fetcher.clone(),
            parser.clone(),
            source,
            retry.clone(),
            config.page_timeout,
        );
        let extractor =
            DetailExtractor::new(fetcher, parser, rules, retry, config.listing_timeout);
        let pool = HarvestPool::new(extractor, config.concurrency);

        Ok(Self {
            pagination,
            pool,
            store,
            config,
        })
    }

    /// Run the full pipeline for `today`.
    ///
    /// 1. Load the prior snapshot (before anything is written)
    /// 2. Paginate the index, feeding identities to the worker pool as found
    /// 3. Wait for every extraction to finish
    /// 4. Build the current snapshot and diff it against the prior one
    /// 5. Persist the dated artifact
    ///
    /// Pagination failure, an empty catalog and duplicate identities abort
    /// the run; individual listing failures only show up in the report.
    pub async fn run<R: HarvestReporter>(
        &self,
        today: NaiveDate,
        reporter: Arc<R>,
    ) -> Result<RunReport, AppError> {
        // 1. Prior
        let prior = match self.store.load_prior(today).await {
            Ok(Some(prior)) => {
                tracing::info!(
                    date = %prior.captured_on(),
                    listings = prior.len(),
                    "Comparing against prior snapshot"
                );
                Some(prior)
            }
            Ok(None) => {
                tracing::info!("No prior snapshot, every listing will be NEW");
                None
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "Prior snapshot is inconsistent, aborting");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not read prior snapshot, treating run as first");
                None
            }
        };

        // 2 & 3. Paginate + extract
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let cancel = CancellationToken::new();
        let (paged, harvest) = tokio::join!(
            self.pagination.drive(tx, cancel.clone()),
            self.pool.run(rx, cancel.clone(), reporter),
        );
        let paged = paged?;
        if paged.identities == 0 {
            return Err(AppError::EmptyCatalog);
        }
        tracing::info!(
            pages = paged.pages_fetched,
            discovered = paged.identities,
            extracted = harvest.listings.len(),
            failed = harvest.failures.len(),
            "Extraction complete"
        );

        // 4. Diff
        let current = Snapshot::from_listings(today, harvest.listings)?;
        let records = diff_snapshots(prior.as_ref(), &current);
        let summary = ChangeSummary::from_records(&records);

        // 5. Persist
        let artifact = self.store.save(&current, &records).await?;
        if let Some(path) = &artifact {
            tracing::info!(path = %path.display(), rows = records.len(), "Snapshot saved");
        }

        Ok(RunReport {
            run_date: today,
            prior_date: prior.as_ref().map(Snapshot::captured_on),
            pages_fetched: paged.pages_fetched,
            discovered: paged.identities,
            summary,
            failures: harvest.failures,
            artifact,
            records,
        })
    }
}
