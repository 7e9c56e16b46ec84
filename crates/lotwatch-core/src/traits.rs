use std::future::Future;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::diff::ChangeRecord;
use crate::error::AppError;
use crate::harvest::RunReport;
use crate::models::RawListing;
use crate::snapshot::Snapshot;

/// Fetches the raw HTML of an index or detail page.
pub trait Fetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Applies a site's selector schema to fetched HTML.
pub trait ListingParser: Send + Sync + Clone + 'static {
    /// Listing links found on one index page, as written in the document.
    fn index_links(&self, html: &str) -> Result<Vec<String>, AppError>;

    /// Read the raw fields of one detail page.
    ///
    /// A page that has not rendered yet is [`AppError::PageNotReady`];
    /// otherwise selectors that match nothing yield empty values.
    fn parse_detail(&self, html: &str) -> Result<RawListing, AppError>;
}

/// Loads the most recent prior snapshot and persists the current run.
pub trait SnapshotStore: Send + Sync + Clone {
    /// Most recent snapshot captured strictly before `today`, if any.
    fn load_prior(
        &self,
        today: NaiveDate,
    ) -> impl Future<Output = Result<Option<Snapshot>, AppError>> + Send;

    /// Persist the dated artifact for this run. Returns where it was written.
    fn save(
        &self,
        current: &Snapshot,
        records: &[ChangeRecord],
    ) -> impl Future<Output = Result<Option<PathBuf>, AppError>> + Send;
}

/// Delivers a finished run's report (console, mail, ...).
pub trait ReportEmitter: Send + Sync {
    fn emit(&self, report: &RunReport) -> impl Future<Output = Result<(), AppError>> + Send;
}
