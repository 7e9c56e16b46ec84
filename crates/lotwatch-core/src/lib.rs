pub mod assemble;
pub mod config;
pub mod diff;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod listing;
pub mod models;
pub mod pagination;
pub mod pool;
pub mod snapshot;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use assemble::{AssemblyRules, LabelMap};
pub use config::{HarvestConfig, RetryPolicy};
pub use diff::{ChangeRecord, ChangeStatus, ChangeSummary, FieldChange, diff_snapshots};
pub use error::AppError;
pub use harvest::{HarvestService, RunReport};
pub use listing::{Field, Listing, MUTABLE_FIELDS};
pub use models::{ExtractionFailure, FailureKind, IndexSource, ModelRow, RawListing};
pub use pool::{HarvestEvent, HarvestReporter, TracingHarvestReporter};
pub use snapshot::Snapshot;
pub use traits::{Fetcher, ListingParser, ReportEmitter, SnapshotStore};
