//! Snapshot diff: classifies every identity of the prior and current
//! snapshots as NEW, UPDATED, UNCHANGED or REMOVED.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::listing::{Field, Listing, MUTABLE_FIELDS};
use crate::snapshot::Snapshot;

/// Classification of one identity across two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    New,
    Updated,
    Unchanged,
    Removed,
}

impl ChangeStatus {
    pub const ALL: [ChangeStatus; 4] = [
        ChangeStatus::New,
        ChangeStatus::Updated,
        ChangeStatus::Unchanged,
        ChangeStatus::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::New => "NEW",
            ChangeStatus::Updated => "UPDATED",
            ChangeStatus::Unchanged => "UNCHANGED",
            ChangeStatus::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChangeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NEW" => Ok(ChangeStatus::New),
            "UPDATED" => Ok(ChangeStatus::Updated),
            "UNCHANGED" => Ok(ChangeStatus::Unchanged),
            "REMOVED" => Ok(ChangeStatus::Removed),
            _ => Err(format!("Unknown change status: {}", s)),
        }
    }
}

/// A single mutable field that differs between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: Field,
    pub previous: String,
    pub current: String,
}

/// Diff result for one identity.
///
/// `listing` holds the current values, except for REMOVED where it is the
/// prior listing. `changes` is non-empty exactly when the status is UPDATED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub status: ChangeStatus,
    pub listing: Listing,
    pub changes: Vec<FieldChange>,
    /// Capture date of the snapshot `listing` comes from.
    pub observed_on: NaiveDate,
}

impl ChangeRecord {
    pub fn identity(&self) -> &str {
        self.listing.url()
    }

    /// Human-readable change description, e.g. `Price: 100 -> 90 | Mileage: 10 -> 12`.
    pub fn change_details(&self) -> String {
        self.changes
            .iter()
            .map(|c| format!("{}: {} -> {}", c.field, c.previous, c.current))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Previous value of a mutable field; empty unless the record is UPDATED.
    ///
    /// A field that did not change reports its current value, which equals
    /// the previous one.
    pub fn previous(&self, field: Field) -> &str {
        if self.status != ChangeStatus::Updated {
            return "";
        }
        self.changes
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.previous.as_str())
            .unwrap_or_else(|| self.listing.get(field))
    }
}

/// Compare the current snapshot against the prior one.
///
/// Emits one record per identity in the union of both snapshots, ordered by
/// identity. With no prior snapshot every current listing is NEW.
pub fn diff_snapshots(prior: Option<&Snapshot>, current: &Snapshot) -> Vec<ChangeRecord> {
    let Some(prior) = prior else {
        return current
            .iter()
            .map(|listing| ChangeRecord {
                status: ChangeStatus::New,
                listing: listing.clone(),
                changes: Vec::new(),
                observed_on: current.captured_on(),
            })
            .collect();
    };

    let identities: BTreeSet<&str> = prior.identities().chain(current.identities()).collect();

    identities
        .into_iter()
        .filter_map(|id| match (prior.get(id), current.get(id)) {
            (None, Some(now)) => Some(ChangeRecord {
                status: ChangeStatus::New,
                listing: now.clone(),
                changes: Vec::new(),
                observed_on: current.captured_on(),
            }),
            (Some(before), None) => Some(ChangeRecord {
                status: ChangeStatus::Removed,
                listing: before.clone(),
                changes: Vec::new(),
                observed_on: prior.captured_on(),
            }),
            (Some(before), Some(now)) => {
                let changes = mutable_changes(before, now);
                let status = if changes.is_empty() {
                    ChangeStatus::Unchanged
                } else {
                    ChangeStatus::Updated
                };
                Some(ChangeRecord {
                    status,
                    listing: now.clone(),
                    changes,
                    observed_on: current.captured_on(),
                })
            }
            (None, None) => None,
        })
        .collect()
}

fn mutable_changes(before: &Listing, now: &Listing) -> Vec<FieldChange> {
    MUTABLE_FIELDS
        .iter()
        .filter(|f| before.get(**f) != now.get(**f))
        .map(|f| FieldChange {
            field: *f,
            previous: before.get(*f).to_string(),
            current: now.get(*f).to_string(),
        })
        .collect()
}

/// Per-status counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
}

impl ChangeSummary {
    pub fn from_records(records: &[ChangeRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.status {
                ChangeStatus::New => summary.new += 1,
                ChangeStatus::Updated => summary.updated += 1,
                ChangeStatus::Unchanged => summary.unchanged += 1,
                ChangeStatus::Removed => summary.removed += 1,
            }
        }
        summary
    }

    pub fn count(&self, status: ChangeStatus) -> usize {
        match status {
            ChangeStatus::New => self.new,
            ChangeStatus::Updated => self.updated,
            ChangeStatus::Unchanged => self.unchanged,
            ChangeStatus::Removed => self.removed,
        }
    }

    pub fn total(&self) -> usize {
        self.new + self.updated + self.unchanged + self.removed
    }
}
