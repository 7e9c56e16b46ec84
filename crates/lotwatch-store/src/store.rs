use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use lotwatch_core::diff::ChangeRecord;
use lotwatch_core::error::AppError;
use lotwatch_core::snapshot::Snapshot;
use lotwatch_core::traits::SnapshotStore;

use crate::artifact::{artifact_date, read_artifact, write_artifact};

/// Snapshot store keeping one `YYYY-MM-DD.csv` artifact per run in a directory.
#[derive(Debug, Clone)]
pub struct CsvSnapshotStore {
    dir: PathBuf,
}

impl CsvSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `date`.
    pub fn artifact_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    /// Most recent artifact dated strictly before `today`.
    pub fn latest_before(&self, today: NaiveDate) -> Result<Option<PathBuf>, AppError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::StoreError(format!(
                    "Failed to list {}: {e}",
                    self.dir.display()
                )));
            }
        };

        let mut latest: Option<(NaiveDate, PathBuf)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(date) = artifact_date(&path) else {
                continue;
            };
            if date < today && latest.as_ref().is_none_or(|(best, _)| date > *best) {
                latest = Some((date, path));
            }
        }
        Ok(latest.map(|(_, path)| path))
    }
}

async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::StoreError(format!("Store task failed: {e}")))?
}

impl SnapshotStore for CsvSnapshotStore {
    async fn load_prior(&self, today: NaiveDate) -> Result<Option<Snapshot>, AppError> {
        let Some(path) = self.latest_before(today)? else {
            tracing::info!(dir = %self.dir.display(), "No prior snapshot found");
            return Ok(None);
        };

        tracing::info!(path = %path.display(), "Loading prior snapshot");
        let snapshot = blocking(move || read_artifact(&path)).await?;
        tracing::info!(
            captured_on = %snapshot.captured_on(),
            active = snapshot.len(),
            "Prior snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    async fn save(
        &self,
        current: &Snapshot,
        records: &[ChangeRecord],
    ) -> Result<Option<PathBuf>, AppError> {
        let path = self.artifact_path(current.captured_on());
        let dir = self.dir.clone();
        let target = path.clone();
        let rows = records.len();
        let records = records.to_vec();

        blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::StoreError(format!("Failed to create {}: {e}", dir.display()))
            })?;
            write_artifact(&target, &records)
        })
        .await?;

        tracing::debug!(path = %path.display(), rows, "Artifact written");
        Ok(Some(path))
    }
}
