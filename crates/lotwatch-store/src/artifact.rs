//! The dated CSV artifact: one row per change record.

use std::path::Path;

use chrono::NaiveDate;
use lotwatch_core::diff::{ChangeRecord, ChangeStatus};
use lotwatch_core::error::AppError;
use lotwatch_core::listing::{Field, Listing};
use lotwatch_core::snapshot::Snapshot;

pub const URL_COLUMN: &str = "ad_url";
pub const IMAGES_COLUMN: &str = "Images";
pub const DATE_COLUMN: &str = "Scraped_Date";
pub const STATUS_COLUMN: &str = "Status";
pub const DETAILS_COLUMN: &str = "Change_Details";
pub const PREV_PRICE_COLUMN: &str = "Prev_Price";
pub const PREV_MILEAGE_COLUMN: &str = "Prev_Mileage";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn store_err(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::StoreError(format!("{}: {e}", path.display()))
}

/// Header row: `ad_url`, the field columns, then the run columns.
pub fn header() -> Vec<&'static str> {
    let mut columns = vec![URL_COLUMN];
    columns.extend(Field::ALL.iter().map(Field::column));
    columns.extend([
        IMAGES_COLUMN,
        DATE_COLUMN,
        STATUS_COLUMN,
        DETAILS_COLUMN,
        PREV_PRICE_COLUMN,
        PREV_MILEAGE_COLUMN,
    ]);
    columns
}

fn record_row(record: &ChangeRecord) -> Vec<String> {
    let listing = &record.listing;
    let mut row = vec![listing.url().to_string()];
    row.extend(Field::ALL.iter().map(|f| listing.get(*f).to_string()));
    row.extend([
        listing.images().join(","),
        record.observed_on.format(DATE_FORMAT).to_string(),
        record.status.as_str().to_string(),
        record.change_details(),
        record.previous(Field::Price).to_string(),
        record.previous(Field::Mileage).to_string(),
    ]);
    row
}

/// Write `records` to `path` as a CSV artifact, replacing any existing file.
///
/// The file is written beside the target and renamed into place, so a crash
/// never leaves a truncated artifact under the dated name.
pub fn write_artifact(path: &Path, records: &[ChangeRecord]) -> Result<(), AppError> {
    let partial = path.with_extension("csv.partial");
    {
        let mut writer = csv::Writer::from_path(&partial).map_err(|e| store_err(&partial, e))?;
        writer
            .write_record(header())
            .map_err(|e| store_err(&partial, e))?;
        for record in records {
            writer
                .write_record(record_row(record))
                .map_err(|e| store_err(&partial, e))?;
        }
        writer.flush().map_err(|e| store_err(&partial, e))?;
    }
    std::fs::rename(&partial, path).map_err(|e| store_err(path, e))
}

/// Capture date encoded in an artifact file name (`YYYY-MM-DD.csv`).
pub fn artifact_date(path: &Path) -> Option<NaiveDate> {
    if path.extension().and_then(|e| e.to_str()) != Some("csv") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
}

/// Read an artifact back as the snapshot of listings that were active in it.
///
/// REMOVED rows are skipped since those listings were already gone. Missing
/// columns read as empty values. The capture date comes from the file name,
/// falling back to the latest `Scraped_Date` of an active row.
pub fn read_artifact(path: &Path) -> Result<Snapshot, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| store_err(path, e))?;

    let headers = reader.headers().map_err(|e| store_err(path, e))?.clone();
    let index_of = |name: &str| headers.iter().position(|h| h.trim() == name);
    let url_idx = index_of(URL_COLUMN)
        .ok_or_else(|| store_err(path, format!("missing '{URL_COLUMN}' column")))?;
    let field_idx: Vec<(Field, usize)> = Field::ALL
        .iter()
        .filter_map(|f| index_of(f.column()).map(|i| (*f, i)))
        .collect();
    let images_idx = index_of(IMAGES_COLUMN);
    let date_idx = index_of(DATE_COLUMN);
    let status_idx = index_of(STATUS_COLUMN);

    let mut listings = Vec::new();
    let mut latest_seen: Option<NaiveDate> = None;

    for row in reader.records() {
        let row = row.map_err(|e| store_err(path, e))?;
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or("").trim();

        let status = cell(status_idx);
        if status.eq_ignore_ascii_case(ChangeStatus::Removed.as_str()) {
            continue;
        }
        let url = cell(Some(url_idx));
        if url.is_empty() {
            continue;
        }

        if let Ok(date) = NaiveDate::parse_from_str(cell(date_idx), DATE_FORMAT) {
            latest_seen = latest_seen.max(Some(date));
        }

        let images = cell(images_idx)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let listing = field_idx
            .iter()
            .fold(Listing::new(url), |listing, (field, i)| {
                listing.with(*field, cell(Some(*i)))
            })
            .with_images(images);
        listings.push(listing);
    }

    let captured_on = artifact_date(path)
        .or(latest_seen)
        .ok_or_else(|| store_err(path, "cannot determine capture date"))?;
    Snapshot::from_listings(captured_on, listings)
}
