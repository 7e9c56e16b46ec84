use chrono::NaiveDate;
use lotwatch_core::listing::{Field, Listing};
use lotwatch_store::CsvSnapshotStore;
use tempfile::TempDir;

/// A store rooted in a fresh temporary directory.
///
/// The `TempDir` must be kept in scope for the test duration; dropping it
/// deletes the directory.
pub fn temp_store() -> (CsvSnapshotStore, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = CsvSnapshotStore::new(dir.path().join("snapshots"));
    (store, dir)
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).expect("valid date")
}

pub fn car(id: u32, price: &str, mileage: &str) -> Listing {
    Listing::new(format!("https://www.lindacars.com/en/ad/{id}"))
        .with(Field::Make, "Jetour")
        .with(Field::Model, "Jetour T2")
        .with(Field::Description, "Jetour T2")
        .with(Field::Price, price)
        .with(Field::Mileage, mileage)
        .with(Field::Year, "2024")
        .with_images(vec![
            format!("https://content.deal-drive.com/thumbs/a{id}/fit-1324xauto/1.jpg"),
            format!("https://content.deal-drive.com/thumbs/b{id}/fit-1324xauto/2.jpg"),
        ])
}
