use lotwatch_core::diff::{ChangeStatus, ChangeSummary, diff_snapshots};
use lotwatch_core::error::AppError;
use lotwatch_core::listing::Field;
use lotwatch_core::snapshot::Snapshot;
use lotwatch_core::traits::SnapshotStore;
use lotwatch_store::{CsvSnapshotStore, read_artifact};

use crate::common::{car, day, temp_store};

async fn run(store: &CsvSnapshotStore, current: Snapshot) -> Vec<lotwatch_core::ChangeRecord> {
    let prior = store.load_prior(current.captured_on()).await.unwrap();
    let records = diff_snapshots(prior.as_ref(), &current);
    store.save(&current, &records).await.unwrap();
    records
}

fn read_rows(path: &std::path::Path) -> (csv::StringRecord, Vec<csv::StringRecord>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let rows = reader.records().map(Result::unwrap).collect();
    (headers, rows)
}

fn column<'a>(headers: &csv::StringRecord, row: &'a csv::StringRecord, name: &str) -> &'a str {
    let idx = headers.iter().position(|h| h == name).unwrap();
    &row[idx]
}

#[tokio::test]
async fn missing_directory_means_first_run() {
    let (store, _dir) = temp_store();
    assert!(store.load_prior(day(10)).await.unwrap().is_none());
}

#[tokio::test]
async fn save_then_load_round_trips_listings() {
    let (store, _dir) = temp_store();
    let first = Snapshot::from_listings(day(10), [car(1, "100", "10 km"), car(2, "200", "20 km")])
        .unwrap();

    let path = store
        .save(&first, &diff_snapshots(None, &first))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(path, store.dir().join("2025-03-10.csv"));

    let prior = store.load_prior(day(11)).await.unwrap().unwrap();
    assert_eq!(prior.captured_on(), day(10));
    assert_eq!(prior.len(), 2);
    let id = "https://www.lindacars.com/en/ad/1";
    assert_eq!(prior.get(id), first.get(id));
}

#[tokio::test]
async fn prior_is_latest_strictly_before_today() {
    let (store, _dir) = temp_store();
    for d in [3, 7, 12] {
        let snap = Snapshot::from_listings(day(d), [car(d, "1", "1")]).unwrap();
        run(&store, snap).await;
    }
    std::fs::write(store.dir().join("notes.csv"), "ad_url\nx\n").unwrap();

    let prior = store.load_prior(day(12)).await.unwrap().unwrap();
    assert_eq!(prior.captured_on(), day(7));

    let prior = store.load_prior(day(8)).await.unwrap().unwrap();
    assert_eq!(prior.captured_on(), day(7));

    assert!(store.load_prior(day(3)).await.unwrap().is_none());
}

#[tokio::test]
async fn artifact_carries_change_columns() {
    let (store, _dir) = temp_store();
    run(
        &store,
        Snapshot::from_listings(day(10), [car(1, "100", "10 km"), car(2, "200", "20 km")])
            .unwrap(),
    )
    .await;

    let records = run(
        &store,
        Snapshot::from_listings(day(11), [car(1, "90", "12 km"), car(3, "300", "30 km")])
            .unwrap(),
    )
    .await;

    let summary = ChangeSummary::from_records(&records);
    assert_eq!(
        (summary.new, summary.updated, summary.unchanged, summary.removed),
        (1, 1, 0, 1)
    );

    let (headers, rows) = read_rows(&store.dir().join("2025-03-11.csv"));
    assert_eq!(rows.len(), 3);

    let updated = rows
        .iter()
        .find(|r| column(&headers, r, "Status") == "UPDATED")
        .unwrap();
    assert_eq!(
        column(&headers, updated, "Change_Details"),
        "Price: 100 -> 90 | Mileage: 10 km -> 12 km"
    );
    assert_eq!(column(&headers, updated, "Prev_Price"), "100");
    assert_eq!(column(&headers, updated, "Prev_Mileage"), "10 km");
    assert_eq!(column(&headers, updated, "Scraped_Date"), "2025-03-11");
    assert_eq!(column(&headers, updated, "Images").split(',').count(), 2);

    let removed = rows
        .iter()
        .find(|r| column(&headers, r, "Status") == "REMOVED")
        .unwrap();
    assert!(column(&headers, removed, "ad_url").ends_with("/ad/2"));
    assert_eq!(column(&headers, removed, "Scraped_Date"), "2025-03-10");
    assert_eq!(column(&headers, removed, "Change_Details"), "");
    assert_eq!(column(&headers, removed, "Prev_Price"), "");
}

#[tokio::test]
async fn removed_rows_are_not_part_of_the_baseline() {
    let (store, _dir) = temp_store();
    let both = Snapshot::from_listings(day(10), [car(1, "1", "1"), car(2, "2", "2")]).unwrap();
    run(&store, both).await;
    run(&store, Snapshot::from_listings(day(11), [car(1, "1", "1")]).unwrap()).await;

    let prior = store.load_prior(day(12)).await.unwrap().unwrap();
    assert_eq!(prior.len(), 1);

    let records = run(&store, Snapshot::from_listings(day(12), [car(1, "1", "1")]).unwrap()).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ChangeStatus::Unchanged);
}

#[tokio::test]
async fn missing_columns_read_as_empty() {
    let (_store, dir) = temp_store();
    let path = dir.path().join("2025-03-09.csv");
    std::fs::write(
        &path,
        "ad_url,Make,Price,Status\n\
         https://www.lindacars.com/en/ad/1,Jetour,100,NEW\n\
         https://www.lindacars.com/en/ad/2,Jetour,200,removed\n",
    )
    .unwrap();

    let snapshot = read_artifact(&path).unwrap();
    assert_eq!(snapshot.captured_on(), day(9));
    assert_eq!(snapshot.len(), 1);
    let listing = snapshot.get("https://www.lindacars.com/en/ad/1").unwrap();
    assert_eq!(listing.get(Field::Price), "100");
    assert_eq!(listing.get(Field::Mileage), "");
    assert!(listing.images().is_empty());
}

#[tokio::test]
async fn duplicate_rows_and_missing_url_column_are_errors() {
    let (_store, dir) = temp_store();
    let dup = dir.path().join("2025-03-09.csv");
    std::fs::write(&dup, "ad_url,Price\nhttps://a.example/1,1\nhttps://a.example/1,2\n").unwrap();
    assert!(matches!(
        read_artifact(&dup).unwrap_err(),
        AppError::DuplicateIdentity(_)
    ));

    let no_url = dir.path().join("2025-03-08.csv");
    std::fs::write(&no_url, "Make,Price\nJetour,1\n").unwrap();
    assert!(matches!(
        read_artifact(&no_url).unwrap_err(),
        AppError::StoreError(_)
    ));
}

#[tokio::test]
async fn unreadable_prior_surfaces_as_store_error() {
    let (store, _dir) = temp_store();
    std::fs::create_dir_all(store.dir()).unwrap();
    std::fs::write(store.dir().join("2025-03-09.csv"), "Make\nJetour\n").unwrap();

    let err = store.load_prior(day(10)).await.unwrap_err();
    assert!(matches!(err, AppError::StoreError(_)));
}

#[tokio::test]
async fn prior_with_repeated_identity_is_a_duplicate_error() {
    let (store, _dir) = temp_store();
    std::fs::create_dir_all(store.dir()).unwrap();
    std::fs::write(
        store.dir().join("2025-03-09.csv"),
        "ad_url,Price,Status\n\
         https://www.lindacars.com/en/ad/9,100,NEW\n\
         https://www.lindacars.com/en/ad/9,120,NEW\n",
    )
    .unwrap();

    let err = store.load_prior(day(10)).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateIdentity(_)));
    assert!(err.is_fatal());
}
