pub mod artifact;
pub mod store;

pub use artifact::{artifact_date, read_artifact, write_artifact};
pub use store::CsvSnapshotStore;
