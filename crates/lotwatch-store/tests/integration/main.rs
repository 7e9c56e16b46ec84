mod common;
mod snapshot_tests;
