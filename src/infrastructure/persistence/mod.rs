pub mod database;
pub mod snapshot_repository;

pub use database::Database;
pub use snapshot_repository::SqliteSnapshotRepository;
