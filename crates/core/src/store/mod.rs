//! The index store: persisted knowledge of which software versions ship
//! which static files at which webroot paths (§6 "Index store").

mod sqlite;

use async_trait::async_trait;
use thiserror::Error;
use verscan_schema::{Checksum, SoftwarePackage, SoftwareVersion, StaticFile};

pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store actor thread is gone")]
    ActorDied,
    #[error("no software version with id {0}")]
    UnknownVersion(i64),
}

/// One row of the `high_entropy_paths` query result (§4.4.3 step 3a): a
/// webroot path ranked by how much it narrows down the set of plausible
/// versions.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEntropy {
    pub webroot_path: String,
    pub version_count: u64,
    pub checksum_count: u64,
}

/// A [`SoftwareVersion`] paired with its store-assigned row id. The engine
/// tracks ids rather than re-resolving them on every query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVersion {
    pub id: i64,
    pub version: SoftwareVersion,
}

/// Read/write access to the persisted package, version, and static-file
/// catalog. Implemented by [`SqliteStore`]; the trait exists so the engine
/// and its tests can run against an in-memory fake.
#[async_trait]
pub trait Store: Send + Sync {
    /// Versions known to use the static file with this checksum.
    async fn users_by_checksum(
        &self,
        checksum: Checksum,
    ) -> Result<Vec<IndexedVersion>, StoreError>;

    /// Every version expected to ship *some* file at `webroot_path`,
    /// regardless of its content.
    async fn expected_by_webroot_path(
        &self,
        webroot_path: &str,
    ) -> Result<Vec<IndexedVersion>, StoreError>;

    /// All indexed versions, the universe `analyze()` starts guessing from.
    async fn all_indexed_versions(&self) -> Result<Vec<IndexedVersion>, StoreError>;

    /// Index rows matching this checksum, regardless of which versions use
    /// them (§3 "Asset", `known_static_files`).
    async fn known_static_files(&self, checksum: Checksum) -> Result<Vec<StaticFile>, StoreError>;

    /// Inverse document frequency weight for a checksum: a file shared by
    /// almost every indexed version is less informative as a positive match
    /// than one only a handful of versions ship (§4.2 "IDF weight", grounded
    /// on `Asset.idf_weight` keying on checksum rather than path).
    async fn idf_weight(&self, checksum: Checksum) -> Result<f64, StoreError>;

    /// Total count of indexed software versions, the denominator behind
    /// `idf_weight`.
    async fn indexed_version_count(&self) -> Result<u64, StoreError>;

    /// Candidate probe paths ranked by entropy among `candidate_version_ids`,
    /// skipping `exclude` (paths already probed this run) and paths every
    /// candidate ships with an identical checksum -- those can't
    /// discriminate further (§4.4.3 step 3a, the `generic_db`
    /// `retrieve_webroot_paths_with_high_entropy` query).
    async fn high_entropy_paths(
        &self,
        candidate_version_ids: &[i64],
        exclude: &[String],
        limit: usize,
    ) -> Result<Vec<PathEntropy>, StoreError>;

    /// Register (or fetch the existing id of) a package.
    async fn insert_package(&self, package: &SoftwarePackage) -> Result<i64, StoreError>;

    /// Register a software version under `package_id`.
    async fn insert_version(
        &self,
        package_id: i64,
        internal_identifier: &str,
        display_name: &str,
        release_date: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64, StoreError>;

    /// Register a static file's checksum at `webroot_path`.
    async fn insert_static_file(&self, file: &StaticFile) -> Result<i64, StoreError>;

    /// Register many static files in a single transaction, returning their
    /// ids in the same order as `files` -- transactionally equivalent to
    /// calling `insert_static_file` once per entry, but without a round trip
    /// per row (§4.2 "Additional write-side operations").
    async fn bulk_insert_static_files(&self, files: &[StaticFile]) -> Result<Vec<i64>, StoreError>;

    /// Link a static file as used by a version.
    async fn link_use(&self, version_id: i64, static_file_id: i64) -> Result<(), StoreError>;

    /// Link many `(version_id, static_file_id)` pairs in a single
    /// transaction.
    async fn bulk_link_uses(&self, pairs: &[(i64, i64)]) -> Result<(), StoreError>;

    /// Mark a version as fully indexed (counted by `idf_weight` and
    /// `indexed_version_count`).
    async fn mark_indexed(&self, version_id: i64) -> Result<(), StoreError>;

    /// Remove a version and its static-file links.
    async fn delete_version(&self, version_id: i64) -> Result<(), StoreError>;
}
