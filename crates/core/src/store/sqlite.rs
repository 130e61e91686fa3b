//! `SqliteStore`: a [`Store`] backed by `rusqlite`, hosted behind a
//! dedicated actor thread.
//!
//! `rusqlite::Connection` is `!Sync`, so it cannot be shared directly with
//! the async engine. We host the connection in a background thread and
//! communicate over channels, mirroring the index actor's own state
//! database handle.

use std::fmt;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use tokio::sync::oneshot;
use verscan_schema::{Checksum, SoftwarePackage, SoftwareVersion, StaticFile, Vendor};

use super::{IndexedVersion, PathEntropy, Store, StoreError};

enum DbEvent {
    UsersByChecksum {
        checksum: Checksum,
        resp: oneshot::Sender<Result<Vec<IndexedVersion>, StoreError>>,
    },
    ExpectedByWebrootPath {
        webroot_path: String,
        resp: oneshot::Sender<Result<Vec<IndexedVersion>, StoreError>>,
    },
    AllIndexedVersions {
        resp: oneshot::Sender<Result<Vec<IndexedVersion>, StoreError>>,
    },
    IdfWeight {
        checksum: Checksum,
        resp: oneshot::Sender<Result<f64, StoreError>>,
    },
    KnownStaticFiles {
        checksum: Checksum,
        resp: oneshot::Sender<Result<Vec<StaticFile>, StoreError>>,
    },
    IndexedVersionCount {
        resp: oneshot::Sender<Result<u64, StoreError>>,
    },
    HighEntropyPaths {
        candidate_version_ids: Vec<i64>,
        exclude: Vec<String>,
        limit: usize,
        resp: oneshot::Sender<Result<Vec<PathEntropy>, StoreError>>,
    },
    InsertPackage {
        package: SoftwarePackage,
        resp: oneshot::Sender<Result<i64, StoreError>>,
    },
    InsertVersion {
        package_id: i64,
        internal_identifier: String,
        display_name: String,
        release_date: DateTime<Utc>,
        resp: oneshot::Sender<Result<i64, StoreError>>,
    },
    InsertStaticFile {
        file: StaticFile,
        resp: oneshot::Sender<Result<i64, StoreError>>,
    },
    BulkInsertStaticFiles {
        files: Vec<StaticFile>,
        resp: oneshot::Sender<Result<Vec<i64>, StoreError>>,
    },
    LinkUse {
        version_id: i64,
        static_file_id: i64,
        resp: oneshot::Sender<Result<(), StoreError>>,
    },
    BulkLinkUses {
        pairs: Vec<(i64, i64)>,
        resp: oneshot::Sender<Result<(), StoreError>>,
    },
    MarkIndexed {
        version_id: i64,
        resp: oneshot::Sender<Result<(), StoreError>>,
    },
    DeleteVersion {
        version_id: i64,
        resp: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// A cheap, `Clone + Send + Sync` handle to the actor thread hosting the
/// SQLite connection.
#[derive(Clone)]
pub struct SqliteStore {
    sender: mpsc::Sender<DbEvent>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (creating if necessary) the database at `path` and spawn its
    /// actor thread.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the connection cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::spawn(conn)
    }

    /// Open an in-memory database, primarily for tests.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::spawn(conn)
    }

    fn spawn(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .or_else(|_| conn.execute_batch("PRAGMA foreign_keys=ON;"))?;
        migrate(&conn)?;

        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || run_event_loop(conn, receiver));
        Ok(Self { sender })
    }

    async fn request<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(oneshot::Sender<Result<T, StoreError>>) -> DbEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(f(tx))
            .map_err(|_| StoreError::ActorDied)?;
        rx.await.map_err(|_| StoreError::ActorDied)?
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS software_package (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            vendor TEXT NOT NULL,
            alternative_names TEXT NOT NULL DEFAULT '',
            UNIQUE(name, vendor)
        );
        CREATE TABLE IF NOT EXISTS software_version (
            id INTEGER PRIMARY KEY,
            software_package_id INTEGER NOT NULL REFERENCES software_package(id) ON DELETE CASCADE,
            internal_identifier TEXT NOT NULL,
            display_name TEXT NOT NULL,
            release_date TEXT NOT NULL,
            indexed INTEGER NOT NULL DEFAULT 0,
            UNIQUE(software_package_id, internal_identifier)
        );
        CREATE TABLE IF NOT EXISTS static_file (
            id INTEGER PRIMARY KEY,
            source_path TEXT NOT NULL,
            webroot_path TEXT NOT NULL,
            checksum BLOB NOT NULL,
            UNIQUE(source_path, webroot_path, checksum)
        );
        CREATE INDEX IF NOT EXISTS idx_static_file_checksum ON static_file(checksum);
        CREATE INDEX IF NOT EXISTS idx_static_file_webroot_path ON static_file(webroot_path);
        CREATE TABLE IF NOT EXISTS static_file_use (
            software_version_id INTEGER NOT NULL REFERENCES software_version(id) ON DELETE CASCADE,
            static_file_id INTEGER NOT NULL REFERENCES static_file(id) ON DELETE CASCADE,
            PRIMARY KEY (software_version_id, static_file_id)
        );
        ",
    )?;
    Ok(())
}

fn run_event_loop(conn: Connection, receiver: mpsc::Receiver<DbEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            DbEvent::UsersByChecksum { checksum, resp } => {
                let _ = resp.send(users_by_checksum(&conn, checksum));
            }
            DbEvent::ExpectedByWebrootPath { webroot_path, resp } => {
                let _ = resp.send(expected_by_webroot_path(&conn, &webroot_path));
            }
            DbEvent::AllIndexedVersions { resp } => {
                let _ = resp.send(all_indexed_versions(&conn));
            }
            DbEvent::IdfWeight { checksum, resp } => {
                let _ = resp.send(idf_weight(&conn, checksum));
            }
            DbEvent::KnownStaticFiles { checksum, resp } => {
                let _ = resp.send(known_static_files(&conn, checksum));
            }
            DbEvent::IndexedVersionCount { resp } => {
                let _ = resp.send(indexed_version_count(&conn));
            }
            DbEvent::HighEntropyPaths {
                candidate_version_ids,
                exclude,
                limit,
                resp,
            } => {
                let _ = resp.send(high_entropy_paths(
                    &conn,
                    &candidate_version_ids,
                    &exclude,
                    limit,
                ));
            }
            DbEvent::InsertPackage { package, resp } => {
                let _ = resp.send(insert_package(&conn, &package));
            }
            DbEvent::InsertVersion {
                package_id,
                internal_identifier,
                display_name,
                release_date,
                resp,
            } => {
                let _ = resp.send(insert_version(
                    &conn,
                    package_id,
                    &internal_identifier,
                    &display_name,
                    release_date,
                ));
            }
            DbEvent::InsertStaticFile { file, resp } => {
                let _ = resp.send(insert_static_file(&conn, &file));
            }
            DbEvent::BulkInsertStaticFiles { files, resp } => {
                let _ = resp.send(bulk_insert_static_files(&conn, &files));
            }
            DbEvent::LinkUse {
                version_id,
                static_file_id,
                resp,
            } => {
                let _ = resp.send(link_use(&conn, version_id, static_file_id));
            }
            DbEvent::BulkLinkUses { pairs, resp } => {
                let _ = resp.send(bulk_link_uses(&conn, &pairs));
            }
            DbEvent::MarkIndexed { version_id, resp } => {
                let _ = resp.send(mark_indexed(&conn, version_id));
            }
            DbEvent::DeleteVersion { version_id, resp } => {
                let _ = resp.send(delete_version(&conn, version_id));
            }
        }
    }
}

const SELECT_INDEXED_VERSION: &str = "
    SELECT v.id, p.name, p.vendor, p.alternative_names, v.internal_identifier,
           v.display_name, v.release_date, v.indexed
    FROM software_version v
    JOIN software_package p ON p.id = v.software_package_id
";

fn row_to_indexed_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexedVersion> {
    let id: i64 = row.get(0)?;
    let name: String = row.get(1)?;
    let vendor: String = row.get(2)?;
    let alternative_names: String = row.get(3)?;
    let internal_identifier: String = row.get(4)?;
    let display_name: String = row.get(5)?;
    let release_date: String = row.get(6)?;
    let indexed: i64 = row.get(7)?;

    let mut package = SoftwarePackage::new(name, Vendor::from(vendor.as_str()));
    package.alternative_names = alternative_names
        .split('\u{1f}')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    let release_date = DateTime::parse_from_rfc3339(&release_date)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(IndexedVersion {
        id,
        version: SoftwareVersion {
            package,
            internal_identifier,
            display_name,
            release_date,
            indexed: indexed != 0,
        },
    })
}

fn users_by_checksum(conn: &Connection, checksum: Checksum) -> Result<Vec<IndexedVersion>, StoreError> {
    let sql = format!(
        "{SELECT_INDEXED_VERSION}
         WHERE v.id IN (
             SELECT us.software_version_id FROM static_file_use us
             JOIN static_file sf ON sf.id = us.static_file_id
             WHERE sf.checksum = ?1)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![checksum.as_bytes().as_slice()], row_to_indexed_version)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

fn expected_by_webroot_path(
    conn: &Connection,
    webroot_path: &str,
) -> Result<Vec<IndexedVersion>, StoreError> {
    let sql = format!(
        "{SELECT_INDEXED_VERSION}
         WHERE v.id IN (
             SELECT us.software_version_id FROM static_file_use us
             JOIN static_file sf ON sf.id = us.static_file_id
             WHERE sf.webroot_path = ?1)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![webroot_path], row_to_indexed_version)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

fn all_indexed_versions(conn: &Connection) -> Result<Vec<IndexedVersion>, StoreError> {
    let sql = format!("{SELECT_INDEXED_VERSION} WHERE v.indexed = 1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_indexed_version)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

fn indexed_version_count(conn: &Connection) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM software_version WHERE indexed = 1",
        [],
        |r| r.get(0),
    )?;
    Ok(count.max(0) as u64)
}

fn idf_weight(conn: &Connection, checksum: Checksum) -> Result<f64, StoreError> {
    let total = indexed_version_count(conn)?;
    if total == 0 {
        return Ok(0.0);
    }
    let using: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT us.software_version_id)
         FROM static_file_use us
         JOIN static_file sf ON sf.id = us.static_file_id
         JOIN software_version v ON v.id = us.software_version_id
         WHERE sf.checksum = ?1 AND v.indexed = 1",
        params![checksum.as_bytes().as_slice()],
        |r| r.get(0),
    )?;
    if using == 0 {
        return Ok(1.0);
    }
    Ok((total as f64 / using as f64).log10().max(0.0))
}

fn high_entropy_paths(
    conn: &Connection,
    candidate_version_ids: &[i64],
    exclude: &[String],
    limit: usize,
) -> Result<Vec<PathEntropy>, StoreError> {
    if candidate_version_ids.is_empty() {
        return Ok(Vec::new());
    }
    let candidate_placeholders = placeholders(candidate_version_ids.len());
    let mut sql = format!(
        "SELECT subquery.webroot_path, subquery.version_count, subquery.checksum_count
         FROM (
             SELECT sf.webroot_path,
                    COUNT(DISTINCT us.software_version_id) version_count,
                    COUNT(DISTINCT sf.checksum) checksum_count
             FROM static_file sf
             JOIN static_file_use us ON us.static_file_id = sf.id
             WHERE us.software_version_id IN ({candidate_placeholders})"
    );
    let mut params: Vec<rusqlite::types::Value> = candidate_version_ids
        .iter()
        .map(|id| rusqlite::types::Value::Integer(*id))
        .collect();
    if !exclude.is_empty() {
        let exclude_placeholders = placeholders(exclude.len());
        sql.push_str(&format!(" AND sf.webroot_path NOT IN ({exclude_placeholders})"));
        params.extend(
            exclude
                .iter()
                .map(|p| rusqlite::types::Value::Text(p.clone())),
        );
    }
    sql.push_str(
        " GROUP BY sf.webroot_path) subquery
         WHERE NOT (subquery.version_count = ?",
    );
    let total_candidates_idx = params.len() + 1;
    sql.push_str(&total_candidates_idx.to_string());
    sql.push_str(
        " AND subquery.checksum_count = 1)
         ORDER BY (subquery.version_count + subquery.checksum_count) DESC, subquery.webroot_path ASC
         LIMIT ?",
    );
    let limit_idx = total_candidates_idx + 1;
    sql.push_str(&limit_idx.to_string());

    params.push(rusqlite::types::Value::Integer(candidate_version_ids.len() as i64));
    params.push(rusqlite::types::Value::Integer(limit as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        Ok(PathEntropy {
            webroot_path: row.get(0)?,
            version_count: row.get::<_, i64>(1)? as u64,
            checksum_count: row.get::<_, i64>(2)? as u64,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

fn placeholders(n: usize) -> String {
    std::iter::repeat_n("?", n).collect::<Vec<_>>().join(", ")
}

fn insert_package(conn: &Connection, package: &SoftwarePackage) -> Result<i64, StoreError> {
    let alt = package.alternative_names.join("\u{1f}");
    conn.execute(
        "INSERT INTO software_package (name, vendor, alternative_names) VALUES (?1, ?2, ?3)
         ON CONFLICT(name, vendor) DO UPDATE SET alternative_names = excluded.alternative_names",
        params![package.name.as_str(), package.vendor.as_str(), alt],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM software_package WHERE name = ?1 AND vendor = ?2",
        params![package.name.as_str(), package.vendor.as_str()],
        |r| r.get(0),
    )?;
    Ok(id)
}

fn insert_version(
    conn: &Connection,
    package_id: i64,
    internal_identifier: &str,
    display_name: &str,
    release_date: DateTime<Utc>,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO software_version (software_package_id, internal_identifier, display_name, release_date)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(software_package_id, internal_identifier) DO UPDATE SET display_name = excluded.display_name",
        params![package_id, internal_identifier, display_name, release_date.to_rfc3339()],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM software_version WHERE software_package_id = ?1 AND internal_identifier = ?2",
        params![package_id, internal_identifier],
        |r| r.get(0),
    )?;
    Ok(id)
}

fn insert_static_file(conn: &Connection, file: &StaticFile) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO static_file (source_path, webroot_path, checksum) VALUES (?1, ?2, ?3)
         ON CONFLICT(source_path, webroot_path, checksum) DO NOTHING",
        params![file.source_path, file.webroot_path, file.checksum.as_bytes().as_slice()],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM static_file WHERE source_path = ?1 AND webroot_path = ?2 AND checksum = ?3",
        params![file.source_path, file.webroot_path, file.checksum.as_bytes().as_slice()],
        |r| r.get(0),
    )?;
    Ok(id)
}

fn bulk_insert_static_files(
    conn: &Connection,
    files: &[StaticFile],
) -> Result<Vec<i64>, StoreError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let mut ids = Vec::with_capacity(files.len());
    for file in files {
        match insert_static_file(conn, file) {
            Ok(id) => ids.push(id),
            Err(err) => {
                conn.execute_batch("ROLLBACK")?;
                return Err(err);
            }
        }
    }
    conn.execute_batch("COMMIT")?;
    Ok(ids)
}

fn known_static_files(conn: &Connection, checksum: Checksum) -> Result<Vec<StaticFile>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT source_path, webroot_path, checksum FROM static_file WHERE checksum = ?1",
    )?;
    let rows = stmt.query_map(params![checksum.as_bytes().as_slice()], |r| {
        let raw: Vec<u8> = r.get(2)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&raw);
        Ok(StaticFile {
            source_path: r.get(0)?,
            webroot_path: r.get(1)?,
            checksum: Checksum::from_bytes(bytes),
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

fn link_use(conn: &Connection, version_id: i64, static_file_id: i64) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO static_file_use (software_version_id, static_file_id) VALUES (?1, ?2)",
        params![version_id, static_file_id],
    )?;
    Ok(())
}

fn bulk_link_uses(conn: &Connection, pairs: &[(i64, i64)]) -> Result<(), StoreError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    for (version_id, static_file_id) in pairs {
        if let Err(err) = link_use(conn, *version_id, *static_file_id) {
            conn.execute_batch("ROLLBACK")?;
            return Err(err);
        }
    }
    conn.execute_batch("COMMIT")?;
    Ok(())
}

fn mark_indexed(conn: &Connection, version_id: i64) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE software_version SET indexed = 1 WHERE id = ?1",
        params![version_id],
    )?;
    if changed == 0 {
        return Err(StoreError::UnknownVersion(version_id));
    }
    Ok(())
}

fn delete_version(conn: &Connection, version_id: i64) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM software_version WHERE id = ?1",
        params![version_id],
    )?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn users_by_checksum(&self, checksum: Checksum) -> Result<Vec<IndexedVersion>, StoreError> {
        self.request(|resp| DbEvent::UsersByChecksum { checksum, resp }).await
    }

    async fn expected_by_webroot_path(
        &self,
        webroot_path: &str,
    ) -> Result<Vec<IndexedVersion>, StoreError> {
        let webroot_path = webroot_path.to_owned();
        self.request(|resp| DbEvent::ExpectedByWebrootPath { webroot_path, resp })
            .await
    }

    async fn all_indexed_versions(&self) -> Result<Vec<IndexedVersion>, StoreError> {
        self.request(|resp| DbEvent::AllIndexedVersions { resp }).await
    }

    async fn idf_weight(&self, checksum: Checksum) -> Result<f64, StoreError> {
        self.request(|resp| DbEvent::IdfWeight { checksum, resp }).await
    }

    async fn indexed_version_count(&self) -> Result<u64, StoreError> {
        self.request(|resp| DbEvent::IndexedVersionCount { resp }).await
    }

    async fn high_entropy_paths(
        &self,
        candidate_version_ids: &[i64],
        exclude: &[String],
        limit: usize,
    ) -> Result<Vec<PathEntropy>, StoreError> {
        let candidate_version_ids = candidate_version_ids.to_vec();
        let exclude = exclude.to_vec();
        self.request(|resp| DbEvent::HighEntropyPaths {
            candidate_version_ids,
            exclude,
            limit,
            resp,
        })
        .await
    }

    async fn insert_package(&self, package: &SoftwarePackage) -> Result<i64, StoreError> {
        let package = package.clone();
        self.request(|resp| DbEvent::InsertPackage { package, resp }).await
    }

    async fn insert_version(
        &self,
        package_id: i64,
        internal_identifier: &str,
        display_name: &str,
        release_date: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let internal_identifier = internal_identifier.to_owned();
        let display_name = display_name.to_owned();
        self.request(|resp| DbEvent::InsertVersion {
            package_id,
            internal_identifier,
            display_name,
            release_date,
            resp,
        })
        .await
    }

    async fn insert_static_file(&self, file: &StaticFile) -> Result<i64, StoreError> {
        let file = file.clone();
        self.request(|resp| DbEvent::InsertStaticFile { file, resp }).await
    }

    async fn bulk_insert_static_files(&self, files: &[StaticFile]) -> Result<Vec<i64>, StoreError> {
        let files = files.to_vec();
        self.request(|resp| DbEvent::BulkInsertStaticFiles { files, resp })
            .await
    }

    async fn known_static_files(&self, checksum: Checksum) -> Result<Vec<StaticFile>, StoreError> {
        self.request(|resp| DbEvent::KnownStaticFiles { checksum, resp })
            .await
    }

    async fn link_use(&self, version_id: i64, static_file_id: i64) -> Result<(), StoreError> {
        self.request(|resp| DbEvent::LinkUse {
            version_id,
            static_file_id,
            resp,
        })
        .await
    }

    async fn bulk_link_uses(&self, pairs: &[(i64, i64)]) -> Result<(), StoreError> {
        let pairs = pairs.to_vec();
        self.request(|resp| DbEvent::BulkLinkUses { pairs, resp }).await
    }

    async fn mark_indexed(&self, version_id: i64) -> Result<(), StoreError> {
        self.request(|resp| DbEvent::MarkIndexed { version_id, resp }).await
    }

    async fn delete_version(&self, version_id: i64) -> Result<(), StoreError> {
        self.request(|resp| DbEvent::DeleteVersion { version_id, resp }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verscan_schema::PackageName;

    fn sample_package() -> SoftwarePackage {
        SoftwarePackage::new("WordPress", Vendor::from("Automattic"))
    }

    fn static_file(source_path: &str, webroot_path: &str, checksum: Checksum) -> StaticFile {
        StaticFile {
            source_path: source_path.to_string(),
            webroot_path: webroot_path.to_string(),
            checksum,
        }
    }

    #[tokio::test]
    async fn insert_and_query_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let package_id = store.insert_package(&sample_package()).await.unwrap();
        let version_id = store
            .insert_version(package_id, "6.4.0", "6.4", Utc::now())
            .await
            .unwrap();
        store.mark_indexed(version_id).await.unwrap();

        let checksum = Checksum::from_bytes([7u8; 16]);
        let file_id = store
            .insert_static_file(&static_file(
                "wp-includes/js/wp-emoji.js",
                "wp-includes/js/wp-emoji.js",
                checksum,
            ))
            .await
            .unwrap();
        store.link_use(version_id, file_id).await.unwrap();

        let users = store.users_by_checksum(checksum).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].version.package.name, PackageName::from("WordPress"));

        let count = store.indexed_version_count().await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn high_entropy_paths_excludes_universal_unanimous() {
        let store = SqliteStore::open_in_memory().unwrap();
        let package_id = store.insert_package(&sample_package()).await.unwrap();
        let v1 = store.insert_version(package_id, "1.0", "1.0", Utc::now()).await.unwrap();
        let v2 = store.insert_version(package_id, "2.0", "2.0", Utc::now()).await.unwrap();
        store.mark_indexed(v1).await.unwrap();
        store.mark_indexed(v2).await.unwrap();

        let shared = Checksum::from_bytes([1u8; 16]);
        let shared_id = store
            .insert_static_file(&static_file("readme.txt", "readme.txt", shared))
            .await
            .unwrap();
        store.link_use(v1, shared_id).await.unwrap();
        store.link_use(v2, shared_id).await.unwrap();

        let distinct_a = Checksum::from_bytes([2u8; 16]);
        let distinct_b = Checksum::from_bytes([3u8; 16]);
        let file_a = store
            .insert_static_file(&static_file("style.css", "style.css", distinct_a))
            .await
            .unwrap();
        let file_b = store
            .insert_static_file(&static_file("style.css", "style.css", distinct_b))
            .await
            .unwrap();
        store.link_use(v1, file_a).await.unwrap();
        store.link_use(v2, file_b).await.unwrap();

        let paths = store
            .high_entropy_paths(&[v1, v2], &[], 10)
            .await
            .unwrap();
        assert!(paths.iter().any(|p| p.webroot_path == "style.css"));
        assert!(!paths.iter().any(|p| p.webroot_path == "readme.txt"));
    }

    #[tokio::test]
    async fn bulk_insert_and_link_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let package_id = store.insert_package(&sample_package()).await.unwrap();
        let version_id = store
            .insert_version(package_id, "6.4.0", "6.4", Utc::now())
            .await
            .unwrap();
        store.mark_indexed(version_id).await.unwrap();

        let files = vec![
            StaticFile {
                source_path: "wp-includes/js/wp-emoji.js".to_string(),
                webroot_path: "wp-includes/js/wp-emoji.js".to_string(),
                checksum: Checksum::from_bytes([1u8; 16]),
            },
            StaticFile {
                source_path: "wp-includes/css/dashicons.css".to_string(),
                webroot_path: "wp-includes/css/dashicons.css".to_string(),
                checksum: Checksum::from_bytes([2u8; 16]),
            },
        ];
        let ids = store.bulk_insert_static_files(&files).await.unwrap();
        assert_eq!(ids.len(), 2);

        let pairs: Vec<(i64, i64)> = ids.iter().map(|&id| (version_id, id)).collect();
        store.bulk_link_uses(&pairs).await.unwrap();

        let users = store
            .users_by_checksum(Checksum::from_bytes([2u8; 16]))
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn packages_with_same_name_different_vendor_are_distinct() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store
            .insert_package(&SoftwarePackage::new("commerce", Vendor::from("acme")))
            .await
            .unwrap();
        let b = store
            .insert_package(&SoftwarePackage::new("commerce", Vendor::from("other-corp")))
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn static_files_colliding_on_webroot_and_checksum_stay_distinct_by_source_path() {
        let store = SqliteStore::open_in_memory().unwrap();
        let checksum = Checksum::from_bytes([9u8; 16]);
        let a = store
            .insert_static_file(&static_file("themes/a/style.css", "style.css", checksum))
            .await
            .unwrap();
        let b = store
            .insert_static_file(&static_file("themes/b/style.css", "style.css", checksum))
            .await
            .unwrap();
        assert_ne!(a, b);

        let known = store.known_static_files(checksum).await.unwrap();
        assert_eq!(known.len(), 2);
    }
}
