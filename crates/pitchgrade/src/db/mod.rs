//! SQLite persistence for applications and evaluation jobs.
//!
//! A single `Database` handle is shared between the host process and
//! the background worker thread; all access goes through one
//! `Mutex<Connection>`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod application_repo;
pub mod error;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

/// How long SQLite waits on a locked database file before giving up.
/// External processes (backups, sqlite3 shells) hold locks briefly;
/// the worker should ride those out rather than fail the job.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Cloneable handle over a single rusqlite connection.
///
/// The worker thread and the enqueue/status callers on the host side
/// hold clones of the same handle; the inner `Mutex` serializes them,
/// which matches SQLite's own single-writer model. File-backed
/// databases run in WAL mode so status dashboards can read while the
/// worker writes.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::bootstrap(conn).inspect(|_| log::info!("Database opened at {}", path.display()))
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys=ON; PRAGMA busy_timeout={};",
            BUSY_TIMEOUT_MS
        ))?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// Parses a stored timestamp, tolerating bare dates from older rows.
/// Unparseable values fall back to the Unix epoch with a warning.
pub(crate) fn parse_timestamp(raw: &str) -> chrono::DateTime<chrono::Utc> {
    use chrono::{DateTime, NaiveDate, Utc};

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return dt.and_utc();
        }
    }
    log::warn!("Unparseable timestamp '{}', falling back to epoch", raw);
    DateTime::<Utc>::UNIX_EPOCH
}

/// Returns the canonical database path: `~/.pitchgrade/data/pitchgrade.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".pitchgrade").join("data").join("pitchgrade.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
            assert!(count > 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
            assert!(count > 0);
            Ok(())
        })
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_file_db_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("pragmas.db")).unwrap();
        db.with_conn(|conn| {
            let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
            assert_eq!(mode, "wal");
            let busy: u32 = conn.query_row("PRAGMA busy_timeout", [], |r| r.get(0))?;
            assert_eq!(busy, BUSY_TIMEOUT_MS);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.ends_with("pitchgrade.db"));
        assert!(path.to_string_lossy().contains(".pitchgrade"));
    }

    #[test]
    fn test_database_is_clone() {
        let db = Database::open_in_memory().unwrap();
        let db2 = db.clone();
        // Both should access the same underlying connection.
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO applications (id, answers, eval_status, created_at, updated_at)
                 VALUES ('a1', '{}', 'pending', '2026-01-01', '2026-01-01')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        db2.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM applications", [], |r| r.get(0))?;
            assert_eq!(count, 1);
            Ok(())
        })
        .unwrap();
    }
}
