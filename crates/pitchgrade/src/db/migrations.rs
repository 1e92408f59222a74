//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const CREATE_APPLICATIONS: &str = "
CREATE TABLE IF NOT EXISTS applications (
    id              TEXT PRIMARY KEY,
    answers         TEXT NOT NULL DEFAULT '{}',
    registration    TEXT,
    stage           TEXT,
    startup_stage   TEXT,
    eval_status     TEXT NOT NULL DEFAULT 'pending',
    overall_score   REAL,
    evaluation      TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
";

const CREATE_EVAL_JOBS: &str = "
CREATE TABLE IF NOT EXISTS eval_jobs (
    id              TEXT PRIMARY KEY,
    application_id  TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'queued',
    retry_count     INTEGER NOT NULL DEFAULT 0,
    max_retries     INTEGER NOT NULL DEFAULT 3,
    last_error      TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    started_at      TEXT,
    completed_at    TEXT,
    next_attempt_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_eval_jobs_status ON eval_jobs(status);
CREATE INDEX IF NOT EXISTS idx_eval_jobs_application ON eval_jobs(application_id);
";

// Enforces the single-active-job invariant at the storage layer: at most
// one non-terminal job may exist per application.
const CREATE_ACTIVE_JOB_INDEX: &str = "
CREATE UNIQUE INDEX IF NOT EXISTS idx_eval_jobs_active
    ON eval_jobs(application_id)
    WHERE status IN ('queued', 'processing', 'retrying');
";

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_applications_table",
        sql: CREATE_APPLICATIONS,
    },
    Migration {
        version: 2,
        description: "create_eval_jobs_table",
        sql: CREATE_EVAL_JOBS,
    },
    Migration {
        version: 3,
        description: "create_active_job_unique_index",
        sql: CREATE_ACTIVE_JOB_INDEX,
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    // Create the migrations tracking table.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();
        // Running again should be a no-op.
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_active_job_index_rejects_second_active_job() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO eval_jobs (id, application_id, status, created_at, updated_at)
             VALUES ('j1', 'app-1', 'queued', '2026-01-01', '2026-01-01')",
            [],
        )
        .unwrap();

        let second = conn.execute(
            "INSERT INTO eval_jobs (id, application_id, status, created_at, updated_at)
             VALUES ('j2', 'app-1', 'processing', '2026-01-01', '2026-01-01')",
            [],
        );
        assert!(second.is_err());
    }

    #[test]
    fn test_active_job_index_allows_terminal_duplicates() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO eval_jobs (id, application_id, status, created_at, updated_at)
             VALUES ('j1', 'app-1', 'completed', '2026-01-01', '2026-01-01')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO eval_jobs (id, application_id, status, created_at, updated_at)
             VALUES ('j2', 'app-1', 'queued', '2026-01-02', '2026-01-02')",
            [],
        )
        .unwrap();
    }
}
