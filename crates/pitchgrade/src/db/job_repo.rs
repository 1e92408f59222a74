//! Job repository — CRUD operations for the `eval_jobs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw evaluation job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub application_id: String,
    pub status: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub next_attempt_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            application_id: row.get("application_id")?,
            status: row.get("status")?,
            retry_count: row.get("retry_count")?,
            max_retries: row.get("max_retries")?,
            last_error: row.get("last_error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            next_attempt_at: row.get("next_attempt_at")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<String>,
    pub application_id: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub exclude_status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row. The partial unique index on active jobs makes
/// this fail when the application already has a non-terminal job.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO eval_jobs (id, application_id, status, retry_count, max_retries,
             last_error, created_at, updated_at, started_at, completed_at, next_attempt_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                job.id,
                job.application_id,
                job.status,
                job.retry_count,
                job.max_retries,
                job.last_error,
                job.created_at,
                job.updated_at,
                job.started_at,
                job.completed_at,
                job.next_attempt_at,
            ],
        )?;
        Ok(())
    })
}

/// Updates an existing job row. All fields except `id`, `application_id`
/// and `created_at` are overwritten.
pub fn update(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE eval_jobs SET status=?2, retry_count=?3, max_retries=?4, last_error=?5,
             updated_at=?6, started_at=?7, completed_at=?8, next_attempt_at=?9
             WHERE id=?1",
            params![
                job.id,
                job.status,
                job.retry_count,
                job.max_retries,
                job.last_error,
                job.updated_at,
                job.started_at,
                job.completed_at,
                job.next_attempt_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM eval_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds the active (non-terminal) job for an application, if any.
pub fn find_active_for_application(
    db: &Database,
    application_id: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM eval_jobs
             WHERE application_id = ?1 AND status IN ('queued', 'processing', 'retrying')",
        )?;
        let mut rows = stmt.query_map(params![application_id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns queued jobs in FIFO order, oldest first.
pub fn find_queued(db: &Database, limit: u64) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM eval_jobs WHERE status = 'queued'
             ORDER BY created_at ASC LIMIT ?1",
        )?;
        let rows: Vec<JobRow> = stmt
            .query_map(params![limit as i64], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns retrying jobs whose backoff deadline has passed.
pub fn find_due_retries(db: &Database, now: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM eval_jobs
             WHERE status = 'retrying' AND next_attempt_at IS NOT NULL AND next_attempt_at <= ?1
             ORDER BY next_attempt_at ASC",
        )?;
        let rows: Vec<JobRow> = stmt
            .query_map(params![now], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns all non-terminal jobs, used to rebuild the in-memory cache
/// and to recover claims after a restart.
pub fn find_all_active(db: &Database) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM eval_jobs
             WHERE status IN ('queued', 'processing', 'retrying')
             ORDER BY created_at ASC",
        )?;
        let rows: Vec<JobRow> = stmt
            .query_map([], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Queries jobs with filters, returning (rows, total_count). Listing
/// order is newest first.
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }
        if let Some(ref application_id) = filter.application_id {
            conditions.push(format!("application_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(application_id.clone()));
        }
        if let Some(ref from_date) = filter.from_date {
            conditions.push(format!("created_at >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from_date.clone()));
        }
        if let Some(ref to_date) = filter.to_date {
            conditions.push(format!("created_at <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to_date.clone()));
        }
        if let Some(ref exclude_status) = filter.exclude_status {
            conditions.push(format!("status != ?{}", param_values.len() + 1));
            param_values.push(Box::new(exclude_status.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM eval_jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM eval_jobs {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM eval_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Deletes terminal jobs completed before the cutoff. Active jobs are
/// never touched. Returns the number of rows removed.
pub fn delete_terminal_before(db: &Database, cutoff: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM eval_jobs
             WHERE status IN ('completed', 'failed')
               AND COALESCE(completed_at, updated_at) < ?1",
            params![cutoff],
        )?;
        Ok(removed as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(id: &str, application_id: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            application_id: application_id.to_string(),
            status: "queued".to_string(),
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            started_at: None,
            completed_at: None,
            next_attempt_at: None,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_job("j1", "app-1")).unwrap();

        let found = find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(found.application_id, "app-1");
        assert_eq!(found.status, "queued");
        assert_eq!(found.retry_count, 0);
    }

    #[test]
    fn test_second_active_job_is_rejected() {
        let db = test_db();
        insert(&db, &sample_job("j1", "app-1")).unwrap();

        let second = insert(&db, &sample_job("j2", "app-1"));
        assert!(second.is_err());
    }

    #[test]
    fn test_active_lookup() {
        let db = test_db();
        insert(&db, &sample_job("j1", "app-1")).unwrap();

        let active = find_active_for_application(&db, "app-1").unwrap();
        assert_eq!(active.unwrap().id, "j1");
        assert!(find_active_for_application(&db, "app-2").unwrap().is_none());
    }

    #[test]
    fn test_terminal_job_is_not_active() {
        let db = test_db();
        let mut job = sample_job("j1", "app-1");
        job.status = "completed".to_string();
        insert(&db, &job).unwrap();

        assert!(find_active_for_application(&db, "app-1").unwrap().is_none());
    }

    #[test]
    fn test_queued_jobs_come_back_fifo() {
        let db = test_db();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut job = sample_job(id, &format!("app-{}", id));
            job.created_at = format!("2026-01-0{}T00:00:00Z", i + 1);
            insert(&db, &job).unwrap();
        }

        let queued = find_queued(&db, 10).unwrap();
        let ids: Vec<&str> = queued.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_due_retries() {
        let db = test_db();
        let mut due = sample_job("due", "app-1");
        due.status = "retrying".to_string();
        due.next_attempt_at = Some("2026-01-01T00:00:30Z".to_string());
        insert(&db, &due).unwrap();

        let mut later = sample_job("later", "app-2");
        later.status = "retrying".to_string();
        later.next_attempt_at = Some("2026-01-01T00:05:00Z".to_string());
        insert(&db, &later).unwrap();

        let rows = find_due_retries(&db, "2026-01-01T00:01:00Z").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "due");
    }

    #[test]
    fn test_update_bumps_fields() {
        let db = test_db();
        let mut job = sample_job("j1", "app-1");
        insert(&db, &job).unwrap();

        job.status = "retrying".to_string();
        job.retry_count = 1;
        job.last_error = Some("oracle timed out".to_string());
        job.next_attempt_at = Some("2026-01-01T00:00:30Z".to_string());
        update(&db, &job).unwrap();

        let found = find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(found.status, "retrying");
        assert_eq!(found.retry_count, 1);
        assert_eq!(found.last_error.as_deref(), Some("oracle timed out"));
    }

    #[test]
    fn test_query_with_application_filter() {
        let db = test_db();
        insert(&db, &sample_job("j1", "app-1")).unwrap();
        insert(&db, &sample_job("j2", "app-2")).unwrap();

        let (rows, total) = query(
            &db,
            &JobFilter {
                application_id: Some("app-2".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, "j2");
    }

    #[test]
    fn test_query_pagination() {
        let db = test_db();
        for i in 0..8 {
            let mut job = sample_job(&format!("p{}", i), &format!("app-{}", i));
            job.created_at = format!("2026-01-{:02}T00:00:00Z", i + 1);
            insert(&db, &job).unwrap();
        }

        let (rows, total) = query(
            &db,
            &JobFilter {
                limit: Some(3),
                offset: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 8);
        assert_eq!(rows.len(), 3);
        // Newest first.
        assert_eq!(rows[0].id, "p7");
    }

    #[test]
    fn test_count_by_status() {
        let db = test_db();
        insert(&db, &sample_job("j1", "app-1")).unwrap();
        let mut failed = sample_job("j2", "app-2");
        failed.status = "failed".to_string();
        insert(&db, &failed).unwrap();

        assert_eq!(count_by_status(&db, "queued").unwrap(), 1);
        assert_eq!(count_by_status(&db, "failed").unwrap(), 1);
        assert_eq!(count_by_status(&db, "completed").unwrap(), 0);
    }

    #[test]
    fn test_cleanup_only_removes_old_terminal_jobs() {
        let db = test_db();

        let mut old_done = sample_job("old", "app-1");
        old_done.status = "completed".to_string();
        old_done.completed_at = Some("2026-01-01T00:00:00Z".to_string());
        insert(&db, &old_done).unwrap();

        let mut fresh_done = sample_job("fresh", "app-2");
        fresh_done.status = "completed".to_string();
        fresh_done.completed_at = Some("2026-02-01T00:00:00Z".to_string());
        insert(&db, &fresh_done).unwrap();

        let mut active = sample_job("active", "app-3");
        active.created_at = "2025-01-01T00:00:00Z".to_string();
        insert(&db, &active).unwrap();

        let removed = delete_terminal_before(&db, "2026-01-15T00:00:00Z").unwrap();
        assert_eq!(removed, 1);
        assert!(find_by_id(&db, "old").unwrap().is_none());
        assert!(find_by_id(&db, "fresh").unwrap().is_some());
        assert!(find_by_id(&db, "active").unwrap().is_some());
    }
}
