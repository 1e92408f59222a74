//! Evaluation job model and retry policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::db::job_repo::JobRow;

/// Job lifecycle status.
///
/// Legal transitions: queued → processing, processing → completed,
/// processing → retrying, processing → failed, retrying → queued, and
/// failed → queued via explicit operator retry. `Completed` and `Failed`
/// are terminal for the worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parses a stored status string. Unknown values become `Queued`
    /// with a warning so a corrupted row is re-run rather than stuck.
    pub fn parse(s: &str, job_id: &str) -> Self {
        match s {
            "queued" => JobStatus::Queued,
            "processing" => JobStatus::Processing,
            "retrying" => JobStatus::Retrying,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            other => {
                log::warn!(
                    "Unknown job status '{}' for job {}, defaulting to queued",
                    other,
                    job_id
                );
                JobStatus::Queued
            }
        }
    }

    /// Terminal statuses never change again except through an explicit
    /// operator retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backoff delays by attempt number: first retry after 30s, second
/// after 2m, third and beyond after 5m.
pub const DEFAULT_BACKOFF_SCHEDULE: &[Duration] = &[
    Duration::from_secs(30),
    Duration::from_secs(120),
    Duration::from_secs(300),
];

/// Returns the delay before retry number `attempt` (1-based). Attempts
/// past the end of the schedule reuse the final entry.
pub fn next_delay(schedule: &[Duration], attempt: u32) -> Duration {
    if schedule.is_empty() {
        return Duration::ZERO;
    }
    let index = (attempt.max(1) as usize - 1).min(schedule.len() - 1);
    schedule[index]
}

/// One evaluation job: the unit the worker claims and runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationJob {
    pub id: String,
    pub application_id: String,
    pub status: JobStatus,
    /// Number of failed attempts so far.
    pub retry_count: u32,
    /// Retry ceiling; the job fails terminally once `retry_count`
    /// reaches it.
    pub max_retries: u32,
    /// Message from the most recent failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the current (or last) attempt started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Earliest time a retrying job may be re-queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl EvaluationJob {
    /// Creates a fresh queued job for an application.
    pub fn new(application_id: impl Into<String>, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            application_id: application_id.into(),
            status: JobStatus::Queued,
            retry_count: 0,
            max_retries,
            last_error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            next_attempt_at: None,
        }
    }

    pub fn from_row(row: JobRow) -> Self {
        let status = JobStatus::parse(&row.status, &row.id);
        Self {
            status,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            last_error: row.last_error,
            created_at: crate::db::parse_timestamp(&row.created_at),
            updated_at: crate::db::parse_timestamp(&row.updated_at),
            started_at: row.started_at.as_deref().map(crate::db::parse_timestamp),
            completed_at: row.completed_at.as_deref().map(crate::db::parse_timestamp),
            next_attempt_at: row
                .next_attempt_at
                .as_deref()
                .map(crate::db::parse_timestamp),
            id: row.id,
            application_id: row.application_id,
        }
    }

    pub fn to_row(&self) -> JobRow {
        JobRow {
            id: self.id.clone(),
            application_id: self.application_id.clone(),
            status: self.status.as_str().to_string(),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            last_error: self.last_error.clone(),
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
            started_at: self.started_at.map(|t| t.to_rfc3339()),
            completed_at: self.completed_at.map(|t| t.to_rfc3339()),
            next_attempt_at: self.next_attempt_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Retrying,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str(), "j1"), status);
        }
    }

    #[test]
    fn test_unknown_status_defaults_to_queued() {
        assert_eq!(JobStatus::parse("exploded", "j1"), JobStatus::Queued);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_backoff_schedule_values() {
        assert_eq!(
            next_delay(DEFAULT_BACKOFF_SCHEDULE, 1),
            Duration::from_secs(30)
        );
        assert_eq!(
            next_delay(DEFAULT_BACKOFF_SCHEDULE, 2),
            Duration::from_secs(120)
        );
        assert_eq!(
            next_delay(DEFAULT_BACKOFF_SCHEDULE, 3),
            Duration::from_secs(300)
        );
        // Past the end of the table the last entry repeats.
        assert_eq!(
            next_delay(DEFAULT_BACKOFF_SCHEDULE, 7),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_backoff_handles_degenerate_inputs() {
        assert_eq!(next_delay(&[], 1), Duration::ZERO);
        assert_eq!(
            next_delay(DEFAULT_BACKOFF_SCHEDULE, 0),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = EvaluationJob::new("app-1", 3);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert!(job.next_attempt_at.is_none());
        assert!(!job.id.is_empty());
    }

    #[test]
    fn test_row_round_trip() {
        let mut job = EvaluationJob::new("app-1", 3);
        job.status = JobStatus::Retrying;
        job.retry_count = 2;
        job.last_error = Some("oracle timed out".to_string());
        job.next_attempt_at = Some(Utc::now());

        let back = EvaluationJob::from_row(job.to_row());
        assert_eq!(back.id, job.id);
        assert_eq!(back.status, JobStatus::Retrying);
        assert_eq!(back.retry_count, 2);
        assert_eq!(back.last_error, job.last_error);
        assert!(back.next_attempt_at.is_some());
    }
}
