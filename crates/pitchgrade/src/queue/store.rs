//! Persistence-backed evaluation queue with an in-memory active-job
//! cache.
//!
//! SQLite is the source of truth; the cache only holds non-terminal
//! jobs and is rebuilt from the database on startup. Every mutation
//! writes through to the database before the cache is touched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::job::{next_delay, EvaluationJob, JobStatus};
use super::QueueError;
use crate::application::EvalStatus;
use crate::db::job_repo::{self, JobFilter};
use crate::db::{application_repo, Database};
use crate::events::{JobEvent, JobEventBroadcaster};
use crate::notify::AlertSink;

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queued: u64,
    pub processing: u64,
    pub retrying: u64,
    pub completed: u64,
    pub failed: u64,
}

/// The evaluation job queue.
pub struct EvaluationQueue {
    db: Database,
    cache: Mutex<HashMap<String, EvaluationJob>>,
    backoff: Vec<Duration>,
    events: JobEventBroadcaster,
    alerts: Arc<dyn AlertSink>,
}

impl EvaluationQueue {
    /// Creates the queue, recovering any jobs a previous run left
    /// claimed: `processing` rows are from a dead worker and go back to
    /// `queued` without consuming a retry.
    pub fn new(
        db: Database,
        backoff: Vec<Duration>,
        events: JobEventBroadcaster,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self, QueueError> {
        let queue = Self {
            db,
            cache: Mutex::new(HashMap::new()),
            backoff,
            events,
            alerts,
        };
        queue.recover_stale_claims()?;
        queue.reload_cache()?;
        Ok(queue)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, EvaluationJob>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reload_cache(&self) -> Result<(), QueueError> {
        let rows = job_repo::find_all_active(&self.db)?;
        let mut cache = self.lock_cache();
        cache.clear();
        for row in rows {
            let job = EvaluationJob::from_row(row);
            cache.insert(job.id.clone(), job);
        }
        Ok(())
    }

    fn recover_stale_claims(&self) -> Result<(), QueueError> {
        let (rows, _) = job_repo::query(
            &self.db,
            &JobFilter {
                status: Some(JobStatus::Processing.as_str().to_string()),
                ..Default::default()
            },
        )?;
        for row in rows {
            let mut job = EvaluationJob::from_row(row);
            log::warn!(
                "Recovering stale claim on job {} (application {})",
                job.id,
                job.application_id
            );
            job.status = JobStatus::Queued;
            job.started_at = None;
            job.updated_at = Utc::now();
            job_repo::update(&self.db, &job.to_row())?;
        }
        Ok(())
    }

    fn persist(&self, job: &EvaluationJob) -> Result<(), QueueError> {
        job_repo::update(&self.db, &job.to_row())?;
        let mut cache = self.lock_cache();
        if job.status.is_terminal() {
            cache.remove(&job.id);
        } else {
            cache.insert(job.id.clone(), job.clone());
        }
        Ok(())
    }

    /// Enqueues an evaluation for an application. If the application
    /// already has an active job the existing job is returned instead
    /// of creating a duplicate.
    pub fn enqueue(
        &self,
        application_id: &str,
        max_retries: u32,
    ) -> Result<EvaluationJob, QueueError> {
        if let Some(existing) = job_repo::find_active_for_application(&self.db, application_id)? {
            let job = EvaluationJob::from_row(existing);
            log::debug!(
                "Application {} already has active job {}, coalescing",
                application_id,
                job.id
            );
            return Ok(job);
        }

        let job = EvaluationJob::new(application_id, max_retries);
        match job_repo::insert(&self.db, &job.to_row()) {
            Ok(()) => {}
            Err(e) => {
                // Lost a race against a concurrent enqueue; the unique
                // index guarantees the winner's job exists.
                if let Some(existing) =
                    job_repo::find_active_for_application(&self.db, application_id)?
                {
                    return Ok(EvaluationJob::from_row(existing));
                }
                return Err(e.into());
            }
        }

        self.lock_cache().insert(job.id.clone(), job.clone());
        self.events.send(JobEvent::Queued {
            job_id: job.id.clone(),
            application_id: job.application_id.clone(),
        });
        log::info!(
            "Enqueued evaluation job {} for application {}",
            job.id,
            job.application_id
        );
        Ok(job)
    }

    /// Moves retrying jobs whose backoff deadline has passed back to
    /// the queue. Returns how many were released.
    pub fn release_due_retries(&self, now: DateTime<Utc>) -> Result<u64, QueueError> {
        let rows = job_repo::find_due_retries(&self.db, &now.to_rfc3339())?;
        let released = rows.len() as u64;
        for row in rows {
            let mut job = EvaluationJob::from_row(row);
            job.status = JobStatus::Queued;
            job.next_attempt_at = None;
            job.updated_at = now;
            self.persist(&job)?;
            log::debug!(
                "Job {} backoff elapsed, re-queued (attempt {})",
                job.id,
                job.retry_count + 1
            );
        }
        Ok(released)
    }

    /// Claims up to `limit` queued jobs for processing, oldest first.
    /// Due retries are released first so they rejoin the same pass.
    pub fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<EvaluationJob>, QueueError> {
        self.release_due_retries(now)?;

        let rows = job_repo::find_queued(&self.db, limit)?;
        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut job = EvaluationJob::from_row(row);
            job.status = JobStatus::Processing;
            job.started_at = Some(now);
            job.updated_at = now;
            self.persist(&job)?;
            self.events.send(JobEvent::Started {
                job_id: job.id.clone(),
                application_id: job.application_id.clone(),
                attempt: job.retry_count + 1,
            });
            claimed.push(job);
        }
        Ok(claimed)
    }

    fn expect_processing(&self, job_id: &str) -> Result<EvaluationJob, QueueError> {
        let row = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        let job = EvaluationJob::from_row(row);
        if job.status != JobStatus::Processing {
            return Err(QueueError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: JobStatus::Completed,
            });
        }
        Ok(job)
    }

    /// Marks a processing job as successfully completed.
    pub fn mark_completed(&self, job_id: &str, average: f64) -> Result<(), QueueError> {
        let mut job = self.expect_processing(job_id)?;
        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.updated_at = now;
        job.last_error = None;
        self.persist(&job)?;
        self.events.send(JobEvent::Completed {
            job_id: job.id.clone(),
            application_id: job.application_id.clone(),
            average,
        });
        log::info!(
            "Job {} completed for application {} (average {:.1})",
            job.id,
            job.application_id,
            average
        );
        Ok(())
    }

    /// Records a failed attempt. Schedules a retry with backoff until
    /// the ceiling is hit, then fails the job terminally and alerts.
    pub fn mark_attempt_failed(&self, job_id: &str, error: &str) -> Result<(), QueueError> {
        let mut job = self.expect_processing(job_id)?;
        let now = Utc::now();
        job.retry_count += 1;
        job.last_error = Some(error.to_string());
        job.updated_at = now;

        if job.retry_count >= job.max_retries {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.next_attempt_at = None;
            self.persist(&job)?;
            application_repo::update_eval_status(&self.db, &job.application_id, EvalStatus::Failed)?;
            self.alerts.job_failed(&job, error);
            self.events.send(JobEvent::Failed {
                job_id: job.id.clone(),
                application_id: job.application_id.clone(),
                error: error.to_string(),
            });
        } else {
            let delay = next_delay(&self.backoff, job.retry_count);
            job.status = JobStatus::Retrying;
            job.next_attempt_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.persist(&job)?;
            application_repo::update_eval_status(
                &self.db,
                &job.application_id,
                EvalStatus::Pending,
            )?;
            self.events.send(JobEvent::RetryScheduled {
                job_id: job.id.clone(),
                application_id: job.application_id.clone(),
                retry_count: job.retry_count,
                delay_secs: delay.as_secs(),
            });
            log::warn!(
                "Job {} attempt {} failed, retrying in {}s: {}",
                job.id,
                job.retry_count,
                delay.as_secs(),
                error
            );
        }
        Ok(())
    }

    /// Re-queues a terminally failed job at an operator's request,
    /// resetting the retry budget.
    pub fn retry_failed(&self, job_id: &str) -> Result<EvaluationJob, QueueError> {
        let row = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        let mut job = EvaluationJob::from_row(row);
        if job.status != JobStatus::Failed {
            return Err(QueueError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: JobStatus::Queued,
            });
        }

        // Another job may have been enqueued since this one failed.
        if let Some(active) = job_repo::find_active_for_application(&self.db, &job.application_id)?
        {
            return Ok(EvaluationJob::from_row(active));
        }

        job.status = JobStatus::Queued;
        job.retry_count = 0;
        job.completed_at = None;
        job.next_attempt_at = None;
        job.started_at = None;
        job.updated_at = Utc::now();
        self.persist(&job)?;
        self.events.send(JobEvent::Queued {
            job_id: job.id.clone(),
            application_id: job.application_id.clone(),
        });
        log::info!("Job {} manually re-queued", job.id);
        Ok(job)
    }

    /// Returns a job by id.
    pub fn get(&self, job_id: &str) -> Result<Option<EvaluationJob>, QueueError> {
        if let Some(job) = self.lock_cache().get(job_id) {
            return Ok(Some(job.clone()));
        }
        Ok(job_repo::find_by_id(&self.db, job_id)?.map(EvaluationJob::from_row))
    }

    /// Lists jobs with filters, newest first, returning (jobs, total).
    pub fn list(&self, filter: &JobFilter) -> Result<(Vec<EvaluationJob>, u64), QueueError> {
        let (rows, total) = job_repo::query(&self.db, filter)?;
        Ok((rows.into_iter().map(EvaluationJob::from_row).collect(), total))
    }

    /// Per-status counts for dashboards.
    pub fn queue_status(&self) -> Result<QueueStatus, QueueError> {
        Ok(QueueStatus {
            queued: job_repo::count_by_status(&self.db, "queued")?,
            processing: job_repo::count_by_status(&self.db, "processing")?,
            retrying: job_repo::count_by_status(&self.db, "retrying")?,
            completed: job_repo::count_by_status(&self.db, "completed")?,
            failed: job_repo::count_by_status(&self.db, "failed")?,
        })
    }

    /// Deletes terminal jobs older than the cutoff. Active jobs are
    /// always retained.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64, QueueError> {
        let removed = job_repo::delete_terminal_before(&self.db, &cutoff.to_rfc3339())?;
        if removed > 0 {
            log::info!("Cleaned up {} old evaluation jobs", removed);
        }
        Ok(removed)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}
