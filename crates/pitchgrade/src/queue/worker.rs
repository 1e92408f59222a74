//! Background evaluation worker.
//!
//! Polls the queue on a fixed interval, supports a manual wake-up via
//! broadcast channel, and runs each claimed job under a hard timeout.
//! A timed-out attempt counts as a failed attempt; the dropped future
//! means a late oracle response is discarded, not stored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::broadcast;

use super::store::EvaluationQueue;
use super::QueueError;
use crate::evaluator::Evaluator;

/// Upper bound on jobs claimed per polling cycle.
const MAX_JOBS_PER_CYCLE: u64 = 8;

/// Periodic evaluation worker.
pub struct EvalWorker {
    queue: Arc<EvaluationQueue>,
    evaluator: Arc<Evaluator>,
    poll_interval: Duration,
    job_timeout: Duration,
    cleanup_after: Duration,
    shutdown: Arc<AtomicBool>,
}

impl EvalWorker {
    pub fn new(
        queue: Arc<EvaluationQueue>,
        evaluator: Arc<Evaluator>,
        poll_interval: Duration,
        job_timeout: Duration,
        cleanup_after: Duration,
    ) -> Self {
        Self {
            queue,
            evaluator,
            poll_interval,
            job_timeout,
            cleanup_after,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the worker loop in a background thread.
    /// Accepts a trigger receiver for immediate wake-ups after enqueue.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let evaluator = Arc::clone(&self.evaluator);
        let shutdown = Arc::clone(&self.shutdown);
        let poll_interval = self.poll_interval;
        let job_timeout = self.job_timeout;
        let cleanup_after = self.cleanup_after;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to build worker runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut interval_timer = tokio::time::interval(poll_interval);
                interval_timer.tick().await; // skip immediate first tick

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::debug!("Worker woken by trigger");
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    match run_cycle(&queue, &evaluator, job_timeout).await {
                        Ok(0) => {}
                        Ok(n) => log::debug!("Worker cycle processed {} job(s)", n),
                        Err(e) => log::error!("Worker cycle failed: {}", e),
                    }

                    let cutoff = Utc::now()
                        - chrono::Duration::from_std(cleanup_after).unwrap_or_default();
                    if let Err(e) = queue.cleanup_before(cutoff) {
                        log::error!("Job cleanup failed: {}", e);
                    }
                }
            });
        })
    }

    /// Signals the worker to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

/// Runs one polling cycle: claim due jobs and process them
/// concurrently. Returns the number of jobs claimed.
pub async fn run_cycle(
    queue: &EvaluationQueue,
    evaluator: &Evaluator,
    job_timeout: Duration,
) -> Result<usize, QueueError> {
    let claimed = queue.claim_due(Utc::now(), MAX_JOBS_PER_CYCLE)?;
    if claimed.is_empty() {
        return Ok(0);
    }

    let count = claimed.len();
    let runs = claimed
        .iter()
        .map(|job| process_job(queue, evaluator, &job.id, &job.application_id, job_timeout));
    join_all(runs).await;
    Ok(count)
}

async fn process_job(
    queue: &EvaluationQueue,
    evaluator: &Evaluator,
    job_id: &str,
    application_id: &str,
    job_timeout: Duration,
) {
    let outcome = tokio::time::timeout(job_timeout, evaluator.run(application_id)).await;

    let marked = match outcome {
        Ok(Ok(result)) => queue.mark_completed(job_id, result.average),
        Ok(Err(e)) => queue.mark_attempt_failed(job_id, &e.to_string()),
        Err(_) => queue.mark_attempt_failed(
            job_id,
            &format!("processing timeout exceeded ({}s)", job_timeout.as_secs()),
        ),
    };

    if let Err(e) = marked {
        log::error!("Failed to record outcome for job {}: {}", job_id, e);
    }
}
