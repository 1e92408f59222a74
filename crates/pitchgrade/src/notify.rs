//! Operator alerting for terminal job failures.

use crate::queue::EvaluationJob;

/// Receives a notification when a job exhausts its retries. Implement
/// this to page an operator channel; the default sink just logs.
pub trait AlertSink: Send + Sync {
    fn job_failed(&self, job: &EvaluationJob, error: &str);
}

/// Alert sink that emits a structured error log line.
pub struct LogAlert;

impl AlertSink for LogAlert {
    fn job_failed(&self, job: &EvaluationJob, error: &str) {
        log::error!(
            "Evaluation job {} for application {} failed permanently after {} attempts: {}",
            job.id,
            job.application_id,
            job.retry_count,
            error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_alert_does_not_panic() {
        let job = EvaluationJob::new("app-1", 3);
        LogAlert.job_failed(&job, "oracle unreachable");
    }
}
