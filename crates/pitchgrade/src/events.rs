//! Broadcast of job lifecycle events.
//!
//! Subscribers (UI, metrics, tests) get best-effort notifications over
//! a tokio broadcast channel. Lagging or absent subscribers never block
//! or fail the queue.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One job lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEvent {
    #[serde(rename_all = "camelCase")]
    Queued {
        job_id: String,
        application_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Started {
        job_id: String,
        application_id: String,
        attempt: u32,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        job_id: String,
        application_id: String,
        average: f64,
    },
    #[serde(rename_all = "camelCase")]
    RetryScheduled {
        job_id: String,
        application_id: String,
        retry_count: u32,
        delay_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        job_id: String,
        application_id: String,
        error: String,
    },
}

/// Fan-out handle for job events. Cloning shares the channel.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    tx: broadcast::Sender<JobEvent>,
}

impl JobEventBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Sends an event. A send error just means nobody is listening.
    pub fn send(&self, event: JobEvent) {
        if self.tx.send(event).is_err() {
            log::trace!("No job event subscribers");
        }
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers_does_not_panic() {
        let broadcaster = JobEventBroadcaster::new();
        broadcaster.send(JobEvent::Queued {
            job_id: "j1".to_string(),
            application_id: "app-1".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let broadcaster = JobEventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.send(JobEvent::Completed {
            job_id: "j1".to_string(),
            application_id: "app-1".to_string(),
            average: 7.5,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, JobEvent::Completed { average, .. } if average == 7.5));
    }
}
