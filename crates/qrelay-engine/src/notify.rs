//! Job event fan-out.
//!
//! Listeners (dashboards, websocket bridges) subscribe to job updates;
//! the engine publishes fire-and-forget and never blocks on a slow or
//! absent consumer.

use tokio::sync::broadcast;

use crate::job::Job;

/// Lifecycle events published by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// A job record was created.
    Created,
    /// A non-terminal field changed (submission, status advance).
    Updated,
    /// The job reached `completed`.
    Completed,
    /// The job reached `failed`.
    Failed,
}

impl JobEvent {
    /// Wire name of the event.
    pub fn name(self) -> &'static str {
        match self {
            JobEvent::Created => "jobCreated",
            JobEvent::Updated => "jobUpdated",
            JobEvent::Completed => "jobCompleted",
            JobEvent::Failed => "jobFailed",
        }
    }
}

impl std::fmt::Display for JobEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An event paired with the job snapshot it describes.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    /// What happened.
    pub event: JobEvent,
    /// The job as persisted when the event fired.
    pub job: Job,
}

/// Fire-and-forget event sink.
pub trait Notifier: Send + Sync {
    /// Publish an event with a snapshot of the job.
    fn publish(&self, event: JobEvent, job: &Job);
}

/// Broadcast-channel notifier for in-process subscribers.
#[derive(Debug)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<JobUpdate>,
}

impl BroadcastNotifier {
    /// Create a notifier buffering up to `capacity` undelivered events
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to job updates.
    pub fn subscribe(&self) -> broadcast::Receiver<JobUpdate> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: JobEvent, job: &Job) {
        // Send fails only when there are no subscribers; that is fine.
        let _ = self.tx.send(JobUpdate {
            event,
            job: job.clone(),
        });
    }
}

/// Notifier that drops everything.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn publish(&self, _event: JobEvent, _job: &Job) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{CircuitKind, JobId, JobStatus, RunMode};
    use chrono::Utc;

    fn sample_job() -> Job {
        Job {
            id: JobId::new("j1"),
            owner_id: "alice".into(),
            name: "bell".into(),
            backend_id: "ibm_torino".into(),
            circuit_kind: CircuitKind::Sampler,
            shots: 1024,
            raw_source: String::new(),
            notes: String::new(),
            algorithm_tag: None,
            oracle_tag: None,
            run_mode: RunMode::Hardware,
            qubit_count: 2,
            circuit_depth: 1,
            status: JobStatus::Pending,
            external_job_id: None,
            result: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(JobEvent::Created.name(), "jobCreated");
        assert_eq!(JobEvent::Updated.name(), "jobUpdated");
        assert_eq!(JobEvent::Completed.name(), "jobCompleted");
        assert_eq!(JobEvent::Failed.name(), "jobFailed");
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.publish(JobEvent::Created, &sample_job());

        let update = rx.recv().await.unwrap();
        assert_eq!(update.event, JobEvent::Created);
        assert_eq!(update.job.id, JobId::new("j1"));
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let notifier = BroadcastNotifier::new(8);
        notifier.publish(JobEvent::Updated, &sample_job());
    }
}
