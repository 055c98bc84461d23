//! Background reconciliation against the provider.
//!
//! Jobs that are `queued` or `running` are polled on an interval and
//! their stored status is advanced to match what the provider reports.
//! Each tick handles jobs one at a time; one job's failure never stops
//! the rest of the tick, but a store failure aborts the tick since the
//! next one will see the same jobs again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use qrelay_provider::Provider;

use crate::error::{EngineError, EngineResult};
use crate::job::{Job, JobId, JobStatus};
use crate::notify::{JobEvent, Notifier};
use crate::result::{self, NormalizedResult};
use crate::store::JobStore;

/// Status assigned when the provider reports something unrecognized.
///
/// An unknown status string almost always means a new in-flight phase,
/// so the job keeps being polled instead of getting stuck or failed.
const UNMAPPED_STATUS_FALLBACK: JobStatus = JobStatus::Running;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between reconciliation ticks.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Handle to a running [`ReconcileWorker`].
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait for the current tick to
    /// finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Polls in-flight jobs and reconciles their stored state with the
/// provider's view.
pub struct ReconcileWorker {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn Provider>,
    notifier: Arc<dyn Notifier>,
    config: WorkerConfig,
}

impl ReconcileWorker {
    /// Wire up a worker.
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn Provider>,
        notifier: Arc<dyn Notifier>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            provider,
            notifier,
            config,
        }
    }

    /// Spawn the polling loop.
    pub fn start(self: Arc<Self>) -> WorkerHandle {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => self.run_tick().await,
                    _ = rx.changed() => {
                        tracing::info!("reconciliation worker stopping");
                        break;
                    }
                }
            }
        });
        WorkerHandle { shutdown, handle }
    }

    /// Reconcile every in-flight job once.
    ///
    /// Ticks never overlap: the loop awaits each tick before the next
    /// interval fires, so a slow provider stretches the cycle instead
    /// of piling up concurrent polls.
    pub async fn run_tick(&self) {
        let jobs = match self
            .store
            .find_jobs_by_status(&[JobStatus::Queued, JobStatus::Running])
            .await
        {
            Ok(jobs) => jobs,
            Err(err) => {
                tracing::error!("failed to load in-flight jobs, skipping tick: {err}");
                return;
            }
        };

        for job in jobs {
            let id = job.id.clone();
            if let Err(err) = self.reconcile(job).await {
                tracing::error!(job_id = %id, "reconciliation failed: {err}");
                self.fail_job(&id, &err).await;
            }
        }
    }

    /// Reconcile a single job against the provider.
    async fn reconcile(&self, mut job: Job) -> EngineResult<()> {
        let Some(external_id) = job.external_job_id.clone() else {
            return Err(EngineError::DataIntegrity(format!(
                "job {} is {} but has no provider id",
                job.id, job.status
            )));
        };

        let raw = self.provider.fetch_status(&external_id).await?;
        let Some(reported) = result::provider_status(&raw) else {
            // No recognizable status yet; try again next tick.
            return Ok(());
        };

        let mapped = map_provider_status(reported);
        if mapped == job.status {
            return Ok(());
        }
        if !job.status.can_transition_to(mapped) {
            // A stale provider view (e.g. "queued" after we saw
            // "running") never moves a job backward.
            tracing::debug!(
                job_id = %job.id,
                from = %job.status,
                to = %mapped,
                "ignoring non-monotonic status report"
            );
            return Ok(());
        }

        job.status = mapped;
        if mapped.is_terminal() {
            job.result = Some(result::extract(&raw));
        }
        self.store.save_job(&job).await?;

        let event = match mapped {
            JobStatus::Completed => JobEvent::Completed,
            JobStatus::Failed => JobEvent::Failed,
            _ => JobEvent::Updated,
        };
        tracing::info!(job_id = %job.id, status = %mapped, "job status advanced");
        self.notifier.publish(event, &job);
        Ok(())
    }

    /// Mark a job failed after a reconciliation error, attaching an
    /// error-shaped result. Best effort: a job that went terminal in
    /// the meantime is left alone.
    async fn fail_job(&self, id: &JobId, error: &EngineError) {
        let job = match self.store.get_job(id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(job_id = %id, "could not load job to mark failed: {err}");
                return;
            }
        };
        if job.status.is_terminal() {
            return;
        }

        let mut failed = job;
        failed.status = JobStatus::Failed;
        failed.result = Some(NormalizedResult::from_error(error.to_string()));
        if let Err(err) = self.store.save_job(&failed).await {
            tracing::error!(job_id = %id, "could not persist failure: {err}");
            return;
        }
        self.notifier.publish(JobEvent::Failed, &failed);
    }
}

/// Map a provider status string onto the internal state machine.
///
/// Matching is case-insensitive and by substring, since providers vary
/// the exact wording ("Completed", "job finished") between versions.
pub fn map_provider_status(reported: &str) -> JobStatus {
    let lowered = reported.to_ascii_lowercase();
    if lowered.contains("queued") {
        JobStatus::Queued
    } else if lowered.contains("running") || lowered.contains("executing") {
        JobStatus::Running
    } else if lowered.contains("completed") || lowered.contains("finished") {
        JobStatus::Completed
    } else if lowered.contains("failed") || lowered.contains("error") {
        JobStatus::Failed
    } else {
        tracing::warn!("unmapped provider status {reported:?}, treating as running");
        UNMAPPED_STATUS_FALLBACK
    }
}
