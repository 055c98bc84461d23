//! Job persistence seam.
//!
//! The engine treats storage as an external collaborator: everything it
//! needs is the four operations on [`JobStore`]. [`MemoryStore`] is the
//! in-process implementation used by tests and single-node deployments;
//! production deployments plug in their own.

use async_trait::async_trait;
use chrono::Utc;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::job::{Job, JobId, JobStatus, NewJob};

/// Storage operations the engine depends on.
///
/// Implementations must treat `save_job` as a full-record write; the
/// engine always reads, mutates, then saves the whole job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job with status `pending` and a fresh id.
    async fn create_job(&self, new: NewJob) -> EngineResult<Job>;

    /// Fetch a job by id.
    async fn get_job(&self, id: &JobId) -> EngineResult<Option<Job>>;

    /// Fetch all jobs whose status is in `statuses`, newest first.
    async fn find_jobs_by_status(&self, statuses: &[JobStatus]) -> EngineResult<Vec<Job>>;

    /// Write a job record back, stamping `updated_at`.
    async fn save_job(&self, job: &Job) -> EngineResult<()>;
}

/// In-memory [`JobStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<FxHashMap<JobId, Job>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, new: NewJob) -> EngineResult<Job> {
        let now = Utc::now();
        let job = Job {
            id: JobId::new(Uuid::new_v4().to_string()),
            owner_id: new.owner_id,
            name: new.name,
            backend_id: new.backend_id,
            circuit_kind: new.circuit_kind,
            shots: new.shots,
            raw_source: new.raw_source,
            notes: new.notes,
            algorithm_tag: new.algorithm_tag,
            oracle_tag: new.oracle_tag,
            run_mode: new.run_mode,
            qubit_count: new.qubit_count,
            circuit_depth: new.circuit_depth,
            status: JobStatus::Pending,
            external_job_id: None,
            result: None,
            created_at: now,
            updated_at: now,
        };

        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: &JobId) -> EngineResult<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(id).cloned())
    }

    async fn find_jobs_by_status(&self, statuses: &[JobStatus]) -> EngineResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut found: Vec<Job> = jobs
            .values()
            .filter(|j| statuses.contains(&j.status))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn save_job(&self, job: &Job) -> EngineResult<()> {
        let mut stored = job.clone();
        stored.updated_at = Utc::now();
        let mut jobs = self.jobs.write().await;
        jobs.insert(stored.id.clone(), stored);
        Ok(())
    }
}
