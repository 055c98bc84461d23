//! Job lifecycle orchestration: create, submit, query.
//!
//! The service never talks to the provider and the store in a way that
//! can leave a half-updated record: a failed submission leaves the job
//! `pending` so the caller can retry, and results are attached only by
//! the reconciliation worker once the provider reports a terminal
//! state.

use std::sync::Arc;

use qrelay_circuit::{self as circuit, BackendCapacity};
use qrelay_provider::{Provider, SubmitInputs, SubmitRequest};
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::job::{CircuitKind, Job, JobFilter, JobId, JobStatus, NewJob, RunMode};
use crate::notify::{JobEvent, Notifier};
use crate::result::NormalizedResult;
use crate::store::JobStore;

/// Shots used when the caller does not specify a count.
pub const DEFAULT_SHOTS: u32 = 1024;

/// Caller-supplied fields for a new job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    /// Display name.
    pub name: String,
    /// Target device name.
    pub backend_id: String,
    /// Free-form primitive label ("sampler", "SamplerV2", ...).
    #[serde(default)]
    pub circuit_kind: Option<String>,
    /// Shot count; defaults to [`DEFAULT_SHOTS`].
    #[serde(default)]
    pub shots: Option<u32>,
    /// Program text, verbatim.
    pub raw_source: String,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Algorithm label from the authoring UI.
    #[serde(default)]
    pub algorithm_tag: Option<String>,
    /// Oracle label from the authoring UI.
    #[serde(default)]
    pub oracle_tag: Option<String>,
    /// Hardware or simulator execution.
    #[serde(default)]
    pub run_mode: Option<RunMode>,
}

/// A freshly created job plus the advisory findings from the circuit
/// pre-pass.
#[derive(Debug, Clone)]
pub struct CreatedJob {
    /// The persisted record.
    pub job: Job,
    /// Circuit pre-pass warnings, surfaced to the caller.
    pub warnings: Vec<String>,
}

/// Orchestrates the job lifecycle over a store, a provider, and an
/// event sink.
pub struct JobService {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn Provider>,
    notifier: Arc<dyn Notifier>,
}

impl JobService {
    /// Wire up a service.
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn Provider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            provider,
            notifier,
        }
    }

    /// Validate a program, run the circuit pre-pass, and persist a
    /// `pending` job. Nothing is sent to the provider here.
    pub async fn create_job(
        &self,
        owner_id: &str,
        request: CreateJobRequest,
    ) -> EngineResult<CreatedJob> {
        if request.name.trim().is_empty() {
            return Err(EngineError::Validation("job name is required".into()));
        }
        if request.backend_id.trim().is_empty() {
            return Err(EngineError::Validation("backend is required".into()));
        }
        if request.raw_source.trim().is_empty() {
            return Err(EngineError::Validation("circuit source is required".into()));
        }
        if request.shots == Some(0) {
            return Err(EngineError::Validation("shots must be at least 1".into()));
        }

        let metrics = circuit::estimate(&request.raw_source);
        let capacity = self.backend_capacity(&request.backend_id).await;
        let prepared = circuit::prepare(&request.raw_source, capacity.as_ref())?;

        let circuit_kind = request
            .circuit_kind
            .as_deref()
            .map(CircuitKind::from_label)
            .unwrap_or_default();

        let job = self
            .store
            .create_job(NewJob {
                owner_id: owner_id.to_string(),
                name: request.name,
                backend_id: request.backend_id,
                circuit_kind,
                shots: request.shots.unwrap_or(DEFAULT_SHOTS),
                raw_source: request.raw_source,
                notes: request.notes.unwrap_or_default(),
                algorithm_tag: request.algorithm_tag,
                oracle_tag: request.oracle_tag,
                run_mode: request.run_mode.unwrap_or_default(),
                qubit_count: prepared.qubit_count.max(metrics.qubit_count),
                circuit_depth: metrics.circuit_depth,
            })
            .await?;

        self.notifier.publish(JobEvent::Created, &job);
        Ok(CreatedJob {
            job,
            warnings: prepared.warnings,
        })
    }

    /// Submit a `pending` job to the provider.
    ///
    /// On success the job becomes `queued` with its provider id pinned.
    /// On failure the job is left untouched and the provider's own
    /// rejection message propagates to the caller.
    pub async fn submit_job(&self, id: &JobId) -> EngineResult<Job> {
        let mut job = self.require_job(id).await?;
        if job.status != JobStatus::Pending {
            return Err(EngineError::Validation(format!(
                "job {id} is {} and cannot be submitted",
                job.status
            )));
        }

        // Re-apply the include repair in case the stored source predates
        // the pre-pass or was edited since.
        let source = circuit::ensure_stdgates(&job.raw_source);
        let request = SubmitRequest {
            program_id: job.circuit_kind.primitive_id().to_string(),
            backend: job.backend_id.clone(),
            run_mode: job.run_mode.as_str().to_string(),
            inputs: SubmitInputs {
                circuits: vec![source],
                shots: job.shots,
            },
        };

        let response = self.provider.submit(&request).await?;
        tracing::info!(job_id = %job.id, external_id = %response.id, "job submitted");

        job.external_job_id = Some(response.id);
        job.status = JobStatus::Queued;
        self.store.save_job(&job).await?;
        self.notifier.publish(JobEvent::Updated, &job);
        Ok(job)
    }

    /// Fetch a single job.
    pub async fn get_job(&self, id: &JobId) -> EngineResult<Job> {
        self.require_job(id).await
    }

    /// Current lifecycle status of a job.
    pub async fn get_job_status(&self, id: &JobId) -> EngineResult<JobStatus> {
        Ok(self.require_job(id).await?.status)
    }

    /// Result of a completed job.
    ///
    /// Only `completed` jobs expose results through this call; failures
    /// carry their detail on the job record itself.
    pub async fn get_job_results(&self, id: &JobId) -> EngineResult<NormalizedResult> {
        let job = self.require_job(id).await?;
        match (job.status, job.result) {
            (JobStatus::Completed, Some(result)) => Ok(result),
            _ => Err(EngineError::Validation(format!(
                "results for job {id} are not available"
            ))),
        }
    }

    /// List jobs matching a filter, newest first.
    pub async fn list_jobs(&self, filter: &JobFilter) -> EngineResult<Vec<Job>> {
        let statuses: Vec<JobStatus> = if filter.statuses.is_empty() {
            vec![
                JobStatus::Pending,
                JobStatus::Queued,
                JobStatus::Running,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ]
        } else {
            filter.statuses.clone()
        };

        let jobs = self.store.find_jobs_by_status(&statuses).await?;
        Ok(jobs.into_iter().filter(|j| filter.matches(j)).collect())
    }

    async fn require_job(&self, id: &JobId) -> EngineResult<Job> {
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| EngineError::JobNotFound(id.to_string()))
    }

    /// Look up the target backend's qubit capacity.
    ///
    /// Best effort: a failed or incomplete device listing disables the
    /// capacity check rather than blocking job creation.
    async fn backend_capacity(&self, backend_id: &str) -> Option<BackendCapacity> {
        match self.provider.list_devices().await {
            Ok(devices) => devices
                .into_iter()
                .find(|d| d.name == backend_id)
                .and_then(|d| {
                    d.num_qubits.map(|qubits| BackendCapacity {
                        name: d.name,
                        qubits,
                    })
                }),
            Err(err) => {
                tracing::warn!("device listing unavailable, skipping capacity check: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use qrelay_provider::{DeviceInfo, ProviderError, ProviderResult, SubmitResponse};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubProvider {
        submissions: Mutex<Vec<SubmitRequest>>,
        reject_with: Option<String>,
        devices: Vec<DeviceInfo>,
    }

    #[async_trait]
    impl Provider for StubProvider {
        async fn submit(&self, request: &SubmitRequest) -> ProviderResult<SubmitResponse> {
            self.submissions.lock().unwrap().push(request.clone());
            if let Some(message) = &self.reject_with {
                return Err(ProviderError::Submission(message.clone()));
            }
            Ok(SubmitResponse {
                id: "ext-1".into(),
                status: None,
            })
        }

        async fn fetch_status(&self, _external_id: &str) -> ProviderResult<serde_json::Value> {
            Ok(serde_json::json!({}))
        }

        async fn list_devices(&self) -> ProviderResult<Vec<DeviceInfo>> {
            Ok(self.devices.clone())
        }
    }

    fn service_with(provider: StubProvider) -> JobService {
        JobService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(provider),
            Arc::new(NullNotifier),
        )
    }

    fn bell_request() -> CreateJobRequest {
        CreateJobRequest {
            name: "bell".into(),
            backend_id: "ibm_torino".into(),
            circuit_kind: Some("sampler".into()),
            shots: None,
            raw_source: "OPENQASM 3.0;\nqubit[2] q;\nh q[0];\ncx q[0], q[1];".into(),
            notes: None,
            algorithm_tag: None,
            oracle_tag: None,
            run_mode: None,
        }
    }

    #[tokio::test]
    async fn test_create_job_defaults_and_pending_status() {
        let service = service_with(StubProvider::default());
        let created = service.create_job("alice", bell_request()).await.unwrap();

        assert_eq!(created.job.status, JobStatus::Pending);
        assert_eq!(created.job.shots, DEFAULT_SHOTS);
        assert_eq!(created.job.circuit_kind, CircuitKind::Sampler);
        assert_eq!(created.job.qubit_count, 2);
        assert!(created.job.external_job_id.is_none());
        // No measurement in the source, so the pre-pass should have
        // flagged it.
        assert!(!created.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_create_job_rejects_blank_fields_and_zero_shots() {
        let service = service_with(StubProvider::default());

        let mut request = bell_request();
        request.name = "  ".into();
        assert!(matches!(
            service.create_job("alice", request).await,
            Err(EngineError::Validation(_))
        ));

        let mut request = bell_request();
        request.shots = Some(0);
        assert!(matches!(
            service.create_job("alice", request).await,
            Err(EngineError::Validation(_))
        ));

        let mut request = bell_request();
        request.raw_source = String::new();
        assert!(matches!(
            service.create_job("alice", request).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_job_enforces_backend_capacity() {
        let provider = StubProvider {
            devices: vec![DeviceInfo {
                name: "ibm_torino".into(),
                num_qubits: Some(1),
            }],
            ..Default::default()
        };
        let service = service_with(provider);

        let err = service.create_job("alice", bell_request()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Circuit(qrelay_circuit::CircuitError::CapacityExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_pins_external_id_and_queues() {
        let service = service_with(StubProvider::default());
        let created = service.create_job("alice", bell_request()).await.unwrap();

        let submitted = service.submit_job(&created.job.id).await.unwrap();
        assert_eq!(submitted.status, JobStatus::Queued);
        assert_eq!(submitted.external_job_id.as_deref(), Some("ext-1"));
    }

    #[tokio::test]
    async fn test_submit_failure_leaves_job_pending() {
        let provider = StubProvider {
            reject_with: Some("backend ibm_torino is offline".into()),
            ..Default::default()
        };
        let service = service_with(provider);
        let created = service.create_job("alice", bell_request()).await.unwrap();

        let err = service.submit_job(&created.job.id).await.unwrap_err();
        match err {
            EngineError::Provider(ProviderError::Submission(msg)) => {
                assert_eq!(msg, "backend ibm_torino is offline");
            }
            other => panic!("unexpected error: {other}"),
        }

        let job = service.get_job(&created.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.external_job_id.is_none());
    }

    #[tokio::test]
    async fn test_submit_rejects_non_pending_job() {
        let service = service_with(StubProvider::default());
        let created = service.create_job("alice", bell_request()).await.unwrap();

        service.submit_job(&created.job.id).await.unwrap();
        let err = service.submit_job(&created.job.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_results_unavailable_before_completion() {
        let service = service_with(StubProvider::default());
        let created = service.create_job("alice", bell_request()).await.unwrap();

        let err = service.get_job_results(&created.job.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_jobs_filters_by_owner() {
        let service = service_with(StubProvider::default());
        service.create_job("alice", bell_request()).await.unwrap();
        service.create_job("bob", bell_request()).await.unwrap();

        let jobs = service
            .list_jobs(&JobFilter::for_owner("alice"))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].owner_id, "alice");
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let service = service_with(StubProvider::default());
        let err = service.get_job(&JobId::new("missing")).await.unwrap_err();
        assert!(matches!(err, EngineError::JobNotFound(_)));
    }
}
