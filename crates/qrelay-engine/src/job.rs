//! The job entity and its state machine.
//!
//! A job's status moves monotonically along:
//!
//! ```text
//!   pending ──submit──→ queued ──→ running ──→ completed
//!      │                   │           │
//!      │                   ├───────────┴──→ failed
//!      └──(submit failure: stays pending, retryable)
//! ```
//!
//! **Invariants:**
//! - `external_job_id` is set exactly once, at successful submission,
//!   and never changes afterwards.
//! - `result` stays `None` until the status is terminal and is never
//!   cleared once set.
//! - Transitions never move backward and never skip `queued` from
//!   `pending`, except straight to `failed`.
//! - `cancelled` is a reachable terminal state reserved for future
//!   cancellation support; nothing in this engine produces it today.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::NormalizedResult;

/// Store-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created but not yet submitted to the provider.
    Pending,
    /// Accepted by the provider, waiting in its queue.
    Queued,
    /// Executing on the provider.
    Running,
    /// Finished successfully; `result` is attached.
    Completed,
    /// Finished with an error; `result` carries the detail.
    Failed,
    /// Cancelled before completion (reserved, never produced here).
    Cancelled,
}

impl JobStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Check if the job is waiting on the provider (queued or running).
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Staying put is not a transition; callers treat equal statuses as
    /// a no-op before asking.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Pending => matches!(next, Queued | Failed),
            Queued => matches!(next, Running | Completed | Failed | Cancelled),
            Running => matches!(next, Completed | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Execution primitive requested from the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitKind {
    /// Returns measurement bitstrings.
    #[default]
    Sampler,
    /// Returns expectation values.
    Estimator,
}

impl CircuitKind {
    /// Parse a free-form label by substring, defaulting to the
    /// estimator primitive for anything that doesn't name the sampler.
    pub fn from_label(label: &str) -> Self {
        if label.to_ascii_lowercase().contains("sampler") {
            CircuitKind::Sampler
        } else {
            CircuitKind::Estimator
        }
    }

    /// Provider-side primitive identifier.
    pub fn primitive_id(self) -> &'static str {
        match self {
            CircuitKind::Sampler => "sampler",
            CircuitKind::Estimator => "estimator",
        }
    }
}

/// Where the job should run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Real device.
    #[default]
    Hardware,
    /// Provider-side simulator.
    Simulator,
}

impl RunMode {
    /// Wire value for the submission payload.
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Hardware => "hardware",
            RunMode::Simulator => "simulator",
        }
    }
}

/// The persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned identifier.
    pub id: JobId,
    /// Owner of the job.
    pub owner_id: String,
    /// Display name.
    pub name: String,
    /// Target device name.
    pub backend_id: String,
    /// Execution primitive.
    pub circuit_kind: CircuitKind,
    /// Shot count (≥ 1).
    pub shots: u32,
    /// Submitted program text, verbatim.
    pub raw_source: String,
    /// Free-form notes.
    pub notes: String,
    /// Algorithm label from the authoring UI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm_tag: Option<String>,
    /// Oracle label from the authoring UI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_tag: Option<String>,
    /// Hardware or simulator execution.
    pub run_mode: RunMode,
    /// Lexical qubit estimate, informational only.
    pub qubit_count: u32,
    /// Lexical depth estimate, informational only.
    pub circuit_depth: u32,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Provider job id; set once at successful submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_job_id: Option<String>,
    /// Normalized result; set once the status is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<NormalizedResult>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last persisted mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Fields for a job about to be persisted; the store assigns identity,
/// timestamps and the initial `pending` status.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Owner of the job.
    pub owner_id: String,
    /// Display name.
    pub name: String,
    /// Target device name.
    pub backend_id: String,
    /// Execution primitive.
    pub circuit_kind: CircuitKind,
    /// Shot count.
    pub shots: u32,
    /// Submitted program text.
    pub raw_source: String,
    /// Free-form notes.
    pub notes: String,
    /// Algorithm label.
    pub algorithm_tag: Option<String>,
    /// Oracle label.
    pub oracle_tag: Option<String>,
    /// Hardware or simulator execution.
    pub run_mode: RunMode,
    /// Lexical qubit estimate.
    pub qubit_count: u32,
    /// Lexical depth estimate.
    pub circuit_depth: u32,
}

/// Filter for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Restrict to one owner.
    pub owner_id: Option<String>,
    /// Restrict to these statuses; empty means all.
    pub statuses: Vec<JobStatus>,
}

impl JobFilter {
    /// Filter for a single owner, any status.
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            statuses: Vec::new(),
        }
    }

    /// Check a job against the filter.
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(owner) = &self.owner_id {
            if &job.owner_id != owner {
                return false;
            }
        }
        self.statuses.is_empty() || self.statuses.contains(&job.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_transition_matrix() {
        use JobStatus::*;
        // pending can only be submitted or failed, never skip to running
        assert!(Pending.can_transition_to(Queued));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Completed));

        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Completed));
        assert!(Queued.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Pending));

        assert!(Running.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Queued));

        for terminal in [Completed, Failed, Cancelled] {
            for next in [Pending, Queued, Running, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_circuit_kind_from_label() {
        assert_eq!(CircuitKind::from_label("sampler"), CircuitKind::Sampler);
        assert_eq!(CircuitKind::from_label("SamplerV2"), CircuitKind::Sampler);
        assert_eq!(CircuitKind::from_label("estimator"), CircuitKind::Estimator);
        // Anything unrecognized pins the estimator primitive.
        assert_eq!(CircuitKind::from_label("mystery"), CircuitKind::Estimator);
    }

    #[test]
    fn test_status_serde_is_lowercase() {
        let json = serde_json::to_string(&JobStatus::Queued).unwrap();
        assert_eq!(json, "\"queued\"");
        let back: JobStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(back, JobStatus::Completed);
    }

    #[test]
    fn test_filter_matches() {
        let filter = JobFilter {
            owner_id: Some("alice".into()),
            statuses: vec![JobStatus::Pending],
        };
        let mut job = sample_job();
        assert!(filter.matches(&job));
        job.status = JobStatus::Queued;
        assert!(!filter.matches(&job));
        job.status = JobStatus::Pending;
        job.owner_id = "bob".into();
        assert!(!filter.matches(&job));
    }

    fn sample_job() -> Job {
        Job {
            id: JobId::new("j1"),
            owner_id: "alice".into(),
            name: "bell".into(),
            backend_id: "ibm_torino".into(),
            circuit_kind: CircuitKind::Sampler,
            shots: 1024,
            raw_source: "OPENQASM 3.0;".into(),
            notes: String::new(),
            algorithm_tag: None,
            oracle_tag: None,
            run_mode: RunMode::Hardware,
            qubit_count: 2,
            circuit_depth: 3,
            status: JobStatus::Pending,
            external_job_id: None,
            result: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
