//! Job lifecycle engine for remote quantum circuit execution.
//!
//! The engine owns the full life of a job: a caller creates one from
//! raw OpenQASM source (validated and repaired by `qrelay-circuit`),
//! submits it through a `qrelay-provider` client, and a background
//! worker reconciles the stored status with the provider's until the
//! job lands in a terminal state with a normalized result attached.
//!
//! Layout:
//!
//! - [`job`]: the job entity, its status state machine, and filters;
//! - [`store`]: the persistence seam and an in-memory implementation;
//! - [`service`]: create/submit/query orchestration;
//! - [`worker`]: the polling reconciliation loop;
//! - [`result`]: normalization of provider result envelopes;
//! - [`notify`]: job event fan-out to in-process subscribers.

pub mod error;
pub mod job;
pub mod notify;
pub mod result;
pub mod service;
pub mod store;
pub mod worker;

pub use error::{EngineError, EngineResult};
pub use job::{CircuitKind, Job, JobFilter, JobId, JobStatus, NewJob, RunMode};
pub use notify::{BroadcastNotifier, JobEvent, JobUpdate, Notifier, NullNotifier};
pub use result::{NormalizedResult, ResultKind};
pub use service::{CreateJobRequest, CreatedJob, DEFAULT_SHOTS, JobService};
pub use store::{JobStore, MemoryStore};
pub use worker::{ReconcileWorker, WorkerConfig, WorkerHandle, map_provider_status};
