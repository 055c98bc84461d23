//! Lexical validation and repair for submitted OpenQASM 3 programs.
//!
//! This crate is a best-effort pre-pass, not a parser. It runs before a
//! circuit is trusted for submission to an execution provider and does
//! four things:
//!
//! - ensures the version header and the `stdgates.inc` include are present;
//! - infers the qubit count from declarations and index references;
//! - synthesizes measurements when the program has none;
//! - flags gate-like tokens outside the standard gate whitelist.
//!
//! Uncertain findings become warnings. Only an empty program and a
//! capacity overflow are hard failures; a stylistically unusual but
//! valid program must never be rejected here, since hardware-level gate
//! support cannot be verified lexically.

pub mod error;
pub mod metrics;
pub mod prepare;

pub use error::{CircuitError, CircuitResult};
pub use metrics::{CircuitMetrics, estimate};
pub use prepare::{BackendCapacity, Prepared, ensure_stdgates, prepare};
