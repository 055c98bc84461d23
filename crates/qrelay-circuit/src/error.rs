//! Error types for the circuit pre-pass.

use thiserror::Error;

/// Result type for circuit preparation.
pub type CircuitResult<T> = Result<T, CircuitError>;

/// Hard failures of the circuit pre-pass.
///
/// Everything else the pass finds is reported as a warning, never an
/// error.
#[derive(Debug, Error)]
pub enum CircuitError {
    /// The submitted program was empty or whitespace only.
    #[error("empty circuit program submitted")]
    EmptyCircuit,

    /// The circuit needs more qubits than the requested backend has.
    #[error("backend {backend} supports {available} qubits but the circuit uses {required}")]
    CapacityExceeded {
        /// Target backend name.
        backend: String,
        /// Qubits the circuit needs.
        required: u32,
        /// Qubits the backend has.
        available: u32,
    },
}
