//! Error handling for the job engine.

use thiserror::Error;

use qrelay_circuit::CircuitError;
use qrelay_provider::ProviderError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the job engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad job state or fields; the caller can correct and retry.
    #[error("validation error: {0}")]
    Validation(String),

    /// No job with the given id.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Circuit pre-pass failure (empty program, capacity overflow).
    #[error("circuit error: {0}")]
    Circuit(#[from] CircuitError),

    /// Provider auth/submission/query failure.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Store failure.
    #[error("store error: {0}")]
    Store(String),

    /// A persisted job violates an engine invariant.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_error_converts() {
        let err: EngineError = CircuitError::EmptyCircuit.into();
        assert!(matches!(err, EngineError::Circuit(_)));
    }

    #[test]
    fn test_provider_error_converts() {
        let err: EngineError = ProviderError::Submission("nope".into()).into();
        assert!(matches!(err, EngineError::Provider(_)));
        assert!(err.to_string().contains("nope"));
    }
}
