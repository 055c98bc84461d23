//! Cheap lexical circuit metrics.
//!
//! Computed once at job creation and stored as informational fields.
//! These are not authoritative for capacity checks; the prepare pass
//! owns that.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static DECL_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:qubit|qreg)\s*.*\[(\d+)\]").unwrap());

/// Lexical estimates of circuit size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitMetrics {
    /// Qubits from the first register declaration found.
    pub qubit_count: u32,
    /// Gate-line count as a stand-in for circuit depth.
    pub circuit_depth: u32,
}

/// Estimate qubit count and depth from the program text.
///
/// Depth is the number of non-empty lines that are not headers,
/// includes, or comments, floored at 1 for any non-empty program.
pub fn estimate(raw_source: &str) -> CircuitMetrics {
    if raw_source.trim().is_empty() {
        return CircuitMetrics::default();
    }

    let qubit_count = DECL_SIZE_RE
        .captures(raw_source)
        .and_then(|cap| cap[1].parse::<u32>().ok())
        .unwrap_or(0);

    let gate_lines = raw_source
        .lines()
        .map(str::trim)
        .filter(|l| {
            !l.is_empty()
                && !l.starts_with("OPENQASM")
                && !l.starts_with("include")
                && !l.starts_with("//")
        })
        .count();

    CircuitMetrics {
        qubit_count,
        circuit_depth: (gate_lines as u32).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_is_zeroed() {
        assert_eq!(estimate(""), CircuitMetrics::default());
        assert_eq!(estimate("  \n "), CircuitMetrics::default());
    }

    #[test]
    fn test_bell_metrics() {
        let src = "OPENQASM 3.0;\ninclude \"stdgates.inc\";\nqubit[2] q;\nh q[0];\ncx q[0], q[1];\nmeasure q;";
        let metrics = estimate(src);
        assert_eq!(metrics.qubit_count, 2);
        assert_eq!(metrics.circuit_depth, 4);
    }

    #[test]
    fn test_legacy_qreg_declaration() {
        let metrics = estimate("qreg q[5];\nh q[0];");
        assert_eq!(metrics.qubit_count, 5);
    }

    #[test]
    fn test_depth_floor() {
        let metrics = estimate("OPENQASM 3.0;");
        assert_eq!(metrics.circuit_depth, 1);
    }
}
