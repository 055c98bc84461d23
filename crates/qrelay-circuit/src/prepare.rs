//! The prepare/repair pass.
//!
//! Works on the program text with regular expressions only. The
//! matching rules here are an implementation detail: callers get a
//! [`Prepared`] value and a warning list and must not depend on how the
//! inference was done, so this pass can later be replaced by a real
//! lexer without touching any caller.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, CircuitResult};

/// Default version header prepended when a program carries none.
const VERSION_HEADER: &str = "OPENQASM 3.0;";

/// Standard gate set include expected by provider QASM loaders.
const STDGATES_INCLUDE: &str = "include \"stdgates.inc\";";

/// Gate names assumed supported without a warning. Hardware-level
/// support cannot be verified lexically, so this stays deliberately
/// small and common.
const STANDARD_GATES: &[&str] = &[
    "h", "x", "y", "z", "rx", "ry", "rz", "cx", "cz", "ccx", "measure", "reset", "swap", "u",
    "u1", "u2", "u3", "sdg", "tdg", "s", "t",
];

/// Structural keywords that look like gate tokens but never are.
const KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "include", "measure", "bit", "qubit", "let", "const", "gate",
];

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^OPENQASM\s+3(?:\.\d+)?\s*;").unwrap());
static STDGATES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)include\s+["']stdgates\.inc["']"#).unwrap());
static QUBIT_INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bq\s*\[\s*(\d+)\s*\]").unwrap());
static SIZE_DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)qubit\[\s*(\d+)\s*\]\s+[A-Za-z_]\w*").unwrap());
static BARE_DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)qubit\s+(\d+)\s+[A-Za-z_]\w*").unwrap());
static MEASURE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)measure\s+").unwrap());
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z][A-Za-z0-9_]*\b").unwrap());

/// Qubit capacity of a target backend, used for the overflow check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapacity {
    /// Backend name, echoed in the overflow error.
    pub name: String,
    /// Number of qubits the backend exposes.
    pub qubits: u32,
}

/// Output of a successful [`prepare`] pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prepared {
    /// Repaired program text, safe to hand to a provider payload.
    pub source: String,
    /// Qubit count inferred after all insertions.
    pub qubit_count: u32,
    /// Advisory findings. Empty for a clean program.
    pub warnings: Vec<String>,
}

/// Validate and repair a submitted program.
///
/// Hard failures are an empty program and a circuit that exceeds the
/// capacity in `capacity`; everything else is repaired in place or
/// reported as a warning.
pub fn prepare(raw_source: &str, capacity: Option<&BackendCapacity>) -> CircuitResult<Prepared> {
    if raw_source.trim().is_empty() {
        return Err(CircuitError::EmptyCircuit);
    }

    let mut warnings = Vec::new();
    let mut source = ensure_header(raw_source);

    let qubits = infer_qubit_count(&source);
    if qubits == 0 {
        warnings.push(
            "Could not detect explicit qubit declarations. Declare qubit registers or use \
             q[n] indices."
                .to_string(),
        );
    }

    if let Some(cap) = capacity {
        if qubits > cap.qubits {
            return Err(CircuitError::CapacityExceeded {
                backend: cap.name.clone(),
                required: qubits,
                available: cap.qubits,
            });
        }
    }

    if let Some(repaired) = insert_measurements(&source, qubits.max(1)) {
        source = repaired;
        warnings.push("No measurement found, auto-inserted measurements for all qubits.".to_string());
    }

    let unknown = find_unknown_gates(&source);
    if !unknown.is_empty() {
        warnings.push(format!(
            "Unknown gate tokens detected: {}. Submission will still be attempted but may fail \
             on hardware.",
            unknown.join(", ")
        ));
    }

    // Insertions above can introduce new indices, so count again.
    let qubit_count = infer_qubit_count(&source);

    Ok(Prepared {
        source,
        qubit_count,
        warnings,
    })
}

/// Infer the qubit count from the program text.
///
/// Heuristics in order of preference: explicit indexed references
/// (highest index + 1), explicit size declarations, bare numeric-size
/// declarations. Returns 0 when nothing matches.
pub fn infer_qubit_count(source: &str) -> u32 {
    let mut max_index: Option<u32> = None;
    let mut bump = |candidate: u32| {
        if max_index.is_none_or(|m| candidate > m) {
            max_index = Some(candidate);
        }
    };

    for cap in QUBIT_INDEX_RE.captures_iter(source) {
        if let Ok(idx) = cap[1].parse::<u32>() {
            bump(idx);
        }
    }
    for re in [&*SIZE_DECL_RE, &*BARE_DECL_RE] {
        for cap in re.captures_iter(source) {
            if let Ok(size) = cap[1].parse::<u32>() {
                if size > 0 {
                    bump(size - 1);
                }
            }
        }
    }

    max_index.map_or(0, |m| m + 1)
}

/// Ensure the version header and stdgates include are present.
fn ensure_header(raw: &str) -> String {
    let mut source = raw.trim().to_string();

    if !VERSION_RE.is_match(&source) {
        source = format!("{VERSION_HEADER}\n{source}");
    }

    if !STDGATES_RE.is_match(&source) {
        if VERSION_RE.is_match(&source) {
            source = VERSION_RE
                .replace(&source, |caps: &regex::Captures<'_>| {
                    format!("{}\n{STDGATES_INCLUDE}", &caps[0])
                })
                .into_owned();
        } else {
            source = format!("{STDGATES_INCLUDE}\n{source}");
        }
    }

    source
}

/// Splice the stdgates include into a version-3 program that lacks it.
///
/// Narrower than [`prepare`]: this is the only repair re-applied to a
/// stored program at submission time. Programs without a version-3
/// header are returned unchanged.
pub fn ensure_stdgates(source: &str) -> String {
    let trimmed = source.trim();
    if VERSION_RE.is_match(trimmed) && !STDGATES_RE.is_match(trimmed) {
        VERSION_RE
            .replace(trimmed, |caps: &regex::Captures<'_>| {
                format!("{}\n{STDGATES_INCLUDE}", &caps[0])
            })
            .into_owned()
    } else {
        trimmed.to_string()
    }
}

/// Append a classical register and one measurement per qubit when the
/// program measures nothing. Returns `None` when a measurement already
/// exists.
fn insert_measurements(source: &str, qubits: u32) -> Option<String> {
    if MEASURE_RE.is_match(source) {
        return None;
    }

    let mut additions = String::from("\n// measurements auto-inserted during preparation\n");
    additions.push_str(&format!("bit[{qubits}] c;\n"));
    for i in 0..qubits {
        additions.push_str(&format!("c[{i}] = measure q[{i}];\n"));
    }
    Some(format!("{source}\n{additions}"))
}

/// Collect gate-like tokens not in the standard whitelist.
///
/// A token is considered gate-like when it is followed by an argument
/// list or a qubit operand on the same line and is not a structural
/// keyword. Findings are advisory only.
fn find_unknown_gates(source: &str) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty()
            || trimmed.starts_with("//")
            || trimmed.starts_with('#')
            || starts_with_ci(trimmed, "include")
            || starts_with_ci(trimmed, "qubit")
            || starts_with_ci(trimmed, "bit")
            || starts_with_ci(trimmed, "OPENQASM")
        {
            continue;
        }

        for m in TOKEN_RE.find_iter(line) {
            let token = m.as_str();
            let lower = token.to_ascii_lowercase();
            if STANDARD_GATES.contains(&lower.as_str()) || KEYWORDS.contains(&lower.as_str()) {
                continue;
            }
            if !looks_like_gate_usage(&line[m.end()..]) {
                continue;
            }
            if !unknown.iter().any(|u| u == token) {
                unknown.push(token.to_string());
            }
        }
    }

    unknown
}

fn starts_with_ci(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len() && line.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// A token counts as gate usage when the rest of the line opens an
/// argument list or names a qubit operand.
fn looks_like_gate_usage(rest: &str) -> bool {
    let rest = rest.trim_start();
    rest.starts_with('(')
        || rest.starts_with("q[")
        || rest
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const BELL: &str = "OPENQASM 3.0;\ninclude \"stdgates.inc\";\nqubit[2] q;\nbit[2] c;\nh q[0];\ncx q[0], q[1];\nc[0] = measure q[0];\nc[1] = measure q[1];";

    #[test]
    fn test_empty_source_rejected() {
        assert!(matches!(prepare("", None), Err(CircuitError::EmptyCircuit)));
        assert!(matches!(
            prepare("   \n\t", None),
            Err(CircuitError::EmptyCircuit)
        ));
    }

    #[test]
    fn test_clean_program_passes_without_warnings() {
        let prepared = prepare(BELL, None).unwrap();
        assert_eq!(prepared.qubit_count, 2);
        assert!(prepared.warnings.is_empty());
        assert_eq!(prepared.source, BELL);
    }

    #[test]
    fn test_missing_header_prepended_and_include_inserted_once() {
        let prepared = prepare("qubit[2] q;\nh q[0];\nc = measure q;", None).unwrap();
        assert!(prepared.source.starts_with("OPENQASM 3.0;"));
        assert_eq!(prepared.source.matches("stdgates.inc").count(), 1);
    }

    #[test]
    fn test_include_inserted_after_existing_version_line() {
        let prepared = prepare("OPENQASM 3.1;\nqubit[1] q;\nmeasure q[0];", None).unwrap();
        let mut lines = prepared.source.lines();
        assert_eq!(lines.next(), Some("OPENQASM 3.1;"));
        assert_eq!(lines.next(), Some("include \"stdgates.inc\";"));
    }

    #[test]
    fn test_qubit_count_from_size_declaration() {
        for n in [1u32, 2, 5, 27] {
            let src = format!("qubit[{n}] q;\nh q[0];\nmeasure q[0];");
            let prepared = prepare(&src, None).unwrap();
            assert_eq!(prepared.qubit_count, n, "declared size {n}");
        }
    }

    #[test]
    fn test_qubit_count_from_highest_index() {
        let prepared = prepare("h q[4];\ncx q[0], q[4];\nmeasure q[4];", None).unwrap();
        assert_eq!(prepared.qubit_count, 5);
    }

    #[test]
    fn test_qubit_count_from_bare_declaration() {
        assert_eq!(infer_qubit_count("qubit 3 reg;"), 3);
    }

    #[test]
    fn test_existing_measurement_not_duplicated() {
        let prepared = prepare(BELL, None).unwrap();
        assert_eq!(prepared.source.matches("measure").count(), 2);
        assert!(!prepared.warnings.iter().any(|w| w.contains("auto-inserted")));
    }

    #[test]
    fn test_measurements_synthesized_per_qubit() {
        let prepared = prepare("qubit[3] q;\nh q[0];", None).unwrap();
        // Count measurement statements, not the substring: the inserted
        // comment line mentions "measurements" too.
        assert_eq!(prepared.source.matches("= measure ").count(), 3);
        assert!(prepared.source.contains("bit[3] c;"));
        assert!(prepared.source.contains("c[0] = measure q[0];"));
        assert!(prepared.source.contains("c[2] = measure q[2];"));
        assert!(prepared.warnings.iter().any(|w| w.contains("auto-inserted")));
    }

    #[test]
    fn test_unknown_qubit_count_still_gets_one_measurement() {
        let prepared = prepare("barrier;", None).unwrap();
        assert!(prepared.source.contains("bit[1] c;"));
        assert!(prepared.source.contains("c[0] = measure q[0];"));
        assert!(prepared.warnings.iter().any(|w| w.contains("declarations")));
        // The inserted measurement references q[0], so the recount sees 1.
        assert_eq!(prepared.qubit_count, 1);
    }

    #[test]
    fn test_capacity_overflow_is_hard_failure() {
        let cap = BackendCapacity {
            name: "ibm_torino".into(),
            qubits: 3,
        };
        let err = prepare("qubit[5] q;\nh q[0];", Some(&cap)).unwrap_err();
        match err {
            CircuitError::CapacityExceeded {
                backend,
                required,
                available,
            } => {
                assert_eq!(backend, "ibm_torino");
                assert_eq!(required, 5);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_capacity_within_limit_passes() {
        let cap = BackendCapacity {
            name: "sim".into(),
            qubits: 10,
        };
        assert!(prepare(BELL, Some(&cap)).is_ok());
    }

    #[test]
    fn test_unknown_gate_tokens_warned_not_rejected() {
        let prepared = prepare("qubit[2] q;\nfredkin q[0], q[1];\nmeasure q[0];", None).unwrap();
        let warning = prepared
            .warnings
            .iter()
            .find(|w| w.contains("Unknown gate"))
            .expect("unknown-gate warning");
        assert!(warning.contains("fredkin"));
    }

    #[test]
    fn test_standard_gates_not_flagged() {
        let prepared = prepare(BELL, None).unwrap();
        assert!(!prepared.warnings.iter().any(|w| w.contains("Unknown gate")));
    }

    #[test]
    fn test_unknown_gate_listed_once() {
        let prepared = prepare(
            "qubit[1] q;\nfoo q[0];\nfoo q[0];\nmeasure q[0];",
            None,
        )
        .unwrap();
        let warning = prepared
            .warnings
            .iter()
            .find(|w| w.contains("Unknown gate"))
            .unwrap();
        assert_eq!(warning.matches("foo").count(), 1);
    }

    #[test]
    fn test_ensure_stdgates_splices_after_header() {
        let repaired = ensure_stdgates("OPENQASM 3.0;\nqubit[1] q;");
        assert!(repaired.contains("OPENQASM 3.0;\ninclude \"stdgates.inc\";"));
    }

    #[test]
    fn test_ensure_stdgates_idempotent() {
        let repaired = ensure_stdgates(BELL);
        assert_eq!(repaired, BELL);
    }

    #[test]
    fn test_ensure_stdgates_ignores_headerless_source() {
        let src = "qubit[1] q;\nh q[0];";
        assert_eq!(ensure_stdgates(src), src);
    }
}
