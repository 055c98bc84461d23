//! Normalization of provider status/result envelopes.
//!
//! Provider payload shapes drift between API versions, so nothing here
//! looks up registers by a fixed key name: the measured classical
//! register is whatever data entry structurally looks like a sample
//! list. The raw envelope is always retained for auditability.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a normalized result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Measurement bitstring histogram.
    Sampler,
    /// Provider-reported failure.
    Error,
}

/// Stable internal result shape attached to terminal jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedResult {
    /// Classification; `None` means "no interpretable result yet".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResultKind>,
    /// Bitstring → occurrence count, for sampler results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<BTreeMap<String, u64>>,
    /// Metadata attached to the result entry, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Failure detail, for error results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The provider envelope, verbatim.
    pub raw: Value,
}

impl NormalizedResult {
    fn unclassified(raw: Value) -> Self {
        Self {
            kind: None,
            counts: None,
            metadata: None,
            error: None,
            raw,
        }
    }

    /// Build an error-shaped result from an engine-side failure (used
    /// by the reconciliation worker when a provider call throws).
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            kind: Some(ResultKind::Error),
            counts: None,
            metadata: None,
            error: Some(message.into()),
            raw: Value::Null,
        }
    }
}

/// Pull the provider's nested status string out of an envelope.
///
/// `None` means the payload carries no recognizable status yet and the
/// job should be left alone this tick.
pub fn provider_status(raw: &Value) -> Option<&str> {
    raw.pointer("/state/status").and_then(Value::as_str)
}

/// Convert a provider envelope into the stable internal result shape.
///
/// Classification order: explicit failure reason wins; then a sampler
/// data block; anything else is returned unclassified with the raw
/// payload intact.
pub fn extract(raw: &Value) -> NormalizedResult {
    if let Some(reason) = raw.pointer("/state/reason").and_then(Value::as_str) {
        return NormalizedResult {
            kind: Some(ResultKind::Error),
            counts: None,
            metadata: None,
            error: Some(reason.to_string()),
            raw: raw.clone(),
        };
    }

    let Some(entry) = raw.pointer("/results/0") else {
        return NormalizedResult::unclassified(raw.clone());
    };
    let Some(data) = entry.get("data").and_then(Value::as_object) else {
        return NormalizedResult::unclassified(raw.clone());
    };

    // The register name is user-controlled; find the first entry that
    // is a sample list by shape.
    let samples = data.values().find_map(sample_list);
    let Some(samples) = samples else {
        return NormalizedResult::unclassified(raw.clone());
    };

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for sample in samples {
        let key = match sample {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        *counts.entry(key).or_insert(0) += 1;
    }

    NormalizedResult {
        kind: Some(ResultKind::Sampler),
        counts: Some(counts),
        metadata: entry.get("metadata").cloned(),
        error: None,
        raw: raw.clone(),
    }
}

/// A register value is a sample list when it is an array or an object
/// exposing a `samples` array.
fn sample_list(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(list) => Some(list),
        Value::Object(obj) => obj.get("samples").and_then(Value::as_array),
        _ => None,
    }
}
