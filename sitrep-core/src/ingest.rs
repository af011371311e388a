//! Decoding and validation of backend reports.
//!
//! The backend wraps its report twice: the HTTP body is an envelope whose
//! `response` field is itself a JSON document. Both layers are decoded
//! separately so a failure names the layer that broke.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// One geolocated item extracted from a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Place identifier, letters only.
    pub name: String,
    pub explanation: String,
}

/// A fully validated report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub narrative: String,
    /// Findings in backend order, duplicates included.
    pub findings: Vec<Finding>,
}

/// Which decoding layer rejected the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    /// The HTTP body envelope.
    Envelope,
    /// The report document carried inside the envelope.
    Report,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeStage::Envelope => write!(f, "envelope"),
            DecodeStage::Report => write!(f, "report"),
        }
    }
}

/// The payload could not be turned into a [`Report`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed response ({stage}): {reason}")]
pub struct MalformedResponse {
    pub stage: DecodeStage,
    pub reason: String,
}

impl MalformedResponse {
    fn new(stage: DecodeStage, err: serde_json::Error) -> Self {
        Self {
            stage,
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    // Older backends answered with `reply`.
    #[serde(alias = "reply")]
    response: String,
}

#[derive(Debug, Deserialize)]
struct RawReport {
    general_explanation: String,
    // Entries are checked one by one so a bad entry only costs itself.
    locations: Vec<Value>,
}

/// Decode a raw HTTP body into a validated report.
///
/// A missing narrative, or a `locations` field that is absent or not a list,
/// rejects the whole payload. Individual entries that are not objects, or
/// whose name or explanation is missing, not a string, blank, or (for the
/// name) without letters, are dropped with a warning; everything else keeps
/// the backend's order.
pub fn ingest(raw: &str) -> Result<Report, MalformedResponse> {
    let inner = decode_envelope(raw)?;
    let report = decode_report(&inner)?;

    let total = report.locations.len();
    let findings: Vec<Finding> = report
        .locations
        .into_iter()
        .enumerate()
        .filter_map(|(index, location)| validate_location(index, location))
        .collect();

    tracing::debug!(
        total,
        kept = findings.len(),
        narrative_chars = report.general_explanation.chars().count(),
        "report ingested"
    );

    Ok(Report {
        narrative: report.general_explanation,
        findings,
    })
}

fn decode_envelope(raw: &str) -> Result<String, MalformedResponse> {
    serde_json::from_str::<Envelope>(raw)
        .map(|envelope| envelope.response)
        .map_err(|e| MalformedResponse::new(DecodeStage::Envelope, e))
}

fn decode_report(inner: &str) -> Result<RawReport, MalformedResponse> {
    serde_json::from_str::<RawReport>(inner).map_err(|e| MalformedResponse::new(DecodeStage::Report, e))
}

fn validate_location(index: usize, location: Value) -> Option<Finding> {
    let mut fields = match location {
        Value::Object(fields) => fields,
        other => {
            tracing::warn!(index, entry = %other, "dropping finding that is not an object");
            return None;
        }
    };

    let raw_name = match fields.remove("name") {
        Some(Value::String(name)) => name,
        other => {
            tracing::warn!(index, raw_name = ?other, "dropping finding without a string name");
            return None;
        }
    };
    let name = normalize_name(&raw_name);
    if name.is_empty() {
        tracing::warn!(index, %raw_name, "dropping finding without a usable name");
        return None;
    }

    let explanation = match fields.remove("explanation") {
        Some(Value::String(text)) if !text.trim().is_empty() => text,
        _ => {
            tracing::warn!(index, %name, "dropping finding without an explanation");
            return None;
        }
    };

    Some(Finding { name, explanation })
}

/// Strip everything but letters from a place name.
pub fn normalize_name(name: &str) -> String {
    name.chars().filter(|c| c.is_alphabetic()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(report: serde_json::Value) -> String {
        json!({ "response": report.to_string() }).to_string()
    }

    #[test]
    fn test_ingest_two_findings_in_order() {
        let raw = envelope(json!({
            "general_explanation": "Two sites flagged.",
            "locations": [
                { "name": "Kharkiv", "explanation": "E" },
                { "name": "Atlantis", "explanation": "F" }
            ]
        }));

        let report = ingest(&raw).unwrap();
        assert_eq!(report.narrative, "Two sites flagged.");
        assert_eq!(
            report.findings,
            vec![
                Finding {
                    name: "Kharkiv".to_string(),
                    explanation: "E".to_string()
                },
                Finding {
                    name: "Atlantis".to_string(),
                    explanation: "F".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_not_json_fails_at_envelope() {
        let err = ingest("not json").unwrap_err();
        assert_eq!(err.stage, DecodeStage::Envelope);
    }

    #[test]
    fn test_inner_not_json_fails_at_report() {
        let raw = json!({ "response": "not json" }).to_string();
        let err = ingest(&raw).unwrap_err();
        assert_eq!(err.stage, DecodeStage::Report);
    }

    #[test]
    fn test_reply_alias_accepted() {
        let inner = json!({ "general_explanation": "ok", "locations": [] }).to_string();
        let raw = json!({ "reply": inner }).to_string();
        let report = ingest(&raw).unwrap();
        assert_eq!(report.narrative, "ok");
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_missing_narrative_is_malformed() {
        let raw = envelope(json!({ "locations": [] }));
        let err = ingest(&raw).unwrap_err();
        assert_eq!(err.stage, DecodeStage::Report);
        assert!(err.reason.contains("general_explanation"));
    }

    #[test]
    fn test_locations_must_be_a_list() {
        for locations in [json!(null), json!({ "name": "Kharkiv" }), json!("Kharkiv")] {
            let raw = envelope(json!({ "general_explanation": "x", "locations": locations }));
            assert_eq!(ingest(&raw).unwrap_err().stage, DecodeStage::Report);
        }

        let raw = envelope(json!({ "general_explanation": "x" }));
        assert_eq!(ingest(&raw).unwrap_err().stage, DecodeStage::Report);
    }

    #[test]
    fn test_names_are_normalized_and_empty_ones_dropped() {
        let raw = envelope(json!({
            "general_explanation": "x",
            "locations": [
                { "name": "Kryvyi Rih!", "explanation": "a" },
                { "name": "1234", "explanation": "b" },
                { "name": "Odesa", "explanation": "   " },
                { "explanation": "no name" },
                { "name": "Донецьк", "explanation": "c" }
            ]
        }));

        let names: Vec<String> = ingest(&raw).unwrap().findings.into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["KryvyiRih", "Донецьк"]);
    }

    #[test]
    fn test_bad_entries_are_dropped_not_fatal() {
        let raw = envelope(json!({
            "general_explanation": "Two sites flagged.",
            "locations": [
                { "name": null, "explanation": "a" },
                { "name": 42, "explanation": "b" },
                "Kharkiv",
                null,
                { "name": "Bakhmut", "explanation": null },
                { "name": "Bakhmut", "explanation": ["c"] },
                { "name": "Kharkiv", "explanation": "E" }
            ]
        }));

        let report = ingest(&raw).unwrap();
        assert_eq!(report.narrative, "Two sites flagged.");
        assert_eq!(
            report.findings,
            vec![Finding {
                name: "Kharkiv".to_string(),
                explanation: "E".to_string()
            }]
        );
    }

    #[test]
    fn test_duplicates_are_preserved() {
        let raw = envelope(json!({
            "general_explanation": "x",
            "locations": [
                { "name": "Kharkiv", "explanation": "first" },
                { "name": "Kharkiv", "explanation": "second" }
            ]
        }));
        let findings = ingest(&raw).unwrap().findings;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].explanation, "second");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Bakhmut (east) "), "Bakhmuteast");
        assert_eq!(normalize_name("--"), "");
    }
}
