//! Recovery and coercion of oracle output.
//!
//! Models rarely return exactly the JSON they were asked for. Recovery runs a
//! fixed chain (whole text, first fenced block, first balanced brace span) and
//! coercion fills every missing or mistyped field with its default, so a parsed
//! value always has the full result shape.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{
    clamp_confidence, Classification, ClassificationResult, Evidence, PiiDetected, Recommendation,
    SafetyAssessment, SecondaryOpinion, Violation, DEFAULT_CONFIDENCE,
};

/// Which stage of the recovery chain produced the JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    WholeText,
    FencedBlock,
    BraceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Map<String, Value>,
    pub stage: RecoveryStage,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("No JSON object found in oracle output")]
    NoJsonObject,
}

/// Characters of raw output kept as reasoning by the keyword heuristic.
const HEURISTIC_REASONING_CHARS: usize = 500;
const HEURISTIC_CONFIDENCE: f64 = 0.6;

// ═══════════════════════════════════════════════════════════
// Recovery chain
// ═══════════════════════════════════════════════════════════

pub fn recover_json(raw: &str) -> Result<Recovered, ParseFailure> {
    let attempts = [
        (RecoveryStage::WholeText, Some(raw.trim())),
        (RecoveryStage::FencedBlock, first_fenced_block(raw)),
        (
            RecoveryStage::BraceSpan,
            first_brace_span(raw).or_else(|| outer_brace_span(raw)),
        ),
    ];

    for (stage, candidate) in attempts {
        if let Some(value) = candidate.and_then(parse_object) {
            return Ok(Recovered { value, stage });
        }
    }
    Err(ParseFailure::NoJsonObject)
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Body of the first ``` fence, with an optional language tag stripped.
fn first_fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    let end = rest.find("```")?;
    let body = &rest[..end];
    // Drop the info string ("json", "JSON", ...) on the opening line.
    let body = match body.find('\n') {
        Some(nl) if !body[..nl].trim().starts_with('{') => &body[nl + 1..],
        _ => body,
    };
    Some(body.trim())
}

/// First `{ ... }` span whose braces balance, ignoring braces inside strings.
fn first_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Unbalanced output: everything from the first `{` to the last `}`.
fn outer_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ═══════════════════════════════════════════════════════════
// Lenient coercion
// ═══════════════════════════════════════════════════════════

fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| as_string(Some(v))).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn confidence_or(value: Option<&Value>, default: f64) -> f64 {
    as_f64(value).map(clamp_confidence).unwrap_or(default)
}

/// Parse an array leniently: skip items that fail to deserialize.
fn parse_array_lenient<T: for<'de> Deserialize<'de>>(value: Option<&Value>) -> Vec<T> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Deserialize)]
struct RawEvidence {
    page: Option<Value>,
    location: Option<Value>,
    finding: Option<Value>,
    category_trigger: Option<Value>,
}

impl From<RawEvidence> for Evidence {
    fn from(raw: RawEvidence) -> Self {
        Evidence {
            page: as_f64(raw.page.as_ref())
                .filter(|p| *p >= 1.0)
                .map(|p| p as u32)
                .unwrap_or(1),
            location: as_string(raw.location.as_ref()).unwrap_or_default(),
            finding: as_string(raw.finding.as_ref()).unwrap_or_default(),
            category_trigger: as_string(raw.category_trigger.as_ref()).unwrap_or_default(),
        }
    }
}

fn evidence_list(value: Option<&Value>) -> Vec<Evidence> {
    parse_array_lenient::<RawEvidence>(value)
        .into_iter()
        .map(Evidence::from)
        .collect()
}

#[derive(Deserialize)]
struct RawViolation {
    #[serde(rename = "type")]
    violation_type: Option<Value>,
    severity: Option<Value>,
    location: Option<Value>,
    description: Option<Value>,
}

fn violation_list(value: Option<&Value>) -> Vec<Violation> {
    parse_array_lenient::<RawViolation>(value)
        .into_iter()
        .map(|raw| Violation {
            violation_type: as_string(raw.violation_type.as_ref()).unwrap_or_default(),
            severity: as_string(raw.severity.as_ref()).unwrap_or_default(),
            location: as_string(raw.location.as_ref()).unwrap_or_default(),
            description: as_string(raw.description.as_ref()).unwrap_or_default(),
        })
        .collect()
}

fn pii_from_value(value: Option<&Value>) -> PiiDetected {
    let Some(Value::Object(map)) = value else {
        return PiiDetected::default();
    };
    let flag = |key: &str| as_bool(map.get(key)).unwrap_or(false);
    PiiDetected {
        ssn: flag("ssn"),
        credit_card: flag("credit_card"),
        account_numbers: flag("account_numbers"),
        names: flag("names"),
        addresses: flag("addresses"),
        other: string_list(map.get("other")),
    }
}

fn classification_label(value: Option<&Value>) -> Classification {
    as_string(value)
        .map(|label| Classification::from_label(&label))
        .unwrap_or(Classification::Unknown)
}

// ═══════════════════════════════════════════════════════════
// Typed results
// ═══════════════════════════════════════════════════════════

/// Coerce a recovered object into a classification; absent fields take defaults.
pub fn classification_from_value(map: &Map<String, Value>) -> ClassificationResult {
    let defaults = ClassificationResult::default();
    let mut result = ClassificationResult {
        classification: classification_label(map.get("classification")),
        confidence: confidence_or(map.get("confidence"), DEFAULT_CONFIDENCE),
        primary_reason: as_string(map.get("primary_reason")).unwrap_or(defaults.primary_reason),
        detailed_reasoning: as_string(map.get("detailed_reasoning"))
            .unwrap_or(defaults.detailed_reasoning),
        evidence: evidence_list(map.get("evidence")),
        pii_detected: pii_from_value(map.get("pii_detected")),
        recommendations: string_list(map.get("recommendations")),
        requires_human_review: as_bool(map.get("requires_human_review")).unwrap_or(false),
        review_reason: as_string(map.get("review_reason")).unwrap_or_default(),
    };

    if result.classification == Classification::Unknown && !result.requires_human_review {
        result.requires_human_review = true;
        result.review_reason = "Unrecognized classification label".to_string();
    }
    result
}

pub fn safety_from_value(map: &Map<String, Value>) -> SafetyAssessment {
    SafetyAssessment {
        is_safe: as_bool(map.get("is_safe")).unwrap_or(true),
        child_safe: as_bool(map.get("child_safe")).unwrap_or(true),
        violations: violation_list(map.get("violations")),
        confidence: confidence_or(
            map.get("confidence"),
            SafetyAssessment::REPORTED_DEFAULT_CONFIDENCE,
        ),
        requires_immediate_review: as_bool(map.get("requires_immediate_review")).unwrap_or(false),
    }
}

pub fn secondary_from_value(map: &Map<String, Value>) -> SecondaryOpinion {
    SecondaryOpinion {
        agreement: as_bool(map.get("agreement")).unwrap_or(false),
        your_classification: classification_label(map.get("your_classification")),
        confidence: confidence_or(map.get("confidence"), DEFAULT_CONFIDENCE),
        discrepancies: string_list(map.get("discrepancies")),
        additional_evidence: evidence_list(map.get("additional_evidence")),
        recommendation: as_string(map.get("recommendation"))
            .map(|r| Recommendation::from_label(&r))
            .unwrap_or(Recommendation::Confirm),
        reasoning: as_string(map.get("reasoning")).unwrap_or_default(),
    }
}

/// Keyword heuristic for free-form output with no recoverable JSON.
pub fn heuristic_classification(raw: &str) -> ClassificationResult {
    let lower = raw.to_lowercase();
    let mentions_ssn = lower.contains("ssn") || lower.contains("social security");

    let classification = if lower.contains("highly sensitive")
        || mentions_ssn
        || lower.contains("classified")
    {
        Classification::HighlySensitive
    } else if lower.contains("confidential")
        || lower.contains("internal")
        || lower.contains("private")
    {
        Classification::Confidential
    } else if lower.contains("unsafe")
        || lower.contains("inappropriate")
        || lower.contains("explicit")
    {
        Classification::Unsafe
    } else {
        Classification::Public
    };

    ClassificationResult {
        classification,
        confidence: HEURISTIC_CONFIDENCE,
        primary_reason: "Parsed from text response".to_string(),
        detailed_reasoning: raw.chars().take(HEURISTIC_REASONING_CHARS).collect(),
        evidence: vec![Evidence {
            page: 1,
            location: "Document analysis".to_string(),
            finding: "Classification based on text analysis".to_string(),
            category_trigger: classification.as_str().to_string(),
        }],
        pii_detected: PiiDetected {
            ssn: mentions_ssn,
            credit_card: lower.contains("credit card"),
            account_numbers: lower.contains("account"),
            ..PiiDetected::default()
        },
        recommendations: Vec::new(),
        requires_human_review: true,
        review_reason: "non-standard response format".to_string(),
    }
}
