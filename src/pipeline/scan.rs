//! Feature scanner: cheap document-level signals that pick the prompt template.
//!
//! All checks run over the concatenated page text. Keyword checks are
//! case-insensitive substring matches; numeric checks run on the raw text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::DocumentContent;

/// Signals extracted once per document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub has_ssn_pattern: bool,
    pub has_credit_card_pattern: bool,
    pub contains_numbers: bool,
    pub is_internal: bool,
    pub has_confidential_markers: bool,
    pub has_technical_content: bool,
    pub is_marketing: bool,
    pub has_violent_indicators: bool,
    pub word_count: usize,
    pub image_count: u32,
}

static SSN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{3}-\d{2}-\d{4}").expect("valid SSN regex"));

static CREDIT_CARD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}").expect("valid credit card regex")
});

static LONG_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{9,}").expect("valid long number regex"));

const INTERNAL_KEYWORDS: &[&str] = &[
    "internal only",
    "confidential",
    "proprietary",
    "do not distribute",
    "internal memo",
    "company confidential",
    "restricted",
    "for internal use",
];

const MARKETING_KEYWORDS: &[&str] = &[
    "brochure",
    "marketing",
    "promotional",
    "advertisement",
    "sale",
    "visit our website",
    "contact us",
    "learn more",
    "special offer",
];

const VIOLENT_KEYWORDS: &[&str] = &[
    "weapon",
    "gun",
    "rifle",
    "military",
    "combat",
    "battlefield",
    "violence",
    "assault",
    "attack",
    "warfare",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "specification",
    "schematic",
    "blueprint",
    "technical drawing",
    "patent",
    "design document",
    "engineering",
];

/// Distinct keyword hits needed for the density-based signals.
const MARKETING_MIN_HITS: usize = 2;
const VIOLENT_MIN_HITS: usize = 2;

pub fn scan_document(doc: &DocumentContent) -> ScanResult {
    scan_text(&doc.combined_text(), doc.total_images)
}

pub fn scan_text(text: &str, image_count: u32) -> ScanResult {
    let lower = text.to_lowercase();

    let has_ssn_pattern = SSN_PATTERN.is_match(text);
    let has_credit_card_pattern = CREDIT_CARD_PATTERN.is_match(text);
    let contains_numbers =
        has_ssn_pattern || has_credit_card_pattern || LONG_NUMBER_PATTERN.is_match(text);

    let is_internal = contains_any(&lower, INTERNAL_KEYWORDS);

    ScanResult {
        has_ssn_pattern,
        has_credit_card_pattern,
        contains_numbers,
        is_internal,
        has_confidential_markers: is_internal,
        has_technical_content: contains_any(&lower, TECHNICAL_KEYWORDS),
        is_marketing: count_hits(&lower, MARKETING_KEYWORDS) >= MARKETING_MIN_HITS,
        has_violent_indicators: count_hits(&lower, VIOLENT_KEYWORDS) >= VIOLENT_MIN_HITS,
        word_count: text.split_whitespace().count(),
        image_count,
    }
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| haystack.contains(kw))
}

fn count_hits(haystack: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| haystack.contains(**kw)).count()
}
