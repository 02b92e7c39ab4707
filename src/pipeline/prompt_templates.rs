//! Prompt template registry and the scan-driven template selector.
//!
//! One definition per template. Every classification template carries a
//! `**Response Format` section describing the JSON schema the oracle parser
//! accepts; the enhancer uses that heading as its insertion point.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::scan::ScanResult;
use crate::models::{Classification, ClassificationResult};

/// Heading that opens the response-schema section of every template.
pub const RESPONSE_FORMAT_MARKER: &str = "**Response Format";

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplateId {
    PiiFocused,
    ConfidentialFocused,
    TechnicalFocused,
    PublicFocused,
    SafetyAware,
    Standard,
}

/// Which learned patterns the enhancer may inject into a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancementFocus {
    /// Patterns whose `from` or `to` is this category.
    Category(Classification),
    /// High-frequency confusions plus low-agreement categories.
    General,
    None,
}

impl PromptTemplateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PiiFocused => "pii_focused",
            Self::ConfidentialFocused => "confidential_focused",
            Self::TechnicalFocused => "technical_focused",
            Self::PublicFocused => "public_focused",
            Self::SafetyAware => "safety_aware",
            Self::Standard => "standard",
        }
    }

    pub fn all() -> &'static [PromptTemplateId] {
        &[
            Self::PiiFocused,
            Self::ConfidentialFocused,
            Self::TechnicalFocused,
            Self::PublicFocused,
            Self::SafetyAware,
            Self::Standard,
        ]
    }

    // Technical and safety-aware prompts have no category of their own among
    // the stored labels, so they are never enhanced.
    pub fn enhancement_focus(&self) -> EnhancementFocus {
        match self {
            Self::PiiFocused => EnhancementFocus::Category(Classification::HighlySensitive),
            Self::ConfidentialFocused => EnhancementFocus::Category(Classification::Confidential),
            Self::PublicFocused => EnhancementFocus::Category(Classification::Public),
            Self::TechnicalFocused | Self::SafetyAware => EnhancementFocus::None,
            Self::Standard => EnhancementFocus::General,
        }
    }

    /// Base prompt text, before enhancement.
    pub fn text(&self) -> String {
        match self {
            Self::PiiFocused => PII_FOCUSED_PROMPT.to_string(),
            Self::ConfidentialFocused => CONFIDENTIAL_FOCUSED_PROMPT.to_string(),
            Self::TechnicalFocused => format!("{TECHNICAL_RULES}{SHORT_RESPONSE_FORMAT}"),
            Self::PublicFocused => format!("{PUBLIC_RULES}{SHORT_RESPONSE_FORMAT}"),
            Self::SafetyAware => format!("{SAFETY_AWARE_RULES}{SHORT_RESPONSE_FORMAT}"),
            Self::Standard => STANDARD_PROMPT.to_string(),
        }
    }
}

impl fmt::Display for PromptTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════
// Selector
// ═══════════════════════════════════════════════════════════

/// Priority decision tree: first matching rule wins.
pub fn select_template(scan: &ScanResult) -> PromptTemplateId {
    let (template, reason) = if scan.has_ssn_pattern || scan.has_credit_card_pattern {
        (PromptTemplateId::PiiFocused, "ssn or credit card pattern")
    } else if scan.contains_numbers {
        (PromptTemplateId::PiiFocused, "long numeric sequence")
    } else if scan.is_internal || scan.has_confidential_markers {
        (PromptTemplateId::ConfidentialFocused, "internal markers")
    } else if scan.has_technical_content {
        (PromptTemplateId::TechnicalFocused, "technical keywords")
    } else if scan.is_marketing {
        (PromptTemplateId::PublicFocused, "marketing keywords")
    } else if scan.has_violent_indicators {
        (PromptTemplateId::SafetyAware, "violence keywords")
    } else {
        (PromptTemplateId::Standard, "no specific signal")
    };

    tracing::debug!(template = %template, reason, "Selected prompt template");
    template
}

// ═══════════════════════════════════════════════════════════
// Safety and verification prompts
// ═══════════════════════════════════════════════════════════

pub fn safety_check_prompt() -> &'static str {
    SAFETY_CHECK_PROMPT
}

/// Verification prompt embedding the primary result for the secondary oracle.
pub fn verification_prompt(primary: &ClassificationResult) -> String {
    let previous = serde_json::to_string_pretty(primary).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"
You are a secondary reviewer verifying a document classification.

**Previous Classification:** {classification}
**Previous Confidence:** {confidence}

**Your Task:**
1. Independently analyze the document
2. Determine if you agree with the classification
3. Focus on these key questions:
   - Does it contain PII (SSN, credit cards, account numbers)? → Highly Sensitive
   - Is it marked "Internal" or "Confidential"? → Confidential
   - Is it public marketing material? → Public

**Previous Analysis:**
{previous}

**Response Format (MUST be valid JSON):**
{{
    "agreement": true,
    "your_classification": "Highly Sensitive" | "Confidential" | "Public",
    "confidence": 0.95,
    "discrepancies": [],
    "additional_evidence": [],
    "recommendation": "CONFIRM",
    "reasoning": "I agree because..."
}}

If you DISAGREE:
{{
    "agreement": false,
    "your_classification": "Different classification",
    "confidence": 0.90,
    "discrepancies": ["Primary missed SSN on page 2"],
    "additional_evidence": [
        {{
            "page": 2,
            "finding": "Found SSN: XXX-XX-XXXX",
            "category_trigger": "Highly Sensitive"
        }}
    ],
    "recommendation": "OVERRIDE",
    "reasoning": "I found evidence of PII that was missed"
}}

Analyze and respond ONLY with JSON:
"#,
        classification = primary.classification,
        confidence = primary.confidence,
    )
}

// ═══════════════════════════════════════════════════════════
// Template text
// ═══════════════════════════════════════════════════════════

const STANDARD_PROMPT: &str = r#"
You are an expert document classifier for regulatory compliance. Analyze the provided document and classify it into ONE of these categories based on SENSITIVITY LEVEL:

**Categories (Choose ONE):**

1. **Highly Sensitive**: Documents containing:
   - Personal Identifiable Information (PII): Social Security Numbers (format: XXX-XX-XXXX), credit card numbers, bank account numbers, date of birth, criminal history
   - Proprietary technical schematics or defense designs
   - Military equipment specifications or classified information
   - Medical records with patient identifiers

2. **Confidential**: Documents containing:
   - Internal business communications (memos, strategy documents)
   - Non-public operational information
   - Customer lists with contact details (names, addresses, phone numbers)
   - Internal financial reports not meant for public distribution
   - Employee information (but NOT SSN or sensitive PII)

3. **Public**: Documents that are:
   - Marketing materials and brochures
   - Press releases
   - Product catalogs meant for public distribution
   - Generic promotional images

**IMPORTANT CLASSIFICATION RULES:**
- If document contains SSN, credit cards, or account numbers → ALWAYS "Highly Sensitive"
- If document says "Internal Only", "Confidential", or contains business strategy → "Confidential"
- If document is clearly for public marketing/distribution → "Public"
- Choose the HIGHEST sensitivity level if multiple apply
- DO NOT classify as "Unsafe" - that is handled separately

**Response Format (MUST be valid JSON):**
{
    "classification": "Highly Sensitive" | "Confidential" | "Public",
    "confidence": 0.95,
    "primary_reason": "Brief one-sentence explanation",
    "detailed_reasoning": "Detailed explanation of why this classification was chosen",
    "evidence": [
        {
            "page": 1,
            "location": "Top of page",
            "finding": "Found Social Security Number 123-45-6789",
            "category_trigger": "Highly Sensitive - PII (SSN)"
        }
    ],
    "pii_detected": {
        "ssn": false,
        "credit_card": false,
        "account_numbers": false,
        "names": false,
        "addresses": false,
        "other": []
    },
    "recommendations": ["Redact SSN before distribution"],
    "requires_human_review": false,
    "review_reason": ""
}

**Examples:**

Example 1 - Marketing Brochure:
- Content: "Welcome to our exciting new product! Visit www.example.com"
- Classification: "Public"
- Reasoning: "This is clearly marketing material meant for public distribution"

Example 2 - Employment Application with SSN:
- Content: "Name: John Smith, SSN: 123-45-6789"
- Classification: "Highly Sensitive"
- Reasoning: "Contains Social Security Number which is PII"

Example 3 - Internal Memo:
- Content: "INTERNAL ONLY - Q4 Strategy Discussion"
- Classification: "Confidential"
- Reasoning: "Marked as internal only, contains business strategy"

Now analyze the document and respond ONLY with the JSON format above:
"#;

const PII_FOCUSED_PROMPT: &str = r#"
You are a PII detection expert analyzing a document that may contain Personal Identifiable Information.

**PRIMARY OBJECTIVE:** Identify and classify based on PII presence.

**PII Detection Checklist:**
1. **Social Security Numbers (SSN):** Format XXX-XX-XXXX or 9 consecutive digits
2. **Credit Card Numbers:** 16 digits, may have spaces or dashes
3. **Bank Account Numbers:** 8-17 digits
4. **Driver's License Numbers:** Various formats
5. **Dates of Birth:** Any DOB in context of a person
6. **Medical Record Numbers:** Any healthcare identifiers
7. **Passport Numbers:** Various formats
8. **Personal Addresses:** Full residential addresses
9. **Phone Numbers:** With personal context

**Classification Decision:**
- **IF ANY of the above PII is found** → "Highly Sensitive"
- **IF only names/addresses without SSN/financial data** → "Confidential"
- **IF no PII at all** → Evaluate as normal document

**CRITICAL:** Even ONE instance of SSN, credit card, or account number makes the entire document "Highly Sensitive"

**Response Format (JSON):**
{
    "classification": "Highly Sensitive" | "Confidential" | "Public",
    "confidence": 0.95,
    "primary_reason": "Found Social Security Number on page X",
    "detailed_reasoning": "Document contains PII including SSN which classifies it as Highly Sensitive",
    "evidence": [{
        "page": 1,
        "location": "Middle section",
        "finding": "SSN: XXX-XX-XXXX detected",
        "category_trigger": "Highly Sensitive - PII (SSN)"
    }],
    "pii_detected": {
        "ssn": true,
        "credit_card": false,
        "account_numbers": false,
        "names": true,
        "addresses": true,
        "other": []
    },
    "recommendations": ["Redact all PII", "Restrict access"],
    "requires_human_review": false,
    "review_reason": ""
}

**SCAN CAREFULLY:** Check every page, every number sequence, every form field.
Analyze the document now and respond ONLY with JSON:
"#;

const CONFIDENTIAL_FOCUSED_PROMPT: &str = r#"
You are analyzing a document that appears to be INTERNAL or CONFIDENTIAL.

**PRIMARY OBJECTIVE:** Determine the appropriate confidentiality level.

**Classification Logic:**

**Highly Sensitive** (Choose if):
- Contains PII (SSN, credit cards, account numbers)
- Contains proprietary technical designs or trade secrets
- Contains classified government information
- Contains executive compensation details
- Contains unreleased financial data

**Confidential** (Choose if):
- Marked "Internal Only" or "Confidential"
- Contains business strategy or planning documents
- Contains customer lists (names/addresses only, no SSN)
- Contains employee information (no SSN)
- Contains draft documents not meant for public release
- Contains meeting minutes or internal communications
- Contains operational procedures

**Public** (Only if):
- Clearly meant for external distribution despite "internal" label
- Already published information

**Response Format (JSON):**
{
    "classification": "Highly Sensitive" | "Confidential" | "Public",
    "confidence": 0.90,
    "primary_reason": "Document marked as Internal Only",
    "detailed_reasoning": "Internal business document with strategic planning info",
    "evidence": [{
        "page": 1,
        "location": "Header",
        "finding": "CONFIDENTIAL - INTERNAL USE ONLY",
        "category_trigger": "Confidential"
    }],
    "pii_detected": {
        "ssn": false,
        "credit_card": false,
        "account_numbers": false,
        "names": true,
        "addresses": false,
        "other": []
    },
    "recommendations": ["Restrict distribution"],
    "requires_human_review": false,
    "review_reason": ""
}

Analyze and respond ONLY with JSON:
"#;

const TECHNICAL_RULES: &str = r#"
You are analyzing a TECHNICAL document for proprietary content.

**Highly Sensitive**: Defense specs, proprietary formulas, trade secrets, patent-pending
**Confidential**: Internal technical docs, SOPs, non-proprietary engineering
**Public**: Published papers, customer specs, open-source docs

Respond with JSON classification including evidence and reasoning.
"#;

const PUBLIC_RULES: &str = r#"
You are verifying a PUBLIC/MARKETING document.

**Confirm Public IF**: Marketing material, public contact info, no confidential markers
**Reclassify Confidential IF**: Draft restrictions, internal pricing
**Reclassify Highly Sensitive IF**: Any PII found

Respond with JSON classification.
"#;

const SAFETY_AWARE_RULES: &str = r#"
You are analyzing MILITARY/WEAPONS/DEFENSE content for SENSITIVITY (not safety).

**Highly Sensitive**: Classified specs, active weapons systems, restricted tech
**Confidential**: Internal defense docs, non-classified equipment info
**Public**: Declassified docs, published military history

Note: Safety is evaluated separately. Focus on SENSITIVITY level.

Respond with JSON classification.
"#;

const SHORT_RESPONSE_FORMAT: &str = r#"
**Response Format (JSON):**
{
    "classification": "Highly Sensitive" | "Confidential" | "Public",
    "confidence": 0.90,
    "primary_reason": "Brief one-sentence explanation",
    "detailed_reasoning": "Why this classification was chosen",
    "evidence": [{
        "page": 1,
        "location": "Where on the page",
        "finding": "What was found",
        "category_trigger": "Category it triggers"
    }],
    "pii_detected": {
        "ssn": false,
        "credit_card": false,
        "account_numbers": false,
        "names": false,
        "addresses": false,
        "other": []
    },
    "recommendations": [],
    "requires_human_review": false,
    "review_reason": ""
}

Analyze and respond ONLY with JSON:
"#;

const SAFETY_CHECK_PROMPT: &str = r#"
You are a content safety expert analyzing this document for harmful content that would make it UNSAFE.

**CRITICAL INSTRUCTION:** Be VERY STRICT in identifying unsafe content. When in doubt about violence, explicit content, or child safety, mark as UNSAFE.

**Analyze for these specific safety violations:**

1. **Child Safety (CRITICAL):**
   - ANY content that could harm children
   - Content inappropriate for minors
   - Violent imagery involving children
   - Any exploitative content

2. **Graphic Violence:**
   - Images or descriptions of violence
   - Blood, gore, weapons being used
   - Battlefield scenes, combat imagery
   - Dead or injured people or animals
   - ANY imagery that shows harm being done

3. **Hate Speech:**
   - Discriminatory language
   - Slurs or derogatory terms
   - Content promoting hatred

4. **Sexually Explicit Content:**
   - Nudity or sexual imagery
   - Sexual exploitation
   - Adult content

5. **Dangerous Content:**
   - Instructions for making weapons
   - Guides for illegal activities
   - Self-harm content

6. **Other Harmful Content:**
   - Cyberbullying content
   - Malware or hacking tutorials
   - Dangerous misinformation

**IMPORTANT RULES:**
- Military equipment images (tanks, jets, weapons) → MARK AS UNSAFE
- ANY violent imagery → MARK AS UNSAFE
- Disturbing or graphic content → MARK AS UNSAFE
- Business documents with PII → SAFE (just sensitive)
- Internal memos → SAFE (just confidential)
- Marketing materials → SAFE

**Response Format (MUST be valid JSON):**

If SAFE:
{
    "is_safe": true,
    "child_safe": true,
    "violations": [],
    "confidence": 0.95,
    "requires_immediate_review": false
}

If UNSAFE:
{
    "is_safe": false,
    "child_safe": false,
    "violations": [{
        "type": "Graphic Violence",
        "severity": "high",
        "location": "Page 1, main image",
        "description": "Image shows weapons or violent scene"
    }],
    "confidence": 0.90,
    "requires_immediate_review": true
}

**TEST YOUR DECISION:**
- Would this be appropriate on a children's website? → If NO, mark UNSAFE
- Does this show violence, weapons, or harm? → If YES, mark UNSAFE
- Is this disturbing or graphic? → If YES, mark UNSAFE

Analyze the document. Be STRICT. Respond ONLY with JSON:
"#;
