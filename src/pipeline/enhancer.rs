//! Prompt enhancer: injects reviewer-mined patterns into a base template.
//!
//! Category templates get warnings about confusions involving their own
//! category. The standard template gets the general view: frequent
//! confusions across all categories plus categories reviewers keep correcting.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::prompt_templates::{EnhancementFocus, PromptTemplateId, RESPONSE_FORMAT_MARKER};
use crate::db::{DatabaseError, HitlStore};
use crate::models::{AgreementStats, Classification, LearnedPattern};

/// Minimum frequency for a pattern to warn a category-specific template.
pub const CATEGORY_MIN_FREQUENCY: u32 = 3;
/// Patterns listed per category-specific template.
pub const CATEGORY_MAX_PATTERNS: usize = 3;
/// Minimum frequency for a general "common mistake" warning.
pub const GENERAL_MIN_FREQUENCY: u32 = 5;
/// Agreement percentage below which a category gets an extra-care warning.
pub const LOW_AGREEMENT_PERCENT: f64 = 80.0;

const SAMPLE_PREVIEW_CHARS: usize = 150;
const GENERAL_EXAMPLES: usize = 2;

/// Read side of the pattern store.
pub trait PatternSource: Send + Sync {
    /// All patterns, most frequent first, ties broken by most recent.
    fn learned_patterns(&self) -> Result<Vec<LearnedPattern>, DatabaseError>;

    /// Agreement stats keyed by original classification label.
    fn agreement_by_class(&self) -> Result<BTreeMap<String, AgreementStats>, DatabaseError>;
}

impl PatternSource for HitlStore {
    fn learned_patterns(&self) -> Result<Vec<LearnedPattern>, DatabaseError> {
        HitlStore::learned_patterns(self)
    }

    fn agreement_by_class(&self) -> Result<BTreeMap<String, AgreementStats>, DatabaseError> {
        HitlStore::agreement_by_class(self)
    }
}

#[derive(Clone)]
pub struct PromptEnhancer {
    source: Arc<dyn PatternSource>,
}

impl PromptEnhancer {
    pub fn new(source: Arc<dyn PatternSource>) -> Self {
        Self { source }
    }

    /// `enhance` on the blocking pool. Store reads can wait on the connection lock.
    pub async fn enhance_blocking(&self, template: PromptTemplateId) -> String {
        let enhancer = self.clone();
        match tokio::task::spawn_blocking(move || enhancer.enhance(template)).await {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!(template = %template, error = %e, "Prompt enhancement task failed, using base prompt");
                template.text()
            }
        }
    }

    /// Base template text with any applicable learned context inserted.
    ///
    /// Store failures are logged and leave the template unmodified.
    pub fn enhance(&self, template: PromptTemplateId) -> String {
        let base = template.text();
        let block = match template.enhancement_focus() {
            EnhancementFocus::Category(class) => self.category_block(class),
            EnhancementFocus::General => self.general_block(),
            EnhancementFocus::None => return base,
        };

        match block {
            Ok(Some(block)) => {
                tracing::debug!(template = %template, "Applied learned patterns to prompt");
                insert_before_response_format(&base, &block)
            }
            Ok(None) => base,
            Err(e) => {
                tracing::warn!(template = %template, error = %e, "Could not load learned patterns, using base prompt");
                base
            }
        }
    }

    fn category_block(&self, class: Classification) -> Result<Option<String>, DatabaseError> {
        let patterns = self.source.learned_patterns()?;
        Ok(category_enhancement(&patterns, class))
    }

    fn general_block(&self) -> Result<Option<String>, DatabaseError> {
        let patterns = self.source.learned_patterns()?;
        let agreement = self.source.agreement_by_class()?;
        Ok(general_enhancement(&patterns, &agreement))
    }
}

/// Warning block for confusions involving `class`, or `None` if nothing qualifies.
pub fn category_enhancement(patterns: &[LearnedPattern], class: Classification) -> Option<String> {
    let relevant: Vec<&LearnedPattern> = ordered(patterns)
        .into_iter()
        .filter(|p| p.involves(class) && p.frequency >= CATEGORY_MIN_FREQUENCY)
        .take(CATEGORY_MAX_PATTERNS)
        .collect();

    if relevant.is_empty() {
        return None;
    }

    let mut block = String::from("\n\n--- LEARNED FROM HUMAN CORRECTIONS ---\n");
    block.push_str("The following patterns have been identified from expert feedback:\n\n");
    for pattern in relevant {
        block.push_str(&format!("COMMON MISTAKE #{}:\n", pattern.frequency));
        block.push_str(&format!(
            "   '{}' is often confused with '{}'\n",
            pattern.from_classification, pattern.to_classification
        ));
        if let Some(sample) = pattern.context_samples.first().filter(|s| !s.trim().is_empty()) {
            let preview: String = sample.chars().take(SAMPLE_PREVIEW_CHARS).collect();
            block.push_str(&format!("   Expert feedback: {preview}\n"));
        }
        block.push_str("   → Be extra careful distinguishing these categories!\n\n");
    }
    block.push_str("--- END LEARNED PATTERNS ---\n\n");
    Some(block)
}

/// General learned-context block, or `None` if nothing qualifies.
pub fn general_enhancement(
    patterns: &[LearnedPattern],
    agreement: &BTreeMap<String, AgreementStats>,
) -> Option<String> {
    let confusions: Vec<&LearnedPattern> = ordered(patterns)
        .into_iter()
        .filter(|p| p.frequency >= GENERAL_MIN_FREQUENCY)
        .collect();
    let weak: Vec<(&String, &AgreementStats)> = agreement
        .iter()
        .filter(|(_, stats)| stats.accuracy < LOW_AGREEMENT_PERCENT)
        .collect();

    if confusions.is_empty() && weak.is_empty() {
        return None;
    }

    let mut block = String::from("\n\n--- LEARNED FROM HUMAN FEEDBACK ---\n");

    if !confusions.is_empty() {
        block.push_str("\nCOMMON MISTAKES TO AVOID:\n");
        for pattern in confusions {
            block.push_str(&format!(
                "\n**IMPORTANT DISTINCTION:** Documents are often misclassified as '{}' when they should be '{}'.\n",
                pattern.from_classification, pattern.to_classification
            ));
            let examples: Vec<&str> = pattern
                .context_samples
                .iter()
                .take(GENERAL_EXAMPLES)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            if !examples.is_empty() {
                block.push_str(&format!("Common indicators for '{}':\n", pattern.to_classification));
                for example in examples {
                    block.push_str(&format!("- {example}\n"));
                }
            }
        }
    }

    if !weak.is_empty() {
        block.push_str("\nCATEGORIES REQUIRING EXTRA CARE:\n");
        for (category, stats) in weak {
            block.push_str(&format!(
                "\n**EXTRA ATTENTION NEEDED:** '{category}' classification has {:.1}% accuracy ({}/{} correct). Be especially careful with this category.\n",
                stats.accuracy, stats.agreements, stats.total
            ));
        }
    }

    block.push_str("\n--- END LEARNED CONTEXT ---\n\n");
    Some(block)
}

/// Insert `block` right before the response-schema heading, or append it.
pub fn insert_before_response_format(base: &str, block: &str) -> String {
    match base.find(RESPONSE_FORMAT_MARKER) {
        Some(idx) => {
            let mut out = String::with_capacity(base.len() + block.len());
            out.push_str(&base[..idx]);
            out.push_str(block);
            out.push_str(&base[idx..]);
            out
        }
        None => format!("{base}{block}"),
    }
}

// Frequency desc, then most recent. Sources usually return this order already.
fn ordered(patterns: &[LearnedPattern]) -> Vec<&LearnedPattern> {
    let mut sorted: Vec<&LearnedPattern> = patterns.iter().collect();
    sorted.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| b.last_seen.cmp(&a.last_seen))
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn pattern(from: Classification, to: Classification, frequency: u32, last_seen: &str, samples: &[&str]) -> LearnedPattern {
        LearnedPattern {
            id: 0,
            from_classification: from,
            to_classification: to,
            frequency,
            context_samples: samples.iter().map(|s| s.to_string()).collect(),
            created_at: "2026-01-01T00:00:00.000Z".into(),
            last_seen: last_seen.into(),
        }
    }

    struct FakeSource {
        patterns: Vec<LearnedPattern>,
        agreement: BTreeMap<String, AgreementStats>,
        fail: bool,
        delay: Option<Duration>,
        reads: Mutex<usize>,
    }

    impl FakeSource {
        fn new(patterns: Vec<LearnedPattern>) -> Self {
            Self {
                patterns,
                agreement: BTreeMap::new(),
                fail: false,
                delay: None,
                reads: Mutex::new(0),
            }
        }
    }

    impl PatternSource for FakeSource {
        fn learned_patterns(&self) -> Result<Vec<LearnedPattern>, DatabaseError> {
            *self.reads.lock().unwrap() += 1;
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.fail {
                return Err(DatabaseError::LockPoisoned);
            }
            Ok(self.patterns.clone())
        }

        fn agreement_by_class(&self) -> Result<BTreeMap<String, AgreementStats>, DatabaseError> {
            Ok(self.agreement.clone())
        }
    }

    fn enhancer(source: FakeSource) -> PromptEnhancer {
        PromptEnhancer::new(Arc::new(source))
    }

    #[tokio::test]
    async fn blocking_enhance_leaves_runtime_free() {
        let mut source = FakeSource::new(vec![pattern(
            Classification::Confidential,
            Classification::HighlySensitive,
            3,
            "2026-01-02T00:00:00.000Z",
            &["Employee IDs were actually SSNs"],
        )]);
        source.delay = Some(Duration::from_millis(300));
        let e = enhancer(source);

        let start = Instant::now();
        let (prompt, ticked_after) = tokio::join!(
            e.enhance_blocking(PromptTemplateId::ConfidentialFocused),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                start.elapsed()
            }
        );
        assert!(ticked_after < Duration::from_millis(250));
        assert!(prompt.contains("--- LEARNED FROM HUMAN CORRECTIONS ---"));
    }

    #[test]
    fn no_patterns_returns_base() {
        let e = enhancer(FakeSource::new(vec![]));
        for template in PromptTemplateId::all() {
            assert_eq!(e.enhance(*template), template.text());
        }
    }

    #[test]
    fn category_block_inserted_before_schema() {
        let e = enhancer(FakeSource::new(vec![pattern(
            Classification::Confidential,
            Classification::HighlySensitive,
            3,
            "2026-01-02T00:00:00.000Z",
            &["Employee IDs were actually SSNs", "second"],
        )]));
        let prompt = e.enhance(PromptTemplateId::ConfidentialFocused);

        let block_at = prompt.find("--- LEARNED FROM HUMAN CORRECTIONS ---").unwrap();
        let schema_at = prompt.find(RESPONSE_FORMAT_MARKER).unwrap();
        assert!(block_at < schema_at);
        assert!(prompt.contains("COMMON MISTAKE #3:"));
        assert!(prompt.contains("'Confidential' is often confused with 'Highly Sensitive'"));
        assert!(prompt.contains("Expert feedback: Employee IDs were actually SSNs"));
        assert!(!prompt.contains("second"));
    }

    #[test]
    fn category_matches_either_direction() {
        let patterns = vec![pattern(
            Classification::Public,
            Classification::HighlySensitive,
            4,
            "2026-01-02T00:00:00.000Z",
            &["x"],
        )];
        assert!(category_enhancement(&patterns, Classification::HighlySensitive).is_some());
        assert!(category_enhancement(&patterns, Classification::Public).is_some());
        assert!(category_enhancement(&patterns, Classification::Confidential).is_none());
    }

    #[test]
    fn category_threshold_and_top_three() {
        let patterns = vec![
            pattern(Classification::Public, Classification::Confidential, 2, "2026-01-09T00:00:00.000Z", &["sample-low"]),
            pattern(Classification::Confidential, Classification::Public, 3, "2026-01-01T00:00:00.000Z", &["sample-old"]),
            pattern(Classification::Unknown, Classification::Public, 3, "2026-01-05T00:00:00.000Z", &["sample-recent"]),
            pattern(Classification::HighlySensitive, Classification::Public, 7, "2026-01-02T00:00:00.000Z", &["sample-top"]),
            pattern(Classification::Unsafe, Classification::Public, 5, "2026-01-02T00:00:00.000Z", &["sample-mid"]),
        ];
        let block = category_enhancement(&patterns, Classification::Public).unwrap();
        assert!(!block.contains("sample-low"));
        assert_eq!(block.matches("COMMON MISTAKE #").count(), 3);
        let top = block.find("sample-top").unwrap();
        let mid = block.find("sample-mid").unwrap();
        let recent = block.find("sample-recent").unwrap();
        assert!(top < mid && mid < recent);
        assert!(!block.contains("sample-old"));
    }

    #[test]
    fn sample_preview_truncated() {
        let long = "y".repeat(300);
        let patterns = vec![pattern(
            Classification::Public,
            Classification::Confidential,
            3,
            "2026-01-01T00:00:00.000Z",
            &[long.as_str()],
        )];
        let block = category_enhancement(&patterns, Classification::Public).unwrap();
        assert!(block.contains(&"y".repeat(150)));
        assert!(!block.contains(&"y".repeat(151)));
    }

    #[test]
    fn general_uses_higher_threshold() {
        let below = vec![pattern(Classification::Public, Classification::Confidential, 4, "t", &["a"])];
        assert!(general_enhancement(&below, &BTreeMap::new()).is_none());

        let at = vec![pattern(Classification::Public, Classification::Confidential, 5, "t", &["pricing tables", "", "third"])];
        let block = general_enhancement(&at, &BTreeMap::new()).unwrap();
        assert!(block.contains("COMMON MISTAKES TO AVOID"));
        assert!(block.contains("misclassified as 'Public' when they should be 'Confidential'"));
        assert!(block.contains("- pricing tables"));
        assert!(!block.contains("third"));
        assert!(!block.contains("EXTRA CARE"));
    }

    #[test]
    fn general_flags_low_agreement() {
        let mut agreement = BTreeMap::new();
        agreement.insert("Public".to_string(), AgreementStats::new(2, 3));
        agreement.insert("Confidential".to_string(), AgreementStats::new(4, 5));
        let block = general_enhancement(&[], &agreement).unwrap();
        assert!(block.contains("'Public' classification has 66.7% accuracy (2/3 correct)"));
        // 80% exactly is not below the threshold.
        assert!(!block.contains("'Confidential' classification"));
    }

    #[test]
    fn standard_template_gets_general_block() {
        let mut source = FakeSource::new(vec![]);
        source.agreement.insert("Public".to_string(), AgreementStats::new(1, 4));
        let prompt = enhancer(source).enhance(PromptTemplateId::Standard);
        let block_at = prompt.find("--- LEARNED FROM HUMAN FEEDBACK ---").unwrap();
        assert!(block_at < prompt.find(RESPONSE_FORMAT_MARKER).unwrap());
    }

    #[test]
    fn unfocused_templates_skip_store() {
        let source = Arc::new(FakeSource::new(vec![pattern(
            Classification::Public,
            Classification::Confidential,
            9,
            "t",
            &["x"],
        )]));
        let e = PromptEnhancer::new(source.clone());
        assert_eq!(e.enhance(PromptTemplateId::TechnicalFocused), PromptTemplateId::TechnicalFocused.text());
        assert_eq!(e.enhance(PromptTemplateId::SafetyAware), PromptTemplateId::SafetyAware.text());
        assert_eq!(*source.reads.lock().unwrap(), 0);
    }

    #[test]
    fn store_failure_falls_back_to_base() {
        let mut source = FakeSource::new(vec![]);
        source.fail = true;
        let e = enhancer(source);
        assert_eq!(e.enhance(PromptTemplateId::PiiFocused), PromptTemplateId::PiiFocused.text());
    }

    #[test]
    fn append_when_no_marker() {
        assert_eq!(insert_before_response_format("base", "+block"), "base+block");
        assert_eq!(
            insert_before_response_format("a **Response Format b", "[x]"),
            "a [x]**Response Format b"
        );
    }

    #[test]
    fn works_against_sqlite_store() {
        let store = Arc::new(HitlStore::in_memory().unwrap());
        store
            .transaction(|tx| {
                for _ in 0..3 {
                    crate::db::upsert_learned_pattern(
                        tx,
                        Classification::Confidential,
                        Classification::HighlySensitive,
                        "contains salary data",
                    )?;
                }
                Ok(())
            })
            .unwrap();
        let e = PromptEnhancer::new(store);
        let prompt = e.enhance(PromptTemplateId::PiiFocused);
        assert!(prompt.contains("COMMON MISTAKE #3:"));
        assert!(prompt.contains("contains salary data"));
    }
}
