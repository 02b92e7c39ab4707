use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{ClassifierOracle, ContentBlock, OracleError};
use crate::config::{
    ClassifierConfig, ORACLE_MAX_OUTPUT_TOKENS, ORACLE_TEMPERATURE, ORACLE_TOP_K, ORACLE_TOP_P,
};

/// Chat-completion client for an Ollama-compatible multimodal endpoint.
pub struct OllamaOracle {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl OllamaOracle {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client,
            timeout,
        })
    }

    /// Primary oracle as configured.
    pub fn primary(config: &ClassifierConfig) -> Result<Self, OracleError> {
        Self::new(
            &config.oracle_url,
            &config.primary_model,
            config.api_key.clone(),
            config.oracle_timeout,
        )
    }

    /// Verification oracle as configured (same endpoint, possibly another model).
    pub fn secondary(config: &ClassifierConfig) -> Result<Self, OracleError> {
        Self::new(
            &config.oracle_url,
            config.secondary_model(),
            config.api_key.clone(),
            config.oracle_timeout,
        )
    }
}

/// Request body for /api/chat
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'a str,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    num_predict: u32,
}

/// Response body from /api/chat
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Fold the ordered content blocks into one user message: text blocks are
/// appended after the prompt, images travel base64-encoded.
fn build_message(prompt: &str, content: &[ContentBlock]) -> ChatMessage {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut text = prompt.to_string();
    let mut images = Vec::new();

    for block in content {
        match block {
            ContentBlock::Text(t) => {
                text.push_str("\n\n");
                text.push_str(t);
            }
            ContentBlock::Image { data, .. } => images.push(engine.encode(data)),
        }
    }

    ChatMessage {
        role: "user",
        content: text,
        images,
    }
}

impl ClassifierOracle for OllamaOracle {
    fn invoke(&self, prompt: &str, content: &[ContentBlock]) -> Result<String, OracleError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![build_message(prompt, content)],
            stream: false,
            format: "json",
            options: ChatOptions {
                temperature: ORACLE_TEMPERATURE,
                top_p: ORACLE_TOP_P,
                top_k: ORACLE_TOP_K,
                num_predict: ORACLE_MAX_OUTPUT_TOKENS,
            },
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                OracleError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                OracleError::Timeout(self.timeout)
            } else {
                OracleError::Other(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::from_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;

        Ok(parsed.message.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ═══════════════════════════════════════════════════════════
// Mock oracle
// ═══════════════════════════════════════════════════════════

/// Scripted oracle for tests and offline runs.
///
/// Replies are chosen by prompt kind (safety check, verification, anything
/// else is a classification) so concurrent calls stay deterministic. A queue
/// of one-shot replies, when non-empty, takes precedence for classification
/// prompts.
pub struct MockOracle {
    model: String,
    classification: Result<String, OracleError>,
    queued: Mutex<VecDeque<Result<String, OracleError>>>,
    safety: Result<String, OracleError>,
    verification: Result<String, OracleError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

/// Marker phrases identifying the two auxiliary prompt kinds.
const SAFETY_PROMPT_MARKER: &str = "content safety expert";
const VERIFICATION_PROMPT_MARKER: &str = "secondary reviewer";

impl MockOracle {
    pub fn new(classification_response: &str) -> Self {
        Self {
            model: "mock".to_string(),
            classification: Ok(classification_response.to_string()),
            queued: Mutex::new(VecDeque::new()),
            safety: Ok(r#"{"is_safe": true, "child_safe": true, "violations": [], "confidence": 0.99, "requires_immediate_review": false}"#.to_string()),
            verification: Ok(r#"{"agreement": true, "your_classification": "Public", "confidence": 0.9, "recommendation": "CONFIRM", "reasoning": "Agree"}"#.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Oracle whose every call fails with `error`.
    pub fn failing(error: OracleError) -> Self {
        Self::new("")
            .with_classification_result(Err(error.clone()))
            .with_safety_result(Err(error.clone()))
            .with_verification_result(Err(error))
    }

    pub fn with_classification_result(mut self, result: Result<String, OracleError>) -> Self {
        self.classification = result;
        self
    }

    /// Queue a one-shot classification reply.
    pub fn then_classification(self, result: Result<String, OracleError>) -> Self {
        if let Ok(mut queue) = self.queued.lock() {
            queue.push_back(result);
        }
        self
    }

    pub fn with_safety_result(mut self, result: Result<String, OracleError>) -> Self {
        self.safety = result;
        self
    }

    pub fn with_verification_result(mut self, result: Result<String, OracleError>) -> Self {
        self.verification = result;
        self
    }

    /// Block each call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Number of `invoke` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl ClassifierOracle for MockOracle {
    fn invoke(&self, prompt: &str, _content: &[ContentBlock]) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if prompt.contains(SAFETY_PROMPT_MARKER) {
            return self.safety.clone();
        }
        if prompt.contains(VERIFICATION_PROMPT_MARKER) {
            return self.verification.clone();
        }
        let queued = self.queued.lock().ok().and_then(|mut q| q.pop_front());
        queued.unwrap_or_else(|| self.classification.clone())
    }

    fn model(&self) -> &str {
        &self.model
    }
}
