use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "DocSentinel";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upload ceiling enforced by the document loader.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Extensions accepted at intake. Decoding support is narrower (see `pipeline::loader`).
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

/// Primary confidence below which the secondary oracle is consulted.
pub const SECONDARY_CONFIDENCE_THRESHOLD: f64 = 0.9;

pub const DEFAULT_ORACLE_URL: &str = "http://localhost:11434";
pub const DEFAULT_PRIMARY_MODEL: &str = "gemma3:12b";
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 120;

// Sampling defaults for classification calls.
pub const ORACLE_TEMPERATURE: f64 = 0.1;
pub const ORACLE_TOP_P: f64 = 0.95;
pub const ORACLE_TOP_K: u32 = 40;
pub const ORACLE_MAX_OUTPUT_TOKENS: u32 = 8192;

/// Get the application data directory (~/DocSentinel/)
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Default location of the HITL feedback database.
pub fn database_path() -> PathBuf {
    app_data_dir().join("hitl_feedback.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "docsentinel=info,docsentinel_lib=info,warn"
}

/// Runtime settings for the classification pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub oracle_url: String,
    pub primary_model: String,
    /// Model for the verification oracle. Falls back to the primary model.
    pub secondary_model: Option<String>,
    pub api_key: Option<String>,
    pub enable_dual_verification: bool,
    pub oracle_timeout: Duration,
    pub database_path: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            oracle_url: DEFAULT_ORACLE_URL.to_string(),
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            secondary_model: None,
            api_key: None,
            enable_dual_verification: true,
            oracle_timeout: Duration::from_secs(DEFAULT_ORACLE_TIMEOUT_SECS),
            database_path: database_path(),
        }
    }
}

impl ClassifierConfig {
    /// Build from `DOCSENTINEL_*` environment variables, defaulting anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("DOCSENTINEL_ORACLE_URL") {
            config.oracle_url = url;
        }
        if let Some(model) = lookup("DOCSENTINEL_PRIMARY_MODEL") {
            config.primary_model = model;
        }
        config.secondary_model = lookup("DOCSENTINEL_SECONDARY_MODEL").filter(|m| !m.is_empty());
        config.api_key = lookup("DOCSENTINEL_API_KEY").filter(|k| !k.is_empty());

        if let Some(flag) = lookup("DOCSENTINEL_DUAL_VERIFICATION") {
            config.enable_dual_verification = parse_flag(&flag).unwrap_or_else(|| {
                tracing::warn!(value = %flag, "Unrecognized DOCSENTINEL_DUAL_VERIFICATION, keeping default");
                config.enable_dual_verification
            });
        }
        if let Some(secs) = lookup("DOCSENTINEL_ORACLE_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) if s > 0 => config.oracle_timeout = Duration::from_secs(s),
                _ => tracing::warn!(value = %secs, "Invalid DOCSENTINEL_ORACLE_TIMEOUT_SECS, keeping default"),
            }
        }
        if let Some(path) = lookup("DOCSENTINEL_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }

        config
    }

    /// Model name the verification oracle should use.
    pub fn secondary_model(&self) -> &str {
        self.secondary_model.as_deref().unwrap_or(&self.primary_model)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
