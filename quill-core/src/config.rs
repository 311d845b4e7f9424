//! Configuration for QuillPilot.
//!
//! Maps directly to `quillpilot.toml`. Every field has a serde default, so an
//! empty file (or no file at all) yields a working local setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuillConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Generation backend connection.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Provider priority and model ranking.
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Document storage.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Editor-side policies (auto-save, generation defaults).
    #[serde(default)]
    pub editor: EditorConfig,
    /// Logging output.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl QuillConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `QuillError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::QuillError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialise back to TOML (e.g. to write a starter config).
    ///
    /// # Errors
    /// Returns `QuillError::Config` if serialisation fails.
    pub fn to_toml(&self) -> crate::error::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::QuillError::Config(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error. `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Connection to the generation backend that fronts the providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend HTTP API.
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    /// Hard timeout for a blocking generation call, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Timeout for establishing a connection, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Token budget for freeform generation.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Provider priority and default-model ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider to try first when the writer has not chosen one.
    #[serde(default = "default_provider")]
    pub preferred: String,
    /// Fallback order, local before cloud.
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,
    /// Ranked name fragments used to pick a default model per provider.
    #[serde(default)]
    pub ranking: ModelRankingConfig,
    /// Where remembered provider/model choices are kept. In memory when unset.
    #[serde(default)]
    pub preferences_file: Option<PathBuf>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            preferred: default_provider(),
            priority: default_priority(),
            ranking: ModelRankingConfig::default(),
            preferences_file: None,
        }
    }
}

/// Ranked keyword lists, best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRankingConfig {
    /// Local models.
    #[serde(default = "default_ollama_ranking")]
    pub ollama: Vec<String>,
    /// Cloud models.
    #[serde(default = "default_openai_ranking")]
    pub openai: Vec<String>,
}

impl Default for ModelRankingConfig {
    fn default() -> Self {
        Self {
            ollama: default_ollama_ranking(),
            openai: default_openai_ranking(),
        }
    }
}

/// Document storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding one text file per document.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
    /// Extension of document files.
    #[serde(default = "default_extension")]
    pub file_extension: String,
    /// Key under which the ephemeral mirror is stored.
    #[serde(default = "default_namespace")]
    pub ephemeral_namespace: String,
    /// Fill empty keywords/summary on save.
    #[serde(default = "default_true")]
    pub derive_missing_metadata: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            file_extension: default_extension(),
            ephemeral_namespace: default_namespace(),
            derive_missing_metadata: true,
        }
    }
}

/// Editor-side policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Quiet period after the last edit before auto-save fires.
    #[serde(default = "default_debounce")]
    pub autosave_debounce_ms: u64,
    /// Default writing style for generation.
    #[serde(default = "default_style")]
    pub default_style: String,
    /// Default target length: short, medium or long.
    #[serde(default = "default_length")]
    pub default_length: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: default_debounce(),
            default_style: default_style(),
            default_length: default_length(),
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of human-readable logs.
    #[serde(default)]
    pub json_logs: bool,
    /// Log any save or load exceeding this threshold (ms).
    #[serde(default = "default_slow_ms")]
    pub log_slow_operations_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_slow_operations_ms: default_slow_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_backend_url() -> String { "http://localhost:5001".to_string() }
fn default_request_timeout() -> u64 { 120_000 }
fn default_connect_timeout() -> u64 { 3_000 }
fn default_max_tokens() -> u32 { 1000 }
fn default_provider() -> String { "ollama".to_string() }
fn default_priority() -> Vec<String> { vec!["ollama".to_string(), "openai".to_string()] }
fn default_ollama_ranking() -> Vec<String> {
    vec!["llama3".to_string(), "mistral".to_string(), "llama".to_string()]
}
fn default_openai_ranking() -> Vec<String> {
    vec!["gpt-3.5-turbo".to_string(), "gpt-4".to_string()]
}
fn default_documents_dir() -> PathBuf { PathBuf::from("QuillPilot") }
fn default_extension() -> String { "md".to_string() }
fn default_namespace() -> String { "quillpilot.documents".to_string() }
fn default_debounce() -> u64 { 1000 }
fn default_style() -> String { "informative".to_string() }
fn default_length() -> String { "medium".to_string() }
fn default_slow_ms() -> u64 { 250 }
