//! Core types for generation requests, provider state and wire payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// A text-generation provider behind the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ProviderKind {
    /// Ollama running on the writer's machine.
    Ollama,
    /// OpenAI cloud API.
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    /// Default fallback order: local before cloud.
    pub const PRIORITY: [ProviderKind; 2] = [ProviderKind::Ollama, ProviderKind::OpenAi];

    /// Wire name (`ollama`, `openai`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }

    /// Whether inference runs locally.
    #[must_use]
    pub fn is_local(self) -> bool {
        matches!(self, Self::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown provider: '{other}'")),
        }
    }
}

/// Availability and models of one provider, as last reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Which provider.
    pub kind: ProviderKind,
    /// Whether the health check reported it usable.
    pub available: bool,
    /// Models it offers, in backend order.
    pub models: Vec<String>,
}

/// Point-in-time view of every provider, input to the selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSnapshot {
    /// One descriptor per known provider.
    pub providers: Vec<ProviderDescriptor>,
}

impl ProviderSnapshot {
    /// Merge the health and models endpoints into descriptors.
    #[must_use]
    pub fn from_wire(health: &HealthResponse, models: &ModelsResponse) -> Self {
        Self {
            providers: vec![
                ProviderDescriptor {
                    kind: ProviderKind::Ollama,
                    available: health.ollama_available,
                    models: models.ollama.clone(),
                },
                ProviderDescriptor {
                    kind: ProviderKind::OpenAi,
                    available: health.openai_available,
                    models: models.openai.clone(),
                },
            ],
        }
    }

    /// Descriptor for `kind`, if known.
    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    /// Whether `kind` is known and available.
    #[must_use]
    pub fn is_available(&self, kind: ProviderKind) -> bool {
        self.get(kind).is_some_and(|p| p.available)
    }
}

/// Provider and model a request will run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen provider.
    pub provider: ProviderKind,
    /// Chosen model; `None` lets the backend pick its default.
    pub model: Option<String>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Whether the input is a complete prompt or a topic for the blog template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationMode {
    /// Send the input as-is.
    #[default]
    Freeform,
    /// Render the input into the blog-post template.
    Templated,
}

/// Length preset for templated posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLength {
    /// 300-500 words.
    Short,
    /// 800-1200 words.
    #[default]
    Medium,
    /// 1500-2000 words.
    Long,
}

impl TargetLength {
    /// Target word range, as shown in prompts.
    #[must_use]
    pub fn words(self) -> &'static str {
        match self {
            Self::Short => "300-500",
            Self::Medium => "800-1200",
            Self::Long => "1500-2000",
        }
    }

    /// Token budget for the preset.
    #[must_use]
    pub fn max_tokens(self) -> u32 {
        match self {
            Self::Short => 600,
            Self::Medium => 1200,
            Self::Long => 2000,
        }
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

impl FromStr for TargetLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            other => Err(format!("unknown length: '{other}'")),
        }
    }
}

/// Default writing style.
pub const DEFAULT_STYLE: &str = "informative";
/// Default token budget for freeform prompts.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// A generation request.
///
/// `provider`/`model` start as the writer's explicit choice (possibly empty)
/// and are filled in by the selector before the client sends the request.
/// `style`, `length` and `max_tokens` stay `None` until set explicitly, so
/// editor defaults can tell an untouched field from a chosen one; the
/// accessors of the same name resolve them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Freeform or templated.
    pub mode: GenerationMode,
    /// The prompt (freeform) or the topic (templated).
    pub input: String,
    /// Writing style, e.g. `informative`.
    pub style: Option<String>,
    /// Length preset.
    pub length: Option<TargetLength>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Provider to use.
    pub provider: Option<ProviderKind>,
    /// Model to use.
    pub model: Option<String>,
}

impl GenerationRequest {
    /// Freeform request with nothing but the prompt set.
    #[must_use]
    pub fn freeform(prompt: impl Into<String>) -> Self {
        Self::with_mode(GenerationMode::Freeform, prompt.into())
    }

    /// Templated blog-post request for `topic`.
    #[must_use]
    pub fn templated(topic: impl Into<String>) -> Self {
        Self::with_mode(GenerationMode::Templated, topic.into())
    }

    fn with_mode(mode: GenerationMode, input: String) -> Self {
        Self {
            mode,
            input,
            style: None,
            length: None,
            max_tokens: None,
            provider: None,
            model: None,
        }
    }

    /// Set the style.
    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Set the length preset.
    #[must_use]
    pub fn with_length(mut self, length: TargetLength) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the token budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Style to send; [`DEFAULT_STYLE`] when unset.
    #[must_use]
    pub fn style(&self) -> &str {
        self.style.as_deref().unwrap_or(DEFAULT_STYLE)
    }

    /// Length preset to send; medium when unset.
    #[must_use]
    pub fn length(&self) -> TargetLength {
        self.length.unwrap_or_default()
    }

    /// Token budget to send. When unset, templated requests take the length
    /// preset's budget and freeform ones [`DEFAULT_MAX_TOKENS`].
    #[must_use]
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or_else(|| match self.mode {
            GenerationMode::Templated => self.length().max_tokens(),
            GenerationMode::Freeform => DEFAULT_MAX_TOKENS,
        })
    }

    /// Request a specific provider.
    #[must_use]
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Request a specific model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Apply a resolved selection.
    #[must_use]
    pub fn resolved(mut self, selection: Selection) -> Self {
        self.provider = Some(selection.provider);
        self.model = selection.model;
        self
    }
}

// ---------------------------------------------------------------------------
// Templated output
// ---------------------------------------------------------------------------

/// Structured blog post parsed from a templated response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogDraft {
    /// Post title.
    pub title: String,
    /// Markdown body.
    pub content: String,
    /// SEO keywords.
    pub keywords: Vec<String>,
    /// Meta description.
    pub summary: String,
}

/// Result of a templated generation. A response that does not match the
/// expected JSON shape is not an error; the raw text is kept instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatedOutput {
    /// The response parsed into a draft.
    Structured(BlogDraft),
    /// The response text, unparsed.
    RawFallback(String),
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of `POST /api/generate-content` and its streaming variant.
#[derive(Debug, Clone, Serialize)]
pub struct ContentRequest<'a> {
    /// Full prompt text.
    pub prompt: &'a str,
    /// Writing style.
    pub style: &'a str,
    /// Length preset.
    pub length: TargetLength,
    /// Provider wire name.
    pub ai_provider: ProviderKind,
    /// Model, omitted to let the backend choose.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    /// Token budget.
    pub max_tokens: u32,
}

/// Response of `POST /api/generate-content`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentResponse {
    /// Whether generation succeeded.
    #[serde(default)]
    pub success: bool,
    /// Generated text.
    #[serde(default)]
    pub content: Option<String>,
    /// Failure detail.
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `GET /api/health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Backend status string, e.g. `healthy`.
    #[serde(default)]
    pub status: String,
    /// OpenAI configured.
    #[serde(default)]
    pub openai_available: bool,
    /// Ollama reachable.
    #[serde(default)]
    pub ollama_available: bool,
}

/// Response of `GET /api/models`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// OpenAI model names.
    #[serde(default)]
    pub openai: Vec<String>,
    /// Ollama model names.
    #[serde(default)]
    pub ollama: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_wire_names() {
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAi).expect("ser"), "\"openai\"");
        assert_eq!(serde_json::to_string(&ProviderKind::Ollama).expect("ser"), "\"ollama\"");
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert!("claude".parse::<ProviderKind>().is_err());
        assert!(ProviderKind::Ollama.is_local());
        assert!(!ProviderKind::OpenAi.is_local());
    }

    #[test]
    fn length_presets() {
        assert_eq!(TargetLength::Short.words(), "300-500");
        assert_eq!(TargetLength::Medium.max_tokens(), 1200);
        assert_eq!(TargetLength::Long.max_tokens(), 2000);
        assert_eq!("LONG".parse::<TargetLength>(), Ok(TargetLength::Long));
    }

    #[test]
    fn templated_requests_follow_the_length_budget() {
        let req = GenerationRequest::templated("Rust").with_length(TargetLength::Short);
        assert_eq!(req.max_tokens(), 600);
        assert_eq!(req.style(), DEFAULT_STYLE);
        assert_eq!(GenerationRequest::templated("Rust").max_tokens(), 1200);

        let free = GenerationRequest::freeform("hi").with_length(TargetLength::Long);
        assert_eq!(free.max_tokens(), DEFAULT_MAX_TOKENS);

        let fixed = GenerationRequest::templated("Rust")
            .with_max_tokens(300)
            .with_length(TargetLength::Long);
        assert_eq!(fixed.max_tokens(), 300);
    }

    #[test]
    fn unset_fields_stay_distinct_from_defaults() {
        let req = GenerationRequest::templated("Rust");
        assert_eq!((req.style.as_deref(), req.length, req.max_tokens), (None, None, None));

        let chosen = req.with_style(DEFAULT_STYLE).with_length(TargetLength::Medium);
        assert_eq!(chosen.style.as_deref(), Some(DEFAULT_STYLE));
        assert_eq!(chosen.length, Some(TargetLength::Medium));
    }

    #[test]
    fn content_request_omits_unset_model() {
        let body = ContentRequest {
            prompt: "p",
            style: "informative",
            length: TargetLength::Medium,
            ai_provider: ProviderKind::Ollama,
            model: None,
            max_tokens: 1000,
        };
        let json = serde_json::to_value(&body).expect("ser");
        assert_eq!(json["ai_provider"], "ollama");
        assert_eq!(json["length"], "medium");
        assert!(json.get("model").is_none());
    }

    #[test]
    fn snapshot_from_wire() {
        let health = HealthResponse {
            status: "healthy".into(),
            openai_available: false,
            ollama_available: true,
        };
        let models = ModelsResponse {
            openai: vec![],
            ollama: vec!["llama3:latest".into()],
        };
        let snap = ProviderSnapshot::from_wire(&health, &models);
        assert!(snap.is_available(ProviderKind::Ollama));
        assert!(!snap.is_available(ProviderKind::OpenAi));
        assert_eq!(snap.get(ProviderKind::Ollama).map(|p| p.models.len()), Some(1));
    }
}
