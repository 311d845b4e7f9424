//! Maps between `quill-core` and `quill-llm` types.
//!
//! The two crates do not know each other:
//! - `quill-core` keeps configuration with providers as plain strings and
//!   owns [`Document`].
//! - `quill-llm` has typed [`ProviderKind`]s, [`ModelRanking`] and produces
//!   [`TemplatedOutput`].
//!
//! This module converts in both directions so the workspace can wire them
//! together.

use quill_core::config::{EditorConfig, ProvidersConfig};
use quill_core::derive::MetadataDeriver;
use quill_core::types::Document;
use quill_llm::types::{GenerationRequest, TargetLength};
use quill_llm::{ModelRanking, ProviderKind, TemplatedOutput};
use tracing::warn;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fallback order from config: the preferred provider first, then the
/// configured priority. Unknown names are skipped with a warning.
#[must_use]
pub fn provider_priority(config: &ProvidersConfig) -> Vec<ProviderKind> {
    let mut order = Vec::new();
    for name in std::iter::once(&config.preferred).chain(&config.priority) {
        match name.parse::<ProviderKind>() {
            Ok(kind) if !order.contains(&kind) => order.push(kind),
            Ok(_) => {}
            Err(e) => warn!(provider = %name, error = %e, "Ignoring unknown provider in config"),
        }
    }
    order
}

/// Model ranking from config.
#[must_use]
pub fn model_ranking(config: &ProvidersConfig) -> ModelRanking {
    ModelRanking::new()
        .with(ProviderKind::Ollama, config.ranking.ollama.iter().cloned())
        .with(ProviderKind::OpenAi, config.ranking.openai.iter().cloned())
}

/// Apply the editor's default style and length to a request.
///
/// Only unset fields are filled; an explicit choice is kept even when it
/// equals the library default.
#[must_use]
pub fn with_editor_defaults(request: GenerationRequest, config: &EditorConfig) -> GenerationRequest {
    let mut request = request;
    if request.style.is_none() && !config.default_style.trim().is_empty() {
        request = request.with_style(config.default_style.trim());
    }
    if request.length.is_none() {
        match config.default_length.parse::<TargetLength>() {
            Ok(length) => request = request.with_length(length),
            Err(e) => warn!(length = %config.default_length, error = %e, "Ignoring unknown default length"),
        }
    }
    request
}

// ---------------------------------------------------------------------------
// Templated output → Document
// ---------------------------------------------------------------------------

/// Title given to a post whose response could not be parsed.
#[must_use]
pub fn fallback_title(topic: &str) -> String {
    format!("Blog Post: {}", topic.trim())
}

/// Turn a templated response into a new, unsaved document.
///
/// A structured draft maps field for field. Raw text becomes the body under
/// [`fallback_title`], with keywords and summary derived from the text.
/// Structured drafts missing keywords or a summary are filled the same way.
#[must_use]
pub fn draft_to_document(output: TemplatedOutput, topic: &str, deriver: &dyn MetadataDeriver) -> Document {
    let (title, body, keywords, summary) = match output {
        TemplatedOutput::Structured(draft) => (draft.title, draft.content, draft.keywords, draft.summary),
        TemplatedOutput::RawFallback(text) => (fallback_title(topic), text, Vec::new(), String::new()),
    };

    let mut doc = Document::new(title, body).with_keywords(keywords).with_summary(summary);
    if doc.keywords.is_empty() || doc.summary.is_empty() {
        let derived = deriver.derive(&doc.title, &doc.body);
        if doc.keywords.is_empty() {
            doc.keywords = derived.keywords;
        }
        if doc.summary.is_empty() {
            doc.summary = derived.description;
        }
    }
    doc
}
