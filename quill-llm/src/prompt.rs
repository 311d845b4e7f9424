//! Prompt templates and templated-output parsing.
//!
//! The blog template has one substitution point for the topic, `{topic}`.
//! The generation endpoint does not read the `style` and `length` request
//! fields, so the template also names the style (`{style}`) and the target
//! word range (`{words}`).

use serde::Deserialize;
use tracing::debug;

use crate::types::{BlogDraft, GenerationMode, GenerationRequest, TemplatedOutput};

/// Blog-post prompt. The model is asked for a JSON object so the result can
/// be split into title, body and SEO metadata.
pub const BLOG_TEMPLATE: &str = r#"Write a {style} blog post about "{topic}".
The post should be {words} words long.
Include:
- An engaging title
- A compelling introduction
- Well-structured main content with subheadings
- A conclusion that summarizes key points
- SEO-friendly content

Please format the response as JSON with the following structure:
{"title": "Blog post title", "content": "Main content with subheadings (use markdown formatting)", "keywords": ["keyword1", "keyword2", "keyword3"], "summary": "SEO meta description"}"#;

/// Render a template by replacing `{key}` placeholders with values.
///
/// Single pass: placeholder text inside a substituted value is not expanded
/// again. Unknown placeholders are left in place.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter().find(|(k, _)| *k == key).map(|(_, v)| (*v, close))
        });
        match value {
            Some((value, close)) => {
                result.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                result.push('{');
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

/// The prompt text actually sent for `request`.
#[must_use]
pub fn prompt_for(request: &GenerationRequest) -> String {
    match request.mode {
        GenerationMode::Freeform => request.input.clone(),
        GenerationMode::Templated => render_template(
            BLOG_TEMPLATE,
            &[
                ("topic", request.input.trim()),
                ("style", request.style().trim()),
                ("words", request.length().words()),
            ],
        ),
    }
}

// ---------------------------------------------------------------------------
// Templated output
// ---------------------------------------------------------------------------

/// Accepts both the current shape and the older backend shape
/// (`seo_keywords`, `meta_description`, separate introduction/conclusion).
#[derive(Debug, Deserialize)]
struct RawDraft {
    title: String,
    content: String,
    #[serde(default)]
    introduction: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default, alias = "seo_keywords")]
    keywords: Vec<String>,
    #[serde(default, alias = "meta_description")]
    summary: String,
}

impl From<RawDraft> for BlogDraft {
    fn from(raw: RawDraft) -> Self {
        let content = [raw.introduction.as_deref(), Some(raw.content.as_str()), raw.conclusion.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        BlogDraft {
            title: raw.title.trim().to_string(),
            content,
            keywords: raw.keywords,
            summary: raw.summary,
        }
    }
}

/// Interpret a templated response.
///
/// Tolerates a markdown code fence or chatter around the JSON object. Anything
/// that does not yield a titled draft comes back as
/// [`TemplatedOutput::RawFallback`] with the original text.
#[must_use]
pub fn parse_templated(text: &str) -> TemplatedOutput {
    let candidate = json_candidate(text);
    match serde_json::from_str::<RawDraft>(candidate) {
        Ok(raw) if !raw.title.trim().is_empty() => TemplatedOutput::Structured(raw.into()),
        Ok(_) => {
            debug!("Templated response has an empty title; keeping raw text");
            TemplatedOutput::RawFallback(text.to_string())
        }
        Err(e) => {
            debug!(error = %e, "Templated response is not a draft; keeping raw text");
            TemplatedOutput::RawFallback(text.to_string())
        }
    }
}

/// The outermost `{ ... }` span, after removing a surrounding code fence.
fn json_candidate(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string (`json`) on the opening fence line.
        s = rest.split_once('\n').map_or("", |(_, body)| body);
        s = s.trim_end().strip_suffix("```").unwrap_or(s);
    }
    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if start < end => &s[start..=end],
        _ => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rendering_works() {
        let rendered = render_template("About {topic} in {place}.", &[("topic", "Rust"), ("place", "Oslo")]);
        assert_eq!(rendered, "About Rust in Oslo.");
    }

    #[test]
    fn template_handles_missing_vars() {
        let rendered = render_template("Hello {topic}, {unknown}.", &[("topic", "x")]);
        assert_eq!(rendered, "Hello x, {unknown}.");
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let rendered = render_template("{style} post on {topic}", &[("topic", "{style}"), ("style", "casual")]);
        assert_eq!(rendered, "casual post on {style}");
    }

    #[test]
    fn templated_prompt_names_style_and_word_range() {
        let request = GenerationRequest::templated("Bread")
            .with_style("casual")
            .with_length(crate::types::TargetLength::Short);
        let prompt = prompt_for(&request);
        assert!(prompt.starts_with("Write a casual blog post about \"Bread\"."));
        assert!(prompt.contains("300-500 words"));
        assert!(!prompt.contains("{style}") && !prompt.contains("{words}"));
    }

    #[test]
    fn templated_prompt_embeds_topic_once() {
        let prompt = prompt_for(&GenerationRequest::templated("  Sourdough  "));
        assert!(prompt.contains("\"Sourdough\""));
        assert!(!prompt.contains("{topic}"));

        let free = prompt_for(&GenerationRequest::freeform("just this"));
        assert_eq!(free, "just this");
    }

    #[test]
    fn parses_plain_json() {
        let out = parse_templated(r#"{"title": "T", "content": "Body", "keywords": ["a"], "summary": "S"}"#);
        assert_eq!(
            out,
            TemplatedOutput::Structured(BlogDraft {
                title: "T".into(),
                content: "Body".into(),
                keywords: vec!["a".into()],
                summary: "S".into(),
            })
        );
    }

    #[test]
    fn parses_fenced_json_with_legacy_fields() {
        let text = "Sure! Here it is:\n```json\n{\"title\": \"T\", \"introduction\": \"Hi.\", \"content\": \"## Main\", \"conclusion\": \"Bye.\", \"seo_keywords\": [\"k\"], \"meta_description\": \"D\"}\n```";
        let TemplatedOutput::Structured(draft) = parse_templated(text) else {
            panic!("expected a structured draft");
        };
        assert_eq!(draft.content, "Hi.\n\n## Main\n\nBye.");
        assert_eq!(draft.keywords, vec!["k"]);
        assert_eq!(draft.summary, "D");
    }

    #[test]
    fn prose_falls_back_to_raw_text() {
        let text = "Here is a post about bread.\n\nBread is great.";
        assert_eq!(parse_templated(text), TemplatedOutput::RawFallback(text.into()));
    }

    #[test]
    fn json_without_required_fields_falls_back() {
        let text = r#"{"headline": "T"}"#;
        assert_eq!(parse_templated(text), TemplatedOutput::RawFallback(text.into()));
        let untitled = r#"{"title": " ", "content": "x"}"#;
        assert!(matches!(parse_templated(untitled), TemplatedOutput::RawFallback(_)));
    }
}
