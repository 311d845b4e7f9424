//! Metadata codec — the plain-text record format of a stored document.
//!
//! A record is a delimited metadata block followed by a blank line and the
//! raw markdown body:
//!
//! ```text
//! <!-- QUILLPILOT-METADATA
//! id: "4f6c1a52-..."
//! title: "Rust for writers"
//! createdAt: "2026-10-18T09:12:44.120Z"
//! updatedAt: "2026-10-18T09:30:02.005Z"
//! status: "draft"
//! keywords: ["rust","writing"]
//! summary: "Why a systems language helps."
//! QUILLPILOT-METADATA -->
//!
//! # Rust for writers
//! ...
//! ```
//!
//! The markers are an HTML comment so the file still renders as plain
//! markdown in any viewer. Values are JSON-encoded on write. On read, a value
//! that is not valid JSON is taken as a literal string, which keeps
//! hand-edited files readable.
//!
//! Unknown keys are dropped on decode. Older records may carry fields that
//! are no longer recognised; they are not an error.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::types::{Document, DocumentId, DocumentStatus};

/// First line of every metadata block.
pub const START_MARKER: &str = "<!-- QUILLPILOT-METADATA";
/// Last line of every metadata block.
pub const END_MARKER: &str = "QUILLPILOT-METADATA -->";

const MAX_SLUG_LEN: usize = 60;

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode a document as metadata block + blank line + body.
#[must_use]
pub fn encode(doc: &Document) -> String {
    let mut out = String::with_capacity(doc.body.len() + 256);
    out.push_str(START_MARKER);
    out.push('\n');

    push_field(&mut out, "id", &Value::String(doc.id.0.clone()));
    push_field(&mut out, "title", &Value::String(doc.title.clone()));
    push_field(&mut out, "createdAt", &timestamp_value(doc.created_at));
    push_field(&mut out, "updatedAt", &timestamp_value(doc.updated_at));
    push_field(&mut out, "status", &Value::String(doc.status.as_str().into()));
    push_field(
        &mut out,
        "keywords",
        &Value::Array(doc.keywords.iter().cloned().map(Value::String).collect()),
    );
    push_field(&mut out, "summary", &Value::String(doc.summary.clone()));

    out.push_str(END_MARKER);
    out.push_str("\n\n");
    out.push_str(&doc.body);
    out
}

fn push_field(out: &mut String, key: &str, value: &Value) {
    // serde_json escapes control characters, so every value stays on one line.
    out.push_str(key);
    out.push_str(": ");
    out.push_str(&value.to_string());
    out.push('\n');
}

fn timestamp_value(ts: DateTime<Utc>) -> Value {
    serde_json::to_value(ts).unwrap_or_else(|_| Value::String(ts.to_rfc3339()))
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode a record produced by [`encode`] (or edited by hand).
///
/// Returns `None` when the text has no metadata block, when the block is not
/// closed, or when it carries no usable `id`. Never panics on any input.
#[must_use]
pub fn decode(text: &str) -> Option<Document> {
    let text = text.trim_start_matches('\u{feff}').trim_start();
    let (first, mut rest) = next_line(text)?;
    if first.trim_end() != START_MARKER {
        return None;
    }

    let mut fields: HashMap<String, Value> = HashMap::new();
    let body = loop {
        // Running out of lines before the end marker means an unterminated block.
        let (line, after) = next_line(rest)?;
        if line.trim() == END_MARKER {
            break strip_separator(after);
        }
        rest = after;

        let Some((key, raw)) = line.split_once(':') else {
            continue;
        };
        let key = normalise_key(key.trim());
        let raw = raw.trim();
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(key, value);
    };

    let id = fields.get("id").map(text_of).filter(|s| !s.trim().is_empty())?;

    let created = fields.get("createdAt").and_then(parse_timestamp);
    let updated = fields.get("updatedAt").and_then(parse_timestamp);
    let (created_at, updated_at) = match (created, updated) {
        (Some(c), Some(u)) => (c, u),
        (Some(c), None) => (c, c),
        (None, Some(u)) => (u, u),
        (None, None) => (DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::UNIX_EPOCH),
    };

    let status = fields
        .get("status")
        .and_then(|v| text_of(v).parse::<DocumentStatus>().ok())
        .unwrap_or_default();

    for key in fields.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            debug!(key = %key, document = %id, "Dropping unrecognised metadata key");
        }
    }

    Some(Document {
        id: DocumentId(id),
        title: fields.get("title").map(text_of).unwrap_or_default(),
        body: body.to_string(),
        created_at,
        updated_at,
        status,
        keywords: fields.get("keywords").map(keywords_of).unwrap_or_default(),
        summary: fields.get("summary").map(text_of).unwrap_or_default(),
    })
}

/// Whether `text` starts with a metadata block (terminated or not).
#[must_use]
pub fn has_metadata_block(text: &str) -> bool {
    let text = text.trim_start_matches('\u{feff}').trim_start();
    next_line(text).is_some_and(|(first, _)| first.trim_end() == START_MARKER)
}

const KNOWN_KEYS: &[&str] = &[
    "id",
    "title",
    "createdAt",
    "updatedAt",
    "status",
    "keywords",
    "summary",
];

fn normalise_key(key: &str) -> String {
    match key {
        "created_at" => "createdAt".to_string(),
        "updated_at" => "updatedAt".to_string(),
        other => other.to_string(),
    }
}

/// Split off the first line, stripping `\n` / `\r\n`. `None` on empty input.
fn next_line(s: &str) -> Option<(&str, &str)> {
    if s.is_empty() {
        return None;
    }
    match s.find('\n') {
        Some(pos) => Some((s[..pos].trim_end_matches('\r'), &s[pos + 1..])),
        None => Some((s, "")),
    }
}

/// Remove the single blank separator line between block and body.
fn strip_separator(s: &str) -> &str {
    s.strip_prefix("\r\n")
        .or_else(|| s.strip_prefix('\n'))
        .unwrap_or(s)
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn keywords_of(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(text_of).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        // Epoch milliseconds, as written by browser-side editors.
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Record names
// ---------------------------------------------------------------------------

/// Lower-cased, filesystem-safe form of a title.
///
/// Runs of non-alphanumeric characters collapse to a single `-`; the result
/// is trimmed of dashes and capped in length. Empty titles give `untitled`.
#[must_use]
pub fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
            if out.len() >= MAX_SLUG_LEN {
                break;
            }
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

/// The id as it appears in a record name.
///
/// Lower-case ASCII letters, digits and `-` pass through (a uuid is
/// unchanged); every other byte is written as `%XX`. The mapping is
/// injective, also on case-insensitive filesystems, so distinct ids never
/// share a record name.
#[must_use]
pub fn id_component(id: &DocumentId) -> String {
    let mut out = String::with_capacity(id.0.len());
    for byte in id.0.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Deterministic record name: `slug(title)_id.ext`.
///
/// The id suffix keeps names unique even when titles collide.
#[must_use]
pub fn record_name(doc: &Document, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        slug(&doc.title),
        id_component(&doc.id),
        extension.trim_start_matches('.')
    )
}
