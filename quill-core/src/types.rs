//! Core type definitions for QuillPilot documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable, opaque identifier of a document.
///
/// Assigned once at creation and never reassigned. New ids are UUID v4
/// strings, but any non-empty string read back from a store is accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Create a new random document ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Publication state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Work in progress.
    #[default]
    Draft,
    /// Marked as published by the writer.
    Published,
}

impl DocumentStatus {
    /// Wire name used in metadata blocks.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A writer's content unit: markdown body plus a fixed set of metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Stable identity, unique within a store.
    pub id: DocumentId,
    /// Title; may be empty.
    #[serde(default)]
    pub title: String,
    /// Markdown body.
    #[serde(default)]
    pub body: String,
    /// When the document was first created.
    pub created_at: DateTime<Utc>,
    /// Last successful save. Never moves backwards for a given id.
    pub updated_at: DateTime<Utc>,
    /// Draft or published.
    #[serde(default)]
    pub status: DocumentStatus,
    /// Ordered keyword list; may be empty.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Short description; may be empty.
    #[serde(default)]
    pub summary: String,
}

impl Document {
    /// Create a fresh draft with a new id, stamped at the current time.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            title: title.into(),
            body: body.into(),
            created_at: now,
            updated_at: now,
            status: DocumentStatus::Draft,
            keywords: Vec::new(),
            summary: String::new(),
        }
    }

    /// Builder: set keywords.
    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Builder: set status.
    #[must_use]
    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    /// Number of whitespace-separated words in the body.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_documents_get_distinct_ids() {
        let a = Document::new("A", "");
        let b = Document::new("A", "");
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, DocumentStatus::Draft);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Published".parse::<DocumentStatus>(), Ok(DocumentStatus::Published));
        assert_eq!(" draft ".parse::<DocumentStatus>(), Ok(DocumentStatus::Draft));
        assert!("archived".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn json_uses_camel_case_fields() {
        let doc = Document::new("Hello", "world").with_keywords(["a", "b"]);
        let json = serde_json::to_value(&doc).expect("serialize");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["status"], "draft");
        assert_eq!(json["keywords"][1], "b");
    }

    #[test]
    fn word_count_ignores_extra_whitespace() {
        let doc = Document::new("", "  one two\n\nthree  ");
        assert_eq!(doc.word_count(), 3);
    }
}
