//! Keyword and summary derivation for documents saved without them.
//!
//! The persistence engine only depends on the [`MetadataDeriver`] seam; the
//! built-in [`KeywordHeuristic`] is a plain frequency count over the title and
//! body, good enough for SEO-style keyword hints.

use std::collections::HashMap;

/// Keywords and a one-line description derived from a document's text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedMetadata {
    /// Most characteristic words, most relevant first.
    pub keywords: Vec<String>,
    /// Short description suitable for a meta tag.
    pub description: String,
}

/// Pure function `(title, body) -> (keywords, description)`.
pub trait MetadataDeriver: Send + Sync {
    /// Derive metadata from the document's text.
    fn derive(&self, title: &str, body: &str) -> DerivedMetadata;
}

impl<F> MetadataDeriver for F
where
    F: Fn(&str, &str) -> DerivedMetadata + Send + Sync,
{
    fn derive(&self, title: &str, body: &str) -> DerivedMetadata {
        self(title, body)
    }
}

/// Word-frequency keyword picker with a small English stop-word list.
#[derive(Debug, Clone)]
pub struct KeywordHeuristic {
    /// Maximum number of keywords returned.
    pub max_keywords: usize,
    /// Maximum description length in characters.
    pub max_description_chars: usize,
}

impl Default for KeywordHeuristic {
    fn default() -> Self {
        Self {
            max_keywords: 5,
            max_description_chars: 160,
        }
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "because",
    "been", "but", "by", "can", "could", "do", "does", "for", "from", "has", "have", "how", "if",
    "in", "into", "is", "it", "its", "just", "more", "most", "not", "of", "on", "one", "or",
    "other", "our", "out", "over", "so", "some", "such", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "to", "up", "use", "was", "we", "what", "when",
    "which", "while", "who", "will", "with", "would", "you", "your",
];

impl MetadataDeriver for KeywordHeuristic {
    fn derive(&self, title: &str, body: &str) -> DerivedMetadata {
        DerivedMetadata {
            keywords: self.keywords(title, body),
            description: self.description(title, body),
        }
    }
}

impl KeywordHeuristic {
    fn keywords(&self, title: &str, body: &str) -> Vec<String> {
        // (count, first position) per word; title words count double.
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let mut position = 0usize;
        let mut add = |word: String, weight: usize| {
            let entry = counts.entry(word).or_insert((0, position));
            entry.0 += weight;
            position += 1;
        };

        for word in words(title) {
            add(word, 2);
        }
        for word in words(body) {
            add(word, 1);
        }

        let mut ranked: Vec<(String, usize, usize)> = counts
            .into_iter()
            .map(|(w, (count, first))| (w, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(w, _, _)| w)
            .collect()
    }

    fn description(&self, title: &str, body: &str) -> String {
        let first_paragraph = body
            .split("\n\n")
            .map(strip_markdown)
            .find(|p| !p.is_empty())
            .unwrap_or_else(|| title.trim().to_string());

        if first_paragraph.chars().count() <= self.max_description_chars {
            return first_paragraph;
        }
        let cut: String = first_paragraph
            .chars()
            .take(self.max_description_chars.saturating_sub(3))
            .collect();
        let cut = match cut.rfind(' ') {
            Some(pos) if pos > 0 => cut[..pos].to_string(),
            _ => cut,
        };
        format!("{}...", cut.trim_end())
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
}

/// Drop heading markers, emphasis and line breaks from a paragraph.
fn strip_markdown(paragraph: &str) -> String {
    let joined = paragraph
        .lines()
        .map(|l| l.trim_start_matches(['#', '>', '-', '*', ' ']).trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    joined.replace(['*', '_', '`'], "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_rank_by_frequency_with_title_boost() {
        let derived = KeywordHeuristic::default().derive(
            "Sourdough Baking",
            "Baking bread at home. Sourdough needs a starter. The starter needs flour and water. Flour matters.",
        );
        assert_eq!(derived.keywords[0], "sourdough");
        assert_eq!(derived.keywords[1], "baking");
        assert!(derived.keywords.contains(&"starter".to_string()));
        assert!(!derived.keywords.contains(&"the".to_string()));
        assert!(derived.keywords.len() <= 5);
    }

    #[test]
    fn description_uses_first_paragraph_without_markup() {
        let derived = KeywordHeuristic::default().derive(
            "Title",
            "# Heading\n\nThis is **the** opening paragraph.\n\nSecond paragraph.",
        );
        assert_eq!(derived.description, "Heading");

        let derived = KeywordHeuristic::default().derive("Title", "\n\nThis is **the** opening.");
        assert_eq!(derived.description, "This is the opening.");
    }

    #[test]
    fn description_is_truncated_on_word_boundary() {
        let heuristic = KeywordHeuristic {
            max_keywords: 3,
            max_description_chars: 20,
        };
        let derived = heuristic.derive("", "alpha beta gamma delta epsilon zeta");
        assert!(derived.description.ends_with("..."));
        assert!(derived.description.chars().count() <= 20);
        assert_eq!(derived.description, "alpha beta gamma...");
    }

    #[test]
    fn empty_body_falls_back_to_title() {
        let derived = KeywordHeuristic::default().derive("  A Title ", "");
        assert_eq!(derived.description, "A Title");
        assert_eq!(derived.keywords, vec!["title"]);
    }

    #[test]
    fn closures_are_derivers() {
        let fixed = |_: &str, _: &str| DerivedMetadata {
            keywords: vec!["k".into()],
            description: "d".into(),
        };
        assert_eq!(fixed.derive("t", "b").description, "d");
    }
}
