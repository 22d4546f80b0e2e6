//! Opinion corpus loading and text-field extraction.
//!
//! Opinions are stored one per file as `{id}.json`, either flat or
//! partitioned into year/topic subdirectories. Only the fields the indexes
//! need are deserialized; everything else in the file is ignored.
//!
//! # Usage
//!
//! ```ignore
//! use docket_core::corpus::{load_corpus, TextField};
//!
//! let opinions = load_corpus(Path::new("data/extracted"))?;
//! let text = opinions[0].text(TextField::QaText);
//! ```

use crate::error::CorpusError;
use crate::hash::Fnv1a;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hasher;
use std::path::Path;
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

/// Fields shorter than this (in characters) are treated as missing.
pub const MIN_FIELD_CHARS: usize = 20;

/// Topic labels that mean "unclassified".
const NON_TOPICS: &[&str] = &["None", "other"];

/// One legal opinion as read from the corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Opinion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub embedding: EmbeddingFields,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: ContentFields,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sections: Sections,
    #[serde(default, deserialize_with = "null_as_default")]
    pub classification: Classification,
    #[serde(default, deserialize_with = "null_as_default")]
    pub citations: CitationFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingFields {
    #[serde(default)]
    pub qa_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentFields {
    #[serde(default)]
    pub full_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sections {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub facts: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub topic_primary: Option<String>,
}

/// Structured citation metadata extracted upstream.
///
/// Statute and regulation entries are sometimes stored as JSON numbers;
/// both forms are read as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationFields {
    #[serde(default, deserialize_with = "string_or_number_list")]
    pub government_code: Vec<String>,
    #[serde(default, deserialize_with = "string_or_number_list")]
    pub regulations: Vec<String>,
    #[serde(default, deserialize_with = "string_or_number_list")]
    pub prior_opinions: Vec<String>,
}

/// Which part of an opinion a lexical index is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    /// `content.full_text`
    #[default]
    FullText,
    /// `embedding.qa_text`, falling back to full text when too short
    QaText,
    /// `sections.facts`
    Facts,
    /// `sections.analysis` and `sections.conclusion`, joined
    AnalysisConclusion,
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextField::FullText => "full_text",
            TextField::QaText => "qa_text",
            TextField::Facts => "facts",
            TextField::AnalysisConclusion => "analysis_conclusion",
        };
        f.write_str(name)
    }
}

impl Opinion {
    /// Extracts the text for `field`, or an empty string if it is missing.
    pub fn text(&self, field: TextField) -> String {
        match field {
            TextField::FullText => self.full_text().to_string(),
            TextField::QaText => {
                let qa = self.embedding.qa_text.as_deref().unwrap_or("");
                if is_substantial(qa) {
                    qa.to_string()
                } else {
                    self.full_text().to_string()
                }
            }
            TextField::Facts => substantial(self.sections.facts.as_deref())
                .unwrap_or("")
                .to_string(),
            TextField::AnalysisConclusion => {
                let analysis = substantial(self.sections.analysis.as_deref());
                let conclusion = substantial(self.sections.conclusion.as_deref());
                match (analysis, conclusion) {
                    (Some(a), Some(c)) => format!("{a}\n\n{c}"),
                    (Some(a), None) => a.to_string(),
                    (None, Some(c)) => c.to_string(),
                    (None, None) => String::new(),
                }
            }
        }
    }

    /// Text for lexical indexing, falling back to secondary fields when the
    /// requested one is empty.
    ///
    /// Returns the text and whether a fallback was used.
    pub fn lexical_text(&self, field: TextField) -> (String, bool) {
        let primary = self.text(field);
        if !primary.trim().is_empty() {
            return (primary, false);
        }

        let fallbacks = [
            self.embedding.qa_text.as_deref(),
            self.content.full_text.as_deref(),
            self.summary.as_deref(),
            self.sections.question.as_deref(),
        ];
        let text = fallbacks
            .into_iter()
            .flatten()
            .find(|t| !t.trim().is_empty())
            .unwrap_or("")
            .to_string();
        (text, true)
    }

    /// Primary topic label, if the opinion is classified.
    pub fn topic(&self) -> Option<&str> {
        self.classification
            .topic_primary
            .as_deref()
            .filter(|t| !t.is_empty() && !NON_TOPICS.iter().any(|n| n == t))
    }

    fn full_text(&self) -> &str {
        self.content.full_text.as_deref().unwrap_or("")
    }
}

fn is_substantial(text: &str) -> bool {
    text.chars().count() >= MIN_FIELD_CHARS
}

fn substantial(text: Option<&str>) -> Option<&str> {
    text.filter(|t| is_substantial(t))
}

/// Loads every `*.json` opinion under `root`, in sorted path order.
///
/// Files without an `id` take their file stem as id. When two files share an
/// id the first one wins and the duplicate is logged.
///
/// # Errors
///
/// Returns [`CorpusError`] if the root is missing, a file cannot be read or
/// parsed, or no opinions are found.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn load_corpus(root: &Path) -> Result<Vec<Opinion>, CorpusError> {
    if !root.exists() {
        return Err(CorpusError::NotFound(root.display().to_string()));
    }

    let mut opinions = Vec::new();
    let mut seen = HashSet::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| CorpusError::Read {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        let raw = std::fs::read_to_string(path).map_err(|e| CorpusError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut opinion: Opinion =
            serde_json::from_str(&raw).map_err(|e| CorpusError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        if opinion.id.is_empty() {
            opinion.id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        if !seen.insert(opinion.id.clone()) {
            warn!(id = %opinion.id, path = %path.display(), "duplicate opinion id, keeping first");
            continue;
        }
        opinions.push(opinion);
    }

    if opinions.is_empty() {
        return Err(CorpusError::Empty(root.display().to_string()));
    }

    info!(count = opinions.len(), "loaded corpus");
    Ok(opinions)
}

/// Order-sensitive FNV-1a digest of opinion ids.
///
/// Stored in the index manifest so a changed corpus forces a rebuild.
pub fn corpus_digest(opinions: &[Opinion]) -> u64 {
    let mut hasher = Fnv1a::default();
    for opinion in opinions {
        hasher.write(opinion.id.as_bytes());
        hasher.write_u8(0);
    }
    hasher.finish()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_number_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opinion_json(id: &str, qa: &str, full: &str) -> String {
        serde_json::json!({
            "id": id,
            "embedding": {"qa_text": qa},
            "content": {"full_text": full},
            "sections": {
                "facts": "The official owns rental property near the project site.",
                "analysis": "short",
                "conclusion": "The official must recuse from the decision entirely."
            },
            "classification": {"topic_primary": "conflicts_of_interest"},
            "citations": {"government_code": ["87103(a)", 87100], "regulations": [18702.2]}
        })
        .to_string()
    }

    #[test]
    fn test_qa_text_falls_back_to_full_text_when_short() {
        let opinion: Opinion =
            serde_json::from_str(&opinion_json("A-1", "too short", "the full opinion text")).unwrap();
        assert_eq!(opinion.text(TextField::QaText), "the full opinion text");
    }

    #[test]
    fn test_analysis_view_skips_short_sections() {
        let opinion: Opinion = serde_json::from_str(&opinion_json("A-1", "", "")).unwrap();
        assert_eq!(
            opinion.text(TextField::AnalysisConclusion),
            "The official must recuse from the decision entirely."
        );
    }

    #[test]
    fn test_numeric_citations_read_as_strings() {
        let opinion: Opinion = serde_json::from_str(&opinion_json("A-1", "", "")).unwrap();
        assert_eq!(opinion.citations.government_code, vec!["87103(a)", "87100"]);
        assert_eq!(opinion.citations.regulations, vec!["18702.2"]);
    }

    #[test]
    fn test_null_sections_are_tolerated() {
        let opinion: Opinion =
            serde_json::from_str(r#"{"id": "89-142", "sections": null, "citations": null}"#).unwrap();
        assert_eq!(opinion.text(TextField::Facts), "");
        assert!(opinion.citations.government_code.is_empty());
    }

    #[test]
    fn test_lexical_text_fallback() {
        let opinion: Opinion = serde_json::from_str(
            r#"{"id": "75003", "summary": "Summary of the advice letter."}"#,
        )
        .unwrap();
        let (text, fell_back) = opinion.lexical_text(TextField::FullText);
        assert!(fell_back);
        assert_eq!(text, "Summary of the advice letter.");
    }

    #[test]
    fn test_topic_filters_unclassified() {
        let mut opinion = Opinion::default();
        opinion.classification.topic_primary = Some("other".to_string());
        assert_eq!(opinion.topic(), None);
        opinion.classification.topic_primary = Some("lobbying".to_string());
        assert_eq!(opinion.topic(), Some("lobbying"));
    }

    #[test]
    fn test_load_corpus_walks_partitions_and_uses_file_stem() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("1989")).unwrap();
        std::fs::create_dir_all(dir.path().join("2024")).unwrap();
        std::fs::write(
            dir.path().join("2024/A-24-003.json"),
            opinion_json("A-24-003", "", "text"),
        )
        .unwrap();
        std::fs::write(dir.path().join("1989/89-142.json"), r#"{"content": {}}"#).unwrap();
        std::fs::write(dir.path().join("1989/notes.txt"), "ignored").unwrap();

        let opinions = load_corpus(dir.path()).unwrap();
        let ids: Vec<_> = opinions.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["89-142", "A-24-003"]);
    }

    #[test]
    fn test_load_corpus_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let err = load_corpus(dir.path()).unwrap_err();
        assert!(matches!(err, CorpusError::Malformed { .. }));
    }

    #[test]
    fn test_load_corpus_missing_root() {
        let err = load_corpus(Path::new("/nonexistent/docket/corpus")).unwrap_err();
        assert!(matches!(err, CorpusError::NotFound(_)));
    }

    #[test]
    fn test_digest_changes_with_ids() {
        let a = Opinion {
            id: "A".into(),
            ..Default::default()
        };
        let b = Opinion {
            id: "B".into(),
            ..Default::default()
        };
        assert_ne!(
            corpus_digest(&[a.clone(), b.clone()]),
            corpus_digest(&[b, a])
        );
    }
}
