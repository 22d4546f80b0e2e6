use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Opinion identifier, e.g. `"A-24-006"`.
///
/// Ids come from the corpus and are opaque strings; ordering is plain string
/// order and is used as the final tie-breaker in every ranking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for DocId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A semantic view of an opinion: one embedding per (opinion, view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Question/answer text; the primary view
    Qa,
    /// Facts section
    Facts,
    /// Analysis and conclusion sections
    Analysis,
}

impl View {
    pub const ALL: [View; 3] = [View::Qa, View::Facts, View::Analysis];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Qa => "qa",
            View::Facts => "facts",
            View::Analysis => "analysis",
        }
    }

    /// Corpus field the view's text is drawn from.
    pub fn text_field(&self) -> crate::corpus::TextField {
        use crate::corpus::TextField;
        match self {
            View::Qa => TextField::QaText,
            View::Facts => TextField::Facts,
            View::Analysis => TextField::AnalysisConclusion,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, View::Qa)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document with a single arm's score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDoc {
    pub id: DocId,
    pub score: f32,
}

/// One entry of a final ranking.
///
/// `score` is what the ranking is sorted by. The per-arm components are kept
/// for `--explain` output; an arm that did not run for the query is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDoc {
    pub id: DocId,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<f32>,
}

impl RankedDoc {
    pub fn new(id: DocId, score: f32) -> Self {
        Self {
            id,
            score,
            lexical: None,
            semantic: None,
        }
    }
}

/// Which route a query took through an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum SearchPath {
    /// No usable query terms
    Empty,
    /// Ranked by one arm only (no citations, or a single-arm engine)
    LexicalOnly,
    /// Semantic-only engine
    SemanticOnly,
    /// Lexical leader was dominant; semantic arm skipped
    CircuitBreaker { ratio: f32 },
    /// Both arms ran and were fused
    Fused { ratio: f32 },
    /// Semantic arm failed; ranking fell back to lexical
    Degraded { reason: String },
}

impl SearchPath {
    pub fn label(&self) -> &'static str {
        match self {
            SearchPath::Empty => "empty",
            SearchPath::LexicalOnly => "lexical_only",
            SearchPath::SemanticOnly => "semantic_only",
            SearchPath::CircuitBreaker { .. } => "circuit_breaker",
            SearchPath::Fused { .. } => "fused",
            SearchPath::Degraded { .. } => "degraded",
        }
    }
}

/// Everything an engine reports for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub path: SearchPath,
    /// Candidate pool size, 0 when no pool was built
    pub pool_size: usize,
    /// Citation keys extracted from the query
    pub citations: Vec<String>,
    pub results: Vec<RankedDoc>,
}

impl SearchOutcome {
    pub fn empty() -> Self {
        Self {
            path: SearchPath::Empty,
            pool_size: 0,
            citations: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn ids(&self) -> Vec<DocId> {
        self.results.iter().map(|r| r.id.clone()).collect()
    }
}
