//! Statute and regulation citations: query parsing and the inverted index.
//!
//! Government Code sections appear as `87103`, `87103(a)`, `Section 1090` or
//! `Gov. Code 87100`; regulations as `Regulation 18702.2` or a bare
//! `18702.2`. The parser turns all of these into canonical [`Citation`]s and
//! the [`CitationIndex`] maps canonical keys to the opinions whose structured
//! citation metadata contains them.
//!
//! Many opinions only record the base section (`87103`) even when the text
//! discusses a subsection. Base-level matches are therefore kept separately
//! from exact matches and still pull those opinions into a candidate pool.

use super::types::DocId;
use crate::corpus::Opinion;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use tracing::{info, instrument};

static PREFIXED_STATUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Section|Gov(?:ernment)?\.?\s*Code)\s+(\d{3,5})(\([a-zA-Z0-9]\))?")
        .expect("static regex")
});

static PREFIXED_REGULATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Reg(?:ulation)?\.?)\s+(\d{4,5}(?:\.\d+)?)").expect("static regex")
});

// Political Reform Act (81000-91014) and Section 1090 (1090-1097) only.
static BARE_STATUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(8[1-9]\d{3}|90\d{3}|91014|109[0-7])(?:\(([a-zA-Z0-9])\))?\b")
        .expect("static regex")
});

// Title 2, Division 6 regulations.
static BARE_REGULATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(18\d{3}(?:\.\d+)?)\b").expect("static regex"));

static LEADING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)").expect("static regex"));

/// Kind of legal reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    /// Government Code section
    Statute,
    /// Title 2 regulation
    Regulation,
}

/// A canonical citation extracted from text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub kind: CitationKind,
    /// Canonical key: `87103(a)`, `18702.2`
    pub raw: String,
    /// Base section: `87103`, `18702`
    pub base: String,
    /// `(a)`, `.2`, or empty
    pub subsection: String,
}

impl Citation {
    fn statute(base: &str, subsection: &str) -> Self {
        Self {
            kind: CitationKind::Statute,
            raw: format!("{base}{subsection}"),
            base: base.to_string(),
            subsection: subsection.to_string(),
        }
    }

    fn regulation(full: &str) -> Self {
        let (base, subsection) = match full.split_once('.') {
            Some((base, rest)) => (base.to_string(), format!(".{rest}")),
            None => (full.to_string(), String::new()),
        };
        Self {
            kind: CitationKind::Regulation,
            raw: full.to_string(),
            base,
            subsection,
        }
    }

    pub fn has_subsection(&self) -> bool {
        !self.subsection.is_empty()
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CitationKind::Statute => write!(f, "§{}", self.raw),
            CitationKind::Regulation => write!(f, "Reg. {}", self.raw),
        }
    }
}

/// Extracts distinct citations from `text`, in pattern order.
///
/// Prefixed forms are matched first. A bare number inside an already
/// matched prefixed reference of the same kind is not reported again, so
/// `"Section 87103(a)"` yields only `87103(a)`. Kinds never shadow each
/// other: `"Section 18702.2"` yields statute `18702` and regulation
/// `18702.2`.
pub fn parse_citations(text: &str) -> Vec<Citation> {
    let mut found: Vec<Citation> = Vec::new();
    let mut statute_spans: Vec<Range<usize>> = Vec::new();
    let mut regulation_spans: Vec<Range<usize>> = Vec::new();

    for caps in PREFIXED_STATUTE.captures_iter(text) {
        let (Some(whole), Some(base)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let sub = caps.get(2).map_or("", |m| m.as_str());
        statute_spans.push(whole.range());
        push(Citation::statute(base.as_str(), sub), &mut found);
    }

    for caps in PREFIXED_REGULATION.captures_iter(text) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        regulation_spans.push(whole.range());
        push(Citation::regulation(number.as_str()), &mut found);
    }

    for caps in BARE_STATUTE.captures_iter(text) {
        let (Some(whole), Some(base)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if overlaps(&statute_spans, &whole.range()) {
            continue;
        }
        let sub = caps
            .get(2)
            .map(|m| format!("({})", m.as_str()))
            .unwrap_or_default();
        push(Citation::statute(base.as_str(), &sub), &mut found);
    }

    for caps in BARE_REGULATION.captures_iter(text) {
        let Some(number) = caps.get(1) else {
            continue;
        };
        if overlaps(&regulation_spans, &number.range()) {
            continue;
        }
        push(Citation::regulation(number.as_str()), &mut found);
    }

    found
}

/// Candidate set produced by citation matching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitationPool {
    pub ids: BTreeSet<DocId>,
    /// Ids reached only through a base-level key
    pub base_only: usize,
}

/// Inverted index from citation keys and topics to opinion ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationIndex {
    statute_exact: BTreeMap<String, BTreeSet<DocId>>,
    statute_base: BTreeMap<String, BTreeSet<DocId>>,
    regulation_exact: BTreeMap<String, BTreeSet<DocId>>,
    topics: BTreeMap<String, BTreeSet<DocId>>,
}

impl CitationIndex {
    /// Builds the index from each opinion's structured citation metadata.
    #[instrument(skip_all, fields(docs = opinions.len()))]
    pub fn build(opinions: &[Opinion]) -> Self {
        let mut index = Self::default();

        for op in opinions {
            let id = DocId::from(op.id.as_str());

            for statute in &op.citations.government_code {
                let key = statute.trim();
                if key.is_empty() {
                    continue;
                }
                index
                    .statute_exact
                    .entry(key.to_string())
                    .or_default()
                    .insert(id.clone());
                if let Some(base) = LEADING_DIGITS.captures(key).and_then(|c| c.get(1)) {
                    index
                        .statute_base
                        .entry(base.as_str().to_string())
                        .or_default()
                        .insert(id.clone());
                }
            }

            for regulation in &op.citations.regulations {
                let key = regulation.trim();
                if key.is_empty() {
                    continue;
                }
                index
                    .regulation_exact
                    .entry(key.to_string())
                    .or_default()
                    .insert(id.clone());
            }

            if let Some(topic) = op.topic() {
                index
                    .topics
                    .entry(topic.to_string())
                    .or_default()
                    .insert(id);
            }
        }

        info!(
            statute_exact = index.statute_exact.len(),
            statute_base = index.statute_base.len(),
            regulation_exact = index.regulation_exact.len(),
            topics = index.topics.len(),
            "Built citation index"
        );
        index
    }

    /// Union of every opinion matching any of `citations`.
    ///
    /// Statutes contribute exact and base matches. Regulations contribute
    /// exact matches, plus matches on the bare base when the query named a
    /// subsection.
    pub fn pool(&self, citations: &[Citation]) -> CitationPool {
        let mut exact: BTreeSet<DocId> = BTreeSet::new();
        let mut base: BTreeSet<DocId> = BTreeSet::new();

        for c in citations {
            match c.kind {
                CitationKind::Statute => {
                    exact.extend(self.statute_exact(&c.raw).iter().cloned());
                    base.extend(self.statute_base(&c.base).iter().cloned());
                }
                CitationKind::Regulation => {
                    exact.extend(self.regulation_exact(&c.raw).iter().cloned());
                    if c.has_subsection() {
                        base.extend(self.regulation_exact(&c.base).iter().cloned());
                    }
                }
            }
        }

        let base_only = base.difference(&exact).count();
        exact.extend(base);
        CitationPool {
            ids: exact,
            base_only,
        }
    }

    pub fn statute_exact(&self, key: &str) -> &BTreeSet<DocId> {
        self.statute_exact.get(key).unwrap_or(&EMPTY)
    }

    pub fn statute_base(&self, base: &str) -> &BTreeSet<DocId> {
        self.statute_base.get(base).unwrap_or(&EMPTY)
    }

    pub fn regulation_exact(&self, key: &str) -> &BTreeSet<DocId> {
        self.regulation_exact.get(key).unwrap_or(&EMPTY)
    }

    pub fn topic(&self, label: &str) -> &BTreeSet<DocId> {
        self.topics.get(label).unwrap_or(&EMPTY)
    }

    pub fn key_count(&self) -> usize {
        self.statute_exact.len() + self.regulation_exact.len()
    }
}

static EMPTY: BTreeSet<DocId> = BTreeSet::new();

fn overlaps(spans: &[Range<usize>], r: &Range<usize>) -> bool {
    spans.iter().any(|c| r.start < c.end && c.start < r.end)
}

fn push(citation: Citation, found: &mut Vec<Citation>) {
    if !found
        .iter()
        .any(|c| c.kind == citation.kind && c.raw == citation.raw)
    {
        found.push(citation);
    }
}
