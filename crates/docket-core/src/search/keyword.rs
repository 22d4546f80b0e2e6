//! BM25 (Okapi) keyword index for exact term matching.
//!
//! Statute numbers, defined terms and party names are what lawyers type, and
//! they are exactly what dense embeddings blur. This index scores them with
//! the classic Okapi weighting:
//!
//! ```text
//! idf(t)      = ln(N - df + 0.5) - ln(df + 0.5)
//! score(d, q) = Σ_{t ∈ q} idf(t) · tf·(k1 + 1) / (tf + k1·(1 - b + b·|d|/avgdl))
//! ```
//!
//! Terms present in more than half the corpus get a negative raw IDF; those
//! are floored to `ε · mean(idf)` with ε = [`BM25_IDF_EPSILON`]. Repeated
//! query terms contribute once per occurrence.
//!
//! # Usage
//!
//! ```ignore
//! use docket_core::search::keyword::LexicalIndex;
//! use docket_core::search::tokenize::tokenize;
//!
//! let index = LexicalIndex::build(&opinions, &LexicalConfig::default());
//! let top = index.top_k(&tokenize("section 87103(a) gifts"), 10);
//! ```

use super::fusion::sort_scored;
use super::tokenize::tokenize;
use super::types::{DocId, ScoredDoc};
use crate::config::{LexicalConfig, BM25_IDF_EPSILON};
use crate::corpus::{Opinion, TextField};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Serialized form of a [`LexicalIndex`], without derived lookups.
#[derive(Clone, Serialize, Deserialize)]
pub struct LexicalData {
    k1: f32,
    b: f32,
    field: TextField,
    ids: Vec<DocId>,
    doc_len: Vec<u32>,
    avgdl: f32,
    idf: HashMap<String, f32>,
    /// term -> (document position, term frequency)
    postings: HashMap<String, Vec<(u32, u32)>>,
}

/// Immutable BM25 index over one text field of the corpus.
///
/// Built once, then shared read-only across concurrent queries.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "LexicalData", into = "LexicalData")]
pub struct LexicalIndex {
    data: LexicalData,
    positions: HashMap<DocId, usize>,
}

impl From<LexicalData> for LexicalIndex {
    fn from(data: LexicalData) -> Self {
        let positions = data
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self { data, positions }
    }
}

impl From<LexicalIndex> for LexicalData {
    fn from(index: LexicalIndex) -> Self {
        index.data
    }
}

/// Opinions whose configured field could not be indexed as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextQuality {
    /// Indexed from a secondary field
    pub fallbacks: Vec<DocId>,
    /// Indexed with no tokens at all
    pub empty: Vec<DocId>,
}

/// Number of example ids included in the data-quality warnings.
const SAMPLE_IDS: usize = 5;

impl TextQuality {
    /// Logs one warning per kind of problem, with a sample of ids.
    pub fn warn(&self, field: TextField) {
        for id in &self.fallbacks {
            debug!(doc_id = %id, %field, "Field empty, indexed a secondary field");
        }
        if !self.fallbacks.is_empty() {
            warn!(
                count = self.fallbacks.len(),
                %field,
                sample = ?sample(&self.fallbacks),
                "Opinions with an empty field were indexed from a secondary field"
            );
        }
        if !self.empty.is_empty() {
            warn!(
                count = self.empty.len(),
                %field,
                sample = ?sample(&self.empty),
                "Opinions have no indexable text and can never match a query"
            );
        }
    }
}

fn sample(ids: &[DocId]) -> Vec<&str> {
    ids.iter().take(SAMPLE_IDS).map(DocId::as_str).collect()
}

/// Tokenizes each opinion's `field`, recording fallbacks and empty documents.
pub fn tokenize_opinions(
    opinions: &[Opinion],
    field: TextField,
) -> (Vec<(DocId, Vec<String>)>, TextQuality) {
    let mut quality = TextQuality::default();
    let tokenized = opinions
        .iter()
        .map(|op| {
            let id = DocId::from(op.id.as_str());
            let (text, fell_back) = op.lexical_text(field);
            let tokens = tokenize(&text);
            if tokens.is_empty() {
                quality.empty.push(id.clone());
            } else if fell_back {
                quality.fallbacks.push(id.clone());
            }
            (id, tokens)
        })
        .collect();
    (tokenized, quality)
}

impl LexicalIndex {
    /// Builds the index over `config.field`.
    ///
    /// Opinions whose field is empty fall back to a secondary field (see
    /// [`Opinion::lexical_text`]). Fallbacks and opinions left without any
    /// tokens are reported at warn level.
    #[instrument(skip_all, fields(docs = opinions.len(), field = %config.field))]
    pub fn build(opinions: &[Opinion], config: &LexicalConfig) -> Self {
        let (tokenized, quality) = tokenize_opinions(opinions, config.field);
        quality.warn(config.field);

        let index = Self::from_tokenized(tokenized, config);
        info!(
            docs = index.len(),
            terms = index.data.idf.len(),
            avgdl = index.data.avgdl,
            fallbacks = quality.fallbacks.len(),
            empty = quality.empty.len(),
            "Built BM25 index"
        );
        index
    }

    /// Builds the index from pre-tokenized documents.
    pub fn from_tokenized(documents: Vec<(DocId, Vec<String>)>, config: &LexicalConfig) -> Self {
        let n = documents.len();
        let mut ids = Vec::with_capacity(n);
        let mut doc_len = Vec::with_capacity(n);
        let mut postings: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
        let mut total_len: u64 = 0;

        for (pos, (id, tokens)) in documents.into_iter().enumerate() {
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.clone()).or_insert(0) += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push((pos as u32, count));
            }
            total_len += tokens.len() as u64;
            doc_len.push(tokens.len() as u32);
            ids.push(id);
        }

        let avgdl = if n == 0 {
            0.0
        } else {
            total_len as f32 / n as f32
        };
        let idf = compute_idf(n, &postings);

        LexicalData {
            k1: config.k1,
            b: config.b,
            field: config.field,
            ids,
            doc_len,
            avgdl,
            idf,
            postings,
        }
        .into()
    }

    /// Scores every document, indexed by corpus position.
    ///
    /// Documents sharing no term with the query score 0.
    pub fn score_all(&self, tokens: &[String]) -> Vec<f32> {
        let d = &self.data;
        let mut scores = vec![0.0f32; d.ids.len()];
        // Degenerate corpus of empty documents; every tf is 0 anyway.
        let avgdl = if d.avgdl > 0.0 { d.avgdl } else { 1.0 };

        for token in tokens {
            let (Some(&idf), Some(list)) = (d.idf.get(token), d.postings.get(token)) else {
                continue;
            };
            for &(pos, tf) in list {
                let tf = tf as f32;
                let len_norm = 1.0 - d.b + d.b * d.doc_len[pos as usize] as f32 / avgdl;
                scores[pos as usize] += idf * tf * (d.k1 + 1.0) / (tf + d.k1 * len_norm);
            }
        }
        scores
    }

    /// Positive scores keyed by document id.
    ///
    /// A query with no matching terms yields an empty map.
    pub fn scores(&self, tokens: &[String]) -> HashMap<DocId, f32> {
        self.score_all(tokens)
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .map(|(pos, s)| (self.data.ids[pos].clone(), s))
            .collect()
    }

    /// Top `k` documents with a positive score, best first, ties by id.
    pub fn top_k(&self, tokens: &[String], k: usize) -> Vec<ScoredDoc> {
        let mut hits: Vec<ScoredDoc> = self
            .score_all(tokens)
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .map(|(pos, score)| ScoredDoc {
                id: self.data.ids[pos].clone(),
                score,
            })
            .collect();
        sort_scored(&mut hits);
        hits.truncate(k);
        hits
    }

    /// Corpus position of `id`, if indexed.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn ids(&self) -> &[DocId] {
        &self.data.ids
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.data.idf.get(term).copied()
    }

    pub fn field(&self) -> TextField {
        self.data.field
    }

    pub fn avgdl(&self) -> f32 {
        self.data.avgdl
    }

    pub fn len(&self) -> usize {
        self.data.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compute_idf(n: usize, postings: &HashMap<String, Vec<(u32, u32)>>) -> HashMap<String, f32> {
    let n = n as f64;
    let mut idf: HashMap<String, f32> = HashMap::with_capacity(postings.len());
    let mut idf_sum = 0.0f64;
    let mut negative = Vec::new();

    for (term, list) in postings {
        let df = list.len() as f64;
        let value = (n - df + 0.5).ln() - (df + 0.5).ln();
        idf_sum += value;
        if value < 0.0 {
            negative.push(term.clone());
        }
        idf.insert(term.clone(), value as f32);
    }

    if !idf.is_empty() {
        let floor = (BM25_IDF_EPSILON as f64 * idf_sum / idf.len() as f64) as f32;
        for term in negative {
            idf.insert(term, floor);
        }
    }
    idf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(docs: &[(&str, &str)]) -> LexicalIndex {
        let tokenized = docs
            .iter()
            .map(|(id, text)| (DocId::from(*id), tokenize(text)))
            .collect();
        LexicalIndex::from_tokenized(tokenized, &LexicalConfig::default())
    }

    fn corpus() -> LexicalIndex {
        index_of(&[
            ("A-01", "conflict of interest under section 87103(a) for a city council member"),
            ("A-02", "gift limits for lobbyists and gift reporting"),
            ("A-03", "campaign contribution limits for committees"),
            ("A-04", "revolving door restrictions after leaving agency employment"),
            ("A-05", "section 1090 contracts and financial interest"),
        ])
    }

    #[test]
    fn test_rare_term_ranks_matching_doc_first() {
        let index = corpus();
        let top = index.top_k(&tokenize("87103(a) council member"), 5);
        assert_eq!(top[0].id.as_str(), "A-01");
        assert!(top.iter().all(|d| d.score > 0.0));
    }

    #[test]
    fn test_unmatched_query_returns_empty() {
        let index = corpus();
        assert!(index.scores(&tokenize("zoning variance")).is_empty());
        assert!(index.top_k(&tokenize("zoning variance"), 10).is_empty());
        assert!(index.top_k(&[], 10).is_empty());
    }

    #[test]
    fn test_term_frequency_saturates_but_increases() {
        let index = index_of(&[
            ("d1", "gift"),
            ("d2", "gift gift gift"),
            ("d3", "travel"),
            ("d4", "honoraria"),
            ("d5", "loans"),
        ]);
        let scores = index.scores(&tokenize("gift"));
        assert!(scores["d2"] > scores["d1"]);
        assert!(scores["d2"] < 3.0 * scores["d1"]);
    }

    #[test]
    fn test_idf_matches_okapi_formula() {
        let index = corpus();
        // "section" appears in 2 of 5 documents.
        let expected = ((5.0f32 - 2.0 + 0.5) / (2.0 + 0.5)).ln();
        assert!((index.idf("section").unwrap() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_negative_idf_is_floored() {
        // "gift" appears in 3 of 4 docs: raw idf = ln(1.5/3.5) < 0.
        let index = index_of(&[
            ("d1", "gift travel"),
            ("d2", "gift loans"),
            ("d3", "gift honoraria"),
            ("d4", "campaign"),
        ]);
        let idf_gift = index.idf("gift").unwrap();
        let raw = [
            (4.0f64 - 3.0 + 0.5).ln() - (3.0f64 + 0.5).ln(),
            (4.0f64 - 1.0 + 0.5).ln() - (1.0f64 + 0.5).ln(),
        ];
        // one term with df=3, four terms with df=1
        let mean = (raw[0] + 4.0 * raw[1]) / 5.0;
        assert!((idf_gift as f64 - 0.25 * mean).abs() < 1e-5);
        assert!(idf_gift > 0.0);
    }

    #[test]
    fn test_ties_break_by_id() {
        let index = index_of(&[("b", "gift"), ("a", "gift"), ("c", "travel loans")]);
        let top = index.top_k(&tokenize("gift"), 10);
        let ids: Vec<&str> = top.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_documents_do_not_divide_by_zero() {
        let index = index_of(&[("d1", ""), ("d2", "the of and")]);
        assert_eq!(index.avgdl(), 0.0);
        let scores = index.score_all(&tokenize("anything"));
        assert!(scores.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_round_trips_through_json() {
        let index = corpus();
        let bytes = serde_json::to_vec(&index).unwrap();
        let restored: LexicalIndex = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.position("A-03"), Some(2));
        let q = tokenize("gift reporting");
        assert_eq!(index.top_k(&q, 3), restored.top_k(&q, 3));
    }

    #[test]
    fn test_build_uses_fallback_for_empty_field() {
        let mut op = Opinion {
            id: "A-09".to_string(),
            ..Default::default()
        };
        op.summary = Some("Behested payments by an elected officer".to_string());
        let index = LexicalIndex::build(&[op], &LexicalConfig::default());
        assert_eq!(index.len(), 1);
        assert!(index.idf("behested").is_some());
    }

    #[test]
    fn test_tokenize_opinions_reports_fallbacks_and_empty_docs() {
        let full = Opinion {
            id: "A-01".to_string(),
            content: crate::corpus::ContentFields {
                full_text: Some("Gifts from lobbyists".to_string()),
            },
            ..Default::default()
        };
        let fallback = Opinion {
            id: "A-02".to_string(),
            summary: Some("Behested payments".to_string()),
            ..Default::default()
        };
        let blank = Opinion {
            id: "A-03".to_string(),
            ..Default::default()
        };

        let (tokenized, quality) =
            tokenize_opinions(&[full, fallback, blank], TextField::FullText);
        assert_eq!(tokenized.len(), 3);
        assert!(tokenized[2].1.is_empty());
        assert_eq!(quality.fallbacks, vec![DocId::from("A-02")]);
        assert_eq!(quality.empty, vec![DocId::from("A-03")]);
    }
}
