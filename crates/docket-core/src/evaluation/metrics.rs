//! Ranking-quality metrics for a single judged query.
//!
//! Every function takes the engine's ranked ids and the query's graded
//! judgments (0 = not relevant, 1 = relevant, 2 = highly relevant). Ids the
//! judgments do not mention count as grade 0. Undefined cases (no relevant
//! judgments, an ideal DCG of 0) are defined as 0 rather than reported as
//! errors.
//!
//! # References
//!
//! - Järvelin & Kekäläinen (2002). "Cumulated gain-based evaluation of IR techniques"

use crate::search::types::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Graded judgments for one query, keyed by opinion id.
pub type Grades = HashMap<DocId, u8>;

/// Grade a result must have to count as highly relevant.
pub const HIGHLY_RELEVANT: u8 = 2;

/// Metric keys in report and scorecard order.
pub const METRIC_KEYS: [&str; 7] = [
    "mrr",
    "ndcg@5",
    "ndcg@10",
    "precision@5",
    "precision@10",
    "recall@10",
    "recall@20",
];

fn grade(grades: &Grades, id: &DocId) -> u8 {
    grades.get(id).copied().unwrap_or(0)
}

// ============================================================================
// Reciprocal rank
// ============================================================================

/// `1 / rank` of the first highly relevant (grade 2) result, or 0.
///
/// Grade-1 results do not count: a query is only "answered" by an opinion
/// judged directly on point.
pub fn reciprocal_rank(results: &[DocId], grades: &Grades) -> f64 {
    results
        .iter()
        .position(|id| grade(grades, id) == HIGHLY_RELEVANT)
        .map_or(0.0, |pos| 1.0 / (pos + 1) as f64)
}

// ============================================================================
// nDCG
// ============================================================================

/// Exponential gain: grade 0 → 0, 1 → 1, 2 → 3.
#[inline]
fn gain(grade: u8) -> f64 {
    2f64.powi(i32::from(grade)) - 1.0
}

/// Logarithmic discount for a 1-based rank.
#[inline]
fn discount(rank: usize) -> f64 {
    ((rank + 1) as f64).log2()
}

fn dcg<I: IntoIterator<Item = u8>>(grades: I, k: usize) -> f64 {
    grades
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, g)| gain(g) / discount(i + 1))
        .sum()
}

/// nDCG@k.
///
/// ```text
/// DCG@k  = Σ (2^grade_i - 1) / log2(i + 1)   for ranks i = 1..=k
/// nDCG@k = DCG@k / IDCG@k
/// ```
///
/// The ideal ranking is built from *all* judgments sorted by grade, not just
/// the judged ids the engine happened to return. An ideal DCG of 0 yields 0.
pub fn ndcg_at_k(results: &[DocId], grades: &Grades, k: usize) -> f64 {
    let actual = dcg(results.iter().map(|id| grade(grades, id)), k);

    let mut ideal: Vec<u8> = grades.values().copied().collect();
    ideal.sort_unstable_by(|a, b| b.cmp(a));
    let ideal = dcg(ideal, k);

    if ideal == 0.0 {
        0.0
    } else {
        actual / ideal
    }
}

// ============================================================================
// Precision and recall
// ============================================================================

/// Relevant (grade ≥ 1) results among the first `k`, divided by `k`.
///
/// The denominator is `k` even when the engine returned fewer results.
pub fn precision_at_k(results: &[DocId], grades: &Grades, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let hits = results
        .iter()
        .take(k)
        .filter(|id| grade(grades, id) >= 1)
        .count();
    hits as f64 / k as f64
}

/// Distinct relevant results among the first `k`, over all relevant judgments.
///
/// 0 when the query has no relevant judgments.
pub fn recall_at_k(results: &[DocId], grades: &Grades, k: usize) -> f64 {
    let relevant = grades.values().filter(|&&g| g >= 1).count();
    if relevant == 0 {
        return 0.0;
    }
    let found: HashSet<&DocId> = results
        .iter()
        .take(k)
        .filter(|id| grade(grades, id) >= 1)
        .collect();
    found.len() as f64 / relevant as f64
}

// ============================================================================
// Metric set
// ============================================================================

/// The seven reported metrics for one query, or a mean over many.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSet {
    pub mrr: f64,
    #[serde(rename = "ndcg@5")]
    pub ndcg_5: f64,
    #[serde(rename = "ndcg@10")]
    pub ndcg_10: f64,
    #[serde(rename = "precision@5")]
    pub precision_5: f64,
    #[serde(rename = "precision@10")]
    pub precision_10: f64,
    #[serde(rename = "recall@10")]
    pub recall_10: f64,
    #[serde(rename = "recall@20")]
    pub recall_20: f64,
}

impl MetricSet {
    /// Computes every metric for one ranked result list.
    pub fn compute(results: &[DocId], grades: &Grades) -> Self {
        Self {
            mrr: reciprocal_rank(results, grades),
            ndcg_5: ndcg_at_k(results, grades, 5),
            ndcg_10: ndcg_at_k(results, grades, 10),
            precision_5: precision_at_k(results, grades, 5),
            precision_10: precision_at_k(results, grades, 10),
            recall_10: recall_at_k(results, grades, 10),
            recall_20: recall_at_k(results, grades, 20),
        }
    }

    /// Values in [`METRIC_KEYS`] order.
    pub fn values(&self) -> [f64; 7] {
        [
            self.mrr,
            self.ndcg_5,
            self.ndcg_10,
            self.precision_5,
            self.precision_10,
            self.recall_10,
            self.recall_20,
        ]
    }

    /// Looks a metric up by its report key.
    pub fn get(&self, key: &str) -> Option<f64> {
        METRIC_KEYS
            .iter()
            .position(|k| *k == key)
            .map(|i| self.values()[i])
    }

    /// Arithmetic mean of each metric, or `None` for no input.
    pub fn mean<'a, I>(sets: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a MetricSet>,
    {
        let mut sum = [0.0f64; 7];
        let mut n = 0usize;
        for set in sets {
            for (acc, v) in sum.iter_mut().zip(set.values()) {
                *acc += v;
            }
            n += 1;
        }
        if n == 0 {
            return None;
        }
        let m = sum.map(|s| s / n as f64);
        Some(Self {
            mrr: m[0],
            ndcg_5: m[1],
            ndcg_10: m[2],
            precision_5: m[3],
            precision_10: m[4],
            recall_10: m[5],
            recall_20: m[6],
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
