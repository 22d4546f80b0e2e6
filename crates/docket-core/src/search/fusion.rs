//! Score-combination primitives shared by the engines.
//!
//! - [`min_max_normalize`] rescales one arm's scores into `[0, 1]`
//! - [`circuit_breaker_ratio`] measures how dominant the lexical leader is
//! - [`weighted_rrf`] fuses two rankings by rank alone
//!
//! Every ordering produced here is deterministic: score descending, then
//! document id ascending.

use super::types::{DocId, RankedDoc, ScoredDoc};
use std::cmp::Ordering;
use std::collections::HashMap;

fn by_score_then_id(a_score: f32, a_id: &DocId, b_score: f32, b_id: &DocId) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_id.cmp(b_id))
}

/// Sorts by score descending, ties by id ascending.
pub fn sort_scored(docs: &mut [ScoredDoc]) {
    docs.sort_by(|a, b| by_score_then_id(a.score, &a.id, b.score, &b.id));
}

/// Sorts by final score, then lexical score, both descending, then id.
pub fn sort_ranked(docs: &mut [RankedDoc]) {
    docs.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let (la, lb) = (a.lexical.unwrap_or(0.0), b.lexical.unwrap_or(0.0));
                lb.partial_cmp(&la).unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Rescales scores to `[0, 1]` via `(v - min) / (max - min)`.
///
/// When every score is equal (including a single score) each maps to 1.0.
pub fn min_max_normalize(scores: &HashMap<DocId, f32>) -> HashMap<DocId, f32> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let (lo, hi) = scores
        .values()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    scores
        .iter()
        .map(|(id, &v)| {
            let norm = if range > 0.0 { (v - lo) / range } else { 1.0 };
            (id.clone(), norm)
        })
        .collect()
}

/// Ratio of the best to the second-best lexical score.
///
/// Infinite when there are fewer than two scores or the runner-up is not
/// positive. A high ratio means one document dominates lexically and fusion
/// would only dilute it.
pub fn circuit_breaker_ratio<I>(scores: I) -> f32
where
    I: IntoIterator<Item = f32>,
{
    let mut top1 = f32::NEG_INFINITY;
    let mut top2 = f32::NEG_INFINITY;
    let mut count = 0usize;
    for s in scores {
        count += 1;
        if s > top1 {
            top2 = top1;
            top1 = s;
        } else if s > top2 {
            top2 = s;
        }
    }
    if count < 2 || top2 <= 0.0 {
        f32::INFINITY
    } else {
        top1 / top2
    }
}

/// Weighted reciprocal rank fusion of two ranked lists.
///
/// `score(d) = w_lex / (k + rank_lex(d)) + w_sem / (k + rank_sem(d))` with
/// 1-based ranks; a document absent from a list gets no contribution from it.
/// Inputs must already be sorted best-first.
pub fn weighted_rrf(
    lexical: &[ScoredDoc],
    semantic: &[ScoredDoc],
    k: f32,
    lexical_weight: f32,
    semantic_weight: f32,
) -> Vec<RankedDoc> {
    let mut fused: HashMap<DocId, RankedDoc> = HashMap::new();

    for (rank, doc) in lexical.iter().enumerate() {
        let entry = fused
            .entry(doc.id.clone())
            .or_insert_with(|| RankedDoc::new(doc.id.clone(), 0.0));
        entry.score += lexical_weight / (k + (rank + 1) as f32);
        entry.lexical = Some(doc.score);
    }
    for (rank, doc) in semantic.iter().enumerate() {
        let entry = fused
            .entry(doc.id.clone())
            .or_insert_with(|| RankedDoc::new(doc.id.clone(), 0.0));
        entry.score += semantic_weight / (k + (rank + 1) as f32);
        entry.semantic = Some(doc.score);
    }

    let mut ranked: Vec<RankedDoc> = fused.into_values().collect();
    ranked.sort_by(|a, b| by_score_then_id(a.score, &a.id, b.score, &b.id));
    ranked
}

/// Removes repeated ids, keeping the first occurrence.
pub fn dedupe_ranked(docs: Vec<RankedDoc>) -> Vec<RankedDoc> {
    let mut seen = std::collections::HashSet::new();
    docs.into_iter().filter(|d| seen.insert(d.id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(pairs: &[(&str, f32)]) -> Vec<ScoredDoc> {
        pairs
            .iter()
            .map(|(id, s)| ScoredDoc {
                id: DocId::from(*id),
                score: *s,
            })
            .collect()
    }

    #[test]
    fn test_min_max_normalize_range() {
        let scores: HashMap<DocId, f32> = [("a", 2.0), ("b", 4.0), ("c", 3.0)]
            .into_iter()
            .map(|(id, s)| (DocId::from(id), s))
            .collect();
        let norm = min_max_normalize(&scores);
        assert_eq!(norm["a"], 0.0);
        assert_eq!(norm["b"], 1.0);
        assert!((norm["c"] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_min_max_normalize_constant_maps_to_one() {
        let scores: HashMap<DocId, f32> = [("a", 0.7), ("b", 0.7)]
            .into_iter()
            .map(|(id, s)| (DocId::from(id), s))
            .collect();
        let norm = min_max_normalize(&scores);
        assert!(norm.values().all(|&v| v == 1.0));
        assert!(min_max_normalize(&HashMap::new()).is_empty());
    }

    #[test]
    fn test_circuit_breaker_ratio() {
        assert_eq!(circuit_breaker_ratio([10.0, 5.0, 1.0]), 2.0);
        assert_eq!(circuit_breaker_ratio([5.0, 10.0]), 2.0);
        assert!(circuit_breaker_ratio([3.0]).is_infinite());
        assert!(circuit_breaker_ratio(std::iter::empty()).is_infinite());
        assert!(circuit_breaker_ratio([3.0, 0.0]).is_infinite());
        assert_eq!(circuit_breaker_ratio([4.0, 4.0]), 1.0);
    }

    #[test]
    fn test_weighted_rrf_favors_lexical_weight() {
        let lexical = scored(&[("a", 9.0), ("b", 5.0)]);
        let semantic = scored(&[("b", 0.9), ("c", 0.8)]);
        let fused = weighted_rrf(&lexical, &semantic, 60.0, 0.7, 0.3);

        let ids: Vec<&str> = fused.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        let b = &fused[0];
        let expected = 0.7 / 62.0 + 0.3 / 61.0;
        assert!((b.score - expected).abs() < 1e-7);
        assert_eq!(b.lexical, Some(5.0));
        assert_eq!(b.semantic, Some(0.9));
        assert_eq!(fused[2].lexical, None);
    }

    #[test]
    fn test_sort_ranked_tie_breaks() {
        let mut docs = vec![
            RankedDoc { id: "c".into(), score: 0.5, lexical: Some(1.0), semantic: None },
            RankedDoc { id: "b".into(), score: 0.5, lexical: Some(2.0), semantic: None },
            RankedDoc { id: "a".into(), score: 0.5, lexical: Some(1.0), semantic: None },
            RankedDoc { id: "d".into(), score: 0.9, lexical: None, semantic: None },
        ];
        sort_ranked(&mut docs);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let docs = vec![
            RankedDoc::new("a".into(), 0.9),
            RankedDoc::new("b".into(), 0.8),
            RankedDoc::new("a".into(), 0.1),
        ];
        let deduped = dedupe_ranked(docs);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].score, 0.9);
    }
}
