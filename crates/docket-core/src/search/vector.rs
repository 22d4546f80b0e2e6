//! Multi-view dense similarity over L2-normalized embeddings.
//!
//! Each opinion has up to three vectors, one per [`View`]. The primary `qa`
//! view covers every opinion (falling back to full text); `facts` and
//! `analysis` only exist where the opinion has a substantial section.
//!
//! All stored vectors are unit length, so cosine similarity is a plain dot
//! product. The corpus is small enough that an exact flat scan is used
//! instead of an approximate graph index: scores are exact and every
//! pool member can be scored directly.

use super::fusion::sort_scored;
use super::types::{DocId, ScoredDoc, View};
use crate::config::ViewPolicy;
use crate::corpus::Opinion;
use crate::embedding::l2_normalize;
use crate::error::SearchError;
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

/// Text embedded for `view`, or `None` if the opinion has no such view.
///
/// The primary view always yields text (possibly empty) so that every
/// opinion has a primary vector.
pub fn view_text(opinion: &Opinion, view: View) -> Option<String> {
    let text = opinion.text(view.text_field());
    if view.is_primary() || !text.is_empty() {
        Some(text)
    } else {
        None
    }
}

/// Row-major matrix of unit vectors for one view.
#[derive(Debug, Clone, Default)]
pub struct ViewVectors {
    dimension: usize,
    ids: Vec<DocId>,
    positions: HashMap<DocId, usize>,
    data: Vec<f32>,
}

impl ViewVectors {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Adds (or replaces) a vector, normalizing it to unit length.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::IndexUnavailable`] if the dimension is wrong.
    pub fn insert(&mut self, id: DocId, mut vector: Vec<f32>) -> Result<(), SearchError> {
        if vector.len() != self.dimension {
            return Err(SearchError::IndexUnavailable(format!(
                "vector for {id} has dimension {}, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        l2_normalize(&mut vector);

        match self.positions.get(&id) {
            Some(&row) => {
                let start = row * self.dimension;
                self.data[start..start + self.dimension].copy_from_slice(&vector);
            }
            None => {
                self.positions.insert(id.clone(), self.ids.len());
                self.ids.push(id);
                self.data.extend_from_slice(&vector);
            }
        }
        Ok(())
    }

    /// Dot product of `query` with every row, in row order.
    pub fn similarities(&self, query: &[f32]) -> Vec<f32> {
        if self.dimension == 0 {
            return Vec::new();
        }
        self.data
            .chunks_exact(self.dimension)
            .map(|row| row.iter().zip(query).map(|(a, b)| a * b).sum())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn ids(&self) -> &[DocId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Semantic index over one or more views with a combination policy.
#[derive(Debug, Clone)]
pub struct SemanticIndex {
    dimension: usize,
    policy: ViewPolicy,
    views: BTreeMap<View, ViewVectors>,
}

impl SemanticIndex {
    pub fn new(dimension: usize, policy: ViewPolicy) -> Self {
        Self {
            dimension,
            policy,
            views: BTreeMap::new(),
        }
    }

    pub fn insert_view(&mut self, view: View, vectors: ViewVectors) {
        self.views.insert(view, vectors);
    }

    /// Returns a copy that combines views under a different policy.
    pub fn with_policy(&self, policy: ViewPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn policy(&self) -> ViewPolicy {
        self.policy
    }

    pub fn view(&self, view: View) -> Option<&ViewVectors> {
        self.views.get(&view)
    }

    /// Number of opinions with a primary vector.
    pub fn len(&self) -> usize {
        self.views.get(&View::Qa).map_or(0, ViewVectors::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Combined similarity of every opinion that has at least one vector.
    ///
    /// The query is normalized here; callers pass the raw embedding.
    #[instrument(skip_all, fields(policy = ?self.policy))]
    pub fn scores(&self, query: &[f32]) -> HashMap<DocId, f32> {
        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let mut per_view: BTreeMap<View, HashMap<&DocId, f32>> = BTreeMap::new();
        for (view, vectors) in &self.views {
            if matches!(self.policy, ViewPolicy::PrimaryOnly) && !view.is_primary() {
                continue;
            }
            let sims = vectors.similarities(&query);
            per_view.insert(*view, vectors.ids().iter().zip(sims).collect());
        }

        let mut docs: Vec<&DocId> = per_view.values().flat_map(|m| m.keys().copied()).collect();
        docs.sort();
        docs.dedup();

        let primary = per_view.get(&View::Qa);
        let secondaries: Vec<&HashMap<&DocId, f32>> = per_view
            .iter()
            .filter(|(v, _)| !v.is_primary())
            .map(|(_, m)| m)
            .collect();

        docs.into_iter()
            .map(|id| {
                let p = primary.and_then(|m| m.get(id)).copied();
                let others: Vec<Option<f32>> =
                    secondaries.iter().map(|m| m.get(id).copied()).collect();
                (id.clone(), combine(self.policy, p, &others))
            })
            .collect()
    }

    /// Top `k` opinions by combined similarity, ties by id.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<ScoredDoc> {
        let mut hits: Vec<ScoredDoc> = self
            .scores(query)
            .into_iter()
            .map(|(id, score)| ScoredDoc { id, score })
            .collect();
        sort_scored(&mut hits);
        hits.truncate(k);
        hits
    }
}

fn combine(policy: ViewPolicy, primary: Option<f32>, secondaries: &[Option<f32>]) -> f32 {
    match policy {
        ViewPolicy::PrimaryOnly => primary.unwrap_or(0.0),
        // Views an opinion lacks contribute a similarity of 0.
        ViewPolicy::Max => std::iter::once(primary)
            .chain(secondaries.iter().copied())
            .map(|s| s.unwrap_or(0.0))
            .fold(f32::NEG_INFINITY, f32::max),
        ViewPolicy::Weighted {
            secondary_weight,
            max_bonus,
        } => {
            let p = primary.unwrap_or(0.0);
            let bonus = secondaries
                .iter()
                .flatten()
                .copied()
                .reduce(f32::max)
                .map(|best| (secondary_weight * (best - p).max(0.0)).min(max_bonus))
                .unwrap_or(0.0);
            p + bonus
        }
    }
}
