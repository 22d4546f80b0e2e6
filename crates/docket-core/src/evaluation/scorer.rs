//! Runs an engine over a judged dataset and scores every query.
//!
//! # Usage
//!
//! ```ignore
//! use docket_core::evaluation::{load_dataset, Scorer};
//!
//! let dataset = load_dataset(Path::new("eval/dataset.json"))?;
//! let report = Scorer::new().with_concurrency(4).run(engine.as_ref(), &dataset).await?;
//! print!("{}", report.scorecard());
//! ```

use super::dataset::{Dataset, JudgedQuery};
use super::metrics::MetricSet;
use super::report::{EvaluationReport, QueryResult};
use crate::config::DEFAULT_TOP_K;
use crate::error::SearchError;
use crate::metrics::elapsed_ms;
use crate::search::engine::Retrieval;
use crate::search::types::DocId;
use futures::stream::{self, StreamExt};
use instant::Instant;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A run aborted on a failing query.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Engine failed on query {query_id}: {source}")]
    Query {
        query_id: String,
        #[source]
        source: SearchError,
    },
}

/// Scores engines against judged datasets.
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    top_k: usize,
    concurrency: usize,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            concurrency: 1,
        }
    }
}

impl Scorer {
    /// Top 20, one query at a time.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Queries evaluated at once. Report order always follows the dataset.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Evaluates every query in `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::Query`] for the first query whose search
    /// fails; no partial report is produced.
    pub async fn run<R>(&self, engine: &R, dataset: &Dataset) -> Result<EvaluationReport, EvaluationError>
    where
        R: Retrieval + ?Sized,
    {
        self.run_with_progress(engine, dataset, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_query` after each scored query
    /// (in dataset order).
    pub async fn run_with_progress<R, F>(
        &self,
        engine: &R,
        dataset: &Dataset,
        mut on_query: F,
    ) -> Result<EvaluationReport, EvaluationError>
    where
        R: Retrieval + ?Sized,
        F: FnMut(&QueryResult),
    {
        info!(
            engine = engine.name(),
            queries = dataset.len(),
            concurrency = self.concurrency,
            "Evaluating"
        );

        let mut scored = stream::iter(&dataset.queries)
            .map(|query| self.evaluate(engine, query))
            .buffered(self.concurrency);

        let mut per_query = Vec::with_capacity(dataset.len());
        while let Some(result) = scored.next().await {
            let result = result?;
            on_query(&result);
            per_query.push(result);
        }

        Ok(EvaluationReport::new(engine.name(), per_query))
    }

    async fn evaluate<R>(&self, engine: &R, query: &JudgedQuery) -> Result<QueryResult, EvaluationError>
    where
        R: Retrieval + ?Sized,
    {
        let started = Instant::now();
        let ids = engine
            .search(&query.text, self.top_k)
            .await
            .map_err(|source| EvaluationError::Query {
                query_id: query.id.clone(),
                source,
            })?;
        let elapsed = elapsed_ms(started);
        debug!(query_id = %query.id, results = ids.len(), elapsed_ms = elapsed, "Query scored");

        Ok(score_query(query, ids, elapsed))
    }
}

/// Scores one query's results against its judgments.
///
/// Duplicate ids keep their first position; each duplicate is logged as an
/// engine bug.
pub fn score_query(query: &JudgedQuery, results: Vec<DocId>, elapsed_ms: f64) -> QueryResult {
    let results = dedupe(&query.id, results);
    let metrics = MetricSet::compute(&results, &query.grades());
    QueryResult {
        query_id: query.id.clone(),
        query_text: query.text.clone(),
        query_type: query.query_type.clone(),
        query_topic: query.topic.clone(),
        num_results: results.len(),
        results: results.into_iter().map(|id| id.to_string()).collect(),
        metrics,
        elapsed_ms,
    }
}

fn dedupe(query_id: &str, results: Vec<DocId>) -> Vec<DocId> {
    let mut seen = HashSet::with_capacity(results.len());
    results
        .into_iter()
        .filter(|id| {
            let first = seen.insert(id.clone());
            if !first {
                warn!(%query_id, doc_id = %id, "Duplicate result from engine, keeping first occurrence");
            }
            first
        })
        .collect()
}
