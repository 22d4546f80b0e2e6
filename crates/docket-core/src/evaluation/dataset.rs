//! Judged query datasets.
//!
//! A dataset is one JSON document:
//!
//! ```json
//! {
//!   "queries": [
//!     {
//!       "id": "Q-001",
//!       "text": "Section 87103(a) disqualification",
//!       "type": "citation",
//!       "topic": "conflicts_of_interest",
//!       "relevance_judgments": [
//!         { "opinion_id": "A-24-006", "score": 2 },
//!         { "opinion_id": "A-23-114", "score": 1 }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `type` and `topic` are optional grouping labels. Queries without
//! judgments cannot be scored and are dropped at load time with a warning.

use super::metrics::Grades;
use crate::search::types::DocId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Label used when a query has no `type` or `topic`.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Dataset loading errors. Always fatal.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse dataset {path}: {message}")]
    Parse { path: String, message: String },

    /// Two queries share an id, so per-query results could not be paired
    #[error("Duplicate query id `{0}` in dataset")]
    DuplicateQuery(String),

    #[error("Query {query_id} grades opinion {opinion_id} as {score}, expected 0, 1 or 2")]
    InvalidGrade {
        query_id: String,
        opinion_id: String,
        score: u8,
    },
}

/// Highest relevance grade.
pub const MAX_GRADE: u8 = 2;

/// One graded judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub opinion_id: String,
    /// 0 = not relevant, 1 = relevant, 2 = highly relevant
    pub score: u8,
}

fn unknown() -> String {
    UNKNOWN_LABEL.to_string()
}

/// A query with its relevance judgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgedQuery {
    pub id: String,
    pub text: String,
    #[serde(rename = "type", default = "unknown")]
    pub query_type: String,
    #[serde(default = "unknown")]
    pub topic: String,
    #[serde(default)]
    pub relevance_judgments: Vec<Judgment>,
}

impl JudgedQuery {
    /// Judgments keyed by opinion id. A repeated opinion keeps its last grade.
    pub fn grades(&self) -> Grades {
        self.relevance_judgments
            .iter()
            .map(|j| (DocId::from(j.opinion_id.as_str()), j.score))
            .collect()
    }
}

/// Queries in dataset order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub queries: Vec<JudgedQuery>,
}

impl Dataset {
    /// Parses a dataset and drops queries that have no judgments.
    ///
    /// `origin` names the source in error messages.
    pub fn from_json(raw: &str, origin: &str) -> Result<Self, DatasetError> {
        let parsed: Dataset = serde_json::from_str(raw).map_err(|e| DatasetError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;

        let mut seen = std::collections::HashSet::new();
        let mut queries = Vec::with_capacity(parsed.queries.len());
        for query in parsed.queries {
            if !seen.insert(query.id.clone()) {
                return Err(DatasetError::DuplicateQuery(query.id));
            }
            if let Some(bad) = query
                .relevance_judgments
                .iter()
                .find(|j| j.score > MAX_GRADE)
            {
                return Err(DatasetError::InvalidGrade {
                    query_id: query.id.clone(),
                    opinion_id: bad.opinion_id.clone(),
                    score: bad.score,
                });
            }
            if query.relevance_judgments.is_empty() {
                warn!(query_id = %query.id, "Skipping query with empty relevance_judgments");
                continue;
            }
            queries.push(query);
        }
        Ok(Self { queries })
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Reads and parses a dataset file.
///
/// # Errors
///
/// - [`DatasetError::Read`] if the file cannot be read
/// - [`DatasetError::Parse`] if it is not a valid dataset
/// - [`DatasetError::DuplicateQuery`] if two queries share an id
/// - [`DatasetError::InvalidGrade`] if a judgment is outside 0..=2
pub fn load_dataset(path: &Path) -> Result<Dataset, DatasetError> {
    let origin = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|e| DatasetError::Read {
        path: origin.clone(),
        message: e.to_string(),
    })?;
    let dataset = Dataset::from_json(&raw, &origin)?;
    info!(path = %origin, queries = dataset.len(), "Loaded dataset");
    Ok(dataset)
}
