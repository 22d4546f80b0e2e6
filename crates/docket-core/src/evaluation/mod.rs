//! Offline evaluation of retrieval engines against graded judgments.
//!
//! A run loads a [`Dataset`] of judged queries, asks one engine for the top
//! results of each query through the [`Scorer`], and produces an
//! [`EvaluationReport`]: per-query metrics plus means overall, by query type
//! and by topic. Two saved reports can be compared query by query with
//! paired statistics.
//!
//! # Example
//!
//! ```ignore
//! use docket_core::evaluation::{load_dataset, EvaluationReport, Scorer};
//!
//! let dataset = load_dataset(Path::new("eval/dataset.json"))?;
//! let report = Scorer::new().run(engine.as_ref(), &dataset).await?;
//! report.write_json(Path::new("runs/citation-fusion.json"))?;
//!
//! let baseline = EvaluationReport::read_json(Path::new("runs/bm25.json"))?;
//! println!("{}", baseline.compare(&report).table());
//! ```
//!
//! # Metrics
//!
//! | Key | Description |
//! |-----|-------------|
//! | `mrr` | Reciprocal rank of the first grade-2 result |
//! | `ndcg@5`, `ndcg@10` | Graded, position-aware gain |
//! | `precision@5`, `precision@10` | Relevant results in the top k, over k |
//! | `recall@10`, `recall@20` | Relevant results found, over all relevant |

pub mod dataset;
pub mod metrics;
pub mod report;
pub mod scorer;
pub mod stats;

pub use dataset::{load_dataset, Dataset, DatasetError, JudgedQuery, Judgment};
pub use metrics::{
    ndcg_at_k, precision_at_k, recall_at_k, reciprocal_rank, Grades, MetricSet, METRIC_KEYS,
};
pub use report::{aggregate, EvaluationReport, MetricMap, QueryResult, ReportComparison, ReportError};
pub use scorer::{score_query, EvaluationError, Scorer};
pub use stats::{bootstrap_ci, cohens_d, compare_paired, paired_ttest, PairedComparison};
