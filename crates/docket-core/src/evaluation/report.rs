//! Evaluation reports: the JSON artifact, the text scorecard, and paired
//! comparison of two reports.
//!
//! The JSON layout is a stable contract read by other tooling:
//!
//! ```text
//! timestamp   RFC 3339, UTC
//! engine      engine name
//! overall     { metric key -> mean }
//! by_type     { query type -> { metric key -> mean } }
//! by_topic    { topic -> { metric key -> mean } }
//! per_query   [ { query_id, query_text, query_type, query_topic,
//!                 num_results, results, metrics } ]
//! ```

use super::metrics::{MetricSet, METRIC_KEYS};
use super::stats::{compare_paired, effect_label, PairedComparison};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

/// Metric key to value.
pub type MetricMap = BTreeMap<String, f64>;

const WIDTH: usize = 80;
const LABEL_WIDTH: usize = 20;
const CELL_WIDTH: usize = 7;
const TOPIC_LABEL_MAX: usize = 18;
const SHORT_LABELS: [&str; 7] = ["MRR", "nDCG@5", "nDCG@10", "P@5", "P@10", "R@10", "R@20"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid report {path}: {message}")]
    Json { path: String, message: String },
}

/// Scored outcome of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_id: String,
    pub query_text: String,
    pub query_type: String,
    pub query_topic: String,
    pub num_results: usize,
    /// Returned ids after deduplication, best first
    pub results: Vec<String>,
    pub metrics: MetricSet,
    /// Wall-clock time of the engine call
    #[serde(default)]
    pub elapsed_ms: f64,
}

/// Result of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub timestamp: DateTime<Utc>,
    pub engine: String,
    pub overall: MetricMap,
    pub by_type: BTreeMap<String, MetricMap>,
    pub by_topic: BTreeMap<String, MetricMap>,
    pub per_query: Vec<QueryResult>,
}

/// Mean of each metric as a map; empty for no input.
pub fn aggregate<'a, I>(results: I) -> MetricMap
where
    I: IntoIterator<Item = &'a QueryResult>,
{
    match MetricSet::mean(results.into_iter().map(|r| &r.metrics)) {
        Some(mean) => METRIC_KEYS
            .iter()
            .zip(mean.values())
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        None => MetricMap::new(),
    }
}

fn group_by<F>(per_query: &[QueryResult], key: F) -> BTreeMap<String, MetricMap>
where
    F: Fn(&QueryResult) -> &str,
{
    let mut groups: BTreeMap<String, Vec<&QueryResult>> = BTreeMap::new();
    for result in per_query {
        groups.entry(key(result).to_string()).or_default().push(result);
    }
    groups
        .into_iter()
        .map(|(name, members)| (name, aggregate(members)))
        .collect()
}

impl EvaluationReport {
    /// Aggregates per-query results, stamped with the current time.
    pub fn new(engine: impl Into<String>, per_query: Vec<QueryResult>) -> Self {
        Self {
            timestamp: Utc::now(),
            engine: engine.into(),
            overall: aggregate(&per_query),
            by_type: group_by(&per_query, |r| r.query_type.as_str()),
            by_topic: group_by(&per_query, |r| r.query_topic.as_str()),
            per_query,
        }
    }

    /// Writes the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let origin = path.display().to_string();
        let json = serde_json::to_string_pretty(self).map_err(|e| ReportError::Json {
            path: origin.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| ReportError::Io {
            path: origin,
            message: e.to_string(),
        })
    }

    /// Reads a report written by [`write_json`](Self::write_json).
    pub fn read_json(path: &Path) -> Result<Self, ReportError> {
        let origin = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| ReportError::Io {
            path: origin.clone(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ReportError::Json {
            path: origin,
            message: e.to_string(),
        })
    }

    // =========================================================================
    // Scorecard
    // =========================================================================

    /// Fixed-width text summary: overall, by query type, by topic.
    pub fn scorecard(&self) -> String {
        let sep = "=".repeat(WIDTH);
        let thin = "-".repeat(WIDTH);
        let mut out = String::new();

        let _ = writeln!(out, "{sep}");
        let _ = writeln!(out, "  docket evaluation: {}", self.engine);
        let _ = writeln!(out, "  {} queries evaluated", self.per_query.len());
        let _ = writeln!(out, "{sep}");
        let _ = writeln!(out);

        let mut header = format!("{:>LABEL_WIDTH$}", "");
        for label in SHORT_LABELS {
            let _ = write!(header, "  {label:>CELL_WIDTH$}");
        }
        let _ = writeln!(out, "{header}");
        let _ = writeln!(out, "{thin}");

        let _ = writeln!(out, "{}", metric_row("Overall", &self.overall));
        let _ = writeln!(out, "{thin}");

        for (title, groups, truncate) in [
            ("By Query Type", &self.by_type, false),
            ("By Topic", &self.by_topic, true),
        ] {
            if groups.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{title:>LABEL_WIDTH$}");
            for (name, metrics) in groups {
                let name: String = if truncate {
                    name.chars().take(TOPIC_LABEL_MAX).collect()
                } else {
                    name.clone()
                };
                let _ = writeln!(out, "{}", metric_row(&format!("  {name}"), metrics));
            }
            let _ = writeln!(out, "{thin}");
        }

        out
    }

    // =========================================================================
    // Comparison
    // =========================================================================

    /// Pairs this report (A) with `other` (B) by query id and compares every
    /// metric.
    pub fn compare(&self, other: &EvaluationReport) -> ReportComparison {
        let b_by_id: HashMap<&str, &QueryResult> = other
            .per_query
            .iter()
            .map(|r| (r.query_id.as_str(), r))
            .collect();

        let mut pairs: Vec<(&QueryResult, &QueryResult)> = Vec::new();
        let mut only_in_a = Vec::new();
        for a in &self.per_query {
            match b_by_id.get(a.query_id.as_str()) {
                Some(&b) => pairs.push((a, b)),
                None => only_in_a.push(a.query_id.clone()),
            }
        }
        let a_ids: std::collections::HashSet<&str> =
            self.per_query.iter().map(|r| r.query_id.as_str()).collect();
        let only_in_b = other
            .per_query
            .iter()
            .filter(|r| !a_ids.contains(r.query_id.as_str()))
            .map(|r| r.query_id.clone())
            .collect();

        let metrics = METRIC_KEYS
            .iter()
            .enumerate()
            .filter_map(|(i, key)| {
                let a: Vec<f64> = pairs.iter().map(|(a, _)| a.metrics.values()[i]).collect();
                let b: Vec<f64> = pairs.iter().map(|(_, b)| b.metrics.values()[i]).collect();
                compare_paired(key, &a, &b)
            })
            .collect();

        ReportComparison {
            engine_a: self.engine.clone(),
            engine_b: other.engine.clone(),
            paired_queries: pairs.len(),
            only_in_a,
            only_in_b,
            metrics,
        }
    }
}

fn metric_row(label: &str, metrics: &MetricMap) -> String {
    let mut row = format!("{label:>LABEL_WIDTH$}");
    for key in METRIC_KEYS {
        let value = metrics.get(key).copied().unwrap_or(0.0);
        let _ = write!(row, "  {value:>CELL_WIDTH$.3}");
    }
    row
}

/// Paired comparison of two reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportComparison {
    pub engine_a: String,
    pub engine_b: String,
    pub paired_queries: usize,
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub metrics: Vec<PairedComparison>,
}

impl ReportComparison {
    /// Text table, one row per metric. `*` marks p < 0.05.
    pub fn table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(WIDTH));
        let _ = writeln!(out, "  A = {}   B = {}", self.engine_a, self.engine_b);
        let _ = writeln!(out, "  {} paired queries", self.paired_queries);
        if !self.only_in_a.is_empty() || !self.only_in_b.is_empty() {
            let _ = writeln!(
                out,
                "  unpaired: {} only in A, {} only in B",
                self.only_in_a.len(),
                self.only_in_b.len()
            );
        }
        let _ = writeln!(out, "{}", "=".repeat(WIDTH));
        let _ = writeln!(
            out,
            "{:<13}{:>7}{:>7}  {:<26}{:>9}{:>8}",
            "metric", "A", "B", "A-B [95% CI]", "p", "d"
        );
        let _ = writeln!(out, "{}", "-".repeat(WIDTH));
        for m in &self.metrics {
            let p = match m.p_value {
                Some(p) => format!("{p:.4}{}", if m.is_significant(0.05) { "*" } else { " " }),
                None => "n/a ".to_string(),
            };
            let _ = writeln!(
                out,
                "{:<13}{:>7.3}{:>7.3}  {:<26}{:>9}{:>8.2} {}",
                m.metric,
                m.mean_a,
                m.mean_b,
                m.difference.format(3),
                p,
                m.cohens_d,
                effect_label(m.cohens_d)
            );
        }
        out
    }
}
