//! Search metrics collection with rolling averages.
//!
//! This module tracks two things about the retrieval engines:
//!
//! - **Routing**: how many queries took each [`SearchPath`] (lexical-only,
//!   circuit breaker, fused, degraded, ...). These are lifetime counters.
//! - **Timing**: rolling averages of lexical scoring, query embedding,
//!   fusion and total latency, plus corpus embedding batches during builds.
//!
//! ## Architecture
//!
//! A global collector (`global_metrics()`) is shared by default, since
//! every engine built in one process reports into the same view. Engines
//! accept a separate [`SearchMetrics`] for tests that need isolation.

use crate::search::SearchPath;
use instant::Instant;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default window size for rolling averages (5 minutes).
const DEFAULT_WINDOW_SECS: u64 = 300;

/// Maximum samples to keep per metric (prevents unbounded growth).
const MAX_SAMPLES: usize = 1000;

/// A single timing sample with timestamp.
#[derive(Clone, Debug)]
struct TimingSample {
    timestamp: Instant,
    duration_ms: f64,
}

/// Rolling statistics for a single metric.
#[derive(Debug, Default)]
struct MetricData {
    samples: VecDeque<TimingSample>,
    /// Total count since startup.
    total_count: u64,
}

impl MetricData {
    fn record(&mut self, duration_ms: f64) {
        self.total_count += 1;
        self.samples.push_back(TimingSample {
            timestamp: Instant::now(),
            duration_ms,
        });
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// Prune samples older than the window.
    fn prune(&mut self, window: Duration) {
        let Some(cutoff) = Instant::now().checked_sub(window) else {
            return;
        };
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn in_window(&self, window: Duration) -> impl Iterator<Item = &TimingSample> {
        let cutoff = Instant::now().checked_sub(window);
        self.samples
            .iter()
            .filter(move |s| cutoff.is_none_or(|c| s.timestamp >= c))
    }

    fn rolling_avg(&self, window: Duration) -> Option<f64> {
        let (sum, count) = self
            .in_window(window)
            .fold((0.0, 0usize), |(sum, n), s| (sum + s.duration_ms, n + 1));
        (count > 0).then(|| sum / count as f64)
    }

    fn rolling_count(&self, window: Duration) -> usize {
        self.in_window(window).count()
    }
}

/// Lifetime count of queries per search path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteCounts {
    pub empty: u64,
    pub lexical_only: u64,
    pub semantic_only: u64,
    pub circuit_breaker: u64,
    pub fused: u64,
    /// Fusion attempted but the query embedding failed or timed out
    pub degraded: u64,
}

impl RouteCounts {
    pub fn total(&self) -> u64 {
        self.empty
            + self.lexical_only
            + self.semantic_only
            + self.circuit_breaker
            + self.fused
            + self.degraded
    }
}

/// Search timing snapshot.
#[derive(Clone, Debug, Default)]
pub struct SearchSnapshot {
    /// Average lexical scoring time (ms).
    pub lexical_avg_ms: Option<f64>,
    /// Average time to embed the query (ms).
    pub query_embed_avg_ms: Option<f64>,
    /// Average normalization and blending time (ms).
    pub fusion_avg_ms: Option<f64>,
    /// Average total search latency (ms).
    pub total_latency_avg_ms: Option<f64>,
    /// Number of searches in the rolling window.
    pub query_count: usize,
}

/// Collected metrics snapshot.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub routes: RouteCounts,
    pub search: SearchSnapshot,
    /// Average corpus embedding request time (ms).
    pub embedding_batch_avg_ms: Option<f64>,
    pub embedding_batch_count: usize,
    /// Texts embedded since startup.
    pub texts_embedded: u64,
}

#[derive(Default)]
struct MetricsInner {
    routes: RouteCounts,
    lexical: MetricData,
    query_embed: MetricData,
    fusion: MetricData,
    search_total: MetricData,
    embedding_batch: MetricData,
    texts_embedded: u64,
}

/// Thread-safe collector for routing counters and timing metrics.
///
/// Clones share the same underlying data.
#[derive(Clone)]
pub struct SearchMetrics {
    inner: Arc<RwLock<MetricsInner>>,
    window: Duration,
}

impl SearchMetrics {
    /// Create a new collector with the default 5 minute window.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW_SECS)
    }

    /// Create a new collector with a custom window size.
    pub fn with_window(window_secs: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner::default())),
            window: Duration::from_secs(window_secs),
        }
    }

    // =========================================================================
    // Search metrics
    // =========================================================================

    /// Count one query under the path it took.
    pub fn record_route(&self, path: &SearchPath) {
        if let Ok(mut inner) = self.inner.write() {
            let routes = &mut inner.routes;
            match path {
                SearchPath::Empty => routes.empty += 1,
                SearchPath::LexicalOnly => routes.lexical_only += 1,
                SearchPath::SemanticOnly => routes.semantic_only += 1,
                SearchPath::CircuitBreaker { .. } => routes.circuit_breaker += 1,
                SearchPath::Fused { .. } => routes.fused += 1,
                SearchPath::Degraded { .. } => routes.degraded += 1,
            }
        }
    }

    pub fn record_lexical(&self, duration_ms: f64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.lexical.record(duration_ms);
        }
    }

    pub fn record_query_embed(&self, duration_ms: f64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.query_embed.record(duration_ms);
        }
    }

    pub fn record_fusion(&self, duration_ms: f64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.fusion.record(duration_ms);
        }
    }

    pub fn record_search_total(&self, duration_ms: f64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.search_total.record(duration_ms);
        }
    }

    // =========================================================================
    // Build metrics
    // =========================================================================

    /// Record one corpus embedding request.
    pub fn record_embedding_batch(&self, duration_ms: f64, texts: usize) {
        if let Ok(mut inner) = self.inner.write() {
            inner.embedding_batch.record(duration_ms);
            inner.texts_embedded += texts as u64;
        }
    }

    // =========================================================================
    // Snapshot and maintenance
    // =========================================================================

    /// Prune old samples outside the window.
    pub fn prune(&self) {
        if let Ok(mut inner) = self.inner.write() {
            let window = self.window;
            inner.lexical.prune(window);
            inner.query_embed.prune(window);
            inner.fusion.prune(window);
            inner.search_total.prune(window);
            inner.embedding_batch.prune(window);
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let Ok(inner) = self.inner.read() else {
            return MetricsSnapshot::default();
        };
        let w = self.window;

        MetricsSnapshot {
            routes: inner.routes.clone(),
            search: SearchSnapshot {
                lexical_avg_ms: inner.lexical.rolling_avg(w),
                query_embed_avg_ms: inner.query_embed.rolling_avg(w),
                fusion_avg_ms: inner.fusion.rolling_avg(w),
                total_latency_avg_ms: inner.search_total.rolling_avg(w),
                query_count: inner.search_total.rolling_count(w),
            },
            embedding_batch_avg_ms: inner.embedding_batch.rolling_avg(w),
            embedding_batch_count: inner.embedding_batch.rolling_count(w),
            texts_embedded: inner.texts_embedded,
        }
    }

    /// Total searches recorded since startup.
    pub fn total_searches(&self) -> u64 {
        self.inner
            .read()
            .map(|inner| inner.search_total.total_count)
            .unwrap_or(0)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Clear all metrics data.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            *inner = MetricsInner::default();
        }
    }
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_METRICS: Lazy<SearchMetrics> = Lazy::new(SearchMetrics::new);

/// Get the global metrics collector.
pub fn global_metrics() -> &'static SearchMetrics {
    &GLOBAL_METRICS
}

/// Milliseconds elapsed since `start`.
pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_record_and_snapshot() {
        let metrics = SearchMetrics::with_window(60);

        metrics.record_lexical(1.0);
        metrics.record_lexical(2.0);
        metrics.record_lexical(3.0);

        let snapshot = metrics.snapshot();
        assert!((snapshot.search.lexical_avg_ms.unwrap() - 2.0).abs() < 0.01);
        assert!(snapshot.search.fusion_avg_ms.is_none());
    }

    #[test]
    fn test_route_counts() {
        let metrics = SearchMetrics::new();
        metrics.record_route(&SearchPath::LexicalOnly);
        metrics.record_route(&SearchPath::CircuitBreaker { ratio: 2.0 });
        metrics.record_route(&SearchPath::CircuitBreaker { ratio: 1.4 });
        metrics.record_route(&SearchPath::Degraded {
            reason: "timeout".into(),
        });

        let routes = metrics.snapshot().routes;
        assert_eq!(routes.lexical_only, 1);
        assert_eq!(routes.circuit_breaker, 2);
        assert_eq!(routes.degraded, 1);
        assert_eq!(routes.total(), 4);
    }

    #[test]
    fn test_prune_old_samples() {
        let metrics = SearchMetrics::with_window(1);

        metrics.record_search_total(50.0);
        thread::sleep(Duration::from_millis(1100));
        metrics.prune();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.search.query_count, 0);
        // Lifetime total survives pruning
        assert_eq!(metrics.total_searches(), 1);
    }

    #[test]
    fn test_embedding_batches() {
        let metrics = SearchMetrics::new();
        metrics.record_embedding_batch(20.0, 64);
        metrics.record_embedding_batch(40.0, 12);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.embedding_batch_count, 2);
        assert_eq!(snapshot.texts_embedded, 76);
        assert!((snapshot.embedding_batch_avg_ms.unwrap() - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_clones_share_data_and_clear() {
        let metrics = SearchMetrics::new();
        let clone = metrics.clone();
        clone.record_route(&SearchPath::Fused { ratio: 1.1 });
        assert_eq!(metrics.snapshot().routes.fused, 1);

        metrics.clear();
        assert_eq!(clone.snapshot().routes, RouteCounts::default());
    }
}
