//! Progress tracking types for corpus embedding.
//!
//! These types carry structured progress that binaries turn into progress
//! bars and the library turns into log lines.

use crate::search::View;
use instant::Instant;

/// Progress of embedding one view of the corpus.
#[derive(Debug, Clone)]
pub struct EmbeddingProgress {
    /// View being embedded
    pub view: View,
    /// Texts with a stored vector, including ones resumed from a previous run
    pub texts_completed: usize,
    /// Texts this view needs in total
    pub texts_total: usize,
    /// Estimated tokens sent to the embedder in this run
    pub tokens_processed: usize,
    /// Time elapsed since this view started (milliseconds)
    pub elapsed_ms: u64,
}

impl EmbeddingProgress {
    /// Creates a new progress instance.
    pub fn new(
        view: View,
        texts_completed: usize,
        texts_total: usize,
        tokens_processed: usize,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            view,
            texts_completed,
            texts_total,
            tokens_processed,
            elapsed_ms,
        }
    }

    /// Returns the completion percentage (0.0 to 100.0).
    pub fn percent_complete(&self) -> f64 {
        if self.texts_total == 0 {
            100.0
        } else {
            (self.texts_completed as f64 / self.texts_total as f64) * 100.0
        }
    }

    /// Returns true if every text of the view has a vector.
    pub fn is_complete(&self) -> bool {
        self.texts_completed >= self.texts_total
    }

    /// Returns throughput in tokens per second.
    pub fn tokens_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            0.0
        } else {
            self.tokens_processed as f64 / (self.elapsed_ms as f64 / 1000.0)
        }
    }
}

/// Helper for tracking elapsed time during processing.
pub struct ProgressTimer {
    start: Instant,
}

impl ProgressTimer {
    /// Creates a new timer starting now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for ProgressTimer {
    fn default() -> Self {
        Self::new()
    }
}
