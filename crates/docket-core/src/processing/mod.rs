//! Corpus embedding for index construction.
//!
//! This module turns opinions into stored vectors:
//! - Plan requests within the embedder's batch and token limits
//! - Compute embeddings, splitting requests the embedder rejects as too large
//! - Commit each request to the store so an interrupted build resumes
//! - Report progress through a callback
//!
//! # Example
//!
//! ```ignore
//! use docket_core::processing::{EmbeddingPipeline, EmbeddingProgress};
//!
//! let pipeline = EmbeddingPipeline::new(embedder, config.embedding.batch_size);
//! let qa = pipeline
//!     .embed_view(&store, &opinions, View::Qa, |progress: EmbeddingProgress| {
//!         bar.set_position(progress.texts_completed as u64);
//!     })
//!     .await?;
//! ```

mod batch;
mod pipeline;
mod progress;

pub use batch::plan_batches;
pub use pipeline::EmbeddingPipeline;
pub use progress::{EmbeddingProgress, ProgressTimer};
