//! Semantic search over the quote archive.
//!
//! Query text is embedded with fastembed-rs and compared against the
//! precomputed quote embeddings with a linear cosine similarity scan.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed behind the `Embedder` trait
//! - `index`: Read-only embedding matrix with cosine top-k selection
//! - `storage`: Reader for `.npy` embedding files
//! - `preprocess`: OCR cleanup applied to returned quote text
//! - `service`: The search engine tying the pieces together

pub mod embeddings;
mod index;
mod preprocess;
mod service;
pub mod storage;

pub use embeddings::{Embedder, EmbeddingModel};
pub use index::EmbeddingMatrix;
pub use service::{RankedResult, SearchEngine, SearchError};
pub use storage::NpyError;

/// Default embedding model, the one the bundled embeddings were built with
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Default number of results for a search
pub const DEFAULT_TOP_K: usize = 3;

/// Default similarity threshold for a search
pub const DEFAULT_THRESHOLD: f32 = 0.0;
