//! The quote archive and its precomputed embeddings.
//!
//! Loaded once at startup and never mutated. Quote `i` owns embedding row `i`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::semantic::{storage, EmbeddingMatrix, NpyError};

/// Author value used when the author of a quote is not known.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub id: i64,
    pub text: String,
    pub author: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub total: usize,
    pub unique_authors: usize,
    pub known_author_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse quotes in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load embeddings from {path}: {source}")]
    Embeddings {
        path: PathBuf,
        #[source]
        source: NpyError,
    },

    #[error("corpus has {quotes} quotes but embedding matrix has {rows} rows")]
    RowCountMismatch { quotes: usize, rows: usize },

    #[error("duplicate quote id {0}")]
    DuplicateId(i64),
}

/// Quotes plus the embedding matrix, row-aligned.
#[derive(Debug)]
pub struct CorpusStore {
    quotes: Vec<QuoteRecord>,
    embeddings: EmbeddingMatrix,
}

impl CorpusStore {
    /// Load the quote list (JSON array) and the embedding matrix (`.npy`).
    pub fn load(quotes_path: &Path, embeddings_path: &Path) -> Result<Self, DataLoadError> {
        let quotes = Self::read_quotes(quotes_path)?;

        let embeddings =
            storage::read_matrix(embeddings_path).map_err(|source| match source {
                NpyError::Io(source) => DataLoadError::Io {
                    path: embeddings_path.to_path_buf(),
                    source,
                },
                source => DataLoadError::Embeddings {
                    path: embeddings_path.to_path_buf(),
                    source,
                },
            })?;

        let store = Self::new(quotes, embeddings)?;

        log::info!(
            "Loaded {} quotes with {}-dimensional embeddings",
            store.size(),
            store.embeddings.dimensions()
        );

        Ok(store)
    }

    /// Assemble a store from already parsed parts, validating alignment.
    pub fn new(quotes: Vec<QuoteRecord>, embeddings: EmbeddingMatrix) -> Result<Self, DataLoadError> {
        if quotes.len() != embeddings.rows() {
            return Err(DataLoadError::RowCountMismatch {
                quotes: quotes.len(),
                rows: embeddings.rows(),
            });
        }

        let mut seen = HashSet::with_capacity(quotes.len());
        for quote in &quotes {
            if !seen.insert(quote.id) {
                return Err(DataLoadError::DuplicateId(quote.id));
            }
        }

        Ok(Self { quotes, embeddings })
    }

    fn read_quotes(path: &Path) -> Result<Vec<QuoteRecord>, DataLoadError> {
        let raw = std::fs::read(path).map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_slice(&raw).map_err(|source| DataLoadError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Number of quotes.
    pub fn size(&self) -> usize {
        self.quotes.len()
    }

    /// Quote at positional `index`.
    ///
    /// # Panics
    /// If `index` is out of range. Search only yields valid indices.
    pub fn get(&self, index: usize) -> &QuoteRecord {
        self.quotes.get(index).unwrap_or_else(|| {
            panic!(
                "quote index {index} out of range (corpus size: {})",
                self.quotes.len()
            )
        })
    }

    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    /// Aggregate author statistics.
    ///
    /// [`UNKNOWN_AUTHOR`] still counts as one distinct author but not as a
    /// known one. Matching is exact and case-sensitive.
    pub fn stats(&self) -> CorpusStats {
        let unique_authors = self
            .quotes
            .iter()
            .map(|q| q.author.as_str())
            .collect::<HashSet<_>>()
            .len();

        let unknown = self
            .quotes
            .iter()
            .filter(|q| q.author == UNKNOWN_AUTHOR)
            .count();

        CorpusStats {
            total: self.quotes.len(),
            unique_authors,
            known_author_count: self.quotes.len() - unknown,
        }
    }
}
