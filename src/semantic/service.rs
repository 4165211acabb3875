//! Similarity search over the quote corpus.
//!
//! Coordinates query validation, embedding generation, ranking against the
//! corpus matrix, threshold filtering and text cleanup. The engine holds no
//! mutable state and can be shared freely between request handlers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::corpus::{CorpusStore, QuoteRecord};
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::index::{IndexError, ScoredRow};
use crate::semantic::preprocess::clean_quote_text;

/// Errors that can occur during a search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("{0}")]
    InvalidQuery(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// A quote returned from a search, with its cleaned text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub quote: QuoteRecord,
    /// Cosine similarity rounded to 3 decimals
    pub similarity: f64,
}

/// Ranks corpus quotes against free-text queries.
pub struct SearchEngine {
    corpus: Arc<CorpusStore>,
    embedder: Arc<dyn Embedder>,
}

impl SearchEngine {
    pub fn new(corpus: Arc<CorpusStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { corpus, embedder }
    }

    pub fn corpus(&self) -> &CorpusStore {
        &self.corpus
    }

    /// Identifier of the embedding model in use.
    pub fn model_name(&self) -> &str {
        self.embedder.name()
    }

    /// Search for the quotes most similar to `query`.
    ///
    /// # Arguments
    /// * `query` - Free text; must contain something besides whitespace
    /// * `top_k` - Number of candidates to select, clamped to the corpus size
    /// * `threshold` - Minimum similarity a returned quote must have, checked
    ///   on the selected candidates
    ///
    /// # Returns
    /// Quotes sorted by similarity (highest first, ties by later corpus
    /// position first).
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RankedResult>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery("Query cannot be empty".to_string()));
        }

        if top_k == 0 {
            return Err(SearchError::InvalidQuery(
                "top_k must be at least 1".to_string(),
            ));
        }

        if self.corpus.size() == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(query)?;

        let matrix = self.corpus.embeddings();
        let top_k = top_k.min(self.corpus.size());

        let ranked: Vec<ScoredRow> = matrix
            .top_k(&query_embedding, top_k)?
            .into_iter()
            .filter(|row| row.score >= threshold)
            .collect();

        log::debug!(
            "query matched {} of {} candidates (threshold {})",
            ranked.len(),
            top_k,
            threshold
        );

        Ok(ranked
            .into_iter()
            .map(|row| self.to_result(row))
            .collect())
    }

    fn to_result(&self, row: ScoredRow) -> RankedResult {
        let quote = self.corpus.get(row.index);

        RankedResult {
            quote: QuoteRecord {
                text: clean_quote_text(&quote.text),
                ..quote.clone()
            },
            similarity: round_similarity(row.score),
        }
    }
}

/// Round the f64 widening of `score` to 3 decimal places.
fn round_similarity(score: f32) -> f64 {
    (f64::from(score) * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_similarity() {
        assert_eq!(round_similarity(0.123456), 0.123);
        assert_eq!(round_similarity(0.9996), 1.0);
        assert_eq!(round_similarity(-0.4567), -0.457);
        assert_eq!(round_similarity(0.0), 0.0);
        // 0.1245f32 widens to 0.12449999..., below the half step
        assert_eq!(round_similarity(0.1245), 0.124);
    }
}
