//! Embedding model wrapper for fastembed.
//!
//! The rest of the crate only sees the [`Embedder`] trait, so ranking can be
//! exercised with deterministic vectors instead of a downloaded model.

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;

/// Maps text to a fixed-length vector.
///
/// Implementations must be deterministic for a fixed model version.
pub trait Embedder: Send + Sync {
    /// Model identifier reported to clients.
    fn name(&self) -> &str;

    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

impl EmbeddingModel {
    /// Load the named model, downloading it into `cache_dir` on first use.
    ///
    /// Without a cache directory fastembed falls back to its own default.
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self, EmbeddingError> {
        let (model_enum, canonical_name) = Self::parse_model_name(model_name)?;

        let mut options = InitOptions::new(model_enum).with_show_download_progress(true);

        if let Some(cache_dir) = cache_dir {
            std::fs::create_dir_all(&cache_dir).map_err(|e| {
                EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
            })?;
            options = options.with_cache_dir(cache_dir);
        }

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        log::info!(
            "Loaded embedding model '{}' ({} dimensions)",
            canonical_name,
            dimensions
        );

        Ok(Self {
            model: Mutex::new(model),
            model_name: canonical_name.to_string(),
            dimensions,
        })
    }

    /// Get the embedding dimensions for this model
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Canonical upstream identifier for a supported model name.
    pub fn canonical_name(name: &str) -> Result<&'static str, EmbeddingError> {
        Self::parse_model_name(name).map(|(_, canonical)| canonical)
    }

    /// Resolve a user supplied model name to the fastembed enum and the
    /// canonical upstream identifier.
    fn parse_model_name(
        name: &str,
    ) -> Result<(fastembed::EmbeddingModel, &'static str), EmbeddingError> {
        let short = name
            .rsplit('/')
            .next()
            .unwrap_or(name)
            .to_lowercase();

        match short.as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok((
                fastembed::EmbeddingModel::AllMiniLML6V2,
                "sentence-transformers/all-MiniLM-L6-v2",
            )),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok((
                fastembed::EmbeddingModel::AllMiniLML6V2Q,
                "sentence-transformers/all-MiniLM-L6-v2-q",
            )),
            "all-minilm-l12-v2" | "allminiml12v2" => Ok((
                fastembed::EmbeddingModel::AllMiniLML12V2,
                "sentence-transformers/all-MiniLM-L12-v2",
            )),
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok((
                fastembed::EmbeddingModel::BGESmallENV15,
                "BAAI/bge-small-en-v1.5",
            )),
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok((
                fastembed::EmbeddingModel::BGEBaseENV15,
                "BAAI/bge-base-en-v1.5",
            )),
            "bge-large-en-v1.5" | "bgelargeenv15" => Ok((
                fastembed::EmbeddingModel::BGELargeENV15,
                "BAAI/bge-large-en-v1.5",
            )),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, all-MiniLM-L12-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl Embedder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires model download"]
    fn test_model_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model =
            EmbeddingModel::new("all-MiniLM-L6-v2", Some(temp_dir.path().to_path_buf())).unwrap();

        assert_eq!(model.name(), "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(model.dimensions(), 384); // MiniLM produces 384-dim embeddings
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_embedding_is_deterministic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model =
            EmbeddingModel::new("all-MiniLM-L6-v2", Some(temp_dir.path().to_path_buf())).unwrap();

        let first = model.embed("the wound is the place where the light enters you").unwrap();
        let second = model.embed("the wound is the place where the light enters you").unwrap();
        assert_eq!(first.len(), 384);
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = EmbeddingModel::new("nonexistent-model", Some(temp_dir.path().to_path_buf()));
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_parse_model_name_accepts_qualified_names() {
        let (_, canonical) =
            EmbeddingModel::parse_model_name("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        assert_eq!(canonical, "sentence-transformers/all-MiniLM-L6-v2");

        let canonical = EmbeddingModel::canonical_name("BGE-Small-EN-v1.5").unwrap();
        assert_eq!(canonical, "BAAI/bge-small-en-v1.5");
    }
}
