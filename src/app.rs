use crate::{
    config::Config,
    corpus::CorpusStore,
    semantic::{Embedder, EmbeddingModel, SearchEngine},
};
use anyhow::{bail, Context, Result};
use homedir::my_home;
use std::path::PathBuf;
use std::sync::Arc;

/// Get the base path for configuration and data files
pub fn get_base_path() -> Result<PathBuf> {
    if let Ok(base_path) = std::env::var("WHISPER_BASE_PATH") {
        return Ok(PathBuf::from(base_path));
    }

    let home = my_home()
        .context("Could not determine home directory")?
        .context("Home directory path is empty")?;

    Ok(home.join(".local/share/whisper"))
}

/// Load and validate the corpus named by the config.
pub fn load_corpus(config: &Config) -> Result<Arc<CorpusStore>> {
    let quotes = config.quotes_file();
    let embeddings = config.embeddings_file();

    let corpus = CorpusStore::load(&quotes, &embeddings)
        .with_context(|| format!("Failed to load corpus from {}", quotes.display()))?;

    Ok(Arc::new(corpus))
}

/// Load the embedding model named by the config.
pub fn load_model(config: &Config) -> Result<Arc<EmbeddingModel>> {
    let model = EmbeddingModel::new(&config.model, config.model_cache_path())
        .with_context(|| format!("Failed to load embedding model '{}'", config.model))?;

    Ok(Arc::new(model))
}

/// Build the search engine: corpus, model, and a dimensionality check
/// between the two.
pub fn create_engine(config: &Config) -> Result<SearchEngine> {
    let corpus = load_corpus(config)?;
    let model = load_model(config)?;

    let corpus_dims = corpus.embeddings().dimensions();
    if corpus.size() > 0 && corpus_dims != model.dimensions() {
        bail!(
            "embedding file has {} dimensions but model '{}' produces {}",
            corpus_dims,
            model.name(),
            model.dimensions()
        );
    }

    Ok(SearchEngine::new(corpus, model as Arc<dyn Embedder>))
}
