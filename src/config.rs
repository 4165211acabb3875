use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::semantic::{DEFAULT_MODEL, DEFAULT_THRESHOLD, DEFAULT_TOP_K};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_QUOTES_PATH: &str = "my_quotes.json";
const DEFAULT_EMBEDDINGS_PATH: &str = "my_quote_embeddings.npy";
const DEFAULT_HTML_PATH: &str = "whisper_with_voice.html";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Search defaults applied when a request leaves a parameter out
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of results when the request has no top_k
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Minimum similarity when the request has no threshold
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: DEFAULT_TOP_K,
            default_threshold: DEFAULT_THRESHOLD,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Quote archive, a JSON array of quote records
    #[serde(default = "default_quotes_path")]
    pub quotes_path: String,

    /// Precomputed embeddings, one row per quote
    #[serde(default = "default_embeddings_path")]
    pub embeddings_path: String,

    /// Page served at /whisper
    #[serde(default = "default_html_path")]
    pub html_path: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Embedding model name (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Where downloaded models are cached; fastembed's default when unset
    #[serde(default)]
    pub model_cache_dir: Option<String>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quotes_path: default_quotes_path(),
            embeddings_path: default_embeddings_path(),
            html_path: default_html_path(),
            listen_addr: default_listen_addr(),
            model: default_model(),
            model_cache_dir: None,
            search: SearchConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_quotes_path() -> String {
    DEFAULT_QUOTES_PATH.to_string()
}

fn default_embeddings_path() -> String {
    DEFAULT_EMBEDDINGS_PATH.to_string()
}

fn default_html_path() -> String {
    DEFAULT_HTML_PATH.to_string()
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.default_top_k == 0 {
            return Err(ConfigError::Invalid(
                "search.default_top_k must be at least 1".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.search.default_threshold) {
            return Err(ConfigError::Invalid(format!(
                "search.default_threshold must be between -1.0 and 1.0, got {}",
                self.search.default_threshold
            )));
        }

        self.listen_addr.parse::<SocketAddr>().map_err(|_| {
            ConfigError::Invalid(format!(
                "listen_addr must be a socket address, got '{}'",
                self.listen_addr
            ))
        })?;

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults when
    /// missing.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&config_path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            log::info!("upgrading {}", config_path.display());
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(self.base_path.join(CONFIG_FILE), config_str)?;
        Ok(())
    }

    /// Resolve a configured path against the base directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub fn quotes_file(&self) -> PathBuf {
        self.resolve(&self.quotes_path)
    }

    pub fn embeddings_file(&self) -> PathBuf {
        self.resolve(&self.embeddings_path)
    }

    pub fn html_file(&self) -> PathBuf {
        self.resolve(&self.html_path)
    }

    pub fn model_cache_path(&self) -> Option<PathBuf> {
        self.model_cache_dir.as_deref().map(|dir| self.resolve(dir))
    }
}
