//! Configuration parsing and validation.
//!
//! Photo Index is configured via a TOML file (default: `config/pix.toml`).
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/photos.sqlite"
//!
//! [embedding]
//! provider = "ollama"
//! model = "all-minilm"
//! dims = 384
//!
//! [faces]
//! dims = 512
//! threshold = 0.6
//! min_cluster_size = 3
//!
//! [describe]
//! provider = "ollama"
//! model = "llava:7b"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use photo_index_core::models::EmbeddingDims;

/// Dimensionality of the default description embedding model (all-MiniLM-L6-v2).
pub const DEFAULT_PHOTO_DIMS: usize = 384;

/// Model used by the `local` provider when none is configured.
pub const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

/// Output width of the fastembed models the `local` provider knows about.
pub fn local_model_dims(model: &str) -> usize {
    match model {
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        _ => DEFAULT_PHOTO_DIMS,
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub faces: FacesConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub describe: DescribeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Text embedding provider for descriptions and queries.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Explicit `dims`, else the known width of the local model.
    pub fn resolved_dims(&self) -> usize {
        match (self.dims, self.provider.as_str()) {
            (Some(dims), _) => dims,
            (None, "local") => {
                local_model_dims(self.model.as_deref().unwrap_or(DEFAULT_LOCAL_MODEL))
            }
            (None, _) => DEFAULT_PHOTO_DIMS,
        }
    }
}

/// Face embeddings and clustering defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct FacesConfig {
    #[serde(default = "default_face_dims")]
    pub dims: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    /// Detections below this confidence are dropped at import.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

impl Default for FacesConfig {
    fn default() -> Self {
        Self {
            dims: default_face_dims(),
            threshold: default_threshold(),
            min_cluster_size: default_min_cluster_size(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_face_dims() -> usize {
    512
}
fn default_threshold() -> f32 {
    0.6
}
fn default_min_cluster_size() -> usize {
    3
}
fn default_min_confidence() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_limit() -> i64 {
    5
}

/// Vision model that writes descriptions for photos without one.
#[derive(Debug, Deserialize, Clone)]
pub struct DescribeConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_describe_timeout")]
    pub timeout_secs: u64,
}

impl Default for DescribeConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_vision_model(),
            url: default_ollama_url(),
            timeout_secs: default_describe_timeout(),
        }
    }
}

fn default_vision_model() -> String {
    "llava:7b".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_describe_timeout() -> u64 {
    300
}

impl Config {
    /// Embedding dimensionalities the store is opened with.
    pub fn dims(&self) -> EmbeddingDims {
        EmbeddingDims {
            photo: self.embedding.resolved_dims(),
            face: self.faces.dims,
        }
    }

    /// Model name recorded in the index metadata.
    pub fn embedding_model(&self) -> &str {
        match (&self.embedding.model, self.embedding.provider.as_str()) {
            (Some(model), _) => model,
            (None, "local") => DEFAULT_LOCAL_MODEL,
            (None, _) => "external",
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() {
            bail!(
                "embedding.dims must be set when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }

    // Validate faces
    if config.faces.dims == 0 {
        bail!("faces.dims must be > 0");
    }
    if !(config.faces.threshold > 0.0 && config.faces.threshold <= 1.0) {
        bail!("faces.threshold must be in (0.0, 1.0]");
    }
    if config.faces.min_cluster_size < 1 {
        bail!("faces.min_cluster_size must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.faces.min_confidence) {
        bail!("faces.min_confidence must be in [0.0, 1.0]");
    }

    // Validate search
    if config.search.default_limit < 1 {
        bail!("search.default_limit must be >= 1");
    }

    // Validate describe
    match config.describe.provider.as_str() {
        "disabled" | "ollama" => {}
        other => bail!(
            "Unknown describe provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }
    if config.describe.timeout_secs == 0 {
        bail!("describe.timeout_secs must be > 0");
    }

    Ok(())
}
