//! TOML configuration with defaults, environment overrides and validation.
//!
//! Every section and key carries a serde default, so a missing or empty
//! config file resolves to a runnable local-only setup. See
//! `config/tmw.example.toml` for a fully annotated file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::RagError;
use crate::llm::ProviderKind;

/// Name of the SQLite file created inside `paths.vector_store`.
pub const INDEX_FILE_NAME: &str = "index.sqlite";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_docs_root")]
    pub docs_root: PathBuf,
    #[serde(default = "default_vector_store")]
    pub vector_store: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            docs_root: default_docs_root(),
            vector_store: default_vector_store(),
        }
    }
}

fn default_docs_root() -> PathBuf {
    PathBuf::from("./rag_documents")
}
fn default_vector_store() -> PathBuf {
    PathBuf::from("./vector_store")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_documentation_extensions")]
    pub documentation_extensions: Vec<String>,
    #[serde(default = "default_code_extensions")]
    pub code_extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            documentation_extensions: default_documentation_extensions(),
            code_extensions: default_code_extensions(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_documentation_extensions() -> Vec<String> {
    ["md", "markdown", "txt", "rst", "pdf", "docx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_code_extensions() -> Vec<String> {
    [
        "ts", "tsx", "js", "jsx", "mjs", "html", "htm", "css", "scss", "py", "rs", "go", "java",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

/// Which backend turns text into vectors.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// In-process sentence-transformer model (fastembed).
    Local,
    /// A local Ollama server's `/api/embed` endpoint.
    Ollama,
    /// Deterministic feature hashing; offline, no model download.
    Hashing,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub provider: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_backend(),
            model: default_embedding_model(),
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Local
}
fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "code_docs".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> i64 {
    5
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub default: ProviderKind,
    #[serde(default)]
    pub local: LocalLlmConfig,
    #[serde(default)]
    pub cloud: CloudLlmConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LocalLlmConfig {
    #[serde(default = "default_local_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_local_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_local_timeout")]
    pub timeout_secs: u64,
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_local_endpoint(),
            model: default_local_model(),
            temperature: default_temperature(),
            timeout_secs: default_local_timeout(),
        }
    }
}

fn default_local_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_local_model() -> String {
    "codellama".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_local_timeout() -> u64 {
    300
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CloudLlmConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_cloud_model")]
    pub model: String,
    #[serde(default = "default_cloud_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_cloud_timeout")]
    pub timeout_secs: u64,
}

impl Default for CloudLlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_cloud_model(),
            base_url: default_cloud_base_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_cloud_timeout(),
        }
    }
}

impl CloudLlmConfig {
    /// The configured key, treating an empty or whitespace-only string as absent.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

fn default_cloud_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_cloud_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_cloud_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EmbeddingConfig {
    /// Vector width for the configured model, falling back to the known
    /// width of common sentence-transformer models.
    pub fn resolved_dims(&self) -> usize {
        self.dims.unwrap_or(match self.model.as_str() {
            "all-minilm-l6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => 384,
            "bge-small-en-v1.5" => 384,
            "bge-base-en-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            "nomic-embed-text" | "nomic-embed-text-v1.5" => 768,
            "mxbai-embed-large" => 1024,
            _ => 384,
        })
    }
}

impl Config {
    /// Full path of the SQLite index file.
    pub fn index_path(&self) -> PathBuf {
        self.paths.vector_store.join(INDEX_FILE_NAME)
    }

    /// Verify the docs root exists and create the vector-store directory.
    pub fn check_paths(&self) -> std::result::Result<(), RagError> {
        if !self.paths.docs_root.is_dir() {
            return Err(RagError::PathNotFound(format!(
                "documents path does not exist: {}",
                self.paths.docs_root.display()
            )));
        }
        std::fs::create_dir_all(&self.paths.vector_store).map_err(|e| {
            RagError::StoreWrite(format!(
                "cannot create vector store directory {}: {}",
                self.paths.vector_store.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.resolved_dims() == 0 {
            bail!("embedding.dims must be > 0");
        }
        if self.store.collection.trim().is_empty() {
            bail!("store.collection must not be empty");
        }
        if let Some(ext) = self
            .loader
            .documentation_extensions
            .iter()
            .find(|e| self.loader.code_extensions.contains(e))
        {
            bail!(
                "extension '{}' is listed in both loader.documentation_extensions and loader.code_extensions",
                ext
            );
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if self.llm.cloud.credential().is_none() {
            if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
                self.llm.cloud.api_key = Some(key);
            }
        }
        if let Ok(root) = std::env::var("TMW_DOCS_ROOT") {
            self.paths.docs_root = PathBuf::from(root);
        }
        if let Ok(store) = std::env::var("TMW_VECTOR_STORE") {
            self.paths.vector_store = PathBuf::from(store);
        }
    }
}

/// Load the config file at `path` (defaults when it does not exist), apply
/// environment overrides and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        Config::default()
    };

    config.apply_env_overrides();
    config.validate()?;

    Ok(config)
}
