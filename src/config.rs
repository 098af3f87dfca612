use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration, read from a TOML file.
///
/// Every section has defaults, so a missing config file yields a fully
/// usable local setup (documents and index under `./data`).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory scanned for documents to ingest.
    #[serde(default = "default_documents_dir")]
    pub documents: PathBuf,
    /// Directory holding the persistent vector index.
    #[serde(default = "default_index_dir")]
    pub index: PathBuf,
    /// Directory for saved conversation sessions. Unset disables
    /// conversation persistence.
    #[serde(default = "default_conversations_dir")]
    pub conversations: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            documents: default_documents_dir(),
            index: default_index_dir(),
            conversations: default_conversations_dir(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./data/documents")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/index")
}
fn default_conversations_dir() -> Option<PathBuf> {
    Some(PathBuf::from("./data/conversations"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    /// Standard generation model.
    #[serde(default = "default_model")]
    pub model: String,
    /// Alternate model whose output carries a deliberation trace.
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    /// Texts per embedding request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
            reasoning_model: default_reasoning_model(),
            embedding_model: default_embedding_model(),
            embedding_dims: default_embedding_dims(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.1".to_string()
}
fn default_reasoning_model() -> String {
    "deepseek-r1".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_embedding_dims() -> usize {
    768
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Chunks retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    /// Exchanges kept in active memory (messages kept = 2x this).
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Exchanges included in the prompt's conversation context.
    #[serde(default = "default_context_exchanges")]
    pub context_exchanges: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            context_exchanges: default_context_exchanges(),
        }
    }
}

fn default_max_history() -> usize {
    10
}
fn default_context_exchanges() -> usize {
    3
}

/// Load configuration from `path`, falling back to defaults when the
/// file does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.ollama.embedding_dims == 0 {
        bail!("ollama.embedding_dims must be > 0");
    }
    if config.ollama.batch_size == 0 {
        bail!("ollama.batch_size must be > 0");
    }
    if config.memory.max_history < 1 {
        bail!("memory.max_history must be >= 1");
    }
    Ok(())
}
