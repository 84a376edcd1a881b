//! TOML configuration.
//!
//! Every section has defaults, so the binary runs without a config file:
//! [`load_or_default`] falls back to [`Config::default`] when the path does
//! not exist. Credentials are never stored here; each client reads its API
//! key from the environment variable named in its section.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            sources: default_sources(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted vector index.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

impl IndexConfig {
    /// Path of the SQLite file inside [`IndexConfig::dir`].
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("index.sqlite")
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("data/vector_db")
}

/// One tabular source file. `name` becomes the `source_table` metadata tag.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub path: PathBuf,
}

fn default_sources() -> Vec<SourceConfig> {
    [
        ("Asignaturas", "Asignaturas_normalizado.csv"),
        ("AsignaturasCarrera", "AsignaturasCarrera_normalizado.csv"),
        ("Horarios", "Horarios_normalizado.csv"),
        ("Prerrequisitos", "Prerrequisitos_normalizado.csv"),
        ("Profesores", "Profesores_normalizado.csv"),
        ("Oficinas", "Oficinas_normalizado.csv"),
    ]
    .into_iter()
    .map(|(name, file)| SourceConfig {
        name: name.to_string(),
        path: Path::new("data/Contexto_Asignaturas").join(file),
    })
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
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
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
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
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: default_openai_base_url(),
            api_key_env: default_openai_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
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

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_groq_base_url")]
    pub base_url: String,
    #[serde(default = "default_groq_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Turns kept in conversation memory; `0` keeps everything.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_groq_base_url(),
            api_key_env: default_groq_key_env(),
            temperature: 0.0,
            system_prompt: default_system_prompt(),
            max_turns: default_max_turns(),
            max_retries: default_llm_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_groq_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_groq_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_system_prompt() -> String {
    "You are a general-purpose assistant.".to_string()
}
fn default_max_turns() -> usize {
    20
}
fn default_llm_max_retries() -> u32 {
    2
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Read the value of the environment variable `name`, failing when it is
/// unset or blank.
pub fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => bail!("{} environment variable not set (check your .env file)", name),
    }
}

/// Load `.env` from the working directory or one of its parents. Values in
/// the file override variables already set in the process.
/// A missing file is not an error.
pub fn load_dotenv() -> Result<()> {
    match dotenv::dotenv_iter() {
        Ok(iter) => apply_env_pairs(iter).map(|_| ()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Load an env file at `path`, overriding existing variables. Returns the
/// number of variables set.
pub fn load_env_file(path: &Path) -> Result<usize> {
    let iter = dotenv::from_path_iter(path)
        .with_context(|| format!("Failed to read env file: {}", path.display()))?;
    apply_env_pairs(iter)
}

fn apply_env_pairs<I>(pairs: I) -> Result<usize>
where
    I: Iterator<Item = dotenv::Result<(String, String)>>,
{
    let mut count = 0;
    for pair in pairs {
        let (key, value) = pair?;
        std::env::set_var(key, value);
        count += 1;
    }
    Ok(count)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise use the built-in defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(
            "config file {} not found, using built-in defaults",
            path.display()
        );
        Ok(Config::default())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size < 1 {
        bail!("embedding.batch_size must be >= 1");
    }
    if config.embedding.model.trim().is_empty() {
        bail!("embedding.model must not be empty");
    }
    if config.llm.model.trim().is_empty() {
        bail!("llm.model must not be empty");
    }

    let mut seen = std::collections::HashSet::new();
    for source in &config.sources {
        if !seen.insert(source.name.as_str()) {
            bail!("duplicate source name: '{}'", source.name);
        }
    }

    Ok(())
}
