use crate::error::RagbenchError;
use crate::eval::MatchStrategy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bench: BenchConfig,
    #[serde(default)]
    pub eval: EvalConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub vector_index: Option<VectorIndexConfig>,
    #[serde(default)]
    pub semantic_filter: Option<SemanticFilterConfig>,
    #[serde(default)]
    pub cloud_search: Option<CloudSearchConfig>,
}

/// Paths and general settings
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    /// CSV question set (header row required).
    pub questions_path: PathBuf,
    /// Directory that receives `{backend}-benchmark-results.csv`.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Directory of `.txt` podcast transcripts (used by `chunk` and `upload`).
    #[serde(default = "default_transcripts_dir")]
    pub transcripts_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Evaluation settings
#[derive(Debug, Clone, Deserialize)]
pub struct EvalConfig {
    /// Cutoffs to report MRR for. The largest one is the retrieval depth.
    #[serde(default = "default_ks")]
    pub ks: Vec<usize>,
    #[serde(default)]
    pub match_strategy: MatchStrategy,
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default)]
    pub max_sources: Option<usize>,
    /// Record the answer-generation prompt in result CSVs instead of the bare context.
    #[serde(default)]
    pub answer_prompt: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            ks: default_ks(),
            match_strategy: MatchStrategy::default(),
            max_questions: default_max_questions(),
            max_context_chars: default_max_context_chars(),
            max_sources: None,
            answer_prompt: false,
        }
    }
}

/// HTTP client settings shared by all backend adapters
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Transcript chunking settings
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    /// Approximate character budget for line-based chunks (cloud search).
    #[serde(default = "default_line_chunk_chars")]
    pub line_chunk_chars: usize,
    /// Window size in tokens for overlapping chunks (vector index).
    #[serde(default = "default_window_tokens")]
    pub window_tokens: usize,
    #[serde(default = "default_window_overlap_tokens")]
    pub window_overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            line_chunk_chars: default_line_chunk_chars(),
            window_tokens: default_window_tokens(),
            window_overlap_tokens: default_window_overlap_tokens(),
        }
    }
}

/// Embeddings configuration (vector index backend)
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            api_key_env: default_openai_key_env(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

/// Vector index backend (Pinecone data plane)
#[derive(Debug, Clone, Deserialize)]
pub struct VectorIndexConfig {
    #[serde(default = "default_pinecone_key_env")]
    pub api_key_env: String,
    /// Data-plane host of the index, e.g. `oai-large-podcast-abc123.svc.us-east1-gcp.pinecone.io`.
    /// May stay empty until `upload --create-index` reports it.
    #[serde(default)]
    pub index_host: String,
    pub index_name: String,
    /// Pod environment. When set, new indexes are pod-based; otherwise serverless.
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default = "default_pinecone_control_plane")]
    pub control_plane_url: String,
    #[serde(default = "default_pinecone_metric")]
    pub metric: String,
    #[serde(default = "default_pinecone_pod_type")]
    pub pod_type: String,
    #[serde(default = "default_pinecone_cloud")]
    pub cloud: String,
    #[serde(default = "default_pinecone_region")]
    pub region: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub pacing_ms: u64,
}

/// Semantic filter backend (Pongo)
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticFilterConfig {
    #[serde(default = "default_pongo_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_pongo_base_url")]
    pub base_url: String,
    /// Tenant scope. Required for searching; created by `upload --create-sub-org`.
    #[serde(default)]
    pub sub_org_namespace: Option<String>,
    #[serde(default = "default_pongo_pacing_ms")]
    pub pacing_ms: u64,
}

/// Cloud search backend (Azure AI Search)
#[derive(Debug, Clone, Deserialize)]
pub struct CloudSearchConfig {
    #[serde(default = "default_azure_key_env")]
    pub api_key_env: String,
    /// Service endpoint, e.g. `https://my-service.search.windows.net`.
    pub endpoint: String,
    pub index_name: String,
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub pacing_ms: u64,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_transcripts_dir() -> PathBuf {
    PathBuf::from("acquired_transcripts")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ks() -> Vec<usize> {
    vec![3, 5]
}

fn default_max_questions() -> usize {
    5000
}

fn default_max_context_chars() -> usize {
    10_000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_line_chunk_chars() -> usize {
    900
}

fn default_window_tokens() -> usize {
    280
}

fn default_window_overlap_tokens() -> usize {
    50
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_dimensions() -> usize {
    3072
}

fn default_batch_size() -> usize {
    100
}

fn default_pinecone_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}

fn default_pinecone_control_plane() -> String {
    "https://api.pinecone.io".to_string()
}

fn default_pinecone_metric() -> String {
    "euclidean".to_string()
}

fn default_pinecone_pod_type() -> String {
    "p1".to_string()
}

fn default_pinecone_cloud() -> String {
    "aws".to_string()
}

fn default_pinecone_region() -> String {
    "us-east-1".to_string()
}

fn default_pongo_key_env() -> String {
    "PONGO_SECRET".to_string()
}

fn default_pongo_base_url() -> String {
    "https://api.joinpongo.com/api/v1".to_string()
}

fn default_pongo_pacing_ms() -> u64 {
    1000
}

fn default_azure_key_env() -> String {
    "AZURE_SEARCH_KEY".to_string()
}

fn default_azure_api_version() -> String {
    "2023-11-01".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RAGBENCH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RAGBENCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load and validate a specific config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.eval.ks.is_empty() {
            anyhow::bail!("eval.ks must list at least one cutoff");
        }

        if self.eval.ks.iter().any(|&k| k == 0) {
            anyhow::bail!("eval.ks values must be greater than 0");
        }

        if self.eval.max_context_chars == 0 {
            anyhow::bail!("eval.max_context_chars must be greater than 0");
        }

        if self.eval.max_sources == Some(0) {
            anyhow::bail!("eval.max_sources must be greater than 0 when set");
        }

        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs must be greater than 0");
        }

        if self.chunking.line_chunk_chars == 0 || self.chunking.window_tokens == 0 {
            anyhow::bail!("chunking sizes must be greater than 0");
        }

        if self.chunking.window_overlap_tokens >= self.chunking.window_tokens {
            anyhow::bail!("chunking.window_overlap_tokens must be less than window_tokens");
        }

        if self.embeddings.dimensions == 0 || self.embeddings.batch_size == 0 {
            anyhow::bail!("embeddings.dimensions and embeddings.batch_size must be greater than 0");
        }

        if let Some(vector) = &self.vector_index {
            if vector.index_name.trim().is_empty() {
                anyhow::bail!("vector_index.index_name must be set");
            }
        }

        if let Some(semantic) = &self.semantic_filter {
            if semantic.base_url.trim().is_empty() {
                anyhow::bail!("semantic_filter.base_url must be set");
            }
        }

        if let Some(cloud) = &self.cloud_search {
            if cloud.endpoint.trim().is_empty() || cloud.index_name.trim().is_empty() {
                anyhow::bail!("cloud_search.endpoint and cloud_search.index_name must be set");
            }
        }

        Ok(())
    }

    pub fn questions_path(&self) -> &Path {
        &self.bench.questions_path
    }

    pub fn results_dir(&self) -> &Path {
        &self.bench.results_dir
    }

    pub fn transcripts_dir(&self) -> &Path {
        &self.bench.transcripts_dir
    }
}

/// Read a credential from the named environment variable.
///
/// A missing or empty value is a configuration error: every call against the
/// backend would fail the same way.
pub fn resolve_secret(env_name: &str) -> std::result::Result<String, RagbenchError> {
    match std::env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RagbenchError::Config(format!(
            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
            env_name
        ))),
    }
}

/// Serializes tests that mutate process-wide environment variables.
#[cfg(test)]
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Hold this while a test sets or removes environment variables. A test that
/// panicked while holding it does not block the others.
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
