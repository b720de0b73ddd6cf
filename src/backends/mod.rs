//! Backend adapters: one [`Retriever`] (and [`Uploader`]) per retrieval service.
//!
//! The evaluator only sees `&dyn Retriever`; concrete clients are built from
//! the [`Config`] once at startup.

pub mod cloud_search;
pub mod pacing;
pub mod semantic_filter;
pub mod vector_index;

pub use cloud_search::CloudSearchClient;
pub use pacing::Pacer;
pub use semantic_filter::SemanticFilterClient;
pub use vector_index::VectorIndexClient;

use crate::config::Config;
use crate::error::{RagbenchError, Result, RetrievalError};
use crate::ingest::CorpusDocument;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The retrieval services under benchmark
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Vector index (Pinecone) queried with OpenAI embeddings
    VectorIndex,
    /// Semantic filter SaaS (Pongo)
    SemanticFilter,
    /// Cloud search service (Azure AI Search)
    CloudSearch,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::VectorIndex,
        BackendKind::SemanticFilter,
        BackendKind::CloudSearch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::VectorIndex => "vector-index",
            BackendKind::SemanticFilter => "semantic-filter",
            BackendKind::CloudSearch => "cloud-search",
        }
    }

    /// Whether `config` has a section for this backend.
    pub fn is_configured(&self, config: &Config) -> bool {
        match self {
            BackendKind::VectorIndex => config.vector_index.is_some(),
            BackendKind::SemanticFilter => config.semantic_filter.is_some(),
            BackendKind::CloudSearch => config.cloud_search.is_some(),
        }
    }

    /// Backends with a config section, in canonical order.
    pub fn configured(config: &Config) -> Vec<BackendKind> {
        Self::ALL
            .into_iter()
            .filter(|kind| kind.is_configured(config))
            .collect()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One passage returned by a backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub text: String,
    /// Source identifier reported by the backend (episode title, file name or document id).
    pub source: String,
    /// 1-based position in the backend's ranking.
    pub rank: usize,
    /// Relevance score, when the backend reports one.
    pub score: Option<f32>,
}

impl Passage {
    /// Unranked passage; [`rank_passages`] assigns positions.
    pub fn new(text: impl Into<String>, source: impl Into<String>, score: Option<f32>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            rank: 0,
            score,
        }
    }
}

/// Keep at most `k` passages in the order given and number them from 1.
pub fn rank_passages(passages: Vec<Passage>, k: usize) -> Vec<Passage> {
    passages
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(idx, mut passage)| {
            passage.rank = idx + 1;
            passage
        })
        .collect()
}

/// Retrieval capability shared by every backend.
///
/// Given a non-empty query and `k > 0`, returns up to `k` passages ordered by
/// the backend's relevance ranking with ranks `1..`. Remote failures and
/// timeouts surface as [`RetrievalError`]; nothing is retried.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(&self, query: &str, k: usize) -> std::result::Result<Vec<Passage>, RetrievalError>;
}

/// Corpus upload capability.
#[async_trait]
pub trait Uploader: Send + Sync {
    fn name(&self) -> &str;

    /// Upload documents; returns how many the backend accepted.
    async fn upload(&self, docs: &[CorpusDocument]) -> Result<usize>;
}

/// Reject inputs no backend can serve before touching the network.
pub(crate) fn check_request(
    backend: &str,
    query: &str,
    k: usize,
) -> std::result::Result<(), RetrievalError> {
    if query.trim().is_empty() {
        return Err(RetrievalError::new(backend, "query is empty"));
    }
    if k == 0 {
        return Err(RetrievalError::new(backend, "k must be greater than 0"));
    }
    Ok(())
}

/// Build the shared HTTP client with the configured timeout.
pub fn http_client(config: &Config) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()
        .map_err(|e| RagbenchError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Build the retriever for `kind`. Missing sections or credentials are
/// configuration errors.
pub fn build_retriever(kind: BackendKind, config: &Config) -> Result<Box<dyn Retriever>> {
    let client = http_client(config)?;
    let retriever: Box<dyn Retriever> = match kind {
        BackendKind::VectorIndex => Box::new(VectorIndexClient::from_config(config, client)?),
        BackendKind::SemanticFilter => {
            Box::new(SemanticFilterClient::from_config(config, client)?.require_sub_org()?)
        }
        BackendKind::CloudSearch => Box::new(CloudSearchClient::from_config(config, client)?),
    };
    Ok(retriever)
}

/// Build the uploader for `kind`.
pub fn build_uploader(kind: BackendKind, config: &Config) -> Result<Box<dyn Uploader>> {
    let client = http_client(config)?;
    let uploader: Box<dyn Uploader> = match kind {
        BackendKind::VectorIndex => Box::new(VectorIndexClient::from_config(config, client)?),
        BackendKind::SemanticFilter => {
            Box::new(SemanticFilterClient::from_config(config, client)?.require_sub_org()?)
        }
        BackendKind::CloudSearch => Box::new(CloudSearchClient::from_config(config, client)?),
    };
    Ok(uploader)
}

pub(crate) fn missing_section(kind: BackendKind) -> RagbenchError {
    let section = kind.name().replace('-', "_");
    RagbenchError::Config(format!(
        "Backend {} is not configured. Add a [{}] section to config.toml.",
        kind, section
    ))
}

/// Map a reqwest failure (including timeouts) to a retrieval error.
pub(crate) fn transport_error(backend: &str, err: reqwest::Error) -> RetrievalError {
    if err.is_timeout() {
        RetrievalError::new(backend, format!("request timed out: {}", err))
    } else {
        RetrievalError::new(backend, format!("network error: {}", err))
    }
}

/// Read the body of a non-2xx response into a retrieval error.
pub(crate) async fn status_error(backend: &str, response: reqwest::Response) -> RetrievalError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());
    RetrievalError::new(backend, format!("HTTP {}: {}", status.as_u16(), body))
}
