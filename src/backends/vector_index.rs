//! Vector index backend: Pinecone data-plane REST API.
//!
//! Queries are embedded with OpenAI (same model and dimensions used at upload
//! time) and sent to `POST /query`. Chunks uploaded by LlamaIndex keep their
//! text inside the `_node_content` JSON blob; chunks uploaded by this crate
//! store it under `text`. Both layouts are read.
//!
//! Index creation goes through the control plane (`POST /indexes`), which
//! reports the data-plane host once the index is ready.

use super::{
    check_request, missing_section, rank_passages, status_error, transport_error, BackendKind,
    Pacer, Passage, Retriever, Uploader,
};
use crate::config::{resolve_secret, Config, VectorIndexConfig};
use crate::embeddings::OpenAIEmbedder;
use crate::error::{RagbenchError, Result, RetrievalError};
use crate::ingest::CorpusDocument;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

const KIND: BackendKind = BackendKind::VectorIndex;
const UPSERT_BATCH_SIZE: usize = 100;
const EMBED_MAX_RETRIES: usize = 3;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(5);
const READY_POLL_ATTEMPTS: usize = 60;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: Vec<f32>,
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
struct UpsertVector {
    id: String,
    values: Vec<f32>,
    metadata: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: IndexSpec<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum IndexSpec<'a> {
    Pod {
        environment: &'a str,
        pod_type: &'a str,
        pods: u32,
    },
    Serverless {
        cloud: &'a str,
        region: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: String,
}

/// Pinecone index client
pub struct VectorIndexClient {
    client: Client,
    api_key: String,
    base_url: Option<String>,
    control_plane_url: String,
    index_name: String,
    namespace: Option<String>,
    embedder: OpenAIEmbedder,
    pacer: Pacer,
}

impl VectorIndexClient {
    pub fn from_config(config: &Config, client: Client) -> Result<Self> {
        let section = config
            .vector_index
            .as_ref()
            .ok_or_else(|| missing_section(KIND))?;

        let api_key = resolve_secret(&section.api_key_env)?;
        let openai_key = resolve_secret(&config.embeddings.api_key_env)?;
        let embedder = OpenAIEmbedder::new(client.clone(), openai_key, &config.embeddings);

        if let Some(environment) = &section.environment {
            log::debug!("Vector index {} in environment {}", section.index_name, environment);
        }

        let base_url = Some(section.index_host.trim())
            .filter(|host| !host.is_empty())
            .map(index_base_url);

        Ok(Self {
            client,
            api_key,
            base_url,
            control_plane_url: section.control_plane_url.trim_end_matches('/').to_string(),
            index_name: section.index_name.clone(),
            namespace: section.namespace.clone(),
            embedder,
            pacer: Pacer::from_millis(section.pacing_ms),
        })
    }

    /// Point the client at a data-plane host, e.g. one reported by [`Self::create_index`].
    pub fn with_index_host(mut self, host: &str) -> Self {
        self.base_url = Some(index_base_url(host));
        self
    }

    fn base_url(&self) -> std::result::Result<&str, RetrievalError> {
        self.base_url.as_deref().ok_or_else(|| {
            RetrievalError::new(
                KIND.name(),
                "vector_index.index_host is not set (create the index with `upload --create-index`)",
            )
        })
    }

    /// Create the index and wait until it is ready. Returns its data-plane host.
    ///
    /// An index that already exists is reused.
    pub async fn create_index(&self, section: &VectorIndexConfig, dimension: usize) -> Result<String> {
        let request = create_index_request(section, dimension);
        log::info!(
            "Creating index {} ({} dimensions, {} metric)",
            request.name,
            request.dimension,
            request.metric
        );

        let response = self
            .client
            .post(format!("{}/indexes", self.control_plane_url))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagbenchError::Upload(format!("Network error: {}", e)))?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            log::warn!("Index {} already exists; reusing it", self.index_name);
        } else if !response.status().is_success() {
            let err = status_error(KIND.name(), response).await;
            return Err(RagbenchError::Upload(format!("Failed to create index: {}", err.message)));
        }

        for attempt in 1..=READY_POLL_ATTEMPTS {
            let description = self.describe_index().await?;
            if description.status.ready && !description.host.is_empty() {
                log::info!("Index {} ready at {}", self.index_name, description.host);
                return Ok(description.host);
            }
            log::debug!(
                "Index {} not ready (state {}), attempt {}/{}",
                self.index_name,
                description.status.state,
                attempt,
                READY_POLL_ATTEMPTS
            );
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        Err(RagbenchError::Upload(format!(
            "Index {} was not ready after {}s",
            self.index_name,
            READY_POLL_INTERVAL.as_secs() * READY_POLL_ATTEMPTS as u64
        )))
    }

    async fn describe_index(&self) -> Result<IndexDescription> {
        let response = self
            .client
            .get(format!("{}/indexes/{}", self.control_plane_url, self.index_name))
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| RagbenchError::Upload(format!("Network error: {}", e)))?;

        if !response.status().is_success() {
            let err = status_error(KIND.name(), response).await;
            return Err(RagbenchError::Upload(format!("Failed to describe index: {}", err.message)));
        }

        response
            .json()
            .await
            .map_err(|e| RagbenchError::Upload(format!("Failed to parse index description: {}", e)))
    }

    async fn query(&self, vector: Vec<f32>, k: usize) -> std::result::Result<Vec<Passage>, RetrievalError> {
        let backend = KIND.name();
        let request = QueryRequest {
            vector,
            top_k: k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };

        let base_url = self.base_url()?;
        self.pacer.wait().await;
        let response = self
            .client
            .post(format!("{}/query", base_url))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(backend, e))?;

        if !response.status().is_success() {
            return Err(status_error(backend, response).await);
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::new(backend, format!("invalid response: {}", e)))?;

        Ok(rank_passages(parse_matches(body.matches), k))
    }

    async fn upsert(&self, vectors: Vec<UpsertVector>) -> Result<usize> {
        let request = UpsertRequest {
            vectors,
            namespace: self.namespace.as_deref(),
        };

        let base_url = self.base_url().map_err(|e| RagbenchError::Upload(e.message))?;
        self.pacer.wait().await;
        let response = self
            .client
            .post(format!("{}/vectors/upsert", base_url))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagbenchError::Upload(format!("Network error: {}", e)))?;

        if !response.status().is_success() {
            let err = status_error(KIND.name(), response).await;
            return Err(RagbenchError::Upload(err.message));
        }

        let body: UpsertResponse = response
            .json()
            .await
            .map_err(|e| RagbenchError::Upload(format!("Failed to parse upsert response: {}", e)))?;
        Ok(body.upserted_count)
    }
}

#[async_trait]
impl Retriever for VectorIndexClient {
    fn name(&self) -> &str {
        KIND.name()
    }

    async fn retrieve(&self, query: &str, k: usize) -> std::result::Result<Vec<Passage>, RetrievalError> {
        check_request(KIND.name(), query, k)?;

        let vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| RetrievalError::new(KIND.name(), e.to_string()))?;

        self.query(vector, k).await
    }
}

#[async_trait]
impl Uploader for VectorIndexClient {
    fn name(&self) -> &str {
        KIND.name()
    }

    async fn upload(&self, docs: &[CorpusDocument]) -> Result<usize> {
        let mut upserted = 0;

        for (batch_idx, batch) in docs.chunks(UPSERT_BATCH_SIZE).enumerate() {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts, EMBED_MAX_RETRIES).await?;

            let vectors = batch
                .iter()
                .zip(embeddings)
                .map(|(doc, values)| UpsertVector {
                    id: doc.id.clone(),
                    values,
                    metadata: serde_json::json!({
                        "text": doc.text,
                        "file_name": doc.title,
                    }),
                })
                .collect();

            upserted += self.upsert(vectors).await?;
            log::info!(
                "Upserted batch {} ({} / {} chunks) into {}",
                batch_idx + 1,
                upserted,
                docs.len(),
                self.index_name
            );
        }

        Ok(upserted)
    }
}

/// Pod-based when an environment is configured, serverless otherwise.
fn create_index_request(section: &VectorIndexConfig, dimension: usize) -> CreateIndexRequest<'_> {
    let spec = match section.environment.as_deref() {
        Some(environment) => IndexSpec::Pod {
            environment,
            pod_type: &section.pod_type,
            pods: 1,
        },
        None => IndexSpec::Serverless {
            cloud: &section.cloud,
            region: &section.region,
        },
    };

    CreateIndexRequest {
        name: &section.index_name,
        dimension,
        metric: &section.metric,
        spec,
    }
}

/// Accept a bare host or a full URL for the index data plane.
fn index_base_url(index_host: &str) -> String {
    let host = index_host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn parse_matches(matches: Vec<QueryMatch>) -> Vec<Passage> {
    matches
        .into_iter()
        .map(|m| {
            let metadata = m.metadata.unwrap_or_default();
            let text = passage_text(&metadata);
            let source = ["file_name", "source", "title"]
                .iter()
                .find_map(|key| metadata.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or(m.id);
            Passage::new(text, source, m.score)
        })
        .collect()
}

fn passage_text(metadata: &Map<String, Value>) -> String {
    if let Some(text) = metadata.get("text").and_then(Value::as_str) {
        return text.to_string();
    }

    metadata
        .get("_node_content")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|node| node.get("text").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}
