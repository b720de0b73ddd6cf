//! Cloud search backend: Azure AI Search REST API.

use super::{
    check_request, missing_section, rank_passages, status_error, transport_error, BackendKind,
    Pacer, Passage, Retriever, Uploader,
};
use crate::config::{resolve_secret, Config};
use crate::error::{RagbenchError, Result, RetrievalError};
use crate::ingest::CorpusDocument;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const KIND: BackendKind = BackendKind::CloudSearch;
/// Azure accepts at most 1000 actions per indexing request.
const INDEX_BATCH_SIZE: usize = 1000;

#[derive(Serialize)]
struct SearchRequest<'a> {
    search: &'a str,
    top: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "@search.score", default)]
    score: Option<f32>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Serialize)]
struct IndexBatch<'a> {
    value: Vec<IndexAction<'a>>,
}

#[derive(Serialize)]
struct IndexAction<'a> {
    #[serde(rename = "@search.action")]
    action: &'static str,
    id: &'a str,
    title: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct IndexResponse {
    #[serde(default)]
    value: Vec<IndexResult>,
}

#[derive(Deserialize)]
struct IndexResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

/// Azure AI Search client bound to one index
pub struct CloudSearchClient {
    client: Client,
    api_key: String,
    endpoint: String,
    index_name: String,
    api_version: String,
    pacer: Pacer,
}

impl CloudSearchClient {
    pub fn from_config(config: &Config, client: Client) -> Result<Self> {
        let section = config
            .cloud_search
            .as_ref()
            .ok_or_else(|| missing_section(KIND))?;

        Ok(Self {
            client,
            api_key: resolve_secret(&section.api_key_env)?,
            endpoint: section.endpoint.trim_end_matches('/').to_string(),
            index_name: section.index_name.clone(),
            api_version: section.api_version.clone(),
            pacer: Pacer::from_millis(section.pacing_ms),
        })
    }

    fn docs_url(&self, operation: &str) -> String {
        format!(
            "{}/indexes/{}/docs/{}?api-version={}",
            self.endpoint, self.index_name, operation, self.api_version
        )
    }
}

#[async_trait]
impl Retriever for CloudSearchClient {
    fn name(&self) -> &str {
        KIND.name()
    }

    async fn retrieve(&self, query: &str, k: usize) -> std::result::Result<Vec<Passage>, RetrievalError> {
        check_request(KIND.name(), query, k)?;

        self.pacer.wait().await;
        let response = self
            .client
            .post(self.docs_url("search"))
            .header("api-key", &self.api_key)
            .json(&SearchRequest { search: query, top: k })
            .send()
            .await
            .map_err(|e| transport_error(KIND.name(), e))?;

        if !response.status().is_success() {
            return Err(status_error(KIND.name(), response).await);
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::new(KIND.name(), format!("invalid response: {}", e)))?;

        Ok(rank_passages(parse_hits(body.value), k))
    }
}

#[async_trait]
impl Uploader for CloudSearchClient {
    fn name(&self) -> &str {
        KIND.name()
    }

    async fn upload(&self, docs: &[CorpusDocument]) -> Result<usize> {
        let mut accepted = 0;

        for batch in docs.chunks(INDEX_BATCH_SIZE) {
            let request = IndexBatch {
                value: batch
                    .iter()
                    .map(|doc| IndexAction {
                        action: "mergeOrUpload",
                        id: &doc.id,
                        title: &doc.title,
                        content: &doc.text,
                    })
                    .collect(),
            };

            self.pacer.wait().await;
            let response = self
                .client
                .post(self.docs_url("index"))
                .header("api-key", &self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| RagbenchError::Upload(format!("Network error: {}", e)))?;

            // 207 Multi-Status reports per-document failures in the body.
            if !response.status().is_success() {
                let err = status_error(KIND.name(), response).await;
                return Err(RagbenchError::Upload(err.message));
            }

            let body: IndexResponse = response
                .json()
                .await
                .map_err(|e| RagbenchError::Upload(format!("Failed to parse index response: {}", e)))?;

            accepted += count_accepted(&body.value);
            log::info!("Indexed {} / {} chunks into {}", accepted, docs.len(), self.index_name);
        }

        Ok(accepted)
    }
}

fn parse_hits(hits: Vec<SearchHit>) -> Vec<Passage> {
    hits.into_iter()
        .map(|hit| {
            let source = hit.title.or(hit.id).unwrap_or_default();
            Passage::new(hit.content.unwrap_or_default(), source, hit.score)
        })
        .collect()
}

fn count_accepted(results: &[IndexResult]) -> usize {
    results
        .iter()
        .filter(|r| {
            if !r.status {
                log::warn!(
                    "Document {} rejected: {}",
                    r.key,
                    r.error_message.as_deref().unwrap_or("unknown error")
                );
            }
            r.status
        })
        .count()
}
