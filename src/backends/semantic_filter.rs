//! Semantic filter backend: Pongo REST API.
//!
//! Transcripts are uploaded whole into a sub-organization (tenant) and Pongo
//! handles chunking and filtering server-side. Search results come back as a
//! JSON array of documents.

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
use serde_json::Value;

const KIND: BackendKind = BackendKind::SemanticFilter;
const DATA_GROUP: &str = "podcast";

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    sub_org_id: &'a str,
    num_results: usize,
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    data: &'a str,
    metadata: UploadMetadata<'a>,
    sub_org_id: &'a str,
}

#[derive(Serialize)]
struct UploadMetadata<'a> {
    data_group: &'a str,
    parent_id: &'a str,
    source: &'a str,
}

#[derive(Serialize)]
struct CreateSubOrgRequest<'a> {
    sub_org_name: &'a str,
}

#[derive(Deserialize)]
struct CreateSubOrgResponse {
    sub_org_id: String,
}

/// Pongo client scoped to one sub-organization
pub struct SemanticFilterClient {
    client: Client,
    secret: String,
    base_url: String,
    sub_org_id: Option<String>,
    pacer: Pacer,
}

impl SemanticFilterClient {
    pub fn from_config(config: &Config, client: Client) -> Result<Self> {
        let section = config
            .semantic_filter
            .as_ref()
            .ok_or_else(|| missing_section(KIND))?;

        Ok(Self {
            client,
            secret: resolve_secret(&section.api_key_env)?,
            base_url: section.base_url.trim_end_matches('/').to_string(),
            sub_org_id: section
                .sub_org_namespace
                .clone()
                .filter(|id| !id.trim().is_empty()),
            pacer: Pacer::from_millis(section.pacing_ms),
        })
    }

    /// Fail with a configuration error when no sub-organization is set.
    pub fn require_sub_org(self) -> Result<Self> {
        if self.sub_org_id.is_none() {
            return Err(RagbenchError::Config(
                "semantic_filter.sub_org_namespace is not set. Run `upload --backend semantic-filter --create-sub-org` and save the printed id.".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn with_sub_org(mut self, sub_org_id: impl Into<String>) -> Self {
        self.sub_org_id = Some(sub_org_id.into());
        self
    }

    pub fn sub_org_id(&self) -> Option<&str> {
        self.sub_org_id.as_deref()
    }

    /// Create a sub-organization and return its id.
    pub async fn create_sub_org(&self, name: &str) -> Result<String> {
        self.pacer.wait().await;
        let response = self
            .client
            .post(format!("{}/sub-orgs", self.base_url))
            .header("secret", &self.secret)
            .json(&CreateSubOrgRequest { sub_org_name: name })
            .send()
            .await
            .map_err(|e| RagbenchError::Upload(format!("Network error: {}", e)))?;

        if !response.status().is_success() {
            let err = status_error(KIND.name(), response).await;
            return Err(RagbenchError::Upload(err.message));
        }

        let body: CreateSubOrgResponse = response
            .json()
            .await
            .map_err(|e| RagbenchError::Upload(format!("Failed to parse sub-org response: {}", e)))?;
        Ok(body.sub_org_id)
    }

    async fn upload_one(&self, doc: &CorpusDocument, sub_org_id: &str) -> Result<()> {
        let request = UploadRequest {
            data: &doc.text,
            metadata: UploadMetadata {
                data_group: DATA_GROUP,
                parent_id: &doc.title,
                source: &doc.title,
            },
            sub_org_id,
        };

        self.pacer.wait().await;
        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header("secret", &self.secret)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagbenchError::Upload(format!("Network error: {}", e)))?;

        if !response.status().is_success() {
            let err = status_error(KIND.name(), response).await;
            return Err(RagbenchError::Upload(format!("{}: {}", doc.title, err.message)));
        }
        Ok(())
    }
}

#[async_trait]
impl Retriever for SemanticFilterClient {
    fn name(&self) -> &str {
        KIND.name()
    }

    async fn retrieve(&self, query: &str, k: usize) -> std::result::Result<Vec<Passage>, RetrievalError> {
        check_request(KIND.name(), query, k)?;
        let sub_org_id = self
            .sub_org_id
            .as_deref()
            .ok_or_else(|| RetrievalError::new(KIND.name(), "no sub-organization configured"))?;

        let request = SearchRequest {
            query,
            sub_org_id,
            num_results: k,
        };

        self.pacer.wait().await;
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("secret", &self.secret)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(KIND.name(), e))?;

        if !response.status().is_success() {
            return Err(status_error(KIND.name(), response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RetrievalError::new(KIND.name(), format!("invalid response: {}", e)))?;

        let passages = parse_results(&body)
            .ok_or_else(|| RetrievalError::new(KIND.name(), "response is not a result list"))?;
        Ok(rank_passages(passages, k))
    }
}

#[async_trait]
impl Uploader for SemanticFilterClient {
    fn name(&self) -> &str {
        KIND.name()
    }

    async fn upload(&self, docs: &[CorpusDocument]) -> Result<usize> {
        let sub_org_id = self
            .sub_org_id
            .as_deref()
            .ok_or_else(|| RagbenchError::Config("no sub-organization to upload into".to_string()))?;

        for (idx, doc) in docs.iter().enumerate() {
            self.upload_one(doc, sub_org_id).await.map_err(|e| {
                log::error!("Upload stopped at document index {}", idx);
                e
            })?;
            log::info!("Uploaded {}", doc.title);
        }

        Ok(docs.len())
    }
}

/// Accept a bare array or an object wrapping it under `results`/`data`.
fn parse_results(body: &Value) -> Option<Vec<Passage>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => ["results", "data"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))?,
        _ => return None,
    };

    Some(items.iter().map(passage_from_doc).collect())
}

fn passage_from_doc(doc: &Value) -> Passage {
    let text = ["text", "content"]
        .iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_str))
        .unwrap_or_default();

    let metadata = doc.get("metadata");
    let source = ["source", "parent_id"]
        .iter()
        .find_map(|key| metadata.and_then(|m| m.get(*key)).and_then(Value::as_str))
        .or_else(|| doc.get("source").and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| doc.get("id").map(id_string))
        .unwrap_or_default();

    let score = doc.get("score").and_then(Value::as_f64).map(|s| s as f32);

    Passage::new(text, source, score)
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
