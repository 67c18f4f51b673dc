//! Vector store client for the Chroma HTTP API
//!
//! Chroma embeds `query_texts` server-side, which keeps the embedding model
//! outside this process.

use crate::backends::{VectorHit, VectorStore};
use crate::config::VectorConfig;
use crate::error::{FlowscopeError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_texts: [&'a str; 1],
    n_results: usize,
    include: [&'a str; 3],
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

/// Chroma-backed vector store
pub struct ChromaHttpStore {
    http: reqwest::Client,
    base_url: String,
    default_collection: Option<String>,
    collection_ids: RwLock<HashMap<String, String>>,
}

impl ChromaHttpStore {
    pub fn from_config(config: &VectorConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            default_collection: config.collections.first().cloned(),
            collection_ids: RwLock::new(HashMap::new()),
        })
    }

    async fn collection_id(&self, name: &str) -> Result<String> {
        let cached = self.collection_ids.read().get(name).cloned();
        if let Some(id) = cached {
            return Ok(id);
        }

        let response = self
            .http
            .get(format!("{}/api/v1/collections/{}", self.base_url, name))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FlowscopeError::backend(
                "vector",
                format!("collection '{}' lookup failed: HTTP {}", name, response.status()),
            ));
        }

        let info: CollectionInfo = response.json().await?;
        self.collection_ids
            .write()
            .insert(name.to_string(), info.id.clone());
        Ok(info.id)
    }
}

#[async_trait]
impl VectorStore for ChromaHttpStore {
    async fn search(
        &self,
        query: &str,
        k: usize,
        collection: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let name = collection
            .map(str::to_string)
            .or_else(|| self.default_collection.clone())
            .ok_or_else(|| FlowscopeError::backend("vector", "no collection configured"))?;
        let id = self.collection_id(&name).await?;

        let body = QueryRequest {
            query_texts: [query],
            n_results: k,
            include: ["documents", "metadatas", "distances"],
        };

        let response = self
            .http
            .post(format!("{}/api/v1/collections/{}/query", self.base_url, id))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FlowscopeError::backend(
                "vector",
                format!("query on '{}' failed: HTTP {}", name, response.status()),
            ));
        }

        let parsed: QueryResponse = response.json().await?;
        Ok(into_hits(parsed))
    }
}

fn into_hits(response: QueryResponse) -> Vec<VectorHit> {
    let documents = response.documents.into_iter().next().unwrap_or_default();
    let metadatas = response
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default();
    let distances = response
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    documents
        .into_iter()
        .enumerate()
        .filter_map(|(idx, content)| {
            let content = content?;
            let metadata = metadatas.get(idx).cloned().flatten().unwrap_or_default();
            // Smaller distance is closer; map onto (0, 1]
            let score = distances
                .get(idx)
                .copied()
                .flatten()
                .map(|d| 1.0 / (1.0 + d.max(0.0)));
            Some(VectorHit {
                content,
                metadata,
                score,
            })
        })
        .collect()
}
