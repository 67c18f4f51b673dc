//! Vector adapter: semantic search across named collections

use super::{Document, DocumentMetadata, Query, Retriever, SourceKind};
use crate::backends::{VectorHit, VectorStore};
use crate::error::{FlowscopeError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Retriever over one or more vector collections
pub struct VectorAdapter {
    store: Arc<dyn VectorStore>,
    collections: Vec<String>,
    results_per_collection: usize,
}

impl VectorAdapter {
    pub fn new(
        store: Arc<dyn VectorStore>,
        collections: Vec<String>,
        results_per_collection: usize,
    ) -> Self {
        Self {
            store,
            collections,
            results_per_collection: results_per_collection.max(1),
        }
    }

    /// Equal share of `max_results` for each collection
    pub fn per_collection_budget(&self, max_results: usize) -> usize {
        let n = self.collections.len().max(1);
        max_results
            .div_ceil(n)
            .min(self.results_per_collection)
            .max(1)
    }

    fn to_document(hit: VectorHit, collection: Option<&str>) -> Document {
        let data_type = ["data_type", "type"]
            .iter()
            .find_map(|key| hit.metadata.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| collection.map(str::to_string))
            .unwrap_or_else(|| "document".to_string());

        Document::new(
            hit.content,
            DocumentMetadata {
                source: SourceKind::Vector,
                collection: collection.map(str::to_string),
                data_type,
                score: hit.score,
            },
        )
    }
}

#[async_trait]
impl Retriever for VectorAdapter {
    fn name(&self) -> &str {
        "vector"
    }

    fn collections(&self) -> Vec<String> {
        self.collections.clone()
    }

    async fn retrieve(&self, query: &Query) -> Result<Vec<Document>> {
        if self.collections.is_empty() {
            let hits = self
                .store
                .search(&query.text, query.max_results.max(1), None)
                .await?;
            return Ok(hits.into_iter().map(|h| Self::to_document(h, None)).collect());
        }

        let k = self.per_collection_budget(query.max_results);
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for collection in &self.collections {
            match self.store.search(&query.text, k, Some(collection)).await {
                Ok(hits) => {
                    debug!(collection = %collection, hits = hits.len(), "Vector search");
                    // Budget enforced here too so a generous store cannot crowd others out
                    documents.extend(
                        hits.into_iter()
                            .take(k)
                            .map(|h| Self::to_document(h, Some(collection))),
                    );
                }
                Err(e) => {
                    warn!(collection = %collection, "Vector search failed: {}", e);
                    failures.push(format!("{}: {}", collection, e));
                }
            }
        }

        if failures.len() == self.collections.len() {
            return Err(FlowscopeError::backend("vector", failures.join("; ")));
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::Map;

    struct FakeStore {
        calls: Mutex<Vec<(String, usize)>>,
        failing: Option<&'static str>,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn search(
            &self,
            _query: &str,
            k: usize,
            collection: Option<&str>,
        ) -> Result<Vec<VectorHit>> {
            let name = collection.unwrap_or("default").to_string();
            self.calls.lock().push((name.clone(), k));
            if self.failing == Some(name.as_str()) {
                return Err(FlowscopeError::backend("vector", "collection offline"));
            }
            // Always return more than asked for
            Ok((0..k + 3)
                .map(|i| VectorHit {
                    content: format!("{} hit {}", name, i),
                    metadata: Map::new(),
                    score: Some(1.0 / (i as f32 + 1.0)),
                })
                .collect())
        }
    }

    fn store(failing: Option<&'static str>) -> Arc<FakeStore> {
        Arc::new(FakeStore {
            calls: Mutex::new(Vec::new()),
            failing,
        })
    }

    #[test]
    fn test_budget() {
        let adapter = VectorAdapter::new(
            store(None),
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            5,
        );
        assert_eq!(adapter.per_collection_budget(10), 4);
        assert_eq!(adapter.per_collection_budget(30), 5);
        assert_eq!(adapter.per_collection_budget(0), 1);
    }

    #[tokio::test]
    async fn test_equal_share_per_collection() {
        let fake = store(None);
        let adapter = VectorAdapter::new(
            fake.clone(),
            vec!["network_flows".to_string(), "security_logs".to_string()],
            10,
        );

        let docs = adapter.retrieve(&Query::new("odd dns", "u1", 6)).await.unwrap();
        assert_eq!(docs.len(), 6);

        let flows = docs
            .iter()
            .filter(|d| d.metadata.collection.as_deref() == Some("network_flows"))
            .count();
        assert_eq!(flows, 3);
        assert!(docs.iter().all(|d| d.metadata.source == SourceKind::Vector));
        assert_eq!(
            *fake.calls.lock(),
            vec![("network_flows".to_string(), 3), ("security_logs".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_partial_collection_failure() {
        let adapter = VectorAdapter::new(
            store(Some("security_logs")),
            vec!["network_flows".to_string(), "security_logs".to_string()],
            5,
        );
        let docs = adapter.retrieve(&Query::new("beacons", "u1", 4)).await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_all_collections_failing() {
        let adapter = VectorAdapter::new(
            store(Some("security_logs")),
            vec!["security_logs".to_string()],
            5,
        );
        assert!(adapter.retrieve(&Query::new("beacons", "u1", 4)).await.is_err());
    }
}
