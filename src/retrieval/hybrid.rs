//! Hybrid adapter: graph and vector retrieval side by side

use super::{Document, Query, Retriever, SourceKind};
use crate::error::{FlowscopeError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Runs graph and vector retrieval concurrently and merges what succeeds
pub struct HybridAdapter {
    graph: Arc<dyn Retriever>,
    vector: Arc<dyn Retriever>,
    graph_deadline: Duration,
    vector_deadline: Duration,
}

impl HybridAdapter {
    /// Each leg is bounded by its own deadline so a stalled leg cannot
    /// hold back the documents of the other
    pub fn new(
        graph: Arc<dyn Retriever>,
        vector: Arc<dyn Retriever>,
        graph_deadline: Duration,
        vector_deadline: Duration,
    ) -> Self {
        Self {
            graph,
            vector,
            graph_deadline,
            vector_deadline,
        }
    }
}

async fn bounded_leg(
    leg: &dyn Retriever,
    query: &Query,
    deadline: Duration,
) -> Result<Vec<Document>> {
    match timeout(deadline, leg.retrieve(query)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(FlowscopeError::BackendTimeout {
            strategy: leg.name().to_string(),
            after: deadline,
        }),
    }
}

#[async_trait]
impl Retriever for HybridAdapter {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn collections(&self) -> Vec<String> {
        self.vector.collections()
    }

    async fn retrieve(&self, query: &Query) -> Result<Vec<Document>> {
        let (graph, vector) = tokio::join!(
            bounded_leg(self.graph.as_ref(), query, self.graph_deadline),
            bounded_leg(self.vector.as_ref(), query, self.vector_deadline)
        );

        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for (name, outcome) in [(self.graph.name(), graph), (self.vector.name(), vector)] {
            match outcome {
                Ok(docs) => documents.extend(docs.iter().map(|d| d.retagged(SourceKind::Hybrid))),
                Err(e) => {
                    warn!(adapter = name, "Hybrid leg failed: {}", e);
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }

        if failures.len() == 2 {
            return Err(FlowscopeError::backend("hybrid", failures.join("; ")));
        }

        Ok(documents)
    }
}
