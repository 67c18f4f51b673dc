//! Retrieval adapters over the graph and vector stores
//!
//! Every adapter exposes the same capability, `retrieve(query) -> documents`,
//! so the router and coordinator can treat them interchangeably.

mod graph;
mod graph_query;
mod hybrid;
mod provenance;
mod vector;

pub use graph::{describe_record, GraphAdapter};
pub use graph_query::{extract_ipv4, extract_port, GraphIntent, GraphQuery, GraphQueryBuilder};
pub use hybrid::HybridAdapter;
pub use provenance::{Document, DocumentMetadata, SourceKind};
pub use vector::VectorAdapter;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One prior turn of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// Accepted query; immutable once constructed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Query text
    pub text: String,

    /// Requesting user
    pub user_id: String,

    /// Prior turns, oldest first
    pub history: Vec<ConversationTurn>,

    /// Maximum number of results
    pub max_results: usize,
}

impl Query {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>, max_results: usize) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            history: Vec::new(),
            max_results,
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }
}

/// Uniform retrieval capability over one backend
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Adapter name reported in `adapters_used`
    fn name(&self) -> &str;

    /// Vector collections this adapter touches
    fn collections(&self) -> Vec<String> {
        Vec::new()
    }

    async fn retrieve(&self, query: &Query) -> Result<Vec<Document>>;
}
