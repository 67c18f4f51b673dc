//! Contracts for the external collaborators the router depends on
//!
//! The language model, graph store and vector store are opaque services. The
//! core only sees the narrow traits defined here; concrete HTTP clients live
//! in the submodules and are wired up by the binary.

mod chroma;
mod llm;
mod neo4j;
mod pool;

pub use chroma::ChromaHttpStore;
pub use llm::OpenAiCompatibleClient;
pub use neo4j::{Neo4jHttpConnector, Neo4jHttpSession};
pub use pool::{PoolSettings, PoolStatus, SessionLease, SessionPool};

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One row returned by the graph store, keyed by column name
pub type Record = Map<String, Value>;

/// Bound query parameters; never interpolated into query text
pub type Params = Map<String, Value>;

/// Hosted language model used for classification and answer synthesis
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-form completion
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Short completion expected to contain a single label token
    async fn classify(&self, prompt: &str) -> Result<String> {
        self.complete(prompt).await
    }
}

/// A checked-out session against the graph store
#[async_trait]
pub trait GraphSession: Send {
    async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Record>>;
}

/// Opens new graph sessions for the pool
#[async_trait]
pub trait GraphConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn GraphSession>>;
}

/// Single nearest-neighbour hit from the vector store
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub content: String,
    pub metadata: Map<String, Value>,
    pub score: Option<f32>,
}

/// Similarity search over embedded flow/log text
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        query: &str,
        k: usize,
        collection: Option<&str>,
    ) -> Result<Vec<VectorHit>>;
}
