//! Provenance tracking for retrieved documents

use serde::{Deserialize, Serialize};

/// Adapter a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Graph,
    Vector,
    Hybrid,
    Pattern,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
            Self::Pattern => "pattern",
        }
    }
}

/// Where a document came from and how relevant it is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Producing adapter
    pub source: SourceKind,

    /// Vector collection, if any
    pub collection: Option<String>,

    /// Data-type tag (e.g. "netflow", "connection", "port_summary")
    pub data_type: String,

    /// Relevance score (higher is better), when the backend provides one
    pub score: Option<f32>,
}

/// Retrieved content with provenance; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Upper bound on content kept per document
pub const MAX_DOCUMENT_CHARS: usize = 8_000;

impl Document {
    /// Create a document, capping content size
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        let content = content.into();
        let content = match content.char_indices().nth(MAX_DOCUMENT_CHARS) {
            Some((idx, _)) => content[..idx].to_string(),
            None => content,
        };
        Self { content, metadata }
    }

    /// Copy of this document re-tagged with another source
    pub fn retagged(&self, source: SourceKind) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.source = source;
        Self {
            content: self.content.clone(),
            metadata,
        }
    }
}
