//! Label-to-adapter routing with a fixed fallback chain
//!
//! Routing is a pure function of the label and the availability computed once
//! at startup; nothing is probed at request time.

use crate::classifier::ClassificationLabel;
use crate::error::{FlowscopeError, Result};
use serde::{Deserialize, Serialize};

/// Which backends have a live configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Availability {
    pub graph: bool,
    pub vector: bool,
}

impl Availability {
    pub fn new(graph: bool, vector: bool) -> Self {
        Self { graph, vector }
    }

    pub fn hybrid(&self) -> bool {
        self.graph && self.vector
    }
}

/// Adapter set chosen for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterSelection {
    /// Answer straight from the language model
    Direct,
    Graph,
    Vector,
    Hybrid,
}

impl AdapterSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Graph => "graph",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
        }
    }

    fn is_available(&self, availability: Availability) -> bool {
        match self {
            Self::Direct => true,
            Self::Graph => availability.graph,
            Self::Vector => availability.vector,
            Self::Hybrid => availability.hybrid(),
        }
    }
}

/// Map a label to an adapter, falling back to vector then graph
pub fn select(label: ClassificationLabel, availability: Availability) -> Result<AdapterSelection> {
    let preferred = match label {
        ClassificationLabel::Conversational => AdapterSelection::Direct,
        ClassificationLabel::Graph => AdapterSelection::Graph,
        ClassificationLabel::Semantic => AdapterSelection::Vector,
        ClassificationLabel::Hybrid => AdapterSelection::Hybrid,
    };

    [preferred, AdapterSelection::Vector, AdapterSelection::Graph]
        .into_iter()
        .find(|candidate| candidate.is_available(availability))
        .ok_or_else(|| {
            FlowscopeError::AdapterUnavailable(format!(
                "no backend available for {} query",
                label
            ))
        })
}
