//! Query classification via a single language-model call
//!
//! The classifier never fails: an unreachable model, an empty reply or an
//! unrecognized label all degrade to [`ClassificationLabel::Semantic`].

use crate::backends::LanguageModel;
use crate::error::{FlowscopeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Retrieval strategy a query calls for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClassificationLabel {
    Conversational,
    Graph,
    Semantic,
    Hybrid,
}

impl ClassificationLabel {
    pub const ALL: [ClassificationLabel; 4] = [
        Self::Conversational,
        Self::Graph,
        Self::Semantic,
        Self::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversational => "CONVERSATIONAL",
            Self::Graph => "GRAPH",
            Self::Semantic => "SEMANTIC",
            Self::Hybrid => "HYBRID",
        }
    }

    /// Parse a model reply; tolerant of case, whitespace and punctuation
    pub fn parse(reply: &str) -> Option<Self> {
        let token = reply
            .split_whitespace()
            .next()?
            .trim_matches(|c: char| !c.is_ascii_alphabetic())
            .to_ascii_uppercase();

        Self::ALL.into_iter().find(|label| label.as_str() == token)
    }
}

impl fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const CLASSIFY_TEMPLATE: &str = "\
You route questions about network security telemetry.
Reply with exactly one word from: CONVERSATIONAL, GRAPH, SEMANTIC, HYBRID.

CONVERSATIONAL: greetings, small talk, questions about the assistant itself.
GRAPH: relationships between hosts, IP addresses, ports, protocols, counts and paths.
SEMANTIC: descriptive searches over logs and flow descriptions.
HYBRID: questions needing both host relationships and log context.

Question: {query}
Label:";

/// Maps raw query text to a [`ClassificationLabel`]
pub struct QueryClassifier {
    model: Arc<dyn LanguageModel>,
}

impl QueryClassifier {
    pub const DEFAULT_LABEL: ClassificationLabel = ClassificationLabel::Semantic;

    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn prompt(text: &str) -> String {
        CLASSIFY_TEMPLATE.replace("{query}", text)
    }

    pub async fn classify(&self, text: &str) -> ClassificationLabel {
        match self.try_classify(text).await {
            Ok(label) => {
                debug!(label = %label, "Query classified");
                label
            }
            Err(e) => {
                warn!("{}, defaulting to {}", e, Self::DEFAULT_LABEL);
                Self::DEFAULT_LABEL
            }
        }
    }

    /// Classify without the fallback label
    pub async fn try_classify(&self, text: &str) -> Result<ClassificationLabel> {
        let reply = self
            .model
            .classify(&Self::prompt(text))
            .await
            .map_err(|e| FlowscopeError::ClassificationFailure(e.to_string()))?;

        ClassificationLabel::parse(&reply).ok_or_else(|| {
            FlowscopeError::ClassificationFailure(format!(
                "unrecognized label {:?}",
                reply.chars().take(80).collect::<String>()
            ))
        })
    }
}
