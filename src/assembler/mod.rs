//! Result assembly: one response shape for every outcome
//!
//! Normalizes adapter output into [`AnalysisResponse`], bounding the number
//! and size of embedded source documents and stripping control characters.

use crate::cache::CacheTier;
use crate::config::AssemblerConfig;
use crate::error::FlowscopeError;
use crate::patterns::CannedAnswer;
use crate::retrieval::Document;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const QUERY_TYPE_PATTERN: &str = "PATTERN_MATCH";
pub const QUERY_TYPE_PROCESSING: &str = "PROCESSING";
pub const QUERY_TYPE_INVALID: &str = "INVALID";
pub const QUERY_TYPE_ERROR: &str = "ERROR";

/// Response returned across the transport boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub result_text: String,
    pub query_type: String,
    pub adapters_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections_used: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_documents: Option<Vec<SourceDocument>>,
    /// Seconds
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<String>,
}

impl AnalysisResponse {
    /// Re-stamp a cached response for the current request
    pub fn served_from(mut self, tier: CacheTier, started: Instant) -> Self {
        self.cache_hit = Some(tier.as_str().to_string());
        self.processing_time = started.elapsed().as_secs_f64();
        self
    }
}

/// Provenance-tagged excerpt of a retrieved document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Everything a successful retrieval contributes to the response
pub struct Assembly<'a> {
    pub answer: String,
    pub query_type: &'a str,
    pub adapters_used: Vec<String>,
    pub collections_used: Option<Vec<String>>,
    pub documents: &'a [Document],
    pub include_sources: bool,
}

/// Builds responses with bounded source payloads
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    max_sources: usize,
    max_content_chars: usize,
}

impl ResultAssembler {
    pub fn new(max_sources: usize, max_content_chars: usize) -> Self {
        Self {
            max_sources,
            max_content_chars,
        }
    }

    pub fn max_content_chars(&self) -> usize {
        self.max_content_chars
    }

    pub fn success(&self, assembly: Assembly<'_>, started: Instant) -> AnalysisResponse {
        let source_documents = assembly.include_sources.then(|| {
            assembly
                .documents
                .iter()
                .take(self.max_sources)
                .map(|doc| SourceDocument {
                    content: truncate(&sanitize(&doc.content), self.max_content_chars),
                    source: doc.metadata.source.as_str().to_string(),
                    collection: doc.metadata.collection.clone(),
                    data_type: doc.metadata.data_type.clone(),
                    score: doc.metadata.score,
                })
                .collect()
        });

        AnalysisResponse {
            result_text: sanitize(&assembly.answer),
            query_type: assembly.query_type.to_string(),
            adapters_used: assembly.adapters_used,
            collections_used: assembly.collections_used.filter(|c| !c.is_empty()),
            source_documents,
            processing_time: started.elapsed().as_secs_f64(),
            error: None,
            success: true,
            cache_hit: None,
        }
    }

    pub fn pattern(&self, canned: &CannedAnswer, started: Instant) -> AnalysisResponse {
        AnalysisResponse {
            result_text: sanitize(&canned.answer),
            query_type: QUERY_TYPE_PATTERN.to_string(),
            adapters_used: vec![format!("pattern:{}", canned.name)],
            collections_used: None,
            source_documents: None,
            processing_time: started.elapsed().as_secs_f64(),
            error: None,
            success: true,
            cache_hit: Some(CacheTier::Pattern.as_str().to_string()),
        }
    }

    /// Placeholder returned when the same request is already being serviced
    pub fn processing(&self, started: Instant) -> AnalysisResponse {
        AnalysisResponse {
            result_text: "This question is already being processed. Please retry shortly."
                .to_string(),
            query_type: QUERY_TYPE_PROCESSING.to_string(),
            adapters_used: Vec::new(),
            collections_used: None,
            source_documents: None,
            processing_time: started.elapsed().as_secs_f64(),
            error: None,
            success: true,
            cache_hit: None,
        }
    }

    pub fn failure(&self, error: &FlowscopeError, started: Instant) -> AnalysisResponse {
        let query_type = match error {
            FlowscopeError::InvalidInput(_) => QUERY_TYPE_INVALID,
            _ => QUERY_TYPE_ERROR,
        };

        AnalysisResponse {
            result_text: String::new(),
            query_type: query_type.to_string(),
            adapters_used: Vec::new(),
            collections_used: None,
            source_documents: None,
            processing_time: started.elapsed().as_secs_f64(),
            error: Some(sanitize(&error.to_string())),
            success: false,
            cache_hit: None,
        }
    }
}

impl From<&AssemblerConfig> for ResultAssembler {
    fn from(config: &AssemblerConfig) -> Self {
        Self::new(config.max_sources, config.max_content_chars)
    }
}

/// Strip control characters, keeping newlines and tabs
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Cut to at most `max_chars` characters on a char boundary
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{DocumentMetadata, SourceKind};

    fn doc(content: &str) -> Document {
        Document::new(
            content,
            DocumentMetadata {
                source: SourceKind::Vector,
                collection: Some("security_logs".to_string()),
                data_type: "log".to_string(),
                score: Some(0.9),
            },
        )
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize("a\u{0}b\u{1b}[31mc\nd\te"), "ab[31mc\nd\te");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_sources_bounded_and_truncated() {
        let assembler = ResultAssembler::new(2, 4);
        let docs = vec![doc("first document"), doc("second"), doc("third")];

        let response = assembler.success(
            Assembly {
                answer: "answer".to_string(),
                query_type: "SEMANTIC",
                adapters_used: vec!["vector".to_string()],
                collections_used: Some(vec!["security_logs".to_string()]),
                documents: &docs,
                include_sources: true,
            },
            Instant::now(),
        );

        let sources = response.source_documents.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].content, "firs...");
        assert_eq!(sources[0].source, "vector");
    }

    #[test]
    fn test_sources_omitted_unless_requested() {
        let assembler = ResultAssembler::new(5, 100);
        let docs = vec![doc("flow")];
        let response = assembler.success(
            Assembly {
                answer: "answer".to_string(),
                query_type: "GRAPH",
                adapters_used: vec!["graph".to_string()],
                collections_used: Some(vec![]),
                documents: &docs,
                include_sources: false,
            },
            Instant::now(),
        );
        assert!(response.source_documents.is_none());
        assert!(response.collections_used.is_none());
    }

    #[test]
    fn test_failure_shape() {
        let assembler = ResultAssembler::new(5, 100);
        let response = assembler.failure(
            &FlowscopeError::InvalidInput("query is empty".to_string()),
            Instant::now(),
        );
        assert!(!response.success);
        assert_eq!(response.query_type, QUERY_TYPE_INVALID);
        assert!(response.error.unwrap().contains("query is empty"));
    }
}
