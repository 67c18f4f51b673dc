//! Pattern registry for canned statistical answers
//!
//! This module provides:
//! - Pre-compiled regex keys loaded from the `[[patterns]]` configuration
//! - Constant-time answers for common phrasings ("show me stats", "count flows")
//!
//! The same table backs the pattern cache tier and the zero-cost pattern
//! matcher that races alongside the retrieval adapters.

use crate::cache::normalize_query;
use crate::config::PatternConfig;
use crate::error::{FlowscopeError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Compiled canned-answer pattern
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub name: String,
    pub regex: Regex,
    pub answer: String,
}

/// Answer produced by a pattern match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannedAnswer {
    pub name: String,
    pub answer: String,
}

/// Pattern table with all pre-compiled patterns
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    patterns: Vec<CompiledPattern>,
}

impl PatternTable {
    /// Build the table from parsed configuration
    pub fn from_configs(configs: &[PatternConfig]) -> Result<Self> {
        let patterns = configs
            .iter()
            .map(|cfg| {
                Regex::new(&cfg.pattern)
                    .map(|regex| CompiledPattern {
                        name: cfg.name.clone(),
                        regex,
                        answer: cfg.answer.clone(),
                    })
                    .map_err(|e| {
                        FlowscopeError::Config(format!(
                            "Invalid regex for pattern '{}': {}",
                            cfg.name, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Match a query against the table, first pattern wins
    pub fn match_query(&self, query: &str) -> Option<CannedAnswer> {
        let normalized = normalize_query(query);
        let normalized = normalized.trim_end_matches(['?', '.', '!']);

        self.patterns
            .iter()
            .find(|p| p.regex.is_match(normalized))
            .map(|p| CannedAnswer {
                name: p.name.clone(),
                answer: p.answer.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_patterns;

    #[test]
    fn test_pattern_compilation() {
        let table = PatternTable::from_configs(&default_patterns()).unwrap();
        assert_eq!(table.len(), default_patterns().len());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let configs = vec![PatternConfig {
            name: "broken".to_string(),
            pattern: "[unclosed".to_string(),
            answer: "never".to_string(),
        }];
        assert!(PatternTable::from_configs(&configs).is_err());
    }

    #[test]
    fn test_common_phrasings_match() {
        let table = PatternTable::from_configs(&default_patterns()).unwrap();

        assert_eq!(table.match_query("count flows").unwrap().name, "count_flows");
        assert_eq!(table.match_query("  How many flows? ").unwrap().name, "count_flows");
        assert_eq!(table.match_query("Show me stats").unwrap().name, "stats_overview");
        assert_eq!(
            table.match_query("protocol breakdown").unwrap().name,
            "protocol_breakdown"
        );
    }

    #[test]
    fn test_specific_questions_do_not_match() {
        let table = PatternTable::from_configs(&default_patterns()).unwrap();

        assert!(table.match_query("count flows from 10.0.0.1").is_none());
        assert!(table
            .match_query("Show me all connections from IP 192.168.1.100")
            .is_none());
    }
}
