//! Configuration files driving a live analyzer

mod common;

use common::{harness_with, MockLlm, MockVector};
use flowscope::analyzer::AnalysisRequest;
use flowscope::config::{Config, PatternConfig};
use flowscope::error::FlowscopeError;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config_file_loads() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");

    Config::default().save(&path).unwrap();
    let loaded = Config::load(&path).unwrap();

    assert_eq!(loaded.meta.schema_version, "1.0.0");
    assert_eq!(loaded.cache.similarity_threshold, 0.8);
    assert_eq!(loaded.coordinator.graph_deadline(), Duration::from_secs(2));
    assert!(!loaded.patterns.is_empty());
}

#[test]
fn test_validation_reports_every_problem() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");

    let mut config = Config::default();
    config.llm.provider = "mystery".to_string();
    config.cache.similarity_threshold = 1.5;
    config.coordinator.vector_timeout = "soon".to_string();
    config.pool.max_size = 0;
    config.patterns.push(PatternConfig {
        name: "broken".to_string(),
        pattern: "(unclosed".to_string(),
        answer: "never".to_string(),
    });
    config.save(&path).unwrap();

    match Config::load(&path) {
        Err(FlowscopeError::ConfigValidation { errors }) => {
            let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
            assert!(paths.contains(&"llm.provider"), "{:?}", paths);
            assert!(paths.contains(&"cache.similarity_threshold"), "{:?}", paths);
            assert!(paths.contains(&"coordinator.vector_timeout"), "{:?}", paths);
            assert!(paths.contains(&"pool.max_size"), "{:?}", paths);
            assert!(paths.iter().any(|p| p.starts_with("patterns")), "{:?}", paths);
        }
        other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_file_is_reported() {
    let temp = TempDir::new().unwrap();
    let result = Config::load(&temp.path().join("absent.toml"));
    assert!(matches!(result, Err(FlowscopeError::ConfigNotFound { .. })));
}

#[tokio::test]
async fn test_custom_patterns_answer_without_backends() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");

    let mut config = Config::default();
    config.patterns = vec![PatternConfig {
        name: "top_talkers".to_string(),
        pattern: "^(who are the )?top talkers$".to_string(),
        answer: "Top talkers are listed on the traffic dashboard.".to_string(),
    }];
    config.save(&path).unwrap();
    let loaded = Config::load(&path).unwrap();

    let h = harness_with(
        loaded,
        MockLlm::new("SEMANTIC"),
        None,
        Some(MockVector::new(Duration::ZERO)),
    );
    let response = h
        .analyzer
        .analyze(AnalysisRequest::new("Who are the top talkers?", "analyst"))
        .await;

    assert!(response.success);
    assert_eq!(response.adapters_used, vec!["pattern:top_talkers".to_string()]);
    assert_eq!(h.vector.as_ref().unwrap().call_count(), 0);

    // default patterns were replaced
    let counted = h
        .analyzer
        .analyze(AnalysisRequest::new("count flows", "analyst"))
        .await;
    assert_ne!(counted.query_type, "PATTERN_MATCH");
}

#[tokio::test]
async fn test_stop_words_shape_similarity_matches() {
    let mut config = Config::default();
    config.cache.similarity_stop_words.clear();
    let h = harness_with(
        config,
        MockLlm::new("SEMANTIC"),
        None,
        Some(MockVector::new(Duration::ZERO)),
    );

    h.analyzer
        .analyze(AnalysisRequest::new("find malicious traffic", "analyst"))
        .await;
    let reworded = h
        .analyzer
        .analyze(AnalysisRequest::new("find malicious network traffic", "analyst"))
        .await;

    assert!(reworded.cache_hit.is_none());
    assert_eq!(h.vector.as_ref().unwrap().call_count(), 4);
}
