//! End-to-end analysis against in-process backends

mod common;

use common::{harness, harness_with, MockGraph, MockLlm, MockVector};
use flowscope::analyzer::{AnalysisRequest, AnalysisType};
use flowscope::assembler::{QUERY_TYPE_INVALID, QUERY_TYPE_PATTERN, QUERY_TYPE_PROCESSING};
use flowscope::config::Config;
use flowscope::retrieval::ConversationTurn;
use std::time::Duration;

const BACKEND_LATENCY: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_count_flows_is_answered_by_pattern_cache() {
    let h = harness(
        MockLlm::new("GRAPH"),
        Some(MockGraph::new(BACKEND_LATENCY)),
        Some(MockVector::new(BACKEND_LATENCY)),
    );

    let response = h.analyzer.analyze(AnalysisRequest::new("count flows", "analyst")).await;

    assert!(response.success);
    assert_eq!(response.query_type, QUERY_TYPE_PATTERN);
    assert_eq!(response.cache_hit.as_deref(), Some("pattern"));
    assert!(response.processing_time < BACKEND_LATENCY.as_secs_f64());
    assert_eq!(h.graph.as_ref().unwrap().call_count(), 0);
    assert_eq!(h.vector.as_ref().unwrap().call_count(), 0);
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn test_ip_question_binds_target_ip() {
    let h = harness(
        MockLlm::new("GRAPH"),
        Some(MockGraph::new(Duration::ZERO)),
        Some(MockVector::new(Duration::ZERO)),
    );

    let response = h
        .analyzer
        .analyze(AnalysisRequest::new(
            "Show me all connections from IP 192.168.1.100",
            "analyst",
        ))
        .await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.query_type, "GRAPH");
    assert_eq!(response.adapters_used, vec!["graph".to_string()]);
    assert_eq!(response.result_text, "synthesized answer");

    let graph = h.graph.as_ref().unwrap();
    let calls = graph.calls.lock();
    assert_eq!(calls.len(), 1);
    let (statement, params) = &calls[0];
    assert_eq!(params["target_ip"], "192.168.1.100");
    assert_eq!(params["limit"], 50);
    assert!(statement.contains("ORDER BY f.timestamp DESC"));
    assert!(!statement.contains("192.168.1.100"));
    assert_eq!(h.vector.as_ref().unwrap().call_count(), 0);
}

#[tokio::test]
async fn test_similar_question_reuses_cached_result() {
    let h = harness(
        MockLlm::new("SEMANTIC"),
        None,
        Some(MockVector::new(Duration::ZERO)),
    );
    let vector = h.vector.clone().unwrap();

    let first = h
        .analyzer
        .analyze(AnalysisRequest::new("find malicious traffic", "analyst"))
        .await;
    assert!(first.success);
    assert!(first.cache_hit.is_none());
    let searches = vector.call_count();
    assert_eq!(searches, 2);

    let second = h
        .analyzer
        .analyze(AnalysisRequest::new("find malicious network traffic", "analyst"))
        .await;
    assert!(second.success);
    assert_eq!(second.cache_hit.as_deref(), Some("similarity"));
    assert_eq!(second.result_text, first.result_text);
    assert_eq!(vector.call_count(), searches);

    // exact repeat
    let third = h
        .analyzer
        .analyze(AnalysisRequest::new("Find  malicious traffic", "analyst"))
        .await;
    assert_eq!(third.cache_hit.as_deref(), Some("exact"));
    assert_eq!(vector.call_count(), searches);
}

#[tokio::test]
async fn test_similarity_is_scoped_per_user() {
    let h = harness(
        MockLlm::new("SEMANTIC"),
        None,
        Some(MockVector::new(Duration::ZERO)),
    );
    let vector = h.vector.clone().unwrap();

    h.analyzer
        .analyze(AnalysisRequest::new("find malicious traffic", "alice"))
        .await;
    let other = h
        .analyzer
        .analyze(AnalysisRequest::new("find malicious network traffic", "bob"))
        .await;

    assert!(other.cache_hit.is_none());
    assert_eq!(vector.call_count(), 4);
}

#[tokio::test]
async fn test_concurrent_duplicates_run_backend_once() {
    let h = harness(
        MockLlm::new("GRAPH"),
        Some(MockGraph::new(Duration::from_millis(200))),
        None,
    );
    let request = AnalysisRequest::new("which hosts connected to the file server", "analyst");

    let (a, b) = tokio::join!(
        h.analyzer.analyze(request.clone()),
        h.analyzer.analyze(request.clone())
    );

    assert_eq!(h.graph.as_ref().unwrap().call_count(), 1);
    assert!(a.success && b.success);
    for response in [&a, &b] {
        let reused = response.cache_hit.as_deref() == Some("exact");
        let processing = response.query_type == QUERY_TYPE_PROCESSING;
        let executed = response.cache_hit.is_none() && response.query_type == "GRAPH";
        assert!(reused || processing || executed, "{:?}", response);
    }
    assert_eq!(h.analyzer.cache().stats().in_flight, 0);
}

#[tokio::test]
async fn test_duplicate_gets_processing_placeholder_after_bounded_wait() {
    let mut config = Config::default();
    config.cache.inflight_wait = "50ms".to_string();
    config.cache.inflight_poll_interval = "10ms".to_string();
    config.coordinator.graph_timeout = "2s".to_string();

    let h = harness_with(
        config,
        MockLlm::new("GRAPH"),
        Some(MockGraph::new(Duration::from_millis(400))),
        None,
    );
    let request = AnalysisRequest::new("recent connections to the vpn", "analyst");

    let (first, second) = tokio::join!(
        h.analyzer.analyze(request.clone()),
        h.analyzer.analyze(request.clone())
    );

    assert_eq!(first.query_type, "GRAPH");
    assert_eq!(second.query_type, QUERY_TYPE_PROCESSING);
    assert!(second.success);
    assert_eq!(h.graph.as_ref().unwrap().call_count(), 1);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_and_not_cached() {
    let h = harness(MockLlm::new("GRAPH"), Some(MockGraph::new(Duration::ZERO)), None);

    let empty = h.analyzer.analyze(AnalysisRequest::new("   ", "analyst")).await;
    assert!(!empty.success);
    assert_eq!(empty.query_type, QUERY_TYPE_INVALID);
    assert!(empty.error.is_some());

    let long = h
        .analyzer
        .analyze(AnalysisRequest::new("x".repeat(5000), "analyst"))
        .await;
    assert!(!long.success);
    assert_eq!(long.query_type, QUERY_TYPE_INVALID);

    assert_eq!(h.analyzer.cache().stats().exact.entries, 0);
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn test_all_strategies_failing_is_reported() {
    let h = harness(MockLlm::new("GRAPH"), Some(MockGraph::failing()), None);

    let response = h
        .analyzer
        .analyze(AnalysisRequest::new("who talked to 10.9.9.9", "analyst"))
        .await;

    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.contains("All strategies failed"), "{}", error);
    assert!(error.contains("connection refused"), "{}", error);
    assert!(error.contains("pattern"), "{}", error);
    assert_eq!(h.analyzer.cache().stats().exact.entries, 0);
}

#[tokio::test]
async fn test_no_backends_available() {
    let h = harness(MockLlm::new("SEMANTIC"), None, None);

    let response = h
        .analyzer
        .analyze(AnalysisRequest::new("suspicious dns tunnelling", "analyst"))
        .await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("no backend available"));
}

#[tokio::test]
async fn test_graph_label_falls_back_to_vector() {
    let h = harness(MockLlm::new("GRAPH"), None, Some(MockVector::new(Duration::ZERO)));

    let response = h
        .analyzer
        .analyze(AnalysisRequest::new("paths into the dmz", "analyst"))
        .await;

    assert!(response.success);
    assert_eq!(response.query_type, "GRAPH");
    assert_eq!(response.adapters_used, vec!["vector".to_string()]);
    assert_eq!(
        response.collections_used,
        Some(vec!["network_flows".to_string(), "security_logs".to_string()])
    );
}

#[tokio::test]
async fn test_hint_overrides_classifier() {
    let h = harness(
        MockLlm::new("SEMANTIC"),
        Some(MockGraph::new(Duration::ZERO)),
        Some(MockVector::new(Duration::ZERO)),
    );

    let response = h
        .analyzer
        .analyze(
            AnalysisRequest::new("lateral movement from 10.0.0.4", "analyst")
                .with_type(AnalysisType::Hybrid)
                .with_sources(true),
        )
        .await;

    assert!(response.success);
    assert_eq!(response.query_type, "HYBRID");
    assert_eq!(response.adapters_used, vec!["hybrid".to_string()]);
    assert_eq!(h.llm.classify_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

    let sources = response.source_documents.unwrap();
    assert_eq!(sources.len(), 3);
    assert!(sources.iter().all(|s| s.source == "hybrid"));
}

#[tokio::test]
async fn test_sources_requests_are_not_cached() {
    let h = harness(MockLlm::new("SEMANTIC"), None, Some(MockVector::new(Duration::ZERO)));
    let vector = h.vector.clone().unwrap();
    let request = AnalysisRequest::new("odd outbound smtp", "analyst").with_sources(true);

    let first = h.analyzer.analyze(request.clone()).await;
    let second = h.analyzer.analyze(request).await;

    assert!(first.source_documents.is_some());
    assert!(second.source_documents.is_some());
    assert!(second.cache_hit.is_none());
    assert_eq!(vector.call_count(), 4);
}

#[tokio::test]
async fn test_synthesis_failure_falls_back_to_digest() {
    let h = harness(
        MockLlm::failing_completions("SEMANTIC"),
        None,
        Some(MockVector::new(Duration::ZERO)),
    );

    let response = h
        .analyzer
        .analyze(AnalysisRequest::new("beaconing hosts", "analyst"))
        .await;

    assert!(response.success);
    assert!(response.result_text.starts_with("Found 2 relevant records:"));
    assert!(response.result_text.contains("Beaconing from 10.0.0.7"));
}

#[tokio::test]
async fn test_conversational_answers_directly() {
    let h = harness(
        MockLlm::new("CONVERSATIONAL"),
        Some(MockGraph::new(Duration::ZERO)),
        Some(MockVector::new(Duration::ZERO)),
    );
    let history = (0..10)
        .map(|i| ConversationTurn {
            role: "user".to_string(),
            content: format!("earlier question {}", i),
        })
        .collect();

    let response = h
        .analyzer
        .analyze(AnalysisRequest::new("thanks, what can you do?", "analyst").with_history(history))
        .await;

    assert!(response.success);
    assert_eq!(response.query_type, "CONVERSATIONAL");
    assert_eq!(response.adapters_used, vec!["llm".to_string()]);
    assert_eq!(h.graph.as_ref().unwrap().call_count(), 0);
    assert_eq!(h.vector.as_ref().unwrap().call_count(), 0);
}

#[tokio::test]
async fn test_cache_disabled_still_answers_patterns_through_race() {
    let mut config = Config::default();
    config.cache.enabled = false;
    let h = harness_with(
        config,
        MockLlm::new("GRAPH"),
        Some(MockGraph::new(Duration::from_millis(300))),
        None,
    );

    let response = h.analyzer.analyze(AnalysisRequest::new("count flows", "analyst")).await;

    assert!(response.success);
    assert_eq!(response.query_type, QUERY_TYPE_PATTERN);
    assert!(response.cache_hit.is_none());
    assert!(response.adapters_used[0].starts_with("pattern:"));
}

#[tokio::test]
async fn test_sources_request_does_not_reuse_plain_in_flight_result() {
    let h = harness(
        MockLlm::new("SEMANTIC"),
        None,
        Some(MockVector::new(Duration::from_millis(200))),
    );
    let plain = AnalysisRequest::new("exfiltration over dns", "analyst");
    let with_sources = plain.clone().with_sources(true);

    let (owner, waiter) = tokio::join!(h.analyzer.analyze(plain), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        h.analyzer.analyze(with_sources).await
    });

    assert!(owner.success);
    assert!(owner.source_documents.is_none());
    assert!(waiter.success);
    assert!(waiter.cache_hit.is_none());
    assert_eq!(waiter.source_documents.map(|s| s.len()), Some(2));
    assert_eq!(h.vector.as_ref().unwrap().call_count(), 4);
}

#[tokio::test]
async fn test_duplicate_sources_requests_run_once() {
    let h = harness(
        MockLlm::new("SEMANTIC"),
        None,
        Some(MockVector::new(Duration::from_millis(200))),
    );
    let request = AnalysisRequest::new("exfiltration over dns", "analyst").with_sources(true);

    let (first, second) = tokio::join!(
        h.analyzer.analyze(request.clone()),
        h.analyzer.analyze(request.clone())
    );

    let placeholders = [&first, &second]
        .iter()
        .filter(|r| r.query_type == QUERY_TYPE_PROCESSING)
        .count();
    assert_eq!(placeholders, 1);
    assert_eq!(h.vector.as_ref().unwrap().call_count(), 2);
    assert_eq!(h.analyzer.cache().stats().in_flight, 0);
}

#[tokio::test]
async fn test_hybrid_survives_stalled_graph_leg() {
    let mut config = Config::default();
    config.coordinator.graph_timeout = "100ms".to_string();
    let h = harness_with(
        config,
        MockLlm::new("HYBRID"),
        Some(MockGraph::new(Duration::from_secs(10))),
        Some(MockVector::new(Duration::from_millis(10))),
    );

    let response = h
        .analyzer
        .analyze(AnalysisRequest::new("lateral movement from 10.0.0.4", "analyst").with_sources(true))
        .await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.adapters_used, vec!["hybrid".to_string()]);
    let sources = response.source_documents.unwrap();
    assert_eq!(sources.len(), 2);
    assert!(sources.iter().all(|s| s.source == "hybrid"));
    assert!(response.processing_time < 2.0);
}
