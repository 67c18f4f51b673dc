//! In-process collaborators for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use flowscope::analyzer::{Analyzer, Backends};
use flowscope::backends::{
    GraphConnector, GraphSession, LanguageModel, Params, Record, VectorHit, VectorStore,
};
use flowscope::config::Config;
use flowscope::error::{FlowscopeError, Result};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Language model with a fixed label and answer
pub struct MockLlm {
    pub label: &'static str,
    pub answer: Option<&'static str>,
    pub classify_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
}

impl MockLlm {
    pub fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            answer: Some("synthesized answer"),
            classify_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        })
    }

    /// Classifies fine but every completion fails
    pub fn failing_completions(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            answer: None,
            classify_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst) + self.complete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .map(str::to_string)
            .ok_or_else(|| FlowscopeError::backend("llm", "model overloaded"))
    }

    async fn classify(&self, _prompt: &str) -> Result<String> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.label.to_string())
    }
}

/// Graph store recording every statement it runs
pub struct MockGraph {
    pub calls: Mutex<Vec<(String, Params)>>,
    pub delay: Duration,
    pub fail: bool,
}

impl MockGraph {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail: true,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

struct MockGraphSession {
    graph: Arc<MockGraph>,
}

#[async_trait]
impl GraphSession for MockGraphSession {
    async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Record>> {
        self.graph
            .calls
            .lock()
            .push((query.to_string(), params.clone()));
        tokio::time::sleep(self.graph.delay).await;

        if self.graph.fail {
            return Err(FlowscopeError::backend("graph", "connection refused"));
        }

        let row = json!({
            "src_ip": "192.168.1.100",
            "dst_ip": "10.0.0.5",
            "dst_port": 22,
            "protocol": "TCP",
            "bytes": 4096,
            "timestamp": "2024-05-01T10:00:00Z"
        });
        match row {
            Value::Object(record) => Ok(vec![record]),
            _ => Ok(Vec::new()),
        }
    }
}

pub struct MockGraphConnector(pub Arc<MockGraph>);

#[async_trait]
impl GraphConnector for MockGraphConnector {
    async fn connect(&self) -> Result<Box<dyn GraphSession>> {
        Ok(Box::new(MockGraphSession {
            graph: self.0.clone(),
        }))
    }
}

/// Vector store returning one hit per call
pub struct MockVector {
    pub calls: Mutex<Vec<(String, usize, Option<String>)>>,
    pub delay: Duration,
}

impl MockVector {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl VectorStore for MockVector {
    async fn search(
        &self,
        query: &str,
        k: usize,
        collection: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        self.calls
            .lock()
            .push((query.to_string(), k, collection.map(str::to_string)));
        tokio::time::sleep(self.delay).await;

        let mut metadata = Map::new();
        metadata.insert("data_type".to_string(), json!("netflow"));
        Ok(vec![VectorHit {
            content: format!(
                "Beaconing from 10.0.0.7 to 203.0.113.9 seen in {}",
                collection.unwrap_or("default")
            ),
            metadata,
            score: Some(0.91),
        }])
    }
}

/// Wired analyzer plus handles on its collaborators
pub struct Harness {
    pub analyzer: Analyzer,
    pub llm: Arc<MockLlm>,
    pub graph: Option<Arc<MockGraph>>,
    pub vector: Option<Arc<MockVector>>,
}

pub fn harness(
    llm: Arc<MockLlm>,
    graph: Option<Arc<MockGraph>>,
    vector: Option<Arc<MockVector>>,
) -> Harness {
    harness_with(Config::default(), llm, graph, vector)
}

pub fn harness_with(
    config: Config,
    llm: Arc<MockLlm>,
    graph: Option<Arc<MockGraph>>,
    vector: Option<Arc<MockVector>>,
) -> Harness {
    let backends = Backends {
        llm: llm.clone(),
        graph: graph
            .clone()
            .map(|g| Arc::new(MockGraphConnector(g)) as Arc<dyn GraphConnector>),
        vector: vector.clone().map(|v| v as Arc<dyn VectorStore>),
    };

    Harness {
        analyzer: Analyzer::new(backends, &config).unwrap(),
        llm,
        graph,
        vector,
    }
}
