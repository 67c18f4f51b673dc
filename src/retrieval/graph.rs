//! Graph adapter: flow relationships from the graph store

use super::graph_query::{GraphQuery, GraphQueryBuilder};
use super::{Document, DocumentMetadata, Query, Retriever, SourceKind};
use crate::backends::{Record, SessionPool};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Retriever backed by the pooled graph sessions
pub struct GraphAdapter {
    pool: Arc<SessionPool>,
    builder: GraphQueryBuilder,
}

impl GraphAdapter {
    pub fn new(pool: Arc<SessionPool>) -> Result<Self> {
        Ok(Self {
            pool,
            builder: GraphQueryBuilder::new()?,
        })
    }

    /// Statement that would be issued for `text`
    pub fn plan(&self, text: &str) -> GraphQuery {
        self.builder.build(text)
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }
}

#[async_trait]
impl Retriever for GraphAdapter {
    fn name(&self) -> &str {
        "graph"
    }

    async fn retrieve(&self, query: &Query) -> Result<Vec<Document>> {
        let plan = self.plan(&query.text);
        debug!(intent = ?plan.intent, limit = ?plan.limit, "Issuing graph query");

        // The lease is returned on every exit path, including task abort
        let mut lease = self.pool.acquire().await?;
        let records = match lease.run(&plan.statement, &plan.params).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Graph query failed, dropping session: {}", e);
                lease.discard();
                return Err(e);
            }
        };
        lease.release();

        let data_type = plan.intent.data_type();
        Ok(records
            .iter()
            .map(|record| {
                Document::new(
                    describe_record(record),
                    DocumentMetadata {
                        source: SourceKind::Graph,
                        collection: None,
                        data_type: data_type.to_string(),
                        score: None,
                    },
                )
            })
            .collect())
    }
}

/// Render one result row as a sentence, dispatching on its field set
pub fn describe_record(record: &Record) -> String {
    let has = |keys: &[&str]| keys.iter().all(|k| record.contains_key(*k));
    let field = |key: &str| record.get(key).map(render_value).unwrap_or_default();

    if has(&["flow_count", "avg_bytes", "min_bytes", "max_bytes"]) {
        return format!(
            "Across {} flows, transfers averaged {} bytes (min {}, max {}).",
            field("flow_count"),
            field("avg_bytes"),
            field("min_bytes"),
            field("max_bytes")
        );
    }

    if has(&["src_ip", "dst_ip", "dst_port", "protocol"]) {
        let mut sentence = format!(
            "{} connected to {} on port {}/{}",
            field("src_ip"),
            field("dst_ip"),
            field("dst_port"),
            field("protocol")
        );
        if let Some(bytes) = record.get("bytes").filter(|v| !v.is_null()) {
            sentence.push_str(&format!(" ({} bytes)", render_value(bytes)));
        }
        if let Some(ts) = record.get("timestamp").filter(|v| !v.is_null()) {
            sentence.push_str(&format!(" at {}", render_value(ts)));
        }
        sentence.push('.');
        return sentence;
    }

    if has(&["src_ip", "dst_ip", "hops"]) {
        return format!(
            "{} can reach {} in {} hop(s).",
            field("src_ip"),
            field("dst_ip"),
            field("hops")
        );
    }

    if has(&["protocol", "flow_count"]) {
        let mut sentence = format!(
            "Protocol {} accounts for {} flows",
            field("protocol"),
            field("flow_count")
        );
        if let Some(total) = record.get("total_bytes").filter(|v| !v.is_null()) {
            sentence.push_str(&format!(" ({} bytes total)", render_value(total)));
        }
        sentence.push('.');
        return sentence;
    }

    if has(&["port", "flow_count"]) {
        return format!("Port {} carried {} flows.", field("port"), field("flow_count"));
    }

    if has(&["port", "protocol"]) {
        return format!("Port {} observed over {}.", field("port"), field("protocol"));
    }

    if record.len() == 1 && has(&["flow_count"]) {
        return format!("The graph holds {} flows.", field("flow_count"));
    }

    if record.is_empty() {
        return Value::Object(record.clone()).to_string();
    }

    // Unrecognized shape: structured key: value listing
    let mut pairs: Vec<String> = record
        .iter()
        .map(|(k, v)| format!("{}: {}", k, render_value(v)))
        .collect();
    pairs.sort();
    pairs.join(", ")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{:.1}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{GraphConnector, GraphSession, Params, PoolSettings};
    use crate::error::FlowscopeError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_describe_flow_row() {
        let row = record(json!({
            "src_ip": "10.0.0.1",
            "dst_ip": "10.0.0.2",
            "dst_port": 443,
            "protocol": "TCP",
            "bytes": 1200,
            "timestamp": "2024-05-01T10:00:00Z"
        }));
        assert_eq!(
            describe_record(&row),
            "10.0.0.1 connected to 10.0.0.2 on port 443/TCP (1200 bytes) at 2024-05-01T10:00:00Z."
        );
    }

    #[test]
    fn test_describe_aggregates() {
        assert_eq!(
            describe_record(&record(json!({"flow_count": 42}))),
            "The graph holds 42 flows."
        );
        assert_eq!(
            describe_record(&record(json!({"port": 22, "flow_count": 7}))),
            "Port 22 carried 7 flows."
        );
        assert_eq!(
            describe_record(&record(json!({
                "flow_count": 4, "avg_bytes": 512.4, "min_bytes": 10, "max_bytes": 900
            }))),
            "Across 4 flows, transfers averaged 512.4 bytes (min 10, max 900)."
        );
    }

    #[test]
    fn test_describe_unknown_shape() {
        let row = record(json!({"zeta": 1, "alpha": "x"}));
        assert_eq!(describe_record(&row), "alpha: x, zeta: 1");
    }

    struct ScriptedSession {
        calls: Arc<Mutex<Vec<(String, Params)>>>,
        fail: bool,
    }

    #[async_trait]
    impl GraphSession for ScriptedSession {
        async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Record>> {
            self.calls.lock().push((query.to_string(), params.clone()));
            if self.fail {
                return Err(FlowscopeError::backend("graph", "connection reset"));
            }
            Ok(vec![record(json!({
                "src_ip": "192.168.1.100",
                "dst_ip": "10.0.0.5",
                "dst_port": 22,
                "protocol": "TCP",
                "bytes": 300,
                "timestamp": "2024-05-01T10:00:00Z"
            }))])
        }
    }

    struct ScriptedConnector {
        calls: Arc<Mutex<Vec<(String, Params)>>>,
        fail: bool,
    }

    #[async_trait]
    impl GraphConnector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn GraphSession>> {
            Ok(Box::new(ScriptedSession {
                calls: self.calls.clone(),
                fail: self.fail,
            }))
        }
    }

    fn adapter(fail: bool) -> (GraphAdapter, Arc<Mutex<Vec<(String, Params)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let connector = Arc::new(ScriptedConnector {
            calls: calls.clone(),
            fail,
        });
        let pool = Arc::new(SessionPool::new(
            connector,
            PoolSettings {
                max_size: 2,
                max_overflow: 1,
                acquire_wait: Duration::from_millis(20),
                acquire_retries: 1,
            },
        ));
        (GraphAdapter::new(pool).unwrap(), calls)
    }

    #[tokio::test]
    async fn test_retrieve_binds_target_ip() {
        let (adapter, calls) = adapter(false);
        let query = Query::new("Show me all connections from IP 192.168.1.100", "u1", 10);

        let docs = adapter.retrieve(&query).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.source, SourceKind::Graph);
        assert_eq!(docs[0].metadata.data_type, "host_activity");

        let calls = calls.lock();
        assert_eq!(calls[0].1["target_ip"], "192.168.1.100");
        assert_eq!(calls[0].1["limit"], 50);

        let status = adapter.pool().status();
        assert_eq!(status.in_use, 0);
        assert_eq!(status.idle, 1);
    }

    #[tokio::test]
    async fn test_failed_session_is_discarded() {
        let (adapter, _) = adapter(true);
        let query = Query::new("recent connections", "u1", 10);

        assert!(adapter.retrieve(&query).await.is_err());
        let status = adapter.pool().status();
        assert_eq!(status.in_use, 0);
        assert_eq!(status.idle, 0);
    }
}
