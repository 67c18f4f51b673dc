//! Bounded graph query synthesis
//!
//! Turns free text into one Cypher statement using a fixed, first-match rule
//! cascade. Every statement either aggregates or carries an explicit row cap,
//! and every user-supplied literal is validated and bound as a parameter.

use crate::backends::Params;
use crate::error::{FlowscopeError, Result};
use regex::Regex;
use serde_json::Value;
use std::net::Ipv4Addr;

/// Row caps per rule
pub const HOST_LIMIT: usize = 50;
pub const CONNECTION_LIMIT: usize = 25;
pub const PATH_LIMIT: usize = 20;
pub const PORT_TARGET_LIMIT: usize = 25;
pub const TOP_PORTS_LIMIT: usize = 20;
pub const PORT_ACTIVITY_LIMIT: usize = 50;
pub const OVERVIEW_LIMIT: usize = 15;

/// Flows sampled by the statistics aggregate
const STATS_SAMPLE: usize = 10_000;

/// Which rule produced a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphIntent {
    Count,
    Statistics,
    HostActivity,
    Connections,
    Paths,
    PortTargeted,
    TopPorts,
    PortActivity,
    Protocols,
    Overview,
}

impl GraphIntent {
    /// Data-type tag attached to documents produced by this intent
    pub fn data_type(&self) -> &'static str {
        match self {
            Self::Count => "flow_count",
            Self::Statistics => "flow_statistics",
            Self::HostActivity => "host_activity",
            Self::Connections => "connection",
            Self::Paths => "path",
            Self::PortTargeted => "port_activity",
            Self::TopPorts => "port_summary",
            Self::PortActivity => "port_activity",
            Self::Protocols => "protocol_summary",
            Self::Overview => "netflow",
        }
    }
}

/// Parameterized statement ready for the graph store
#[derive(Debug, Clone)]
pub struct GraphQuery {
    pub intent: GraphIntent,
    pub statement: String,
    pub params: Params,
    /// Row cap, `None` for aggregates
    pub limit: Option<usize>,
}

impl GraphQuery {
    fn new(intent: GraphIntent, statement: &str) -> Self {
        Self {
            intent,
            statement: statement.to_string(),
            params: Params::new(),
            limit: None,
        }
    }

    fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    fn capped(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self.bind("limit", limit)
    }
}

const COUNT_FLOWS: &str = "MATCH ()-[f:FLOW]->() RETURN count(f) AS flow_count";

const FLOW_STATISTICS: &str = "MATCH (:Host)-[f:FLOW]->(:Host) \
     WITH f LIMIT $sample \
     RETURN count(f) AS flow_count, avg(f.bytes) AS avg_bytes, \
     min(f.bytes) AS min_bytes, max(f.bytes) AS max_bytes";

const HOST_FLOWS: &str = "MATCH (s:Host)-[f:FLOW]->(d:Host) \
     WHERE s.ip = $target_ip OR d.ip = $target_ip \
     RETURN s.ip AS src_ip, d.ip AS dst_ip, f.dst_port AS dst_port, \
     f.protocol AS protocol, f.bytes AS bytes, f.timestamp AS timestamp \
     ORDER BY f.timestamp DESC LIMIT $limit";

const RECENT_FLOWS: &str = "MATCH (s:Host)-[f:FLOW]->(d:Host) \
     RETURN s.ip AS src_ip, d.ip AS dst_ip, f.dst_port AS dst_port, \
     f.protocol AS protocol, f.bytes AS bytes, f.timestamp AS timestamp \
     ORDER BY f.timestamp DESC LIMIT $limit";

const HOST_PATHS: &str = "MATCH p = (s:Host)-[:FLOW*1..3]->(d:Host) \
     WHERE s <> d \
     RETURN s.ip AS src_ip, d.ip AS dst_ip, min(length(p)) AS hops \
     LIMIT $limit";

const PORT_FLOWS: &str = "MATCH (s:Host)-[f:FLOW]->(d:Host) \
     WHERE f.dst_port = $port \
     RETURN s.ip AS src_ip, d.ip AS dst_ip, f.dst_port AS dst_port, \
     f.protocol AS protocol, f.bytes AS bytes, f.timestamp AS timestamp \
     ORDER BY f.timestamp DESC LIMIT $limit";

const TOP_PORTS: &str = "MATCH ()-[f:FLOW]->() \
     RETURN f.dst_port AS port, count(f) AS flow_count \
     ORDER BY flow_count DESC LIMIT $limit";

const DISTINCT_PORTS: &str = "MATCH ()-[f:FLOW]->() \
     RETURN DISTINCT f.dst_port AS port, f.protocol AS protocol \
     LIMIT $limit";

const PROTOCOL_BREAKDOWN: &str = "MATCH ()-[f:FLOW]->() \
     RETURN f.protocol AS protocol, count(f) AS flow_count, sum(f.bytes) AS total_bytes \
     ORDER BY flow_count DESC";

/// Rule cascade with pre-compiled intent patterns
#[derive(Debug, Clone)]
pub struct GraphQueryBuilder {
    count: Regex,
    statistics: Regex,
    connection: Regex,
    path: Regex,
    port: Regex,
    popular: Regex,
    protocol: Regex,
}

impl GraphQueryBuilder {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                FlowscopeError::Config(format!("Invalid graph intent pattern: {}", e))
            })
        };

        Ok(Self {
            count: compile(r"\b(how many|count|total)\b")?,
            statistics: compile(r"\b(average|avg|mean|stats|statistics|summary|summarize)\b")?,
            connection: compile(
                r"\b(connections?|connect(ed|s)?|communicat\w*|talk(ed|ing|s)?|relationships?|between)\b",
            )?,
            path: compile(r"\b(paths?|routes?|hops?|reach(es|able)?|lateral)\b")?,
            port: compile(r"\bports?\b")?,
            popular: compile(r"\b(top|common|popular|most|busiest)\b")?,
            protocol: compile(r"\b(protocols?|tcp|udp|icmp)\b")?,
        })
    }

    /// Build the statement for `text`; the first matching rule wins
    pub fn build(&self, text: &str) -> GraphQuery {
        let lowered = text.to_lowercase();
        let lowered = lowered.as_str();

        if self.count.is_match(lowered) {
            return GraphQuery::new(GraphIntent::Count, COUNT_FLOWS);
        }

        if self.statistics.is_match(lowered) {
            return GraphQuery::new(GraphIntent::Statistics, FLOW_STATISTICS)
                .bind("sample", STATS_SAMPLE);
        }

        if let Some(ip) = extract_ipv4(text) {
            return GraphQuery::new(GraphIntent::HostActivity, HOST_FLOWS)
                .bind("target_ip", ip.to_string())
                .capped(HOST_LIMIT);
        }

        if self.connection.is_match(lowered) {
            return GraphQuery::new(GraphIntent::Connections, RECENT_FLOWS)
                .capped(CONNECTION_LIMIT);
        }

        if self.path.is_match(lowered) {
            return GraphQuery::new(GraphIntent::Paths, HOST_PATHS).capped(PATH_LIMIT);
        }

        if self.port.is_match(lowered) {
            if let Some(port) = extract_port(text) {
                return GraphQuery::new(GraphIntent::PortTargeted, PORT_FLOWS)
                    .bind("port", port)
                    .capped(PORT_TARGET_LIMIT);
            }
            if self.popular.is_match(lowered) {
                return GraphQuery::new(GraphIntent::TopPorts, TOP_PORTS).capped(TOP_PORTS_LIMIT);
            }
            return GraphQuery::new(GraphIntent::PortActivity, DISTINCT_PORTS)
                .capped(PORT_ACTIVITY_LIMIT);
        }

        if self.protocol.is_match(lowered) {
            return GraphQuery::new(GraphIntent::Protocols, PROTOCOL_BREAKDOWN);
        }

        GraphQuery::new(GraphIntent::Overview, RECENT_FLOWS).capped(OVERVIEW_LIMIT)
    }
}

/// First strict dotted-quad IPv4 address in `text`
///
/// Candidates are maximal runs of digits and dots. A candidate must have
/// exactly four parts of one to three digits, each at most 255.
pub fn extract_ipv4(text: &str) -> Option<Ipv4Addr> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|candidate| candidate.trim_matches('.'))
        .find_map(parse_dotted_quad)
}

fn parse_dotted_quad(candidate: &str) -> Option<Ipv4Addr> {
    let parts: Vec<&str> = candidate.split('.').collect();
    if parts.len() != 4 {
        return None;
    }

    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 3 {
            return None;
        }
        *slot = part.parse::<u16>().ok().and_then(|v| u8::try_from(v).ok())?;
    }
    Some(Ipv4Addr::from(octets))
}

/// Port number following the word "port", if it lies in 1..=65535
pub fn extract_port(text: &str) -> Option<u16> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    tokens
        .windows(2)
        .filter(|pair| pair[0] == "port" || pair[0] == "ports")
        .find_map(|pair| parse_port(pair[1]))
}

fn parse_port(token: &str) -> Option<u16> {
    if token.is_empty() || token.len() > 5 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match token.parse::<u32>() {
        Ok(n @ 1..=65535) => u16::try_from(n).ok(),
        _ => None,
    }
}
