//! Configuration management for Flowscope
//!
//! Loads the TOML configuration file, applies `FLOWSCOPE_SECTION__KEY`
//! environment overrides and validates the result before any component is
//! constructed from it.

use crate::error::{FlowscopeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub llm: LlmConfig,
    pub graph: GraphConfig,
    pub vector: VectorConfig,
    pub query: QueryConfig,
    pub coordinator: CoordinatorConfig,
    pub cache: CacheConfig,
    pub pool: PoolConfig,
    pub assembler: AssemblerConfig,
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Language model used for classification and synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: String,
}

/// Graph store (network-flow relationships)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub enabled: bool,
    pub url: String,
    pub database: String,
    pub username: String,
    pub password_env: String,
}

/// Vector store (embedded flow/log text)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    pub enabled: bool,
    pub url: String,
    pub collections: Vec<String>,
    pub results_per_collection: usize,
}

/// Input bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub max_query_length: usize,
    pub default_max_results: usize,
    pub max_results_cap: usize,
}

/// Per-strategy deadlines for the parallel race
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub pattern_timeout: String,
    pub graph_timeout: String,
    pub vector_timeout: String,
    pub hybrid_timeout: String,
}

/// Cache tiers and in-flight registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub exact_ttl: String,
    pub exact_capacity: usize,
    pub eviction_fraction: f64,
    pub similarity_ttl: String,
    pub similarity_threshold: f64,
    pub similarity_capacity: usize,
    pub inflight_stale_after: String,
    pub inflight_wait: String,
    pub inflight_poll_interval: String,
    pub sweep_interval: String,
    /// Words ignored when comparing queries for similarity
    #[serde(default = "default_stop_words")]
    pub similarity_stop_words: Vec<String>,
}

/// Graph session pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_size: usize,
    pub max_overflow: usize,
    pub acquire_wait: String,
    pub acquire_retries: u32,
}

/// Response shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    pub max_sources: usize,
    pub max_content_chars: usize,
}

/// Canned answer keyed by a regular expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    pub name: String,
    pub pattern: String,
    pub answer: String,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FlowscopeError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FlowscopeError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| FlowscopeError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: FLOWSCOPE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("FLOWSCOPE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let parse_bool = |v: &str| {
            v.parse::<bool>()
                .map_err(|_| FlowscopeError::InvalidConfigValue {
                    path: path.to_string(),
                    message: format!("Cannot parse '{}' as boolean", v),
                })
        };

        match path {
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "GRAPH__ENABLED" => self.graph.enabled = parse_bool(value)?,
            "GRAPH__URL" => self.graph.url = value.to_string(),
            "VECTOR__ENABLED" => self.vector.enabled = parse_bool(value)?,
            "VECTOR__URL" => self.vector.url = value.to_string(),
            "CACHE__ENABLED" => self.cache.enabled = parse_bool(value)?,
            "CACHE__SIMILARITY_THRESHOLD" => {
                self.cache.similarity_threshold =
                    value
                        .parse()
                        .map_err(|_| FlowscopeError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as number", value),
                        })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            FlowscopeError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("flowscope").join("config.toml"))
    }
}

impl CoordinatorConfig {
    pub fn pattern_deadline(&self) -> Duration {
        parse_duration(&self.pattern_timeout).unwrap_or(Duration::from_millis(500))
    }

    pub fn graph_deadline(&self) -> Duration {
        parse_duration(&self.graph_timeout).unwrap_or(Duration::from_secs(2))
    }

    pub fn vector_deadline(&self) -> Duration {
        parse_duration(&self.vector_timeout).unwrap_or(Duration::from_secs(3))
    }

    /// Never shorter than either leg, so a hybrid run always sees both legs settle
    pub fn hybrid_deadline(&self) -> Duration {
        let configured = parse_duration(&self.hybrid_timeout).unwrap_or(Duration::from_secs(3));
        configured
            .max(self.graph_deadline())
            .max(self.vector_deadline())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            llm: LlmConfig {
                provider: "openai".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.1,
                timeout: "20s".to_string(),
            },
            graph: GraphConfig {
                enabled: true,
                url: "http://localhost:7474".to_string(),
                database: "neo4j".to_string(),
                username: "neo4j".to_string(),
                password_env: "NEO4J_PASSWORD".to_string(),
            },
            vector: VectorConfig {
                enabled: true,
                url: "http://localhost:8000".to_string(),
                collections: vec!["network_flows".to_string(), "security_logs".to_string()],
                results_per_collection: 5,
            },
            query: QueryConfig {
                max_query_length: 2000,
                default_max_results: 10,
                max_results_cap: 100,
            },
            coordinator: CoordinatorConfig {
                pattern_timeout: "500ms".to_string(),
                graph_timeout: "2s".to_string(),
                vector_timeout: "3s".to_string(),
                hybrid_timeout: "3s".to_string(),
            },
            cache: CacheConfig {
                enabled: true,
                exact_ttl: "30m".to_string(),
                exact_capacity: 1000,
                eviction_fraction: 0.2,
                similarity_ttl: "24h".to_string(),
                similarity_threshold: 0.8,
                similarity_capacity: 500,
                inflight_stale_after: "2m".to_string(),
                inflight_wait: "2s".to_string(),
                inflight_poll_interval: "100ms".to_string(),
                sweep_interval: "60s".to_string(),
                similarity_stop_words: default_stop_words(),
            },
            pool: PoolConfig {
                max_size: 10,
                max_overflow: 5,
                acquire_wait: "250ms".to_string(),
                acquire_retries: 2,
            },
            assembler: AssemblerConfig {
                max_sources: 10,
                max_content_chars: 1000,
            },
            patterns: default_patterns(),
        }
    }
}

/// Filler that does not change what a flow question asks for
pub fn default_stop_words() -> Vec<String> {
    [
        "a", "an", "the", "me", "my", "please", "all", "any", "can", "could", "you", "network",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect()
}

/// Canned answers for the most common statistical phrasings
pub fn default_patterns() -> Vec<PatternConfig> {
    let entry = |name: &str, pattern: &str, answer: &str| PatternConfig {
        name: name.to_string(),
        pattern: pattern.to_string(),
        answer: answer.to_string(),
    };

    vec![
        entry(
            "stats_overview",
            r"^(show( me)? )?(the )?(network )?(stats|statistics)$",
            "Network statistics are summarised per flow: use 'count flows' for volume, \
             'top ports' for service usage and 'protocol breakdown' for protocol mix.",
        ),
        entry(
            "count_flows",
            r"^(count|how many) (network )?flows\??$",
            "Flow volume is tracked as aggregate flow records between hosts. \
             Ask 'how many connections from <ip>' for a per-host count.",
        ),
        entry(
            "protocol_breakdown",
            r"^(show( me)? )?(the )?protocol (breakdown|distribution|stats)$",
            "Protocol distribution is grouped by transport protocol (TCP, UDP, ICMP) \
             across all recorded flows.",
        ),
    ]
}

/// Parse duration strings such as "500ms", "2s", "30m", "24h"
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();

    // Check "ms" before "s" because "ms" ends with "s"
    if let Some(ms) = value.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = value.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = value.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = value.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600))
    } else {
        value.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Expand tilde in path
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
