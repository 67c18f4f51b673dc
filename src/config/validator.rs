use crate::config::{parse_duration, Config};
use crate::error::{FlowscopeError, Result, ValidationError};
use regex::Regex;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_backends(config, &mut errors);
        Self::validate_query(config, &mut errors);
        Self::validate_durations(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_pool(config, &mut errors);
        Self::validate_assembler(config, &mut errors);
        Self::validate_patterns(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FlowscopeError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["openai", "groq", "ollama"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.llm.base_url.is_empty() {
            errors.push(ValidationError::new("llm.base_url", "Base URL cannot be empty"));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }
    }

    fn validate_backends(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.graph.enabled && config.graph.url.is_empty() {
            errors.push(ValidationError::new(
                "graph.url",
                "Graph URL cannot be empty when the graph backend is enabled",
            ));
        }

        if config.vector.enabled {
            if config.vector.url.is_empty() {
                errors.push(ValidationError::new(
                    "vector.url",
                    "Vector URL cannot be empty when the vector backend is enabled",
                ));
            }
            if config.vector.collections.is_empty() {
                errors.push(ValidationError::new(
                    "vector.collections",
                    "At least one collection is required when the vector backend is enabled",
                ));
            }
        }

        if config.vector.results_per_collection == 0 {
            errors.push(ValidationError::new(
                "vector.results_per_collection",
                "Results per collection must be greater than 0",
            ));
        }
    }

    fn validate_query(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.query.max_query_length == 0 {
            errors.push(ValidationError::new(
                "query.max_query_length",
                "Maximum query length must be greater than 0",
            ));
        }

        if config.query.default_max_results == 0
            || config.query.default_max_results > config.query.max_results_cap
        {
            errors.push(ValidationError::new(
                "query.default_max_results",
                format!(
                    "Default result count must be between 1 and {}",
                    config.query.max_results_cap
                ),
            ));
        }
    }

    fn validate_durations(config: &Config, errors: &mut Vec<ValidationError>) {
        let durations = [
            ("llm.timeout", &config.llm.timeout),
            ("coordinator.pattern_timeout", &config.coordinator.pattern_timeout),
            ("coordinator.graph_timeout", &config.coordinator.graph_timeout),
            ("coordinator.vector_timeout", &config.coordinator.vector_timeout),
            ("coordinator.hybrid_timeout", &config.coordinator.hybrid_timeout),
            ("cache.exact_ttl", &config.cache.exact_ttl),
            ("cache.similarity_ttl", &config.cache.similarity_ttl),
            ("cache.inflight_stale_after", &config.cache.inflight_stale_after),
            ("cache.inflight_wait", &config.cache.inflight_wait),
            ("cache.inflight_poll_interval", &config.cache.inflight_poll_interval),
            ("cache.sweep_interval", &config.cache.sweep_interval),
            ("pool.acquire_wait", &config.pool.acquire_wait),
        ];

        for (path, value) in durations {
            match parse_duration(value) {
                Some(d) if !d.is_zero() => {}
                _ => errors.push(ValidationError::new(
                    path,
                    format!("Invalid duration format: {}", value),
                )),
            }
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        let cache = &config.cache;

        if cache.exact_capacity == 0 {
            errors.push(ValidationError::new(
                "cache.exact_capacity",
                "Exact cache capacity must be greater than 0",
            ));
        }

        if cache.similarity_capacity == 0 {
            errors.push(ValidationError::new(
                "cache.similarity_capacity",
                "Similarity cache capacity must be greater than 0",
            ));
        }

        if !(cache.eviction_fraction > 0.0 && cache.eviction_fraction <= 1.0) {
            errors.push(ValidationError::new(
                "cache.eviction_fraction",
                format!(
                    "Eviction fraction must be in (0.0, 1.0], got {}",
                    cache.eviction_fraction
                ),
            ));
        }

        if !(cache.similarity_threshold > 0.0 && cache.similarity_threshold <= 1.0) {
            errors.push(ValidationError::new(
                "cache.similarity_threshold",
                format!(
                    "Similarity threshold must be in (0.0, 1.0], got {}",
                    cache.similarity_threshold
                ),
            ));
        }

        for (i, word) in cache.similarity_stop_words.iter().enumerate() {
            if word.trim().is_empty() || word.split_whitespace().count() > 1 {
                errors.push(ValidationError::new(
                    format!("cache.similarity_stop_words[{}]", i),
                    format!("Stop word must be a single word, got {:?}", word),
                ));
            }
        }
    }

    fn validate_pool(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.pool.max_size == 0 {
            errors.push(ValidationError::new(
                "pool.max_size",
                "Pool size must be greater than 0",
            ));
        }
    }

    fn validate_assembler(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.assembler.max_sources == 0 {
            errors.push(ValidationError::new(
                "assembler.max_sources",
                "Maximum sources must be greater than 0",
            ));
        }

        if config.assembler.max_content_chars == 0 {
            errors.push(ValidationError::new(
                "assembler.max_content_chars",
                "Maximum content length must be greater than 0",
            ));
        }
    }

    fn validate_patterns(config: &Config, errors: &mut Vec<ValidationError>) {
        for (idx, pattern) in config.patterns.iter().enumerate() {
            if let Err(e) = Regex::new(&pattern.pattern) {
                errors.push(ValidationError::new(
                    format!("patterns[{}].pattern", idx),
                    format!("Invalid regex for pattern '{}': {}", pattern.name, e),
                ));
            }

            if pattern.answer.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("patterns[{}].answer", idx),
                    "Canned answer cannot be empty",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_vector_enabled_without_collections() {
        let mut config = Config::default();
        config.vector.collections.clear();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut config = Config::default();
        config.cache.similarity_threshold = 1.5;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_multi_word_stop_word_rejected() {
        let mut config = Config::default();
        config.cache.similarity_stop_words.push("show me".to_string());
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_errors_accumulate() {
        let mut config = Config::default();
        config.cache.exact_capacity = 0;
        config.coordinator.graph_timeout = "fast".to_string();
        config.patterns.push(PatternConfig {
            name: "broken".to_string(),
            pattern: "(unclosed".to_string(),
            answer: "x".to_string(),
        });

        match ConfigValidator::validate(&config) {
            Err(FlowscopeError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 3);
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }
}
