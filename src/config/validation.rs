//! Configuration validation
//!
//! Validates kgraph configuration for correctness:
//! - Pool and scan sizes are non-zero
//! - Cache TTL stays within 1..=3600 seconds
//! - Timeouts are non-zero
//! - Namespace and log level are well-formed

use super::kgraph_config::{CacheBackend, KgraphConfig};
use crate::KgraphError;
use tracing_subscriber::EnvFilter;

/// Longest accepted cache TTL in seconds
pub const MAX_CACHE_TTL_SECS: u64 = 3600;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a kgraph configuration, collecting every problem
pub fn validate_config(config: &KgraphConfig) -> ValidationResult {
    let mut errors = Vec::new();

    // Graph store
    if config.graph.path.as_os_str().is_empty() {
        errors.push(ValidationError::new("graph.path", "Path cannot be empty"));
    }
    if config.graph.pool_size == 0 {
        errors.push(ValidationError::new(
            "graph.pool_size",
            "Pool size must be greater than 0",
        ));
    }
    for (field, value) in [
        ("graph.acquire_timeout_ms", config.graph.acquire_timeout_ms),
        ("graph.busy_timeout_ms", config.graph.busy_timeout_ms),
        ("graph.operation_timeout_ms", config.graph.operation_timeout_ms),
        ("cache.timeout_ms", config.cache.timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "Timeout must be greater than 0"));
        }
    }

    // Cache
    if config.cache.ttl_secs == 0 || config.cache.ttl_secs > MAX_CACHE_TTL_SECS {
        errors.push(ValidationError::new(
            "cache.ttl_secs",
            format!(
                "TTL must be between 1 and {} seconds, got {}",
                MAX_CACHE_TTL_SECS, config.cache.ttl_secs
            ),
        ));
    }
    if config.cache.backend == CacheBackend::Sqlite && config.cache.path.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            "cache.path",
            "Path cannot be empty for the sqlite backend",
        ));
    }
    if config.cache.backend == CacheBackend::Memory && config.cache.max_entries == 0 {
        errors.push(ValidationError::new(
            "cache.max_entries",
            "Memory cache capacity must be greater than 0",
        ));
    }
    if let Some(ref namespace) = config.cache.namespace {
        if namespace.contains(char::is_whitespace) {
            errors.push(ValidationError::new(
                "cache.namespace",
                format!("Namespace cannot contain whitespace: {:?}", namespace),
            ));
        }
    }

    // Query
    if config.query.label_scan_limit == 0 {
        errors.push(ValidationError::new(
            "query.label_scan_limit",
            "Label scan limit must be greater than 0",
        ));
    }

    // Ingest
    if let Some(ref rules) = config.ingest.rules {
        if !rules.exists() {
            errors.push(ValidationError::new(
                "ingest.rules",
                format!("Rule file not found: {}", rules.display()),
            ));
        }
    }

    // Server
    if config.server.host.trim().is_empty() {
        errors.push(ValidationError::new("server.host", "Host cannot be empty"));
    }

    // Logging
    if EnvFilter::try_new(&config.log.level).is_err() {
        errors.push(ValidationError::new(
            "log.level",
            format!("Invalid log filter '{}'", config.log.level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &KgraphConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        KgraphError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
