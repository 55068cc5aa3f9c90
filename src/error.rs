//! Error types for kgraph
//!
//! One error enum covers every failure mode of the graph store, cache, query
//! service and ingestion pipeline. A lookup that finds nothing is not an error;
//! it surfaces as `Option::None` or an empty result list.

use thiserror::Error;

/// Result type alias for kgraph operations
pub type Result<T> = std::result::Result<T, KgraphError>;

/// Comprehensive error type for kgraph operations
#[derive(Error, Debug)]
pub enum KgraphError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied malformed data (e.g. properties without an `id`)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Label or relation type failed identifier validation
    #[error("Invalid {kind}: {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },

    /// A relationship upsert referenced nodes that do not exist
    #[error("Relationship endpoint not found: {}", .missing.join(", "))]
    EndpointMissing { missing: Vec<String> },

    /// Graph backend could not serve the request (pool exhausted, timeout, closed)
    #[error("Graph backend unavailable: {0}")]
    BackendUnavailable(String),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Cache backend errors (absorbed by `SideCache`, never reach callers of the service)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Extraction collaborator errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] kgraph_extract::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl KgraphError {
    /// Short, stable name used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            KgraphError::Config(_) => "config",
            KgraphError::InvalidInput(_) => "invalid_input",
            KgraphError::InvalidIdentifier { .. } => "invalid_identifier",
            KgraphError::EndpointMissing { .. } => "endpoint_missing",
            KgraphError::BackendUnavailable(_) => "backend_unavailable",
            KgraphError::Database(_) => "database",
            KgraphError::Cache(_) => "cache",
            KgraphError::Extraction(_) => "extraction",
            KgraphError::Io(_) => "io",
            KgraphError::Json(_) => "json",
            KgraphError::Yaml(_) => "yaml",
            KgraphError::Other(_) => "other",
        }
    }

    /// Whether the failure lies on the server side rather than in the request
    pub fn is_server_error(&self) -> bool {
        !matches!(
            self,
            KgraphError::InvalidInput(_)
                | KgraphError::InvalidIdentifier { .. }
                | KgraphError::EndpointMissing { .. }
        )
    }

    /// Message that may be returned to a remote caller
    ///
    /// Client errors are echoed verbatim; server errors collapse to a generic
    /// summary so backend details stay in the logs.
    pub fn safe_summary(&self) -> String {
        match self {
            KgraphError::BackendUnavailable(_) => "graph backend unavailable".to_string(),
            e if e.is_server_error() => "query failed".to_string(),
            e => e.to_string(),
        }
    }
}
