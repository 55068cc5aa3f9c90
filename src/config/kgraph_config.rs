//! kgraph configuration file handling
//!
//! Loads and manages the ~/.config/kgraph/config.yaml file. Every section and
//! field has a default, so a partial (or missing) file is valid.

use crate::ingest::EndpointIdPolicy;
use crate::store::PoolConfig;
use crate::{KgraphError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn config_dir() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("kgraph");
    path
}

/// Graph store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// SQLite database holding the graph
    pub path: PathBuf,

    /// Maximum concurrent backend sessions
    pub pool_size: usize,

    /// How long a caller waits for a free session
    pub acquire_timeout_ms: u64,

    /// SQLite lock wait between sessions
    pub busy_timeout_ms: u64,

    /// Deadline for each query service operation
    pub operation_timeout_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: config_dir().join("graph.db"),
            pool_size: 50,
            acquire_timeout_ms: 5_000,
            busy_timeout_ms: 5_000,
            operation_timeout_ms: 30_000,
        }
    }
}

impl GraphConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            path: self.path.clone(),
            size: self.pool_size,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Which cache backend to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local, lost on restart
    #[default]
    Memory,
    /// SQLite file, shared across restarts
    Sqlite,
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Database file for the sqlite backend
    pub path: PathBuf,

    /// Optional key prefix, for sharing one cache between deployments
    pub namespace: Option<String>,

    /// Entry lifetime in seconds (1..=3600)
    pub ttl_secs: u64,

    /// Per-call cache deadline; slower calls count as misses
    pub timeout_ms: u64,

    /// Capacity of the memory backend
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            path: config_dir().join("cache.db"),
            namespace: None,
            ttl_secs: 60,
            timeout_ms: 250,
            max_entries: 128,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Query service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Cap on nodes returned by a label-only query
    pub label_scan_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            label_scan_limit: 100,
        }
    }
}

/// Ingestion settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub endpoint_id_policy: EndpointIdPolicy,

    /// JSON rule file for the rule extractor; built-in rules when unset
    pub rules: Option<PathBuf>,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,

    /// Also append plain-text logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// kgraph configuration
///
/// Represents the complete ~/.config/kgraph/config.yaml file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KgraphConfig {
    pub graph: GraphConfig,
    pub cache: CacheConfig,
    pub query: QueryConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

impl KgraphConfig {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(KgraphError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading kgraph configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            graph = %config.graph.path.display(),
            pool_size = config.graph.pool_size,
            cache_backend = ?config.cache.backend,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load from `path` when it exists, otherwise start from defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving kgraph configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/kgraph/config.yaml)
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    /// Apply `KGRAPH_*` environment variables on top of the file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("KGRAPH_GRAPH_PATH") {
            self.graph.path = PathBuf::from(path);
        }
        if let Some(size) = lookup("KGRAPH_POOL_SIZE") {
            self.graph.pool_size = parse_var("KGRAPH_POOL_SIZE", &size)?;
        }
        if let Some(ttl) = lookup("KGRAPH_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_var("KGRAPH_CACHE_TTL_SECS", &ttl)?;
        }
        if let Some(namespace) = lookup("KGRAPH_CACHE_NAMESPACE") {
            self.cache.namespace = (!namespace.is_empty()).then_some(namespace);
        }
        if let Some(port) = lookup("KGRAPH_SERVER_PORT") {
            self.server.port = parse_var("KGRAPH_SERVER_PORT", &port)?;
        }
        if let Some(file) = lookup("KGRAPH_LOG_FILE") {
            self.log.file = (!file.is_empty()).then(|| PathBuf::from(file));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        KgraphError::Config(format!("{} has an invalid value: {:?}", name, value))
    })
}
